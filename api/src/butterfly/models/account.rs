use bson::{oid::ObjectId, serde_helpers::serialize_object_id_as_hex_string};
use serde::{Deserialize, Serialize};

// The document stored in the `users` collection
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Identifier issued by the identity provider
    #[serde(rename = "id")]
    pub external_id: String,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub onboarded: bool,
    #[serde(default)]
    pub butterfly: Vec<ObjectId>,
}

// The document stored in the `communities` collection
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Community {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "id")]
    pub external_id: String,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub butterfly: Vec<ObjectId>,
}

/// The projection of a user or community that gets embedded into rendered
/// butterflies.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccountSummary {
    #[serde(rename = "_id", serialize_with = "serialize_object_id_as_hex_string")]
    pub id: ObjectId,
    #[serde(rename = "id", default)]
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl From<&User> for AccountSummary {
    fn from(user: &User) -> Self {
        AccountSummary {
            id: user.id,
            external_id: user.external_id.clone(),
            name: user.name.clone(),
            image: user.image.clone(),
        }
    }
}

impl From<&Community> for AccountSummary {
    fn from(community: &Community) -> Self {
        AccountSummary {
            id: community.id,
            external_id: community.external_id.clone(),
            name: community.name.clone(),
            image: community.image.clone(),
        }
    }
}
