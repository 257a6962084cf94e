use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// The document stored in the `butterflies` collection
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Butterfly {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub text: String,
    pub author: ObjectId,
    #[serde(default)]
    pub community: Option<ObjectId>,
    #[serde(default)]
    pub parent_id: Option<ObjectId>,
    #[serde(default)]
    pub children: Vec<ObjectId>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Butterfly {
    /// A new top-level butterfly, optionally attributed to a community.
    pub fn new(text: String, author: ObjectId, community: Option<ObjectId>) -> Self {
        Butterfly {
            id: ObjectId::new(),
            text,
            author,
            community,
            parent_id: None,
            children: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// A reply to `parent`. Replies are never attributed to a community.
    pub fn reply(parent: ObjectId, text: String, author: ObjectId) -> Self {
        Butterfly {
            parent_id: Some(parent),
            ..Butterfly::new(text, author, None)
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}
