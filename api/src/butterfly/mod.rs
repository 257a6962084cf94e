pub mod account;
pub mod comment;
pub mod create;
pub mod delete;
pub mod descendants;
pub mod feed;
pub mod models;
pub mod routes;
pub mod view;

use bson::oid::ObjectId;

use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum ButterflyError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: ObjectId },

    #[error("Failed to {action}: {source}")]
    Store {
        action: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Unable to fetch butterfly: {0}")]
    Fetch(#[source] StoreError),
}

impl ButterflyError {
    pub fn not_found(id: ObjectId) -> Self {
        ButterflyError::NotFound {
            kind: "Butterfly",
            id,
        }
    }

    /// Wraps a store failure with the name of the operation that hit it, for
    /// use with `map_err`.
    pub fn store(action: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ButterflyError::Store { action, source }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use bson::oid::ObjectId;

    use crate::store::InMemoryStore;

    use super::models::{Butterfly, Community, User};

    pub fn user(name: &str) -> User {
        User {
            id: ObjectId::new(),
            external_id: format!("user_{name}"),
            username: name.to_lowercase(),
            name: name.into(),
            image: Some(format!("/avatars/{name}.png")),
            bio: None,
            onboarded: true,
            butterfly: vec![],
        }
    }

    pub fn community(name: &str) -> Community {
        Community {
            id: ObjectId::new(),
            external_id: format!("org_{name}"),
            username: name.to_lowercase(),
            name: name.into(),
            image: None,
            bio: None,
            butterfly: vec![],
        }
    }

    /// Stores a top-level butterfly the way publishing does.
    pub async fn post(
        store: &InMemoryStore,
        author: &User,
        community: Option<&Community>,
        text: &str,
    ) -> Butterfly {
        use crate::store::ButterflyStore;

        let butterfly = Butterfly::new(text.into(), author.id, community.map(|c| c.id));
        store.publish(&butterfly).await.unwrap();
        butterfly
    }

    /// Stores a reply the way commenting does.
    pub async fn reply(store: &InMemoryStore, parent: &Butterfly, author: &User, text: &str) -> Butterfly {
        use crate::store::ButterflyStore;

        let reply = Butterfly::reply(parent.id, text.into(), author.id);
        assert!(store.append_reply(parent.id, &reply).await.unwrap());
        reply
    }
}
