//! Rendering-ready butterflies with their author, community and replies
//! filled in.
//!
//! Population works on a fixed number of reply levels instead of the whole
//! tree: the thread page expands two levels of replies below the butterfly
//! and the feed one. Whatever lies below the last expanded level stays a
//! plain id reference. Each expanded level costs one batched store query, and
//! authors and communities one query each, regardless of how many
//! butterflies are rendered.

use std::collections::HashMap;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    App,
    error::AppError,
    store::{ButterflyStore, StoreError},
};

use super::{
    ButterflyError,
    models::{AccountSummary, Butterfly},
    routes::parse_id,
};

/// Reply levels expanded on a butterfly's own page.
pub const THREAD_DEPTH: usize = 2;

/// Either the referenced document, or its id when it was not expanded.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Reference<T> {
    Populated(Box<T>),
    Id(String),
}

impl<T> Reference<T> {
    #[cfg(test)]
    pub fn populated(&self) -> Option<&T> {
        match self {
            Reference::Populated(value) => Some(value),
            Reference::Id(_) => None,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ButterflyView {
    pub id: String,
    pub text: String,
    pub parent_id: Option<String>,
    /// `None` when the author no longer exists
    pub author: Option<Reference<AccountSummary>>,
    pub community: Option<Reference<AccountSummary>>,
    pub created_at: DateTime<Utc>,
    pub children: Vec<Reference<ButterflyView>>,
}

impl ButterflyView {
    /// The butterfly with every reference left as an id.
    pub fn unpopulated(butterfly: &Butterfly) -> Self {
        ButterflyView {
            id: butterfly.id.to_hex(),
            text: butterfly.text.clone(),
            parent_id: butterfly.parent_id.map(|id| id.to_hex()),
            author: Some(Reference::Id(butterfly.author.to_hex())),
            community: butterfly.community.map(|id| Reference::Id(id.to_hex())),
            created_at: butterfly.created_at,
            children: butterfly
                .children
                .iter()
                .map(|id| Reference::Id(id.to_hex()))
                .collect(),
        }
    }
}

/// Loads a butterfly with its author and community, its replies with their
/// authors, and their replies with their authors.
pub async fn load_butterfly_view(
    store: &dyn ButterflyStore,
    id: ObjectId,
) -> Result<ButterflyView, ButterflyError> {
    let root = store
        .find_butterfly(id)
        .await
        .map_err(ButterflyError::Fetch)?
        .ok_or_else(|| ButterflyError::not_found(id))?;

    let mut views = populate(store, vec![root], THREAD_DEPTH)
        .await
        .map_err(ButterflyError::Fetch)?;

    views.pop().ok_or_else(|| ButterflyError::not_found(id))
}

/// Expands `roots` with their author and community and `reply_depth` levels
/// of replies. Replies get their author expanded but keep their community as
/// an id. Ids that no longer resolve are dropped from `children`.
pub(super) async fn populate(
    store: &dyn ButterflyStore,
    roots: Vec<Butterfly>,
    reply_depth: usize,
) -> Result<Vec<ButterflyView>, StoreError> {
    let mut replies: HashMap<ObjectId, Butterfly> = HashMap::new();
    let mut level: Vec<ObjectId> = roots
        .iter()
        .flat_map(|b| b.children.iter().copied())
        .collect();

    for _ in 0..reply_depth {
        if level.is_empty() {
            break;
        }

        let fetched = store.find_butterflies(&level).await?;
        level = fetched
            .iter()
            .flat_map(|b| b.children.iter().copied())
            .collect();
        replies.extend(fetched.into_iter().map(|b| (b.id, b)));
    }

    let mut author_ids: Vec<ObjectId> = roots
        .iter()
        .chain(replies.values())
        .map(|b| b.author)
        .collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let mut community_ids: Vec<ObjectId> = roots.iter().filter_map(|b| b.community).collect();
    community_ids.sort_unstable();
    community_ids.dedup();

    let authors = by_id(store.find_user_summaries(&author_ids).await?);
    let communities = if community_ids.is_empty() {
        HashMap::new()
    } else {
        by_id(store.find_community_summaries(&community_ids).await?)
    };

    let tree = Populated {
        replies,
        authors,
        communities,
        reply_depth,
    };

    Ok(roots.iter().map(|root| tree.render(root, 0)).collect())
}

fn by_id(summaries: Vec<AccountSummary>) -> HashMap<ObjectId, AccountSummary> {
    summaries.into_iter().map(|s| (s.id, s)).collect()
}

struct Populated {
    replies: HashMap<ObjectId, Butterfly>,
    authors: HashMap<ObjectId, AccountSummary>,
    communities: HashMap<ObjectId, AccountSummary>,
    reply_depth: usize,
}

impl Populated {
    fn render(&self, butterfly: &Butterfly, depth: usize) -> ButterflyView {
        let children = if depth < self.reply_depth {
            butterfly
                .children
                .iter()
                .filter_map(|id| self.replies.get(id))
                .map(|child| Reference::Populated(Box::new(self.render(child, depth + 1))))
                .collect()
        } else {
            butterfly
                .children
                .iter()
                .map(|id| Reference::Id(id.to_hex()))
                .collect()
        };

        // only the top level gets its community expanded
        let community = if depth == 0 {
            butterfly
                .community
                .and_then(|id| self.communities.get(&id))
                .map(|c| Reference::Populated(Box::new(c.clone())))
        } else {
            butterfly.community.map(|id| Reference::Id(id.to_hex()))
        };

        ButterflyView {
            id: butterfly.id.to_hex(),
            text: butterfly.text.clone(),
            parent_id: butterfly.parent_id.map(|id| id.to_hex()),
            author: self
                .authors
                .get(&butterfly.author)
                .map(|a| Reference::Populated(Box::new(a.clone()))),
            community,
            created_at: butterfly.created_at,
            children,
        }
    }
}

#[debug_handler]
pub async fn get_butterfly(
    State(ctx): State<App>,
    Path(id): Path<String>,
) -> Result<Json<ButterflyView>, AppError> {
    let id = parse_id(&id)?;
    let view = load_butterfly_view(ctx.store.as_ref(), id).await?;
    Ok(Json(view))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        butterfly::fixtures::{community, post, reply, user},
        store::InMemoryStore,
    };

    fn populated_children(view: &ButterflyView) -> Vec<&ButterflyView> {
        view.children.iter().filter_map(|c| c.populated()).collect()
    }

    fn author_name(view: &ButterflyView) -> Option<&str> {
        view.author
            .as_ref()
            .and_then(|a| a.populated())
            .map(|a| a.name.as_str())
    }

    #[tokio::test]
    async fn test_view_expands_three_levels() {
        let store = InMemoryStore::new();
        let alice = user("Alice");
        let bob = user("Bob");
        let carol = user("Carol");
        let rustaceans = community("Rustaceans");
        for u in [&alice, &bob, &carol] {
            store.insert_user(u.clone()).await;
        }
        store.insert_community(rustaceans.clone()).await;

        let root = post(&store, &alice, Some(&rustaceans), "root").await;
        let first = reply(&store, &root, &bob, "first").await;
        let second = reply(&store, &root, &carol, "second").await;
        let nested = reply(&store, &first, &carol, "nested").await;
        let deepest = reply(&store, &nested, &alice, "deepest").await;

        let view = load_butterfly_view(&store, root.id).await.unwrap();

        assert_eq!(view.id, root.id.to_hex());
        assert_eq!(author_name(&view), Some("Alice"));
        assert_eq!(
            view.community
                .as_ref()
                .and_then(|c| c.populated())
                .map(|c| c.name.as_str()),
            Some("Rustaceans")
        );

        let level_one = populated_children(&view);
        assert_eq!(
            level_one.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
            vec![first.id.to_hex(), second.id.to_hex()]
        );
        assert_eq!(author_name(level_one[0]), Some("Bob"));
        assert_eq!(author_name(level_one[1]), Some("Carol"));

        let level_two = populated_children(level_one[0]);
        assert_eq!(level_two.len(), 1);
        assert_eq!(level_two[0].id, nested.id.to_hex());
        assert_eq!(author_name(level_two[0]), Some("Carol"));

        assert_eq!(
            level_two[0].children,
            vec![Reference::Id(deepest.id.to_hex())],
            "Replies below the second level should stay unexpanded"
        );
    }

    #[tokio::test]
    async fn test_view_missing_butterfly() {
        let store = InMemoryStore::new();
        let missing = ObjectId::new();

        let result = load_butterfly_view(&store, missing).await;
        assert!(matches!(result, Err(ButterflyError::NotFound { id, .. }) if id == missing));
    }

    #[tokio::test]
    async fn test_view_with_deleted_author() {
        let store = InMemoryStore::new();
        let ghost = user("Ghost");
        let root = post(&store, &ghost, None, "boo").await;

        let view = load_butterfly_view(&store, root.id).await.unwrap();
        assert_eq!(view.author, None);
        assert_eq!(view.community, None);
    }

    #[tokio::test]
    async fn test_view_fetch_error() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);

        let err = load_butterfly_view(&store, ObjectId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ButterflyError::Fetch(_)));
        assert!(err.to_string().starts_with("Unable to fetch butterfly"));
    }

    #[test]
    fn test_reference_serializes_untagged() {
        let id = ObjectId::new();
        let reference: Reference<AccountSummary> = Reference::Id(id.to_hex());
        assert_eq!(
            serde_json::to_value(&reference).unwrap(),
            serde_json::json!(id.to_hex())
        );

        let summary = AccountSummary {
            id,
            external_id: "user_1".into(),
            name: "Alice".into(),
            image: None,
        };
        let reference = Reference::Populated(Box::new(summary));
        assert_eq!(
            serde_json::to_value(&reference).unwrap(),
            serde_json::json!({
                "_id": id.to_hex(),
                "id": "user_1",
                "name": "Alice",
                "image": null,
            })
        );
    }
}
