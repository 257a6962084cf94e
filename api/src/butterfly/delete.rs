use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
};
use bson::oid::ObjectId;
use serde::Deserialize;

use crate::{
    App,
    error::AppError,
    revalidate::Revalidator,
    store::{ButterflyStore, Purge, PurgeReport},
};

use super::{
    ButterflyError,
    descendants::resolve_descendants,
    routes::{parse_id, validate_path},
};

/// Deletes a butterfly together with every reply below it, and retracts all
/// of their ids from the `butterfly` lists of the users and communities they
/// were attributed to.
pub async fn delete_butterfly(
    store: &dyn ButterflyStore,
    revalidator: &Revalidator,
    id: ObjectId,
    path: &str,
) -> Result<PurgeReport, ButterflyError> {
    const ACTION: &str = "delete butterfly";

    let root = store
        .find_butterfly(id)
        .await
        .map_err(ButterflyError::store(ACTION))?
        .ok_or_else(|| ButterflyError::not_found(id))?;

    let descendants = resolve_descendants(store, id)
        .await
        .map_err(ButterflyError::store(ACTION))?;

    let doomed = std::iter::once(&root).chain(descendants.iter());
    let mut purge = Purge::default();
    for butterfly in doomed {
        purge.butterflies.push(butterfly.id);
        if !purge.authors.contains(&butterfly.author) {
            purge.authors.push(butterfly.author);
        }
        if let Some(community) = butterfly.community {
            if !purge.communities.contains(&community) {
                purge.communities.push(community);
            }
        }
    }

    let report = store
        .purge(&purge)
        .await
        .map_err(ButterflyError::store(ACTION))?;

    tracing::info!(
        %id,
        deleted = report.deleted,
        users_updated = report.users_updated,
        communities_updated = report.communities_updated,
        "Deleted butterfly and its replies"
    );

    revalidator.invalidate(path);

    Ok(report)
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    path: Option<String>,
}

#[debug_handler]
pub async fn delete_butterfly_handler(
    State(ctx): State<App>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<PurgeReport>, AppError> {
    let id = parse_id(&id)?;
    let path = validate_path(query.path.as_deref())?;

    let report = delete_butterfly(ctx.store.as_ref(), &ctx.revalidator, id, path).await?;

    Ok(Json(report))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        butterfly::fixtures::{community, post, reply, user},
        store::InMemoryStore,
    };

    #[tokio::test]
    async fn test_delete_leaf() {
        let store = InMemoryStore::new();
        let revalidator = Revalidator::new();
        let mut revalidations = revalidator.subscribe();
        let alice = user("Alice");
        let bob = user("Bob");
        let rustaceans = community("Rustaceans");
        store.insert_user(alice.clone()).await;
        store.insert_user(bob.clone()).await;
        store.insert_community(rustaceans.clone()).await;

        let kept = post(&store, &alice, Some(&rustaceans), "kept").await;
        let doomed = post(&store, &alice, Some(&rustaceans), "doomed").await;
        let bobs = post(&store, &bob, None, "bob's").await;

        let report = delete_butterfly(&store, &revalidator, doomed.id, "/profile")
            .await
            .unwrap();

        assert_eq!(
            report,
            PurgeReport {
                deleted: 1,
                users_updated: 1,
                communities_updated: 1,
            }
        );
        assert_eq!(store.butterfly_count().await, 2);
        assert_eq!(store.find_user(alice.id).await.unwrap().unwrap().butterfly, vec![kept.id]);
        assert_eq!(store.find_user(bob.id).await.unwrap().unwrap().butterfly, vec![bobs.id]);
        assert_eq!(
            store.find_community(rustaceans.id).await.unwrap().unwrap().butterfly,
            vec![kept.id]
        );
        assert_eq!(revalidations.try_recv().unwrap(), "/profile");
    }

    #[tokio::test]
    async fn test_delete_two_level_thread() {
        let store = InMemoryStore::new();
        let revalidator = Revalidator::new();
        let alice = user("Alice");
        let bob = user("Bob");
        let carol = user("Carol");
        for u in [&alice, &bob, &carol] {
            store.insert_user(u.clone()).await;
        }

        let root = post(&store, &alice, None, "root").await;
        let first = reply(&store, &root, &bob, "first").await;
        reply(&store, &root, &carol, "second").await;
        reply(&store, &first, &alice, "first reply").await;
        let survivor = post(&store, &bob, None, "survivor").await;

        let report = delete_butterfly(&store, &revalidator, root.id, "/")
            .await
            .unwrap();

        assert_eq!(report.deleted, 4);
        assert_eq!(store.butterfly_count().await, 1);
        assert!(store.find_butterfly(survivor.id).await.unwrap().is_some());
        assert!(store.find_user(alice.id).await.unwrap().unwrap().butterfly.is_empty());
        assert_eq!(
            store.find_user(bob.id).await.unwrap().unwrap().butterfly,
            vec![survivor.id]
        );
    }

    #[tokio::test]
    async fn test_delete_reply_keeps_parent() {
        let store = InMemoryStore::new();
        let revalidator = Revalidator::new();
        let alice = user("Alice");
        let root = post(&store, &alice, None, "root").await;
        let child = reply(&store, &root, &alice, "child").await;
        reply(&store, &child, &alice, "grandchild").await;

        let report = delete_butterfly(&store, &revalidator, child.id, "/butterfly")
            .await
            .unwrap();

        assert_eq!(report.deleted, 2);
        assert!(store.find_butterfly(root.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let store = InMemoryStore::new();
        let revalidator = Revalidator::new();
        let alice = user("Alice");
        store.insert_user(alice.clone()).await;
        let root = post(&store, &alice, None, "root").await;

        delete_butterfly(&store, &revalidator, root.id, "/")
            .await
            .unwrap();
        let mut revalidations = revalidator.subscribe();
        let second = delete_butterfly(&store, &revalidator, root.id, "/").await;

        assert!(matches!(second, Err(ButterflyError::NotFound { id, .. }) if id == root.id));
        assert!(revalidations.try_recv().is_err(), "Nothing should be revalidated");
    }

    #[tokio::test]
    async fn test_delete_reports_store_failure() {
        let store = InMemoryStore::new();
        let revalidator = Revalidator::new();
        store.set_unavailable(true);

        let err = delete_butterfly(&store, &revalidator, ObjectId::new(), "/")
            .await
            .unwrap_err();

        assert!(matches!(err, ButterflyError::Store { action: "delete butterfly", .. }));
        assert!(err.to_string().starts_with("Failed to delete butterfly: "));
    }
}
