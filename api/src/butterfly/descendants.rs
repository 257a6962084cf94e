use std::collections::{HashMap, HashSet};

use bson::oid::ObjectId;

use crate::store::{ButterflyStore, StoreError};

use super::models::Butterfly;

/// Every reply below `root`, in pre-order: each reply comes right before its
/// own replies, and a reply's whole subtree comes before its next sibling.
/// Siblings keep the store's natural order.
///
/// The tree is walked one level at a time, so this costs one store round trip
/// per level instead of one per reply.
pub async fn resolve_descendants(
    store: &dyn ButterflyStore,
    root: ObjectId,
) -> Result<Vec<Butterfly>, StoreError> {
    let mut replies_by_parent: HashMap<ObjectId, Vec<Butterfly>> = HashMap::new();
    let mut seen = HashSet::from([root]);
    let mut frontier = vec![root];

    while !frontier.is_empty() {
        let replies = store.find_replies(&frontier).await?;
        frontier = Vec::with_capacity(replies.len());

        for reply in replies {
            // parent links are never reassigned, so this only trips on
            // corrupted data
            if !seen.insert(reply.id) {
                tracing::warn!(id = %reply.id, "Butterfly reached twice while resolving replies");
                continue;
            }

            if let Some(parent) = reply.parent_id {
                frontier.push(reply.id);
                replies_by_parent.entry(parent).or_default().push(reply);
            }
        }
    }

    Ok(flatten_pre_order(root, replies_by_parent))
}

fn flatten_pre_order(
    root: ObjectId,
    mut replies_by_parent: HashMap<ObjectId, Vec<Butterfly>>,
) -> Vec<Butterfly> {
    let mut ordered = Vec::new();
    let mut stack: Vec<Butterfly> = replies_by_parent
        .remove(&root)
        .unwrap_or_default()
        .into_iter()
        .rev()
        .collect();

    while let Some(reply) = stack.pop() {
        if let Some(children) = replies_by_parent.remove(&reply.id) {
            stack.extend(children.into_iter().rev());
        }
        ordered.push(reply);
    }

    ordered
}
