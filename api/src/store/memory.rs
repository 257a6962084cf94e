use std::{
    collections::{BTreeMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bson::oid::ObjectId;
use tokio::sync::RwLock;

use crate::butterfly::models::{AccountSummary, Butterfly, Community, User};

use super::{ButterflyStore, Purge, PurgeReport, StoreError};

#[derive(Default)]
struct Collections {
    // ObjectIds generated in one process are increasing, so key order doubles
    // as insertion order
    butterflies: BTreeMap<ObjectId, Butterfly>,
    users: BTreeMap<ObjectId, User>,
    communities: BTreeMap<ObjectId, Community>,
}

/// A store kept entirely in process memory. Every write holds the single
/// write lock for its whole duration, which makes the multi-document writes
/// atomic.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<Collections>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn insert_user(&self, user: User) {
        self.collections.write().await.users.insert(user.id, user);
    }

    #[cfg(test)]
    pub async fn insert_community(&self, community: Community) {
        self.collections
            .write()
            .await
            .communities
            .insert(community.id, community);
    }

    /// Inserts a butterfly as-is, without touching any other document.
    #[cfg(test)]
    pub async fn insert_butterfly(&self, butterfly: Butterfly) {
        self.collections
            .write()
            .await
            .butterflies
            .insert(butterfly.id, butterfly);
    }

    #[cfg(test)]
    pub async fn butterfly_count(&self) -> usize {
        self.collections.read().await.butterflies.len()
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`]
    /// until switched back.
    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ButterflyStore for InMemoryStore {
    async fn find_butterfly(&self, id: ObjectId) -> Result<Option<Butterfly>, StoreError> {
        self.check()?;
        Ok(self.collections.read().await.butterflies.get(&id).cloned())
    }

    async fn find_butterflies(&self, ids: &[ObjectId]) -> Result<Vec<Butterfly>, StoreError> {
        self.check()?;
        let wanted: HashSet<&ObjectId> = ids.iter().collect();
        Ok(self
            .collections
            .read()
            .await
            .butterflies
            .values()
            .filter(|b| wanted.contains(&b.id))
            .cloned()
            .collect())
    }

    async fn find_replies(&self, parents: &[ObjectId]) -> Result<Vec<Butterfly>, StoreError> {
        self.check()?;
        let parents: HashSet<&ObjectId> = parents.iter().collect();
        Ok(self
            .collections
            .read()
            .await
            .butterflies
            .values()
            .filter(|b| b.parent_id.as_ref().is_some_and(|p| parents.contains(p)))
            .cloned()
            .collect())
    }

    async fn find_top_level(&self, skip: u64, limit: i64) -> Result<Vec<Butterfly>, StoreError> {
        self.check()?;
        let collections = self.collections.read().await;
        let mut top_level: Vec<&Butterfly> = collections
            .butterflies
            .values()
            .filter(|b| b.is_top_level())
            .collect();
        top_level.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(top_level
            .into_iter()
            .skip(skip as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_top_level(&self) -> Result<u64, StoreError> {
        self.check()?;
        let collections = self.collections.read().await;
        Ok(collections
            .butterflies
            .values()
            .filter(|b| b.is_top_level())
            .count() as u64)
    }

    async fn find_user(&self, id: ObjectId) -> Result<Option<User>, StoreError> {
        self.check()?;
        Ok(self.collections.read().await.users.get(&id).cloned())
    }

    async fn find_community(&self, id: ObjectId) -> Result<Option<Community>, StoreError> {
        self.check()?;
        Ok(self.collections.read().await.communities.get(&id).cloned())
    }

    async fn find_user_summaries(
        &self,
        ids: &[ObjectId],
    ) -> Result<Vec<AccountSummary>, StoreError> {
        self.check()?;
        let collections = self.collections.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| collections.users.get(id))
            .map(AccountSummary::from)
            .collect())
    }

    async fn find_community_summaries(
        &self,
        ids: &[ObjectId],
    ) -> Result<Vec<AccountSummary>, StoreError> {
        self.check()?;
        let collections = self.collections.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| collections.communities.get(id))
            .map(AccountSummary::from)
            .collect())
    }

    async fn find_community_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ObjectId>, StoreError> {
        self.check()?;
        Ok(self
            .collections
            .read()
            .await
            .communities
            .values()
            .find(|c| c.external_id == external_id)
            .map(|c| c.id))
    }

    async fn publish(&self, butterfly: &Butterfly) -> Result<(), StoreError> {
        self.check()?;
        let mut collections = self.collections.write().await;

        if let Some(user) = collections.users.get_mut(&butterfly.author) {
            user.butterfly.push(butterfly.id);
        }
        if let Some(community) = butterfly
            .community
            .and_then(|id| collections.communities.get_mut(&id))
        {
            community.butterfly.push(butterfly.id);
        }
        collections
            .butterflies
            .insert(butterfly.id, butterfly.clone());

        Ok(())
    }

    async fn append_reply(&self, parent: ObjectId, reply: &Butterfly) -> Result<bool, StoreError> {
        self.check()?;
        let mut collections = self.collections.write().await;

        let Some(parent) = collections.butterflies.get_mut(&parent) else {
            return Ok(false);
        };
        parent.children.push(reply.id);
        collections.butterflies.insert(reply.id, reply.clone());

        Ok(true)
    }

    async fn purge(&self, purge: &Purge) -> Result<PurgeReport, StoreError> {
        self.check()?;
        let mut collections = self.collections.write().await;
        let doomed: HashSet<&ObjectId> = purge.butterflies.iter().collect();
        let mut report = PurgeReport::default();

        for id in &purge.authors {
            if let Some(user) = collections.users.get_mut(id) {
                let before = user.butterfly.len();
                user.butterfly.retain(|b| !doomed.contains(b));
                if user.butterfly.len() != before {
                    report.users_updated += 1;
                }
            }
        }

        for id in &purge.communities {
            if let Some(community) = collections.communities.get_mut(id) {
                let before = community.butterfly.len();
                community.butterfly.retain(|b| !doomed.contains(b));
                if community.butterfly.len() != before {
                    report.communities_updated += 1;
                }
            }
        }

        for id in &purge.butterflies {
            if collections.butterflies.remove(id).is_some() {
                report.deleted += 1;
            }
        }

        Ok(report)
    }
}
