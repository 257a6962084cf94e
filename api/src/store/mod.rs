//! Persistence for butterflies and the user/community directories.
//!
//! Every operation receives a [`ButterflyStore`] handle explicitly. Reads are
//! plain filter queries; the three writes that touch more than one document
//! ([`ButterflyStore::publish`], [`ButterflyStore::append_reply`] and
//! [`ButterflyStore::purge`]) are atomic units in every implementation.

use async_trait::async_trait;
use bson::oid::ObjectId;

use crate::butterfly::models::{AccountSummary, Butterfly, Community, User};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Everything removed by a cascading delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Purge {
    /// The root butterfly followed by all of its descendants
    pub butterflies: Vec<ObjectId>,
    /// Users whose `butterfly` list may reference any of `butterflies`
    pub authors: Vec<ObjectId>,
    /// Communities whose `butterfly` list may reference any of `butterflies`
    pub communities: Vec<ObjectId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PurgeReport {
    pub deleted: u64,
    pub users_updated: u64,
    pub communities_updated: u64,
}

#[async_trait]
pub trait ButterflyStore: Send + Sync {
    async fn find_butterfly(&self, id: ObjectId) -> Result<Option<Butterfly>, StoreError>;

    /// Butterflies whose id is in `ids`. Missing ids are skipped and the
    /// result order is the store's natural order, not the order of `ids`.
    async fn find_butterflies(&self, ids: &[ObjectId]) -> Result<Vec<Butterfly>, StoreError>;

    /// Direct replies of any butterfly in `parents`, in the store's natural
    /// order.
    async fn find_replies(&self, parents: &[ObjectId]) -> Result<Vec<Butterfly>, StoreError>;

    /// Top-level butterflies, newest first.
    async fn find_top_level(&self, skip: u64, limit: i64) -> Result<Vec<Butterfly>, StoreError>;

    async fn count_top_level(&self) -> Result<u64, StoreError>;

    async fn find_user(&self, id: ObjectId) -> Result<Option<User>, StoreError>;

    async fn find_community(&self, id: ObjectId) -> Result<Option<Community>, StoreError>;

    async fn find_user_summaries(
        &self,
        ids: &[ObjectId],
    ) -> Result<Vec<AccountSummary>, StoreError>;

    async fn find_community_summaries(
        &self,
        ids: &[ObjectId],
    ) -> Result<Vec<AccountSummary>, StoreError>;

    /// Resolves the identity-provider id of a community to its store id.
    async fn find_community_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ObjectId>, StoreError>;

    /// Inserts a top-level butterfly and pushes its id onto its author's and
    /// community's `butterfly` lists.
    async fn publish(&self, butterfly: &Butterfly) -> Result<(), StoreError>;

    /// Inserts `reply` and appends its id to the end of `parent`'s
    /// `children`. Returns `false` without writing anything when the parent
    /// does not exist.
    async fn append_reply(&self, parent: ObjectId, reply: &Butterfly) -> Result<bool, StoreError>;

    /// Pulls every id in `purge.butterflies` out of the listed users' and
    /// communities' `butterfly` lists, then deletes those butterflies.
    async fn purge(&self, purge: &Purge) -> Result<PurgeReport, StoreError>;
}
