use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use futures_util::TryStreamExt;
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::Deserialize;

use crate::butterfly::models::{AccountSummary, Butterfly, Community, User};

use super::{ButterflyStore, Purge, PurgeReport, StoreError};

const BUTTERFLIES: &str = "butterflies";
const USERS: &str = "users";
const COMMUNITIES: &str = "communities";

#[derive(Deserialize)]
struct IdOnly {
    #[serde(rename = "_id")]
    id: ObjectId,
}

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    // Multi-document transactions need a replica set or a sharded cluster
    transactions: bool,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str, transactions: bool) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);

        Ok(Self {
            client,
            db,
            transactions,
        })
    }

    /// Creates the indexes the reply walk and the feed depend on.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.butterflies()
            .create_index(IndexModel::builder().keys(doc! { "parentId": 1 }).build())
            .await?;
        self.butterflies()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "parentId": 1, "createdAt": -1 })
                    .build(),
            )
            .await?;
        self.communities()
            .create_index(IndexModel::builder().keys(doc! { "id": 1 }).build())
            .await?;

        Ok(())
    }

    fn butterflies(&self) -> Collection<Butterfly> {
        self.db.collection(BUTTERFLIES)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn communities(&self) -> Collection<Community> {
        self.db.collection(COMMUNITIES)
    }

    async fn summaries(
        &self,
        collection: &str,
        ids: &[ObjectId],
    ) -> Result<Vec<AccountSummary>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let summaries = self
            .db
            .collection::<AccountSummary>(collection)
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .projection(doc! { "_id": 1, "id": 1, "name": 1, "image": 1 })
            .await?
            .try_collect()
            .await?;

        Ok(summaries)
    }

    /// Starts a session, and a transaction on it when enabled. Sessions also
    /// work on standalone servers, so the writes always go through one.
    async fn begin(&self) -> Result<ClientSession, StoreError> {
        let mut session = self.client.start_session().await?;
        if self.transactions {
            session.start_transaction().await?;
        }
        Ok(session)
    }

    async fn finish<T>(
        &self,
        mut session: ClientSession,
        result: Result<T, mongodb::error::Error>,
    ) -> Result<T, StoreError> {
        match result {
            Ok(value) => {
                if self.transactions {
                    session.commit_transaction().await?;
                }
                Ok(value)
            }
            Err(e) => {
                if self.transactions {
                    if let Err(abort_err) = session.abort_transaction().await {
                        tracing::warn!(error = %abort_err, "Failed to abort transaction");
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn publish_in(
        &self,
        butterfly: &Butterfly,
        session: &mut ClientSession,
    ) -> Result<(), mongodb::error::Error> {
        self.butterflies()
            .insert_one(butterfly)
            .session(&mut *session)
            .await?;

        self.users()
            .update_one(
                doc! { "_id": butterfly.author },
                doc! { "$push": { "butterfly": butterfly.id } },
            )
            .session(&mut *session)
            .await?;

        if let Some(community) = butterfly.community {
            self.communities()
                .update_one(
                    doc! { "_id": community },
                    doc! { "$push": { "butterfly": butterfly.id } },
                )
                .session(&mut *session)
                .await?;
        }

        Ok(())
    }

    async fn append_reply_in(
        &self,
        parent: ObjectId,
        reply: &Butterfly,
        session: &mut ClientSession,
    ) -> Result<bool, mongodb::error::Error> {
        // Push first so a vanished parent leaves nothing behind
        let pushed = self
            .butterflies()
            .update_one(
                doc! { "_id": parent },
                doc! { "$push": { "children": reply.id } },
            )
            .session(&mut *session)
            .await?;

        if pushed.matched_count == 0 {
            return Ok(false);
        }

        self.butterflies()
            .insert_one(reply)
            .session(&mut *session)
            .await?;

        Ok(true)
    }

    async fn purge_in(
        &self,
        purge: &Purge,
        session: &mut ClientSession,
    ) -> Result<PurgeReport, mongodb::error::Error> {
        let ids = purge.butterflies.to_vec();
        let pull = doc! { "$pull": { "butterfly": { "$in": ids.clone() } } };
        let mut report = PurgeReport::default();

        // Secondary indexes first, so that without a transaction a reader can
        // never see a reference to an already deleted butterfly
        if !purge.authors.is_empty() {
            report.users_updated = self
                .users()
                .update_many(doc! { "_id": { "$in": purge.authors.to_vec() } }, pull.clone())
                .session(&mut *session)
                .await?
                .modified_count;
        }

        if !purge.communities.is_empty() {
            report.communities_updated = self
                .communities()
                .update_many(
                    doc! { "_id": { "$in": purge.communities.to_vec() } },
                    pull,
                )
                .session(&mut *session)
                .await?
                .modified_count;
        }

        report.deleted = self
            .butterflies()
            .delete_many(doc! { "_id": { "$in": ids } })
            .session(&mut *session)
            .await?
            .deleted_count;

        Ok(report)
    }
}

#[async_trait]
impl ButterflyStore for MongoStore {
    async fn find_butterfly(&self, id: ObjectId) -> Result<Option<Butterfly>, StoreError> {
        Ok(self.butterflies().find_one(doc! { "_id": id }).await?)
    }

    async fn find_butterflies(&self, ids: &[ObjectId]) -> Result<Vec<Butterfly>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Ok(self
            .butterflies()
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?
            .try_collect()
            .await?)
    }

    async fn find_replies(&self, parents: &[ObjectId]) -> Result<Vec<Butterfly>, StoreError> {
        if parents.is_empty() {
            return Ok(vec![]);
        }

        Ok(self
            .butterflies()
            .find(doc! { "parentId": { "$in": parents.to_vec() } })
            .await?
            .try_collect()
            .await?)
    }

    async fn find_top_level(&self, skip: u64, limit: i64) -> Result<Vec<Butterfly>, StoreError> {
        // `null` also matches documents without the field
        Ok(self
            .butterflies()
            .find(doc! { "parentId": null })
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .skip(skip)
            .limit(limit)
            .await?
            .try_collect()
            .await?)
    }

    async fn count_top_level(&self) -> Result<u64, StoreError> {
        Ok(self
            .butterflies()
            .count_documents(doc! { "parentId": null })
            .await?)
    }

    async fn find_user(&self, id: ObjectId) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "_id": id }).await?)
    }

    async fn find_community(&self, id: ObjectId) -> Result<Option<Community>, StoreError> {
        Ok(self.communities().find_one(doc! { "_id": id }).await?)
    }

    async fn find_user_summaries(
        &self,
        ids: &[ObjectId],
    ) -> Result<Vec<AccountSummary>, StoreError> {
        self.summaries(USERS, ids).await
    }

    async fn find_community_summaries(
        &self,
        ids: &[ObjectId],
    ) -> Result<Vec<AccountSummary>, StoreError> {
        self.summaries(COMMUNITIES, ids).await
    }

    async fn find_community_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ObjectId>, StoreError> {
        let found = self
            .db
            .collection::<IdOnly>(COMMUNITIES)
            .find_one(doc! { "id": external_id })
            .projection(doc! { "_id": 1 })
            .await?;

        Ok(found.map(|c| c.id))
    }

    async fn publish(&self, butterfly: &Butterfly) -> Result<(), StoreError> {
        let mut session = self.begin().await?;
        let result = self.publish_in(butterfly, &mut session).await;
        self.finish(session, result).await
    }

    async fn append_reply(&self, parent: ObjectId, reply: &Butterfly) -> Result<bool, StoreError> {
        let mut session = self.begin().await?;
        let result = self.append_reply_in(parent, reply, &mut session).await;
        self.finish(session, result).await
    }

    async fn purge(&self, purge: &Purge) -> Result<PurgeReport, StoreError> {
        let mut session = self.begin().await?;
        let result = self.purge_in(purge, &mut session).await;
        self.finish(session, result).await
    }
}
