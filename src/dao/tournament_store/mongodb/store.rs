use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, Document, doc, serialize_to_bson as to_bson},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoMatchDocument, MongoRingDocument, MongoTournamentDocument, MongoUserDocument, doc_id,
        uuid_as_binary,
    },
};
use crate::dao::{
    models::{MatchDataPatch, MatchEntity, RingEntity, TournamentEntity, UserEntity},
    storage::StorageResult,
    tournament_store::TournamentStore,
};

const TOURNAMENT_COLLECTION_NAME: &str = "tournaments";
const USER_COLLECTION_NAME: &str = "users";
const RING_COLLECTION_NAME: &str = "rings";
const MATCH_COLLECTION_NAME: &str = "matches";

#[derive(Clone)]
pub struct MongoTournamentStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoTournamentStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let tournaments = database.collection::<Document>(TOURNAMENT_COLLECTION_NAME);
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"start_date": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("tournament_start_date_idx".to_owned()))
                    .build(),
            )
            .build();
        tournaments
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TOURNAMENT_COLLECTION_NAME,
                index: "start_date",
                source,
            })?;

        let users = database.collection::<Document>(USER_COLLECTION_NAME);
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"tournament_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("user_tournament_idx".to_owned()))
                    .build(),
            )
            .build();
        users
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: USER_COLLECTION_NAME,
                index: "tournament_id",
                source,
            })?;

        let rings = database.collection::<Document>(RING_COLLECTION_NAME);
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"tournament_id": 1, "index": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("ring_tournament_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        rings
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RING_COLLECTION_NAME,
                index: "tournament_id,index",
                source,
            })?;

        let matches = database.collection::<Document>(MATCH_COLLECTION_NAME);
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"ring_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("match_ring_idx".to_owned()))
                    .build(),
            )
            .build();
        matches
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MATCH_COLLECTION_NAME,
                index: "ring_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn tournament_collection(&self) -> Collection<MongoTournamentDocument> {
        self.database()
            .await
            .collection(TOURNAMENT_COLLECTION_NAME)
    }

    async fn user_collection(&self) -> Collection<MongoUserDocument> {
        self.database().await.collection(USER_COLLECTION_NAME)
    }

    async fn ring_collection(&self) -> Collection<MongoRingDocument> {
        self.database().await.collection(RING_COLLECTION_NAME)
    }

    async fn match_collection(&self) -> Collection<MongoMatchDocument> {
        self.database().await.collection(MATCH_COLLECTION_NAME)
    }

    async fn save_tournament(&self, tournament: TournamentEntity) -> MongoResult<()> {
        let id = tournament.id;
        let document: MongoTournamentDocument = tournament.into();
        self.tournament_collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveTournament { id, source })?;
        Ok(())
    }

    async fn find_tournament_started_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> MongoResult<Option<TournamentEntity>> {
        let filter = doc! {
            "start_date": {
                "$gte": DateTime::from_system_time(from),
                "$lt": DateTime::from_system_time(to),
            }
        };

        let document = self
            .tournament_collection()
            .await
            .find_one(filter)
            .sort(doc! {"start_date": -1})
            .await
            .map_err(|source| MongoDaoError::FindTournament { source })?;

        Ok(document.map(Into::into))
    }

    async fn save_user(&self, user: UserEntity) -> MongoResult<()> {
        let id = user.id;
        let document: MongoUserDocument = user.into();
        self.user_collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveUser { id, source })?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> MongoResult<()> {
        self.user_collection()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteUser { id, source })?;
        Ok(())
    }

    async fn load_users(&self, tournament_id: Uuid) -> MongoResult<Vec<UserEntity>> {
        let documents: Vec<MongoUserDocument> = self
            .user_collection()
            .await
            .find(doc! {"tournament_id": uuid_as_binary(tournament_id)})
            .await
            .map_err(|source| MongoDaoError::LoadUsers {
                tournament_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadUsers {
                tournament_id,
                source,
            })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_ring(&self, ring: RingEntity) -> MongoResult<()> {
        let id = ring.id;
        let document: MongoRingDocument = ring.into();
        self.ring_collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRing { id, source })?;
        Ok(())
    }

    async fn load_rings(&self, tournament_id: Uuid) -> MongoResult<Vec<RingEntity>> {
        let documents: Vec<MongoRingDocument> = self
            .ring_collection()
            .await
            .find(doc! {"tournament_id": uuid_as_binary(tournament_id)})
            .sort(doc! {"index": 1})
            .await
            .map_err(|source| MongoDaoError::LoadRings {
                tournament_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadRings {
                tournament_id,
                source,
            })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_match(&self, contest: MatchEntity) -> MongoResult<()> {
        let id = contest.id;
        let document: MongoMatchDocument = contest.into();
        self.match_collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;
        Ok(())
    }

    /// Merge a partial update into the match document's `data` sub-tree
    /// using dotted paths, so unrelated fields are left alone.
    async fn update_match_data(&self, id: Uuid, patch: MatchDataPatch) -> MongoResult<()> {
        let mut set = Document::new();

        if let Some(state) = patch.state {
            set.insert("data.state", state);
        }
        if let Some(round) = patch.round {
            set.insert("data.round", round);
        }
        if let Some(period) = patch.period {
            set.insert("data.period", period);
        }
        if let Some(periods) = patch.periods {
            let value =
                to_bson(&periods).map_err(|source| MongoDaoError::Encode { id, source })?;
            set.insert("data.periods", value);
        }
        if let Some(winner) = patch.winner {
            set.insert("data.winner", winner);
        }
        if let Some(timers) = patch.timers {
            set.insert("data.timers.round", timers.round);
            set.insert("data.timers.injury", timers.injury);
        }
        for (judge_id, period, sheet) in patch.sheets {
            let value = to_bson(&sheet).map_err(|source| MongoDaoError::Encode { id, source })?;
            set.insert(format!("data.scoreboards.{judge_id}.{period}"), value);
        }
        for (period, penalties) in patch.penalties {
            let value =
                to_bson(&penalties).map_err(|source| MongoDaoError::Encode { id, source })?;
            set.insert(format!("data.penalties.{period}"), value);
        }
        for (period, maluses) in patch.maluses {
            let value =
                to_bson(&maluses.to_vec()).map_err(|source| MongoDaoError::Encode { id, source })?;
            set.insert(format!("data.maluses.{period}"), value);
        }

        if set.is_empty() {
            return Ok(());
        }

        self.match_collection()
            .await
            .update_one(doc_id(id), doc! {"$set": set})
            .await
            .map_err(|source| MongoDaoError::PatchMatch { id, source })?;
        Ok(())
    }
}

impl TournamentStore for MongoTournamentStore {
    fn save_tournament(
        &self,
        tournament: TournamentEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_tournament(tournament).await.map_err(Into::into) })
    }

    fn find_tournament_started_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<TournamentEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_tournament_started_between(from, to)
                .await
                .map_err(Into::into)
        })
    }

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_user(user).await.map_err(Into::into) })
    }

    fn delete_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_user(id).await.map_err(Into::into) })
    }

    fn load_users(
        &self,
        tournament_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_users(tournament_id).await.map_err(Into::into) })
    }

    fn save_ring(&self, ring: RingEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_ring(ring).await.map_err(Into::into) })
    }

    fn load_rings(
        &self,
        tournament_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<RingEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_rings(tournament_id).await.map_err(Into::into) })
    }

    fn save_match(&self, contest: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_match(contest).await.map_err(Into::into) })
    }

    fn update_match_data(
        &self,
        id: Uuid,
        patch: MatchDataPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_match_data(id, patch).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
