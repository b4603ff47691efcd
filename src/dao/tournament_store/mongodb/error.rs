use thiserror::Error;
use uuid::Uuid;

use crate::dao::storage::StorageError;

pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Errors raised by the MongoDB tournament store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("invalid MongoDB URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to construct MongoDB client")]
    ClientConstruction {
        #[source]
        source: mongodb::error::Error,
    },
    #[error("MongoDB did not answer the initial ping after {attempts} attempts")]
    InitialPing {
        attempts: u32,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("MongoDB health ping failed")]
    HealthPing {
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to save tournament `{id}`")]
    SaveTournament {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to query tournaments")]
    FindTournament {
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to save user `{id}`")]
    SaveUser {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to delete user `{id}`")]
    DeleteUser {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to load users of tournament `{tournament_id}`")]
    LoadUsers {
        tournament_id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to save ring `{id}`")]
    SaveRing {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to load rings of tournament `{tournament_id}`")]
    LoadRings {
        tournament_id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to save match `{id}`")]
    SaveMatch {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to patch match `{id}`")]
    PatchMatch {
        id: Uuid,
        #[source]
        source: mongodb::error::Error,
    },
    #[error("failed to encode value for match `{id}`")]
    Encode {
        id: Uuid,
        #[source]
        source: mongodb::bson::error::Error,
    },
}

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
