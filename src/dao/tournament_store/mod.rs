pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{MatchDataPatch, MatchEntity, RingEntity, TournamentEntity, UserEntity};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for tournaments, users, rings and
/// matches.
///
/// Every write is an upsert keyed by the entity id, so replaying a save after
/// a reconnect never duplicates documents. Match documents additionally
/// support partial dotted-path patches of their `data` sub-tree.
pub trait TournamentStore: Send + Sync {
    fn save_tournament(&self, tournament: TournamentEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Latest tournament whose start date falls within `[from, to)`.
    fn find_tournament_started_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<TournamentEntity>>>;
    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    fn load_users(&self, tournament_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>>;
    fn save_ring(&self, ring: RingEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn load_rings(&self, tournament_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RingEntity>>>;
    fn save_match(&self, contest: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn update_match_data(
        &self,
        id: Uuid,
        patch: MatchDataPatch,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Test doubles for the store trait.
#[cfg(test)]
pub mod testing {
    use futures::future;

    use super::*;

    /// Store that accepts every write and finds nothing, so service tests can
    /// run the full guard-persist-commit path without a database.
    pub struct NullTournamentStore;

    impl TournamentStore for NullTournamentStore {
        fn save_tournament(
            &self,
            _tournament: TournamentEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn find_tournament_started_between(
            &self,
            _from: SystemTime,
            _to: SystemTime,
        ) -> BoxFuture<'static, StorageResult<Option<TournamentEntity>>> {
            Box::pin(future::ready(Ok(None)))
        }

        fn save_user(&self, _user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn delete_user(&self, _id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn load_users(
            &self,
            _tournament_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
            Box::pin(future::ready(Ok(Vec::new())))
        }

        fn save_ring(&self, _ring: RingEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn load_rings(
            &self,
            _tournament_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<RingEntity>>> {
            Box::pin(future::ready(Ok(Vec::new())))
        }

        fn save_match(&self, _contest: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn update_match_data(
            &self,
            _id: Uuid,
            _patch: MatchDataPatch,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }
    }
}
