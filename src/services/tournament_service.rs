//! Tournament bootstrap: restore the current day's tournament from storage
//! or persist the freshly created one.

use std::sync::Arc;
use std::time::SystemTime;

use time::{Duration, OffsetDateTime, Time};
use tracing::info;

use crate::{
    dao::tournament_store::TournamentStore,
    error::ServiceError,
    state::{
        SharedState,
        tournament::{Ring, Tournament, User},
    },
};

/// Restore the tournament started today, or persist the bootstrapped one.
///
/// Runs once per process; the supervisor calls it after every storage
/// connection and the flag is re-armed when a restore attempt fails.
pub async fn restore_or_create(
    state: &SharedState,
    store: Arc<dyn TournamentStore>,
) -> Result<(), ServiceError> {
    if !state.mark_bootstrapped() {
        return Ok(());
    }

    let result = restore_or_create_inner(state, store).await;
    if result.is_err() {
        state.clear_bootstrapped();
    }
    result
}

async fn restore_or_create_inner(
    state: &SharedState,
    store: Arc<dyn TournamentStore>,
) -> Result<(), ServiceError> {
    let (day_start, day_end) = current_day_bounds();

    match store
        .find_tournament_started_between(day_start, day_end)
        .await?
    {
        Some(entity) => {
            let ring_entities = store.load_rings(entity.id).await?;
            let user_entities = store.load_users(entity.id).await?;

            let mut rings: Vec<Ring> = ring_entities.iter().map(Ring::from_entity).collect();
            rings.sort_by_key(|ring| ring.index);
            let users = user_entities
                .iter()
                .map(|user| (user.id, User::from_entity(user)))
                .collect();

            let mut tournament = state.tournament().write().await;
            *tournament = Tournament {
                id: entity.id,
                start_date: entity.start_date,
                rings,
                users,
            };
            info!(
                tournament_id = %entity.id,
                rings = tournament.rings.len(),
                users = tournament.users.len(),
                "tournament restored for the current day"
            );
        }
        None => {
            let tournament = state.tournament().read().await;
            store.save_tournament(tournament.to_entity()).await?;
            for ring in &tournament.rings {
                store.save_ring(ring.to_entity(tournament.id)).await?;
            }
            info!(
                tournament_id = %tournament.id,
                rings = tournament.rings.len(),
                "new tournament persisted"
            );
        }
    }
    Ok(())
}

/// UTC day window containing the current moment.
fn current_day_bounds() -> (SystemTime, SystemTime) {
    let start = OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT);
    let end = start + Duration::days(1);
    (start.into(), end.into())
}
