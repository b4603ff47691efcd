//! Persistence layer: entity documents and the tournament store abstraction.

pub mod models;
pub mod storage;
pub mod tournament_store;
