//! Wire-level data transfer objects and their validation helpers.

pub mod health;
pub mod projection;
pub mod validation;
pub mod ws;
