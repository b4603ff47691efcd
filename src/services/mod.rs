//! Service layer: session lifecycle, ring and match coordination, storage
//! supervision and the supporting plumbing.

pub mod documentation;
pub mod health_service;
pub mod match_service;
pub mod ring_service;
pub mod session_service;
pub mod storage_supervisor;
pub mod tournament_service;
pub mod websocket_service;
pub mod ws_events;
