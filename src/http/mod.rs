//! REST surface for the placement service.
//!
//! Handlers parse and validate requests, hand CPU-bound analysis to
//! `spawn_blocking`, and map [`crate::PlacementError`] onto HTTP statuses.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
