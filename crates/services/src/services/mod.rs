//! Authorization, change audit and notification core of the task board.
//!
//! - [`access`] and [`access_grants`] decide and manage who may touch a board.
//! - [`change_audit`] keeps the append-only history of entity changes.
//! - [`subscriptions`] and [`notifications`] fan change events out to subscribers.
//! - [`board_core`] bundles them for entity services on the write path.

pub mod access;
pub mod access_grants;
pub mod board_core;
pub mod change_audit;
pub mod config;
pub mod error;
pub mod mail;
pub mod notifications;
pub mod subscriptions;
pub mod user_directory;
