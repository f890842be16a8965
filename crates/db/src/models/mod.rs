//! Database models for the task-board access, audit and notification core.
//!
//! - [`user`] and [`board`] are read-mostly views of tables owned by other services.
//! - [`board_access`] holds explicit grants.
//! - [`change_log`] is the append-only audit trail.
//! - [`alert_subscription`] and [`notification`] back the notification fan-out.

pub mod alert_subscription;
pub mod board;
pub mod board_access;
pub mod change_log;
pub mod notification;
pub mod user;
