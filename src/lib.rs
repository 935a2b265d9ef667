//! wxgate — official-account callback gateway.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod phrases;
pub mod server;
pub mod workers;
