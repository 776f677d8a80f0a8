//! Account registration, login and stateless session tokens.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
