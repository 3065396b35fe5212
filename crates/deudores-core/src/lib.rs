//! Core library for the debtor console.
//!
//! - `auth`: bearer token inspection, the session context and token storage
//! - `monitor`: the inactivity monitor that challenges and logs out idle users
//! - `api`: REST client for the authentication and debtor endpoints
//! - `models`: debtor records, filtering, sorting and CSV export
//! - `config`: persisted settings with environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod monitor;

pub use api::{ApiClient, ApiError};
pub use auth::{is_expired, Session, TokenStore};
pub use config::Config;
pub use monitor::{InactivityMonitor, InputEvent, MonitorAction, MonitorConfig, Phase};
