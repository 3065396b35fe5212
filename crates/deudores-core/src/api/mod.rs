//! REST API client module for the debtor backend.
//!
//! This module provides the `ApiClient` for logging in and for the debtor
//! endpoints (list, history, create, update, delete, pay installment).
//!
//! Every authenticated call carries the bearer token in an `Authorization`
//! header and is refused locally once the token has expired.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
