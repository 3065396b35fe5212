//! Authentication module for managing the bearer token and its storage.
//!
//! This module provides:
//! - `is_expired`: fail-closed expiry inspection of a JWT-shaped token
//! - `Session`: the explicit session context owning the stored token
//! - `TokenStore`: storage backends (file, OS keychain, memory)
//!
//! Signatures are never verified here; that is the server's job.

pub mod session;
pub mod store;
pub mod token;

pub use session::Session;
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};
pub use token::{decode_claims, expires_at, is_expired, is_expired_at, TokenClaims, TokenError};
