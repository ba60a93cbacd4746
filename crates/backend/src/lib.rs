//! Client for the hosted auth/database backend.
//!
//! The backend exposes PostgREST-style table endpoints under `/rest/v1` and
//! an auth API under `/auth/v1`. On top of the raw [`BackendClient`] this
//! crate provides:
//!
//! - [`directory`]: users, roles and plans, plus the admin-only user
//!   creation flow
//! - [`usage`]: a usage store and an allowance service backed by tables
//!   and a stored procedure, for the quota guard

pub mod client;
pub mod directory;
pub mod usage;

pub use client::{BackendClient, Filter};
pub use directory::{AdminService, AuthUser, Directory, HttpDirectory, NewUser};
pub use usage::{BackendAllowance, BackendUsageStore};

/// Errors from the hosted backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend not configured: {0}")]
    NotConfigured(String),

    #[error("backend request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("backend unreachable: {0}")]
    Network(String),

    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl From<BackendError> for labprompt_core::Error {
    fn from(e: BackendError) -> Self {
        labprompt_core::Error::Backend(e.to_string())
    }
}

impl From<BackendError> for labprompt_quota::QuotaError {
    fn from(e: BackendError) -> Self {
        labprompt_quota::QuotaError::Store(e.to_string())
    }
}
