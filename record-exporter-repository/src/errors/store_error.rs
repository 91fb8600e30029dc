//! Store error types.
//!
//! This module defines the error types that can occur while talking to the
//! search store.

use thiserror::Error;

/// Errors that can occur during search store operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store could not be reached or the request timed out.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The store answered with a non-success status for the whole request.
    #[error("Request rejected with status {status}: {reason}")]
    RequestRejected { status: u16, reason: String },

    /// The bulk request was accepted but some of its items failed.
    #[error("Bulk request had {failed} failed of {total} items, first failure: {first_failure}")]
    BulkItemsFailed {
        failed: usize,
        total: usize,
        first_failure: String,
    },

    /// Failed to create or read a component or index template.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Failed to read or update index settings.
    #[error("Settings error: {0}")]
    SettingsError(String),

    /// Failed to create or read the lifecycle policy.
    #[error("Lifecycle policy error: {0}")]
    PolicyError(String),

    /// Failed to parse a response from the store.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl StoreError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a rejected request error.
    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self::RequestRejected {
            status,
            reason: reason.into(),
        }
    }

    /// Create a template error.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::TemplateError(msg.into())
    }

    /// Create a settings error.
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::SettingsError(msg.into())
    }

    /// Create a lifecycle policy error.
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::PolicyError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }
}
