// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error taxonomy shared by the geometry engines, the scene and the scheduler

use crate::scene::{NodeId, PropertyError};
use thiserror::Error;

/// Errors surfaced by the public API.
///
/// Invalid geometry is intentionally absent: bad meshes and paths are cleaned
/// best-effort and logged, never reported as failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Cooperative cancellation was observed. Not a failure; callers discard
    /// whatever was in progress and keep their prior state.
    #[error("operation cancelled")]
    Cancelled,

    /// A caller bug such as attaching a node beneath itself.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error("document error: {0}")]
    Document(String),
}

impl Error {
    /// Build a contract violation and log it at the point of detection.
    pub fn contract(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "contract violation");
        Error::ContractViolation(message)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
