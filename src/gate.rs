//! Admission control for concurrent pipeline runs.
//!
//! The gate is a thin wrapper over a semaphore with fail-fast semantics:
//! `admit` never waits. A granted [`AdmissionToken`] owns its permit, so the
//! slot is returned when the token drops, on every exit path of a run.

use crate::errors::PipelineError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of simultaneously active runs.
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// Proof of admission. Dropping it releases the slot.
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Try to admit a new run. Non-blocking: at the ceiling this returns
    /// `ConcurrencyLimitExceeded` immediately and the caller must retry
    /// later or fail fast.
    pub fn admit(&self) -> Result<AdmissionToken, PipelineError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(AdmissionToken { _permit: permit }),
            Err(_) => Err(PipelineError::ConcurrencyLimitExceeded {
                active: self.active(),
                limit: self.limit,
            }),
        }
    }

    /// Number of currently admitted runs.
    pub fn active(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// The configured ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }
}
