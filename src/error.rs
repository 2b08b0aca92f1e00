//! Error types for sorting jobs and compute backends.
//!
//! Backends report [`DeviceError`]. The engine wraps those into a
//! [`SortError`] that carries the phase of the job in which the failure
//! happened, so a caller sees exactly one terminal error per job.

use std::fmt;

use crate::schedule::PassDescriptor;

/// Failure reported by a compute backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no compute device: {0}")]
    Unavailable(String),

    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("readback failed: {0}")]
    Readback(String),
}

impl DeviceError {
    pub fn unavailable<T: ToString>(msg: T) -> Self {
        DeviceError::Unavailable(msg.to_string())
    }

    pub fn allocation<T: ToString>(msg: T) -> Self {
        DeviceError::Allocation(msg.to_string())
    }

    pub fn dispatch<T: ToString>(msg: T) -> Self {
        DeviceError::Dispatch(msg.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        DeviceError::Readback(msg.to_string())
    }
}

/// Phase of a job in which a device operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureContext {
    Allocate,
    Upload,
    Pass(PassDescriptor),
    Snapshot(PassDescriptor),
    FinalReadback,
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureContext::Allocate => write!(f, "allocating buffers"),
            FailureContext::Upload => write!(f, "uploading input"),
            FailureContext::Pass(pass) => write!(f, "pass {pass}"),
            FailureContext::Snapshot(pass) => write!(f, "snapshot after pass {pass}"),
            FailureContext::FinalReadback => write!(f, "final readback"),
        }
    }
}

/// Terminal failure of a sort job or of device acquisition.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SortError {
    /// Rejected before any device resource was touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The compute device could not be acquired. Fatal to the session.
    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),

    /// A device operation failed mid-job. No partial result exists.
    #[error("kernel execution failed during {context}: {source}")]
    KernelExecution {
        context: FailureContext,
        #[source]
        source: DeviceError,
    },
}

impl SortError {
    pub fn invalid_input<T: ToString>(msg: T) -> Self {
        SortError::InvalidInput(msg.to_string())
    }

    pub(crate) fn kernel(context: FailureContext) -> impl FnOnce(DeviceError) -> Self {
        move |source| SortError::KernelExecution { context, source }
    }

    /// The pass that was executing when the job failed, if any.
    pub fn failed_pass(&self) -> Option<PassDescriptor> {
        match self {
            SortError::KernelExecution {
                context: FailureContext::Pass(pass) | FailureContext::Snapshot(pass),
                ..
            } => Some(*pass),
            _ => None,
        }
    }
}

/// Result type alias for sorting operations.
pub type SortResult<T> = Result<T, SortError>;
