// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error type shared by every fallible operation in the crate.
//!
//! Errors fall in two groups.  Programmer errors ([`ErrorKind::InvalidState`],
//! [`ErrorKind::ResourceTypeMismatch`], [`ErrorKind::MissingDynamicOffset`],
//! [`ErrorKind::LayoutMismatch`] and [`ErrorKind::UnsupportedOperation`]) mean a
//! contract was violated; they are never retried and the operation leaves no
//! partial native state behind.  [`ErrorKind::AllocationFailure`] fails only the
//! triggering operation; the command list stays usable and may be
//! [`reset`](crate::commands::CommandList::reset) and re-recorded.

use crate::bindings::layout::ResourceKind;
use crate::commands::CommandListState;

/// The coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidState,
    ResourceTypeMismatch,
    MissingDynamicOffset,
    LayoutMismatch,
    UnsupportedOperation,
    AllocationFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A command list operation was issued in a lifecycle state that does not allow it.
    #[error("{operation} is not allowed while the command list is {state:?}")]
    WrongLifecycle {
        operation: &'static str,
        state: CommandListState,
    },
    /// Some other state-machine contract was violated (no pipeline bound, out-of-bounds copy, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The bound object cannot serve the kind its layout entry declares.
    #[error("element {element} is declared {expected:?} but the bound object {found}")]
    ResourceTypeMismatch {
        element: usize,
        expected: ResourceKind,
        found: String,
    },
    /// The number of dynamic offsets does not match the layout's dynamic entries.
    #[error("layout declares {expected} dynamic offsets but {provided} were supplied")]
    MissingDynamicOffset { expected: usize, provided: usize },
    /// Resource count or kind does not correspond to the layout.
    #[error("layout mismatch: {0}")]
    LayoutMismatch(String),
    /// The active backend cannot express the request.
    #[error("unsupported by {backend}: {what}")]
    UnsupportedOperation { backend: String, what: String },
    /// A native object could not be created.
    #[error("could not allocate {0}")]
    AllocationFailure(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WrongLifecycle { .. } | Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::ResourceTypeMismatch { .. } => ErrorKind::ResourceTypeMismatch,
            Error::MissingDynamicOffset { .. } => ErrorKind::MissingDynamicOffset,
            Error::LayoutMismatch(_) => ErrorKind::LayoutMismatch,
            Error::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Error::AllocationFailure(_) => ErrorKind::AllocationFailure,
        }
    }

    /// Whether the caller may reasonably reset and retry.
    ///
    /// Only allocation failures qualify; everything else is a contract violation.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::AllocationFailure
    }

    pub(crate) fn unsupported(backend: &str, what: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            backend: backend.to_string(),
            what: what.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let e = Error::WrongLifecycle {
            operation: "end",
            state: CommandListState::Initial,
        };
        assert_eq!(e.kind(), ErrorKind::InvalidState);
        assert!(!e.is_recoverable());
        assert!(e.to_string().contains("end"));

        let e = Error::AllocationFailure("view".to_string());
        assert_eq!(e.kind(), ErrorKind::AllocationFailure);
        assert!(e.is_recoverable());

        let e = Error::MissingDynamicOffset {
            expected: 2,
            provided: 1,
        };
        assert_eq!(
            e.to_string(),
            "layout declares 2 dynamic offsets but 1 were supplied"
        );
    }
}
