//! Configuration Engine Error Hierarchy
//!
//! Defines the error types for the option registry and merge pipeline,
//! categorized by the layer that raises them: option/slot state, typed-value
//! coercion, and source/decode plumbing.

use std::fmt;

use tracing::error;
use tracing::trace;

use crate::ValueKind;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause for failures raised by user-supplied code (parsers,
/// validators, update hooks, observers, decoders).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Registration and slot-state violations
    #[error(transparent)]
    Opt(#[from] OptError),

    /// Typed-value coercion and validation failures
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Source read, decode and watch failures
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A user callback reported failure; never propagated past the call site
    #[error("{site} callback for option {name:?} failed: {source}")]
    Callback {
        site: &'static str,
        name: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// True for the "dotted key has no matching option" case, which the
    /// merge pipeline treats as benign.
    pub fn is_no_opt(&self) -> bool {
        matches!(self, Error::Opt(OptError::NoOpt { .. }))
    }

    /// True when a write hit a frozen slot.
    pub fn is_frozen(&self) -> bool {
        matches!(self, Error::Opt(OptError::Frozen { .. }))
    }

    /// True when registration collided with an existing name or alias.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::Opt(OptError::Duplicate { .. }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OptError {
    /// Name (or one of its aliases) already registered in the group
    #[error("option {name:?} already registered in group {group:?}")]
    Duplicate { group: String, name: String },

    /// The group exists but holds no option with this name
    #[error("no option {name:?} in group {group:?}")]
    NoOpt { group: String, name: String },

    /// A typed getter asked for a kind the option does not declare
    #[error("option {name:?} in group {group:?} is declared {actual}, not {expected}")]
    KindMismatch {
        group: String,
        name: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// Write attempted on a frozen slot
    #[error("option {name:?} in group {group:?} is frozen")]
    Frozen { group: String, name: String },

    /// Option names are single path segments: non-empty, separator-free
    #[error("invalid option name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// Raw input cannot be coerced into the declared kind
    #[error("cannot coerce {input} into {kind}")]
    Coerce { kind: ValueKind, input: String },

    /// The option's custom parser rejected the raw input
    #[error("parse failed for option {name:?}: {source}")]
    Parse {
        name: String,
        #[source]
        source: BoxError,
    },

    /// A validator rejected the parsed value
    #[error("validation failed for option {name:?}: {source}")]
    Invalid {
        name: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source could not produce a DataSet
    #[error("source {id:?} read failed: {source}")]
    Read {
        id: String,
        #[source]
        source: BoxError,
    },

    /// No decoder registered for the DataSet format
    #[error("no decoder registered for format {format:?} (source {id:?})")]
    NoDecoder { id: String, format: String },

    /// The decoder rejected the raw payload; the payload is kept for diagnosis
    #[error("source {id:?} payload ({format}, {n} bytes) failed to decode: {source}", n = .data.len())]
    Decode {
        id: String,
        format: String,
        data: Vec<u8>,
        #[source]
        source: BoxError,
    },

    /// The source's background watcher failed upstream
    #[error("source {id:?} watch failed: {source}")]
    Watch {
        id: String,
        #[source]
        source: BoxError,
    },
}

/// Sink for errors raised on paths with no synchronous caller, such as
/// watcher pushes and callback failures.
///
/// A handler is always installed: the default one logs through `tracing`,
/// demoting the benign merge errors ([`OptError::NoOpt`],
/// [`OptError::Frozen`]) to trace level. Replacing it requires a
/// constructed handler, so "no handler" is unrepresentable.
pub struct ErrorHandler {
    f: Box<dyn Fn(&Error) + Send + Sync>,
}

impl ErrorHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }

    pub(crate) fn handle(&self, err: &Error) {
        (self.f)(err)
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(|err| {
            if err.is_no_opt() || err.is_frozen() {
                trace!(%err, "ignoring benign merge error");
            } else {
                error!(%err, "configuration error");
            }
        })
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandler").finish_non_exhaustive()
    }
}
