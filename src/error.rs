//! Error taxonomy for the VSS reader.
//!
//! Mirrors `libvshadow`'s five error domains (arguments, I/O, input,
//! runtime, memory) as a single `thiserror` enum instead of a reified
//! `(domain, code, message)` frame stack: each variant carries a location
//! tag naming the failing operation and an optional boxed cause, so a
//! caller can walk [`VssError::causes`] to print the same kind of chain the
//! original's `libcerror` stack exposed.

use std::error::Error as StdError;
use std::fmt;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Sub-kind for [`VssError::Argument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentErrorKind {
    /// A required value was missing or null.
    NullValue,
    /// A value fell outside the allowed range (e.g. a store index).
    OutOfBounds,
    /// A `seek` whence value other than start/current/end.
    UnsupportedWhence,
    /// Some other malformed argument.
    InvalidValue,
}

impl fmt::Display for ArgumentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgumentErrorKind::NullValue => "null value",
            ArgumentErrorKind::OutOfBounds => "value out of bounds",
            ArgumentErrorKind::UnsupportedWhence => "unsupported seek whence",
            ArgumentErrorKind::InvalidValue => "invalid value",
        };
        f.write_str(s)
    }
}

/// Sub-kind for [`VssError::Input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorKind {
    /// The 16-byte VSS signature did not match at a record header.
    SignatureMismatch,
    /// A self-referential offset field disagreed with the read position.
    ValueMismatch,
    /// A block descriptor or catalog entry had an internally inconsistent
    /// combination of fields (e.g. an unrecognized catalog entry type).
    InvalidDescriptor,
}

impl fmt::Display for InputErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputErrorKind::SignatureMismatch => "signature mismatch",
            InputErrorKind::ValueMismatch => "self-offset value mismatch",
            InputErrorKind::InvalidDescriptor => "invalid descriptor",
        };
        f.write_str(s)
    }
}

/// Sub-kind for [`VssError::Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// A forwarding chain revisited a store, or some other unsupported
    /// combination of otherwise-valid values was encountered.
    UnsupportedValue,
    /// [`crate::Volume::signal_abort`] was called and a caller observed it.
    AbortRequested,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeErrorKind::UnsupportedValue => "unsupported value",
            RuntimeErrorKind::AbortRequested => "abort requested",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VssError {
    #[error("{location}: invalid argument: {kind}")]
    Argument {
        location: &'static str,
        kind: ArgumentErrorKind,
    },

    #[error("{location}: I/O error: {source}")]
    Io {
        location: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{location}: {kind}")]
    Input {
        location: &'static str,
        kind: InputErrorKind,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("{location}: {kind}")]
    Runtime {
        location: &'static str,
        kind: RuntimeErrorKind,
    },

    #[error("{location}: memory allocation failed: {message}")]
    Memory {
        location: &'static str,
        message: String,
    },
}

impl VssError {
    pub fn argument(location: &'static str, kind: ArgumentErrorKind) -> Self {
        VssError::Argument { location, kind }
    }

    pub fn io(location: &'static str, source: std::io::Error) -> Self {
        VssError::Io { location, source }
    }

    pub fn input(location: &'static str, kind: InputErrorKind) -> Self {
        VssError::Input {
            location,
            kind,
            cause: None,
        }
    }

    pub fn input_with_cause(
        location: &'static str,
        kind: InputErrorKind,
        cause: impl StdError + Send + Sync + 'static,
    ) -> Self {
        VssError::Input {
            location,
            kind,
            cause: Some(Box::new(cause)),
        }
    }

    pub fn runtime(location: &'static str, kind: RuntimeErrorKind) -> Self {
        VssError::Runtime { location, kind }
    }

    pub fn memory(location: &'static str, message: impl Into<String>) -> Self {
        VssError::Memory {
            location,
            message: message.into(),
        }
    }

    /// Iterate this error and each of its wrapped causes, outermost first.
    pub fn causes(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        std::iter::successors(Some(self as &(dyn StdError + 'static)), |e| e.source())
    }
}

pub type Result<T> = std::result::Result<T, VssError>;
