use std::error;
use std::fmt;

/// Result type of every fallible operation of the copy phase.
pub type EtlResult<T> = Result<T, EtlError>;

/// Error of the copy phase.
///
/// [`EtlError`] carries an [`ErrorKind`] that callers branch on, a static description and an
/// optional dynamic detail. Several errors can be aggregated into one.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    Many(Vec<EtlError>),
}

/// Categories of errors of the copy phase.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Protocol violations, fatal for the current table copy attempt.
    MissingFieldEvent,
    MissingLastKey,
    MissingKeyColumn,
    FastForwardPositionMismatch,
    InvalidPosition,

    // Upstream failures.
    SnapshotSourceFailed,
    LogStreamFailed,
    LogStreamEnded,
    DestinationFailed,
    CheckpointStoreFailed,

    // State & workflow errors.
    MissingTableRule,
    InvalidState,
    CopyWorkerPanic,
    StreamTaskPanic,

    // Configuration errors.
    ConfigError,

    // IO & serialization errors.
    IoError,
    SerializationError,
    DeserializationError,
    ConversionError,

    Unknown,

    /// Raised by an enabled fault injection point.
    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl ErrorKind {
    /// Returns `true` for kinds raised when a snapshot source or the change log breaks the copy
    /// protocol. Retrying the same copy attempt fails the same way.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingFieldEvent
                | ErrorKind::MissingLastKey
                | ErrorKind::MissingKeyColumn
                | ErrorKind::FastForwardPositionMismatch
                | ErrorKind::InvalidPosition
        )
    }
}

impl EtlError {
    fn with_detail(kind: ErrorKind, desc: &'static str, detail: impl ToString) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail.to_string()),
        }
    }

    /// Aggregates multiple errors into one.
    pub fn many(errors: Vec<EtlError>) -> EtlError {
        EtlError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the kind of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns the kinds of all aggregated errors, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the first available dynamic detail.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => write!(f, "{kind:?}: {desc}"),
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                write!(f, "{kind:?}: {desc} -> {detail}")
            }
            ErrorRepr::Many(ref errors) => match errors.as_slice() {
                [] => write!(f, "Multiple errors occurred (empty)"),
                [error] => error.fmt(f),
                errors => {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }

                    Ok(())
                }
            },
        }
    }
}

impl error::Error for EtlError {}

impl From<(ErrorKind, &'static str)> for EtlError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for EtlError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> EtlError {
        EtlError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    fn from(errors: Vec<E>) -> EtlError {
        EtlError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> EtlError {
        EtlError::with_detail(ErrorKind::IoError, "I/O error occurred", err)
    }
}

/// Maps syntax, data and EOF failures to [`ErrorKind::DeserializationError`] and I/O failures
/// to [`ErrorKind::IoError`].
impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> EtlError {
        use serde_json::error::Category;

        match err.classify() {
            Category::Io => {
                EtlError::with_detail(ErrorKind::IoError, "JSON I/O operation failed", err)
            }
            Category::Syntax | Category::Data | Category::Eof => EtlError::with_detail(
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
                err,
            ),
        }
    }
}

impl From<std::num::ParseIntError> for EtlError {
    fn from(err: std::num::ParseIntError) -> EtlError {
        EtlError::with_detail(ErrorKind::ConversionError, "Integer parsing failed", err)
    }
}

impl From<etl_config::shared::ValidationError> for EtlError {
    fn from(err: etl_config::shared::ValidationError) -> EtlError {
        EtlError::with_detail(ErrorKind::ConfigError, "Invalid copy configuration", err)
    }
}
