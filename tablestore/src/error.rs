//! Error types and result definitions for table store operations.
//!
//! [`TableError`] carries an [`ErrorKind`] for programmatic handling, a static description,
//! optional dynamic detail, an optional source error and the callsite it was raised from.
//! Several errors can be aggregated into one, which is how rollback failures and batch
//! failures are reported.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used by every fallible table store operation.
pub type TableResult<T> = Result<T, TableError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the crate.
#[derive(Debug, Clone)]
pub struct TableError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<TableError>,
        location: &'static Location<'static>,
    },
}

/// Categories of failures, grouped by the layer that raises them.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Entity configuration errors, raised while building descriptors.
    MissingRowKey,
    MissingPartitionKey,
    DuplicateKeyRole,
    UnsupportedMemberType,
    UnknownMember,
    InvalidDescriptor,

    // Query translation errors.
    MissingScopeMember,
    InvalidArgument,

    // Data and conversion errors.
    ConversionError,
    InvalidData,
    OverflowChainCorrupted,
    SerializationError,
    DeserializationError,

    // Store errors.
    TableNotFound,
    EntityAlreadyExists,
    EntityNotFound,
    EtagMismatch,
    StoreTimeout,
    StoreRequestFailed,
    BatchLimitExceeded,
    ConnectionFailed,

    // Workflow errors.
    ConfigError,
    ModifierFailed,
    RollbackFailed,
    BackupWriterPanic,
    InvalidState,

    Unknown,

    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl ErrorKind {
    /// Returns `true` for failures that are retried with backoff instead of surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::StoreTimeout)
    }

    /// Returns `true` for errors caused by an entity type that cannot be mapped to the store.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingRowKey
                | ErrorKind::MissingPartitionKey
                | ErrorKind::DuplicateKeyRole
                | ErrorKind::UnsupportedMemberType
                | ErrorKind::UnknownMember
                | ErrorKind::InvalidDescriptor
        )
    }
}

impl TableError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.kind,
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(TableError::kind)
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all kinds contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.repr {
            ErrorRepr::Single(payload) => vec![payload.kind],
            ErrorRepr::Many { errors, .. } => errors.iter().flat_map(TableError::kinds).collect(),
        }
    }

    pub fn description(&self) -> &str {
        match &self.repr {
            ErrorRepr::Single(payload) => &payload.description,
            ErrorRepr::Many { .. } => "multiple errors",
        }
    }

    /// Returns the dynamic detail, or the first detail found among aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.detail.as_deref(),
            ErrorRepr::Many { errors, .. } => errors.iter().find_map(TableError::detail),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match &self.repr {
            ErrorRepr::Single(payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error. Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(payload) = &mut self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        TableError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        TableError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for TableError {
    fn eq(&self, other: &TableError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace:", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} error(s) aggregated @ {}:{}",
                    errors.len(),
                    location.file(),
                    location.line()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    write_indented(f, &format!("{}.", index + 1), &error.to_string())?;
                }

                Ok(())
            }
        }
    }
}

impl error::Error for TableError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, header: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {header}")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for TableError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> TableError {
        TableError::from_components(kind, Cow::Borrowed(description), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for TableError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, D)) -> TableError {
        TableError::from_components(kind, Cow::Borrowed(description), Some(detail.into()), None)
    }
}

/// Aggregates errors; a single error is returned unwrapped.
impl<E> From<Vec<E>> for TableError
where
    E: Into<TableError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> TableError {
        let location = Location::caller();
        let mut errors: Vec<TableError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        TableError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<config::shared::ValidationError> for TableError {
    #[track_caller]
    fn from(err: config::shared::ValidationError) -> TableError {
        TableError::from_source(ErrorKind::ConfigError, "Invalid configuration", err)
    }
}

impl From<std::num::ParseIntError> for TableError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> TableError {
        TableError::from_source(ErrorKind::ConversionError, "Integer parsing failed", err)
    }
}

impl From<serde_json::Error> for TableError {
    #[track_caller]
    fn from(err: serde_json::Error) -> TableError {
        match err.classify() {
            serde_json::error::Category::Io => {
                TableError::from_source(ErrorKind::SerializationError, "JSON I/O failed", err)
            }
            _ => TableError::from_source(
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
                err,
            ),
        }
    }
}
