//! Error types and result definitions for table loads.
//!
//! [`LoadError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error and the callsite where it was raised.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use postgres::schema::{TableName, TableNameError};
use thiserror::Error;

/// Convenient result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Specific categories of load failures.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source errors
    ExtractionFailed,
    MalformedRecord,

    // Data errors
    DuplicateKeyViolation,
    InvalidData,
    ConversionError,
    DeserializationError,

    // Store errors
    StoreConnectionFailed,
    StoreQueryFailed,

    // Configuration and state errors
    ConfigError,
    InvalidTableName,
    InvalidState,

    IoError,
    Unknown,

    /// Raised by an enabled failpoint.
    #[cfg(feature = "failpoints")]
    InjectedFailure,
}

/// Diagnostic attached to [`ErrorKind::DuplicateKeyViolation`] errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("key {key} appears {count} times in {table}")]
pub struct DuplicateKey {
    /// Table the duplicate was found in (staging or shadow).
    pub table: TableName,
    /// Offending key rendered as a row literal, e.g. `(AAPL,2024-01-02)`.
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the loader.
#[derive(Debug, Clone)]
pub struct LoadError {
    payload: Box<ErrorPayload>,
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    pub fn description(&self) -> &str {
        &self.payload.description
    }

    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Returns the offending key of a [`ErrorKind::DuplicateKeyViolation`].
    pub fn duplicate_key(&self) -> Option<&DuplicateKey> {
        self.payload
            .source
            .as_deref()
            .and_then(|source| source.downcast_ref::<DuplicateKey>())
    }

    /// Attaches an originating error, exposed via [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        LoadError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    /// Creates a [`ErrorKind::DuplicateKeyViolation`] carrying `duplicate`.
    #[track_caller]
    pub fn duplicate_key_violation(duplicate: DuplicateKey) -> Self {
        let detail = duplicate.to_string();
        LoadError::from_components(
            ErrorKind::DuplicateKeyViolation,
            Cow::Borrowed("Logical key uniqueness check failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(duplicate)),
        )
    }
}

impl PartialEq for LoadError {
    fn eq(&self, other: &LoadError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            if detail.trim().is_empty() {
                write!(f, "\n  Detail: <empty>")?;
            } else {
                write!(f, "\n  Detail:")?;
                for line in detail.lines() {
                    write!(f, "\n    {line}")?;
                }
            }
        }

        let rendered_backtrace = payload.backtrace.to_string();
        if !rendered_backtrace.trim().is_empty()
            && matches!(payload.backtrace.status(), std::backtrace::BacktraceStatus::Captured)
        {
            write!(f, "\n  Backtrace:")?;
            for line in rendered_backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for LoadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Creates a [`LoadError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for LoadError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> LoadError {
        LoadError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`LoadError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for LoadError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> LoadError {
        LoadError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<std::io::Error> for LoadError {
    #[track_caller]
    fn from(err: std::io::Error) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for LoadError {
    #[track_caller]
    fn from(err: serde_json::Error) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::DeserializationError,
            Cow::Borrowed("JSON deserialization failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::num::ParseIntError> for LoadError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<bigdecimal::ParseBigDecimalError> for LoadError {
    #[track_caller]
    fn from(err: bigdecimal::ParseBigDecimalError) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Decimal parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<chrono::ParseError> for LoadError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Date parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<TableNameError> for LoadError {
    #[track_caller]
    fn from(err: TableNameError) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::InvalidTableName,
            Cow::Borrowed("Table name is invalid"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] to [`LoadError`].
///
/// Connectivity and pool failures map to [`ErrorKind::StoreConnectionFailed`]; everything
/// else, including constraint violations reported by the server, maps to
/// [`ErrorKind::StoreQueryFailed`].
impl From<sqlx::Error> for LoadError {
    #[track_caller]
    fn from(err: sqlx::Error) -> LoadError {
        let (kind, description) = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => {
                (ErrorKind::StoreConnectionFailed, "Store connection failed")
            }
            sqlx::Error::Configuration(_) => (ErrorKind::ConfigError, "Store configuration is invalid"),
            _ => (ErrorKind::StoreQueryFailed, "Store statement failed"),
        };

        let detail = err.to_string();
        LoadError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
