use loader::error::LoadError;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for the jobs binary.
pub type JobsResult<T> = Result<T, JobsError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the jobs binary.
///
/// Wraps [`LoadError`] for extraction and load failures and adds variants for
/// process setup.
#[derive(Debug)]
pub enum JobsError {
    /// Extraction, normalization or load error.
    Load(LoadError),
    /// Configuration or startup error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// Store connection error raised before any job ran.
    Connect(sqlx::Error, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
}

impl JobsError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            JobsError::Load(_) => "load error",
            JobsError::Config(_, _) => "configuration error",
            JobsError::Connect(_, _) => "connection error",
            JobsError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> &Backtrace {
        match self {
            JobsError::Load(err) => err.backtrace(),
            JobsError::Config(_, cb) => &cb.0,
            JobsError::Connect(_, cb) => &cb.0,
            JobsError::Io(_, cb) => &cb.0,
        }
    }

    /// Creates a configuration error from any error source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        JobsError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("jobs failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace() {
            out.push_str("backtrace:\n");
            out.push_str(&self.backtrace().to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for JobsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobsError::Load(err) => write!(f, "{err}"),
            JobsError::Config(source, _) => write!(f, "configuration error: {source}"),
            JobsError::Connect(source, _) => write!(f, "connection error: {source}"),
            JobsError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for JobsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JobsError::Load(err) => err.source(),
            JobsError::Config(source, _) => Some(source.as_ref()),
            JobsError::Connect(source, _) => Some(source),
            JobsError::Io(source, _) => Some(source),
        }
    }
}

impl From<LoadError> for JobsError {
    fn from(err: LoadError) -> Self {
        JobsError::Load(err)
    }
}

impl From<sqlx::Error> for JobsError {
    fn from(err: sqlx::Error) -> Self {
        JobsError::Connect(err, CapturedBacktrace::capture())
    }
}

impl From<std::io::Error> for JobsError {
    fn from(err: std::io::Error) -> Self {
        JobsError::Io(err, CapturedBacktrace::capture())
    }
}
