use thiserror::Error;

/// Convenience result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error type returned by every public upload operation.
///
/// Transport failures ([`UploadError::Connection`]) are kept apart from statements the database
/// rejected ([`UploadError::Execution`]) so callers can decide what is worth retrying.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The database could not be reached or refused the login.
    #[error("connection failure: {message}")]
    Connection { message: String },

    /// The database rejected a statement (malformed SQL, constraint violation, ...).
    #[error("execution failure: {message}")]
    Execution { message: String },

    /// The load committed but the target row count disagrees with the dataset.
    #[error("verification mismatch on {target}: expected {expected} rows, found {actual}")]
    VerificationMismatch {
        target: String,
        expected: u64,
        actual: u64,
    },

    /// A value could not be converted to the representation a strategy needs.
    #[error("failed to format value at row {row} column '{column}': {message}")]
    Formatting {
        row: usize,
        column: String,
        message: String,
    },

    /// The dataset violates its shape invariants (ragged rows, duplicate names).
    #[error("invalid dataset: {message}")]
    InvalidDataset { message: String },

    /// An upload option is out of range (zero chunk size, empty target, ...).
    #[error("invalid options: {message}")]
    InvalidOptions { message: String },

    /// An audit record was requested for a job that has not finished.
    #[error("upload job for {target} has not finished")]
    JobPending { target: String },

    /// A background upload worker panicked before producing a report.
    #[error("upload worker for {target} panicked: {message}")]
    WorkerPanicked { target: String, message: String },

    /// Configuration could not be loaded or parsed.
    #[error("config: {message}")]
    Config { message: String },

    /// Underlying I/O error (staging file, config file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Staging file could not be written or read as delimited text.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Coarse classification of an [`UploadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport or authentication problem.
    Connection,
    /// Statement rejected by the database.
    Execution,
    /// Post-load row count disagreed with the dataset.
    Verification,
    /// Value formatting or dataset/option validation, raised before any statement.
    Input,
    /// Local file system or staging file problem.
    Io,
    /// Worker or job lifecycle problem.
    Internal,
}

impl UploadError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Connection { .. } => ErrorKind::Connection,
            UploadError::Execution { .. } => ErrorKind::Execution,
            UploadError::VerificationMismatch { .. } => ErrorKind::Verification,
            UploadError::Formatting { .. }
            | UploadError::InvalidDataset { .. }
            | UploadError::InvalidOptions { .. }
            | UploadError::Config { .. } => ErrorKind::Input,
            UploadError::Io(_) | UploadError::Csv(_) => ErrorKind::Io,
            UploadError::JobPending { .. } | UploadError::WorkerPanicked { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Only transport failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}
