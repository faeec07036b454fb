use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Source read failed: {0}")]
    SourceRead(#[from] rusqlite::Error),

    #[error("Malformed source row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("Invalid {field} '{value}' on payment {payment_id}")]
    InvalidTimestamp {
        payment_id: i64,
        field: &'static str,
        value: String,
    },

    #[error("Record source returned no rows")]
    EmptyInput,

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Cannot write {}: {cause}", .path.display())]
    Write { path: PathBuf, cause: WriteCause },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The underlying failure behind an `EtlError::Write`.
#[derive(Error, Debug)]
pub enum WriteCause {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Failure families a caller has to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceRead,
    DataIntegrity,
    Write,
    Config,
    Other,
}

impl EtlError {
    pub fn write(path: impl Into<PathBuf>, cause: impl Into<WriteCause>) -> Self {
        EtlError::Write {
            path: path.into(),
            cause: cause.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlError::SourceRead(_) | EtlError::MalformedRow { .. } => ErrorKind::SourceRead,
            EtlError::InvalidTimestamp { .. }
            | EtlError::EmptyInput
            | EtlError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            EtlError::Write { .. } => ErrorKind::Write,
            EtlError::Config(_) => ErrorKind::Config,
            EtlError::Other(_) => ErrorKind::Other,
        }
    }
}

pub type EtlResult<T> = Result<T, EtlError>;
