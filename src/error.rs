// Error taxonomy shared by the loader, validator, aggregators and exporters.
//
// Row-level skips during aggregation are not errors; they are either silent
// or reported as warnings on a successful result.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    /// The file extension is not one of the accepted spreadsheet types.
    #[error("Unsupported file type '{extension}'. Accepted: {accepted}")]
    FileType { extension: String, accepted: String },

    /// The file is larger than the configured limit.
    #[error("File is too large ({size} bytes). Maximum allowed is {limit} bytes")]
    FileSize { size: u64, limit: u64 },

    /// The workbook could not be read or has no usable structure.
    #[error("Corrupted file: {0}")]
    FileCorrupted(String),

    /// A row failed the strict whole-file validation.
    #[error("Row {row}, column '{column}': {message} (value: '{value}')")]
    Validation {
        row: usize,
        column: String,
        value: String,
        message: String,
    },

    #[error("Please select at least one month")]
    NoMonthSelected,

    /// Anything unexpected during aggregation or export.
    #[error("Processing error: {0}")]
    Processing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<calamine::Error> for ReportError {
    fn from(e: calamine::Error) -> Self {
        ReportError::FileCorrupted(e.to_string())
    }
}

impl From<csv::Error> for ReportError {
    fn from(e: csv::Error) -> Self {
        ReportError::FileCorrupted(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for ReportError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        ReportError::Processing(e.to_string())
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        ReportError::Processing(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
