use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Spreadsheet error: {0}")]
    SpreadsheetError(#[from] rust_xlsxwriter::XlsxError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Unknown timezone '{value}': {reason}")]
    TimezoneError { value: String, reason: String },

    #[error("Invalid timestamp '{value}': {reason}")]
    TimestampError { value: String, reason: String },

    #[error("No queries found in {origin}")]
    NoQueriesError { origin: String },

    #[error("Query {name} failed: {message}")]
    QueryFailedError { name: String, message: String },

    #[error("Email delivery failed: {message}")]
    DeliveryError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Database,
    Output,
    Delivery,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReportError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReportError::ConfigError { .. }
            | ReportError::MissingConfigError { .. }
            | ReportError::InvalidConfigValueError { .. }
            | ReportError::ConfigValidationError { .. }
            | ReportError::ValidationError { .. } => ErrorCategory::Configuration,
            ReportError::TimezoneError { .. }
            | ReportError::TimestampError { .. }
            | ReportError::NoQueriesError { .. } => ErrorCategory::Input,
            ReportError::DatabaseError(_) | ReportError::QueryFailedError { .. } => {
                ErrorCategory::Database
            }
            ReportError::ZipError(_)
            | ReportError::SpreadsheetError(_)
            | ReportError::CsvError(_)
            | ReportError::SerializationError(_) => ErrorCategory::Output,
            ReportError::DeliveryError { .. } => ErrorCategory::Delivery,
            ReportError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 檔案已寫出，只有寄信失敗
            ReportError::DeliveryError { .. } => ErrorSeverity::Low,
            ReportError::DatabaseError(_) | ReportError::QueryFailedError { .. } => {
                ErrorSeverity::Medium
            }
            ReportError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ReportError::DatabaseError(_) => {
                "Check the database URL, network access and credentials, then retry"
            }
            ReportError::QueryFailedError { .. } => {
                "Fix the failing statement or rerun with --on-error sheet to keep going"
            }
            ReportError::TimezoneError { .. } => {
                "Use an IANA zone name such as Asia/Kolkata or a fixed offset such as -05:00 (see `zones`)"
            }
            ReportError::TimestampError { .. } => "Enter times as YYYY-MM-DD HH:MM:SS",
            ReportError::NoQueriesError { .. } => {
                "Mark each statement with a Query1/Query2 line or separate statements with ';'"
            }
            ReportError::DeliveryError { .. } => {
                "The spreadsheet was saved; check the SMTP relay host/port or send it manually"
            }
            ReportError::MissingConfigError { .. }
            | ReportError::InvalidConfigValueError { .. }
            | ReportError::ConfigValidationError { .. }
            | ReportError::ConfigError { .. }
            | ReportError::ValidationError { .. } => {
                "Review the command line flags and the TOML configuration file"
            }
            ReportError::IoError(_) => "Check that the paths exist and are writable",
            ReportError::ZipError(_)
            | ReportError::SpreadsheetError(_)
            | ReportError::CsvError(_)
            | ReportError::SerializationError(_) => {
                "Try the other output format (--format xlsx / csv-zip)"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ReportError::DatabaseError(e) => format!("Could not talk to the database: {}", e),
            ReportError::QueryFailedError { name, message } => {
                format!("{} failed and the run was stopped: {}", name, message)
            }
            ReportError::NoQueriesError { origin } => {
                format!("No queries found in {}", origin)
            }
            ReportError::MissingConfigError { field } => {
                format!("Please provide a value for '{}'", field)
            }
            ReportError::InvalidConfigValueError { field, reason, .. } => {
                format!("'{}' is invalid: {}", field, reason)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
