use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Workbook read error: {0}")]
    WorkbookReadError(#[from] calamine::Error),

    #[error("Workbook write error: {0}")]
    WorkbookWriteError(#[from] rust_xlsxwriter::XlsxError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Sheet '{sheet}' not found in workbook")]
    MissingSheetError { sheet: String },

    #[error("Workbook error: {message}")]
    WorkbookError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation failed: {}", .errors.join("; "))]
    ValidationError { errors: Vec<String> },

    #[error("Not found: {what}")]
    NotFoundError { what: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Workbook,
    Input,
    Storage,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl InventoryError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    pub fn workbook(message: impl Into<String>) -> Self {
        Self::WorkbookError {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFoundError { what: what.into() }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::WorkbookReadError(_)
            | Self::WorkbookWriteError(_)
            | Self::MissingSheetError { .. }
            | Self::WorkbookError { .. } => ErrorCategory::Workbook,
            Self::ValidationError { .. } => ErrorCategory::Input,
            Self::IoError(_) | Self::ZipError(_) | Self::NotFoundError { .. } => {
                ErrorCategory::Storage
            }
            Self::CsvError(_) | Self::SerializationError(_) | Self::ProcessingError { .. } => {
                ErrorCategory::Processing
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ValidationError { .. } => ErrorSeverity::Medium,
            Self::NotFoundError { .. } => ErrorSeverity::Medium,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::MissingSheetError { .. } => ErrorSeverity::High,
            Self::WorkbookReadError(_)
            | Self::WorkbookError { .. }
            | Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ProcessingError { .. } => ErrorSeverity::High,
            Self::IoError(_) | Self::ZipError(_) | Self::WorkbookWriteError(_) => {
                ErrorSeverity::Critical
            }
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::MissingSheetError { sheet } => format!(
                "Add a sheet named '{}' to the workbook or fix [sheets] in the config",
                sheet
            ),
            Self::MissingConfigError { field } => {
                format!("Add '{}' to the configuration file", field)
            }
            Self::InvalidConfigValueError { field, .. }
            | Self::ConfigValidationError { field, .. } => {
                format!("Correct '{}' in the configuration file", field)
            }
            Self::ConfigError { .. } => "Check the configuration file syntax".to_string(),
            Self::WorkbookReadError(_) | Self::WorkbookError { .. } => {
                "Make sure the workbook is a valid .xlsx file and not open in another program"
                    .to_string()
            }
            Self::WorkbookWriteError(_) => {
                "Check that the workbook location is writable".to_string()
            }
            Self::ValidationError { .. } => "Correct the listed fields and submit again".to_string(),
            Self::NotFoundError { .. } => "Check the name and try again".to_string(),
            Self::IoError(_) => "Check file paths and permissions".to_string(),
            Self::ZipError(_) => "The archive may be corrupted; try another backup".to_string(),
            Self::CsvError(_) | Self::SerializationError(_) | Self::ProcessingError { .. } => {
                "Re-run with --verbose and inspect the log".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Workbook => format!("Workbook problem: {}", self),
            ErrorCategory::Input => format!("Invalid data provided: {}", self),
            ErrorCategory::Storage => format!("File problem: {}", self),
            ErrorCategory::Processing => format!("Processing failed: {}", self),
        }
    }

    /// 依嚴重程度對應的行程結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = InventoryError::ValidationError {
            errors: vec![
                "Missing required field: product".to_string(),
                "Quantity must be a positive number".to_string(),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("product"));
        assert!(message.contains("Quantity"));
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_missing_sheet_suggests_fix() {
        let err = InventoryError::MissingSheetError {
            sheet: "stock sheet".to_string(),
        };

        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.recovery_suggestion().contains("stock sheet"));
        assert!(err.user_friendly_message().starts_with("Workbook problem"));
    }

    #[test]
    fn test_io_error_is_critical() {
        let err: InventoryError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.exit_code(), 3);
    }
}
