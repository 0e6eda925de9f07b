use std::fmt::Display;
use std::path::PathBuf;

/// Non-fatal condition reported through the table's error handler.
///
/// The operation that raised the warning continues with its documented
/// fallback (skip the memo, skip the column, report failure to the
/// caller). Fatal conditions are plain `io::Error` values instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The header expects a memo sidecar but none was found.
    DbtDoesntExist { path: PathBuf },
    /// The memo sidecar cannot be created or written.
    DbtReadOnly { path: PathBuf },
    /// A column cannot be added to a table that already has records.
    RecordsExist { column: String },
    /// A column with this name already exists.
    ColumnExists { column: String },
    /// The name exceeds the 10-byte descriptor slot and will be truncated.
    ColumnNameTooLong { column: String },
    /// Update was called on a table with no records.
    NoRecordsWhileUpdating,
}

impl Warning {
    pub fn symbol(&self) -> &'static str {
        match self {
            Warning::DbtDoesntExist { .. } => "DBT_DOESNT_EXIST",
            Warning::DbtReadOnly { .. } => "DBT_READ_ONLY",
            Warning::RecordsExist { .. } => "RECORDS_EXIST",
            Warning::ColumnExists { .. } => "COLUMN_EXISTS",
            Warning::ColumnNameTooLong { .. } => "COLUMN_NAME_TOO_LONG",
            Warning::NoRecordsWhileUpdating => "NO_RECORDS_WHILE_UPDATING",
        }
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::DbtDoesntExist { path } => {
                write!(f, "{}: {}", self.symbol(), path.display())
            }
            Warning::DbtReadOnly { path } => {
                write!(f, "{}: {}", self.symbol(), path.display())
            }
            Warning::RecordsExist { column }
            | Warning::ColumnExists { column }
            | Warning::ColumnNameTooLong { column } => {
                write!(f, "{}: {}", self.symbol(), column)
            }
            Warning::NoRecordsWhileUpdating => f.write_str(self.symbol()),
        }
    }
}

/// Caller-supplied sink for [`Warning`] values.
pub type WarningHandler = Box<dyn FnMut(&Warning)>;

/// The default sink forwards to the log facade.
pub fn default_handler() -> WarningHandler {
    Box::new(|w| log::warn!("{w}"))
}
