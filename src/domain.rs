use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use std::fmt;
use std::io::Error;

use crate::columns::ColumnRegistry;
use crate::record::Field;

pub const DEFAULT_SOURCE: &str =
    "https://api.medzakupivli.com/appellation/type/?hash=8f7d225ffda84d9a143ca8c9868779a95cc9b033";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const PAGE_SIZE_OPTIONS: [usize; 4] = [10, 25, 50, 100];
pub const DEFAULT_EXPORT_PATH: &str = "purchases.xlsx";
pub const SUBMIT_KEY: &str = "Kapran";

pub const HELP_TEXT: &str = "\
q          quit
?          this help
Esc        close popup / cancel input

←↑↓→ hjkl  move selection
n / PgDn   next page
p / PgUp   previous page
g / G      first / last page
+          cycle page size

/          search all columns
f          filter the selected column
F          clear all filters
s          sort selected column (asc/desc)
S          clear sort of selected column
c          show / hide columns

e          export current page
y          copy selected row
a          submit form";

#[derive(Debug)]
pub enum PTVError {
    IoError(Error),
    PolarsError(PolarsError),
    HttpError(reqwest::Error),
    JsonError(serde_json::Error),
    XlsxError(rust_xlsxwriter::XlsxError),
    Config(String),
    MissingField(Field),
    InvalidRecord { row: usize, field: Field },
    UnknownField(String),
    LoadingFailed(String),
    Clipboard(String),
    NothingToExport,
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
}

impl fmt::Display for PTVError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PTVError::IoError(e) => write!(f, "io error: {e}"),
            PTVError::PolarsError(e) => write!(f, "polars error: {e}"),
            PTVError::HttpError(e) => write!(f, "request failed: {e}"),
            PTVError::JsonError(e) => write!(f, "invalid json: {e}"),
            PTVError::XlsxError(e) => write!(f, "xlsx error: {e}"),
            PTVError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            PTVError::MissingField(field) => write!(f, "{field} field doesn't exist"),
            PTVError::InvalidRecord { row, field } => {
                write!(f, "record {row} has no {field} field")
            }
            PTVError::UnknownField(name) => write!(f, "unknown field \"{name}\""),
            PTVError::LoadingFailed(msg) => write!(f, "loading failed: {msg}"),
            PTVError::Clipboard(msg) => write!(f, "clipboard error: {msg}"),
            PTVError::NothingToExport => write!(f, "no visible columns to export"),
            PTVError::FileNotFound => write!(f, "file not found"),
            PTVError::PermissionDenied => write!(f, "permission denied"),
            PTVError::UnknownFileType => write!(f, "unknown file type"),
        }
    }
}

impl std::error::Error for PTVError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PTVError::IoError(e) => Some(e),
            PTVError::PolarsError(e) => Some(e),
            PTVError::HttpError(e) => Some(e),
            PTVError::JsonError(e) => Some(e),
            PTVError::XlsxError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for PTVError {
    fn from(err: Error) -> Self {
        PTVError::IoError(err)
    }
}

impl From<PolarsError> for PTVError {
    fn from(err: PolarsError) -> Self {
        PTVError::PolarsError(err)
    }
}

impl From<reqwest::Error> for PTVError {
    fn from(err: reqwest::Error) -> Self {
        PTVError::HttpError(err)
    }
}

impl From<serde_json::Error> for PTVError {
    fn from(err: serde_json::Error) -> Self {
        PTVError::JsonError(err)
    }
}

impl From<rust_xlsxwriter::XlsxError> for PTVError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        PTVError::XlsxError(err)
    }
}

impl From<toml::de::Error> for PTVError {
    fn from(err: toml::de::Error) -> Self {
        PTVError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct PTVConfig {
    pub source: String,
    pub columns: ColumnRegistry,
    pub page_size: usize,
    pub submit_url: Option<String>,
    pub export_path: String,
    pub event_poll_time: u64,
    pub max_column_width: usize,
}

impl Default for PTVConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            columns: ColumnRegistry::default(),
            page_size: DEFAULT_PAGE_SIZE,
            submit_url: None,
            export_path: DEFAULT_EXPORT_PATH.to_string(),
            event_poll_time: 100,
            max_column_width: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CMDMode {
    Search,
    Filter(Field),
    Export,
    FormName,
    FormLastName,
    FormAge,
}

impl CMDMode {
    pub fn prompt(&self) -> String {
        match self {
            CMDMode::Search => "Search: ".to_string(),
            CMDMode::Filter(field) => format!("Filter {field}: "),
            CMDMode::Export => "Export to: ".to_string(),
            CMDMode::FormName => "Name: ".to_string(),
            CMDMode::FormLastName => "Last name: ".to_string(),
            CMDMode::FormAge => "Age: ".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Quit,
    Help,
    Enter,
    Exit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    CyclePageSize,
    Search,
    Filter,
    ClearFilters,
    ToggleSort,
    ClearSort,
    Columns,
    ToggleColumn,
    Export,
    CopyRow,
    Form,
    RawKey(KeyEvent),
}
