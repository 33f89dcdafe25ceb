use polars::prelude::*;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, info_span, trace};
use tracing_error::SpanTrace;

use crate::domain::PTVError;
use crate::record::{Field, Record, Value};

pub type FetchResult = Result<Vec<Record>, PTVError>;

/// Where the records of a session come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Remote(String),
    JsonFile(PathBuf),
    CsvFile(PathBuf),
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Remote(url) => write!(f, "{url}"),
            DataSource::JsonFile(path) | DataSource::CsvFile(path) => {
                write!(f, "{}", path.display())
            }
        }
    }
}

impl DataSource {
    pub fn parse(source: &str) -> Result<Self, PTVError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(DataSource::Remote(source.to_string()));
        }
        let path = expand_path(source)?;
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("JSON") => Ok(DataSource::JsonFile(path)),
            Some("CSV") => Ok(DataSource::CsvFile(path)),
            _ => Err(PTVError::UnknownFileType),
        }
    }

    /// Short name for the title bar.
    pub fn name(&self) -> String {
        match self {
            DataSource::Remote(url) => url
                .split("://")
                .nth(1)
                .and_then(|rest| rest.split('/').next())
                .unwrap_or(url)
                .to_string(),
            DataSource::JsonFile(path) | DataSource::CsvFile(path) => path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("???")
                .to_string(),
        }
    }

    /// Blocking one-shot fetch of the full record list.
    pub fn fetch(&self) -> FetchResult {
        let start_time = Instant::now();
        let records = match self {
            DataSource::Remote(url) => Self::fetch_remote(url)?,
            DataSource::JsonFile(path) => Self::load_json(path)?,
            DataSource::CsvFile(path) => Self::load_csv(path)?,
        };
        info!(
            "Fetched {} records from {} in {}ms",
            records.len(),
            self,
            start_time.elapsed().as_millis()
        );
        Ok(records)
    }

    fn fetch_remote(url: &str) -> FetchResult {
        debug!("GET {url}");
        let response = reqwest::blocking::Client::new()
            .get(url)
            .send()?
            .error_for_status()?;
        let records: Option<Vec<Record>> = response.json()?;
        Ok(records.unwrap_or_default())
    }

    fn open(path: &Path) -> Result<File, PTVError> {
        File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PTVError::FileNotFound,
            ErrorKind::PermissionDenied => PTVError::PermissionDenied,
            _ => PTVError::IoError(e),
        })
    }

    fn load_json(path: &Path) -> FetchResult {
        let reader = BufReader::new(Self::open(path)?);
        let records: Option<Vec<Record>> = serde_json::from_reader(reader)?;
        Ok(records.unwrap_or_default())
    }

    fn load_csv(path: &Path) -> FetchResult {
        Self::open(path)?;
        let df = LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .finish()?
            .collect()?;

        let mut records = vec![Record::new(); df.height()];
        for name in df.get_column_names() {
            let Ok(field) = name.as_str().parse::<Field>() else {
                trace!("Ignoring unknown csv column \"{name}\"");
                continue;
            };
            let column = df.column(name.as_str())?;
            if is_integer_type(column.dtype()) {
                let values = column.cast(&DataType::Int64)?;
                for (record, value) in records.iter_mut().zip(values.i64()?.into_iter()) {
                    record.insert(field, value.map(Value::Integer).unwrap_or(Value::Null));
                }
            } else if is_float_type(column.dtype()) {
                let values = column.cast(&DataType::Float64)?;
                for (record, value) in records.iter_mut().zip(values.f64()?.into_iter()) {
                    record.insert(field, value.map(Value::Float).unwrap_or(Value::Null));
                }
            } else {
                let values = column.cast(&DataType::String)?;
                for (record, value) in records.iter_mut().zip(values.str()?.into_iter()) {
                    let value = match value {
                        Some(s) => Value::Text(s.to_string()),
                        None => Value::Null,
                    };
                    record.insert(field, value);
                }
            }
        }
        Ok(records)
    }
}

fn is_integer_type(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn is_float_type(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Expands `~` and environment variables in user supplied paths.
pub fn expand_path(path: &str) -> Result<PathBuf, PTVError> {
    let expanded = shellexpand::full(path).map_err(|e| PTVError::Config(e.to_string()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Runs the fetch on its own thread; the result arrives on the returned channel exactly once.
pub fn spawn_fetch(source: DataSource) -> Receiver<FetchResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let span = info_span!("fetch", source = %source);
        let _enter = span.enter();
        let result = source.fetch();
        if let Err(e) = &result {
            error!("Fetching records failed: {e}\n{}", SpanTrace::capture());
        }
        if tx.send(result).is_err() {
            debug!("Fetch finished after the receiver was dropped");
        }
    });
    rx
}
