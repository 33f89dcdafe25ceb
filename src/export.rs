use polars::prelude::*;
use rust_xlsxwriter::Workbook;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::columns::ColumnRegistry;
use crate::domain::PTVError;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportType {
    CSV,
    PARQUET,
    ARROW,
    XLSX,
}

fn detect_export_type(path: &Path) -> Result<ExportType, PTVError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Ok(ExportType::CSV),
        Some("PARQUET") | Some("PQ") => Ok(ExportType::PARQUET),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(ExportType::ARROW),
        Some("XLSX") => Ok(ExportType::XLSX),
        _ => Err(PTVError::UnknownFileType),
    }
}

/// Row-major grid: the visible column labels first, then one row per record in column order.
pub fn worksheet(rows: &[Record], columns: &ColumnRegistry) -> Vec<Vec<String>> {
    let visible = columns.visible();
    let mut grid = Vec::with_capacity(rows.len() + 1);
    grid.push(visible.iter().map(|c| c.label.clone()).collect());
    for record in rows {
        grid.push(visible.iter().map(|c| record.text(c.key)).collect());
    }
    grid
}

fn to_dataframe(grid: &[Vec<String>]) -> Result<DataFrame, PTVError> {
    let Some((header, body)) = grid.split_first() else {
        return Err(PTVError::NothingToExport);
    };
    if header.is_empty() {
        return Err(PTVError::NothingToExport);
    }
    let columns = header
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            let values: Vec<String> = body
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or_default())
                .collect();
            Column::new(label.as_str().into(), values)
        })
        .collect::<Vec<Column>>();
    Ok(DataFrame::new(columns)?)
}

/// Writes the grid to `path`, the format follows the file extension.
pub fn write_worksheet(grid: &[Vec<String>], path: &Path) -> Result<usize, PTVError> {
    match detect_export_type(path)? {
        ExportType::XLSX => write_xlsx(grid, path),
        export_type => write_dataframe(grid, path, export_type),
    }
}

fn write_dataframe(grid: &[Vec<String>], path: &Path, export_type: ExportType) -> Result<usize, PTVError> {
    let mut df = to_dataframe(grid)?;
    let mut file = File::create(path)?;
    debug!("Exporting {} rows as {:?}", df.height(), export_type);

    match export_type {
        ExportType::CSV => CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?,
        ExportType::PARQUET => {
            ParquetWriter::new(&mut file).finish(&mut df)?;
        }
        ExportType::ARROW => IpcWriter::new(&mut file).finish(&mut df)?,
        // polars has no xlsx writer
        ExportType::XLSX => return Err(PTVError::UnknownFileType),
    }

    info!("Exported {} rows to {}", df.height(), path.display());
    Ok(df.height())
}

// Header in row 0, one row per record below it, everything as text.
fn write_xlsx(grid: &[Vec<String>], path: &Path) -> Result<usize, PTVError> {
    match grid.first() {
        Some(header) if !header.is_empty() => {}
        _ => return Err(PTVError::NothingToExport),
    }
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (row_idx, row) in grid.iter().enumerate() {
        let row_idx = u32::try_from(row_idx)
            .map_err(|_| PTVError::Config("too many rows for a worksheet".into()))?;
        for (col_idx, cell) in row.iter().enumerate() {
            let col_idx = u16::try_from(col_idx)
                .map_err(|_| PTVError::Config("too many columns for a worksheet".into()))?;
            sheet.write_string(row_idx, col_idx, cell)?;
        }
    }
    workbook.save(path)?;

    let rows = grid.len() - 1;
    info!("Exported {} rows to {}", rows, path.display());
    Ok(rows)
}
