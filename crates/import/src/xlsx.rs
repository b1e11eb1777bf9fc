use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

use crate::{ImportError, RowGrid};

/// Reads the first worksheet of an in-memory workbook.
pub fn read_grid(data: &[u8]) -> Result<RowGrid, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec()))
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::NoSheets)?
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<String>>());

    let headers = rows.next().ok_or(ImportError::EmptyFile)?;
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ImportError::EmptyFile);
    }

    Ok(RowGrid {
        headers,
        rows: rows.collect(),
    })
}

/// Renders a cell the way a spreadsheet displays it in a plain export.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.date().format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s.split('T').next().unwrap_or_default().to_string(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}
