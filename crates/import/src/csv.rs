use std::io::Read;

use crate::{ImportError, RowGrid};

/// Reads delimited text into a header row plus data rows.
///
/// Records may have differing lengths; the row parser treats missing
/// trailing cells as blank. Cells that are not valid UTF-8 (Latin-1
/// narrations, for one) are decoded lossily.
pub fn read_grid<R: Read>(data: R) -> Result<RowGrid, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(data);

    let mut records = reader.byte_records();

    let headers = match records.next() {
        Some(record) => cells(&record?),
        None => return Err(ImportError::EmptyFile),
    };

    let mut rows = Vec::new();
    for record in records {
        rows.push(cells(&record?));
    }

    Ok(RowGrid { headers, rows })
}

fn cells(record: &csv::ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}
