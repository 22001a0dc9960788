use crate::observations::error::ObservationError;
use log::debug;
use polars::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

pub const CSV_SEPARATOR: u8 = b';';

/// Reads a `;` separated CSV body with a header row.
///
/// With `all_strings`, no schema inference happens and every column is `String`;
/// otherwise polars infers the column types.
pub fn read_csv_frame(
    bytes: &[u8],
    all_strings: bool,
    source: &str,
) -> Result<DataFrame, ObservationError> {
    let mut temp_file =
        NamedTempFile::new().map_err(|e| ObservationError::CsvReadIo(source.to_string(), e))?;
    temp_file
        .write_all(bytes)
        .map_err(|e| ObservationError::CsvReadIo(source.to_string(), e))?;
    temp_file
        .flush()
        .map_err(|e| ObservationError::CsvReadIo(source.to_string(), e))?;

    let mut options = CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|parse| parse.with_separator(CSV_SEPARATOR));
    if all_strings {
        options = options.with_infer_schema_length(Some(0));
    }

    let df = options
        .try_into_reader_with_file_path(Some(temp_file.path().to_path_buf()))
        .map_err(|e| ObservationError::CsvReadPolars(source.to_string(), e))?
        .finish()
        .map_err(|e| ObservationError::CsvReadPolars(source.to_string(), e))?;
    debug!("read {} rows x {} columns from {}", df.height(), df.width(), source);
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOURLY: &str = "geo_id_insee;lat;lon;reference_time;insert_time;validity_time;t;u\n\
        75114001;48.821667;2.337833;2024-03-01T12:00:00Z;2024-03-01T12:10:52Z;2024-03-01T12:00:00Z;283.65;71\n\
        75114001;48.821667;2.337833;2024-03-01T13:00:00Z;2024-03-01T13:10:40Z;2024-03-01T13:00:00Z;284.15;68\n";

    #[test]
    fn infers_numeric_columns() {
        let df = read_csv_frame(HOURLY.as_bytes(), false, "test").unwrap();
        assert_eq!(df.shape(), (2, 8));
        let t = df.column("t").unwrap().f64().unwrap();
        assert_eq!(t.get(1), Some(284.15));
    }

    #[test]
    fn all_strings_keeps_leading_zeros() {
        let body = "Id_station;Nom_usuel\n01014002;ARBENT\n";
        let df = read_csv_frame(body.as_bytes(), true, "test").unwrap();
        let ids = df.column("Id_station").unwrap().str().unwrap();
        assert_eq!(ids.get(0), Some("01014002"));
    }
}
