//! Table file I/O for event inputs and panel outputs

use crate::error::{PanelError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Data loader for various file formats
pub struct DataLoader {
    /// Rows used to infer CSV column types
    infer_schema_length: usize,
    /// Parse date-like CSV strings into Date/Datetime columns
    try_parse_dates: bool,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: 100,
            try_parse_dates: true,
        }
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows;
        self
    }

    pub fn with_try_parse_dates(mut self, parse: bool) -> Self {
        self.try_parse_dates = parse;
        self
    }

    /// Load a CSV file
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.load_csv_with_separator(path, b',')
    }

    fn load_csv_with_separator(&self, path: impl AsRef<Path>, separator: u8) -> Result<DataFrame> {
        let file = File::open(path.as_ref())?;

        let parse_opts = CsvParseOptions::default()
            .with_separator(separator)
            .with_try_parse_dates(self.try_parse_dates);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| PanelError::Data(e.to_string()))
    }

    /// Load a Parquet file
    pub fn load_parquet(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = File::open(path.as_ref())?;

        ParquetReader::new(file)
            .finish()
            .map_err(|e| PanelError::Data(e.to_string()))
    }

    /// Load a JSON file (line-delimited)
    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = File::open(path.as_ref())?;

        JsonReader::new(file)
            .with_json_format(JsonFormat::JsonLines)
            .finish()
            .map_err(|e| PanelError::Data(e.to_string()))
    }

    /// Detect file format from extension and load
    pub fn load_auto(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        match extension(path).as_str() {
            "csv" => self.load_csv(path),
            "tsv" => self.load_csv_with_separator(path, b'\t'),
            "parquet" | "pq" => self.load_parquet(path),
            "json" | "jsonl" => self.load_json(path),
            other => Err(PanelError::InvalidInput(format!(
                "Unsupported table format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Save DataFrame to various formats
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;

        CsvWriter::new(&mut file)
            .finish(df)
            .map_err(|e| PanelError::Data(e.to_string()))
    }

    /// Save to Parquet
    pub fn save_parquet(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;

        ParquetWriter::new(file)
            .finish(df)
            .map_err(|e| PanelError::Data(e.to_string()))?;

        Ok(())
    }

    /// Save to line-delimited JSON
    pub fn save_json(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;

        JsonWriter::new(&mut file)
            .with_json_format(JsonFormat::JsonLines)
            .finish(df)
            .map_err(|e| PanelError::Data(e.to_string()))
    }

    /// Pick the writer from the file extension
    pub fn save_auto(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match extension(path).as_str() {
            "csv" => Self::save_csv(df, path),
            "parquet" | "pq" => Self::save_parquet(df, path),
            "json" | "jsonl" => Self::save_json(df, path),
            other => Err(PanelError::InvalidInput(format!(
                "Unsupported table format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn create_test_csv() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,event_date,value").unwrap();
        writeln!(file, "1,2012-01-05,2").unwrap();
        writeln!(file, "2,2012-03-01,3").unwrap();
        writeln!(file, "3,2012-07-19,9").unwrap();
        file
    }

    #[test]
    fn test_load_csv_parses_dates() {
        let file = create_test_csv();
        let df = DataLoader::new().load_auto(file.path()).unwrap();

        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 3);
        assert_eq!(df.column("event_date").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn test_unknown_extension() {
        let err = DataLoader::new().load_auto("events.xlsx").unwrap_err();
        assert!(matches!(err, PanelError::InvalidInput(_)));
    }

    #[test]
    fn test_save_and_reload_parquet() {
        let mut df = df!(
            "a" => &[1i64, 2, 3],
            "b" => &[Some(0.5), None, Some(1.5)]
        )
        .unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panel.parquet");
        DataSaver::save_auto(&mut df, &path).unwrap();

        let loaded = DataLoader::new().load_auto(&path).unwrap();
        assert!(loaded.equals_missing(&df));
    }
}
