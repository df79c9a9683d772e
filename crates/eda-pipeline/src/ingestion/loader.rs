//! Dataset loaders, dispatched by file extension

use bytes::Bytes;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;

use crate::error::{Error, Result};
use crate::types::{Cell, ColumnBuilder, Dataset};

/// Supported dataset formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    /// Comma-separated text
    Csv,
    /// Tab-separated text
    Tsv,
    /// Apache Parquet columnar file
    Parquet,
}

impl DatasetFormat {
    /// Detect the format from a filename's extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())?;

        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// Dataset loader
pub struct DatasetLoader;

impl DatasetLoader {
    /// Parse raw bytes into a dataset according to the filename's extension
    pub fn load(filename: &str, data: &[u8]) -> Result<Dataset> {
        let format = DatasetFormat::from_filename(filename).ok_or_else(|| {
            Error::load(
                filename,
                "unsupported dataset format (expected .csv, .tsv or .parquet)",
            )
        })?;

        tracing::debug!("Loading {} ({} bytes) as {:?}", filename, data.len(), format);

        let result = match format {
            DatasetFormat::Csv => Self::load_delimited(data, b','),
            DatasetFormat::Tsv => Self::load_delimited(data, b'\t'),
            DatasetFormat::Parquet => Self::load_parquet(data),
        };

        result.map_err(|message| Error::load(filename, message))
    }

    /// Parse delimited text with a header row.
    ///
    /// Short rows are padded with missing cells; rows wider than the header
    /// are rejected.
    fn load_delimited(data: &[u8], delimiter: u8) -> std::result::Result<Dataset, String> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let headers = reader
            .headers()
            .map_err(|e| format!("CSV parse error: {}", e))?
            .clone();

        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err("no columns to parse from file".to_string());
        }

        let mut builders: Vec<ColumnBuilder> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.trim();
                if name.is_empty() {
                    ColumnBuilder::new(format!("Unnamed: {}", i))
                } else {
                    ColumnBuilder::new(name)
                }
            })
            .collect();

        let width = builders.len();
        for record in reader.records() {
            let record = record.map_err(|e| format!("CSV parse error: {}", e))?;
            if record.len() > width {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return Err(format!(
                    "CSV parse error: expected {} fields in line {}, saw {}",
                    width,
                    line,
                    record.len()
                ));
            }

            for (i, builder) in builders.iter_mut().enumerate() {
                builder.push(record.get(i).map(Cell::parse).unwrap_or(Cell::Missing));
            }
        }

        Dataset::new(builders.into_iter().map(ColumnBuilder::finish).collect())
    }

    /// Parse a Parquet file via its row API
    fn load_parquet(data: &[u8]) -> std::result::Result<Dataset, String> {
        let reader = SerializedFileReader::new(Bytes::copy_from_slice(data))
            .map_err(|e| format!("Parquet read error: {}", e))?;

        let mut builders: Vec<ColumnBuilder> = reader
            .metadata()
            .file_metadata()
            .schema()
            .get_fields()
            .iter()
            .map(|field| ColumnBuilder::new(field.name()))
            .collect();

        if builders.is_empty() {
            return Err("no columns to parse from file".to_string());
        }

        let rows = reader
            .get_row_iter(None)
            .map_err(|e| format!("Parquet read error: {}", e))?;

        for row in rows {
            let row = row.map_err(|e| format!("Parquet row error: {}", e))?;
            for (builder, (_, field)) in builders.iter_mut().zip(row.get_column_iter()) {
                builder.push(field_to_cell(field));
            }
        }

        Dataset::new(builders.into_iter().map(ColumnBuilder::finish).collect())
    }
}

fn field_to_cell(field: &Field) -> Cell {
    let number = match field {
        Field::Null => return Cell::Missing,
        Field::Byte(v) => *v as f64,
        Field::Short(v) => *v as f64,
        Field::Int(v) => *v as f64,
        Field::Long(v) => *v as f64,
        Field::UByte(v) => *v as f64,
        Field::UShort(v) => *v as f64,
        Field::UInt(v) => *v as f64,
        Field::ULong(v) => *v as f64,
        Field::Float(v) => *v as f64,
        Field::Double(v) => *v,
        Field::Str(s) => return Cell::Text(s.clone()),
        other => return Cell::Text(other.to_string()),
    };

    if number.is_finite() {
        Cell::Number(number)
    } else {
        Cell::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnKind;

    #[test]
    fn test_format_dispatch() {
        assert_eq!(DatasetFormat::from_filename("a.CSV"), Some(DatasetFormat::Csv));
        assert_eq!(DatasetFormat::from_filename("a.tsv"), Some(DatasetFormat::Tsv));
        assert_eq!(DatasetFormat::from_filename("a.parquet"), Some(DatasetFormat::Parquet));
        assert_eq!(DatasetFormat::from_filename("a.xlsx"), None);
        assert_eq!(DatasetFormat::from_filename("noext"), None);
    }

    #[test]
    fn test_load_csv() {
        let data = b"age,city,score\n31,Porto,1.5\n,Lisbon,2.5\n45,Faro,\n";
        let dataset = DatasetLoader::load("people.csv", data).unwrap();

        assert_eq!(dataset.n_rows(), 3);
        assert_eq!(dataset.n_cols(), 3);
        assert_eq!(dataset.column("age").unwrap().kind(), ColumnKind::Numeric);
        assert_eq!(dataset.column("city").unwrap().kind(), ColumnKind::Text);
        assert_eq!(dataset.total_missing(), 2);
    }

    #[test]
    fn test_load_tsv() {
        let data = b"a\tb\n1\t2\n3\t4\n";
        let dataset = DatasetLoader::load("x.tsv", data).unwrap();
        assert_eq!(dataset.n_cols(), 2);
        assert_eq!(dataset.column("b").unwrap().numeric().unwrap(), &[Some(2.0), Some(4.0)]);
    }

    #[test]
    fn test_short_rows_are_padded_with_missing() {
        let data = b"a,b,c\n1,2,3\n4,5\n6,7,8\n";
        let dataset = DatasetLoader::load("short.csv", data).unwrap();

        assert_eq!(dataset.n_rows(), 3);
        assert_eq!(
            dataset.column("c").unwrap().numeric().unwrap(),
            &[Some(3.0), None, Some(8.0)]
        );
        assert_eq!(dataset.total_missing(), 1);
    }

    #[test]
    fn test_too_many_fields_is_load_error() {
        let data = b"a,b,c\n1,2,3\n3,4,5,6\n";
        let err = DatasetLoader::load("broken.csv", data).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
        assert!(err.to_string().contains("CSV parse error"));
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[test]
    fn test_empty_file_is_load_error() {
        let err = DatasetLoader::load("empty.csv", b"").unwrap_err();
        assert!(err.to_string().contains("no columns to parse"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = DatasetLoader::load("report.pdf", b"%PDF").unwrap_err();
        assert!(err.to_string().contains("unsupported dataset format"));
    }

    #[test]
    fn test_garbage_parquet_is_load_error() {
        let err = DatasetLoader::load("data.parquet", b"not parquet at all").unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }
}
