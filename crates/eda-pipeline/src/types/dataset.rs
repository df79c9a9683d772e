//! In-memory tabular dataset handed to the analysis pipeline

use serde::{Deserialize, Serialize};

/// A single parsed cell before the column type is decided
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Interpret a raw delimited-text field
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_missing_marker(trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Number(value),
            _ => Cell::Text(raw.to_string()),
        }
    }
}

fn is_missing_marker(value: &str) -> bool {
    matches!(
        value,
        "" | "NA" | "N/A" | "NaN" | "nan" | "null" | "NULL" | "None" | "#N/A"
    )
}

/// Column storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
        }
    }
}

/// Typed column values
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn kind(&self) -> ColumnKind {
        match self.data {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        self.kind() == ColumnKind::Numeric
    }

    /// Numeric values with missing entries, if this is a numeric column
    pub fn numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(values) => Some(values),
            ColumnData::Text(_) => None,
        }
    }

    pub fn missing_count(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(values) => values.iter().filter(|v| v.is_none()).count(),
            ColumnData::Text(values) => values.iter().filter(|v| v.is_none()).count(),
        }
    }

    /// Distinct non-missing values
    pub fn unique_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        match &self.data {
            ColumnData::Numeric(values) => {
                for v in values.iter().flatten() {
                    seen.insert(v.to_bits());
                }
            }
            ColumnData::Text(values) => {
                for v in values.iter().flatten() {
                    seen.insert(hash_text(v));
                }
            }
        }
        seen.len()
    }

    /// Cell rendered as a label, used for classification targets
    pub fn label_at(&self, row: usize) -> Option<String> {
        match &self.data {
            ColumnData::Numeric(values) => values.get(row).copied().flatten().map(|v| v.to_string()),
            ColumnData::Text(values) => values.get(row).cloned().flatten(),
        }
    }
}

fn hash_text(value: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Accumulates cells for one column and settles its type at the end.
/// A column is numeric when every present cell is a number.
#[derive(Debug, Default)]
pub struct ColumnBuilder {
    name: String,
    cells: Vec<Cell>,
    has_text: bool,
}

impl ColumnBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: Vec::new(),
            has_text: false,
        }
    }

    pub fn push(&mut self, cell: Cell) {
        if matches!(cell, Cell::Text(_)) {
            self.has_text = true;
        }
        self.cells.push(cell);
    }

    pub fn finish(self) -> Column {
        let data = if self.has_text {
            ColumnData::Text(
                self.cells
                    .into_iter()
                    .map(|cell| match cell {
                        Cell::Number(v) => Some(v.to_string()),
                        Cell::Text(s) => Some(s),
                        Cell::Missing => None,
                    })
                    .collect(),
            )
        } else {
            ColumnData::Numeric(
                self.cells
                    .into_iter()
                    .map(|cell| match cell {
                        Cell::Number(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            )
        };

        Column {
            name: self.name,
            data,
        }
    }
}

/// Loaded dataset: equal-length named columns
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    /// Build a dataset, rejecting ragged columns
    pub fn new(columns: Vec<Column>) -> std::result::Result<Self, String> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != n_rows) {
            return Err(format!(
                "column '{}' has {} rows, expected {}",
                bad.name,
                bad.len(),
                n_rows
            ));
        }
        Ok(Self { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_numeric())
    }

    pub fn total_missing(&self) -> usize {
        self.columns.iter().map(Column::missing_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(name: &str, raw: &[&str]) -> Column {
        let mut builder = ColumnBuilder::new(name);
        for value in raw {
            builder.push(Cell::parse(value));
        }
        builder.finish()
    }

    #[test]
    fn test_numeric_column_with_missing() {
        let column = build("x", &["1", "", "2.5", "NaN"]);
        assert!(column.is_numeric());
        assert_eq!(column.numeric().unwrap(), &[Some(1.0), None, Some(2.5), None]);
        assert_eq!(column.missing_count(), 2);
        assert_eq!(column.unique_count(), 2);
    }

    #[test]
    fn test_any_text_makes_text_column() {
        let column = build("city", &["1", "Lisbon", ""]);
        assert_eq!(column.kind(), ColumnKind::Text);
        assert_eq!(column.label_at(0), Some("1".to_string()));
        assert_eq!(column.label_at(2), None);
    }

    #[test]
    fn test_ragged_dataset_rejected() {
        let a = build("a", &["1", "2"]);
        let b = build("b", &["1"]);
        assert!(Dataset::new(vec![a, b]).is_err());
    }
}
