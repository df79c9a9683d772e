//! Human-readable summary lines

use crate::types::Dataset;

use super::stats;

const TOP_MISSING: usize = 5;
const SKEW_CHECK_COLUMNS: usize = 5;
const SKEW_THRESHOLD: f64 = 2.0;

/// Shape, missing-value and skew observations about a dataset
pub fn basic_insights(dataset: &Dataset) -> Vec<String> {
    let mut insights = vec![
        format!("Rows: {}, Columns: {}", dataset.n_rows(), dataset.n_cols()),
        format!("Total missing values: {}", dataset.total_missing()),
    ];

    let n_rows = dataset.n_rows();
    let mut missing: Vec<(&str, f64)> = dataset
        .columns()
        .iter()
        .map(|column| {
            let pct = if n_rows == 0 {
                0.0
            } else {
                column.missing_count() as f64 / n_rows as f64 * 100.0
            };
            (column.name.as_str(), pct)
        })
        .collect();
    missing.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (name, pct) in missing.into_iter().take(TOP_MISSING) {
        insights.push(format!("Missing: {} - {:.2}%", name, pct));
    }

    for column in dataset.numeric_columns().take(SKEW_CHECK_COLUMNS) {
        let values = stats::present(column.numeric().unwrap_or_default());
        if let Some(skew) = stats::skewness(&values) {
            if skew.abs() > SKEW_THRESHOLD {
                insights.push(format!(
                    "Highly skewed numeric column: {} (skew={:.2})",
                    column.name, skew
                ));
            }
        }
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::DatasetLoader;

    #[test]
    fn test_shape_and_missing_lines() {
        let dataset =
            DatasetLoader::load("a.csv", b"x,y,z\n1,,a\n2,,b\n3,4,\n4,5,d\n").unwrap();
        let insights = basic_insights(&dataset);

        assert_eq!(insights[0], "Rows: 4, Columns: 3");
        assert_eq!(insights[1], "Total missing values: 3");
        assert_eq!(insights[2], "Missing: y - 50.00%");
        assert_eq!(insights[3], "Missing: z - 25.00%");
        assert_eq!(insights[4], "Missing: x - 0.00%");
        assert_eq!(insights.len(), 5);
    }

    #[test]
    fn test_flags_skewed_column() {
        let mut csv = String::from("v\n");
        for _ in 0..30 {
            csv.push_str("1\n");
        }
        csv.push_str("1000\n");
        let dataset = DatasetLoader::load("s.csv", csv.as_bytes()).unwrap();

        let insights = basic_insights(&dataset);
        assert!(insights
            .iter()
            .any(|line| line.starts_with("Highly skewed numeric column: v")));
    }
}
