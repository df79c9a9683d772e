//! Robust z-score anomaly detection over numeric columns

use crate::types::{AnomalyReport, Dataset};

use super::stats;

/// Scales MAD to the standard deviation of a normal distribution
const MAD_SCALE: f64 = 0.6745;

/// Evenly spaced row indices, at most `max_samples` of them
fn sample_rows(n_rows: usize, max_samples: usize) -> Vec<usize> {
    if n_rows <= max_samples {
        return (0..n_rows).collect();
    }
    (0..max_samples).map(|i| i * n_rows / max_samples).collect()
}

/// Flag rows where any numeric column has a robust z-score above `threshold`.
///
/// Missing values count as 0. Indices refer to rows of the original dataset.
pub fn detect_anomalies(dataset: &Dataset, max_samples: usize, threshold: f64) -> AnomalyReport {
    let numeric: Vec<&[Option<f64>]> = dataset
        .numeric_columns()
        .filter_map(|column| column.numeric())
        .collect();

    if numeric.is_empty() || dataset.n_rows() == 0 {
        return AnomalyReport::Skipped {
            note: "no numeric columns or empty dataframe".to_string(),
        };
    }

    let rows = sample_rows(dataset.n_rows(), max_samples.max(1));
    let mut flagged = vec![false; rows.len()];

    for values in numeric {
        let sample: Vec<f64> = rows.iter().map(|&r| values[r].unwrap_or(0.0)).collect();
        let (Some(median), Some(mad)) = (stats::median(&sample), stats::mad(&sample)) else {
            continue;
        };
        // Over half the sample shares one value; nothing is unusual by this measure
        if mad == 0.0 {
            continue;
        }

        for (i, v) in sample.iter().enumerate() {
            if (MAD_SCALE * (v - median) / mad).abs() > threshold {
                flagged[i] = true;
            }
        }
    }

    let anomaly_indices: Vec<usize> = rows
        .iter()
        .zip(&flagged)
        .filter(|(_, &hit)| hit)
        .map(|(&row, _)| row)
        .collect();

    AnomalyReport::Checked {
        n_checked: rows.len(),
        n_anomalies: anomaly_indices.len(),
        anomaly_indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::DatasetLoader;

    #[test]
    fn test_flags_outlier_row() {
        let dataset = DatasetLoader::load(
            "a.csv",
            b"x,label\n10,a\n11,b\n9,c\n10,d\n12,e\n8,f\n500,g\n10,h\n",
        )
        .unwrap();

        match detect_anomalies(&dataset, 5000, 3.5) {
            AnomalyReport::Checked {
                n_checked,
                n_anomalies,
                anomaly_indices,
            } => {
                assert_eq!(n_checked, 8);
                assert_eq!(n_anomalies, 1);
                assert_eq!(anomaly_indices, vec![6]);
            }
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[test]
    fn test_no_numeric_columns_is_noted() {
        let dataset = DatasetLoader::load("a.csv", b"name\nx\ny\n").unwrap();
        assert_eq!(
            detect_anomalies(&dataset, 5000, 3.5),
            AnomalyReport::Skipped {
                note: "no numeric columns or empty dataframe".to_string()
            }
        );
    }

    #[test]
    fn test_sampling_caps_rows_checked() {
        assert_eq!(sample_rows(10, 4), vec![0, 2, 5, 7]);
        assert_eq!(sample_rows(3, 4), vec![0, 1, 2]);
    }
}
