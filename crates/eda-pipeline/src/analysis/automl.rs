//! Baseline model recommendation for a target column

use std::collections::BTreeMap;

use crate::types::{Column, Dataset, ModelRecommendation};

use super::stats;

/// Numeric targets with more distinct values than this are treated as regression
const REGRESSION_MIN_UNIQUE: usize = 20;
/// Every fifth usable row goes to the test split
const TEST_EVERY: usize = 5;
const RIDGE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Classification,
    Regression,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Classification => "classification",
            TaskKind::Regression => "regression",
        }
    }
}

/// Regression for numeric targets with many distinct values, otherwise classification
pub fn infer_task(target: &Column) -> TaskKind {
    if target.is_numeric() && target.unique_count() > REGRESSION_MIN_UNIQUE {
        TaskKind::Regression
    } else {
        TaskKind::Classification
    }
}

fn unavailable(message: &str) -> ModelRecommendation {
    ModelRecommendation::Unavailable {
        error: message.to_string(),
    }
}

/// Fit a quick baseline on the numeric features and report its held-out score
pub fn recommend_model(dataset: &Dataset, target: &str) -> ModelRecommendation {
    let Some(target_column) = dataset.column(target) else {
        return unavailable("target not in dataframe");
    };

    let features: Vec<&[Option<f64>]> = dataset
        .numeric_columns()
        .filter(|c| c.name != target)
        .filter_map(|c| c.numeric())
        .collect();
    if features.is_empty() {
        return unavailable("no numeric features for baseline recommendation");
    }

    // Rows without a target value carry no signal
    let rows: Vec<usize> = (0..dataset.n_rows())
        .filter(|&r| target_column.label_at(r).is_some())
        .collect();

    let feature_row =
        |r: usize| -> Vec<f64> { features.iter().map(|f| f[r].unwrap_or(0.0)).collect() };

    let (train, test): (Vec<(usize, usize)>, Vec<(usize, usize)>) = rows
        .iter()
        .copied()
        .enumerate()
        .partition(|(i, _)| i % TEST_EVERY != TEST_EVERY - 1);
    if train.is_empty() || test.is_empty() {
        return unavailable("not enough rows with a target value for a train/test split");
    }

    let x_train: Vec<Vec<f64>> = train.iter().map(|&(_, r)| feature_row(r)).collect();
    let x_test: Vec<Vec<f64>> = test.iter().map(|&(_, r)| feature_row(r)).collect();

    let task = infer_task(target_column);
    tracing::debug!(
        "Baseline {} on '{}': {} train rows, {} test rows, {} features",
        task.as_str(),
        target,
        x_train.len(),
        x_test.len(),
        features.len()
    );

    match task {
        TaskKind::Regression => {
            let values = target_column.numeric().unwrap_or_default();
            let y_train: Vec<f64> = train.iter().filter_map(|&(_, r)| values[r]).collect();
            let y_test: Vec<f64> = test.iter().filter_map(|&(_, r)| values[r]).collect();

            let model = LinearRegression::fit(&x_train, &y_train);
            let predictions: Vec<f64> = x_test.iter().map(|x| model.predict(x)).collect();

            ModelRecommendation::Regression {
                task: task.as_str().to_string(),
                model: "LinearRegression".to_string(),
                r2: r2_score(&y_test, &predictions),
            }
        }
        TaskKind::Classification => {
            let label = |r: usize| target_column.label_at(r).unwrap_or_default();
            let y_train: Vec<String> = train.iter().map(|&(_, r)| label(r)).collect();
            let y_test: Vec<String> = test.iter().map(|&(_, r)| label(r)).collect();

            let model = NearestCentroid::fit(&x_train, &y_train);
            let correct = x_test
                .iter()
                .zip(&y_test)
                .filter(|(x, y)| model.predict(x) == Some(y.as_str()))
                .count();

            ModelRecommendation::Classification {
                task: task.as_str().to_string(),
                model: "NearestCentroidClassifier".to_string(),
                score: correct as f64 / y_test.len() as f64,
            }
        }
    }
}

/// Ordinary least squares with an intercept, solved through the normal equations
struct LinearRegression {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LinearRegression {
    fn fit(x: &[Vec<f64>], y: &[f64]) -> Self {
        let p = x.first().map(Vec::len).unwrap_or(0) + 1;
        let mut xtx = vec![vec![0.0; p]; p];
        let mut xty = vec![0.0; p];

        for (row, &target) in x.iter().zip(y) {
            let design: Vec<f64> = std::iter::once(1.0).chain(row.iter().copied()).collect();
            for i in 0..p {
                xty[i] += design[i] * target;
                for j in 0..p {
                    xtx[i][j] += design[i] * design[j];
                }
            }
        }
        // Keeps collinear or constant features solvable
        for (i, row) in xtx.iter_mut().enumerate().skip(1) {
            row[i] += RIDGE;
        }

        let beta = solve(xtx, xty).unwrap_or_else(|| {
            let mut beta = vec![0.0; p];
            beta[0] = stats::mean(y).unwrap_or(0.0);
            beta
        });

        Self {
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
        }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }
}

/// Gaussian elimination with partial pivoting; `None` when singular
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    let Some(m) = stats::mean(actual) else {
        return 0.0;
    };
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - m).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Nearest class mean on standardized features
struct NearestCentroid {
    means: Vec<f64>,
    scales: Vec<f64>,
    centroids: BTreeMap<String, Vec<f64>>,
}

impl NearestCentroid {
    fn fit(x: &[Vec<f64>], y: &[String]) -> Self {
        let p = x.first().map(Vec::len).unwrap_or(0);
        let mut means = Vec::with_capacity(p);
        let mut scales = Vec::with_capacity(p);
        for j in 0..p {
            let column: Vec<f64> = x.iter().map(|row| row[j]).collect();
            means.push(stats::mean(&column).unwrap_or(0.0));
            scales.push(match stats::std_dev(&column) {
                Some(s) if s > 0.0 => s,
                _ => 1.0,
            });
        }

        let mut sums: BTreeMap<String, (Vec<f64>, usize)> = BTreeMap::new();
        for (row, label) in x.iter().zip(y) {
            let entry = sums
                .entry(label.clone())
                .or_insert_with(|| (vec![0.0; p], 0));
            for (j, v) in row.iter().enumerate() {
                entry.0[j] += (v - means[j]) / scales[j];
            }
            entry.1 += 1;
        }

        let centroids = sums
            .into_iter()
            .map(|(label, (sum, count))| {
                (label, sum.into_iter().map(|s| s / count as f64).collect())
            })
            .collect();

        Self {
            means,
            scales,
            centroids,
        }
    }

    fn predict(&self, row: &[f64]) -> Option<&str> {
        let scaled: Vec<f64> = row
            .iter()
            .enumerate()
            .map(|(j, v)| (v - self.means[j]) / self.scales[j])
            .collect();

        self.centroids
            .iter()
            .map(|(label, centroid)| {
                let distance: f64 = centroid
                    .iter()
                    .zip(&scaled)
                    .map(|(c, s)| (c - s).powi(2))
                    .sum();
                (label, distance)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(label, _)| label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::DatasetLoader;

    #[test]
    fn test_missing_target() {
        let dataset = DatasetLoader::load("a.csv", b"x,y\n1,2\n").unwrap();
        assert_eq!(
            recommend_model(&dataset, "nope"),
            ModelRecommendation::Unavailable {
                error: "target not in dataframe".to_string()
            }
        );
    }

    #[test]
    fn test_no_numeric_features() {
        let dataset = DatasetLoader::load("a.csv", b"name,y\na,1\nb,2\n").unwrap();
        assert_eq!(
            recommend_model(&dataset, "y"),
            ModelRecommendation::Unavailable {
                error: "no numeric features for baseline recommendation".to_string()
            }
        );
    }

    #[test]
    fn test_linear_target_is_regression() {
        let mut csv = String::from("x,noise,y\n");
        for i in 0..50 {
            csv.push_str(&format!("{},{},{}\n", i, i % 3, 3 * i + 7));
        }
        let dataset = DatasetLoader::load("r.csv", csv.as_bytes()).unwrap();

        match recommend_model(&dataset, "y") {
            ModelRecommendation::Regression { task, model, r2 } => {
                assert_eq!(task, "regression");
                assert_eq!(model, "LinearRegression");
                assert!(r2 > 0.99, "r2 = {}", r2);
            }
            other => panic!("unexpected recommendation: {:?}", other),
        }
    }

    #[test]
    fn test_separable_labels_are_classification() {
        let mut csv = String::from("a,b,label\n");
        for i in 0..20 {
            csv.push_str(&format!("{},{},low\n", i % 4, i % 3));
            csv.push_str(&format!("{},{},high\n", 100 + i % 4, 50 + i % 3));
        }
        let dataset = DatasetLoader::load("c.csv", csv.as_bytes()).unwrap();

        match recommend_model(&dataset, "label") {
            ModelRecommendation::Classification { task, model, score } => {
                assert_eq!(task, "classification");
                assert_eq!(model, "NearestCentroidClassifier");
                assert_eq!(score, 1.0);
            }
            other => panic!("unexpected recommendation: {:?}", other),
        }
    }

    #[test]
    fn test_solve_small_system() {
        let x = solve(vec![vec![2.0, 1.0], vec![1.0, 3.0]], vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }
}
