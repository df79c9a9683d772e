//! Histogram and correlation heatmap data

use crate::types::{Column, CorrelationHeatmap, Dataset, Histogram, Visualizations};

use super::stats;

/// Bin the present values of a numeric column into `bins` equal-width bins.
///
/// A constant column gets the range `value ± 0.5`; an all-missing column
/// gets `[0, 1]` with zero counts.
pub fn histogram(column: &Column, bins: usize) -> Histogram {
    let bins = bins.max(1);
    let values = stats::present(column.numeric().unwrap_or_default());

    let (lo, hi) = match stats::min_max(&values) {
        Some((lo, hi)) if lo < hi => (lo, hi),
        Some((v, _)) => (v - 0.5, v + 0.5),
        None => (0.0, 1.0),
    };

    let width = (hi - lo) / bins as f64;
    let bin_edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();

    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    Histogram {
        column: column.name.clone(),
        bin_edges,
        counts,
    }
}

/// Histograms for the first `max_columns` numeric columns
pub fn numeric_histograms(dataset: &Dataset, max_columns: usize, bins: usize) -> Vec<Histogram> {
    dataset
        .numeric_columns()
        .take(max_columns)
        .map(|column| histogram(column, bins))
        .collect()
}

/// Correlation matrix over the `top_k` numeric columns with the highest
/// variance. `None` with fewer than two numeric columns.
pub fn correlation_heatmap(dataset: &Dataset, top_k: usize) -> Option<CorrelationHeatmap> {
    let numeric: Vec<&Column> = dataset.numeric_columns().collect();
    if numeric.len() < 2 {
        return None;
    }

    let mut by_variance: Vec<(&Column, f64)> = numeric
        .into_iter()
        .map(|column| {
            let values = stats::present(column.numeric().unwrap_or_default());
            (column, stats::variance(&values).unwrap_or(f64::NEG_INFINITY))
        })
        .collect();
    // Stable sort keeps column order among equal variances
    by_variance.sort_by(|a, b| b.1.total_cmp(&a.1));
    by_variance.truncate(top_k);

    let chosen: Vec<&Column> = by_variance.into_iter().map(|(c, _)| c).collect();
    let matrix = chosen
        .iter()
        .map(|a| {
            chosen
                .iter()
                .map(|b| {
                    stats::pearson(
                        a.numeric().unwrap_or_default(),
                        b.numeric().unwrap_or_default(),
                    )
                })
                .collect()
        })
        .collect();

    Some(CorrelationHeatmap {
        columns: chosen.iter().map(|c| c.name.clone()).collect(),
        matrix,
    })
}

pub fn visualizations(
    dataset: &Dataset,
    histogram_max_columns: usize,
    histogram_bins: usize,
    heatmap_top_k: usize,
) -> Visualizations {
    Visualizations {
        histograms: numeric_histograms(dataset, histogram_max_columns, histogram_bins),
        heatmap: correlation_heatmap(dataset, heatmap_top_k),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::DatasetLoader;

    #[test]
    fn test_histogram_bins_every_value() {
        let dataset = DatasetLoader::load("h.csv", b"v\n0\n1\n2\n3\n4\n").unwrap();
        let hist = histogram(dataset.column("v").unwrap(), 4);

        assert_eq!(hist.bin_edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(hist.counts, vec![1, 1, 1, 2]);
    }

    #[test]
    fn test_constant_column_histogram() {
        let dataset = DatasetLoader::load("h.csv", b"v\n7\n7\n").unwrap();
        let hist = histogram(dataset.column("v").unwrap(), 2);
        assert_eq!(hist.bin_edges, vec![6.5, 7.0, 7.5]);
        assert_eq!(hist.counts.iter().sum::<usize>(), 2);
    }

    #[test]
    fn test_histograms_limited_to_numeric_columns() {
        let dataset =
            DatasetLoader::load("h.csv", b"a,name,b,c\n1,x,2,3\n2,y,3,4\n").unwrap();
        let hists = numeric_histograms(&dataset, 2, 40);
        let names: Vec<_> = hists.iter().map(|h| h.column.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(hists[0].counts.len(), 40);
    }

    #[test]
    fn test_heatmap_orders_by_variance() {
        let dataset =
            DatasetLoader::load("c.csv", b"small,big,flat\n1,10,5\n2,30,5\n3,20,5\n").unwrap();
        let heatmap = correlation_heatmap(&dataset, 2).unwrap();

        assert_eq!(heatmap.columns, vec!["big", "small"]);
        assert!((heatmap.matrix[0][0].unwrap() - 1.0).abs() < 1e-9);
        assert!((heatmap.matrix[0][1].unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_heatmap_needs_two_numeric_columns() {
        let dataset = DatasetLoader::load("c.csv", b"a,b\n1,x\n2,y\n").unwrap();
        assert!(correlation_heatmap(&dataset, 8).is_none());
    }
}
