//! Descriptive statistics over nullable numeric columns

use serde::{Deserialize, Serialize};

/// Per-column summary in the order a `describe()` table reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub q25: Option<f64>,
    #[serde(rename = "50%")]
    pub median: Option<f64>,
    #[serde(rename = "75%")]
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

impl DescriptiveStats {
    pub fn compute(values: &[Option<f64>]) -> Self {
        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = present.len();
        let mean = mean(&present);
        let std = sample_std(&present);

        Self {
            count,
            mean,
            std,
            min: present.first().copied(),
            q25: quantile_sorted(&present, 0.25),
            median: quantile_sorted(&present, 0.5),
            q75: quantile_sorted(&present, 0.75),
            max: present.last().copied(),
        }
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Standard deviation with one delta degree of freedom
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Quantile with linear interpolation between closest ranks.
/// `sorted` must be ascending.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Median of the present values
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_sorted(&present, 0.5)
}

/// Pearson correlation over rows where both values are present
pub fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for &(x, y) in &pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }

    let denom = (sxx * syy).sqrt();
    if denom == 0.0 {
        None
    } else {
        Some((sxy / denom).clamp(-1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let values = vec![Some(1.0), Some(2.0), None, Some(3.0), Some(4.0)];
        let stats = DescriptiveStats::compute(&values);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, Some(2.5));
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(4.0));
        assert_eq!(stats.q25, Some(1.75));
        assert_eq!(stats.median, Some(2.5));
        assert_eq!(stats.q75, Some(3.25));
        let std = stats.std.unwrap();
        assert!((std - 1.2909944).abs() < 1e-6);
    }

    #[test]
    fn test_single_value_has_no_std() {
        let stats = DescriptiveStats::compute(&[Some(7.0)]);
        assert_eq!(stats.std, None);
        assert_eq!(stats.median, Some(7.0));
    }

    #[test]
    fn test_all_missing() {
        let stats = DescriptiveStats::compute(&[None, None]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.min, None);
    }

    #[test]
    fn test_pearson() {
        let a = vec![Some(1.0), Some(2.0), Some(3.0), None];
        let b = vec![Some(2.0), Some(4.0), Some(6.0), Some(1.0)];
        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);

        let c = vec![Some(3.0), Some(2.0), Some(1.0), Some(0.0)];
        assert!((pearson(&a, &c).unwrap() + 1.0).abs() < 1e-12);

        let constant = vec![Some(1.0); 4];
        assert_eq!(pearson(&a, &constant), None);
    }

    #[test]
    fn test_serialized_keys() {
        let stats = DescriptiveStats::compute(&[Some(1.0), Some(2.0)]);
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("25%").is_some());
        assert!(json.get("75%").is_some());
    }
}
