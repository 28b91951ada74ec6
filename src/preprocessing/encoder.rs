//! Label encoding of categorical values

use crate::error::{HybridError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Maps each distinct value to an integer in sorted order of the values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    column: String,
    classes: Vec<String>,
    mapping: HashMap<String, usize>,
}

impl LabelEncoder {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ..Default::default()
        }
    }

    /// Learn the value → code mapping
    pub fn fit<S: AsRef<str>>(&mut self, values: &[S]) -> &mut Self {
        let distinct: BTreeSet<&str> = values.iter().map(|v| v.as_ref()).collect();
        self.classes = distinct.into_iter().map(str::to_string).collect();
        self.mapping = self
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        self
    }

    pub fn transform<S: AsRef<str>>(&self, values: &[S]) -> Result<Vec<usize>> {
        values
            .iter()
            .map(|v| {
                self.mapping.get(v.as_ref()).copied().ok_or_else(|| HybridError::UnknownCategory {
                    column: self.column.clone(),
                    value: v.as_ref().to_string(),
                })
            })
            .collect()
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, values: &[S]) -> Result<Vec<usize>> {
        self.fit(values);
        self.transform(values)
    }

    pub fn inverse_transform(&self, codes: &[usize]) -> Result<Vec<String>> {
        codes
            .iter()
            .map(|&c| {
                self.classes.get(c).cloned().ok_or_else(|| HybridError::InvalidParameter {
                    name: "code".to_string(),
                    value: c.to_string(),
                    reason: format!("encoder for '{}' has {} classes", self.column, self.classes.len()),
                })
            })
            .collect()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_codes() {
        let mut enc = LabelEncoder::new("color");
        let codes = enc.fit_transform(&["red", "blue", "red", "green"]).unwrap();
        assert_eq!(enc.classes(), &["blue", "green", "red"]);
        assert_eq!(codes, vec![2, 0, 2, 1]);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let values = ["b", "a", "c", "a"];
        let mut enc = LabelEncoder::new("x");
        let codes = enc.fit_transform(&values).unwrap();
        assert_eq!(enc.inverse_transform(&codes).unwrap(), values);
    }

    #[test]
    fn test_unknown_value_rejected() {
        let mut enc = LabelEncoder::new("x");
        enc.fit(&["a", "b"]);
        let err = enc.transform(&["c"]).unwrap_err();
        assert!(matches!(err, HybridError::UnknownCategory { .. }));
        assert!(enc.inverse_transform(&[5]).is_err());
    }
}
