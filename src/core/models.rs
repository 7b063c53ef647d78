// src/core/models.rs

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

/// The key a module uses inside its own result to report that it failed.
pub const ERROR_KEY: &str = "Error";

// --- Result Tree ---

/// A single leaf or branch of a module's output.
///
/// Serialized untagged, so a tree maps one-to-one onto a plain JSON document.
/// Variant order matters for deserialization: `Null` and `Bool` must be tried
/// before `Number`, and `List` before `Tree`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<ResultValue>),
    Tree(ResultTree),
}

/// The universal output shape of every module: string keys mapping to values.
///
/// Keys are kept sorted so that a tree renders and serializes deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTree(BTreeMap<String, ResultValue>);

impl ResultTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree that only carries an error message under [`ERROR_KEY`].
    pub fn error(message: impl Into<String>) -> Self {
        Self::new().with(ERROR_KEY, message.into())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ResultValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Chainable variant of [`ResultTree::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ResultValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ResultValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResultValue)> {
        self.0.iter()
    }

    /// Returns the module-reported error message, if the tree carries one.
    pub fn error_message(&self) -> Option<&str> {
        match self.0.get(ERROR_KEY) {
            Some(ResultValue::Text(message)) => Some(message.as_str()),
            _ => None,
        }
    }
}

impl FromIterator<(String, ResultValue)> for ResultTree {
    fn from_iter<I: IntoIterator<Item = (String, ResultValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<ResultTree> for ResultValue {
    fn from(tree: ResultTree) -> Self {
        ResultValue::Tree(tree)
    }
}

impl From<String> for ResultValue {
    fn from(text: String) -> Self {
        ResultValue::Text(text)
    }
}

impl From<&str> for ResultValue {
    fn from(text: &str) -> Self {
        ResultValue::Text(text.to_string())
    }
}

impl From<bool> for ResultValue {
    fn from(flag: bool) -> Self {
        ResultValue::Bool(flag)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ResultValue {
                fn from(n: $t) -> Self {
                    ResultValue::Number(serde_json::Number::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(u16, u32, u64, usize, i32, i64);

impl From<f64> for ResultValue {
    /// Non-finite floats have no JSON representation and become `Null`.
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(ResultValue::Number)
            .unwrap_or(ResultValue::Null)
    }
}

/// Datetime leaves are stored as ISO-8601 strings.
impl From<DateTime<Utc>> for ResultValue {
    fn from(ts: DateTime<Utc>) -> Self {
        ResultValue::Text(ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl<T: Into<ResultValue>> From<Option<T>> for ResultValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ResultValue::Null)
    }
}

impl<T: Into<ResultValue>> From<Vec<T>> for ResultValue {
    fn from(items: Vec<T>) -> Self {
        ResultValue::List(items.into_iter().map(Into::into).collect())
    }
}

// --- Findings ---

// Severity level attached to a finding reported by a module.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

// A machine-readable finding produced while analysing module data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub code: &'static str,
}

impl Finding {
    pub fn new(severity: Severity, code: &'static str) -> Self {
        Self { severity, code }
    }
}

impl From<Finding> for ResultValue {
    fn from(finding: Finding) -> Self {
        ResultTree::new()
            .with("Severity", finding.severity.to_string())
            .with("Code", finding.code)
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ResultTree {
        let nested = ResultTree::new().with("Port", 22u16).with("Open", true);
        ResultTree::new()
            .with("Server", "nginx")
            .with("Latency", 12.5)
            .with("Count", 3usize)
            .with("Missing", None::<String>)
            .with("Ports", vec![nested.clone(), nested])
            .with("Tags", vec!["a", "b"])
    }

    #[test]
    fn json_round_trip_preserves_tree() {
        let tree = sample_tree();
        let json = serde_json::to_string(&tree).unwrap();
        let back: ResultTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn serializes_as_plain_json_object() {
        let tree = ResultTree::new().with("Open", true).with("Port", 80u16);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json, serde_json::json!({ "Open": true, "Port": 80 }));
    }

    #[test]
    fn error_message_only_reads_text_error_key() {
        assert_eq!(ResultTree::error("boom").error_message(), Some("boom"));
        assert_eq!(ResultTree::new().with(ERROR_KEY, true).error_message(), None);
        assert_eq!(sample_tree().error_message(), None);
    }

    #[test]
    fn datetime_leaf_is_iso8601() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            ResultValue::from(ts),
            ResultValue::Text("2024-05-01T10:20:30Z".to_string())
        );
    }

    #[test]
    fn finding_becomes_subtree() {
        let value = ResultValue::from(Finding::new(Severity::Warning, "DNS_SPF_MISSING"));
        let expected = ResultTree::new()
            .with("Severity", "Warning")
            .with("Code", "DNS_SPF_MISSING");
        assert_eq!(value, ResultValue::Tree(expected));
    }
}
