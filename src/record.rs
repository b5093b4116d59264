use serde::Serialize;
use std::fmt;

/// A single field value read out of a record
///
/// The list-view pipeline never looks at concrete entity types; it only sees
/// the values that a [`Record`] hands back for a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Free text (names, e-mails, phones, enumerated categories)
    Text(String),

    /// Whole numbers (ids, years)
    Int(i64),

    /// Flags such as `credentialsNonExpired`
    Bool(bool),

    /// The record has no value at this path
    Missing,
}

impl FieldValue {
    /// Text used for substring search
    ///
    /// Numbers and flags are matched by their rendering; missing values never match.
    pub fn search_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.to_lowercase()),
            FieldValue::Int(n) => Some(n.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Missing)
    }
}

/// Dot separated accessor path such as `name` or `person.surname`
///
/// Paths may reach one level into a nested sub-record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        FieldPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(outer, inner)` for nested paths
    pub fn split(&self) -> (&str, Option<&str>) {
        match self.0.split_once('.') {
            Some((outer, inner)) => (outer, Some(inner)),
            None => (self.0.as_str(), None),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        FieldPath::new(value)
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        FieldPath(value)
    }
}

/// Read-only view of an entity record
///
/// Implemented by every entity kind and by plain JSON objects, so the same
/// pipeline serves typed tables and untyped exports alike.
pub trait Record {
    /// Stable unique identifier assigned by the backend
    fn id(&self) -> i64;

    /// Value stored at `path`, or [`FieldValue::Missing`]
    fn field(&self, path: &FieldPath) -> FieldValue;
}

impl<R: Record + ?Sized> Record for &R {
    fn id(&self) -> i64 {
        (**self).id()
    }

    fn field(&self, path: &FieldPath) -> FieldValue {
        (**self).field(path)
    }
}

impl Record for serde_json::Value {
    fn id(&self) -> i64 {
        self.get("id").and_then(serde_json::Value::as_i64).unwrap_or_default()
    }

    fn field(&self, path: &FieldPath) -> FieldValue {
        let (outer, inner) = path.split();
        let mut value = self.get(outer);
        if let Some(inner) = inner {
            value = value.and_then(|v| v.get(inner));
        }
        match value {
            Some(serde_json::Value::String(s)) => FieldValue::Text(s.clone()),
            Some(serde_json::Value::Bool(b)) => FieldValue::Bool(*b),
            Some(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(n) => FieldValue::Int(n),
                None => FieldValue::Text(n.to_string()),
            },
            _ => FieldValue::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_paths_reach_one_level_down() {
        let row = json!({
            "id": 7,
            "yearStarted": 2021,
            "person": { "surname": "Иванов", "phone": "+79990001122" }
        });

        assert_eq!(row.id(), 7);
        assert_eq!(row.field(&"yearStarted".into()), FieldValue::Int(2021));
        assert_eq!(
            row.field(&"person.surname".into()),
            FieldValue::Text("Иванов".into())
        );
        assert_eq!(row.field(&"person.name".into()), FieldValue::Missing);
        assert_eq!(row.field(&"missing.path".into()), FieldValue::Missing);
    }

    #[test]
    fn search_text_is_lowercased() {
        assert_eq!(
            FieldValue::from("Мехмат").search_text().as_deref(),
            Some("мехмат")
        );
        assert_eq!(FieldValue::Int(2020).search_text().as_deref(), Some("2020"));
        assert_eq!(FieldValue::Missing.search_text(), None);
    }
}
