use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Identity of a row in a server-side collection. Backends use either numeric
/// primary keys or string slugs, so both forms are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl RowId {
    /// Parses a row id typed by a human: digits become `Int`, anything else `Text`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(value) => Self::Int(value),
            Err(_) => Self::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    /// `name` for ascending, `-name` for descending.
    pub fn to_param(&self) -> String {
        match self.direction {
            SortDirection::Asc => self.column.clone(),
            SortDirection::Desc => format!("-{}", self.column),
        }
    }

    /// Accepts `name`, `-name` and `name:desc` / `name:asc`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (column, direction) = if let Some(column) = raw.strip_prefix('-') {
            (column, SortDirection::Desc)
        } else if let Some((column, dir)) = raw.split_once(':') {
            let direction = if dir.eq_ignore_ascii_case("desc") {
                SortDirection::Desc
            } else if dir.eq_ignore_ascii_case("asc") {
                SortDirection::Asc
            } else {
                return None;
            };
            (column, direction)
        } else {
            (raw, SortDirection::Asc)
        };

        let column = column.trim();
        if column.is_empty() {
            return None;
        }
        Some(Self {
            column: column.to_string(),
            direction,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BulkAction {
    Delete,
    SetStatus { status: String },
}

impl BulkAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::SetStatus { .. } => "set_status",
        }
    }
}

/// Normalized serialization of every criterion that decides collection
/// membership: the search text and the structured filters. Sort and page are
/// not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSignature(String);

impl FilterSignature {
    pub fn compute(search: &str, filters: &BTreeMap<String, Option<String>>) -> Self {
        let active: BTreeMap<&str, &str> = filters
            .iter()
            .filter_map(|(key, value)| {
                let value = value.as_deref()?.trim();
                (!value.is_empty()).then_some((key.as_str(), value))
            })
            .collect();

        let normalized = serde_json::json!({
            "search": search.trim(),
            "filters": active,
        });
        Self(normalized.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_ignores_cleared_filters_and_whitespace() {
        let mut with_cleared = BTreeMap::new();
        with_cleared.insert("status".to_string(), Some("active".to_string()));
        with_cleared.insert("brand".to_string(), None);
        with_cleared.insert("city".to_string(), Some("  ".to_string()));

        let mut plain = BTreeMap::new();
        plain.insert("status".to_string(), Some("active".to_string()));

        assert_eq!(
            FilterSignature::compute("  audi ", &with_cleared),
            FilterSignature::compute("audi", &plain)
        );
    }

    #[test]
    fn signature_distinguishes_filter_values() {
        let mut active = BTreeMap::new();
        active.insert("status".to_string(), Some("active".to_string()));
        let mut cancelled = BTreeMap::new();
        cancelled.insert("status".to_string(), Some("cancelled".to_string()));

        assert_ne!(
            FilterSignature::compute("", &active),
            FilterSignature::compute("", &cancelled)
        );
    }

    #[test]
    fn sort_key_parses_prefix_and_suffix_forms() {
        assert_eq!(SortKey::parse("-created_at"), Some(SortKey::desc("created_at")));
        assert_eq!(SortKey::parse("name:desc"), Some(SortKey::desc("name")));
        assert_eq!(SortKey::parse("name"), Some(SortKey::asc("name")));
        assert_eq!(SortKey::parse("name:sideways"), None);
        assert_eq!(SortKey::parse("-"), None);
    }

    #[test]
    fn row_id_serializes_untagged() {
        assert_eq!(serde_json::to_string(&RowId::Int(7)).expect("json"), "7");
        assert_eq!(
            serde_json::to_string(&RowId::from("bk-7")).expect("json"),
            "\"bk-7\""
        );
        assert_eq!(RowId::parse(" 42 "), RowId::Int(42));
    }
}
