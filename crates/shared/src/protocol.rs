use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::{
    domain::{BulkAction, FilterSignature, RowId, SortKey},
    error::QueryParseError,
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Everything a list endpoint needs to produce one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub filters: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortKey>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            search: String::new(),
            filters: BTreeMap::new(),
            sort: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QueryParams {
    pub fn signature(&self) -> FilterSignature {
        FilterSignature::compute(&self.search, &self.filters)
    }

    /// Pairs in a stable order; cleared filters and an empty search are omitted.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let search = self.search.trim();
        if !search.is_empty() {
            pairs.push(("search".to_string(), search.to_string()));
        }
        for (key, value) in &self.filters {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                pairs.push((format!("filter[{key}]"), value.to_string()));
            }
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort".to_string(), sort.to_param()));
        }
        pairs.push(("page".to_string(), self.page.to_string()));
        pairs.push(("per_page".to_string(), self.page_size.to_string()));
        pairs
    }

    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.to_query_pairs() {
            serializer.append_pair(&key, &value);
        }
        serializer.finish()
    }

    /// Rebuilds parameters from a bookmarked query string. Unknown keys are
    /// ignored so links from newer console versions still open.
    pub fn from_query_string(raw: &str) -> Result<Self, QueryParseError> {
        let raw = raw.trim().trim_start_matches('?');
        let mut params = Self::default();

        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "search" => params.search = value.into_owned(),
                "page" => {
                    params.page = value
                        .parse::<u32>()
                        .ok()
                        .filter(|page| *page > 0)
                        .ok_or_else(|| QueryParseError::InvalidPage(value.to_string()))?;
                }
                "per_page" => {
                    params.page_size = value
                        .parse::<u32>()
                        .ok()
                        .filter(|size| *size > 0)
                        .ok_or_else(|| QueryParseError::InvalidPageSize(value.to_string()))?;
                }
                "sort" => {
                    let sort = SortKey::parse(&value)
                        .ok_or_else(|| QueryParseError::InvalidSort(value.to_string()))?;
                    params.sort = Some(sort);
                }
                other => {
                    if let Some(filter_key) = other
                        .strip_prefix("filter[")
                        .and_then(|rest| rest.strip_suffix(']'))
                    {
                        params
                            .filters
                            .insert(filter_key.to_string(), Some(value.into_owned()));
                    }
                }
            }
        }

        Ok(params)
    }
}

/// One row as delivered by a list endpoint. Display fields stay opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Row {
    pub fn new(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageOfRows {
    pub rows: Vec<Row>,
    pub total: u64,
}

impl PageOfRows {
    pub fn ids(&self) -> Vec<RowId> {
        self.rows.iter().map(|row| row.id.clone()).collect()
    }
}

/// Which rows a bulk action applies to: either an enumerated set, or every
/// row matching `filter_signature` except the listed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Directive {
    #[serde(rename_all = "camelCase")]
    Explicit { ids: BTreeSet<RowId> },
    #[serde(rename_all = "camelCase")]
    AllExcept {
        filter_signature: FilterSignature,
        excluded_ids: BTreeSet<RowId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub directive: Directive,
    pub filter_signature: FilterSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub affected: u64,
}
