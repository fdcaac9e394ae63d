//! List endpoint query parameters.
//!
//! | Key | Meaning | On bad input |
//! |---|---|---|
//! | `ipp` | items per page, default 10 | falls back to 10 |
//! | `p` | page, 1-based, default 1 | falls back to 1 |
//! | `first` / `last` | take the first / last N items; non-negative integers only | error, including negative values |
//! | `fields` | comma-separated projection | not validated |
//! | `q` | JSON object filter | error |
//! | `sort` | field name, `-` prefix for descending | not validated |
//!
//! `first` and `last` are mutually exclusive. Pagination and sequence can
//! both be present; reconciling them is up to whoever runs the query.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, REQUEST};

const DEFAULT_IPP: u32 = 10;
const DEFAULT_PAGE: u32 = 1;

/// Parse failures for list parameters.
#[derive(Debug, thiserror::Error)]
pub enum ListParamsError {
    #[error("invalid `first` value {0:?}")]
    InvalidFirst(String),

    #[error("invalid `last` value {0:?}")]
    InvalidLast(String),

    #[error("last and first params are used together")]
    SequenceConflict,

    #[error("invalid `q` filter: {0}")]
    InvalidFilter(#[source] serde_json::Error),
}

impl ListParamsError {
    fn subcode(&self) -> u32 {
        match self {
            Self::InvalidFirst(_) => 1,
            Self::InvalidLast(_) => 2,
            Self::SequenceConflict => 3,
            Self::InvalidFilter(_) => 4,
        }
    }
}

impl From<ListParamsError> for Error {
    fn from(e: ListParamsError) -> Self {
        let message = e.to_string();
        let detail = match &e {
            ListParamsError::InvalidFilter(source) => source.to_string(),
            _ => String::new(),
        };
        REQUEST.bad_request(e.subcode(), &[message.as_str(), detail.as_str()])
    }
}

/// Cursor-style limiting, independent of pagination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sequence {
    #[default]
    None,
    First(u32),
    Last(u32),
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::First(_) => "first",
            Self::Last(_) => "last",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub items_per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: DEFAULT_PAGE, items_per_page: DEFAULT_IPP }
    }
}

/// A single sort key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

/// Everything a list endpoint needs to run its query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListParams {
    /// `None` when no filter was given, as opposed to an empty `{}` filter.
    pub query: Option<Map<String, Value>>,
    pub sequence: Sequence,
    pub pagination: Pagination,
    pub sort: Option<Sort>,
    /// Fields to project. Empty means all.
    pub fields: Vec<String>,
}

impl ListParams {
    /// Parses a raw (still percent-encoded) query string.
    pub fn from_query(query: Option<&str>) -> Result<Self, ListParamsError> {
        let raw = query.unwrap_or_default();
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect();
        // First occurrence wins; an empty value is the same as no value.
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .filter(|v| !v.is_empty())
        };

        let pagination = Pagination {
            page: positive_or(get("p"), DEFAULT_PAGE),
            items_per_page: positive_or(get("ipp"), DEFAULT_IPP),
        };

        let sequence = parse_sequence(get("first"), get("last"))?;

        let fields = get("fields")
            .map(|f| f.split(',').map(str::to_owned).collect())
            .unwrap_or_default();

        let query = get("q")
            .map(serde_json::from_str::<Map<String, Value>>)
            .transpose()
            .map_err(ListParamsError::InvalidFilter)?;

        let sort = get("sort").and_then(|s| {
            let (field, ascending) = match s.strip_prefix('-') {
                Some(field) => (field, false),
                None => (s, true),
            };
            (!field.is_empty()).then(|| Sort { field: field.to_owned(), ascending })
        });

        Ok(Self { query, sequence, pagination, sort, fields })
    }
}

fn positive_or(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|v| v.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

/// Both values are parse-attempted before the exclusivity check, so a
/// conflict is reported even when one of them is garbage.
fn parse_sequence(first: Option<&str>, last: Option<&str>) -> Result<Sequence, ListParamsError> {
    let parsed_first = first.map(|v| v.parse::<u32>().map_err(|_| ListParamsError::InvalidFirst(v.to_owned())));
    let parsed_last = last.map(|v| v.parse::<u32>().map_err(|_| ListParamsError::InvalidLast(v.to_owned())));

    match (parsed_first, parsed_last) {
        (Some(_), Some(_)) => Err(ListParamsError::SequenceConflict),
        (Some(n), None) => Ok(Sequence::First(n?)),
        (None, Some(n)) => Ok(Sequence::Last(n?)),
        (None, None) => Ok(Sequence::None),
    }
}

// ── ListResponse ──────────────────────────────────────────────────────────────

/// Standard body for a paginated list reply.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ListResponse<T> {
    pub ipp: u32,
    #[serde(rename = "p")]
    pub page: u32,
    pub total: u64,
    pub items: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(pagination: Pagination, total: u64, items: Vec<T>) -> Self {
        Self {
            ipp: pagination.items_per_page,
            page: pagination.page,
            total,
            items,
        }
    }
}
