//! The uniform search contract consumed by every query tool.

use crate::error::QueryError;
use crate::metadata::EntityDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Direction of a sort field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub const ALL: [SortOrder; 2] = [SortOrder::Asc, SortOrder::Desc];

    pub fn name(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Parses a direction token, falling back to [`SortOrder::Asc`] for
    /// anything unrecognized. The fallback is logged at `debug`.
    pub fn parse_lenient(token: &str) -> SortOrder {
        token.parse().unwrap_or_else(|_| {
            tracing::debug!("Unknown sort direction '{}', using ascending order", token);
            SortOrder::Asc
        })
    }

    pub fn is_ascending(self) -> bool {
        self == SortOrder::Asc
    }
}

impl Display for SortOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        SortOrder::ALL
            .into_iter()
            .find(|order| order.name().eq_ignore_ascii_case(token))
            .ok_or_else(|| {
                QueryError::invalid_parameter("sortOrder", s, SortOrder::ALL.map(SortOrder::name))
            })
    }
}

/// How a free-text term is matched against a candidate field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMode {
    Exact,
    StartsWith,
    EndsWith,
    #[default]
    Contains,
}

impl MatchMode {
    pub const ALL: [MatchMode; 4] = [
        MatchMode::Exact,
        MatchMode::StartsWith,
        MatchMode::EndsWith,
        MatchMode::Contains,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MatchMode::Exact => "EXACT",
            MatchMode::StartsWith => "STARTS_WITH",
            MatchMode::EndsWith => "ENDS_WITH",
            MatchMode::Contains => "CONTAINS",
        }
    }
}

impl FromStr for MatchMode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        MatchMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(token))
            .ok_or_else(|| {
                QueryError::invalid_parameter("searchType", s, MatchMode::ALL.map(MatchMode::name))
            })
    }
}

/// A search request as decoded from query parameters.
///
/// Every field is optional. `search_fields` and `match_mode` are not part of
/// the request, the calling service sets them to say how free text applies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSpecification {
    pub id: Option<String>,
    pub ids: Option<Vec<String>>,
    pub deleted: Option<bool>,
    pub archived: Option<bool>,
    pub search: Option<String>,
    /// Comma separated field paths.
    pub sort_by: Option<String>,
    /// Comma separated directions, paired with `sort_by` by position.
    pub sort_order: Option<String>,
    /// 1-based.
    pub page: Option<i64>,
    pub size: Option<i64>,
    /// Projection allow-list.
    pub fields: Option<Vec<String>>,
    #[serde(skip)]
    pub search_fields: Vec<String>,
    #[serde(skip)]
    pub match_mode: MatchMode,
}

impl SearchSpecification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = Some(deleted);
        self
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>, sort_order: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_order = Some(sort_order.into());
        self
    }

    pub fn with_sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    pub fn with_page(mut self, page: i64, size: i64) -> Self {
        self.page = Some(page);
        self.size = Some(size);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Lowercased whitespace-separated terms of `search`. Every term must
    /// match in at least one candidate field.
    pub fn search_terms(&self) -> Vec<String> {
        self.search
            .as_deref()
            .map(|search| search.split_whitespace().map(str::to_lowercase).collect())
            .unwrap_or_default()
    }

    /// The candidate fields for free text: the explicit `search_fields`, or
    /// the descriptor's searchable fields if none were given.
    pub fn effective_search_fields(&self, descriptor: &EntityDescriptor) -> Vec<String> {
        if self.search_fields.is_empty() {
            descriptor
                .searchable_fields()
                .into_iter()
                .map(str::to_owned)
                .collect()
        } else {
            self.search_fields.clone()
        }
    }
}
