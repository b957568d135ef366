//! Query-string parameters of a request
//!
//! The controller layer reads a fixed set of keys from the query string:
//! `filter`, `search`, `with`, the pagination keys `limit`/`offset`/`order`,
//! a raw `id` and the response `format`.
//!
//! # Example
//! ```text
//! GET /api/users?limit=10&offset=20&order=name DESC
//! GET /api/users?filter={"status":"active"}&with=comments,profile
//! GET /api/users?search=[{"name":"adm"},{"email":"adm"}]&format=xml
//! ```

/// Query parameters of a single request
///
/// Pagination keys that are absent or unparsable keep the controller's
/// defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    /// Exact-match filter, as raw JSON
    pub filter: Option<String>,

    /// Partial-match search, as raw JSON
    pub search: Option<String>,

    /// Requested relations, one raw entry per `with` / `with[]` occurrence
    pub with: Vec<String>,

    pub limit: Option<i64>,

    pub offset: Option<i64>,

    pub order: Option<String>,

    /// Raw `id` parameter, used when the path carries no identifier
    pub id: Option<String>,

    /// Requested response format (`json` or `xml`)
    pub format: Option<String>,
}

impl QueryParams {
    /// Parse a raw query string (without the leading `?`)
    pub fn from_query_str(query: &str) -> Self {
        match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            Ok(pairs) => Self::from_pairs(pairs),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed query string");
                Self::default()
            }
        }
    }

    /// Build the parameters from decoded key/value pairs
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self::default();

        for (key, value) in pairs {
            match key.as_str() {
                "filter" => params.filter = Some(value),
                "search" => params.search = Some(value),
                "with" | "with[]" => params.with.push(value),
                "limit" => params.limit = parse_number("limit", &value),
                "offset" => params.offset = parse_number("offset", &value),
                "order" => params.order = Some(value),
                "id" => params.id = Some(value),
                "format" => params.format = Some(value),
                _ => {}
            }
        }

        params
    }

    /// The `id` parameter, ignoring empty values
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

fn parse_number(key: &str, raw: &str) -> Option<i64> {
    match raw.trim().parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = raw, "Ignoring non-numeric pagination parameter");
            None
        }
    }
}
