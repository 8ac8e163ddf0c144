//! The endpoint being priced.

use std::collections::HashMap;

use http::Request;
use url::form_urlencoded;

/// Identifies the endpoint a request is for.
///
/// Built once per request by the adapter and read by pricing strategies
/// and providers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    /// Request path, without the query string.
    pub path: String,
    /// HTTP method, upper case.
    pub method: String,
    /// Query parameters. Each key keeps its first value.
    pub params: HashMap<String, String>,
}

impl Resource {
    /// Creates a resource with no parameters.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            params: HashMap::new(),
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Extracts the resource from an HTTP request.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let uri = req.uri();
        Self {
            path: uri.path().to_owned(),
            method: req.method().as_str().to_owned(),
            params: parse_query(uri.query().unwrap_or_default()),
        }
    }
}

/// Splits a query string, keeping the first value per key.
fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}
