use serde::{Deserialize, Serialize};
use serde_json::Value;

use dualrag_core::filter::Filters;
use dualrag_core::traits::RemoteHealth;
use dualrag_core::types::{Document, RetrievalResult};
use dualrag_core::{Error, Result};

pub mod codes {
    pub const PARSE_ERROR: &str = "parse_error";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const METHOD_NOT_FOUND: &str = "method_not_found";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const INTERNAL: &str = "internal";
}

/// Metadata keys a remote `search` may filter on.
pub use dualrag_core::filter::EVENT_FILTER_KEYS as FILTER_KEYS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Carries exactly one of `result` or `error`. `id` echoes the request id
/// verbatim, or is `null` when the request had none that could be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn error(id: Value, code: &str, message: impl Into<String>) -> Self {
        Self { id, result: None, error: Some(ErrorBody { code: code.to_string(), message: message.into() }) }
    }

    pub fn into_result(self) -> Result<Value> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(result),
            (None, Some(err)) => Err(Error::protocol(err.code, err.message)),
            _ => Err(Error::protocol(codes::INVALID_REQUEST, "response must carry exactly one of result or error")),
        }
    }
}

/// The closed set of operations the bridge serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Search,
    ListAll,
    Health,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Search, Method::ListAll, Method::Health];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Search => "search",
            Method::ListAll => "list-all",
            Method::Health => "health",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

fn default_top_n() -> usize { 5 }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub similarity_floor: f32,
}

impl SearchParams {
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".into()));
        }
        if self.top_n == 0 {
            return Err(Error::InvalidQuery("top_n must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_floor) {
            return Err(Error::InvalidQuery(format!("similarity_floor must be within [0, 1], got {}", self.similarity_floor)));
        }
        if let Some(unknown) = self.filters.unknown_key(FILTER_KEYS) {
            return Err(Error::InvalidQuery(format!("unknown filter key '{unknown}'")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub results: Vec<RetrievalResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAllResult {
    pub total: usize,
    pub documents: Vec<Document>,
}

pub type HealthResult = RemoteHealth;

/// A request that passed structural validation.
#[derive(Debug, Clone)]
pub struct Call {
    pub id: Value,
    pub method: Method,
    pub params: Value,
}

/// Structural validation of one inbound frame. Failures come back as the
/// error response to send, carrying whatever id could be recovered.
pub fn parse_call(line: &str) -> std::result::Result<Call, Response> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Response::error(Value::Null, codes::PARSE_ERROR, format!("invalid json: {e}")))?;
    let Value::Object(mut obj) = value else {
        return Err(Response::error(Value::Null, codes::INVALID_REQUEST, "request must be a json object"));
    };

    let id = match obj.remove("id") {
        Some(id @ (Value::String(_) | Value::Number(_))) => id,
        Some(other) => return Err(Response::error(other, codes::INVALID_REQUEST, "id must be a string or number")),
        None => return Err(Response::error(Value::Null, codes::INVALID_REQUEST, "missing id")),
    };

    let method = match obj.get("method") {
        Some(Value::String(name)) => match Method::parse(name) {
            Some(m) => m,
            None => return Err(Response::error(id, codes::METHOD_NOT_FOUND, format!("unknown method '{name}'"))),
        },
        Some(_) => return Err(Response::error(id, codes::INVALID_REQUEST, "method must be a string")),
        None => return Err(Response::error(id, codes::INVALID_REQUEST, "missing method")),
    };

    let params = match obj.remove("params") {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(p @ Value::Object(_)) => p,
        Some(_) => return Err(Response::error(id, codes::INVALID_PARAMS, "params must be an object")),
    };

    Ok(Call { id, method, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_table_is_closed() {
        assert_eq!(Method::parse("list-all"), Some(Method::ListAll));
        assert_eq!(Method::parse("search"), Some(Method::Search));
        assert_eq!(Method::parse("list_all"), None);
        assert_eq!(Method::parse("delete"), None);
    }

    #[test]
    fn malformed_frames_map_to_stable_codes() {
        let code = |line: &str| parse_call(line).unwrap_err().error.unwrap().code;
        assert_eq!(code("{oops"), codes::PARSE_ERROR);
        assert_eq!(code("[1,2]"), codes::INVALID_REQUEST);
        assert_eq!(code(r#"{"method":"search"}"#), codes::INVALID_REQUEST);
        assert_eq!(code(r#"{"id":"1"}"#), codes::INVALID_REQUEST);
        assert_eq!(code(r#"{"id":"1","method":"drop-table"}"#), codes::METHOD_NOT_FOUND);
        assert_eq!(code(r#"{"id":"1","method":"search","params":[1]}"#), codes::INVALID_PARAMS);
    }

    #[test]
    fn error_echoes_recoverable_id() {
        let resp = parse_call(r#"{"id": 7, "method": "nope"}"#).unwrap_err();
        assert_eq!(resp.id, json!(7));
    }

    #[test]
    fn response_serializes_one_outcome() {
        let ok = serde_json::to_value(Response::success(json!("a"), json!({"x": 1}))).unwrap();
        assert!(ok.get("error").is_none());
        let err = serde_json::to_value(Response::error(json!("a"), codes::INTERNAL, "boom")).unwrap();
        assert!(err.get("result").is_none());
        assert_eq!(err["error"]["code"], "internal");
    }

    #[test]
    fn search_params_reject_unknown_filter_keys_and_fields() {
        let p: SearchParams = serde_json::from_value(json!({"query": "jazz", "filters": {"venue": "x"}})).unwrap();
        assert!(p.validate().is_err());
        assert!(serde_json::from_value::<SearchParams>(json!({"query": "jazz", "limit": 3})).is_err());
        let ok: SearchParams = serde_json::from_value(json!({"query": "jazz", "filters": {"is_free": true}})).unwrap();
        assert_eq!(ok.top_n, 5);
        assert!(ok.validate().is_ok());
    }
}
