//! Incoming HTTP request type.
//!
//! Input accessors merge the query string with the parsed body, body winning
//! on key collisions. The body is parsed lazily, on first access, according to
//! `Content-Type`: JSON for `application/json`, URL-encoded form data for
//! form posts and for `PUT`/`PATCH`/`DELETE` bodies.

use std::net::IpAddr;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::db::Db;
use crate::error::{Error, Result};
use crate::method::Method;
use crate::session::Session;

/// An incoming HTTP request.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) positional: Vec<String>,
    pub(crate) wildcard: Option<String>,
    pub(crate) remote_addr: Option<IpAddr>,
    pub(crate) session: Option<Session>,
    pub(crate) db: Option<Db>,
    parsed: OnceLock<Map<String, Value>>,
}

impl Request {
    /// A request for `target`, which may carry a query string
    /// (`/api/v1/tags?page=2`).
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        let query = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Self {
            method,
            path: format!("/{}", path.trim_start_matches('/')),
            query,
            headers: Vec::new(),
            body: Vec::new(),
            params: Vec::new(),
            positional: Vec::new(),
            wildcard: None,
            remote_addr: None,
            session: None,
            db: None,
            parsed: OnceLock::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self.parsed = OnceLock::new();
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.parsed = OnceLock::new();
        self
    }

    /// JSON body with the matching `Content-Type`.
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_db(mut self, db: Db) -> Self {
        self.db = Some(db);
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/tags/{id}`, `req.route_param("id")` on `/tags/42`
    /// returns `Some("42")`.
    pub fn route_param(&self, key: &str) -> Option<&str> {
        self.params.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All path parameters, in pattern order.
    pub fn route_params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Path parameter values in pattern order, the way an action receives
    /// them positionally. Controller actions on wildcard routes do not see the
    /// wildcard here. It is in [`wildcard_path`](Self::wildcard_path).
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn wildcard_path(&self) -> Option<&str> {
        self.wildcard.as_deref()
    }

    pub fn has_wildcard(&self) -> bool {
        self.wildcard.is_some()
    }

    /// First query-string value for `key`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The raw query-string pairs, in order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// One input value from the merged query + body data.
    pub fn input(&self, key: &str) -> Option<Value> {
        self.parsed_body()
            .get(key)
            .cloned()
            .or_else(|| self.query_map().remove(key))
    }

    /// String input, trimmed. Numbers and booleans are rendered as text.
    pub fn input_str(&self, key: &str) -> Option<String> {
        match self.input(key)? {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Everything from the query string and the body, body winning.
    pub fn all(&self) -> Map<String, Value> {
        let mut data = self.query_map();
        for (k, v) in self.parsed_body() {
            data.insert(k.clone(), v.clone());
        }
        data
    }

    pub fn only(&self, keys: &[&str]) -> Map<String, Value> {
        let mut data = self.all();
        data.retain(|k, _| keys.contains(&k.as_str()));
        data
    }

    pub fn except(&self, keys: &[&str]) -> Map<String, Value> {
        let mut data = self.all();
        data.retain(|k, _| !keys.contains(&k.as_str()));
        data
    }

    pub fn has(&self, key: &str) -> bool {
        self.parsed_body().contains_key(key) || self.query.iter().any(|(k, _)| k == key)
    }

    /// Present and not null, empty string or empty array.
    pub fn filled(&self, key: &str) -> bool {
        match self.input(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(_) => true,
        }
    }

    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    pub fn bearer_token(&self) -> Option<&str> {
        let auth = self.header("authorization")?;
        let (scheme, token) = auth.split_once(char::is_whitespace)?;
        scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie")?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    /// Client address: `Client-IP`, then the first `X-Forwarded-For` hop,
    /// then the socket peer.
    pub fn ip(&self) -> Option<IpAddr> {
        let forwarded = self.header("client-ip")
            .or_else(|| self.header("x-forwarded-for").and_then(|v| v.split(',').next()));
        forwarded
            .and_then(|v| v.trim().parse().ok())
            .or(self.remote_addr)
    }

    /// The session started for this request, if the `session` middleware ran.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The database handle injected by the application.
    pub fn db(&self) -> Result<&Db> {
        self.db.as_ref()
            .ok_or_else(|| Error::Config("no database configured for this application".into()))
    }

    fn parsed_body(&self) -> &Map<String, Value> {
        self.parsed.get_or_init(|| {
            parse_body(self.method, self.header("content-type"), &self.body)
        })
    }

    fn query_map(&self) -> Map<String, Value> {
        form_map(self.query.iter().map(|(k, v)| (k.clone(), v.clone())), false)
    }
}

fn parse_body(method: Method, content_type: Option<&str>, body: &[u8]) -> Map<String, Value> {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

    if content_type.contains("application/json") {
        return match serde_json::from_slice(body) {
            Ok(Value::Object(map)) => match sanitize(Value::Object(map)) {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            _ => Map::new(),
        };
    }

    let is_form = matches!(method, Method::Put | Method::Patch | Method::Delete)
        || content_type.contains("application/x-www-form-urlencoded");
    if !is_form {
        return Map::new();
    }

    let pairs = url::form_urlencoded::parse(body).map(|(k, v)| (k.into_owned(), v.into_owned()));
    form_map(pairs, true)
}

/// Folds form pairs into a map. `key[]` entries collect into an array.
fn form_map(pairs: impl Iterator<Item = (String, String)>, trim: bool) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = if trim { value.trim().to_owned() } else { value };
        match key.strip_suffix("[]") {
            Some(base) => {
                let slot = map.entry(base.to_owned()).or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = slot {
                    items.push(Value::String(value));
                }
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    map
}

fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_owned()),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_path_and_query() {
        let req = Request::new(Method::Get, "api/v1/tags?page=2&q=rust%20lang");
        assert_eq!(req.path(), "/api/v1/tags");
        assert_eq!(req.query("page"), Some("2"));
        assert_eq!(req.query("q"), Some("rust lang"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn json_body_merges_over_query_and_is_trimmed() {
        let req = Request::new(Method::Post, "/tags?name=query&with_count=1")
            .with_json(&json!({ "name": "  Rust  ", "ids": [1, 2] }));

        assert_eq!(req.input("name"), Some(json!("Rust")));
        assert_eq!(req.input_str("with_count").as_deref(), Some("1"));
        assert!(req.has("ids"));
        assert!(req.filled("ids"));
        assert_eq!(req.only(&["name"]).len(), 1);
        assert!(!req.except(&["name"]).contains_key("name"));
    }

    #[test]
    fn put_bodies_are_parsed_as_forms_without_content_type() {
        let req = Request::new(Method::Put, "/tags/3").with_body("name=Go&ids[]=4&ids[]=5");
        assert_eq!(req.input_str("name").as_deref(), Some("Go"));
        assert_eq!(req.input("ids"), Some(json!(["4", "5"])));
    }

    #[test]
    fn post_without_form_content_type_has_no_body_input() {
        let req = Request::new(Method::Post, "/tags").with_body("name=Go");
        assert!(!req.has("name"));

        let req = Request::new(Method::Post, "/tags")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("name=Go");
        assert!(req.has("name"));
    }

    #[test]
    fn filled_rejects_blank_values() {
        let req = Request::new(Method::Post, "/x")
            .with_json(&json!({ "a": "   ", "b": null, "c": 0 }));
        assert!(!req.filled("a"));
        assert!(!req.filled("b"));
        assert!(req.filled("c"));
        assert!(!req.filled("d"));
    }

    #[test]
    fn header_helpers() {
        let req = Request::new(Method::Get, "/")
            .with_header("Authorization", "Bearer  abc.def ")
            .with_header("Cookie", "theme=dark; hearth_session=s-1")
            .with_header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .with_header("X-Requested-With", "XMLHttpRequest");

        assert_eq!(req.bearer_token(), Some("abc.def"));
        assert_eq!(req.cookie("hearth_session"), Some("s-1"));
        assert_eq!(req.ip(), Some("203.0.113.9".parse().unwrap()));
        assert!(req.is_ajax());
        assert!(!req.is_json());
    }

    #[test]
    fn ip_falls_back_to_peer() {
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        let req = Request::new(Method::Get, "/").with_remote_addr(peer);
        assert_eq!(req.ip(), Some(peer));
    }

    #[test]
    fn db_is_required_when_asked_for() {
        let req = Request::new(Method::Get, "/");
        assert!(matches!(req.db(), Err(Error::Config(_))));
    }
}
