//! A registered route and its pattern syntax.
//!
//! Patterns are paths with placeholders occupying whole segments:
//!
//! | placeholder      | matches                                        |
//! |------------------|------------------------------------------------|
//! | `{id}`           | one segment                                    |
//! | `{page?}`        | one optional segment (trailing only)           |
//! | `{id:\d+}`       | one segment that fully matches the regex       |
//! | `{path:.+}`      | the rest of the path, slashes included         |
//!
//! A pattern ending in `/*` is a wildcard route: it matches its base path and
//! everything below, with the remainder available as the `wildcard` param.

use std::fmt;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;

/// Index of a route in its router.
pub type RouteId = usize;

/// What a route runs.
#[derive(Clone)]
pub enum Action {
    /// A closure or `async fn`.
    Handler(BoxedHandler),
    /// `"Controller@method"`, resolved through the registry. Inside a group
    /// that names a controller, a bare `"method"` is completed with it.
    Named(String),
}

impl Action {
    pub fn handler(handler: impl Handler) -> Self {
        Self::Handler(handler.into_boxed_handler())
    }

    /// `(controller, method)` of a named action, if it has both parts.
    pub(crate) fn controller_method(name: &str) -> Option<(&str, &str)> {
        name.split_once('@')
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::Named(name.to_owned())
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Route {
    pub(crate) methods: Vec<Method>,
    pub(crate) uri: String,
    pub(crate) action: Action,
    pub(crate) name: Option<String>,
    pub(crate) middleware: Vec<String>,
}

impl Route {
    pub(crate) fn new(methods: Vec<Method>, uri: String, action: Action) -> Self {
        Self { methods, uri, action, name: None, middleware: Vec::new() }
    }

    pub fn methods(&self) -> &[Method] { &self.methods }
    pub fn uri(&self) -> &str { &self.uri }
    pub fn action(&self) -> &Action { &self.action }
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn middleware(&self) -> &[String] { &self.middleware }

    pub fn is_wildcard(&self) -> bool {
        self.uri.ends_with("/*")
    }

    /// Fills the pattern's placeholders from `params`.
    ///
    /// Unfilled optional placeholders vanish; unfilled required ones stay in
    /// the output as written. Duplicate slashes collapse.
    ///
    /// ```rust
    /// # use hearth::{Action, Router};
    /// let mut router = Router::new();
    /// router.get("/blog/{slug}/{page?}", "BlogController@show").name("blog.show");
    ///
    /// let route = router.route_named("blog.show").unwrap();
    /// assert_eq!(route.build_uri(&[("slug", "hello")]), "/blog/hello");
    /// assert_eq!(route.build_uri(&[("slug", "hello"), ("page", "2")]), "/blog/hello/2");
    /// ```
    pub fn build_uri(&self, params: &[(&str, &str)]) -> String {
        let pattern = match self.uri.strip_suffix("/*") {
            Some(base) => format!("{base}/{{wildcard?}}"),
            None => self.uri.clone(),
        };

        let mut out = String::with_capacity(pattern.len());
        let mut rest = pattern.as_str();
        while let Some((start, end)) = next_placeholder(rest) {
            out.push_str(&rest[..start]);
            let placeholder = Placeholder::parse(&rest[start + 1..end]);
            match params.iter().find(|(k, _)| *k == placeholder.name) {
                Some((_, value)) => out.push_str(value),
                None if placeholder.optional => {}
                None => out.push_str(&rest[start..=end]),
            }
            rest = &rest[end + 1..];
        }
        out.push_str(rest);

        let mut uri = collapse_slashes(&out);
        if uri.len() > 1 && uri.ends_with('/') {
            uri.pop();
        }
        uri
    }
}

/// A `{…}` token, without its braces.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Placeholder<'a> {
    pub(crate) name: &'a str,
    pub(crate) optional: bool,
    pub(crate) constraint: Option<&'a str>,
}

impl<'a> Placeholder<'a> {
    pub(crate) fn parse(token: &'a str) -> Self {
        match token.split_once(':') {
            Some((name, constraint)) => Self { name: name.trim(), optional: false, constraint: Some(constraint) },
            None => match token.strip_suffix('?') {
                Some(name) => Self { name: name.trim(), optional: true, constraint: None },
                None => Self { name: token.trim(), optional: false, constraint: None },
            },
        }
    }

    /// `.+` and `.*` capture the remainder of the path.
    pub(crate) fn is_catch_all(&self) -> bool {
        matches!(self.constraint, Some(".+" | ".*"))
    }
}

/// Byte range of the next balanced `{…}` in `s`, as (open, close) indexes.
/// Braces nest, so `{id:\d{2}}` is one placeholder.
pub(crate) fn next_placeholder(s: &str) -> Option<(usize, usize)> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    for (i, c) in s[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + i));
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}
