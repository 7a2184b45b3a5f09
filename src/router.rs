//! Radix-tree request router with groups, names and string-resolved actions.
//!
//! Routes are registered into a flat table. On first dispatch the table is
//! compiled into one [`matchit`] tree per method, and the compiled form is
//! cached until the next registration.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use http::StatusCode;
use matchit::Router as MatchitRouter;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::BoxedHandler;
use crate::method::Method;
use crate::middleware::{Layer, Next};
use crate::registry::Registry;
use crate::request::Request;
use crate::response::Response;
use crate::route::{collapse_slashes, next_placeholder, Action, Placeholder, Route, RouteId};

/// Shared attributes for the routes registered inside [`Router::group`].
///
/// ```rust
/// use hearth::{Group, Router};
///
/// let mut router = Router::new();
/// router.group(
///     Group::new().prefix("/api/v1").middleware(["admin"]).name("api").controller("TagController"),
///     |r| {
///         r.get("/tags", "index").name("tags.index");
///     },
/// );
///
/// let route = router.route_named("api.tags.index").unwrap();
/// assert_eq!(route.uri(), "/api/v1/tags");
/// assert_eq!(route.middleware(), ["admin"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Group {
    prefix: Option<String>,
    middleware: Vec<String>,
    name: Option<String>,
    controller: Option<String>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_owned());
        self
    }

    pub fn middleware<I, S>(mut self, middleware: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware.extend(middleware.into_iter().map(Into::into));
        self
    }

    /// Prefix for the names of routes in the group, joined with `.`.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Controller for bare action names (`"index"` → `"TagController@index"`).
    pub fn controller(mut self, controller: &str) -> Self {
        self.controller = Some(controller.to_owned());
        self
    }
}

struct Entry {
    method: Method,
    pattern: String,
    route: RouteId,
}

/// The application router.
///
/// ```rust
/// use hearth::{Action, Controller, Method, Request, Router};
///
/// async fn home(_req: Request) -> &'static str { "welcome" }
/// async fn show(req: Request) -> String { format!("tag {}", req.route_param("id").unwrap_or("?")) }
///
/// let mut router = Router::new();
/// router.registry_mut().controller("TagController", Controller::new().action("show", show));
///
/// router.get("/", Action::handler(home)).name("home");
/// router.get(r"/tags/{id:\d+}", "TagController@show").name("tags.show");
/// router.matches(&[Method::Get, Method::Post], "/admin/{slug}/login", "AdminController@login");
///
/// assert_eq!(router.resolve_name("tags.show", &[("id", "7")]).as_deref(), Some("/tags/7"));
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    entries: Vec<Entry>,
    names: HashMap<String, RouteId>,
    groups: Vec<Group>,
    registry: Registry,
    table: OnceLock<Result<DispatchTable, (String, String)>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self { registry, ..Self::default() }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn get(&mut self, uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        self.add_route(&[Method::Get], uri, action)
    }

    pub fn post(&mut self, uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        self.add_route(&[Method::Post], uri, action)
    }

    pub fn put(&mut self, uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        self.add_route(&[Method::Put], uri, action)
    }

    pub fn patch(&mut self, uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        self.add_route(&[Method::Patch], uri, action)
    }

    pub fn delete(&mut self, uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        self.add_route(&[Method::Delete], uri, action)
    }

    pub fn options(&mut self, uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        self.add_route(&[Method::Options], uri, action)
    }

    /// GET, POST, PUT, PATCH and DELETE.
    pub fn any(&mut self, uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        self.add_route(&Method::ANY, uri, action)
    }

    pub fn matches(&mut self, methods: &[Method], uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        self.add_route(methods, uri, action)
    }

    pub fn add_route(&mut self, methods: &[Method], uri: &str, action: impl Into<Action>) -> RouteMut<'_> {
        let uri = self.apply_prefix(uri);

        let mut action = action.into();
        if let Action::Named(name) = &action {
            if !name.contains('@') {
                if let Some(controller) = self.groups.iter().rev().find_map(|g| g.controller.as_deref()) {
                    action = Action::Named(format!("{controller}@{name}"));
                }
            }
        }

        let mut route = Route::new(methods.to_vec(), uri.clone(), action);
        route.middleware = self.groups.iter().flat_map(|g| g.middleware.iter().cloned()).collect();
        let id = self.routes.len();
        self.routes.push(route);

        match uri.strip_suffix("/*") {
            Some(base) => {
                let base = if base.is_empty() { "/" } else { base };
                let tail = format!("{}/{{wildcard:.+}}", base.trim_end_matches('/'));
                self.push_entries(methods, base, id);
                self.push_entries(methods, &tail, id);
            }
            None => self.push_entries(methods, &uri, id),
        }
        self.invalidate();

        let name_prefix = self
            .groups
            .iter()
            .filter_map(|g| g.name.as_deref())
            .map(|n| n.trim_matches('.'))
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(".");
        RouteMut { router: self, id, name_prefix }
    }

    fn push_entries(&mut self, methods: &[Method], pattern: &str, route: RouteId) {
        for &method in methods {
            self.entries.push(Entry { method, pattern: pattern.to_owned(), route });
        }
    }

    fn apply_prefix(&self, uri: &str) -> String {
        let mut prefix = String::new();
        for group in &self.groups {
            if let Some(p) = &group.prefix {
                prefix.push('/');
                prefix.push_str(p.trim_matches('/'));
            }
        }
        let joined = format!("{prefix}/{}", uri.trim_matches('/'));
        collapse_slashes(&format!("/{}", joined.trim_matches('/')))
    }

    /// Registers the routes added by `routes` with the group's attributes.
    /// Groups nest: prefixes and names concatenate, middleware accumulates
    /// outermost first.
    pub fn group(&mut self, group: Group, routes: impl FnOnce(&mut Self)) -> &mut Self {
        self.groups.push(group);
        routes(self);
        self.groups.pop();
        self
    }

    fn invalidate(&mut self) {
        self.table = OnceLock::new();
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route_named(&self, name: &str) -> Option<&Route> {
        self.names.get(name).and_then(|&id| self.routes.get(id))
    }

    /// URI of the named route, or `None` if no route has that name.
    pub fn resolve_name(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        self.route_named(name).map(|route| route.build_uri(params))
    }

    pub fn generate_url(&self, name: &str, params: &[(&str, &str)]) -> Result<String> {
        self.resolve_name(name, params).ok_or_else(|| Error::UnknownRoute(name.to_owned()))
    }

    fn table(&self) -> Result<&DispatchTable> {
        self.table
            .get_or_init(|| DispatchTable::build(&self.entries))
            .as_ref()
            .map_err(|(pattern, reason)| Error::invalid_route(pattern, reason.clone()))
    }

    /// Builds the dispatch table and checks that every controller action
    /// and middleware the routes name is registered.
    pub fn compile(&self) -> Result<()> {
        self.table()?;
        for route in &self.routes {
            self.registry.resolve_layers(&route.middleware)?;
            if let Action::Named(name) = &route.action {
                self.registry.resolve_action(name)?;
            }
        }
        debug!(routes = self.routes.len(), names = self.names.len(), "route table compiled");
        Ok(())
    }

    /// Routes `req` and runs the matched route's middleware and action.
    ///
    /// Misses answer `404`. A path registered only for other methods
    /// answers `405` with an `Allow` header. A path with one trailing slash
    /// is retried without it.
    pub async fn dispatch(&self, req: Request) -> Response {
        let table = match self.table() {
            Ok(table) => table,
            Err(e) => return Response::from_error(e),
        };

        let mut outcome = table.lookup(req.method, &req.path);
        if matches!(outcome, Lookup::NotFound) && req.path.len() > 1 && req.path.ends_with('/') {
            let trimmed = &req.path[..req.path.len() - 1];
            if let found @ Lookup::Found(..) = table.lookup(req.method, trimmed) {
                outcome = found;
            }
        }

        match outcome {
            Lookup::Found(id, params) => self.run_route(id, params, req).await,
            Lookup::MethodNotAllowed(allowed) => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header("allow", &allow)
                    .text("405 Method Not Allowed")
            }
            Lookup::NotFound => Response::builder().status(StatusCode::NOT_FOUND).text("404 Not Found"),
        }
    }

    async fn run_route(&self, id: RouteId, params: Vec<(String, String)>, mut req: Request) -> Response {
        let Some(route) = self.routes.get(id) else {
            return Response::from_error(Error::invalid_route("?", format!("route {id} vanished")));
        };
        let (layers, endpoint) = match self.resolve(route) {
            Ok(resolved) => resolved,
            Err(e) => return Response::from_error(e),
        };

        req.wildcard = params.iter().find(|(k, _)| k == "wildcard").map(|(_, v)| v.clone());
        req.positional = match &route.action {
            Action::Handler(_) => params.iter().map(|(_, v)| v.clone()).collect(),
            Action::Named(_) => params.iter().filter(|(k, _)| k != "wildcard").map(|(_, v)| v.clone()).collect(),
        };
        req.params = params;

        Next::new(layers, endpoint).run(req).await
    }

    fn resolve(&self, route: &Route) -> Result<(Arc<[Layer]>, BoxedHandler)> {
        let layers = self.registry.resolve_layers(&route.middleware)?;
        let endpoint = match &route.action {
            Action::Handler(handler) => Arc::clone(handler),
            Action::Named(name) => self.registry.resolve_action(name)?,
        };
        Ok((layers, endpoint))
    }
}

/// Handle to a just-registered route, for naming it and adding middleware.
pub struct RouteMut<'a> {
    router: &'a mut Router,
    id: RouteId,
    name_prefix: String,
}

impl RouteMut<'_> {
    /// Names the route. Inside named groups the group names are prepended.
    /// A name already in use is taken over by this route.
    pub fn name(self, name: &str) -> Self {
        let full = if self.name_prefix.is_empty() { name.to_owned() } else { format!("{}.{name}", self.name_prefix) };
        if let Some(route) = self.router.routes.get_mut(self.id) {
            if let Some(old) = route.name.replace(full.clone()) {
                if self.router.names.get(&old) == Some(&self.id) {
                    self.router.names.remove(&old);
                }
            }
            self.router.names.insert(full, self.id);
        }
        self
    }

    /// Appends route middleware after any inherited from groups.
    pub fn middleware<I, S>(self, middleware: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(route) = self.router.routes.get_mut(self.id) {
            route.middleware.extend(middleware.into_iter().map(Into::into));
        }
        self.router.invalidate();
        self
    }

    pub fn id(&self) -> RouteId {
        self.id
    }
}

#[derive(Clone)]
struct Target {
    route: RouteId,
    constraints: Arc<[(String, Regex)]>,
}

enum Lookup {
    Found(RouteId, Vec<(String, String)>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

struct DispatchTable {
    trees: HashMap<Method, MatchitRouter<Target>>,
}

impl DispatchTable {
    fn build(entries: &[Entry]) -> Result<Self, (String, String)> {
        let mut trees: HashMap<Method, MatchitRouter<Target>> = HashMap::new();
        for entry in entries {
            let variants = compile_pattern(&entry.pattern).map_err(|reason| (entry.pattern.clone(), reason))?;
            for (path, constraints) in variants {
                let target = Target { route: entry.route, constraints: constraints.into() };
                trees
                    .entry(entry.method)
                    .or_default()
                    .insert(path, target)
                    .map_err(|e| (entry.pattern.clone(), e.to_string()))?;
            }
        }
        Ok(Self { trees })
    }

    fn find(&self, method: Method, path: &str) -> Option<(RouteId, Vec<(String, String)>)> {
        let matched = self.trees.get(&method)?.at(path).ok()?;
        let params: Vec<(String, String)> =
            matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        let satisfied = matched.value.constraints.iter().all(|(name, re)| {
            params.iter().find(|(k, _)| k == name).is_none_or(|(_, v)| re.is_match(v))
        });
        satisfied.then(|| (matched.value.route, params))
    }

    fn lookup(&self, method: Method, path: &str) -> Lookup {
        if let Some((id, params)) = self.find(method, path) {
            return Lookup::Found(id, params);
        }
        if method == Method::Head {
            if let Some((id, params)) = self.find(Method::Get, path) {
                return Lookup::Found(id, params);
            }
        }
        let allowed: Vec<Method> = Method::ALL.into_iter().filter(|&m| self.find(m, path).is_some()).collect();
        if allowed.is_empty() { Lookup::NotFound } else { Lookup::MethodNotAllowed(allowed) }
    }
}

enum Segment {
    Literal(String),
    Param { name: String, optional: bool, catch_all: bool, constraint: Option<Regex> },
}

/// Splits on `/` outside of braces.
fn split_segments(pattern: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in pattern.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                if i > start {
                    segments.push(&pattern[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < pattern.len() {
        segments.push(&pattern[start..]);
    }
    segments
}

fn parse_segment(raw: &str) -> Result<Segment, String> {
    let Some((start, end)) = next_placeholder(raw) else {
        if raw.contains(['{', '}']) {
            return Err(format!("unbalanced brace in segment `{raw}`"));
        }
        return Ok(Segment::Literal(raw.to_owned()));
    };
    if start != 0 || end != raw.len() - 1 {
        return Err(format!("placeholder must fill the whole segment `{raw}`"));
    }

    let placeholder = Placeholder::parse(&raw[1..end]);
    let name = placeholder.name;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("invalid parameter name `{name}`"));
    }
    let catch_all = placeholder.is_catch_all();
    let constraint = match placeholder.constraint {
        Some(re) if !catch_all => {
            Some(Regex::new(&format!("^(?:{re})$")).map_err(|e| format!("bad constraint for `{name}`: {e}"))?)
        }
        _ => None,
    };
    let optional = placeholder.optional || placeholder.constraint == Some(".*");
    Ok(Segment::Param { name: name.to_owned(), optional, catch_all, constraint })
}

type Variant = (String, Vec<(String, Regex)>);

/// Translates a pattern into matchit paths. Trailing optional segments
/// expand into one path per prefix.
fn compile_pattern(pattern: &str) -> Result<Vec<Variant>, String> {
    let segments = split_segments(pattern).into_iter().map(parse_segment).collect::<Result<Vec<_>, _>>()?;

    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        if let Segment::Param { catch_all: true, .. } = segment {
            if i != last {
                return Err("a catch-all parameter must be the last segment".to_owned());
            }
        }
    }

    let first_optional = segments.iter().position(|s| matches!(s, Segment::Param { optional: true, .. }));
    if let Some(first) = first_optional {
        if segments[first..].iter().any(|s| !matches!(s, Segment::Param { optional: true, .. })) {
            return Err("optional parameters must be trailing".to_owned());
        }
    }

    let lengths = match first_optional {
        Some(first) => (first..=segments.len()).collect(),
        None => vec![segments.len()],
    };
    Ok(lengths.into_iter().map(|len| render(&segments[..len])).collect())
}

fn render(segments: &[Segment]) -> Variant {
    let mut path = String::new();
    let mut constraints = Vec::new();
    for segment in segments {
        path.push('/');
        match segment {
            Segment::Literal(text) => path.push_str(text),
            Segment::Param { name, catch_all, constraint, .. } => {
                if *catch_all {
                    path.push_str(&format!("{{*{name}}}"));
                } else {
                    path.push_str(&format!("{{{name}}}"));
                }
                if let Some(re) = constraint {
                    constraints.push((name.clone(), re.clone()));
                }
            }
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    (path, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Controller;

    fn echo() -> Action {
        Action::handler(|req: Request| async move {
            let params: Vec<String> = req.route_params().iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{} {}", req.positional().join(","), params.join("&"))
        })
    }

    async fn call(router: &Router, method: Method, target: &str) -> Response {
        router.dispatch(Request::new(method, target)).await
    }

    fn body(res: &Response) -> &str {
        std::str::from_utf8(res.body()).unwrap()
    }

    #[test]
    fn patterns_translate_to_matchit_syntax() {
        let paths = |p: &str| compile_pattern(p).unwrap().into_iter().map(|(path, _)| path).collect::<Vec<_>>();
        assert_eq!(paths("/"), ["/"]);
        assert_eq!(paths("/users/{id}"), ["/users/{id}"]);
        assert_eq!(paths("/files/{path:.+}"), ["/files/{*path}"]);
        assert_eq!(paths("/docs/{path:.*}"), ["/docs", "/docs/{*path}"]);
        assert_eq!(paths("/archive/{year?}/{month?}"), ["/archive", "/archive/{year}", "/archive/{year}/{month}"]);
        assert_eq!(compile_pattern(r"/p/{id:\d{2}}").unwrap()[0].1.len(), 1);
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        for bad in ["/a/{x?}/b", "/a/{p:.+}/b", "/file-{id}", "/a/{", "/a/{x:(}", "/a/{bad name}"] {
            assert!(compile_pattern(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn named_route_round_trip() {
        let mut router = Router::new();
        router.get("/admin/{slug}/dashboard", echo()).name("admin.dashboard");

        let uri = router.resolve_name("admin.dashboard", &[("slug", "acme")]).unwrap();
        assert_eq!(uri, "/admin/acme/dashboard");
        let res = call(&router, Method::Get, &uri).await;
        assert_eq!(body(&res), "acme slug=acme");

        assert_eq!(router.resolve_name("missing", &[]), None);
        assert!(matches!(router.generate_url("missing", &[]), Err(Error::UnknownRoute(n)) if n == "missing"));
    }

    #[tokio::test]
    async fn wildcard_matches_base_and_tail() {
        let mut router = Router::new();
        router.get("/files/*", echo());

        let res = call(&router, Method::Get, "/files").await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let res = call(&router, Method::Get, "/files/a/b/c").await;
        assert_eq!(body(&res), "a/b/c wildcard=a/b/c");
    }

    #[tokio::test]
    async fn controllers_get_the_wildcard_outside_positional() {
        let mut router = Router::new();
        router.registry_mut().controller(
            "FileController",
            Controller::new().action("show", |req: Request| async move {
                format!("{}|{}", req.positional().join(","), req.wildcard_path().unwrap_or("-"))
            }),
        );
        router.get("/{disk}/files/*", "FileController@show");

        let res = call(&router, Method::Get, "/public/files/img/logo.png").await;
        assert_eq!(body(&res), "public|img/logo.png");
        let res = call(&router, Method::Get, "/public/files").await;
        assert_eq!(body(&res), "public|-");
    }

    #[tokio::test]
    async fn trailing_slash_is_retried_once() {
        let mut router = Router::new();
        router.get("/blog", echo());
        assert_eq!(call(&router, Method::Get, "/blog/").await.status_code(), StatusCode::OK);
        assert_eq!(call(&router, Method::Get, "/blog//").await.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(call(&router, Method::Get, "/").await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_lists_allowed_ones() {
        let mut router = Router::new();
        router.matches(&[Method::Post, Method::Get], "/admin/{slug}/login", echo());
        router.delete("/admin/{slug}/login", echo());

        let res = call(&router, Method::Put, "/admin/acme/login").await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, POST, DELETE"));
        assert_eq!(body(&res), "405 Method Not Allowed");
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let mut router = Router::new();
        router.get("/", echo());
        assert_eq!(call(&router, Method::Head, "/").await.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn constraints_filter_matches() {
        let mut router = Router::new();
        router.get(r"/posts/{id:\d+}", echo());
        assert_eq!(call(&router, Method::Get, "/posts/42").await.status_code(), StatusCode::OK);
        assert_eq!(call(&router, Method::Get, "/posts/abc").await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn static_segments_win_over_params() {
        let mut router = Router::new();
        router.get("/tags/{id}", Action::handler(|_req: Request| async { "show" }));
        router.get("/tags/new", Action::handler(|_req: Request| async { "new" }));
        assert_eq!(body(&call(&router, Method::Get, "/tags/new").await), "new");
        assert_eq!(body(&call(&router, Method::Get, "/tags/9").await), "show");
    }

    #[test]
    fn nested_groups_concatenate() {
        let mut router = Router::new();
        router.group(Group::new().prefix("/admin/").middleware(["A"]).name("admin."), |r| {
            r.group(Group::new().prefix("{slug}").middleware(["B"]).name("panel").controller("AdminController"), |r| {
                r.get("dashboard/", "dashboard").name("home").middleware(["cache:private"]);
            });
            r.get("/", "HomeController@admin");
        });

        let route = router.route_named("admin.panel.home").unwrap();
        assert_eq!(route.uri(), "/admin/{slug}/dashboard");
        assert_eq!(route.middleware(), ["A", "B", "cache:private"]);
        assert!(matches!(route.action(), Action::Named(n) if n == "AdminController@dashboard"));

        let outer = &router.routes()[1];
        assert_eq!(outer.uri(), "/admin");
        assert_eq!(outer.middleware(), ["A"]);
    }

    #[test]
    fn renaming_releases_the_old_name() {
        let mut router = Router::new();
        router.get("/a", echo()).name("first").name("second");
        assert!(router.route_named("first").is_none());
        assert_eq!(router.route_named("second").unwrap().uri(), "/a");

        router.get("/b", echo()).name("second");
        assert_eq!(router.route_named("second").unwrap().uri(), "/b");
    }

    #[tokio::test]
    async fn duplicate_routes_fail_compilation() {
        let mut router = Router::new();
        router.get("/x", echo());
        router.get("/x", echo());
        assert!(matches!(router.compile(), Err(Error::InvalidRoute { .. })));
        assert_eq!(call(&router, Method::Get, "/x").await.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unresolvable_actions_are_500s_and_compile_errors() {
        let mut router = Router::new();
        router.get("/tags", "TagController@index");
        router.get("/open", echo()).middleware(["nope"]);

        assert!(matches!(router.compile(), Err(Error::Resolution { kind: "controller", .. })));
        let res = call(&router, Method::Get, "/tags").await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let res = call(&router, Method::Get, "/open").await;
        assert!(matches!(res.error(), Some(Error::Resolution { kind: "middleware", .. })));
    }

    #[tokio::test]
    async fn registration_after_dispatch_rebuilds_the_table() {
        let mut router = Router::new();
        router.get("/a", echo());
        assert_eq!(call(&router, Method::Get, "/b").await.status_code(), StatusCode::NOT_FOUND);
        router.get("/b", echo());
        assert_eq!(call(&router, Method::Get, "/b").await.status_code(), StatusCode::OK);
    }
}
