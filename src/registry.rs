//! Name → implementation tables for controllers and middleware.
//!
//! Route tables name their actions (`"TagController@index"`) and middleware
//! (`"cache:public"`) as strings. Everything those strings can refer to is
//! registered here at startup, so resolution is a map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{
    self, AdminGate, Authenticate, CacheControl, Layer, Middleware, SecurityHeaders, StartSession, Trace,
    VerifyCsrf,
};
use crate::session::SessionStore;

/// A named set of actions.
///
/// ```rust
/// use hearth::{Controller, Request};
///
/// async fn index(_req: Request) -> &'static str { "all tags" }
/// async fn show(req: Request) -> String { format!("tag {}", req.route_param("id").unwrap_or("?")) }
///
/// let tags = Controller::new().action("index", index).action("show", show);
/// # let _ = tags;
/// ```
#[derive(Clone, Default)]
pub struct Controller {
    actions: HashMap<String, BoxedHandler>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, name: &str, handler: impl Handler) -> Self {
        self.actions.insert(name.to_owned(), handler.into_boxed_handler());
        self
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }
}

#[derive(Clone, Default)]
pub struct Registry {
    controllers: HashMap<String, Controller>,
    middleware: HashMap<String, Arc<dyn Middleware>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in middleware, configured from `config`:
    ///
    /// | name               | middleware          |
    /// |--------------------|---------------------|
    /// | `trace`            | [`Trace`]           |
    /// | `session`          | [`StartSession`]    |
    /// | `auth`             | [`Authenticate`]    |
    /// | `admin`            | [`AdminGate`]       |
    /// | `security_headers` | [`SecurityHeaders`] |
    /// | `csrf`             | [`VerifyCsrf`]      |
    /// | `cache`            | [`CacheControl`]    |
    pub fn with_builtins(config: &Config, sessions: Arc<dyn SessionStore>) -> Self {
        let mut registry = Self::new();
        registry
            .middleware("trace", Trace)
            .middleware("session", StartSession::new(sessions, config.session.cookie.clone()))
            .middleware("auth", Authenticate)
            .middleware("admin", AdminGate::new(config.admin.login_path.clone(), config.admin.session_timeout))
            .middleware("security_headers", SecurityHeaders::for_env(&config.app.env))
            .middleware("csrf", VerifyCsrf)
            .middleware("cache", CacheControl);
        registry
    }

    /// Registers (or replaces) a controller.
    pub fn controller(&mut self, name: &str, controller: Controller) -> &mut Self {
        self.controllers.insert(name.to_owned(), controller);
        self
    }

    /// Registers (or replaces) a middleware under `name`.
    pub fn middleware(&mut self, name: &str, middleware: impl Middleware) -> &mut Self {
        self.middleware.insert(name.to_owned(), Arc::new(middleware));
        self
    }

    pub fn has_middleware(&self, name: &str) -> bool {
        self.middleware.contains_key(name)
    }

    /// Resolves `"Controller@method"`.
    pub(crate) fn resolve_action(&self, name: &str) -> Result<BoxedHandler> {
        let (controller, method) = crate::route::Action::controller_method(name)
            .ok_or_else(|| Error::resolution("controller", name))?;
        let actions = self
            .controllers
            .get(controller)
            .ok_or_else(|| Error::resolution("controller", controller))?;
        actions
            .actions
            .get(method)
            .cloned()
            .ok_or_else(|| Error::resolution("action", name))
    }

    /// Resolves a list of `"name:p1,p2"` strings, keeping their order.
    pub(crate) fn resolve_layers(&self, specs: &[String]) -> Result<Arc<[Layer]>> {
        specs
            .iter()
            .map(|spec| {
                let (name, params) = middleware::parse_spec(spec);
                let middleware = self.middleware.get(name).cloned().ok_or_else(|| Error::resolution("middleware", name))?;
                Ok(Layer { middleware, params: params.into() })
            })
            .collect::<Result<Vec<_>>>()
            .map(Arc::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::session::MemoryStore;

    #[test]
    fn actions_resolve_by_controller_and_method() {
        let mut registry = Registry::new();
        registry.controller("TagController", Controller::new().action("index", |_req: Request| async { "tags" }));

        assert!(registry.resolve_action("TagController@index").is_ok());
        let err = registry.resolve_action("TagController@destroy").err().unwrap();
        assert_eq!(err.to_string(), "action not found: TagController@destroy");
        let err = registry.resolve_action("BlogController@index").err().unwrap();
        assert_eq!(err.to_string(), "controller not found: BlogController");
        let err = registry.resolve_action("index").err().unwrap();
        assert!(matches!(err, Error::Resolution { kind: "controller", .. }));
    }

    #[test]
    fn middleware_specs_resolve_with_params() {
        let registry = Registry::with_builtins(&Config::default(), Arc::new(MemoryStore::new()));
        let layers = registry.resolve_layers(&["admin".to_owned(), "cache:public, max-age=60".to_owned()]).unwrap();
        assert_eq!(layers.len(), 2);
        assert!(layers[0].params.is_empty());
        assert_eq!(&*layers[1].params, ["public".to_owned(), "max-age=60".to_owned()]);

        let err = registry.resolve_layers(&["throttle:60".to_owned()]).err().unwrap();
        assert_eq!(err.to_string(), "middleware not found: throttle");
    }
}
