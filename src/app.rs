//! The application kernel: global middleware, the router and the top-level
//! error handler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{error, warn};

use crate::config::Config;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Layer, Next};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

const GENERIC_ERROR: &str = "500 Internal Server Error";

/// A configured router ready to serve.
///
/// Cloning is cheap; every clone shares the same router, middleware and
/// database handle.
///
/// ```rust
/// use hearth::{Action, App, Config, Method, Request, Router};
///
/// # tokio_test_block(async {
/// let mut router = Router::new();
/// router.get("/", Action::handler(|_req: Request| async { "home" }));
///
/// let app = App::new(Config::default(), router).unwrap();
/// let res = app.handle(Request::new(Method::Get, "/")).await;
/// assert_eq!(res.body(), b"home");
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    config: Arc<Config>,
    router: Arc<Router>,
    global: Arc<[Layer]>,
    endpoint: BoxedHandler,
    db: Option<Db>,
}

impl App {
    /// Compiles the route table and resolves `app.middleware` against the
    /// router's registry, so a bad pattern or an unknown middleware name
    /// fails here rather than on the first request.
    pub fn new(config: Config, router: Router) -> Result<Self> {
        router.compile()?;
        let global = router.registry().resolve_layers(&config.app.middleware)?;

        let router = Arc::new(router);
        let endpoint = {
            let router = Arc::clone(&router);
            (move |req: Request| {
                let router = Arc::clone(&router);
                async move { router.dispatch(req).await }
            })
            .into_boxed_handler()
        };

        Ok(Self { config: Arc::new(config), router, global, endpoint, db: None })
    }

    /// Every request handled by this app carries `db`.
    pub fn with_database(mut self, db: Db) -> Self {
        self.db = Some(db);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Runs one request through the global middleware and the router.
    ///
    /// Never fails: errors and panics come back as `500` responses.
    pub async fn handle(&self, mut req: Request) -> Response {
        if let Some(db) = &self.db {
            req.db = Some(Arc::clone(db));
        }
        let method = req.method;
        let path = req.path.clone();

        let pipeline = Next::new(Arc::clone(&self.global), Arc::clone(&self.endpoint)).run(req);
        let res = match AssertUnwindSafe(pipeline).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Response::from_error(Error::Panic(panic_message(&*panic))),
        };

        self.finalize(res, method.as_str(), &path)
    }

    fn finalize(&self, mut res: Response, method: &str, path: &str) -> Response {
        let Some(err) = res.failure.clone() else {
            return res;
        };

        if res.status.is_server_error() {
            error!(kind = err.kind(), error = %err, method, path, "request failed");
            let body = if self.config.app.debug { format!("{err}\n\n{err:#?}") } else { GENERIC_ERROR.to_owned() };
            res.set_header("content-type", "text/plain; charset=utf-8");
            res.set_body(body);
        } else {
            warn!(kind = err.kind(), error = %err, method, path, status = res.status.as_u16(), "request rejected");
        }
        res
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}
