//! Middleware layer.
//!
//! Middleware wraps the rest of the pipeline. Each one either answers on its
//! own (short-circuit) or calls [`Next::run`] and may reshape what comes back.
//! The first middleware in a list runs first and sees the final response last:
//!
//! ```text
//! global[0] → global[1] → … → route[0] → route[1] → … → action
//!                                                          │
//! global[0] ← global[1] ← … ← route[0] ← route[1] ← ……… response
//! ```
//!
//! Routes refer to middleware by name, optionally with parameters
//! (`"cache:max-age=60,public"`). Names resolve through the
//! [`Registry`](crate::Registry).

mod admin;
mod auth;
mod cache_control;
mod csrf;
mod security_headers;
mod session;
mod trace;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::Response;

pub use admin::AdminGate;
pub use auth::Authenticate;
pub use cache_control::CacheControl;
pub use csrf::VerifyCsrf;
pub use security_headers::SecurityHeaders;
pub use session::StartSession;
pub use trace::Trace;

/// A request interceptor.
///
/// `params` are the values after the `:` in the route's middleware string,
/// split on `,`. One instance serves every route that names it.
///
/// ```rust
/// use hearth::middleware::{Middleware, Next};
/// use hearth::{Request, Response};
///
/// struct PoweredBy;
///
/// #[async_trait::async_trait]
/// impl Middleware for PoweredBy {
///     async fn handle(&self, req: Request, next: Next, _params: &[String]) -> Response {
///         let mut res = next.run(req).await;
///         res.set_header("x-powered-by", "hearth");
///         res
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next, params: &[String]) -> Response;
}

/// A resolved middleware together with the parameters it was named with.
#[derive(Clone)]
pub(crate) struct Layer {
    pub(crate) middleware: Arc<dyn Middleware>,
    pub(crate) params: Arc<[String]>,
}

/// The rest of the pipeline, from the current middleware's point of view.
pub struct Next {
    layers: Arc<[Layer]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(layers: Arc<[Layer]>, endpoint: BoxedHandler) -> Self {
        Self { layers, index: 0, endpoint }
    }

    /// Runs the remaining middleware and then the endpoint.
    pub fn run(self, req: Request) -> BoxFuture {
        let Self { layers, index, endpoint } = self;
        match layers.get(index).cloned() {
            Some(layer) => {
                let next = Self { layers, index: index + 1, endpoint };
                Box::pin(async move { layer.middleware.handle(req, next, &layer.params).await })
            }
            None => endpoint.call(req),
        }
    }
}

/// Splits `"name:p1,p2"` into the name and its parameters.
pub(crate) fn parse_spec(spec: &str) -> (&str, Vec<String>) {
    match spec.split_once(':') {
        Some((name, params)) => (
            name.trim(),
            params.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_owned).collect(),
        ),
        None => (spec.trim(), Vec::new()),
    }
}

/// Middleware from an async closure, for one-offs that need no parameters.
///
/// ```rust
/// use hearth::middleware;
///
/// let timing = middleware::from_fn(|req, next| async move {
///     let mut res = next.run(req).await;
///     res.set_header("x-handled-by", "hearth");
///     res
/// });
/// # let _ = timing;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
pub struct FromFn<F>(F);

#[async_trait]
impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, req: Request, next: Next, _params: &[String]) -> Response {
        (self.0)(req, next).await
    }
}

/// Runs `req` through a single middleware in front of `endpoint`.
#[cfg(test)]
pub(crate) async fn run_single(
    middleware: impl Middleware,
    params: &[&str],
    req: Request,
    endpoint: impl crate::handler::Handler,
) -> Response {
    let layer = Layer {
        middleware: Arc::new(middleware),
        params: params.iter().map(|p| (*p).to_owned()).collect::<Vec<_>>().into(),
    };
    Next::new(Arc::from([layer]), endpoint.into_boxed_handler()).run(req).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::handler::Handler;
    use crate::method::Method;
    use http::StatusCode;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Record {
        name: &'static str,
        log: Log,
    }

    #[async_trait]
    impl Middleware for Record {
        async fn handle(&self, req: Request, next: Next, params: &[String]) -> Response {
            self.log.lock().unwrap().push(format!("{}:before{params:?}", self.name));
            let mut res = next.run(req).await;
            self.log.lock().unwrap().push(format!("{}:after", self.name));
            res.append_header("x-seen-by", self.name);
            res
        }
    }

    struct Deny;

    #[async_trait]
    impl Middleware for Deny {
        async fn handle(&self, _req: Request, _next: Next, _params: &[String]) -> Response {
            Response::builder().status(StatusCode::FORBIDDEN).text("Unauthorized")
        }
    }

    fn layer(m: impl Middleware, params: &[&str]) -> Layer {
        Layer {
            middleware: Arc::new(m),
            params: params.iter().map(|p| (*p).to_owned()).collect::<Vec<_>>().into(),
        }
    }

    fn endpoint(log: &Log) -> BoxedHandler {
        let log = log.clone();
        (move |_req: Request| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("action".to_owned());
                "ok"
            }
        })
        .into_boxed_handler()
    }

    #[tokio::test]
    async fn first_listed_runs_first_and_sees_the_response_last() {
        let log = Log::default();
        let layers: Arc<[Layer]> = vec![
            layer(Record { name: "A", log: log.clone() }, &[]),
            layer(Record { name: "B", log: log.clone() }, &["x", "y"]),
        ]
        .into();

        let res = Next::new(layers, endpoint(&log)).run(Request::new(Method::Get, "/")).await;

        assert_eq!(
            *log.lock().unwrap(),
            ["A:before[]", "B:before[\"x\", \"y\"]", "action", "B:after", "A:after"]
        );
        let seen: Vec<_> = res.headers().iter().filter(|(k, _)| k == "x-seen-by").map(|(_, v)| v.as_str()).collect();
        assert_eq!(seen, ["B", "A"]);
    }

    #[tokio::test]
    async fn short_circuit_still_passes_through_outer_layers() {
        let log = Log::default();
        let layers: Arc<[Layer]> = vec![layer(Record { name: "A", log: log.clone() }, &[]), layer(Deny, &[])].into();

        let res = Next::new(layers, endpoint(&log)).run(Request::new(Method::Get, "/")).await;

        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.header("x-seen-by"), Some("A"));
        assert_eq!(*log.lock().unwrap(), ["A:before[]", "A:after"]);
    }

    #[tokio::test]
    async fn closures_work_as_middleware() {
        let log = Log::default();
        let tag = from_fn(|req, next: Next| async move {
            let mut res = next.run(req).await;
            res.set_header("x-tag", "1");
            res
        });
        let res = Next::new(vec![layer(tag, &[])].into(), endpoint(&log))
            .run(Request::new(Method::Get, "/"))
            .await;
        assert_eq!(res.header("x-tag"), Some("1"));
    }

    #[test]
    fn specs_split_into_name_and_params() {
        assert_eq!(parse_spec("admin"), ("admin", vec![]));
        assert_eq!(parse_spec("cache:max-age=60, public"), ("cache", vec!["max-age=60".to_owned(), "public".to_owned()]));
        assert_eq!(parse_spec("throttle:"), ("throttle", vec![]));
    }
}
