use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Logs one event per request with method, path, status and latency.
pub struct Trace;

#[async_trait]
impl Middleware for Trace {
    async fn handle(&self, req: Request, next: Next, _params: &[String]) -> Response {
        let method = req.method();
        let path = req.path().to_owned();
        let started = Instant::now();

        let res = next.run(req).await;

        let status = res.status_code().as_u16();
        let latency_ms = started.elapsed().as_millis() as u64;
        if res.status_code().is_server_error() {
            warn!(%method, path, status, latency_ms, "request failed");
        } else {
            info!(%method, path, status, latency_ms, "request");
        }
        res
    }
}
