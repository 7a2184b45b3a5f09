use async_trait::async_trait;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

const DEFAULT: &str = "no-store";

/// Sets `Cache-Control` from the middleware parameters, e.g.
/// `"cache:public,max-age=300"`. Without parameters the response is
/// marked `no-store`.
pub struct CacheControl;

#[async_trait]
impl Middleware for CacheControl {
    async fn handle(&self, req: Request, next: Next, params: &[String]) -> Response {
        let mut res = next.run(req).await;
        let value = if params.is_empty() { DEFAULT.to_owned() } else { params.join(", ") };
        res.set_header("cache-control", &value);
        res
    }
}
