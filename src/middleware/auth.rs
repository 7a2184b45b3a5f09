use async_trait::async_trait;
use http::StatusCode;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::session::keys;

/// Lets the request through only when the session carries a user id.
/// Everyone else gets `403 Unauthorized`.
pub struct Authenticate;

#[async_trait]
impl Middleware for Authenticate {
    async fn handle(&self, req: Request, next: Next, _params: &[String]) -> Response {
        let signed_in = req
            .session()
            .and_then(|s| s.get(keys::AUTH_USER_ID))
            .is_some_and(|id| !id.is_null() && id != false && id != 0 && id != "");
        if !signed_in {
            return Response::builder().status(StatusCode::FORBIDDEN).text("Unauthorized");
        }
        next.run(req).await
    }
}
