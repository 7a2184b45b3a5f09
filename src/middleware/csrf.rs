use async_trait::async_trait;
use http::StatusCode;

use super::{Middleware, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::session::keys;

/// Rejects state-changing requests whose token does not match the session.
///
/// The token is read from the `X-CSRF-TOKEN` header, then from the `_token`
/// input field. A session without a token gets a fresh one, which the
/// application can hand to forms via `session.get_str("csrf_token")`.
/// Needs the `session` middleware in front of it.
pub struct VerifyCsrf;

#[async_trait]
impl Middleware for VerifyCsrf {
    async fn handle(&self, req: Request, next: Next, _params: &[String]) -> Response {
        let Some(session) = req.session().cloned() else {
            return Response::from_error(Error::Config("csrf middleware needs a session".to_owned()));
        };
        let expected = match session.get_str(keys::CSRF_TOKEN) {
            Some(token) => token,
            None => {
                let token = uuid::Uuid::new_v4().simple().to_string();
                session.put(keys::CSRF_TOKEN, token.clone());
                token
            }
        };

        if !req.method().is_safe() {
            let supplied = req
                .header("x-csrf-token")
                .map(str::to_owned)
                .or_else(|| req.input_str("_token"));
            if supplied.as_deref() != Some(expected.as_str()) {
                return Response::failure(StatusCode::FORBIDDEN, "CSRF token mismatch");
            }
        }
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::method::Method;
    use crate::middleware::run_single;
    use crate::session::Session;

    fn session_with_token() -> Session {
        let session = Session::new("s", HashMap::new());
        session.put(keys::CSRF_TOKEN, "abc123");
        session
    }

    async fn run(req: Request) -> Response {
        run_single(VerifyCsrf, &[], req, |_req: Request| async { "saved" }).await
    }

    #[tokio::test]
    async fn safe_methods_pass_and_get_a_token() {
        let session = Session::new("s", HashMap::new());
        let res = run(Request::new(Method::Get, "/form").with_session(session.clone())).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(session.get_str(keys::CSRF_TOKEN).map(|t| t.len()), Some(32));
    }

    #[tokio::test]
    async fn header_or_form_field_must_match() {
        let req = Request::new(Method::Post, "/tags")
            .with_header("X-CSRF-TOKEN", "abc123")
            .with_session(session_with_token());
        assert_eq!(run(req).await.status_code(), StatusCode::OK);

        let req = Request::new(Method::Put, "/tags/1")
            .with_body("_token=abc123&name=rust")
            .with_session(session_with_token());
        assert_eq!(run(req).await.status_code(), StatusCode::OK);

        let req = Request::new(Method::Delete, "/tags/1").with_session(session_with_token());
        assert_eq!(run(req).await.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_session_is_a_configuration_error() {
        let res = run(Request::new(Method::Post, "/tags")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(res.error(), Some(Error::Config(_))));
    }
}
