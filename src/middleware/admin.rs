use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::security_headers::apply_hardening;
use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::session::{keys, Session};

/// Guards the admin area.
///
/// The session must carry `admin_authenticated = true`, must have been active
/// within `timeout`, and (when pinned) must come from the same IP that logged
/// in. Otherwise the admin keys are dropped, the session id is regenerated
/// and the client is redirected to `login_path`.
///
/// Every response leaving this middleware carries the hardening headers,
/// the login redirect included.
pub struct AdminGate {
    login_path: String,
    timeout: Duration,
}

impl AdminGate {
    pub fn new(login_path: impl Into<String>, timeout: Duration) -> Self {
        Self { login_path: login_path.into(), timeout }
    }

    fn check(&self, req: &Request) -> Result<(), &'static str> {
        let Some(session) = req.session() else {
            return Err("no session");
        };
        if session.get(keys::ADMIN_AUTHENTICATED) != Some(serde_json::Value::Bool(true)) {
            return Err("not authenticated");
        }

        let now = Utc::now().timestamp();
        let timeout = i64::try_from(self.timeout.as_secs()).unwrap_or(i64::MAX);
        if let Some(last) = session.get(keys::ADMIN_LAST_ACTIVITY).and_then(|v| v.as_i64()) {
            if now.saturating_sub(last) > timeout {
                sign_out(session);
                return Err("session expired");
            }
        }

        if let Some(pinned) = session.get_str(keys::ADMIN_IP) {
            if req.ip().map(|ip| ip.to_string()).as_deref() != Some(pinned.as_str()) {
                sign_out(session);
                return Err("client address changed");
            }
        }

        session.put(keys::ADMIN_LAST_ACTIVITY, now);
        Ok(())
    }
}

fn sign_out(session: &Session) {
    for key in [keys::ADMIN_AUTHENTICATED, keys::ADMIN_LAST_ACTIVITY, keys::ADMIN_IP, keys::CSRF_TOKEN] {
        session.forget(key);
    }
    session.regenerate();
}

#[async_trait]
impl Middleware for AdminGate {
    async fn handle(&self, req: Request, next: Next, _params: &[String]) -> Response {
        let mut res = match self.check(&req) {
            Ok(()) => next.run(req).await,
            Err(reason) => {
                debug!(path = req.path(), reason, "admin access refused");
                Response::redirect(&self.login_path)
            }
        };
        apply_hardening(&mut res);
        res
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};

    use http::StatusCode;

    use super::*;
    use crate::method::Method;
    use crate::middleware::run_single;

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    fn gate() -> AdminGate {
        AdminGate::new("/admin/login", Duration::from_secs(3600))
    }

    fn admin_session() -> Session {
        let session = Session::new("s1", HashMap::new());
        session.put(keys::ADMIN_AUTHENTICATED, true);
        session.put(keys::ADMIN_IP, PEER.to_string());
        session.put(keys::CSRF_TOKEN, "t");
        session
    }

    async fn run(session: &Session) -> Response {
        let req = Request::new(Method::Get, "/admin/x/dashboard")
            .with_remote_addr(PEER)
            .with_session(session.clone());
        run_single(gate(), &[], req, |_req: Request| async { "dashboard" }).await
    }

    #[tokio::test]
    async fn redirect_still_carries_hardening_headers() {
        let session = Session::new("s1", HashMap::new());
        let res = run(&session).await;
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/admin/login"));
        assert_eq!(res.header("x-frame-options"), Some("DENY"));
        assert_eq!(res.header("x-robots-tag"), Some("noindex, nofollow, noarchive, nosnippet, noimageindex"));
    }

    #[tokio::test]
    async fn active_admin_passes_and_activity_is_refreshed() {
        let session = admin_session();
        let res = run(&session).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("pragma"), Some("no-cache"));
        let last = session.get(keys::ADMIN_LAST_ACTIVITY).and_then(|v| v.as_i64()).unwrap();
        assert!(Utc::now().timestamp() - last < 5);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let session = admin_session();
        session.put(keys::ADMIN_LAST_ACTIVITY, Utc::now().timestamp() - 7200);
        let res = run(&session).await;
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert!(!session.has(keys::ADMIN_AUTHENTICATED));
        assert!(!session.has(keys::CSRF_TOKEN));
        assert_ne!(session.id(), "s1");
    }

    #[tokio::test]
    async fn ip_change_signs_out() {
        let session = admin_session();
        session.put(keys::ADMIN_IP, "192.168.1.1");
        let res = run(&session).await;
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert!(!session.has(keys::ADMIN_IP));
    }
}
