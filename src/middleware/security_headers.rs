use async_trait::async_trait;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Headers for pages that must never be indexed, framed or cached.
pub(crate) const HARDENING: &[(&str, &str)] = &[
    ("x-robots-tag", "noindex, nofollow, noarchive, nosnippet, noimageindex"),
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "no-referrer"),
    ("cache-control", "no-cache, no-store, must-revalidate, private"),
    ("pragma", "no-cache"),
    ("expires", "0"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
];

const PERMISSIONS_POLICY: &str = "geolocation=(), microphone=(), camera=(), fullscreen=()";

const CDN_HOSTS: &str = "https://cdnjs.cloudflare.com https://cdn.jsdelivr.net https://unpkg.com \
                         https://via.placeholder.com https://cdn.tailwindcss.com https://code.jquery.com";

const DEV_SERVER: &str = "http://localhost:5173";
const DEV_SOCKET: &str = "ws://localhost:5173";

pub(crate) fn apply_hardening(res: &mut Response) {
    for (name, value) in HARDENING {
        res.set_header(name, value);
    }
}

/// [`HARDENING`] plus a Content-Security-Policy and Permissions-Policy.
///
/// Development builds (`app.env` of `development` or `local`) get a CSP that
/// admits the asset dev server and the public CDNs.
pub struct SecurityHeaders {
    csp: String,
}

impl SecurityHeaders {
    pub fn for_env(env: &str) -> Self {
        let development = matches!(env, "development" | "local");
        Self { csp: content_security_policy(development) }
    }

    pub fn content_security_policy(&self) -> &str {
        &self.csp
    }
}

fn content_security_policy(development: bool) -> String {
    if development {
        format!(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline' 'unsafe-eval' {DEV_SERVER} {DEV_SOCKET} {CDN_HOSTS}; \
             style-src 'self' 'unsafe-inline' {DEV_SERVER} {CDN_HOSTS}; \
             connect-src 'self' {DEV_SERVER} {DEV_SOCKET}; \
             img-src 'self' data: {DEV_SERVER} https:; \
             font-src 'self' {CDN_HOSTS}; \
             frame-ancestors 'none';"
        )
    } else {
        "default-src 'self'; \
         script-src 'self' 'unsafe-inline'; \
         style-src 'self' 'unsafe-inline'; \
         img-src 'self' data:; \
         frame-ancestors 'none';"
            .to_owned()
    }
}

#[async_trait]
impl Middleware for SecurityHeaders {
    async fn handle(&self, req: Request, next: Next, _params: &[String]) -> Response {
        let mut res = next.run(req).await;
        apply_hardening(&mut res);
        res.set_header("content-security-policy", &self.csp);
        res.set_header("permissions-policy", PERMISSIONS_POLICY);
        res
    }
}
