use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::session::{Session, SessionStore};

/// Loads the session named by the session cookie and hands it to the request.
///
/// After the rest of the pipeline ran, a modified session is saved. The
/// cookie is (re)issued when the session is new or was regenerated, and a
/// regenerated session's old id is destroyed.
pub struct StartSession {
    store: Arc<dyn SessionStore>,
    cookie: String,
}

impl StartSession {
    pub fn new(store: Arc<dyn SessionStore>, cookie: impl Into<String>) -> Self {
        Self { store, cookie: cookie.into() }
    }
}

#[async_trait]
impl Middleware for StartSession {
    async fn handle(&self, mut req: Request, next: Next, _params: &[String]) -> Response {
        let presented = req.cookie(&self.cookie).map(str::to_owned);
        let loaded = match &presented {
            Some(id) => self.store.load(id).await,
            None => None,
        };
        let session = match (presented.as_ref(), loaded) {
            (Some(id), Some(values)) => Session::new(id.as_str(), values),
            _ => Session::new(uuid::Uuid::new_v4().to_string(), HashMap::new()),
        };
        req.session = Some(session.clone());

        let mut res = next.run(req).await;

        if let Some(old) = session.take_previous_id() {
            self.store.destroy(&old).await;
        }
        if session.is_dirty() {
            let id = session.id();
            self.store.save(&id, session.all()).await;
            if presented.as_deref() != Some(id.as_str()) {
                trace!(cookie = %self.cookie, "issuing session cookie");
                res.append_header("set-cookie", &format!("{}={id}; Path=/; HttpOnly; SameSite=Lax", self.cookie));
            }
        }
        res
    }
}
