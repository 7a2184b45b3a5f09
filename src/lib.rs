//! # hearth
//!
//! A small web-application framework: radix-tree routing with groups and
//! named routes, an ordered middleware pipeline, and an active-record layer
//! over SQLite.
//!
//! A request travels
//!
//! ```text
//! Server → App (global middleware) → Router::dispatch
//!        → route middleware → action → Response → back out the same way
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hearth::{Action, App, Config, Controller, Group, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> hearth::Result<()> {
//!     let config = Config::from_file("hearth.toml")?.with_env();
//!     config.validate()?;
//!     hearth::telemetry::init(&config.logging)?;
//!
//!     let mut router = Router::new();
//!     router
//!         .registry_mut()
//!         .controller("TagController", Controller::new().action("show", show_tag));
//!
//!     router.get("/", Action::handler(|_req: Request| async { "home" })).name("home");
//!     router.group(Group::new().prefix("/api/v1").controller("TagController").name("api"), |r| {
//!         r.get("/tags/{id}", "show").name("tags.show");
//!     });
//!
//!     let addr = config.server.addr.clone();
//!     let app = App::new(config, router)?;
//!     Server::bind(&addr)?.serve(app).await
//! }
//!
//! async fn show_tag(req: Request) -> Response {
//!     let id = req.route_param("id").unwrap_or_default();
//!     Response::success(&serde_json::json!({ "id": id }))
//! }
//! ```

mod app;
mod error;
mod handler;
mod method;
mod registry;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod config;
pub mod db;
pub mod middleware;
pub mod session;
pub mod telemetry;

pub use http::StatusCode;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
pub use handler::Handler;
pub use method::Method;
pub use registry::{Controller, Registry};
pub use request::Request;
pub use response::{ContentType, Envelope, IntoResponse, Response, ResponseBuilder};
pub use route::{Action, Route, RouteId};
pub use router::{Group, RouteMut, Router};
pub use server::Server;
pub use session::{MemoryStore, Session, SessionStore};
