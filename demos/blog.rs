//! A blog backend: an admin area behind a session login and a JSON tag API.
//!
//! Run with:
//!   APP_ENV=local cargo run --example blog
//!
//! Try:
//!   curl -c jar -d 'password=secret' http://localhost:3000/admin/demo/login
//!   curl -b jar http://localhost:3000/api/v1/tags?page=1
//!   curl -b jar -H 'content-type: application/json' \
//!        -d '{"name":"Rust Tips"}' http://localhost:3000/api/v1/tags
//!   curl -b jar -X PATCH -d 'name=Rust' http://localhost:3000/api/v1/tags/1
//!   curl -b jar -X DELETE http://localhost:3000/api/v1/tags/1

use std::sync::Arc;

use hearth::db::{attrs, Db, Direction, Entity, Model, PageRequest, SqliteDatabase};
use hearth::session::keys;
use hearth::{
    Action, App, Config, Controller, Group, MemoryStore, Method, Registry, Request, Response, Router, Server,
    StatusCode,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tags (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE
    );
";

pub struct TagEntity;

impl Entity for TagEntity {
    const TABLE: &'static str = "tags";
    const NAME: &'static str = "Tag";
    const TIMESTAMPS: bool = false;
    const FILLABLE: &'static [&'static str] = &["name", "slug"];
}

pub type Tag = Model<TagEntity>;

#[tokio::main]
async fn main() -> hearth::Result<()> {
    let mut config = Config::from_toml_str(
        r#"
        [app]
        name = "blog"
        middleware = ["trace", "session"]

        [admin]
        login_path = "/admin/demo/login"
        session_timeout = "30m"
        "#,
    )?
    .with_env();
    if config.app.is_development() {
        config.app.debug = true;
    }
    config.validate()?;
    hearth::telemetry::init(&config.logging)?;

    let sqlite = SqliteDatabase::from_config(&config.database).await?;
    sqlite.run_script(SCHEMA).await?;
    let db: Db = Arc::new(sqlite);

    let mut registry = Registry::with_builtins(&config, Arc::new(MemoryStore::new()));
    registry
        .controller(
            "TagController",
            Controller::new()
                .action("index", tag_index)
                .action("show", tag_show)
                .action("store", tag_store)
                .action("update", tag_update)
                .action("destroy", tag_destroy),
        )
        .controller(
            "AdminController",
            Controller::new()
                .action("login_form", login_form)
                .action("login", login)
                .action("logout", logout)
                .action("dashboard", dashboard),
        );

    let mut router = Router::with_registry(registry);
    routes(&mut router);

    let addr = config.server.addr.clone();
    let app = App::new(config, router)?.with_database(db);
    Server::bind(&addr)?.serve(app).await
}

fn routes(router: &mut Router) {
    router.get("/", Action::handler(home)).name("home");

    router.group(Group::new().prefix("/admin/{slug}").controller("AdminController").name("admin"), |r| {
        r.get("/login", "login_form").name("login");
        r.post("/login", "login");
        r.matches(&[Method::Get, Method::Post], "/logout", "logout").name("logout");
        r.get("/dashboard", "dashboard").name("dashboard").middleware(["admin", "security_headers"]);
    });

    let api = Group::new()
        .prefix("/api/v1")
        .middleware(["admin", "security_headers", "cache:no-store"])
        .controller("TagController")
        .name("api");
    router.group(api, |r| {
        r.get("/tags", "index").name("tags.index");
        r.post("/tags", "store").name("tags.store");
        r.get(r"/tags/{id:\d+}", "show").name("tags.show");
        r.matches(&[Method::Put, Method::Patch], r"/tags/{id:\d+}", "update").name("tags.update");
        r.delete(r"/tags/{id:\d+}", "destroy").name("tags.destroy");
    });
}

async fn home(_req: Request) -> Response {
    Response::html("<h1>blog</h1>")
}

// ── Tags ──────────────────────────────────────────────────────────────────────

async fn tag_index(req: Request) -> hearth::Result<Response> {
    let page = PageRequest::from_request(&req);
    let tags = Tag::query(req.db()?).order_by("name", Direction::Asc).paginate(15, &page).await?;
    Ok(Response::success(&tags))
}

async fn tag_show(req: Request) -> hearth::Result<Response> {
    let id = req.route_param("id").unwrap_or_default();
    let tag = Tag::find_or_fail(req.db()?, id).await?;
    Ok(Response::success(&tag))
}

async fn tag_store(req: Request) -> hearth::Result<Response> {
    let Some(name) = req.input_str("name").filter(|n| !n.is_empty()) else {
        return Ok(Response::failure(StatusCode::BAD_REQUEST, "name is required"));
    };
    let slug = slugify(&name);
    let db = req.db()?;
    if Tag::where_eq(db, "slug", slug.as_str()).exists().await? {
        return Ok(Response::failure(StatusCode::BAD_REQUEST, "a tag with this slug already exists"));
    }

    let tag = Tag::create(db, attrs([("name", name), ("slug", slug)])).await?;
    let mut res = Response::success(&tag);
    res.set_status(StatusCode::CREATED);
    Ok(res)
}

async fn tag_update(req: Request) -> hearth::Result<Response> {
    let id = req.route_param("id").unwrap_or_default();
    let db = req.db()?;
    let mut tag = Tag::find_or_fail(db, id).await?;
    if let Some(name) = req.input_str("name").filter(|n| !n.is_empty()) {
        let slug = slugify(&name);
        tag.update(db, attrs([("name", name), ("slug", slug)])).await?;
    }
    Ok(Response::success(&tag))
}

async fn tag_destroy(req: Request) -> hearth::Result<Response> {
    let id = req.route_param("id").unwrap_or_default();
    let db = req.db()?;
    let tag = Tag::find_or_fail(db, id).await?;
    tag.delete(db).await?;
    Ok(Response::success(&serde_json::Value::Null))
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ── Admin ─────────────────────────────────────────────────────────────────────

async fn login_form(req: Request) -> Response {
    let slug = req.route_param("slug").unwrap_or_default();
    Response::html(format!(
        r#"<form method="post" action="/admin/{slug}/login"><input type="password" name="password"><button>Sign in</button></form>"#
    ))
}

async fn login(req: Request) -> Response {
    let slug = req.route_param("slug").unwrap_or_default().to_owned();
    let expected = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "secret".to_owned());
    let Some(session) = req.session() else {
        return Response::failure(StatusCode::INTERNAL_SERVER_ERROR, "sessions are not enabled");
    };
    if req.input_str("password").as_deref() != Some(expected.as_str()) {
        return Response::redirect(&format!("/admin/{slug}/login"));
    }

    session.regenerate();
    session.put(keys::ADMIN_AUTHENTICATED, true);
    session.put(keys::ADMIN_LAST_ACTIVITY, chrono::Utc::now().timestamp());
    if let Some(ip) = req.ip() {
        session.put(keys::ADMIN_IP, ip.to_string());
    }
    Response::redirect(&format!("/admin/{slug}/dashboard"))
}

async fn logout(req: Request) -> Response {
    let slug = req.route_param("slug").unwrap_or_default();
    if let Some(session) = req.session() {
        session.flush();
        session.regenerate();
    }
    Response::redirect(&format!("/admin/{slug}/login"))
}

async fn dashboard(req: Request) -> hearth::Result<Response> {
    let tags = Tag::query(req.db()?).count().await?;
    Ok(Response::html(format!("<h1>Dashboard</h1><p>{tags} tags</p>")))
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugs() {
        assert_eq!(slugify("Rust Tips & Tricks"), "rust-tips-tricks");
        assert_eq!(slugify("  spaced  "), "spaced");
    }
}
