use async_trait::async_trait;
use micro_dispatch::{ByteStream, Context, HandleError, HandleResult, Handler, Server, ServerConfig, handler_fn};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Debug)]
pub struct User {
    name: String,
    zip: String,
}

/// Publishes the caller's token as `session` for the handles registered after it.
struct Session;

#[async_trait]
impl Handler for Session {
    async fn handle(&self, ctx: Context) -> HandleResult {
        let token = ctx.headers().get(http::header::AUTHORIZATION).and_then(|value| value.to_str().ok());
        Ok(token.map(|token| json!({ "token": token })))
    }
}

// curl -v http://127.0.0.1:8080/users/42
async fn user(ctx: Context) -> Value {
    json!({ "id": ctx.param("id"), "session": ctx.get("session") })
}

// curl -v -H 'Content-Type: application/json' -d '{"name":"hello","zip":"world"}' http://127.0.0.1:8080/users
async fn create_user(ctx: Context) -> Result<(), HandleError> {
    let bytes = ctx.read_body().await?;
    let user: User = serde_json::from_slice(&bytes).map_err(HandleError::bad_request)?;

    info!(name = %user.name, zip = %user.zip, "create user");
    ctx.set_code(http::StatusCode::CREATED).set_body(json!({ "name": user.name, "zip": user.zip }));
    ctx.end().await
}

// curl -v http://127.0.0.1:8080/readme
async fn readme(ctx: Context) -> Result<(), HandleError> {
    let stream = ByteStream::open(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md")).await?;
    ctx.set_body(stream);
    Ok(())
}

async fn not_found(ctx: Context) -> Result<(), HandleError> {
    if ctx.has_body() || ctx.contains("user") {
        return Ok(());
    }
    Err(HandleError::not_found(format!("no handle for {}", ctx.path())))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig { port: 8080, address: Some("127.0.0.1".to_owned()), ..ServerConfig::default() },
    };

    let mut server = Server::new(config);
    server
        .add((), Session)?
        .get("/users/{id}", handler_fn(user))?
        .post("/users", handler_fn(create_user))?
        .get("/readme", handler_fn(readme))?
        .add((), handler_fn(not_found))?;

    server.open().await?;
    info!(port = server.port(), family = ?server.family(), "demo server is up, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    server.close().await?;
    Ok(())
}
