//! Minimal vireo example: CRUD-style JSON endpoints with before/after middleware.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/users/42?fields=name&fields=email
//!   curl -X POST http://localhost:3000/users \
//!        -H 'authorization: Bearer demo' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users           # 401
//!   curl -X PUT  http://localhost:3000/users/42        # 405
//!   curl -X DELETE http://localhost:3000/users/42

use serde::{Deserialize, Serialize};
use vireo::middleware;
use vireo::{Context, HandlerError, Route, RouteGroup, Router, Server, StatusCode};

#[derive(Serialize)]
struct User {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), vireo::Error> {
    tracing_subscriber::fmt::init();

    let require_token = middleware::from_fn(|ctx, next| async move {
        let authorized = ctx
            .request()
            .header("authorization")
            .is_some_and(|v| v.starts_with("Bearer "));
        if !authorized {
            return Err(HandlerError::with_status(StatusCode::UNAUTHORIZED, "missing bearer token"));
        }
        next.run(ctx).await
    });

    let writes = RouteGroup::new()
        .before(require_token)
        .route(Route::post("/users", create_user))
        .route(Route::delete("/users/{id}", delete_user));

    let app = Router::new()
        .before(middleware::from_fn(|ctx, next| async move {
            if let Some(id) = ctx.request().header("x-request-id") {
                tracing::debug!(request_id = id, "tagged request");
            }
            next.run(ctx).await
        }))
        .after(middleware::from_fn(|ctx, next| async move {
            tracing::info!(
                method = %ctx.request().method(),
                path = ctx.request().path(),
                status = ?ctx.response().status(),
                "served",
            );
            next.run(ctx).await
        }))
        .route(Route::get("/users/{id}", get_user))?
        .group(writes)?;

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// GET /users/{id}
async fn get_user(ctx: Context) -> Result<(), HandlerError> {
    let user = User { id: ctx.param("id").to_owned(), name: "alice".to_owned() };
    if let Some(fields) = ctx.query_params().get("fields") {
        tracing::debug!(?fields, "field selection requested");
    }
    ctx.json(StatusCode::OK, &user)
}

// POST /users
async fn create_user(ctx: Context) -> Result<(), HandlerError> {
    let input: NewUser = serde_json::from_slice(ctx.request().body())
        .map_err(|e| HandlerError::with_status(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    ctx.json(StatusCode::CREATED, &User { id: "99".to_owned(), name: input.name })
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(ctx: Context) -> Result<(), HandlerError> {
    ctx.response().write_header(StatusCode::NO_CONTENT);
    Ok(())
}
