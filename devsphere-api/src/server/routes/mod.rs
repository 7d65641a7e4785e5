use crate::server::{Result, ServerError, ServerRouter, Success, extract::Json};
use axum::Router;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod posts;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .typed_get(index)
        .merge(posts::routes())
        .merge(users::routes())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
struct IndexPath();

#[derive(Serialize)]
struct ApiInfo {
    message: &'static str,
    endpoints: BTreeMap<&'static str, &'static str>,
}

async fn index(IndexPath(): IndexPath) -> Result<Json<Success<ApiInfo>>> {
    let endpoints = BTreeMap::from([
        ("POST /api/posts", "Create a new post"),
        ("GET /api/posts", "Get all posts"),
        ("GET /api/posts/search", "Search posts by username or tags"),
        ("POST /api/posts/{id}/like", "Like or unlike a post"),
        ("POST /api/posts/{id}/comment", "Add a comment to a post"),
        ("GET /api/username", "Get or create username from IP"),
    ]);

    Ok(Success::json(ApiInfo {
        message: "DevSphere API is running",
        endpoints,
    }))
}
