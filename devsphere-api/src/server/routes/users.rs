use crate::server::{
    Result, ServerError, ServerRouter, Success, client_ip::ClientIp, extract::Json,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use devsphere_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(get_username)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/username", rejection(ServerError))]
struct UsernamePath();

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsernameResponse {
    username: String,
    is_new: bool,
}

async fn get_username(
    UsernamePath(): UsernamePath,
    State(db): State<Arc<DbClient>>,
    ClientIp(ip): ClientIp,
) -> Result<(StatusCode, Json<Success<UsernameResponse>>)> {
    let lookup = db.get_or_create_identity(ip).await?;

    let is_new = lookup.is_new();
    let status = if is_new {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let username = lookup.into_identity().username.into_inner();

    Ok((status, Success::json(UsernameResponse { username, is_new })))
}

#[cfg(test)]
mod tests {
    use crate::server::testing::TestApp;
    use axum::http::StatusCode;
    use std::net::SocketAddr;

    #[tokio::test]
    async fn usernames_are_stable_per_address() {
        let app = TestApp::new();

        let (status, first) = app.get_from("/api/username", "192.168.1.1").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["success"], true);
        assert_eq!(first["username"], "CleverPenguin362");
        assert_eq!(first["isNew"], true);

        let (status, second) = app.get_from("/api/username", "192.168.1.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["username"], "CleverPenguin362");
        assert_eq!(second["isNew"], false);
    }

    #[tokio::test]
    async fn colliding_addresses_get_distinct_names() {
        let app = TestApp::new();

        let (_, first) = app.get_from("/api/username", "192.168.1.1").await;
        let (status, second) = app.get_from("/api/username", "192.168.0.2").await;

        assert_eq!(status, StatusCode::CREATED);
        assert_ne!(first["username"], second["username"]);
    }

    #[tokio::test]
    async fn socket_address_is_the_fallback() {
        let app = TestApp::new();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();

        let (status, body) = app.get_from_peer("/api/username", peer).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "RareButterfly128");
    }

    #[tokio::test]
    async fn mapped_addresses_share_the_ipv4_identity() {
        let app = TestApp::new();

        let (_, v4) = app.get_from("/api/username", "192.168.1.1").await;
        let (status, mapped) = app.get_from("/api/username", "::ffff:192.168.1.1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(mapped["isNew"], false);
        assert_eq!(mapped["username"], v4["username"]);
    }

    #[tokio::test]
    async fn exhausted_names_are_a_server_error() {
        let app = TestApp::new();

        // 10.0.0.1 tries the seeds 11 and 20..=29; these addresses take them first.
        for blocker in std::iter::once(11).chain(20..=29) {
            let (status, _) = app
                .get_from("/api/username", &format!("{blocker}.0.0.0"))
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = app.get_from("/api/username", "10.0.0.1").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Could not generate unique username");
        if cfg!(debug_assertions) {
            assert_eq!(
                body["error"],
                "Could not generate a unique username for 10.0.0.1"
            );
        } else {
            assert!(body.get("error").is_none());
        }
    }

    #[tokio::test]
    async fn unknown_address_is_rejected() {
        let app = TestApp::new();

        let (status, body) = app.get("/api/username").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Could not determine IP address");
    }
}
