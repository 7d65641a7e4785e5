use crate::{
    media::MediaStore,
    server::{
        Result, ServerError, ServerRouter, Success,
        client_ip::ClientIp,
        extract::{Json, Query},
    },
};
use axum::{
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
    http::StatusCode,
};
use axum_extra::routing::{RouterExt, TypedPath};
use devsphere_common::{
    model::{
        Id, ValidationError,
        post::{Comment, CreateComment, CreatePost, LikeToggle, Post, PostMarker},
        search::{SearchMode, SearchQuery},
    },
    util::normalize_tags,
};
use devsphere_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_post)
        .typed_get(get_posts)
        .typed_get(search_posts)
        .typed_post(toggle_like)
        .typed_post(add_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts", rejection(ServerError))]
struct PostsPath();

#[derive(Serialize)]
struct PostCreated {
    message: &'static str,
    post: Post,
}

/// Fields of the multipart creation form, before validation.
#[derive(Default)]
struct PostForm {
    username: String,
    caption: String,
    tags: Vec<String>,
    media: Option<(String, Vec<u8>)>,
}

impl PostForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = PostForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            match name.as_str() {
                "username" => form.username = field.text().await?,
                "caption" => form.caption = field.text().await?,
                "tags" | "tags[]" => form.tags.push(field.text().await?),
                "media" => form.media = read_file(field).await?,
                _ => {}
            }
        }

        Ok(form)
    }
}

/// An empty file part means no media was attached.
async fn read_file(field: Field<'_>) -> Result<Option<(String, Vec<u8>)>> {
    let file_name = field.file_name().unwrap_or_default().to_owned();
    let bytes = field.bytes().await?;

    Ok((!file_name.is_empty() && !bytes.is_empty()).then(|| (file_name, bytes.to_vec())))
}

async fn create_post(
    PostsPath(): PostsPath,
    State(db): State<Arc<DbClient>>,
    State(media_store): State<Arc<MediaStore>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Success<PostCreated>>)> {
    let form = PostForm::read(multipart?).await?;

    let mut post = CreatePost::new(
        &form.username,
        &form.caption,
        normalize_tags(&form.tags),
        None,
    )?;
    if let Some((file_name, bytes)) = form.media {
        post.media = Some(media_store.upload(&file_name, &bytes).await?);
    }

    let post = db.create_post(post).await?;
    info!(id = %post.id, username = %post.username, "Created post");

    let body = PostCreated {
        message: "Post created successfully",
        post,
    };
    Ok((StatusCode::CREATED, Success::json(body)))
}

#[derive(Serialize)]
struct PostList {
    count: usize,
    posts: Vec<Post>,
}

async fn get_posts(
    PostsPath(): PostsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Success<PostList>>> {
    let posts = db.fetch_posts().await?;

    Ok(Success::json(PostList {
        count: posts.len(),
        posts,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/search", rejection(ServerError))]
struct SearchPath();

#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
    #[serde(rename = "type")]
    mode: Option<String>,
}

#[derive(Serialize)]
struct SearchResults {
    count: usize,
    query: String,
    #[serde(rename = "type")]
    mode: SearchMode,
    posts: Vec<Post>,
}

async fn search_posts(
    SearchPath(): SearchPath,
    State(db): State<Arc<DbClient>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Success<SearchResults>>> {
    let query = params
        .query
        .filter(|query| !query.trim().is_empty())
        .ok_or(ValidationError::MissingSearchQuery)?;
    let mode: SearchMode = params
        .mode
        .ok_or(ValidationError::InvalidSearchType)?
        .parse()?;

    let search = SearchQuery::parse(&query, mode)?;
    let posts = db.search_posts(&search).await?;

    Ok(Success::json(SearchResults {
        count: posts.len(),
        query,
        mode,
        posts,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}/like", rejection(ServerError))]
struct LikePath {
    id: Id<PostMarker>,
}

#[derive(Serialize)]
struct LikeToggled {
    message: &'static str,
    #[serde(flatten)]
    toggle: LikeToggle,
}

async fn toggle_like(
    LikePath { id }: LikePath,
    State(db): State<Arc<DbClient>>,
    ClientIp(ip): ClientIp,
) -> Result<Json<Success<LikeToggled>>> {
    let toggle = db
        .toggle_like(id, ip)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    let message = if toggle.liked {
        "Post liked successfully"
    } else {
        "Post unliked successfully"
    };
    Ok(Success::json(LikeToggled { message, toggle }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}/comment", rejection(ServerError))]
struct CommentPath {
    id: Id<PostMarker>,
}

#[derive(Deserialize)]
struct CommentBody {
    username: Option<String>,
    text: Option<String>,
}

#[derive(Serialize)]
struct CommentAdded {
    message: &'static str,
    comments: Vec<Comment>,
}

async fn add_comment(
    CommentPath { id }: CommentPath,
    State(db): State<Arc<DbClient>>,
    Json(body): Json<CommentBody>,
) -> Result<Json<Success<CommentAdded>>> {
    let comment = CreateComment::new(body.username, body.text)?;

    let comments = db
        .add_comment(id, &comment)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Success::json(CommentAdded {
        message: "Comment added successfully",
        comments,
    }))
}

#[cfg(test)]
mod tests {
    use crate::server::testing::{TestApp, multipart_body};
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    async fn create(app: &TestApp, username: &str, tags: &str) -> String {
        let (status, body) = app
            .post_multipart(
                "/api/posts",
                &[("username", username), ("caption", "hello"), ("tags", tags)],
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["post"]["id"].as_str().unwrap().to_owned()
    }

    fn ids(body: &Value) -> Vec<&str> {
        body["posts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|post| post["id"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn created_posts_keep_duplicate_tags() {
        let app = TestApp::new();

        let (status, body) = app
            .post_multipart(
                "/api/posts",
                &[
                    ("username", "SwiftPanda1"),
                    ("caption", " first post "),
                    ("tags", "a, b, b"),
                ],
                None,
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Post created successfully");
        assert_eq!(body["post"]["caption"], "first post");
        assert_eq!(body["post"]["tags"], json!(["a", "b", "b"]));
        assert_eq!(body["post"]["likes"], 0);
        assert_eq!(body["post"]["likedBy"], json!([]));
        assert_eq!(body["post"]["mediaType"], "none");
        assert_eq!(body["post"]["mediaUrl"], "");
    }

    #[tokio::test]
    async fn repeated_tag_fields_are_a_sequence() {
        let app = TestApp::new();

        let (status, body) = app
            .post_multipart(
                "/api/posts",
                &[
                    ("username", "SwiftPanda1"),
                    ("caption", "tags"),
                    ("tags[]", " rust "),
                    ("tags[]", ""),
                    ("tags[]", "axum"),
                ],
                None,
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["post"]["tags"], json!(["rust", "axum"]));
    }

    #[tokio::test]
    async fn media_is_uploaded_and_served() {
        let app = TestApp::new();

        let (status, body) = app
            .post_multipart(
                "/api/posts",
                &[("username", "SwiftPanda1"), ("caption", "look")],
                Some(("clip.MP4", b"not really a video".as_slice())),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["post"]["mediaType"], "video");
        let url = body["post"]["mediaUrl"].as_str().unwrap();
        let path = url.strip_prefix("http://localhost:5000").unwrap();
        assert!(path.starts_with("/media/devsphere/"));

        let (status, bytes) = app.get_raw(path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"not really a video");
    }

    #[tokio::test]
    async fn missing_caption_is_rejected() {
        let app = TestApp::new();

        let (status, body) = app
            .post_multipart("/api/posts", &[("username", "SwiftPanda1")], None)
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "caption is required");
    }

    #[tokio::test]
    async fn non_multipart_bodies_are_rejected() {
        let app = TestApp::new();

        let (status, _) = app.post_json("/api/posts", &json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_uploads_do_not_create_posts() {
        let app = TestApp::with_broken_media();

        let (status, body) = app
            .post_multipart(
                "/api/posts",
                &[("username", "SwiftPanda1"), ("caption", "look")],
                Some(("cat.png", b"meow".as_slice())),
            )
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Error uploading media");

        let (_, body) = app.get("/api/posts").await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn oversized_uploads_are_too_large() {
        let app = TestApp::new();
        let video = vec![0_u8; 2 * 1024 * 1024];

        let (status, body) = app
            .post_multipart(
                "/api/posts",
                &[("username", "SwiftPanda1"), ("caption", "big")],
                Some(("big.mp4", video.as_slice())),
            )
            .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["message"], "Request body is too large");

        let (_, body) = app.get("/api/posts").await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn posts_are_listed_newest_first() {
        let app = TestApp::new();
        let first = create(&app, "SwiftPanda1", "").await;
        let second = create(&app, "SwiftPanda1", "").await;
        let third = create(&app, "SwiftPanda1", "").await;

        let (status, body) = app.get("/api/posts").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 3);
        assert_eq!(ids(&body), [third, second, first]);
    }

    #[tokio::test]
    async fn tag_search_is_an_or_of_exact_tags() {
        let app = TestApp::new();
        let react = create(&app, "SwiftPanda1", "React, css").await;
        let mongo = create(&app, "BoldOtter2", "MONGODB").await;
        create(&app, "KeenLynx3", "reactive").await;

        let (status, body) = app
            .get("/api/posts/search?query=react,%20mongodb&type=tags")
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["query"], "react, mongodb");
        assert_eq!(body["type"], "tags");
        assert_eq!(ids(&body), [mongo, react]);
    }

    #[tokio::test]
    async fn username_search_matches_substrings() {
        let app = TestApp::new();
        let panda = create(&app, "SwiftPanda1", "").await;
        create(&app, "BoldOtter2", "panda").await;

        let (_, body) = app.get("/api/posts/search?query=panda&type=username").await;
        assert_eq!(ids(&body), [panda]);

        let (_, body) = app.get("/api/posts/search?query=panda&type=all").await;
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn search_requires_a_query_and_a_known_type() {
        let app = TestApp::new();

        let (status, body) = app.get("/api/posts/search?type=tags").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Search query is required");

        let (status, body) = app.get("/api/posts/search?query=rust").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Invalid search type. Use: username, tags, or all"
        );

        let (status, body) = app.get("/api/posts/search?query=rust&type=regex").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Invalid search type. Use: username, tags, or all"
        );

        let (status, body) = app.get("/api/posts/search?query=%20,%20&type=tags").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "At least one tag is required");
    }

    #[tokio::test]
    async fn liking_twice_restores_the_count() {
        let app = TestApp::new();
        let id = create(&app, "SwiftPanda1", "").await;
        let path = format!("/api/posts/{id}/like");

        let (status, liked) = app.post_from(&path, "10.0.0.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(liked["liked"], true);
        assert_eq!(liked["likes"], 1);
        assert_eq!(liked["message"], "Post liked successfully");

        let (_, other) = app.post_from(&path, "10.0.0.2").await;
        assert_eq!(other["likes"], 2);

        let (_, unliked) = app.post_from(&path, "10.0.0.1").await;
        assert_eq!(unliked["liked"], false);
        assert_eq!(unliked["likes"], 1);
        assert_eq!(unliked["message"], "Post unliked successfully");

        let (_, body) = app.get("/api/posts").await;
        let post = &body["posts"][0];
        assert_eq!(post["likes"], 1);
        assert_eq!(post["likedBy"], json!(["10.0.0.2"]));
    }

    #[tokio::test]
    async fn liking_unknown_posts_is_not_found() {
        let app = TestApp::new();

        let (status, body) = app.post_from("/api/posts/12345/like", "10.0.0.1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Post not found");

        let (status, _) = app.post_from("/api/posts/not-an-id/like", "10.0.0.1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn liking_without_an_address_is_rejected() {
        let app = TestApp::new();
        let id = create(&app, "SwiftPanda1", "").await;

        let (status, body) = app.post_json(&format!("/api/posts/{id}/like"), &json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Could not determine IP address");
    }

    #[tokio::test]
    async fn comments_are_appended() {
        let app = TestApp::new();
        let id = create(&app, "SwiftPanda1", "").await;
        let path = format!("/api/posts/{id}/comment");

        app.post_json(&path, &json!({"username": "BoldOtter2", "text": "first"}))
            .await;
        let (status, body) = app
            .post_json(&path, &json!({"username": "KeenLynx3", "text": "second"}))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Comment added successfully");
        let comments = body["comments"].as_array().unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0]["text"], "first");
        assert_eq!(comments[1]["username"], "KeenLynx3");
        assert!(comments[1]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn incomplete_comments_are_rejected() {
        let app = TestApp::new();
        let id = create(&app, "SwiftPanda1", "").await;

        let (status, body) = app
            .post_json(
                &format!("/api/posts/{id}/comment"),
                &json!({"username": "BoldOtter2", "text": "  "}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username and comment text are required");

        let (status, _) = app
            .post_json(
                "/api/posts/12345/comment",
                &json!({"username": "BoldOtter2", "text": "hi"}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn multipart_bodies_are_well_formed() {
        let body = multipart_body(&[("caption", "hi")], Some(("a.png", b"x".as_slice())));
        let body = String::from_utf8(body).unwrap();

        assert!(body.contains("name=\"caption\"\r\n\r\nhi\r\n"));
        assert!(body.contains("filename=\"a.png\""));
        assert!(body.ends_with("--\r\n"));
    }
}
