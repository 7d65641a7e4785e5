use crate::{
    client::Result,
    record::{CommentRecord, IdentityRecord, LikeRecord, PostRecord},
};
use devsphere_common::model::{
    Id,
    identity::{Identity, IdentityLookup, Username},
    post::{Comment, CommentMarker, CreateComment, CreatePost, LikeToggle, Post, PostMarker},
    search::SearchQuery,
};
use sqlx::{PgPool, query, query_as, query_scalar};
use std::{
    collections::{BTreeSet, HashMap},
    net::IpAddr,
};
use time::OffsetDateTime;

const POST_COLUMNS: &str = "
    posts.post_snowflake,
    posts.username,
    posts.caption,
    posts.media_url,
    posts.media_type,
    posts.tags,
    posts.created_at
";

pub(crate) async fn fetch_identity(pool: &PgPool, ip: IpAddr) -> Result<Option<Identity>> {
    let record = query_as::<_, IdentityRecord>(
        "
        SELECT
            identities.ip_address,
            identities.username,
            identities.created_at
        FROM
            users.identities
        WHERE
            identities.ip_address = $1
        ",
    )
    .bind(ip.to_string())
    .fetch_optional(pool)
    .await?;

    let identity = record.map(Identity::try_from).transpose()?;
    Ok(identity)
}

pub(crate) async fn username_taken(pool: &PgPool, username: &Username) -> Result<bool> {
    let taken = query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM users.identities WHERE identities.username = $1)",
    )
    .bind(username.get())
    .fetch_one(pool)
    .await?;

    Ok(taken)
}

/// Inserts the identity unless the address or the name is already bound.
///
/// Returns `None` when the name was taken in the meantime, so the caller can try the next one.
pub(crate) async fn insert_identity(
    pool: &PgPool,
    ip: IpAddr,
    username: Username,
    created_at: OffsetDateTime,
) -> Result<Option<IdentityLookup>> {
    let record = query_as::<_, IdentityRecord>(
        "
        INSERT INTO users.identities (ip_address, username, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING
            identities.ip_address,
            identities.username,
            identities.created_at
        ",
    )
    .bind(ip.to_string())
    .bind(username.get())
    .bind(created_at)
    .fetch_optional(pool)
    .await?;

    if let Some(record) = record {
        return Ok(Some(IdentityLookup::Created(record.try_into()?)));
    }

    // Either another request bound this address first or the name belongs to someone else.
    Ok(fetch_identity(pool, ip).await?.map(IdentityLookup::Existing))
}

pub(crate) async fn create_post(
    pool: &PgPool,
    id: Id<PostMarker>,
    post: &CreatePost,
    created_at: OffsetDateTime,
) -> Result<()> {
    let (media_url, media_type) = post
        .media
        .as_ref()
        .map_or(("", "none"), |media| (media.url.as_str(), media.kind.as_str()));

    query(
        "
        INSERT INTO posts.posts
            (post_snowflake, username, caption, media_url, media_type, tags, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ",
    )
    .bind(id.as_db())
    .bind(post.username.get())
    .bind(&post.caption)
    .bind(media_url)
    .bind(media_type)
    .bind(&post.tags)
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn fetch_post(pool: &PgPool, post_id: Id<PostMarker>) -> Result<Option<Post>> {
    let record = query_as::<_, PostRecord>(&format!(
        "SELECT {POST_COLUMNS} FROM posts.posts WHERE posts.post_snowflake = $1"
    ))
    .bind(post_id.as_db())
    .fetch_optional(pool)
    .await?;

    let Some(record) = record else {
        return Ok(None);
    };
    Ok(attach_details(pool, vec![record]).await?.pop())
}

pub(crate) async fn fetch_posts(pool: &PgPool) -> Result<Vec<Post>> {
    let records = query_as::<_, PostRecord>(&format!(
        "
        SELECT {POST_COLUMNS}
        FROM posts.posts
        ORDER BY posts.created_at DESC, posts.post_snowflake DESC
        "
    ))
    .fetch_all(pool)
    .await?;

    attach_details(pool, records).await
}

/// Stored and searched values are both lowercased by the database.
const SEARCH_FILTER: &str = "
    ($1::text IS NOT NULL AND strpos(lower(posts.username), lower($1)) > 0)
    OR EXISTS (
        SELECT 1
        FROM unnest(posts.tags) AS tag, unnest($2::text[]) AS wanted
        WHERE lower(tag) = lower(wanted)
    )
";

pub(crate) async fn search_posts(pool: &PgPool, search: &SearchQuery) -> Result<Vec<Post>> {
    let records = query_as::<_, PostRecord>(&format!(
        "
        SELECT {POST_COLUMNS}
        FROM posts.posts
        WHERE {SEARCH_FILTER}
        ORDER BY posts.created_at DESC, posts.post_snowflake DESC
        "
    ))
    .bind(search.username_fragment())
    .bind(search.tags())
    .fetch_all(pool)
    .await?;

    attach_details(pool, records).await
}

/// Loads likes and comments for `records` and converts them, keeping their order.
async fn attach_details(pool: &PgPool, records: Vec<PostRecord>) -> Result<Vec<Post>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let snowflakes: Vec<i64> = records.iter().map(|record| record.post_snowflake).collect();

    let likes = query_as::<_, LikeRecord>(
        "
        SELECT post_likes.post_snowflake, post_likes.ip_address
        FROM posts.post_likes
        WHERE post_likes.post_snowflake = ANY($1)
        ",
    )
    .bind(&snowflakes)
    .fetch_all(pool)
    .await?;

    let comments = query_as::<_, CommentRecord>(
        "
        SELECT
            comments.post_snowflake,
            comments.username,
            comments.text,
            comments.created_at
        FROM posts.comments
        WHERE comments.post_snowflake = ANY($1)
        ORDER BY comments.created_at, comments.comment_snowflake
        ",
    )
    .bind(&snowflakes)
    .fetch_all(pool)
    .await?;

    let mut likes_by_post: HashMap<i64, BTreeSet<IpAddr>> = HashMap::new();
    for like in likes {
        let post_snowflake = like.post_snowflake;
        likes_by_post
            .entry(post_snowflake)
            .or_default()
            .insert(like.try_into()?);
    }

    let mut comments_by_post: HashMap<i64, Vec<Comment>> = HashMap::new();
    for comment in comments {
        comments_by_post
            .entry(comment.post_snowflake)
            .or_default()
            .push(comment.into());
    }

    records
        .into_iter()
        .map(|record| -> Result<Post> {
            let post_snowflake = record.post_snowflake;
            let mut post = Post::try_from(record)?;
            post.liked_by = likes_by_post
                .remove(&post_snowflake)
                .unwrap_or_default()
                .into_iter()
                .collect();
            post.comments = comments_by_post
                .remove(&post_snowflake)
                .unwrap_or_default();
            Ok(post)
        })
        .collect()
}

/// Toggles the like of `ip` on a post while holding the post's row lock.
pub(crate) async fn toggle_like(
    pool: &PgPool,
    post_id: Id<PostMarker>,
    ip: IpAddr,
) -> Result<Option<LikeToggle>> {
    let mut transaction = pool.begin().await?;

    let post_exists = query_scalar::<_, i64>(
        "SELECT posts.post_snowflake FROM posts.posts WHERE posts.post_snowflake = $1 FOR UPDATE",
    )
    .bind(post_id.as_db())
    .fetch_optional(&mut *transaction)
    .await?
    .is_some();

    if !post_exists {
        return Ok(None);
    }

    let ip_address = ip.to_string();

    let removed = query(
        "DELETE FROM posts.post_likes WHERE post_snowflake = $1 AND ip_address = $2",
    )
    .bind(post_id.as_db())
    .bind(&ip_address)
    .execute(&mut *transaction)
    .await?
    .rows_affected()
        > 0;

    if !removed {
        query("INSERT INTO posts.post_likes (post_snowflake, ip_address) VALUES ($1, $2)")
            .bind(post_id.as_db())
            .bind(&ip_address)
            .execute(&mut *transaction)
            .await?;
    }

    let likes = query_scalar::<_, i64>(
        "SELECT count(*) FROM posts.post_likes WHERE post_likes.post_snowflake = $1",
    )
    .bind(post_id.as_db())
    .fetch_one(&mut *transaction)
    .await?;

    transaction.commit().await?;

    Ok(Some(LikeToggle {
        liked: !removed,
        likes: usize::try_from(likes).unwrap_or_default(),
    }))
}

pub(crate) async fn add_comment(
    pool: &PgPool,
    post_id: Id<PostMarker>,
    comment_id: Id<CommentMarker>,
    comment: &CreateComment,
    created_at: OffsetDateTime,
) -> Result<Option<Vec<Comment>>> {
    let inserted = query(
        "
        INSERT INTO posts.comments
            (comment_snowflake, post_snowflake, username, text, created_at)
        SELECT $1, $2, $3, $4, $5
        WHERE EXISTS (SELECT 1 FROM posts.posts WHERE posts.post_snowflake = $2)
        ",
    )
    .bind(comment_id.as_db())
    .bind(post_id.as_db())
    .bind(&comment.username)
    .bind(&comment.text)
    .bind(created_at)
    .execute(pool)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Ok(None);
    }

    let comments = query_as::<_, CommentRecord>(
        "
        SELECT
            comments.post_snowflake,
            comments.username,
            comments.text,
            comments.created_at
        FROM posts.comments
        WHERE comments.post_snowflake = $1
        ORDER BY comments.created_at, comments.comment_snowflake
        ",
    )
    .bind(post_id.as_db())
    .fetch_all(pool)
    .await?;

    Ok(Some(comments.into_iter().map(Comment::from).collect()))
}

pub(crate) async fn clear_all(pool: &PgPool) -> Result<(u64, u64)> {
    let mut transaction = pool.begin().await?;

    let posts_deleted = query("DELETE FROM posts.posts")
        .execute(&mut *transaction)
        .await?
        .rows_affected();
    let identities_deleted = query("DELETE FROM users.identities")
        .execute(&mut *transaction)
        .await?
        .rows_affected();

    transaction.commit().await?;

    Ok((posts_deleted, identities_deleted))
}
