use devsphere_common::model::{
    Id, ModelValidationError,
    identity::{Identity, Username},
    post::{Comment, LikedBy, Post},
};
use sqlx::FromRow;
use std::net::IpAddr;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct IdentityRecord {
    pub ip_address: String,
    pub username: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub username: String,
    pub caption: String,
    pub media_url: String,
    pub media_type: String,
    pub tags: Vec<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct LikeRecord {
    pub post_snowflake: i64,
    pub ip_address: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub post_snowflake: i64,
    pub username: String,
    pub text: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<IdentityRecord> for Identity {
    type Error = ModelValidationError;

    fn try_from(value: IdentityRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            ip_address: value.ip_address.parse()?,
            username: Username::new(value.username)?,
            created_at: value.created_at,
        })
    }
}

/// Converts the post row alone; likes and comments are attached afterwards.
impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            username: Username::new(value.username)?,
            caption: value.caption,
            media_url: value.media_url,
            media_type: value.media_type.parse()?,
            tags: value.tags,
            liked_by: LikedBy::new(),
            comments: Vec::new(),
            created_at: value.created_at,
        })
    }
}

impl TryFrom<LikeRecord> for IpAddr {
    type Error = ModelValidationError;

    fn try_from(value: LikeRecord) -> Result<Self, Self::Error> {
        Ok(value.ip_address.parse()?)
    }
}

impl From<CommentRecord> for Comment {
    fn from(value: CommentRecord) -> Self {
        Self {
            username: value.username,
            text: value.text,
            created_at: value.created_at,
        }
    }
}
