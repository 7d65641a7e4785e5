use crate::model::{Id, ValidationError, identity::Username, media::MediaKind};
use serde::{Serialize, Serializer, ser::SerializeStruct};
use std::{collections::BTreeSet, net::IpAddr};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    pub username: Username,
    pub caption: String,
    pub media_url: String,
    pub media_type: MediaKind,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub liked_by: LikedBy,
    pub comments: Vec<Comment>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub username: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The addresses that currently like a post.
///
/// The like count is the size of this set; it is never tracked on its own.
/// Serializes as the two post fields `likes` and `likedBy`.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct LikedBy(BTreeSet<IpAddr>);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes: usize,
}

/// A validated post creation request. Media has already been uploaded.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreatePost {
    pub username: Username,
    pub caption: String,
    pub tags: Vec<String>,
    pub media: Option<StoredMedia>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct StoredMedia {
    pub url: String,
    pub kind: MediaKind,
}

/// A validated comment to append to a post.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreateComment {
    pub username: String,
    pub text: String,
}

impl LikedBy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn likes(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip)
    }

    /// Removes `ip` if it already likes the post, adds it otherwise.
    pub fn toggle(&mut self, ip: IpAddr) -> LikeToggle {
        let liked = if self.0.remove(&ip) {
            false
        } else {
            self.0.insert(ip)
        };

        LikeToggle {
            liked,
            likes: self.likes(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<IpAddr> for LikedBy {
    fn from_iter<T: IntoIterator<Item = IpAddr>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for LikedBy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("LikedBy", 2)?;
        state.serialize_field("likes", &self.likes())?;
        state.serialize_field("likedBy", &self.0)?;
        state.end()
    }
}

impl Post {
    #[must_use]
    pub fn new(id: Id<PostMarker>, post: CreatePost, created_at: OffsetDateTime) -> Self {
        let StoredMedia { url, kind } = post.media.unwrap_or_default();

        Self {
            id,
            username: post.username,
            caption: post.caption,
            media_url: url,
            media_type: kind,
            tags: post.tags,
            liked_by: LikedBy::new(),
            comments: Vec::new(),
            created_at,
        }
    }

    #[must_use]
    pub fn likes(&self) -> usize {
        self.liked_by.likes()
    }
}

/// Sorts posts newest first; posts created in the same instant keep id order, newest first.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

impl CreatePost {
    pub fn new(
        username: &str,
        caption: &str,
        tags: Vec<String>,
        media: Option<StoredMedia>,
    ) -> Result<Self, ValidationError> {
        if username.trim().is_empty() {
            return Err(ValidationError::MissingField("username"));
        }
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(ValidationError::MissingField("caption"));
        }

        Ok(Self {
            username: Username::new(username)?,
            caption: caption.to_owned(),
            tags,
            media,
        })
    }
}

impl CreateComment {
    pub fn new(username: Option<String>, text: Option<String>) -> Result<Self, ValidationError> {
        match (username, text) {
            (Some(username), Some(text)) if !username.trim().is_empty() && !text.trim().is_empty() => {
                Ok(Self { username, text })
            }
            _ => Err(ValidationError::IncompleteComment),
        }
    }
}
