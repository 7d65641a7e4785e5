use devsphere_common::model::{
    Id,
    identity::{Identity, IdentityLookup, Username},
    post::{Comment, CreateComment, LikeToggle, Post, PostMarker, sort_newest_first},
    search::SearchQuery,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    net::IpAddr,
};
use time::OffsetDateTime;

/// Process-local store with the same semantics as the PostgreSQL schema.
#[derive(Clone, Debug, Default)]
pub(crate) struct MemoryStore {
    identities: HashMap<IpAddr, Identity>,
    usernames: HashSet<Username>,
    posts: BTreeMap<Id<PostMarker>, Post>,
}

impl MemoryStore {
    pub fn fetch_identity(&self, ip: IpAddr) -> Option<Identity> {
        self.identities.get(&ip).cloned()
    }

    pub fn username_taken(&self, username: &Username) -> bool {
        self.usernames.contains(username)
    }

    pub fn insert_identity(
        &mut self,
        ip: IpAddr,
        username: Username,
        created_at: OffsetDateTime,
    ) -> Option<IdentityLookup> {
        if let Some(existing) = self.fetch_identity(ip) {
            return Some(IdentityLookup::Existing(existing));
        }
        if !self.usernames.insert(username.clone()) {
            return None;
        }

        let identity = Identity {
            ip_address: ip,
            username,
            created_at,
        };
        self.identities.insert(ip, identity.clone());

        Some(IdentityLookup::Created(identity))
    }

    pub fn insert_post(&mut self, post: Post) {
        self.posts.insert(post.id, post);
    }

    pub fn fetch_post(&self, post_id: Id<PostMarker>) -> Option<Post> {
        self.posts.get(&post_id).cloned()
    }

    pub fn fetch_posts(&self, search: Option<&SearchQuery>) -> Vec<Post> {
        let mut posts: Vec<Post> = self
            .posts
            .values()
            .filter(|post| search.is_none_or(|search| search.matches(post)))
            .cloned()
            .collect();

        sort_newest_first(&mut posts);
        posts
    }

    pub fn toggle_like(&mut self, post_id: Id<PostMarker>, ip: IpAddr) -> Option<LikeToggle> {
        let post = self.posts.get_mut(&post_id)?;
        Some(post.liked_by.toggle(ip))
    }

    pub fn add_comment(
        &mut self,
        post_id: Id<PostMarker>,
        comment: &CreateComment,
        created_at: OffsetDateTime,
    ) -> Option<Vec<Comment>> {
        let post = self.posts.get_mut(&post_id)?;
        post.comments.push(Comment {
            username: comment.username.clone(),
            text: comment.text.clone(),
            created_at,
        });

        Some(post.comments.clone())
    }

    pub fn clear_all(&mut self) -> (u64, u64) {
        let posts_deleted = self.posts.len() as u64;
        let identities_deleted = self.identities.len() as u64;

        *self = Self::default();

        (posts_deleted, identities_deleted)
    }

    #[cfg(test)]
    pub fn reserve_username(&mut self, username: Username) {
        self.usernames.insert(username);
    }
}
