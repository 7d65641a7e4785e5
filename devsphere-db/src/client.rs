use crate::{memory::MemoryStore, postgres};
use devsphere_common::{
    model::{
        DevsphereSnowflakeGenerator, Id, ModelValidationError,
        identity::{Identity, IdentityLookup, Username, username_candidates},
        post::{Comment, CreateComment, CreatePost, LikeToggle, Post, PostMarker},
        search::SearchQuery,
        to_offset,
    },
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgPool, migrate::MigrateError};
use std::net::IpAddr;
use thiserror::Error;
use time::{OffsetDateTime, UtcDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Applying migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error("Could not generate a unique username for {0}")]
    UsernameGenerationExhausted(IpAddr),
}

/// Number of posts and identities removed by [`DbClient::clear_all`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Cleared {
    pub posts: u64,
    pub identities: u64,
}

#[derive(Debug)]
enum Backend {
    Postgres(PgPool),
    Memory(Mutex<MemoryStore>),
}

#[derive(Debug)]
pub struct DbClient {
    backend: Backend,
    snowflake_generator: Mutex<DevsphereSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self::with_backend(Backend::Postgres(pool), worker_id, process_id)
    }

    /// A client that keeps everything in this process and loses it on exit.
    #[must_use]
    pub fn in_memory(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self::with_backend(
            Backend::Memory(Mutex::new(MemoryStore::default())),
            worker_id,
            process_id,
        )
    }

    fn with_backend(backend: Backend, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(DevsphereSnowflakeGenerator::new(worker_id, process_id));

        Self {
            backend,
            snowflake_generator,
        }
    }

    /// Brings the PostgreSQL schema up to date. Does nothing for the memory backend.
    pub async fn migrate(&self) -> Result<()> {
        if let Backend::Postgres(pool) = &self.backend {
            sqlx::migrate!("./migrations").run(pool).await?;
            info!("Database migrations applied");
        }

        Ok(())
    }

    /// Generates an id stamped with the current time, and that time as it will be stored.
    async fn next_id<Marker>(&self) -> (Id<Marker>, OffsetDateTime) {
        let now = UtcDateTime::now();
        let snowflake = self.snowflake_generator.lock().await.generate_at(now);

        (snowflake.into(), to_offset(now))
    }

    /// Returns the identity bound to `ip`, generating and storing one on first sight.
    pub async fn get_or_create_identity(&self, ip: IpAddr) -> Result<IdentityLookup> {
        if let Some(identity) = self.fetch_identity(ip).await? {
            return Ok(IdentityLookup::Existing(identity));
        }

        for username in username_candidates(ip) {
            if self.username_taken(&username).await? {
                debug!(%ip, %username, "Username candidate already taken");
                continue;
            }

            let created_at = to_offset(UtcDateTime::now());
            if let Some(lookup) = self.insert_identity(ip, username, created_at).await? {
                if lookup.is_new() {
                    info!(%ip, username = %lookup.identity().username, "Created identity");
                }
                return Ok(lookup);
            }
        }

        Err(DbError::UsernameGenerationExhausted(ip))
    }

    async fn fetch_identity(&self, ip: IpAddr) -> Result<Option<Identity>> {
        match &self.backend {
            Backend::Postgres(pool) => postgres::fetch_identity(pool, ip).await,
            Backend::Memory(store) => Ok(store.lock().await.fetch_identity(ip)),
        }
    }

    async fn username_taken(&self, username: &Username) -> Result<bool> {
        match &self.backend {
            Backend::Postgres(pool) => postgres::username_taken(pool, username).await,
            Backend::Memory(store) => Ok(store.lock().await.username_taken(username)),
        }
    }

    async fn insert_identity(
        &self,
        ip: IpAddr,
        username: Username,
        created_at: OffsetDateTime,
    ) -> Result<Option<IdentityLookup>> {
        match &self.backend {
            Backend::Postgres(pool) => {
                postgres::insert_identity(pool, ip, username, created_at).await
            }
            Backend::Memory(store) => {
                Ok(store.lock().await.insert_identity(ip, username, created_at))
            }
        }
    }

    pub async fn create_post(&self, post: CreatePost) -> Result<Post> {
        let (post_id, created_at) = self.next_id().await;

        match &self.backend {
            Backend::Postgres(pool) => {
                postgres::create_post(pool, post_id, &post, created_at).await?;
                Ok(Post::new(post_id, post, created_at))
            }
            Backend::Memory(store) => {
                let post = Post::new(post_id, post, created_at);
                store.lock().await.insert_post(post.clone());
                Ok(post)
            }
        }
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        match &self.backend {
            Backend::Postgres(pool) => postgres::fetch_post(pool, post_id).await,
            Backend::Memory(store) => Ok(store.lock().await.fetch_post(post_id)),
        }
    }

    /// All posts, newest first.
    pub async fn fetch_posts(&self) -> Result<Vec<Post>> {
        match &self.backend {
            Backend::Postgres(pool) => postgres::fetch_posts(pool).await,
            Backend::Memory(store) => Ok(store.lock().await.fetch_posts(None)),
        }
    }

    /// Posts matching `search`, newest first.
    pub async fn search_posts(&self, search: &SearchQuery) -> Result<Vec<Post>> {
        match &self.backend {
            Backend::Postgres(pool) => postgres::search_posts(pool, search).await,
            Backend::Memory(store) => Ok(store.lock().await.fetch_posts(Some(search))),
        }
    }

    /// Likes the post for `ip`, or takes the like back if there already is one.
    ///
    /// Returns `None` if the post does not exist.
    pub async fn toggle_like(
        &self,
        post_id: Id<PostMarker>,
        ip: IpAddr,
    ) -> Result<Option<LikeToggle>> {
        match &self.backend {
            Backend::Postgres(pool) => postgres::toggle_like(pool, post_id, ip).await,
            Backend::Memory(store) => Ok(store.lock().await.toggle_like(post_id, ip)),
        }
    }

    /// Appends a comment and returns all comments of the post, oldest first.
    ///
    /// Returns `None` if the post does not exist.
    pub async fn add_comment(
        &self,
        post_id: Id<PostMarker>,
        comment: &CreateComment,
    ) -> Result<Option<Vec<Comment>>> {
        let (comment_id, created_at) = self.next_id().await;

        match &self.backend {
            Backend::Postgres(pool) => {
                postgres::add_comment(pool, post_id, comment_id, comment, created_at).await
            }
            Backend::Memory(store) => {
                Ok(store
                    .lock()
                    .await
                    .add_comment(post_id, comment, created_at))
            }
        }
    }

    /// Deletes every post, like, comment and identity.
    pub async fn clear_all(&self) -> Result<Cleared> {
        let (posts, identities) = match &self.backend {
            Backend::Postgres(pool) => postgres::clear_all(pool).await?,
            Backend::Memory(store) => store.lock().await.clear_all(),
        };

        Ok(Cleared { posts, identities })
    }
}
