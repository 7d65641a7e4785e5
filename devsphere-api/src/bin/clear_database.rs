//! Deletes every post, like, comment and identity from the configured database.

use devsphere_api::env::{InitError, get_env, install_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let db_client = env.require_postgres().await?;
    db_client.migrate().await?;

    let cleared = db_client.clear_all().await?;
    info!(
        posts = cleared.posts,
        identities = cleared.identities,
        "Cleared database"
    );

    Ok(())
}
