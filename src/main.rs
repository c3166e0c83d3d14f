//! Demo entry point: creates a user and a post in one unit of work.
//!
//! Expects the `users` and `posts` tables to exist in the database named by
//! `DATABASE_URL`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tx_coordinator::config::DatabaseConfig;
use tx_coordinator::service::Service;
use tx_coordinator::store::Stores;
use tx_coordinator::Coordinator;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = DatabaseConfig::from_env();
    tracing::debug!(?config, "configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!("unit of work failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: DatabaseConfig) -> Result<(), Box<dyn std::error::Error>> {
    let datastore = config.connect().await?;
    let coordinator = Coordinator::with_config(datastore, Stores::sql, config.coordinator_config());
    let service = Service::new(coordinator);

    let (user, post) = service
        .create_user_with_post(
            "Sample User",
            "sample@example.com",
            "Sample Post",
            "This is a sample post content.",
        )
        .await?;

    tracing::info!(user_id = %user.id, post_id = %post.id, "created user with a related post");
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();
}
