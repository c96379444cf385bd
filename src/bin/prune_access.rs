use chrono::Utc;
use clap::Parser;
use log::info;
use std::error::Error;
use tg_filestore::access_manager::AccessManager;
use tg_filestore::db;

#[derive(Parser)]
#[command(name = "prune_access")]
#[command(about = "Delete expired access grants and stale verification tokens")]
struct Cli {
    /// Execute mode - actually delete rows (default is dry run)
    #[arg(long)]
    execute: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // initialize rustls crypto provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    dotenvy::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL environment variable is required")?;
    let pool = db::create_pool(&database_url)?;
    let now = Utc::now();

    if !cli.execute {
        let client = pool.get().await?;
        let expired: i64 = client
            .query_one(
                "SELECT COUNT(*) FROM user_access WHERE expires_at <= $1",
                &[&now],
            )
            .await?
            .get(0);
        let active = AccessManager::new(pool.clone()).active_count(now).await?;

        println!("--- DRY RUN MODE ---");
        println!("Active grants: {}", active);
        println!("Expired grants that would be deleted: {}", expired);
        println!("Use --execute to actually delete them");
        return Ok(());
    }

    let removed = AccessManager::new(pool).prune_expired(now).await?;
    info!("Pruned {} rows", removed);
    println!("Removed {} expired grants and stale tokens", removed);
    Ok(())
}
