use clap::Parser;
use log::info;

use tg_filestore::bot::TelegramBot;
use tg_filestore::config::BotConfig;
use tg_filestore::db;

#[derive(Parser)]
#[command(name = "tg-filestore")]
#[command(about = "A Telegram bot that stores files in a channel and shares them by link")]
struct Args {
    /// Apply database migrations and exit
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // initialize rustls crypto provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // load .env file if it exists
    if let Err(e) = dotenvy::dotenv() {
        // only warn if .env file exists but failed to load
        match e {
            dotenvy::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            _ => {
                eprintln!("warning: failed to load .env file: {}", e);
            }
        }
    }

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = BotConfig::from_env()?;

    let pool = db::connect_and_migrate(&config.database_url).await?;
    if args.migrate_only {
        info!("Migrations applied, exiting");
        return Ok(());
    }

    info!("Starting bot...");
    let bot = TelegramBot::new(config, pool).await?;
    bot.run().await;

    Ok(())
}
