use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use log::info;
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::migrations::MigrationManager;

fn tls_connector() -> MakeRustlsConnect {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    MakeRustlsConnect::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

pub fn create_pool(database_url: &str) -> Result<Pool, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = Config::new();
    config.url = Some(database_url.to_string());
    config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    let pool = config.create_pool(Some(Runtime::Tokio1), tls_connector())?;
    Ok(pool)
}

/// creates the pool, checks connectivity and brings the schema up to date
pub async fn connect_and_migrate(
    database_url: &str,
) -> Result<Pool, Box<dyn std::error::Error + Send + Sync>> {
    let pool = create_pool(database_url)?;
    {
        let _client = pool.get().await?;
    }
    info!("Connected to database");
    MigrationManager::run_migrations(&pool).await?;
    Ok(pool)
}
