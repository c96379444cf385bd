use deadpool_postgres::{Object, Pool};
use log::info;

/// numbered schema steps, applied in order and recorded in `schema_migrations`
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (
        1,
        "settings and access grants",
        r#"
        -- Admin-editable settings, one JSON document per key
        CREATE TABLE bot_settings (
            key VARCHAR(64) PRIMARY KEY,
            value JSONB NOT NULL,
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
        );

        -- Access token grants
        CREATE TABLE user_access (
            telegram_user_id BIGINT PRIMARY KEY,
            expires_at TIMESTAMP WITH TIME ZONE NOT NULL,
            renewed_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
        );

        CREATE INDEX idx_user_access_expires ON user_access(expires_at);
        "#,
    ),
    (
        2,
        "verification tokens",
        r#"
        -- One-time tokens handed out through shortened verification links
        CREATE TABLE verification_tokens (
            token VARCHAR(32) PRIMARY KEY,
            telegram_user_id BIGINT NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
            redeemed_at TIMESTAMP WITH TIME ZONE
        );

        CREATE INDEX idx_verification_tokens_user ON verification_tokens(telegram_user_id);
        CREATE INDEX idx_verification_tokens_created ON verification_tokens(created_at);
        "#,
    ),
];

pub struct MigrationManager;

impl MigrationManager {
    pub fn latest_version() -> i32 {
        MIGRATIONS.last().map_or(0, |(version, _, _)| *version)
    }

    pub async fn run_migrations(
        pool: &Pool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Running database migrations...");
        let mut client = pool.get().await?;

        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
                )",
            )
            .await?;

        let current_version = Self::current_version(&client).await?;
        if current_version >= Self::latest_version() {
            info!("Database schema is up to date (version {})", current_version);
            return Ok(());
        }

        for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current_version) {
            // each step commits on its own so a failure keeps earlier ones
            let transaction = client.transaction().await?;
            transaction.batch_execute(sql).await?;
            transaction
                .execute(
                    "INSERT INTO schema_migrations (version) VALUES ($1)",
                    &[version],
                )
                .await?;
            transaction.commit().await?;
            info!("Applied migration {} ({})", version, name);
        }

        info!("Database migrations completed");
        Ok(())
    }

    async fn current_version(
        client: &Object,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let row = client
            .query_one("SELECT MAX(version) FROM schema_migrations", &[])
            .await?;
        Ok(row.get::<_, Option<i32>>(0).unwrap_or(0))
    }
}
