use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use crewflow_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the pool described by the `[database]` section of the application
/// config. SQLite's own lock wait is derived from the same timeout as the
/// pool acquire timeout, so one knob governs both.
pub async fn connect(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let acquire_timeout = Duration::from_secs(database.timeout_secs.max(1));
    let busy_timeout_ms = acquire_timeout.as_millis().min(u128::from(u32::MAX)) as u64;

    SqlitePoolOptions::new()
        .max_connections(database.max_connections.max(1))
        .acquire_timeout(acquire_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&database.url)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::connect;
    use crewflow_core::config::DatabaseConfig;

    #[tokio::test]
    async fn connect_applies_config_derived_pragmas() {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 7,
        };
        let pool = connect(&database).await.expect("connect");

        let foreign_keys: i64 = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("pragma foreign_keys")
            .get(0);
        assert_eq!(foreign_keys, 1);

        let busy_timeout: i64 = sqlx::query("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .expect("pragma busy_timeout")
            .get(0);
        assert_eq!(busy_timeout, 7_000);
    }

    #[tokio::test]
    async fn zero_settings_are_clamped_to_a_working_pool() {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 0,
            timeout_secs: 0,
        };
        let pool = connect(&database).await.expect("connect");

        let one: i64 = sqlx::query("SELECT 1").fetch_one(&pool).await.expect("query").get(0);
        assert_eq!(one, 1);
    }
}
