use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

/// Handle to the transcript database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    db: Arc<libsql::Database>,
    pragmas: Arc<Pragmas>,
}

#[derive(Debug)]
struct Pragmas {
    busy_timeout_ms: u64,
    journal_mode: &'static str,
    synchronous: &'static str,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db = if config.url.starts_with("libsql://") || config.url.starts_with("https://") {
            let token = config.auth_token.clone().unwrap_or_default();
            match config.local_path {
                Some(ref local_path) => {
                    Builder::new_remote_replica(local_path, config.url.clone(), token)
                        .build()
                        .await?
                }
                None => Builder::new_remote(config.url.clone(), token).build().await?,
            }
        } else {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        };

        let database = Self {
            db: Arc::new(db),
            pragmas: Arc::new(Pragmas {
                busy_timeout_ms: config.busy_timeout_ms,
                journal_mode: normalize_journal_mode(&config.journal_mode),
                synchronous: normalize_synchronous(&config.synchronous),
            }),
        };

        let conn = database.db.connect()?;
        database.apply_pragmas(&conn).await;
        schema::init_schema(&conn).await?;

        Ok(database)
    }

    /// Opens a connection with busy timeout and foreign keys set.
    pub async fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect()?;
        for sql in [
            format!("PRAGMA busy_timeout = {}", self.pragmas.busy_timeout_ms),
            "PRAGMA foreign_keys = ON".to_string(),
        ] {
            if let Err(error) = conn.execute_batch(&sql).await {
                tracing::debug!(error = %error, pragma = %sql, "Failed to apply connection pragma");
            }
        }
        Ok(conn)
    }

    async fn apply_pragmas(&self, conn: &Connection) {
        let statements = [
            ("journal_mode", self.pragmas.journal_mode),
            ("synchronous", self.pragmas.synchronous),
        ];
        for (name, value) in statements {
            if let Err(error) = conn.execute_batch(&format!("PRAGMA {name} = {value}")).await {
                tracing::warn!(pragma = name, mode = value, error = %error, "Failed to set SQLite pragma");
            }
        }
    }

    /// Round-trips a trivial query.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.connect().await?;
        let mut rows = conn.query("SELECT 1", ()).await?;
        rows.next().await?;
        Ok(())
    }

    pub async fn sync(&self) -> Result<()> {
        if let Ok(sync) = self.db.sync().await {
            tracing::debug!("Database synced: {:?}", sync);
        }
        Ok(())
    }
}

fn normalize_journal_mode(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "DELETE" => "DELETE",
        "TRUNCATE" => "TRUNCATE",
        "PERSIST" => "PERSIST",
        "MEMORY" => "MEMORY",
        "OFF" => "OFF",
        _ => "WAL",
    }
}

fn normalize_synchronous(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "OFF" => "OFF",
        "FULL" => "FULL",
        "EXTRA" => "EXTRA",
        _ => "NORMAL",
    }
}
