use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::AppResult;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::AppError::Internal(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}

pub type DbPool = Arc<Database>;
