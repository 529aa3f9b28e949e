//! Database connectivity probe

use std::time::Duration;

use async_trait::async_trait;
use contacts_core::ConnectivityProbe;
use sqlx::PgPool;

/// Reports the database offline when the pool is closed or a `SELECT 1`
/// does not come back in time.
#[derive(Clone)]
pub struct DatabaseProbe {
    pool: PgPool,
    timeout: Duration,
}

impl DatabaseProbe {
    pub const fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl ConnectivityProbe for DatabaseProbe {
    async fn is_online(&self) -> bool {
        if self.pool.is_closed() {
            return false;
        }

        // An idle pooled connection was healthy when it was returned
        if self.pool.num_idle() > 0 {
            return true;
        }

        let ping = sqlx::query("SELECT 1").execute(&self.pool);
        match tokio::time::timeout(self.timeout, ping).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "Database probe failed");
                false
            }
            Err(_) => {
                tracing::warn!(timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX), "Database probe timed out");
                false
            }
        }
    }
}
