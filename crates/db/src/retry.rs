use std::{future::Future, time::Duration};

use sqlx::Error;

const MAX_ATTEMPTS: usize = 4;
const BACKOFF_START_MS: u64 = 25;

/// Re-runs a write that lost the race for the SQLite write lock. Anything
/// other than SQLITE_BUSY/SQLITE_LOCKED propagates unchanged.
pub(crate) async fn retry_on_sqlite_busy<T, F, Fut>(mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut delay = Duration::from_millis(BACKOFF_START_MS);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if attempt < MAX_ATTEMPTS && is_busy(&err) => {
                tracing::debug!(attempt, "sqlite busy, retrying write");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn is_busy(err: &Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    matches!(db_err.code().as_deref(), Some("5") | Some("6"))
        || db_err.message().contains("database is locked")
}
