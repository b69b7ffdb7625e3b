use std::{str::FromStr, time::Duration};

use sqlx::{
    Error, Pool, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous},
};
use utils::assets::asset_dir;

pub mod models;
mod retry;

pub(crate) use retry::retry_on_sqlite_busy;

#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
}

impl DBService {
    pub async fn new() -> Result<DBService, Error> {
        let database_url = format!(
            "sqlite://{}",
            asset_dir().join("db.sqlite").to_string_lossy()
        );
        let options = SqliteConnectOptions::from_str(&database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(DBService { pool })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{path::PathBuf, str::FromStr, time::Duration};

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use uuid::Uuid;

    /// Temp-file SQLite database with migrations applied. The file (and its
    /// WAL sidecars) is removed when the guard drops.
    pub struct TestDb {
        pub pool: sqlx::SqlitePool,
        path: PathBuf,
    }

    impl TestDb {
        pub async fn new() -> Self {
            let path = std::env::temp_dir().join(format!("strive-test-{}.db", Uuid::new_v4()));
            let options =
                SqliteConnectOptions::from_str(&format!("sqlite://{}", path.to_string_lossy()))
                    .unwrap()
                    .create_if_missing(true)
                    .busy_timeout(Duration::from_secs(5));
            let pool = SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await
                .unwrap();
            sqlx::migrate!("./migrations").run(&pool).await.unwrap();
            Self { pool, path }
        }
    }

    impl Drop for TestDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
            let _ = std::fs::remove_file(self.path.with_extension("db-wal"));
            let _ = std::fs::remove_file(self.path.with_extension("db-shm"));
        }
    }
}
