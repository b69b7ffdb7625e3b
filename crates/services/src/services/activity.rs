use db::{
    DBService,
    models::activity::{
        Activity, ActivityContext, ActivityError, ActivityFilter, ActivityPage, NewActivity,
    },
};

/// Observational audit trail. Appends run on detached tasks and never
/// block or fail the operation they observe.
#[derive(Clone)]
pub struct ActivityService {
    db: DBService,
}

impl ActivityService {
    pub fn new(db: DBService) -> Self {
        Self { db }
    }

    /// Fire-and-forget append. Failures are logged and absorbed.
    pub fn record(&self, entry: NewActivity, context: ActivityContext) {
        let pool = self.db.pool.clone();
        tokio::spawn(async move {
            if let Err(err) = Activity::insert(&pool, &entry, &context).await {
                tracing::warn!(
                    activity_type = %entry.activity_type,
                    actor = %entry.actor,
                    error = %err,
                    "failed to append activity record"
                );
            }
        });
    }

    pub async fn query(
        &self,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> Result<ActivityPage, ActivityError> {
        Activity::query(&self.db.pool, filter, limit, offset).await
    }

    pub async fn notifications_for(
        &self,
        email: &str,
        limit: i64,
    ) -> Result<Vec<Activity>, ActivityError> {
        Activity::member_added_for(&self.db.pool, email, limit).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use db::models::activity::ActivityType;

    use super::*;

    async fn service() -> ActivityService {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("../db/migrations").run(&pool).await.unwrap();
        ActivityService::new(DBService { pool })
    }

    fn login_entry() -> NewActivity {
        NewActivity {
            activity_type: ActivityType::Login,
            actor: "a@x.com".to_string(),
            description: "User logged in".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn record_appends_without_blocking_the_caller() {
        let service = service().await;
        service.record(login_entry(), ActivityContext::default());

        // The append races this query; poll briefly.
        let mut total = 0;
        for _ in 0..50 {
            total = service
                .query(&ActivityFilter::default(), 10, 0)
                .await
                .unwrap()
                .total_count;
            if total > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn record_on_a_dead_pool_is_swallowed() {
        let service = service().await;
        service.db.pool.close().await;

        // Must not panic or surface an error to the caller.
        service.record(login_entry(), ActivityContext::default());
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
