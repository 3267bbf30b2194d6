// db/db.rs
use futures::future::BoxFuture;
use sqlx::{Pool, Postgres, Transaction};

use crate::service::error::ServiceError;

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .finish()
    }
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }

    /// Run `op` inside one atomic unit of work.
    ///
    /// Commits when `op` returns `Ok`, rolls back when it returns `Err`.
    /// If `op` panics, the transaction guard is dropped mid-unwind and the
    /// store rolls the unit back, so no exit path can leak partial effects.
    ///
    /// The closure must capture owned (`'static`) state; clone the
    /// `Arc<DBClient>` and move ids/payloads in.
    pub async fn with_tx<T, F>(&self, op: F) -> Result<T, ServiceError>
    where
        F: for<'t> FnOnce(
            &'t mut Transaction<'static, Postgres>,
        ) -> BoxFuture<'t, Result<T, ServiceError>>,
    {
        let mut tx = self.pool.begin().await?;
        match op(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }
}
