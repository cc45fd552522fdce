use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::CreditRequest;

/// Durable record store for credit requests, keyed by numeric id.
#[async_trait]
pub trait CreditRequestStore: Send + Sync {
    async fn load(&self, id: i64) -> Result<Option<CreditRequest>, AppError>;

    /// Inserts or updates the request and returns its id. A new request gets
    /// its id assigned in place.
    async fn save(&self, cr: &mut CreditRequest) -> Result<i64, AppError>;
}

/// Stores each request as one JSONB document, with the status mirrored into
/// its own column for querying.
#[derive(Clone)]
pub struct PgCreditRequestStore {
    pool: PgPool,
}

impl PgCreditRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditRequestStore for PgCreditRequestStore {
    async fn load(&self, id: i64) -> Result<Option<CreditRequest>, AppError> {
        let row = sqlx::query_as::<_, (Json<CreditRequest>,)>(
            "SELECT document FROM credit_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(|(Json(mut cr),)| {
            cr.assign_id(id);
            cr
        }))
    }

    async fn save(&self, cr: &mut CreditRequest) -> Result<i64, AppError> {
        match cr.id() {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE credit_requests
                    SET status = $2,
                        document = $3,
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(cr.status().as_str())
                .bind(Json(&*cr))
                .execute(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;

                tracing::debug!("Credit request {} updated", id);
                Ok(id)
            }
            None => {
                let (id,): (i64,) = sqlx::query_as(
                    r#"
                    INSERT INTO credit_requests (status, document)
                    VALUES ($1, $2)
                    RETURNING id
                    "#,
                )
                .bind(cr.status().as_str())
                .bind(Json(&*cr))
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;

                cr.assign_id(id);
                sqlx::query("UPDATE credit_requests SET document = $2 WHERE id = $1")
                    .bind(id)
                    .bind(Json(&*cr))
                    .execute(&self.pool)
                    .await
                    .map_err(AppError::DatabaseError)?;

                tracing::info!("Credit request {} created", id);
                Ok(id)
            }
        }
    }
}

/// In-process store for tests and local runs.
#[derive(Default)]
pub struct InMemoryCreditRequestStore {
    records: RwLock<HashMap<i64, CreditRequest>>,
}

impl InMemoryCreditRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CreditRequestStore for InMemoryCreditRequestStore {
    async fn load(&self, id: i64) -> Result<Option<CreditRequest>, AppError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn save(&self, cr: &mut CreditRequest) -> Result<i64, AppError> {
        let mut records = self.records.write().await;
        let id = match cr.id() {
            Some(id) => id,
            None => {
                let id = records.keys().max().copied().unwrap_or(0) + 1;
                cr.assign_id(id);
                id
            }
        };
        records.insert(id, cr.clone());
        Ok(id)
    }
}
