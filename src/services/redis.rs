//! Redis-backed notification work queue
//!
//! Jobs are JSON payloads on `<prefix>:pending`. The worker atomically moves a payload
//! to `<prefix>:processing` while it is being delivered and removes it afterwards, so
//! a crash mid-delivery leaves the job recoverable instead of lost.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};

use crate::{
    error::{AppError, AppResult},
    services::notifications::{NotificationJob, NotificationQueue},
};

/// A payload taken off the pending list; `job` is `None` when it does not parse
#[derive(Debug, Clone)]
pub struct ReservedJob {
    pub payload: String,
    pub job: Option<NotificationJob>,
}

#[derive(Clone)]
pub struct RedisNotificationQueue {
    client: Client,
    pending_key: String,
    processing_key: String,
}

impl RedisNotificationQueue {
    /// Create a queue handle without connecting
    pub fn open(url: &str, prefix: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self {
            client,
            pending_key: format!("{}:pending", prefix),
            processing_key: format!("{}:processing", prefix),
        })
    }

    /// Create a new queue and check that Redis answers
    pub async fn new(url: &str, prefix: &str) -> AppResult<Self> {
        let queue = Self::open(url, prefix)?;

        // Test connection
        let mut conn = queue.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(queue)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    /// Wait up to `timeout` for the next job and move it to the processing list
    pub async fn reserve(&self, timeout: Duration) -> AppResult<Option<ReservedJob>> {
        let mut conn = self.connection().await?;

        let payload: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.pending_key)
            .arg(&self.processing_key)
            .arg(timeout.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reserve notification: {}", e)))?;

        Ok(payload.map(|payload| ReservedJob {
            job: serde_json::from_str(&payload).ok(),
            payload,
        }))
    }

    /// Remove a delivered (or abandoned) payload from the processing list
    pub async fn ack(&self, payload: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, payload)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to acknowledge notification: {}", e)))
    }

    /// Move every payload left in processing by a previous worker back to pending
    pub async fn recover_in_flight(&self) -> AppResult<usize> {
        let mut conn = self.connection().await?;
        let mut recovered = 0;
        loop {
            let moved: Option<String> = conn
                .rpoplpush(&self.processing_key, &self.pending_key)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to recover notifications: {}", e)))?;
            if moved.is_none() {
                return Ok(recovered);
            }
            recovered += 1;
        }
    }

    /// Number of jobs waiting for delivery
    pub async fn pending_len(&self) -> AppResult<usize> {
        let mut conn = self.connection().await?;
        conn.llen(&self.pending_key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read queue length: {}", e)))
    }
}

#[async_trait]
impl NotificationQueue for RedisNotificationQueue {
    async fn enqueue(&self, job: NotificationJob) -> AppResult<()> {
        let payload = serde_json::to_string(&job)
            .map_err(|e| AppError::Internal(format!("Failed to serialize notification: {}", e)))?;

        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(&self.pending_key, payload)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to enqueue notification: {}", e)))?;

        tracing::debug!(job_id = %job.id, kind = ?job.kind, loan_id = job.loan_id, "Notification queued");
        Ok(())
    }
}
