//! SQLite-backed partitioned execution queue.
//!
//! Each message is a row in `queue_messages`. Claiming a message leases it
//! for `lease_secs`; an acknowledged message is deleted, and a lease that
//! runs out makes the row visible again. That gives at-least-once delivery
//! across every process sharing the database file.

use std::time::Duration;

use agentflow_core::queue::{Delivery, ExecutionQueue, QueueError, partition_for};
use agentflow_types::config::QueueConfig;
use agentflow_types::message::WorkflowMessage;
use chrono::{SecondsFormat, Utc};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ExecutionQueue`.
pub struct SqliteExecutionQueue {
    pool: DatabasePool,
    topic: String,
    dead_letter_topic: String,
    partitions: u32,
    lease: Duration,
}

impl SqliteExecutionQueue {
    pub fn new(pool: DatabasePool, config: &QueueConfig) -> Self {
        Self {
            pool,
            topic: config.topic.clone(),
            dead_letter_topic: config.dead_letter_topic.clone(),
            partitions: config.partitions.max(1),
            lease: config.lease(),
        }
    }

    /// Messages waiting or in flight on this queue's topic.
    pub async fn depth(&self) -> Result<u64, QueueError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queue_messages WHERE topic = ?")
            .bind(&self.topic)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(storage_error)?;
        Ok(count.max(0) as u64)
    }

    /// Messages on the dead-letter topic, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<WorkflowMessage>, QueueError> {
        let rows = sqlx::query("SELECT payload FROM dead_letters WHERE topic = ? ORDER BY seq ASC")
            .bind(&self.dead_letter_topic)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(storage_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let payload: String = row.try_get("payload").map_err(storage_error)?;
            messages.push(serde_json::from_str(&payload)?);
        }
        Ok(messages)
    }

    async fn insert_dead_letter(&self, key: &str, payload: &str) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO dead_letters (topic, message_key, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.dead_letter_topic)
        .bind(key)
        .bind(payload)
        .bind(now_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    /// Move an undecodable row straight to the dead-letter table.
    async fn quarantine(&self, seq: i64, key: &str, payload: &str) -> Result<(), QueueError> {
        self.insert_dead_letter(key, payload).await?;
        sqlx::query("DELETE FROM queue_messages WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool.writer)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

fn storage_error(e: sqlx::Error) -> QueueError {
    QueueError::Storage(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ExecutionQueue for SqliteExecutionQueue {
    async fn enqueue(&self, message: &WorkflowMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_string(message)?;
        let partition = partition_for(&message.execution_id, self.partitions);

        sqlx::query(
            r#"INSERT INTO queue_messages (topic, partition, message_key, payload, enqueued_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&self.topic)
        .bind(i64::from(partition))
        .bind(message.key())
        .bind(&payload)
        .bind(now_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(storage_error)?;

        tracing::debug!(
            execution_id = %message.execution_id,
            topic = self.topic.as_str(),
            partition,
            "enqueued workflow message"
        );
        Ok(())
    }

    async fn dead_letter(&self, message: &WorkflowMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_string(message)?;
        self.insert_dead_letter(&message.key(), &payload).await?;
        tracing::warn!(
            execution_id = %message.execution_id,
            topic = self.dead_letter_topic.as_str(),
            "message dead-lettered"
        );
        Ok(())
    }

    async fn next_delivery(&self, partition: Option<u32>) -> Result<Option<Delivery>, QueueError> {
        let now = now_millis();
        let leased_until =
            now.saturating_add(i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX));
        let partition = partition.map(i64::from);

        let row = sqlx::query(
            r#"UPDATE queue_messages
               SET delivery_count = delivery_count + 1, leased_until = ?
               WHERE seq = (
                 SELECT seq FROM queue_messages
                 WHERE topic = ?
                   AND (? IS NULL OR partition = ?)
                   AND (leased_until IS NULL OR leased_until <= ?)
                 ORDER BY seq ASC
                 LIMIT 1
               )
               RETURNING seq, partition, message_key, delivery_count, payload"#,
        )
        .bind(leased_until)
        .bind(&self.topic)
        .bind(partition)
        .bind(partition)
        .bind(now)
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let seq: i64 = row.try_get("seq").map_err(storage_error)?;
        let claimed_partition: i64 = row.try_get("partition").map_err(storage_error)?;
        let key: String = row.try_get("message_key").map_err(storage_error)?;
        let delivery_count: i64 = row.try_get("delivery_count").map_err(storage_error)?;
        let payload: String = row.try_get("payload").map_err(storage_error)?;

        let message: WorkflowMessage = match serde_json::from_str(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(seq, key = key.as_str(), error = %e, "undecodable queue message, dead-lettering");
                self.quarantine(seq, &key, &payload).await?;
                return Err(e.into());
            }
        };

        Ok(Some(Delivery {
            receipt: seq.to_string(),
            partition: claimed_partition.max(0) as u32,
            delivery_count: delivery_count.max(0) as u32,
            message,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let seq: i64 = delivery
            .receipt
            .parse()
            .map_err(|_| QueueError::UnknownDelivery(delivery.receipt.clone()))?;

        let result = sqlx::query("DELETE FROM queue_messages WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool.writer)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::UnknownDelivery(delivery.receipt.clone()));
        }
        Ok(())
    }

    fn partitions(&self) -> u32 {
        self.partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_types::workflow::JsonMap;
    use serde_json::json;
    use uuid::Uuid;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("queue.db");
        std::mem::forget(dir);
        DatabasePool::open(&db_path).await.unwrap()
    }

    fn message() -> WorkflowMessage {
        let mut inputs = JsonMap::new();
        inputs.insert("n".to_string(), json!(1));
        WorkflowMessage::new(Uuid::now_v7(), Uuid::now_v7(), inputs)
    }

    fn config(lease_secs: u64) -> QueueConfig {
        QueueConfig {
            lease_secs,
            ..QueueConfig::default()
        }
    }

    #[tokio::test]
    async fn test_enqueue_claim_ack() {
        let queue = SqliteExecutionQueue::new(test_pool().await, &config(60));
        let msg = message();
        queue.enqueue(&msg).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);

        let delivery = queue.next_delivery(None).await.unwrap().unwrap();
        assert_eq!(delivery.message, msg);
        assert_eq!(delivery.delivery_count, 1);
        assert_eq!(delivery.partition, partition_for(&msg.execution_id, 3));

        // Leased: invisible to other claimers.
        assert!(queue.next_delivery(None).await.unwrap().is_none());

        queue.ack(&delivery).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 0);
        assert!(matches!(
            queue.ack(&delivery).await,
            Err(QueueError::UnknownDelivery(_))
        ));
    }

    #[tokio::test]
    async fn test_partition_filter() {
        let queue = SqliteExecutionQueue::new(test_pool().await, &config(60));
        let msg = message();
        let home = partition_for(&msg.execution_id, 3);
        queue.enqueue(&msg).await.unwrap();

        let other = (home + 1) % 3;
        assert!(queue.next_delivery(Some(other)).await.unwrap().is_none());
        let delivery = queue.next_delivery(Some(home)).await.unwrap().unwrap();
        assert_eq!(delivery.message.execution_id, msg.execution_id);
    }

    #[tokio::test]
    async fn test_publish_order_within_topic() {
        let queue = SqliteExecutionQueue::new(test_pool().await, &config(60));
        let first = message();
        let second = message();
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        let a = queue.next_delivery(None).await.unwrap().unwrap();
        let b = queue.next_delivery(None).await.unwrap().unwrap();
        assert_eq!(a.message.execution_id, first.execution_id);
        assert_eq!(b.message.execution_id, second.execution_id);
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let queue = SqliteExecutionQueue::new(test_pool().await, &config(0));
        queue.enqueue(&message()).await.unwrap();

        let first = queue.next_delivery(None).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = queue.next_delivery(None).await.unwrap().unwrap();
        assert_eq!(first.receipt, second.receipt);
        assert_eq!(second.delivery_count, 2);
    }

    #[tokio::test]
    async fn test_dead_letter_keeps_message_verbatim() {
        let queue = SqliteExecutionQueue::new(test_pool().await, &config(60));
        let msg = message();
        queue.dead_letter(&msg).await.unwrap();
        assert_eq!(queue.dead_letters().await.unwrap(), vec![msg]);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_quarantined() {
        let pool = test_pool().await;
        let queue = SqliteExecutionQueue::new(pool.clone(), &config(60));
        sqlx::query(
            "INSERT INTO queue_messages (topic, partition, message_key, payload, enqueued_at) VALUES (?, 0, 'k', 'not json', 'now')",
        )
        .bind(QueueConfig::default().topic)
        .execute(&pool.writer)
        .await
        .unwrap();

        assert!(matches!(
            queue.next_delivery(None).await,
            Err(QueueError::Serialization(_))
        ));
        assert_eq!(queue.depth().await.unwrap(), 0);
        let (dead,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dead_letters")
            .fetch_one(&pool.reader)
            .await
            .unwrap();
        assert_eq!(dead, 1);
    }
}
