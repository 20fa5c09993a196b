//! PostgreSQL broker
//!
//! Exchanges, queues and bindings are rows; each queued message is one row
//! per bound queue, ordered by a sequence. A publish is a single transaction,
//! so a message lands on every bound queue or on none.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use super::{Broker, BrokerError, BrokerMessage, Delivery};

#[derive(Debug, Clone)]
pub struct PgBroker {
    pool: PgPool,
}

impl PgBroker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exchange_exists(&self, exchange: &str) -> Result<bool, BrokerError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM broker_exchanges WHERE name = $1)")
                .bind(exchange)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn queue_exists(&self, queue: &str) -> Result<bool, BrokerError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM broker_queues WHERE name = $1)")
                .bind(queue)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

#[async_trait]
impl Broker for PgBroker {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError> {
        sqlx::query(
            r#"
            INSERT INTO broker_exchanges (name, kind)
            VALUES ($1, 'fanout')
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(exchange)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        sqlx::query("INSERT INTO broker_queues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(queue)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BrokerError> {
        if !self.exchange_exists(exchange).await? {
            return Err(BrokerError::UnknownExchange(exchange.to_string()));
        }
        if !self.queue_exists(queue).await? {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO broker_bindings (exchange, queue)
            VALUES ($1, $2)
            ON CONFLICT (exchange, queue) DO NOTHING
            "#,
        )
        .bind(exchange)
        .bind(queue)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn publish(&self, exchange: &str, message: &BrokerMessage) -> Result<usize, BrokerError> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM broker_exchanges WHERE name = $1)")
                .bind(exchange)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(BrokerError::UnknownExchange(exchange.to_string()));
        }

        let enqueued = sqlx::query(
            r#"
            INSERT INTO broker_messages (queue, message_id, payload)
            SELECT queue, $2, $3
            FROM broker_bindings
            WHERE exchange = $1
            ORDER BY queue
            "#,
        )
        .bind(exchange)
        .bind(&message.message_id)
        .bind(&message.payload)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if enqueued == 0 {
            tx.rollback().await?;
            return Err(BrokerError::Unroutable {
                exchange: exchange.to_string(),
            });
        }

        tx.commit().await?;

        Ok(enqueued as usize)
    }

    async fn fetch(
        &self,
        queue: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<Delivery>, BrokerError> {
        let rows: Vec<(i64, String, serde_json::Value, i32)> = sqlx::query_as(
            r#"
            UPDATE broker_messages m
            SET delivery_count = m.delivery_count + 1,
                visible_at = NOW() + make_interval(secs => $3)
            FROM (
                SELECT seq
                FROM broker_messages
                WHERE queue = $1 AND visible_at <= NOW()
                ORDER BY seq
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            ) picked
            WHERE m.seq = picked.seq
            RETURNING m.seq, m.message_id, m.payload, m.delivery_count
            "#,
        )
        .bind(queue)
        .bind(max as i64)
        .bind(visibility.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        let mut deliveries: Vec<Delivery> = rows
            .into_iter()
            .map(|(seq, message_id, payload, delivery_count)| Delivery {
                delivery_tag: seq,
                message_id,
                payload,
                redelivered: delivery_count > 1,
            })
            .collect();
        // RETURNING does not preserve the subquery order
        deliveries.sort_by_key(|d| d.delivery_tag);

        Ok(deliveries)
    }

    async fn ack(&self, queue: &str, delivery_tag: i64) -> Result<(), BrokerError> {
        sqlx::query("DELETE FROM broker_messages WHERE queue = $1 AND seq = $2")
            .bind(queue)
            .bind(delivery_tag)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn release(&self, queue: &str, delivery_tag: i64) -> Result<(), BrokerError> {
        sqlx::query("UPDATE broker_messages SET visible_at = NOW() WHERE queue = $1 AND seq = $2")
            .bind(queue)
            .bind(delivery_tag)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
