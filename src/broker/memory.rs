//! In-memory broker
//!
//! Durable only for the lifetime of the process. Supports simulated outages
//! and consumer crashes so delivery guarantees can be tested.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{Broker, BrokerError, BrokerMessage, Delivery};

#[derive(Debug)]
struct StoredMessage {
    tag: i64,
    message: BrokerMessage,
    deliveries: u32,
    leased_until: Option<Instant>,
}

#[derive(Debug, Default)]
struct Queue {
    messages: VecDeque<StoredMessage>,
    next_tag: i64,
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashSet<String>,
    queues: HashMap<String, Queue>,
    /// exchange -> bound queues, in bind order
    bindings: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
    fail_publishes: AtomicBool,
    published: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker outage for publishes
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful publishes
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Messages currently held by `queue` (leased or not), in FIFO order
    pub async fn messages(&self, queue: &str) -> Vec<BrokerMessage> {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.messages.iter().map(|m| m.message.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn depth(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map(|q| q.messages.len()).unwrap_or(0)
    }

    /// Release every lease on `queue`, as when its consumer dies
    pub async fn recover(&self, queue: &str) {
        let mut state = self.state.lock().await;
        if let Some(q) = state.queues.get_mut(queue) {
            for m in q.messages.iter_mut() {
                m.leased_until = None;
            }
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.exchanges.insert(exchange.to_string());
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if !state.exchanges.contains(exchange) {
            return Err(BrokerError::UnknownExchange(exchange.to_string()));
        }
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }

        let bound = state.bindings.entry(exchange.to_string()).or_default();
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, message: &BrokerMessage) -> Result<usize, BrokerError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(
                "in-memory broker marked unavailable".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if !state.exchanges.contains(exchange) {
            return Err(BrokerError::UnknownExchange(exchange.to_string()));
        }

        let bound = state.bindings.get(exchange).cloned().unwrap_or_default();
        if bound.is_empty() {
            return Err(BrokerError::Unroutable {
                exchange: exchange.to_string(),
            });
        }

        for name in &bound {
            let queue = state
                .queues
                .get_mut(name)
                .ok_or_else(|| BrokerError::UnknownQueue(name.clone()))?;
            queue.next_tag += 1;
            let tag = queue.next_tag;
            queue.messages.push_back(StoredMessage {
                tag,
                message: message.clone(),
                deliveries: 0,
                leased_until: None,
            });
        }

        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(bound.len())
    }

    async fn fetch(
        &self,
        queue: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<Delivery>, BrokerError> {
        let mut state = self.state.lock().await;
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;

        let now = Instant::now();
        let mut leased = Vec::new();
        for m in q.messages.iter_mut() {
            if leased.len() >= max {
                break;
            }
            if matches!(m.leased_until, Some(until) if until > now) {
                continue;
            }
            m.deliveries += 1;
            m.leased_until = Some(now + visibility);
            leased.push(Delivery {
                delivery_tag: m.tag,
                message_id: m.message.message_id.clone(),
                payload: m.message.payload.clone(),
                redelivered: m.deliveries > 1,
            });
        }
        Ok(leased)
    }

    async fn ack(&self, queue: &str, delivery_tag: i64) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
        q.messages.retain(|m| m.tag != delivery_tag);
        Ok(())
    }

    async fn release(&self, queue: &str, delivery_tag: i64) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
        if let Some(m) = q.messages.iter_mut().find(|m| m.tag == delivery_tag) {
            m.leased_until = None;
        }
        Ok(())
    }
}
