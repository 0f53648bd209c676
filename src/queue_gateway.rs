//! Message-broker boundary.
//!
//! The core only depends on the [`QueueGateway`] contract: durable named
//! queues, at-least-once delivery, explicit ack/nack with optional requeue.
//! [`MemoryBroker`] is the in-process implementation the daemon ships with;
//! a real broker binding is an external implementation of the same trait.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tracing::debug;

use crate::error::{Result, TaskError};

pub type Headers = HashMap<String, String>;

/// Outcome sent back to the broker for one delivery.
enum Outcome {
    Ack,
    Nack { requeue: bool },
}

/// One inbound message. Must be explicitly acked or nacked; dropping the
/// delivery without either counts as no ack and the message is redelivered.
pub struct Delivery {
    pub body: String,
    pub headers: Headers,
    outcome: oneshot::Sender<Outcome>,
}

impl Delivery {
    pub fn ack(self) {
        let _ = self.outcome.send(Outcome::Ack);
    }

    pub fn nack(self, requeue: bool) {
        let _ = self.outcome.send(Outcome::Nack { requeue });
    }
}

/// Abstract publish/consume boundary against a message broker.
#[async_trait]
pub trait QueueGateway: Send + Sync {
    /// Publish a message onto the named queue, declaring it when missing.
    /// Returns `false` when the broker is reachable but refused the send;
    /// transport failures are errors.
    async fn publish(&self, queue: &str, message: &str, headers: Option<Headers>) -> Result<bool>;

    /// Subscribe to the named queue for the lifetime of the returned
    /// receiver. Each [`Delivery`] must be acked or nacked.
    async fn subscribe(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>>;
}

// ─── In-memory broker ────────────────────────────────────────────────────────

#[derive(Clone)]
struct StoredMessage {
    body: String,
    headers: Headers,
}

struct QueueState {
    pending: Mutex<VecDeque<StoredMessage>>,
    arrived: Notify,
}

impl QueueState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
        })
    }

    async fn push_back(&self, msg: StoredMessage) {
        self.pending.lock().await.push_back(msg);
        self.arrived.notify_waiters();
    }

    async fn push_front(&self, msg: StoredMessage) {
        self.pending.lock().await.push_front(msg);
        self.arrived.notify_waiters();
    }

    /// Wait until a message is available and take it.
    async fn pop(&self) -> StoredMessage {
        loop {
            let notified = self.arrived.notified();
            if let Some(msg) = self.pending.lock().await.pop_front() {
                return msg;
            }
            notified.await;
        }
    }
}

/// In-process durable-queue stand-in: messages survive until consumed and
/// acked, unacked deliveries are redelivered (at-least-once).
#[derive(Default)]
pub struct MemoryBroker {
    queues: DashMap<String, Arc<QueueState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<QueueState> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(QueueState::new)
            .clone()
    }
}

#[async_trait]
impl QueueGateway for MemoryBroker {
    async fn publish(&self, queue: &str, message: &str, headers: Option<Headers>) -> Result<bool> {
        if queue.trim().is_empty() {
            return Err(TaskError::Transport("queue name must not be empty".into()));
        }
        self.queue(queue)
            .push_back(StoredMessage {
                body: message.to_string(),
                headers: headers.unwrap_or_default(),
            })
            .await;
        debug!(queue, "message published");
        Ok(true)
    }

    async fn subscribe(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>> {
        if queue.trim().is_empty() {
            return Err(TaskError::Transport("queue name must not be empty".into()));
        }
        let state = self.queue(queue);
        // Prefetch of one: the pump hands over a single message and waits
        // for its outcome before taking the next.
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(pump(state, tx));
        Ok(rx)
    }
}

async fn pump(state: Arc<QueueState>, tx: mpsc::Sender<Delivery>) {
    loop {
        let msg = state.pop().await;
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let delivery = Delivery {
            body: msg.body.clone(),
            headers: msg.headers.clone(),
            outcome: outcome_tx,
        };
        if tx.send(delivery).await.is_err() {
            // Consumer gone; keep the message for the next subscriber.
            state.push_front(msg).await;
            return;
        }
        match outcome_rx.await {
            Ok(Outcome::Ack) => {}
            Ok(Outcome::Nack { requeue: false }) => {}
            // Nack-with-requeue, or the delivery was dropped unacked.
            Ok(Outcome::Nack { requeue: true }) | Err(_) => state.push_front(msg).await,
        }
    }
}
