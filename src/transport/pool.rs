//! Bounded pool of transport clients
//!
//! `acquire()` waits until one of `capacity` slots is free, hands out an idle
//! client (or creates one through the factory), and returns it wrapped in a
//! [`PooledClient`] guard. Dropping the guard puts the client back and frees
//! the slot, so release happens on every exit path including errors and
//! panics.

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{ReceiptStatus, Transport, TransportError, TransportResult};
use crate::tx_builder::SignedEnvelope;

/// Creates new clients when the pool has no idle one
pub trait ClientFactory<C>: Send + Sync {
    fn create(&self) -> TransportResult<C>;
}

impl<C, F> ClientFactory<C> for F
where
    F: Fn() -> TransportResult<C> + Send + Sync,
{
    fn create(&self) -> TransportResult<C> {
        (self)()
    }
}

struct PoolInner<C> {
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<C>>,
    factory: Box<dyn ClientFactory<C>>,
    capacity: usize,
    created: AtomicUsize,
}

pub struct ClientPool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for ClientPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Send + 'static> ClientPool<C> {
    pub fn new(capacity: usize, factory: impl ClientFactory<C> + 'static) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                idle: Mutex::new(Vec::with_capacity(capacity)),
                factory: Box::new(factory),
                capacity,
                created: AtomicUsize::new(0),
            }),
        }
    }

    /// Check out a client, waiting while all `capacity` slots are in use
    pub async fn acquire(&self) -> TransportResult<PooledClient<C>> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| TransportError::PoolClosed)?;

        let reused = self.inner.idle.lock().pop();
        let client = match reused {
            Some(client) => client,
            None => {
                let client = self.inner.factory.create()?;
                let created = self.inner.created.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(created, capacity = self.inner.capacity, "Created pooled client");
                client
            }
        };

        Ok(PooledClient {
            client: Some(client),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Clients created over the pool's lifetime
    pub fn created_count(&self) -> usize {
        self.inner.created.load(Ordering::Relaxed)
    }

    /// Fail all current and future `acquire` calls
    pub fn close(&self) {
        self.inner.semaphore.close();
    }
}

/// A checked-out client; returned to the pool on drop
pub struct PooledClient<C> {
    client: Option<C>,
    pool: Arc<PoolInner<C>>,
    _permit: OwnedSemaphorePermit,
}

impl<C> PooledClient<C> {
    /// Drop the client instead of returning it, e.g. after a broken connection
    pub fn discard(mut self) {
        self.client = None;
    }
}

impl<C> Deref for PooledClient<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `discard` and `drop` take the client, both consume the guard
        match &self.client {
            Some(client) => client,
            None => unreachable!("pooled client accessed after release"),
        }
    }
}

impl<C> Drop for PooledClient<C> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.idle.lock().push(client);
        }
    }
}

#[async_trait]
impl<C: Transport + 'static> Transport for ClientPool<C> {
    async fn get_sequence(&self, address: Address) -> TransportResult<u64> {
        let client = self.acquire().await?;
        client.get_sequence(address).await
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> TransportResult<TxHash> {
        let client = self.acquire().await?;
        client.submit(envelope).await
    }

    async fn submit_batch(&self, envelopes: &[SignedEnvelope]) -> Vec<TransportResult<TxHash>> {
        match self.acquire().await {
            Ok(client) => client.submit_batch(envelopes).await,
            Err(err) => envelopes.iter().map(|_| Err(err.clone())).collect(),
        }
    }

    async fn get_receipt(&self, hash: TxHash) -> TransportResult<ReceiptStatus> {
        let client = self.acquire().await?;
        client.get_receipt(hash).await
    }

    async fn get_balance(&self, address: Address) -> TransportResult<U256> {
        let client = self.acquire().await?;
        client.get_balance(address).await
    }
}
