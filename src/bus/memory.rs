//! In-process bus
//!
//! Clones of a `MemoryBus` share one broadcast channel, so several hubs in
//! the same process behave like separate nodes on a shared bus. Every
//! subscriber, including the publisher's own link, receives each envelope.
//! `set_available(false)` simulates an outage: open links fail and new
//! connects are refused until the bus is made available again.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::warn;

use super::{Bus, BusLink, BusSink, BusSource};
use crate::envelope::Envelope;
use crate::utils::{HubError, Result, flag_reaches};

#[derive(Debug, Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    channel: broadcast::Sender<Arc<Envelope>>,
    available: watch::Sender<bool>,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity.max(1));
        let (available, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner { channel, available }),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.inner.available.send_replace(available);
    }

    pub fn is_available(&self) -> bool {
        *self.inner.available.borrow()
    }

    /// Number of links currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.channel.receiver_count()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn connect(&self) -> Result<BusLink> {
        if !self.is_available() {
            return Err(HubError::BusUnavailable("memory bus is down".to_string()));
        }
        Ok(BusLink {
            sink: Box::new(MemorySink {
                channel: self.inner.channel.clone(),
                available: self.inner.available.subscribe(),
            }),
            source: Box::new(MemorySource {
                channel: self.inner.channel.subscribe(),
                available: self.inner.available.subscribe(),
            }),
        })
    }
}

struct MemorySink {
    channel: broadcast::Sender<Arc<Envelope>>,
    available: watch::Receiver<bool>,
}

#[async_trait]
impl BusSink for MemorySink {
    async fn publish(&mut self, envelope: &Envelope) -> Result<()> {
        if !*self.available.borrow() {
            return Err(HubError::BusUnavailable("memory bus is down".to_string()));
        }
        // No subscribers is not an error for a pub/sub bus.
        let _ = self.channel.send(Arc::new(envelope.clone()));
        Ok(())
    }
}

struct MemorySource {
    channel: broadcast::Receiver<Arc<Envelope>>,
    available: watch::Receiver<bool>,
}

#[async_trait]
impl BusSource for MemorySource {
    async fn next(&mut self) -> Result<Envelope> {
        loop {
            tokio::select! {
                _ = flag_reaches(&mut self.available, false) => {
                    return Err(HubError::BusUnavailable("memory bus went down".to_string()));
                }
                received = self.channel.recv() => match received {
                    Ok(envelope) => return Ok((*envelope).clone()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "memory bus subscriber lagged, envelopes lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(HubError::BusUnavailable("memory bus closed".to_string()));
                    }
                },
            }
        }
    }
}
