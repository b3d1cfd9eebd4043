use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::destination::Destination;
use crate::error::EtlResult;
use crate::types::ChangeEvent;

#[derive(Debug, Default)]
struct Inner {
    writes: Vec<Vec<ChangeEvent>>,
}

/// A [`Destination`] recording every write in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event written so far, in order.
    pub async fn events(&self) -> Vec<ChangeEvent> {
        let inner = self.inner.lock().await;
        inner.writes.iter().flatten().cloned().collect()
    }

    /// Returns the events of each write call separately.
    pub async fn writes(&self) -> Vec<Vec<ChangeEvent>> {
        self.inner.lock().await.writes.clone()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.writes.clear();
    }
}

impl Destination for MemoryDestination {
    async fn write_events(&self, events: Vec<ChangeEvent>) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        debug!("writing a batch of {} events", events.len());
        inner.writes.push(events);

        Ok(())
    }
}
