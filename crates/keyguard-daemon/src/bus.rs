//! Event bus and dispatcher
//!
//! Producers (IPC connections, process watchers, timers, the settings store)
//! publish [`Event`]s on an unbounded channel. The [`Dispatcher`] drains it
//! one event at a time, so every orchestrator handler runs to completion
//! before the next one starts.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::error::{DaemonError, Result};
use crate::event::Event;
use crate::orchestrator::Orchestrator;

/// Publishing side of the event bus
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventBus {
    /// Create a bus and the receiver the dispatcher drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish an event
    pub fn publish(&self, event: Event) -> Result<()> {
        self.tx.send(event).map_err(|_| DaemonError::BusClosed)
    }
}

/// Serializes events into the orchestrator
pub struct Dispatcher {
    orchestrator: Orchestrator,
    events: mpsc::UnboundedReceiver<Event>,
}

impl Dispatcher {
    pub fn new(orchestrator: Orchestrator, events: mpsc::UnboundedReceiver<Event>) -> Self {
        Self {
            orchestrator,
            events,
        }
    }

    /// Dispatch until shutdown is signalled or every publisher is gone
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Orchestrator {
        info!("Dispatcher started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Dispatcher received shutdown");
                        break;
                    }
                }
                event = self.events.recv() => match event {
                    Some(event) => self.orchestrator.handle(event),
                    None => {
                        debug!("Event bus closed");
                        break;
                    }
                },
            }
        }

        self.orchestrator.shutdown();
        info!("Dispatcher stopped");
        self.orchestrator
    }
}
