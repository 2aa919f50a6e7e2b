//! Tokio-backed alarm scheduler

use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use keyguard_core::Alarm;

use crate::adapters::AlarmScheduler;
use crate::bus::EventBus;
use crate::event::Event;

/// Schedules each alarm as a sleeping task that publishes `AlarmFired`
pub struct TokioAlarmScheduler {
    bus: EventBus,
    runtime: Handle,
    tasks: HashMap<Alarm, JoinHandle<()>>,
}

impl TokioAlarmScheduler {
    /// Spawn alarm tasks on `runtime`
    pub fn new(bus: EventBus, runtime: Handle) -> Self {
        Self {
            bus,
            runtime,
            tasks: HashMap::new(),
        }
    }

    /// Alarms whose task has not finished yet
    fn outstanding(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn schedule(&mut self, alarm: Alarm, after: Duration) {
        // Forget tasks that already fired
        self.tasks.retain(|_, task| !task.is_finished());

        let bus = self.bus.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Err(e) = bus.publish(Event::AlarmFired(alarm)) {
                warn!("Dropping {:?} alarm: {}", alarm.kind, e);
            }
        });

        self.tasks.insert(alarm, task);
        debug!(
            "Scheduled {:?} alarm (generation {}) in {:?}, {} outstanding",
            alarm.kind,
            alarm.generation,
            after,
            self.outstanding()
        );
    }

    fn cancel(&mut self, alarm: Alarm) {
        if let Some(task) = self.tasks.remove(&alarm) {
            task.abort();
        }
    }
}

impl Drop for TokioAlarmScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
