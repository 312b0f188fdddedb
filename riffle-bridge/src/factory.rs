//! Bridge factory.

use std::fmt;
use std::sync::Arc;

use riffle_core::{Limits, Result};
use riffle_flow::{BoundedRecordQueue, KillSwitch, RecordQueue, RecordReceiver};

use crate::bridge::ConsumptionBridge;
use crate::config::BridgeConfig;
use crate::processor::{RecordProcessor, RecordProcessorFactory};
use crate::stats::StatsReporter;

/// Creates one `ConsumptionBridge` per leased shard.
///
/// Every bridge shares the factory's config, kill switch and stats, and
/// feeds its own handle of the same queue.
pub struct BridgeFactory {
    config: BridgeConfig,
    limits: Limits,
    queue: BoundedRecordQueue,
    kill_switch: KillSwitch,
    stats: Arc<dyn StatsReporter>,
}

impl BridgeFactory {
    /// Creates a factory and the consumer side of its queue.
    ///
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn new(
        config: BridgeConfig,
        kill_switch: KillSwitch,
        stats: Arc<dyn StatsReporter>,
    ) -> Result<(Self, RecordReceiver)> {
        let limits = Limits::default();
        config.validate(&limits)?;

        let (queue, receiver) = BoundedRecordQueue::new(config.queue, kill_switch.termination());
        let factory = Self {
            config,
            limits,
            queue,
            kill_switch,
            stats,
        };
        Ok((factory, receiver))
    }

    /// Returns the queue shared by all bridges, for stats.
    #[must_use]
    pub const fn queue(&self) -> &BoundedRecordQueue {
        &self.queue
    }

    /// Stops creating queue handles.
    ///
    /// The receiver ends once this is called and every bridge has shut down.
    pub fn close(&self) {
        self.queue.complete();
    }
}

impl RecordProcessorFactory for BridgeFactory {
    fn create_processor(&self) -> Box<dyn RecordProcessor> {
        Box::new(
            ConsumptionBridge::new(
                self.config.clone(),
                Box::new(self.queue.handle()),
                self.kill_switch.clone(),
                Arc::clone(&self.stats),
            )
            .with_limits(self.limits),
        )
    }
}

impl fmt::Debug for BridgeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeFactory")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("pipeline", &self.kill_switch.status())
            .finish_non_exhaustive()
    }
}
