use std::collections::BTreeMap;

use vc_core::frame::FeatureFrame;

use crate::features::BlockAnalyzer;

/// Identifies one registered consumer. Removal is by identity: invoking
/// `unsubscribe` with this handle removes exactly the consumer it was
/// issued for, regardless of how many others subscribed or unsubscribed in
/// between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
}

type FrameConsumer = Box<dyn FnMut(&FeatureFrame) + Send>;

/// Fans feature frames out to any number of independent consumers.
///
/// The underlying block analyzer exists only while a source is bound AND at
/// least one consumer is subscribed; it is dropped as soon as either side
/// goes away. Rebinding the source rebuilds the analyzer and discards the
/// partial block, so at most one frame is skipped at the boundary, a
/// known limitation rather than a defect.
///
/// Fan-out is synchronous: every consumer sees every frame, in
/// subscription order, on the caller's thread. A slow consumer delays its
/// peers for that frame but never affects block cadence, which is set by
/// how fast audible samples arrive.
pub struct FeatureBroker {
    block_size: usize,
    source_rate: Option<u32>,
    analyzer: Option<BlockAnalyzer>,
    consumers: BTreeMap<u64, FrameConsumer>,
    next_id: u64,
    /// Partial block awaiting completion.
    pending: Vec<f32>,
}

impl FeatureBroker {
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            source_rate: None,
            analyzer: None,
            consumers: BTreeMap::new(),
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Register a feature-frame consumer.
    pub fn subscribe(
        &mut self,
        consumer: impl FnMut(&FeatureFrame) + Send + 'static,
    ) -> SubscriptionHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.consumers.insert(id, Box::new(consumer));
        self.refresh_analyzer();
        SubscriptionHandle { id }
    }

    /// Remove the consumer the handle was issued for. Unknown or already
    /// removed handles are ignored.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.consumers.remove(&handle.id);
        self.refresh_analyzer();
    }

    /// Bind the audible source the analyzer reads from.
    ///
    /// Re-binding with the same rate while an analyzer is live is a no-op,
    /// so per-node changes inside one session do not drop frames.
    pub fn bind_source(&mut self, sample_rate: u32) {
        self.source_rate = Some(sample_rate);
        self.refresh_analyzer();
    }

    /// Forget the audible source. The analyzer is torn down; the broker
    /// goes inactive until a source is bound again.
    pub fn clear_source(&mut self) {
        self.source_rate = None;
        self.refresh_analyzer();
    }

    /// `true` while an analyzer is live and frames can be produced.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Number of registered consumers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.consumers.len()
    }

    /// Feed audible samples; emits one frame per completed block.
    ///
    /// With no analyzer (no source, or no consumers) this is a silent
    /// no-op: an inactive broker, not an error.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let Self {
            analyzer: Some(analyzer),
            consumers,
            pending,
            block_size,
            ..
        } = self
        else {
            return;
        };

        pending.extend_from_slice(samples);
        let mut offset = 0;
        while pending.len() - offset >= *block_size {
            let frame = analyzer.analyze(&pending[offset..offset + *block_size]);
            offset += *block_size;
            for consumer in consumers.values_mut() {
                consumer(&frame);
            }
        }
        pending.drain(..offset);
    }

    /// Enforce the lifecycle rule: the analyzer is alive iff a source is
    /// bound and at least one consumer exists. An analyzer already built
    /// for the current rate is kept as-is; consumers coming and going
    /// never re-instantiate it.
    fn refresh_analyzer(&mut self) {
        match self.source_rate.filter(|_| !self.consumers.is_empty()) {
            None => {
                if self.analyzer.is_some() {
                    self.analyzer = None;
                    self.pending.clear();
                }
            }
            Some(rate) => {
                let stale = self
                    .analyzer
                    .as_ref()
                    .is_none_or(|a| a.sample_rate() != rate);
                if stale {
                    self.pending.clear();
                    self.analyzer = Some(BlockAnalyzer::new(self.block_size, rate));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BLOCK: usize = 512;

    fn tone(n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44_100.0).sin())
            .collect()
    }

    fn counter_consumer(counter: &Arc<AtomicUsize>) -> impl FnMut(&FeatureFrame) + Send + 'static {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn inactive_without_source_or_consumers() {
        let mut broker = FeatureBroker::new(BLOCK);
        assert!(!broker.is_active());

        // Source but no consumers: still inactive.
        broker.bind_source(44_100);
        assert!(!broker.is_active());

        // Pushing into an inactive broker is a silent no-op.
        broker.push_samples(&tone(BLOCK * 2));

        // First consumer brings the analyzer up.
        let counted = Arc::new(AtomicUsize::new(0));
        let handle = broker.subscribe(counter_consumer(&counted));
        assert!(broker.is_active());

        // Last consumer leaving tears it down.
        broker.unsubscribe(handle);
        assert!(!broker.is_active());

        // Source going away also tears it down.
        let _handle = broker.subscribe(counter_consumer(&counted));
        assert!(broker.is_active());
        broker.clear_source();
        assert!(!broker.is_active());
    }

    #[test]
    fn every_consumer_sees_every_frame_in_order() {
        let mut broker = FeatureBroker::new(BLOCK);
        broker.bind_source(44_100);

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let _first_handle = broker.subscribe(counter_consumer(&first));
        let second_handle = broker.subscribe(counter_consumer(&second));

        // Three complete blocks plus a partial one.
        broker.push_samples(&tone(BLOCK * 3 + 100));
        assert_eq!(first.load(Ordering::Relaxed), 3);
        assert_eq!(second.load(Ordering::Relaxed), 3);

        // Unsubscribe one mid-stream: the survivor keeps receiving, the
        // removed consumer receives nothing further.
        broker.unsubscribe(second_handle);
        broker.push_samples(&tone(BLOCK * 2));
        assert_eq!(first.load(Ordering::Relaxed), 5);
        assert_eq!(second.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn partial_blocks_accumulate_across_pushes() {
        let mut broker = FeatureBroker::new(BLOCK);
        broker.bind_source(44_100);
        let counted = Arc::new(AtomicUsize::new(0));
        let _handle = broker.subscribe(counter_consumer(&counted));

        broker.push_samples(&tone(BLOCK / 2));
        assert_eq!(counted.load(Ordering::Relaxed), 0);
        broker.push_samples(&tone(BLOCK / 2));
        assert_eq!(counted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn rebind_discards_only_the_partial_block() {
        let mut broker = FeatureBroker::new(BLOCK);
        broker.bind_source(44_100);
        let counted = Arc::new(AtomicUsize::new(0));
        let _handle = broker.subscribe(counter_consumer(&counted));

        broker.push_samples(&tone(BLOCK / 2));
        // New source: the straddling half-block is dropped with it.
        broker.bind_source(48_000);
        broker.push_samples(&tone(BLOCK / 2));
        assert_eq!(counted.load(Ordering::Relaxed), 0);

        // Same-rate rebind while live is a no-op and keeps the partial.
        broker.bind_source(48_000);
        broker.push_samples(&tone(BLOCK / 2));
        assert_eq!(counted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn new_subscribers_do_not_reinstantiate_the_analyzer() {
        let mut broker = FeatureBroker::new(BLOCK);
        broker.bind_source(44_100);
        let first = Arc::new(AtomicUsize::new(0));
        let _first_handle = broker.subscribe(counter_consumer(&first));

        // Half a block in flight, then a second consumer arrives.
        broker.push_samples(&tone(BLOCK / 2));
        let second = Arc::new(AtomicUsize::new(0));
        let _second_handle = broker.subscribe(counter_consumer(&second));

        // The in-flight partial survived the subscription.
        broker.push_samples(&tone(BLOCK / 2));
        assert_eq!(first.load(Ordering::Relaxed), 1);
        assert_eq!(second.load(Ordering::Relaxed), 1);
    }
}
