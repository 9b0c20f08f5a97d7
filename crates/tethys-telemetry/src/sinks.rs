//! Pluggable event sinks.

use crate::events::StepEvent;

/// Trait for event consumers.
pub trait EventSink: Send {
    /// Process a single event.
    fn handle(&mut self, event: &StepEvent);

    /// Called at shutdown. Flush buffers, close files.
    fn finalize(&mut self) {}

    /// Human-readable sink name.
    fn name(&self) -> &str;
}

/// Collects events into a `Vec`, for tests and inspection.
#[derive(Default)]
pub struct CollectSink {
    pub events: Vec<StepEvent>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for CollectSink {
    fn handle(&mut self, event: &StepEvent) {
        self.events.push(event.clone());
    }

    fn name(&self) -> &str {
        "collect"
    }
}

/// Logs events through the `tracing` crate.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&mut self, event: &StepEvent) {
        tracing::info!(step = event.step, event = ?event.kind, "step_event");
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::events::EventKind;
    use crate::EventBus;

    /// Counts handled events through shared storage, so the count stays
    /// observable after the sink is boxed into a bus.
    struct CountingSink(Arc<AtomicUsize>);

    impl EventSink for CountingSink {
        fn handle(&mut self, _event: &StepEvent) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn bus_delivers_to_sinks_on_flush() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        bus.add_sink(Box::new(CountingSink(count.clone())));
        bus.emit(StepEvent::new(
            0,
            EventKind::StepBegin {
                step_size: 1e-3,
                sim_time: 0.0,
            },
        ));
        bus.emit(StepEvent::new(0, EventKind::StepEnd { wall_time: 0.01 }));
        assert_eq!(count.load(Ordering::Relaxed), 0); // nothing until flush
        bus.flush();
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn collect_sink_retains_events() {
        let mut sink = CollectSink::new();
        sink.handle(&StepEvent::new(7, EventKind::StepEnd { wall_time: 0.5 }));
        assert_eq!(sink.events.len(), 1);
        assert_eq!(sink.events[0].step, 7);
    }

    #[test]
    fn disabled_bus_drops_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        bus.add_sink(Box::new(CountingSink(count.clone())));

        bus.set_enabled(false);
        bus.emit(StepEvent::new(3, EventKind::StepEnd { wall_time: 0.0 }));
        bus.flush();
        assert_eq!(count.load(Ordering::Relaxed), 0, "disabled emit reached a sink");

        bus.set_enabled(true);
        bus.emit(StepEvent::new(4, EventKind::StepEnd { wall_time: 0.0 }));
        bus.flush();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
