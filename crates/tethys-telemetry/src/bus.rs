//! Event bus — buffered event dispatch with pluggable sinks.
//!
//! Events go through an `mpsc` channel so emission never blocks on sink
//! work; the integrator flushes once per step, outside the hot loop.

use std::sync::mpsc;

use crate::events::StepEvent;
use crate::sinks::EventSink;

/// Buffered event bus for integration telemetry.
pub struct EventBus {
    sender: mpsc::Sender<StepEvent>,
    receiver: mpsc::Receiver<StepEvent>,
    sinks: Vec<Box<dyn EventSink>>,
    /// A disabled bus drops events silently.
    enabled: bool,
}

impl EventBus {
    /// Creates a new event bus with no sinks.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            sinks: Vec::new(),
            enabled: true,
        }
    }

    /// Registers a sink to receive events.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Enables or disables the bus.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns true if the bus is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit an event. No-op when disabled; never blocks.
    pub fn emit(&self, event: StepEvent) {
        if !self.enabled {
            return;
        }
        let _ = self.sender.send(event);
    }

    /// Drain pending events into every registered sink. Called at step
    /// boundaries and at shutdown.
    pub fn flush(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            for sink in &mut self.sinks {
                sink.handle(&event);
            }
        }
    }

    /// Flush remaining events and finalize every sink.
    pub fn shutdown(&mut self) {
        self.flush();
        for sink in &mut self.sinks {
            sink.finalize();
        }
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
