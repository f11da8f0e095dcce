//! The frame pipeline: codec followed by dispatcher.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::codec::EventCodec;
use crate::dispatcher::Dispatcher;
use crate::event::Event;
use crate::supervisor::FrameSink;

/// Decodes frames and dispatches the resulting events.
#[derive(Debug, Clone)]
pub struct EventPipeline {
    codec: EventCodec,
    dispatcher: Dispatcher,
}

impl EventPipeline {
    /// Creates a pipeline.
    pub fn new(codec: EventCodec, dispatcher: Dispatcher) -> Self {
        Self { codec, dispatcher }
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

#[async_trait]
impl FrameSink for EventPipeline {
    async fn on_frame(&self, frame: String) {
        let event = self.codec.decode(&frame);
        match &event {
            Event::Heartbeat => debug!("Heartbeat"),
            Event::Lifecycle { sub_type } => info!(sub_type = %sub_type, "Lifecycle event"),
            _ => {}
        }
        self.dispatcher.dispatch(&event).await;
    }
}
