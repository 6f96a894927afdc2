use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::reconciler::{send_chat_message, ChatEvent, ChatEventSink, SendRequest};
use super::state::DispatchedEvent;
use crate::api::ChatTransport;

/// Forwards reconciler events into the UI channel, tagged with a generation.
struct GenerationSink {
    generation: u64,
    tx: flume::Sender<DispatchedEvent>,
}

impl ChatEventSink for GenerationSink {
    fn emit(&self, event: ChatEvent) {
        let dispatched = DispatchedEvent {
            generation: self.generation,
            event,
        };
        if self.tx.send(dispatched).is_err() {
            tracing::debug!("Chat event channel closed (generation {})", self.generation);
        }
    }
}

/// Runs one send at a time on the tokio runtime.
///
/// A new send aborts the one in flight; events of the aborted send that were
/// already queued carry the older generation and are dropped by the fold.
pub struct ChatDispatcher {
    runtime: Handle,
    transport: Arc<dyn ChatTransport>,
    events_tx: flume::Sender<DispatchedEvent>,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl ChatDispatcher {
    pub fn new(
        runtime: Handle,
        transport: Arc<dyn ChatTransport>,
    ) -> (Self, flume::Receiver<DispatchedEvent>) {
        let (events_tx, events_rx) = flume::unbounded();
        let dispatcher = Self {
            runtime,
            transport,
            events_tx,
            generation: 0,
            in_flight: None,
        };
        (dispatcher, events_rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation the next `send` or `cancel` will hand out.
    pub fn next_generation(&self) -> u64 {
        self.generation + 1
    }

    pub fn set_transport(&mut self, transport: Arc<dyn ChatTransport>) {
        self.transport = transport;
    }

    /// Start a send and return its generation.
    pub fn send(&mut self, request: SendRequest) -> u64 {
        let generation = self.cancel();

        let transport = Arc::clone(&self.transport);
        let sink = GenerationSink {
            generation,
            tx: self.events_tx.clone(),
        };
        tracing::info!("Dispatching chat send (generation {})", generation);

        self.in_flight = Some(self.runtime.spawn(async move {
            send_chat_message(transport.as_ref(), request, &sink).await;
        }));
        generation
    }

    /// Abort the send in flight, if any, and advance the generation.
    pub fn cancel(&mut self) -> u64 {
        if let Some(task) = self.in_flight.take() {
            if !task.is_finished() {
                tracing::info!("Aborting in-flight chat send (generation {})", self.generation);
                task.abort();
            }
        }
        self.generation += 1;
        self.generation
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ChatDispatcher {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}
