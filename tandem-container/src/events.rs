//! Event delivery for container lifecycle changes

use std::time::SystemTime;
use tandem_core::{ContainerEvent, ContainerId};
use tokio::sync::mpsc;

/// Optional event channel shared by a factory and its containers
///
/// Every event is traced; it is also forwarded when a channel is attached.
/// Sending never blocks, so events can be emitted from blocking threads.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    event_tx: Option<mpsc::Sender<ContainerEvent>>,
}

impl EventSink {
    pub(crate) const fn new(event_tx: Option<mpsc::Sender<ContainerEvent>>) -> Self {
        Self { event_tx }
    }

    pub(crate) fn emit(&self, event: ContainerEvent) {
        event.emit_trace();

        if let Some(ref tx) = self.event_tx {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!(error = %e, "Dropped container event");
            }
        }
    }

    pub(crate) fn error(&self, id: &ContainerId, message: impl Into<String>) {
        self.emit(ContainerEvent::Error {
            id: id.clone(),
            message: message.into(),
            timestamp: SystemTime::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(Some(tx));
        let id = ContainerId::new("events").unwrap();

        sink.error(&id, "boom");

        let event = rx.recv().await.unwrap();
        assert!(event.is_critical());
        assert_eq!(event.container_id(), &id);
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = EventSink::new(Some(tx));
        let id = ContainerId::new("events").unwrap();

        sink.error(&id, "first");
        sink.error(&id, "second");
    }
}
