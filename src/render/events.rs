//! Typed event records shared by the render driver, the extractors, and the
//! HTTP DTOs. Four concurrent sources (navigation, network, lifecycle,
//! console) feed into one render; per "Event-stream aggregation" this is done
//! by message passing into a single selector rather than callbacks over
//! shared mutable state — see [`EventAggregator`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubresourceType {
    Document,
    Script,
    Stylesheet,
    Xhr,
    Fetch,
    Image,
    Font,
    Media,
    Websocket,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubresourceRecord {
    pub id: String,
    pub url: String,
    pub method: String,
    pub status: u16,
    #[serde(rename = "type")]
    pub kind: SubresourceType,
    pub size: u64,
    pub time: f64,
    pub is_internal: bool,
    pub blocked: bool,
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub name: String,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub text: String,
    pub time: f64,
}

/// A render's accumulated trace: the state a single selector writes while
/// draining the four event channels below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderTrace {
    pub subresources: Vec<SubresourceRecord>,
    pub lifecycle: Vec<LifecycleEvent>,
    pub console: Vec<ConsoleEntry>,
    pub js_errors: Vec<String>,
}

/// One engine-emitted event, tagged by source stream.
pub enum EngineEvent {
    Subresource(SubresourceRecord),
    /// Patches fields of an already-emitted [`SubresourceRecord`] by id, since
    /// status and encoded size only become known after `requestWillBeSent`.
    SubresourceUpdate {
        id: String,
        status: Option<u16>,
        size: Option<u64>,
        failed: Option<bool>,
    },
    Lifecycle(LifecycleEvent),
    Console(ConsoleEntry),
    JsError(String),
}

/// Sending half handed to the four per-stream tasks that read engine events.
pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

/// Single writer that drains the shared channel into a [`RenderTrace`].
///
/// Using one channel (rather than four) keeps relative receive order across
/// streams, which is all the ordering guarantee §4.5 asks for within a render.
pub struct EventAggregator {
    receiver: mpsc::UnboundedReceiver<EngineEvent>,
}

impl EventAggregator {
    pub fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { receiver: rx })
    }

    /// Drains every event currently buffered without waiting for more.
    pub fn drain_into(&mut self, trace: &mut RenderTrace) {
        while let Ok(event) = self.receiver.try_recv() {
            apply(trace, event);
        }
    }

    /// Awaits at least one event then drains the rest, used when the driver
    /// wants to block until something happens.
    pub async fn recv_into(&mut self, trace: &mut RenderTrace) -> bool {
        match self.receiver.recv().await {
            Some(event) => {
                apply(trace, event);
                self.drain_into(trace);
                true
            }
            None => false,
        }
    }
}

fn apply(trace: &mut RenderTrace, event: EngineEvent) {
    match event {
        EngineEvent::Subresource(record) => trace.subresources.push(record),
        EngineEvent::SubresourceUpdate { id, status, size, failed } => {
            if let Some(record) = trace.subresources.iter_mut().find(|r| r.id == id) {
                if let Some(status) = status {
                    record.status = status;
                }
                if let Some(size) = size {
                    record.size = size;
                }
                if let Some(failed) = failed {
                    record.failed = failed;
                }
            }
        }
        EngineEvent::Lifecycle(event) => trace.lifecycle.push(event),
        EngineEvent::Console(entry) => trace.console.push(entry),
        EngineEvent::JsError(message) => trace.js_errors.push(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aggregator_preserves_receive_order() {
        let (tx, mut agg) = EventAggregator::channel();
        tx.send(EngineEvent::Lifecycle(LifecycleEvent {
            name: "domContentLoaded".into(),
            time: 1.0,
        }))
        .unwrap();
        tx.send(EngineEvent::Lifecycle(LifecycleEvent {
            name: "load".into(),
            time: 2.0,
        }))
        .unwrap();
        drop(tx);

        let mut trace = RenderTrace::default();
        while agg.recv_into(&mut trace).await {}

        assert_eq!(trace.lifecycle[0].name, "domContentLoaded");
        assert_eq!(trace.lifecycle[1].name, "load");
    }

    #[tokio::test]
    async fn subresource_update_patches_matching_record_by_id() {
        let (tx, mut agg) = EventAggregator::channel();
        tx.send(EngineEvent::Subresource(SubresourceRecord {
            id: "1".into(),
            url: "https://example.com/a.js".into(),
            method: "GET".into(),
            status: 0,
            kind: SubresourceType::Script,
            size: 0,
            time: 0.0,
            is_internal: false,
            blocked: false,
            failed: false,
        }))
        .unwrap();
        tx.send(EngineEvent::SubresourceUpdate {
            id: "1".into(),
            status: Some(200),
            size: Some(1024),
            failed: None,
        })
        .unwrap();
        drop(tx);

        let mut trace = RenderTrace::default();
        while agg.recv_into(&mut trace).await {}

        assert_eq!(trace.subresources[0].status, 200);
        assert_eq!(trace.subresources[0].size, 1024);
    }
}
