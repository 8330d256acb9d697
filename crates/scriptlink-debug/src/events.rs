//! Host-facing notifications
//!
//! Run events describe process and thread lifecycle; console events carry the
//! runtime's standard output and error. Both are fanned out to subscribers
//! over bounded channels.

use crate::thread::ContinueReason;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Which child stream a console chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for ConsoleStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleStream::Stdout => write!(f, "stdout"),
            ConsoleStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// A chunk of console output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEvent {
    pub stream: ConsoleStream,
    pub text: String,
    /// Last event of this stream; `text` is empty
    pub end_of_stream: bool,
}

impl ConsoleEvent {
    pub fn text(stream: ConsoleStream, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
            end_of_stream: false,
        }
    }

    pub fn end(stream: ConsoleStream) -> Self {
        Self {
            stream,
            text: String::new(),
            end_of_stream: true,
        }
    }
}

/// Process and thread lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    ProcessCreated { pid: Option<u32> },
    ProcessTerminated,
    ThreadCreated,
    ThreadSuspended { reason: ContinueReason },
    ThreadResumed { reason: ContinueReason },
    ThreadTerminated,
}

/// Anything delivered to the host tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Run(RunEvent),
    Console(ConsoleEvent),
}

impl HostEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HostEvent::Run(RunEvent::ProcessTerminated))
    }
}

impl From<RunEvent> for HostEvent {
    fn from(event: RunEvent) -> Self {
        HostEvent::Run(event)
    }
}

impl From<ConsoleEvent> for HostEvent {
    fn from(event: ConsoleEvent) -> Self {
        HostEvent::Console(event)
    }
}

/// Broadcaster of host events to any number of bounded subscribers
#[derive(Debug, Clone)]
pub struct HostEvents {
    subscribers: Arc<RwLock<Vec<mpsc::Sender<HostEvent>>>>,
    capacity: usize,
}

impl HostEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to host events.
    ///
    /// Closed subscribers are pruned before the new one is added. A
    /// subscriber that falls `capacity` events behind misses events rather
    /// than stalling the emitter.
    pub async fn subscribe(&self) -> mpsc::Receiver<HostEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|existing| !existing.is_closed());
        subscribers.push(tx);
        debug!(
            capacity = self.capacity,
            total = subscribers.len(),
            "New host event subscriber"
        );
        rx
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Deliver an event to every live subscriber without blocking
    pub async fn emit(&self, event: impl Into<HostEvent>) {
        let event = event.into();
        let mut subscribers = self.subscribers.write().await;
        let mut dropped = 0;
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if dropped > 0 {
            warn!(
                event = ?event,
                dropped,
                "Dropped host event for slow subscriber(s)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_subscribers_receive() {
        let events = HostEvents::new(8);
        let mut a = events.subscribe().await;
        let mut b = events.subscribe().await;

        events.emit(RunEvent::ThreadCreated).await;

        assert_eq!(a.recv().await, Some(HostEvent::Run(RunEvent::ThreadCreated)));
        assert_eq!(b.recv().await, Some(HostEvent::Run(RunEvent::ThreadCreated)));
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let events = HostEvents::new(8);
        let first = events.subscribe().await;
        let _second = events.subscribe().await;
        drop(first);

        events.emit(ConsoleEvent::text(ConsoleStream::Stdout, "hi")).await;
        assert_eq!(events.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_events() {
        let events = HostEvents::new(1);
        let mut rx = events.subscribe().await;

        events.emit(RunEvent::ThreadCreated).await;
        events.emit(RunEvent::ThreadTerminated).await;

        assert_eq!(rx.recv().await, Some(HostEvent::Run(RunEvent::ThreadCreated)));
        assert!(rx.try_recv().is_err());
        assert_eq!(events.subscriber_count().await, 1);
    }

    #[test]
    fn test_console_end_of_stream() {
        let end = ConsoleEvent::end(ConsoleStream::Stderr);
        assert!(end.end_of_stream);
        assert!(end.text.is_empty());
        assert_eq!(end.stream.to_string(), "stderr");
    }
}
