//! Event dispatch
//!
//! Consumes what the broker's reader loop could not correlate: runtime
//! events, running flags carried on responses, and disconnects.

use super::process::{Target, TargetInner};
use crate::broker::Incoming;
use crate::protocol::{Event, EventKind};
use crate::thread::ContinueReason;
use std::sync::Weak;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn the dispatcher; it holds the target weakly and stops with it
pub(super) fn spawn_dispatcher(
    mut incoming: mpsc::UnboundedReceiver<Incoming>,
    target: Weak<TargetInner>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Dispatcher started");
        while let Some(message) = incoming.recv().await {
            let Some(inner) = target.upgrade() else {
                break;
            };
            match message {
                Incoming::Event(event) => dispatch_event(&inner, event).await,
                Incoming::Running(running) => inner.thread.observe_running(running).await,
                Incoming::Disconnected => {
                    info!(target_id = %inner.id, "Runtime connection lost");
                    Target::from_inner(inner).terminate().await;
                }
            }
        }
        debug!("Dispatcher stopped");
    })
}

async fn dispatch_event(inner: &TargetInner, event: Event) {
    match &event.event {
        EventKind::Break => {
            let ids = event.breakpoint_ids();
            if !ids.is_empty() {
                let hits = inner.breakpoints.resolve_hits(&ids).await;
                debug!(runtime_ids = ?ids, hits = ?hits, "Breakpoint hit");
                inner
                    .thread
                    .set_pending_reason(ContinueReason::Breakpoint)
                    .await;
            }
        }
        EventKind::Exception => {
            let uncaught = event
                .body
                .as_ref()
                .and_then(|b| b.get("uncaught"))
                .and_then(|u| u.as_bool())
                .unwrap_or(false);
            debug!(uncaught, "Exception thrown");
            inner
                .thread
                .set_pending_reason(ContinueReason::Exception)
                .await;
        }
        EventKind::AfterCompile => {
            if let Some(body) = &event.body {
                if let Some(script) = inner.scripts.record_compiled(body).await {
                    debug!(id = script.id, name = %script.name, "Script compiled");
                }
            }
        }
        EventKind::Other(name) => debug!(event = %name, "Ignoring runtime event"),
    }

    if let Some(running) = event.running() {
        inner.thread.observe_running(running).await;
    }
}
