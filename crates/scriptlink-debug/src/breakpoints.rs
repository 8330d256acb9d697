//! Breakpoint synchronization
//!
//! The host owns breakpoint specs. [`BreakpointSync`] remembers every spec it
//! was given and keeps a side table of what is currently inserted in the
//! attached runtime:
//!
//! ```text
//! BreakpointId ──▶ { runtime id, inserted }
//! ```
//!
//! Specs added before a runtime is attached (or while it is detached) are
//! inserted when [`BreakpointSync::attach`] replays them.

use crate::broker::Broker;
use crate::protocol::{CommandKind, ExceptionBreakType};
use crate::Result;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

static NEXT_BREAKPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Host-side identity of a breakpoint spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(u64);

impl BreakpointId {
    fn next() -> Self {
        Self(NEXT_BREAKPOINT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind {
    Line {
        file: String,
        /// 1-based
        line: u32,
        condition: Option<String>,
        enabled: bool,
    },
    Exception {
        /// Stop on exceptions that are caught
        caught: bool,
        /// Stop on exceptions nothing catches
        uncaught: bool,
        enabled: bool,
    },
}

/// A breakpoint spec supplied by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub kind: BreakpointKind,
}

impl Breakpoint {
    /// Enabled, unconditional line breakpoint
    pub fn line(file: impl Into<String>, line: u32) -> Self {
        Self {
            id: BreakpointId::next(),
            kind: BreakpointKind::Line {
                file: file.into(),
                line,
                condition: None,
                enabled: true,
            },
        }
    }

    pub fn exception(caught: bool, uncaught: bool) -> Self {
        Self {
            id: BreakpointId::next(),
            kind: BreakpointKind::Exception {
                caught,
                uncaught,
                enabled: true,
            },
        }
    }

    pub fn with_condition(mut self, expression: impl Into<String>) -> Self {
        if let BreakpointKind::Line { condition, .. } = &mut self.kind {
            *condition = Some(expression.into());
        }
        self
    }

    pub fn with_enabled(mut self, value: bool) -> Self {
        match &mut self.kind {
            BreakpointKind::Line { enabled, .. } | BreakpointKind::Exception { enabled, .. } => {
                *enabled = value
            }
        }
        self
    }

    /// `file:line` of a line breakpoint
    pub fn location(&self) -> Option<(&str, u32)> {
        match &self.kind {
            BreakpointKind::Line { file, line, .. } => Some((file.as_str(), *line)),
            BreakpointKind::Exception { .. } => None,
        }
    }
}

/// Side-table entry for an inserted breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRecord {
    /// Id assigned by the runtime; exception breakpoints have none
    pub runtime_id: Option<u64>,
    pub inserted: bool,
}

/// Keeps the runtime's breakpoints in line with the host's specs
#[derive(Debug, Default)]
pub struct BreakpointSync {
    known: RwLock<HashMap<BreakpointId, Breakpoint>>,
    records: RwLock<HashMap<BreakpointId, BreakpointRecord>>,
    broker: RwLock<Option<Arc<Broker>>>,
}

impl BreakpointSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a spec without touching the runtime
    pub async fn remember(&self, breakpoint: Breakpoint) {
        self.known.write().await.insert(breakpoint.id, breakpoint);
    }

    /// Remember a spec and insert it into the attached runtime, if any
    pub async fn add(&self, breakpoint: Breakpoint) -> Result<()> {
        self.remember(breakpoint.clone()).await;
        match self.attached().await {
            Some(broker) => self.insert(&broker, &breakpoint).await,
            None => {
                debug!(id = %breakpoint.id, "No runtime attached; breakpoint deferred");
                Ok(())
            }
        }
    }

    /// Clear a spec from the runtime, then forget it.
    ///
    /// If the runtime rejects the clear, the spec and its record are kept.
    pub async fn remove(&self, breakpoint: &Breakpoint) -> Result<()> {
        self.uninsert(breakpoint).await?;
        self.known.write().await.remove(&breakpoint.id);
        Ok(())
    }

    /// Replace a spec: remove the old insertion, then add the new one.
    ///
    /// Between the two commands the breakpoint is absent in the runtime. A
    /// failed removal leaves the old spec in place.
    pub async fn change(&self, breakpoint: Breakpoint) -> Result<()> {
        let previous = self.known.read().await.get(&breakpoint.id).cloned();
        if let Some(previous) = previous {
            self.uninsert(&previous).await?;
        }
        self.add(breakpoint).await
    }

    /// Attach a runtime and replay every known spec into it.
    ///
    /// Individual failures are logged; returns how many were inserted.
    pub async fn attach(&self, broker: Arc<Broker>) -> usize {
        *self.broker.write().await = Some(Arc::clone(&broker));
        self.records.write().await.clear();

        let mut breakpoints: Vec<Breakpoint> = self.known.read().await.values().cloned().collect();
        breakpoints.sort_by_key(|bp| bp.id);

        let mut inserted = 0;
        for breakpoint in &breakpoints {
            match self.insert(&broker, breakpoint).await {
                Ok(()) => inserted += 1,
                Err(e) => warn!(id = %breakpoint.id, "Failed to replay breakpoint: {}", e),
            }
        }
        info!(inserted, total = breakpoints.len(), "Replayed breakpoints");
        inserted
    }

    /// Drop `broker` if it is the attached runtime; nothing is inserted any more
    pub async fn detach(&self, broker: &Arc<Broker>) {
        let mut attached = self.broker.write().await;
        if attached.as_ref().is_some_and(|current| Arc::ptr_eq(current, broker)) {
            *attached = None;
            self.records.write().await.clear();
            debug!("Breakpoints detached from runtime");
        }
    }

    pub async fn record(&self, id: BreakpointId) -> Option<BreakpointRecord> {
        self.records.read().await.get(&id).copied()
    }

    /// Number of side-table entries
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// All known specs ordered by id
    pub async fn breakpoints(&self) -> Vec<Breakpoint> {
        let mut breakpoints: Vec<Breakpoint> = self.known.read().await.values().cloned().collect();
        breakpoints.sort_by_key(|bp| bp.id);
        breakpoints
    }

    /// Host breakpoints matching runtime ids reported by a break event
    pub async fn resolve_hits(&self, runtime_ids: &[u64]) -> Vec<BreakpointId> {
        let records = self.records.read().await;
        let mut hits: Vec<BreakpointId> = records
            .iter()
            .filter(|(_, record)| {
                record
                    .runtime_id
                    .is_some_and(|id| runtime_ids.contains(&id))
            })
            .map(|(id, _)| *id)
            .collect();
        hits.sort();
        hits
    }

    async fn attached(&self) -> Option<Arc<Broker>> {
        self.broker.read().await.clone()
    }

    /// Clear the runtime side of a spec; the record goes only once that succeeded
    async fn uninsert(&self, breakpoint: &Breakpoint) -> Result<()> {
        let record = self.records.read().await.get(&breakpoint.id).copied();
        let broker = self.attached().await;
        let (Some(record), Some(broker)) = (record, broker) else {
            self.records.write().await.remove(&breakpoint.id);
            return Ok(());
        };

        if record.inserted {
            match &breakpoint.kind {
                BreakpointKind::Line { .. } => {
                    if let Some(id) = record.runtime_id {
                        broker.request(CommandKind::ClearBreakpoint { id }).await?;
                        debug!(id = %breakpoint.id, runtime_id = id, "Cleared breakpoint");
                    }
                }
                BreakpointKind::Exception { .. } => {
                    self.sync_exception_breaks(&broker, Some(breakpoint.id))
                        .await?;
                    debug!(id = %breakpoint.id, "Exception breakpoint withdrawn");
                }
            }
        }
        self.records.write().await.remove(&breakpoint.id);
        Ok(())
    }

    /// Push the union of every enabled exception spec, leaving out `excluded`
    async fn sync_exception_breaks(
        &self,
        broker: &Broker,
        excluded: Option<BreakpointId>,
    ) -> Result<()> {
        let (all, uncaught) = self
            .known
            .read()
            .await
            .values()
            .filter(|bp| Some(bp.id) != excluded)
            .fold((false, false), |(all, uncaught), bp| match bp.kind {
                BreakpointKind::Exception {
                    caught: c,
                    uncaught: u,
                    enabled: true,
                } => (all || c, uncaught || u),
                _ => (all, uncaught),
            });
        set_exception_breaks(broker, all, uncaught).await
    }

    async fn insert(&self, broker: &Broker, breakpoint: &Breakpoint) -> Result<()> {
        let record = match &breakpoint.kind {
            BreakpointKind::Line {
                file,
                line,
                condition,
                enabled,
            } => {
                let response = broker
                    .request(CommandKind::SetBreakpoint {
                        file: file.clone(),
                        line: *line,
                        condition: condition.clone(),
                        enabled: *enabled,
                    })
                    .await?;
                let runtime_id = response
                    .body
                    .as_ref()
                    .and_then(|body| body.get("breakpoint"))
                    .and_then(Json::as_u64);
                if runtime_id.is_none() {
                    warn!(id = %breakpoint.id, "Runtime did not report a breakpoint id");
                }
                debug!(id = %breakpoint.id, file = %file, line, runtime_id = ?runtime_id, "Inserted breakpoint");
                BreakpointRecord {
                    runtime_id,
                    inserted: true,
                }
            }
            BreakpointKind::Exception { .. } => {
                self.sync_exception_breaks(broker, None).await?;
                BreakpointRecord {
                    runtime_id: None,
                    inserted: true,
                }
            }
        };
        self.records.write().await.insert(breakpoint.id, record);
        Ok(())
    }
}

/// The runtime tracks caught and uncaught exception breaks as two switches
async fn set_exception_breaks(broker: &Broker, all: bool, uncaught: bool) -> Result<()> {
    broker
        .request(CommandKind::SetExceptionBreak {
            break_on: ExceptionBreakType::All,
            enabled: all,
        })
        .await?;
    broker
        .request(CommandKind::SetExceptionBreak {
            break_on: ExceptionBreakType::Uncaught,
            enabled: uncaught,
        })
        .await?;
    Ok(())
}
