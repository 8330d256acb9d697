//! Execution thread state machine
//!
//! ```text
//!            observe_running(false)
//!   Running ─────────────────────────▶ Suspended
//!      ▲     ◀─────────────────────────    │
//!      │       observe_running(true)       │
//!      └──────────┬────────────────────────┘
//!                 ▼ terminate()
//!            Terminated (one-way)
//! ```
//!
//! Transitions are driven only by the running flag the runtime reports.
//! Stepping operations record why execution is about to change before
//! sending their command, so the reason is known when the flag arrives.

use crate::broker::{Broker, PendingResponse};
use crate::events::{HostEvents, RunEvent};
use crate::frames::{self, StackFrame};
use crate::protocol::{CommandKind, StepAction};
use crate::scripts::ScriptTable;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Why execution stopped or resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueReason {
    Breakpoint,
    StepEnd,
    Exception,
    ClientRequest,
    Unspecified,
}

impl std::fmt::Display for ContinueReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContinueReason::Breakpoint => "breakpoint",
            ContinueReason::StepEnd => "step",
            ContinueReason::Exception => "exception",
            ContinueReason::ClientRequest => "client request",
            ContinueReason::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Suspended,
    Terminated,
}

#[derive(Debug)]
struct StateCell {
    running: bool,
    terminated: bool,
    last_reason: Option<ContinueReason>,
    pending_reason: Option<ContinueReason>,
    /// Bumped on every transition; stack snapshots are tied to one value
    generation: u64,
}

#[derive(Debug)]
enum StackCache {
    Empty,
    Pending {
        generation: u64,
        response: PendingResponse,
    },
    Resolved {
        generation: u64,
        frames: Arc<Vec<StackFrame>>,
    },
}

/// The single logical thread of a target
#[derive(Debug)]
pub struct Thread {
    broker: Arc<Broker>,
    events: HostEvents,
    scripts: Arc<ScriptTable>,
    state: Mutex<StateCell>,
    stack: Mutex<StackCache>,
}

impl Thread {
    /// A new thread starts out running
    pub fn new(broker: Arc<Broker>, events: HostEvents, scripts: Arc<ScriptTable>) -> Self {
        Self {
            broker,
            events,
            scripts,
            state: Mutex::new(StateCell {
                running: true,
                terminated: false,
                last_reason: None,
                pending_reason: None,
                generation: 0,
            }),
            stack: Mutex::new(StackCache::Empty),
        }
    }

    pub async fn state(&self) -> ThreadState {
        let state = self.state.lock().await;
        if state.terminated {
            ThreadState::Terminated
        } else if state.running {
            ThreadState::Running
        } else {
            ThreadState::Suspended
        }
    }

    pub async fn is_suspended(&self) -> bool {
        self.state().await == ThreadState::Suspended
    }

    /// Reason of the most recent transition
    pub async fn last_reason(&self) -> Option<ContinueReason> {
        self.state.lock().await.last_reason
    }

    /// Record why execution is about to change state
    pub async fn set_pending_reason(&self, reason: ContinueReason) {
        self.state.lock().await.pending_reason = Some(reason);
    }

    /// Apply the running flag reported by the runtime.
    ///
    /// Repeating the current state is a no-op, as is anything after
    /// termination.
    pub async fn observe_running(&self, running: bool) {
        let (reason, generation) = {
            let mut state = self.state.lock().await;
            if state.terminated || state.running == running {
                return;
            }
            state.running = running;
            state.generation += 1;

            let reason = if running {
                // A step's reason also labels the suspend that ends it
                let reason = state.pending_reason.unwrap_or(ContinueReason::Unspecified);
                if reason != ContinueReason::StepEnd {
                    state.pending_reason = None;
                }
                reason
            } else {
                state
                    .pending_reason
                    .take()
                    .unwrap_or(ContinueReason::Unspecified)
            };
            state.last_reason = Some(reason);
            (reason, state.generation)
        };

        if running {
            debug!(%reason, "Thread resumed");
            *self.stack.lock().await = StackCache::Empty;
            self.events.emit(RunEvent::ThreadResumed { reason }).await;
        } else {
            debug!(%reason, "Thread suspended");
            // Listeners reacting to the event must find the request in place
            self.request_backtrace(generation).await;
            self.events.emit(RunEvent::ThreadSuspended { reason }).await;
        }
    }

    /// Post the backtrace for a fresh suspend; resolved on first access
    async fn request_backtrace(&self, generation: u64) {
        let mut cache = self.stack.lock().await;
        if matches!(
            &*cache,
            StackCache::Pending { generation: cached, .. }
                | StackCache::Resolved { generation: cached, .. } if *cached == generation
        ) {
            return;
        }
        let backtrace = CommandKind::Backtrace {
            from_frame: 0,
            to_frame: None,
        };
        match self.broker.post(backtrace).await {
            Ok(response) => {
                *cache = StackCache::Pending {
                    generation,
                    response,
                }
            }
            Err(e) => debug!("Backtrace not requested: {}", e),
        }
    }

    /// Frames of the current suspend, fetched at most once per suspend
    pub async fn stack_frames(&self) -> Result<Arc<Vec<StackFrame>>> {
        let generation = {
            let state = self.state.lock().await;
            if state.terminated {
                return Err(Error::NotAvailable("thread terminated".to_string()));
            }
            if state.running {
                return Err(Error::NotAvailable("thread is running".to_string()));
            }
            state.generation
        };

        let mut cache = self.stack.lock().await;
        let pending = match std::mem::replace(&mut *cache, StackCache::Empty) {
            StackCache::Resolved {
                generation: cached,
                frames,
            } if cached == generation => {
                *cache = StackCache::Resolved {
                    generation,
                    frames: Arc::clone(&frames),
                };
                return Ok(frames);
            }
            StackCache::Pending {
                generation: cached,
                response,
            } if cached == generation => response,
            _ => {
                self.broker
                    .post(CommandKind::Backtrace {
                        from_frame: 0,
                        to_frame: None,
                    })
                    .await?
            }
        };

        let response = self.broker.await_response(pending).await?.into_result()?;
        let scripts = self.scripts.snapshot().await;
        let frames = Arc::new(frames::from_backtrace(&response, &scripts));

        if self.state.lock().await.generation != generation {
            return Err(Error::NotAvailable("thread resumed".to_string()));
        }
        *cache = StackCache::Resolved {
            generation,
            frames: Arc::clone(&frames),
        };
        Ok(frames)
    }

    pub async fn step_into(&self) -> Result<()> {
        self.continue_with(Some(StepAction::In), ContinueReason::StepEnd)
            .await
    }

    pub async fn step_over(&self) -> Result<()> {
        self.continue_with(Some(StepAction::Next), ContinueReason::StepEnd)
            .await
    }

    pub async fn step_return(&self) -> Result<()> {
        self.continue_with(Some(StepAction::Out), ContinueReason::StepEnd)
            .await
    }

    pub async fn resume(&self) -> Result<()> {
        self.continue_with(None, ContinueReason::ClientRequest).await
    }

    pub async fn suspend(&self) -> Result<()> {
        self.prepare(ContinueReason::ClientRequest, true).await?;
        self.fire(CommandKind::Suspend).await
    }

    async fn continue_with(&self, step: Option<StepAction>, reason: ContinueReason) -> Result<()> {
        self.prepare(reason, false).await?;
        self.fire(CommandKind::Continue(step)).await
    }

    /// Record `reason` if the thread is in the state the command leaves.
    ///
    /// A command that cannot cause a transition leaves the pending reason
    /// alone, so it cannot label a later unrelated stop.
    async fn prepare(&self, reason: ContinueReason, leaves_running: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.terminated {
            return Err(Error::NotAvailable("thread terminated".to_string()));
        }
        if state.running == leaves_running {
            state.pending_reason = Some(reason);
        } else {
            debug!(%reason, running = state.running, "No transition expected; reason not recorded");
        }
        Ok(())
    }

    /// The outcome shows up as a state transition, not through the response
    async fn fire(&self, kind: CommandKind) -> Result<()> {
        match self.broker.post(kind).await {
            Ok(_abandoned) => Ok(()),
            Err(Error::Terminated) => Err(Error::NotAvailable("thread terminated".to_string())),
            Err(e) => Err(e),
        }
    }

    /// Move to the terminal state; only the first call emits an event
    pub async fn terminate(&self) {
        {
            let mut state = self.state.lock().await;
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.running = false;
            state.pending_reason = None;
            state.generation += 1;
        }
        *self.stack.lock().await = StackCache::Empty;
        info!("Thread terminated");
        self.events.emit(RunEvent::ThreadTerminated).await;
    }
}
