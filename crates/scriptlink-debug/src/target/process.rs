//! Target lifecycle
//!
//! A [`Target`] is one launched runtime under debug: the child process, the
//! debug connection with its broker, the script table and the single thread.
//! It is created by [`Target::start`] and torn down, one way, by
//! [`Target::terminate`].

use super::config::LaunchConfig;
use super::connection::{
    configure_tcp, connect_with_retry, find_free_port, resolve_host, spawn_runtime,
};
use super::console::spawn_relay;
use super::dispatch::spawn_dispatcher;
use super::handshake::{perform_handshake, HandshakeInfo};
use crate::breakpoints::{Breakpoint, BreakpointSync};
use crate::broker::Broker;
use crate::events::{ConsoleStream, HostEvent, HostEvents, RunEvent};
use crate::frames::StackFrame;
use crate::protocol::CommandKind;
use crate::scripts::{Script, ScriptTable};
use crate::thread::{Thread, ThreadState};
use crate::values::{Evaluation, Handle, RefMap};
use crate::{Error, Result};
use scriptlink_config::constants::DEFAULT_EVENT_CHANNEL_CAPACITY;
use scriptlink_config::ConnectionConfig;
use serde_json::Value as Json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Host-side state that outlives any single target.
///
/// Subscribe and add breakpoints before starting a target; the breakpoints
/// are replayed into every target started with this session.
#[derive(Debug, Clone)]
pub struct Session {
    events: HostEvents,
    breakpoints: Arc<BreakpointSync>,
}

impl Session {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_capacity(config.event_channel_capacity)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: HostEvents::new(capacity),
            breakpoints: Arc::new(BreakpointSync::new()),
        }
    }

    pub async fn subscribe(&self) -> mpsc::Receiver<HostEvent> {
        self.events.subscribe().await
    }

    pub fn events(&self) -> &HostEvents {
        &self.events
    }

    pub fn breakpoints(&self) -> &Arc<BreakpointSync> {
        &self.breakpoints
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

pub(super) struct TargetInner {
    pub(super) id: Uuid,
    port: u16,
    pid: Option<u32>,
    config: ConnectionConfig,
    pub(super) broker: Arc<Broker>,
    pub(super) thread: Thread,
    pub(super) scripts: Arc<ScriptTable>,
    pub(super) breakpoints: Arc<BreakpointSync>,
    events: HostEvents,
    child: Mutex<Option<Child>>,
    relays: Mutex<Vec<JoinHandle<()>>>,
    handshake: OnceLock<HandshakeInfo>,
    cancel: CancellationToken,
    terminated: AtomicBool,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Handle to a runtime under debug; cheap to clone
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("port", &self.inner.port)
            .field("pid", &self.inner.pid)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl Target {
    pub(super) fn from_inner(inner: Arc<TargetInner>) -> Self {
        Self { inner }
    }

    /// Launch the runtime, connect, handshake and replay breakpoints.
    ///
    /// Launch failures (no free port, spawn error, connection attempts
    /// exhausted) are returned before any target state exists.
    pub async fn start(
        launch: &LaunchConfig,
        config: &ConnectionConfig,
        session: &Session,
    ) -> Result<Target> {
        let host = resolve_host(&config.host);
        let port = match launch.port {
            Some(port) => port,
            None => find_free_port(host, config.port_range_start, config.port_range_end).await?,
        };

        let mut child = spawn_runtime(launch, port)?;
        let stream = match connect_with_retry(host, port, config, &mut child).await {
            Ok(stream) => stream,
            Err(e) => {
                if let Err(kill_err) = child.start_kill() {
                    debug!("Runtime already gone: {}", kill_err);
                }
                return Err(e);
            }
        };
        configure_tcp(&stream, config.tcp_keepalive_secs);

        let cancel = CancellationToken::new();
        let (reader, writer) = stream.into_split();
        let (broker, incoming) = Broker::new(reader, writer, config.request_timeout(), cancel.clone());
        let broker = Arc::new(broker);
        let scripts = Arc::new(ScriptTable::new());
        let events = session.events.clone();
        let thread = Thread::new(Arc::clone(&broker), events.clone(), Arc::clone(&scripts));

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let target = Target {
            inner: Arc::new(TargetInner {
                id: Uuid::new_v4(),
                port,
                pid,
                config: config.clone(),
                broker: Arc::clone(&broker),
                thread,
                scripts: Arc::clone(&scripts),
                breakpoints: Arc::clone(&session.breakpoints),
                events: events.clone(),
                child: Mutex::new(Some(child)),
                relays: Mutex::new(Vec::new()),
                handshake: OnceLock::new(),
                cancel,
                terminated: AtomicBool::new(false),
            }),
        };
        info!(target_id = %target.inner.id, port, pid = ?pid, "Runtime attached");

        events.emit(RunEvent::ProcessCreated { pid }).await;

        let mut relays = Vec::new();
        if let Some(stdout) = stdout {
            relays.push(spawn_relay(stdout, ConsoleStream::Stdout, events.clone()));
        }
        if let Some(stderr) = stderr {
            relays.push(spawn_relay(stderr, ConsoleStream::Stderr, events.clone()));
        }
        *target.inner.relays.lock().await = relays;

        events.emit(RunEvent::ThreadCreated).await;
        spawn_dispatcher(incoming, Arc::downgrade(&target.inner));

        match perform_handshake(&broker, &scripts).await {
            Ok(info) => {
                let _ = target.inner.handshake.set(info);
            }
            Err(e) => {
                warn!(target_id = %target.inner.id, "Handshake aborted: {}", e);
                target.terminate().await;
                return Err(e);
            }
        }

        target.inner.breakpoints.attach(Arc::clone(&broker)).await;
        if target.is_terminated() {
            target.inner.breakpoints.detach(&broker).await;
            return Err(Error::Terminated);
        }

        Ok(target)
    }

    /// Tear everything down. Only the first call has any effect.
    ///
    /// Sends a best-effort `disconnect`, stops the connection loops (waking
    /// every pending waiter), terminates the thread, kills the runtime and
    /// finally reports the process as terminated.
    pub async fn terminate(&self) {
        let inner = &self.inner;
        if inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target_id = %inner.id, "Terminating target");
        let timeout = Duration::from_millis(inner.config.shutdown_timeout_ms);

        if let Ok(pending) = inner.broker.post(CommandKind::Disconnect).await {
            drop(pending);
        }
        inner.broker.shutdown(timeout).await;
        inner.thread.terminate().await;
        inner.breakpoints.detach(&inner.broker).await;

        let child = inner.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                debug!("Runtime already exited: {}", e);
            }
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "Runtime exited"),
                Ok(Err(e)) => warn!("Failed to reap runtime: {}", e),
                Err(_) => warn!("Runtime did not exit within {:?}", timeout),
            }
        }

        // Relays finish once the child's pipes close
        let relays = std::mem::take(&mut *inner.relays.lock().await);
        for mut relay in relays {
            if tokio::time::timeout(timeout, &mut relay).await.is_err() {
                relay.abort();
            }
        }

        inner.events.emit(RunEvent::ProcessTerminated).await;
        info!(target_id = %inner.id, "Target terminated");
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Debug port the runtime listens on
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.pid
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Resolves once termination has begun
    pub async fn terminated(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Version string the runtime reported during the handshake
    pub fn runtime_version(&self) -> Option<&str> {
        self.inner
            .handshake
            .get()
            .and_then(|info| info.runtime_version.as_deref())
    }

    pub fn thread(&self) -> &Thread {
        &self.inner.thread
    }

    pub async fn thread_state(&self) -> ThreadState {
        self.inner.thread.state().await
    }

    pub async fn subscribe(&self) -> mpsc::Receiver<HostEvent> {
        self.inner.events.subscribe().await
    }

    // ------------------------------------------------------------------
    // Execution control
    // ------------------------------------------------------------------

    pub async fn step_into(&self) -> Result<()> {
        self.inner.thread.step_into().await
    }

    pub async fn step_over(&self) -> Result<()> {
        self.inner.thread.step_over().await
    }

    pub async fn step_return(&self) -> Result<()> {
        self.inner.thread.step_return().await
    }

    pub async fn resume(&self) -> Result<()> {
        self.inner.thread.resume().await
    }

    pub async fn suspend(&self) -> Result<()> {
        self.inner.thread.suspend().await
    }

    pub async fn stack_frames(&self) -> Result<Arc<Vec<StackFrame>>> {
        self.inner.thread.stack_frames().await
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Evaluate an expression in a frame, or globally when `frame` is `None`
    pub async fn evaluate(&self, expression: &str, frame: Option<u32>) -> Result<Evaluation> {
        self.ensure_alive()?;
        let response = self
            .inner
            .broker
            .request(CommandKind::Evaluate {
                expression: expression.to_string(),
                frame,
                disable_break: true,
            })
            .await?;
        let body = response.body.clone().unwrap_or(Json::Null);
        Ok(Evaluation::from_body(&body, response.refs()))
    }

    /// Fetch values by handle, e.g. to expand an object's children
    pub async fn lookup(&self, handles: &[Handle]) -> Result<RefMap> {
        self.ensure_alive()?;
        let response = self
            .inner
            .broker
            .request(CommandKind::Lookup {
                handles: handles.to_vec(),
            })
            .await?;
        let found: Vec<&Json> = response
            .body
            .as_ref()
            .and_then(Json::as_object)
            .map(|values| values.values().collect())
            .unwrap_or_default();
        Ok(RefMap::materialize(response.refs().iter().chain(found)))
    }

    pub async fn scripts(&self) -> Vec<Script> {
        self.inner.scripts.list().await
    }

    pub async fn script_name(&self, id: i64) -> Option<String> {
        self.inner.scripts.name(id).await
    }

    // ------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------

    pub async fn add_breakpoint(&self, breakpoint: Breakpoint) -> Result<()> {
        self.inner.breakpoints.add(breakpoint).await
    }

    pub async fn remove_breakpoint(&self, breakpoint: &Breakpoint) -> Result<()> {
        self.inner.breakpoints.remove(breakpoint).await
    }

    pub async fn change_breakpoint(&self, breakpoint: Breakpoint) -> Result<()> {
        self.inner.breakpoints.change(breakpoint).await
    }

    pub async fn breakpoints(&self) -> Vec<Breakpoint> {
        self.inner.breakpoints.breakpoints().await
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_terminated() {
            Err(Error::NotAvailable("target terminated".to_string()))
        } else {
            Ok(())
        }
    }
}
