//! Command broker - owns the debug connection
//!
//! The broker handles:
//! - Sequence number generation
//! - Registration of pending commands and correlation of their responses
//! - A writer loop fed by an outbound queue
//! - A reader loop that routes responses to waiters and everything else
//!   (events, observed running state, disconnects) to the dispatcher
//!
//! Waiting for a response is cancellable: the target's cancellation token
//! wakes every waiter, and an optional deadline bounds each wait.

use crate::framing::{write_frame, FrameReader};
use crate::protocol::{Command, CommandKind, Event, Message, Response};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Channel for sending a response back to the command's waiter
type ResponseSender = oneshot::Sender<Result<Response>>;

type PendingMap = Arc<RwLock<HashMap<u64, ResponseSender>>>;

/// What the reader loop hands to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Event(Event),
    /// The runtime reported its execution state on a response
    Running(bool),
    /// The connection failed or was closed by the runtime
    Disconnected,
}

/// A registered command whose response has not been awaited yet.
///
/// Dropping it abandons the response; the reader discards it on arrival.
#[derive(Debug)]
pub struct PendingResponse {
    seq: u64,
    command: &'static str,
    rx: oneshot::Receiver<Result<Response>>,
}

impl PendingResponse {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn command(&self) -> &'static str {
        self.command
    }
}

/// Broker for one debug connection
pub struct Broker {
    /// Next sequence number for outgoing commands
    next_seq: AtomicU64,

    /// Pending commands awaiting responses (keyed by seq)
    pending: PendingMap,

    /// Queue consumed by the writer loop
    outbound: mpsc::UnboundedSender<Command>,

    /// Cancelled once when the target terminates
    cancel: CancellationToken,

    /// Per-response deadline; `None` waits until response or cancellation
    request_timeout: Option<Duration>,

    reader_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("next_seq", &self.next_seq)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Broker {
    /// Start the reader and writer loops over the given stream halves.
    ///
    /// Returns the broker and the receiver of everything that is not a
    /// response to a pending command.
    pub fn new<R, W>(
        reader: R,
        writer: W,
        request_timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<Incoming>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(RwLock::new(HashMap::new()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let reader_task =
            Self::spawn_reader_task(reader, pending.clone(), incoming_tx.clone(), cancel.clone());
        let writer_task =
            Self::spawn_writer_task(writer, outbound_rx, pending.clone(), incoming_tx, cancel.clone());

        let broker = Self {
            next_seq: AtomicU64::new(1),
            pending,
            outbound: outbound_tx,
            cancel,
            request_timeout,
            reader_task: Mutex::new(Some(reader_task)),
            writer_task: Mutex::new(Some(writer_task)),
        };
        (broker, incoming_rx)
    }

    /// Get next sequence number (strictly increasing, never reused)
    pub fn next_sequence(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a command and queue it for the writer without waiting.
    ///
    /// The command is registered before it is queued so a fast response can
    /// never race ahead of its registration.
    pub async fn post(&self, kind: CommandKind) -> Result<PendingResponse> {
        if self.cancel.is_cancelled() {
            return Err(Error::Terminated);
        }

        let command = Command::new(self.next_sequence(), kind);
        let seq = command.seq;
        let name = command.name();

        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(seq, tx);

        if self.outbound.send(command).is_err() {
            self.pending.write().await.remove(&seq);
            return Err(Error::Terminated);
        }

        debug!(seq, command = name, "Posted command");
        Ok(PendingResponse {
            seq,
            command: name,
            rx,
        })
    }

    /// Wait for the response to a posted command.
    ///
    /// Wakes on the response, on target cancellation, or on the configured
    /// deadline, whichever comes first.
    pub async fn await_response(&self, pending: PendingResponse) -> Result<Response> {
        let PendingResponse { seq, command, rx } = pending;

        let deadline = async {
            match self.request_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            result = rx => match result {
                Ok(response) => {
                    trace!(seq, command, "Response delivered");
                    response
                }
                Err(_) => Err(Error::Terminated),
            },
            _ = self.cancel.cancelled() => {
                self.pending.write().await.remove(&seq);
                Err(Error::Terminated)
            }
            _ = deadline => {
                self.pending.write().await.remove(&seq);
                let timeout_ms = self
                    .request_timeout
                    .map(|t| t.as_millis() as u64)
                    .unwrap_or_default();
                warn!(seq, command, timeout_ms, "Command timed out");
                Err(Error::Timeout(timeout_ms))
            }
        }
    }

    /// Post a command and wait for a successful response
    pub async fn request(&self, kind: CommandKind) -> Result<Response> {
        let pending = self.post(kind).await?;
        self.await_response(pending).await?.into_result()
    }

    /// Get current pending command count
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Whether the reader loop is still running
    pub fn is_alive(&self) -> bool {
        match self.reader_task.try_lock() {
            Ok(guard) => guard.as_ref().is_some_and(|h| !h.is_finished()),
            Err(_) => true,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the loops and wait (bounded) for the writer to flush and close.
    ///
    /// Commands queued before the call are still written, so a final
    /// `disconnect` reaches the runtime when the socket allows.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();

        if let Some(handle) = self.writer_task.lock().await.take() {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("Writer loop did not finish within {:?}", timeout);
            }
        }
        if let Some(handle) = self.reader_task.lock().await.take() {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("Reader loop did not finish within {:?}", timeout);
            }
        }
    }

    /// Spawn the loop that writes queued commands in order
    fn spawn_writer_task<W>(
        mut writer: W,
        mut outbound: mpsc::UnboundedReceiver<Command>,
        pending: PendingMap,
        incoming: mpsc::UnboundedSender<Incoming>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            debug!("Writer task started");

            loop {
                // Queued commands win over cancellation so they drain first
                let command = tokio::select! {
                    biased;
                    command = outbound.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                    _ = cancel.cancelled() => break,
                };

                let payload = match command.encode() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(seq = command.seq, command = command.name(), "Failed to encode command: {}", e);
                        if let Some(tx) = pending.write().await.remove(&command.seq) {
                            let _ = tx.send(Err(e));
                        }
                        continue;
                    }
                };

                trace!(seq = command.seq, "Sending: {}", String::from_utf8_lossy(&payload));
                if let Err(e) = write_frame(&mut writer, &payload).await {
                    info!("Debug connection write failed (triggering cleanup): {}", e);
                    if !cancel.is_cancelled() {
                        let _ = incoming.send(Incoming::Disconnected);
                    }
                    break;
                }
            }

            if let Err(e) = writer.shutdown().await {
                debug!("Write half shutdown: {}", e);
            }
            debug!("Writer task stopped");
        })
    }

    /// Spawn the loop that decodes inbound frames
    fn spawn_reader_task<R>(
        reader: R,
        pending: PendingMap,
        incoming: mpsc::UnboundedSender<Incoming>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            debug!("Reader task started");
            let mut frames = FrameReader::new(reader);

            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = frames.next_frame() => frame,
                };

                match frame {
                    Ok(Some(payload)) => match Message::parse(&payload) {
                        Ok(message) => Self::handle_message(message, &pending, &incoming).await,
                        Err(e) => warn!(
                            "Dropping undecodable message ({}): {}",
                            e,
                            String::from_utf8_lossy(&payload)
                        ),
                    },
                    Ok(None) => {
                        info!("Debug connection closed (EOF received)");
                        break;
                    }
                    Err(e) if !e.is_fatal() => warn!("Dropping malformed frame: {}", e),
                    Err(e) => {
                        info!("Debug connection error (triggering cleanup): {}", e);
                        break;
                    }
                }
            }

            // Nothing answers the outstanding commands any more
            let mut pending = pending.write().await;
            let abandoned = pending.len();
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(Error::Terminated));
            }
            drop(pending);
            if abandoned > 0 {
                debug!(abandoned, "Failed pending commands on reader exit");
            }

            if !cancel.is_cancelled() {
                let _ = incoming.send(Incoming::Disconnected);
            }
            debug!("Reader task stopped");
        })
    }

    /// Route one decoded message
    async fn handle_message(
        message: Message,
        pending: &PendingMap,
        incoming: &mpsc::UnboundedSender<Incoming>,
    ) {
        match message {
            Message::Response(response) => {
                // State first, so the thread has observed it when the waiter wakes
                if let Some(running) = response.running {
                    let _ = incoming.send(Incoming::Running(running));
                }

                let waiter = pending.write().await.remove(&response.request_seq);
                match waiter {
                    Some(tx) => {
                        if tx.send(Ok(response)).is_err() {
                            debug!("Response arrived after its waiter gave up");
                        }
                    }
                    None => warn!(
                        request_seq = response.request_seq,
                        command = %response.command,
                        "Discarding response for unknown command"
                    ),
                }
            }
            Message::Event(event) => {
                trace!(event = ?event.event, seq = event.seq, "Routing event");
                let _ = incoming.send(Incoming::Event(event));
            }
            Message::Request(request) => {
                warn!(command = %request.command, "Ignoring request sent by the runtime");
            }
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in [&mut self.reader_task, &mut self.writer_task] {
            if let Some(handle) = task.get_mut().take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EventKind;
    use serde_json::{json, Value as Json};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    /// Runtime side of an in-memory connection
    struct FakeRuntime {
        frames: FrameReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeRuntime {
        async fn read_command(&mut self) -> Json {
            let payload = self.frames.next_frame().await.unwrap().unwrap();
            serde_json::from_slice(&payload).unwrap()
        }

        async fn send(&mut self, message: Json) {
            let payload = serde_json::to_vec(&message).unwrap();
            write_frame(&mut self.writer, &payload).await.unwrap();
        }

        async fn reply(&mut self, request_seq: u64, command: &str, body: Json) {
            self.send(json!({
                "seq": 1000 + request_seq,
                "type": "response",
                "request_seq": request_seq,
                "command": command,
                "success": true,
                "body": body,
            }))
            .await;
        }
    }

    fn connect(
        timeout: Option<Duration>,
    ) -> (Arc<Broker>, mpsc::UnboundedReceiver<Incoming>, FakeRuntime, CancellationToken) {
        let (client, server) = tokio::io::duplex(8192);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let cancel = CancellationToken::new();
        let (broker, incoming) = Broker::new(client_read, client_write, timeout, cancel.clone());
        let runtime = FakeRuntime {
            frames: FrameReader::new(server_read),
            writer: server_write,
        };
        (Arc::new(broker), incoming, runtime, cancel)
    }

    #[tokio::test]
    async fn test_sequence_numbers_strictly_increase() {
        let (broker, _incoming, _runtime, _cancel) = connect(None);

        let mut handles = vec![];
        for _ in 0..10 {
            let broker = broker.clone();
            handles.push(tokio::spawn(async move { broker.next_sequence() }));
        }
        let mut seqs = vec![];
        for handle in handles {
            seqs.push(handle.await.unwrap());
        }
        seqs.sort();
        assert_eq!(seqs, (1..=10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_request_response_correlation() {
        let (broker, _incoming, mut runtime, _cancel) = connect(None);

        tokio::spawn(async move {
            let command = runtime.read_command().await;
            assert_eq!(command["type"], "request");
            assert_eq!(command["command"], "version");
            let seq = command["seq"].as_u64().unwrap();
            runtime.reply(seq, "version", json!({"V8Version": "1.0"})).await;
        });

        let response = broker.request(CommandKind::Version).await.unwrap();
        assert_eq!(response.command, "version");
        assert_eq!(response.body.unwrap()["V8Version"], "1.0");
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_wake_only_their_waiter() {
        let (broker, _incoming, mut runtime, _cancel) = connect(None);
        for _ in 0..4 {
            broker.next_sequence();
        }

        let five = broker.post(CommandKind::Threads).await.unwrap();
        let six = broker.post(CommandKind::Scripts).await.unwrap();
        assert_eq!((five.seq(), six.seq()), (5, 6));

        let waiter_five = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.await_response(five).await })
        };
        let waiter_six = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.await_response(six).await })
        };

        assert_eq!(runtime.read_command().await["seq"], 5);
        assert_eq!(runtime.read_command().await["seq"], 6);

        runtime.reply(6, "scripts", json!([])).await;
        let response = waiter_six.await.unwrap().unwrap();
        assert_eq!(response.request_seq, 6);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter_five.is_finished());
        assert_eq!(broker.pending_count().await, 1);

        runtime.reply(5, "threads", json!({"totalThreads": 1})).await;
        let response = waiter_five.await.unwrap().unwrap();
        assert_eq!(response.request_seq, 5);
    }

    #[tokio::test]
    async fn test_unmatched_response_is_discarded() {
        let (broker, _incoming, mut runtime, _cancel) = connect(None);

        tokio::spawn(async move {
            let command = runtime.read_command().await;
            runtime.reply(99, "stale", json!({})).await;
            let seq = command["seq"].as_u64().unwrap();
            runtime.reply(seq, "threads", json!({"totalThreads": 1})).await;
        });

        let response = broker.request(CommandKind::Threads).await.unwrap();
        assert_eq!(response.body.unwrap()["totalThreads"], 1);
        assert!(broker.is_alive());
    }

    #[tokio::test]
    async fn test_malformed_frames_keep_connection() {
        let (broker, _incoming, mut runtime, _cancel) = connect(None);

        tokio::spawn(async move {
            let command = runtime.read_command().await;
            runtime
                .writer
                .write_all(b"Content-Length: 7\r\n\r\nnotjson")
                .await
                .unwrap();
            runtime.writer.write_all(b"X-Other: 1\r\n\r\n").await.unwrap();
            let seq = command["seq"].as_u64().unwrap();
            runtime.reply(seq, "version", json!({})).await;
        });

        assert!(broker.request(CommandKind::Version).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_response_is_command_error() {
        let (broker, _incoming, mut runtime, _cancel) = connect(None);

        tokio::spawn(async move {
            let command = runtime.read_command().await;
            runtime
                .send(json!({
                    "seq": 50,
                    "type": "response",
                    "request_seq": command["seq"],
                    "command": "evaluate",
                    "success": false,
                    "message": "ReferenceError: nope is not defined",
                }))
                .await;
        });

        let err = broker
            .request(CommandKind::Evaluate {
                expression: "nope".to_string(),
                frame: None,
                disable_break: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_events_and_running_flags_are_forwarded() {
        let (broker, mut incoming, mut runtime, _cancel) = connect(None);

        tokio::spawn(async move {
            let command = runtime.read_command().await;
            runtime
                .send(json!({"seq": 1, "type": "event", "event": "break",
                             "body": {"breakpoints": [2]}}))
                .await;
            runtime
                .send(json!({"seq": 2, "type": "response", "request_seq": command["seq"],
                             "command": "continue", "success": true, "running": true}))
                .await;
        });

        broker
            .request(CommandKind::Continue(None))
            .await
            .unwrap();

        match incoming.recv().await.unwrap() {
            Incoming::Event(event) => {
                assert_eq!(event.event, EventKind::Break);
                assert_eq!(event.breakpoint_ids(), vec![2]);
            }
            other => panic!("Expected event, got {:?}", other),
        }
        assert_eq!(incoming.recv().await.unwrap(), Incoming::Running(true));
    }

    #[tokio::test]
    async fn test_request_timeout_removes_pending() {
        let (broker, _incoming, _runtime, _cancel) = connect(Some(Duration::from_millis(50)));

        let err = broker.request(CommandKind::Version).await.unwrap_err();
        assert_eq!(err, Error::Timeout(50));
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_waiters_without_deadline() {
        let (broker, _incoming, _runtime, cancel) = connect(None);

        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.request(CommandKind::Version).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err(), Error::Terminated);
        assert!(matches!(
            broker.post(CommandKind::Version).await,
            Err(Error::Terminated)
        ));
    }

    #[tokio::test]
    async fn test_eof_fails_pending_and_reports_disconnect() {
        let (broker, mut incoming, mut runtime, _cancel) = connect(None);

        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.request(CommandKind::Threads).await })
        };
        runtime.read_command().await;
        drop(runtime);

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err(), Error::Terminated);
        assert_eq!(incoming.recv().await.unwrap(), Incoming::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queued_commands() {
        let (broker, _incoming, mut runtime, _cancel) = connect(None);

        let pending = broker.post(CommandKind::Disconnect).await.unwrap();
        drop(pending);
        broker.shutdown(Duration::from_secs(1)).await;

        let command = runtime.read_command().await;
        assert_eq!(command["command"], "disconnect");
        assert!(runtime.frames.next_frame().await.unwrap().is_none());
        assert!(!broker.is_alive());
    }
}
