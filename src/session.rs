//! Session state machine: owns the TCP connection and the inbound
//! pipeline.
//!
//! One `Session` is one logical connect-to-disconnect lifetime. It
//! arbitrates all transport I/O: outbound text is trimmed, terminated
//! with CRLF and CP437-encoded; inbound bytes flow through
//! reassembly → attribute parsing → word wrap into the scrollback, and
//! every produced display line (plus every state transition) is emitted
//! on the event channel for the presentation layer to observe.
//!
//! The pipeline runs in a single reader task per connection, so the
//! carried style state and the line reassembler never see concurrent
//! access. Establishing a new connection first destroys the old one:
//! at most one transport exists per session at any time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::ansi::AttributeParser;
use crate::cp437;
use crate::lines::LineReassembler;
use crate::scrollback::{ScrollbackBuffer, DEFAULT_SCROLLBACK_LINES};
use crate::wrap::{wrap_runs, DisplayLine, DEFAULT_COLUMNS};

/// Read buffer size for the inbound socket.
const READ_BUFFER: usize = 4096;

/// Keep-alive period used when the feature is enabled (one CRLF per
/// minute, enough to hold an idle BBS login open).
pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(60);

/// Connection lifecycle states.
///
/// `Connecting` may fall back to `Disconnected` on failure. There is no
/// retry state; a failed attempt is terminal until the caller connects
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Session error kinds.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Rejected before any I/O: empty host or out-of-range port.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// The connect attempt failed (DNS, refused, timeout).
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
    /// A mid-session read or write failed.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),
    /// Send attempted with no active connection.
    #[error("not connected")]
    NotConnected,
}

/// What the presentation layer observes.
#[derive(Debug)]
pub enum SessionEvent {
    /// The session entered a new state. Emitted once per transition.
    State(SessionState),
    /// A freshly rendered scrollback line.
    Line(DisplayLine),
    /// A transport failure inside the reader task. Terminal for the
    /// connection; always followed by `State(Disconnected)`.
    Error(SessionError),
}

/// Per-session tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wrap width in visible columns.
    pub columns: usize,
    /// Scrollback capacity in lines.
    pub scrollback_lines: usize,
    /// Keep-alive period; `None` disables it.
    pub keep_alive: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            keep_alive: None,
        }
    }
}

/// State shared between the session handle and its background tasks.
struct Shared {
    state: Mutex<SessionState>,
    scrollback: Mutex<ScrollbackBuffer>,
    events: UnboundedSender<SessionEvent>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Transition and emit, once per actual change.
    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap();
        if *state != next {
            *state = next;
            let _ = self.events.send(SessionEvent::State(next));
        }
    }

    /// Run one reassembled line through the parse/wrap stages and
    /// publish the results.
    fn deliver(&self, parser: &mut AttributeParser, raw: &[u8], columns: usize) {
        let runs = parser.feed(raw);
        for line in wrap_runs(&runs, columns) {
            self.scrollback.lock().unwrap().push(line.clone());
            let _ = self.events.send(SessionEvent::Line(line));
        }
    }
}

/// Handle to one BBS session.
///
/// Owns at most one transport; `connect` while already connecting or
/// connected tears the previous transport down first so stale sockets
/// can never leak events into the new connection.
pub struct Session {
    config: SessionConfig,
    shared: Arc<Shared>,
    writer: Option<Arc<tokio::sync::Mutex<OwnedWriteHalf>>>,
    reader_task: Option<JoinHandle<()>>,
    keep_alive_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Create a session plus the event stream observing it.
    pub fn new(config: SessionConfig) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Disconnected),
            scrollback: Mutex::new(ScrollbackBuffer::new(config.scrollback_lines)),
            events,
        });
        let session = Self {
            config,
            shared,
            writer: None,
            reader_task: None,
            keep_alive_task: None,
        };
        (session, receiver)
    }

    #[allow(dead_code)]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Snapshot of the scrollback, oldest first.
    #[allow(dead_code)]
    pub fn scrollback_lines(&self) -> Vec<DisplayLine> {
        self.shared
            .scrollback
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    /// Open a connection to `host:port`.
    ///
    /// Fails fast with `InvalidAddress` before any socket work. Any
    /// existing transport is destroyed first, so the observable
    /// transition is a single `Disconnected → Connecting`. On connect
    /// failure the session returns to `Disconnected` and the error is
    /// terminal for this attempt.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), SessionError> {
        if host.trim().is_empty() {
            return Err(SessionError::InvalidAddress("host is empty".into()));
        }
        if port == 0 {
            return Err(SessionError::InvalidAddress(
                "port must be in 1-65535".into(),
            ));
        }

        self.teardown_transport();
        self.shared.set_state(SessionState::Connecting);
        log::info!("Connecting to {}:{}", host, port);

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Connect to {}:{} failed: {}", host, port, e);
                self.shared.set_state(SessionState::Disconnected);
                return Err(SessionError::Connect(e));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("set_nodelay failed: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(tokio::sync::Mutex::new(write_half));
        self.writer = Some(writer.clone());

        // Connected must be observable before the reader can emit lines.
        self.shared.set_state(SessionState::Connected);
        self.reader_task = Some(tokio::spawn(read_loop(
            read_half,
            self.shared.clone(),
            self.config.columns,
        )));
        if let Some(period) = self.config.keep_alive {
            self.keep_alive_task = Some(tokio::spawn(keep_alive_loop(
                writer,
                period,
                self.shared.clone(),
            )));
        }
        Ok(())
    }

    /// Send one line of user text.
    ///
    /// Trims, appends CRLF and encodes through the CP437 inverse table
    /// (characters outside the code page become `?`). Fire-and-forget
    /// with respect to transport buffering; suspends only on socket
    /// back-pressure.
    pub async fn send(&mut self, text: &str) -> Result<(), SessionError> {
        if self.shared.state() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let writer = self.writer.clone().ok_or(SessionError::NotConnected)?;
        let payload = encode_line(text);
        let mut writer = writer.lock().await;
        if let Err(e) = writer.write_all(&payload).await {
            log::warn!("Write failed: {}", e);
            drop(writer);
            self.teardown_transport();
            return Err(SessionError::Transport(e));
        }
        Ok(())
    }

    /// Close the connection. Idempotent; always ends `Disconnected`.
    pub fn disconnect(&mut self) {
        self.teardown_transport();
    }

    /// Destroy the current transport, if any: abort the reader and
    /// keep-alive tasks (dropping their socket halves) and release the
    /// writer. Safe to call from any state.
    fn teardown_transport(&mut self) {
        if let Some(task) = self.keep_alive_task.take() {
            task.abort();
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.writer = None;
        self.shared.set_state(SessionState::Disconnected);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.keep_alive_task.take() {
            task.abort();
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

/// Encode one outbound line: trimmed text + CRLF through the inverse
/// CP437 mapping.
fn encode_line(text: &str) -> Vec<u8> {
    let mut out: Vec<u8> = text
        .trim()
        .chars()
        .map(|c| cp437::encode(c).unwrap_or(cp437::SUBSTITUTE))
        .collect();
    out.extend_from_slice(b"\r\n");
    out
}

/// Inbound half of the pipeline. Sole writer of the reassembler, the
/// carried style state and the scrollback for this connection.
async fn read_loop(mut read_half: OwnedReadHalf, shared: Arc<Shared>, columns: usize) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER);
    let mut lines = LineReassembler::new();
    let mut parser = AttributeParser::new();

    loop {
        buf.clear();
        match read_half.read_buf(&mut buf).await {
            Ok(0) => {
                log::info!("Remote closed the connection");
                for raw in lines.flush() {
                    shared.deliver(&mut parser, &raw, columns);
                }
                shared.set_state(SessionState::Disconnected);
                break;
            }
            Ok(_) => {
                for raw in lines.push(&buf) {
                    shared.deliver(&mut parser, &raw, columns);
                }
            }
            Err(e) => {
                log::warn!("Read error: {}", e);
                for raw in lines.flush() {
                    shared.deliver(&mut parser, &raw, columns);
                }
                let _ = shared
                    .events
                    .send(SessionEvent::Error(SessionError::Transport(e)));
                shared.set_state(SessionState::Disconnected);
                break;
            }
        }
    }
}

/// Writes a bare CRLF on a timer while the session stays connected, the
/// way the original client held idle logins open.
async fn keep_alive_loop(
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    period: Duration,
    shared: Arc<Shared>,
) {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    timer.tick().await; // first tick completes immediately
    loop {
        timer.tick().await;
        if shared.state() != SessionState::Connected {
            break;
        }
        if writer.lock().await.write_all(b"\r\n").await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn next_state(events: &mut UnboundedReceiver<SessionEvent>) -> SessionState {
        loop {
            if let SessionEvent::State(state) = next_event(events).await {
                return state;
            }
        }
    }

    async fn next_line(events: &mut UnboundedReceiver<SessionEvent>) -> DisplayLine {
        loop {
            if let SessionEvent::Line(line) = next_event(events).await {
                return line;
            }
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_address_before_io() {
        let (mut session, mut events) = Session::new(SessionConfig::default());

        let err = session.connect("", 23).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidAddress(_)));
        let err = session.connect("bbs.example.com", 0).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidAddress(_)));

        assert_eq!(session.state(), SessionState::Disconnected);
        // No socket was created, so no transition was observable either.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener); // nobody listening on this port now

        let (mut session, mut events) = Session::new(SessionConfig::default());
        let err = session.connect("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, SessionError::Connect(_)));

        assert_eq!(next_state(&mut events).await, SessionState::Connecting);
        assert_eq!(next_state(&mut events).await, SessionState::Disconnected);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_receive_pipeline_renders_styled_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"\x1b[1;31mHELLO\x1b[0m world\r\n")
                .await
                .unwrap();
            sock
        });

        let (mut session, mut events) = Session::new(SessionConfig::default());
        session.connect("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(next_state(&mut events).await, SessionState::Connecting);
        assert_eq!(next_state(&mut events).await, SessionState::Connected);

        let line = next_line(&mut events).await;
        assert_eq!(line.text(), "HELLO world");
        let runs = line.runs();
        assert_eq!(runs[0].text, "HELLO ");
        assert!(runs[0].style.bold);
        assert_eq!(runs[0].style.fg, 31);

        // The scrollback saw the same line.
        let kept = session.scrollback_lines();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text(), "HELLO world");

        drop(server);
    }

    #[tokio::test]
    async fn test_style_carries_across_chunks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"\x1b[32mHI").await.unwrap();
            sock.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            sock.write_all(b"\x1b[0m\r\n").await.unwrap();
            sock
        });

        let (mut session, mut events) = Session::new(SessionConfig::default());
        session.connect("127.0.0.1", addr.port()).await.unwrap();

        let line = next_line(&mut events).await;
        assert_eq!(line.text(), "HI");
        assert_eq!(line.runs()[0].style.fg, 32);

        drop(server);
    }

    #[tokio::test]
    async fn test_send_trims_encodes_and_terminates() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 9];
            sock.read_exact(&mut buf).await.unwrap();
            buf
        });

        let (mut session, _events) = Session::new(SessionConfig::default());
        session.connect("127.0.0.1", addr.port()).await.unwrap();
        session.send("  h\u{00E9}llo \u{2591} ").await.unwrap();

        // é is 0x82 and ░ is 0xB0 in CP437; the CRLF is appended.
        let received = server.await.unwrap();
        assert_eq!(received, b"h\x82llo \xB0\r\n");
    }

    #[tokio::test]
    async fn test_send_substitutes_unmappable_characters() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 5];
            sock.read_exact(&mut buf).await.unwrap();
            buf
        });

        let (mut session, _events) = Session::new(SessionConfig::default());
        session.connect("127.0.0.1", addr.port()).await.unwrap();
        session.send("a\u{20AC}b").await.unwrap();
        assert_eq!(server.await.unwrap(), b"a?b\r\n");
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (mut session, _events) = Session::new(SessionConfig::default());
        let err = session.send("hello").await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test]
    async fn test_reconnect_destroys_old_transport_first() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let first_addr = first.local_addr().unwrap();
        let first_conn = tokio::spawn(async move {
            let (mut sock, _) = first.accept().await.unwrap();
            // EOF here proves the old socket died before the new one.
            let mut buf = [0u8; 1];
            sock.read(&mut buf).await.unwrap()
        });

        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second_addr = second.local_addr().unwrap();
        let second_conn = tokio::spawn(async move { second.accept().await.unwrap().0 });

        let (mut session, mut events) = Session::new(SessionConfig::default());
        session.connect("127.0.0.1", first_addr.port()).await.unwrap();
        assert_eq!(next_state(&mut events).await, SessionState::Connecting);
        assert_eq!(next_state(&mut events).await, SessionState::Connected);

        session.connect("127.0.0.1", second_addr.port()).await.unwrap();
        // Exactly one teardown transition, then the fresh attempt.
        assert_eq!(next_state(&mut events).await, SessionState::Disconnected);
        assert_eq!(next_state(&mut events).await, SessionState::Connecting);
        assert_eq!(next_state(&mut events).await, SessionState::Connected);

        assert_eq!(first_conn.await.unwrap(), 0, "old transport saw EOF");
        drop(second_conn);
    }

    #[tokio::test]
    async fn test_remote_close_flushes_partial_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"no terminator").await.unwrap();
            // Dropping the socket closes the connection.
        });

        let (mut session, mut events) = Session::new(SessionConfig::default());
        session.connect("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(next_state(&mut events).await, SessionState::Connecting);
        assert_eq!(next_state(&mut events).await, SessionState::Connected);

        let line = next_line(&mut events).await;
        assert_eq!(line.text(), "no terminator");
        assert_eq!(next_state(&mut events).await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let (mut session, mut events) = Session::new(SessionConfig::default());
        session.connect("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(next_state(&mut events).await, SessionState::Connecting);
        assert_eq!(next_state(&mut events).await, SessionState::Connected);

        session.disconnect();
        assert_eq!(next_state(&mut events).await, SessionState::Disconnected);
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(events.try_recv().is_err(), "no duplicate transition");

        drop(server);
    }

    #[tokio::test]
    async fn test_keep_alive_writes_crlf() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2];
            sock.read_exact(&mut buf).await.unwrap();
            buf
        });

        let config = SessionConfig {
            keep_alive: Some(Duration::from_millis(20)),
            ..SessionConfig::default()
        };
        let (mut session, _events) = Session::new(config);
        session.connect("127.0.0.1", addr.port()).await.unwrap();

        assert_eq!(&server.await.unwrap(), b"\r\n");
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(encode_line("hello"), b"hello\r\n");
        assert_eq!(encode_line("  spaced  "), b"spaced\r\n");
        assert_eq!(encode_line(""), b"\r\n");
    }
}
