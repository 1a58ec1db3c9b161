//! One side's live view of a connection.
//!
//! An endpoint owns one bidirectional byte stream (split into halves behind
//! async mutexes so an `Arc<Endpoint>` supports a reader task plus writers),
//! optional session credentials, and the listener-assigned session id.
//!
//! # Framing
//!
//! Frames are newline-delimited. With no valid credentials a frame is the
//! raw line. With valid credentials an outgoing frame is
//! `encrypt(payload)|sign(ciphertext)`; an incoming line containing no
//! separator is passed through verbatim as an out-of-band plaintext line
//! (the handshake's session-id frame depends on this, see `handshake`).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use lockline_crypto::{engine, SessionCredentials};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

use crate::error::TransportError;
use crate::events::{SessionEvent, SessionEvents};

/// Separator between ciphertext and signature in an encrypted frame.
pub const FRAME_SEPARATOR: char = '|';

/// Process-unique endpoint identifier, used in lifecycle events and
/// registry removal predicates.
pub type EndpointId = u64;

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Endpoint lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Handshake pending (initiating side only).
    Connecting,
    Open,
    Closed,
}

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// One side's live view of a connection.
pub struct Endpoint<S> {
    id: EndpointId,
    reader: Mutex<BufReader<ReadHalf<S>>>,
    writer: Mutex<WriteHalf<S>>,
    credentials: Option<SessionCredentials>,
    session_id: Option<Uuid>,
    state: AtomicU8,
    closed: Notify,
    disconnect_emitted: AtomicBool,
    events: SessionEvents,
}

impl<S: AsyncRead + AsyncWrite> Endpoint<S> {
    /// Wrap a stream ahead of a handshake (state `Connecting`).
    pub fn new(stream: S, events: SessionEvents) -> Self {
        Self::build(stream, events, None, None, STATE_CONNECTING)
    }

    /// Wrap a stream for plaintext operation (state `Open`, no credentials).
    pub fn plaintext(stream: S, events: SessionEvents) -> Self {
        Self::build(stream, events, None, None, STATE_OPEN)
    }

    /// Wrap a stream with pre-shared credentials (state `Open`).
    pub fn with_credentials(stream: S, credentials: SessionCredentials, events: SessionEvents) -> Self {
        Self::build(stream, events, Some(credentials), None, STATE_OPEN)
    }

    fn build(
        stream: S,
        events: SessionEvents,
        credentials: Option<SessionCredentials>,
        session_id: Option<Uuid>,
        state: u8,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            id: NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed),
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            credentials,
            session_id,
            state: AtomicU8::new(state),
            closed: Notify::new(),
            disconnect_emitted: AtomicBool::new(false),
            events,
        }
    }

    /// Connect over an established stream: runs the client-side handshake
    /// and returns an `Open` endpoint with fresh session credentials.
    pub async fn connect(stream: S, events: SessionEvents) -> Result<Self, TransportError> {
        let mut endpoint = Self::new(stream, events);
        crate::handshake::initiate(&mut endpoint).await?;
        Ok(endpoint)
    }

    /// Read one frame.
    ///
    /// End-of-stream, a closed-connection I/O error, or a concurrent local
    /// [`close`](Endpoint::close) marks the endpoint `Closed`, emits the
    /// disconnect notification, and yields
    /// [`TransportError::EndpointClosed`].
    pub async fn read_frame(&self) -> Result<String, TransportError> {
        if self.state() == EndpointState::Closed {
            return Err(TransportError::EndpointClosed);
        }

        let mut line = String::new();
        let read = {
            let mut reader = self.reader.lock().await;
            // A local close() must not leave this read pending until the
            // peer hangs up, so race the line read against the close signal.
            // Cancelling read_line discards any partial line; the endpoint
            // is terminal at that point.
            if self.state() == EndpointState::Closed {
                self.observe_closure();
                return Err(TransportError::EndpointClosed);
            }
            tokio::select! {
                result = reader.read_line(&mut line) => result,
                _ = self.closed.notified() => {
                    self.observe_closure();
                    return Err(TransportError::EndpointClosed);
                }
            }
        };
        match read {
            Ok(0) => {
                self.observe_closure();
                return Err(TransportError::EndpointClosed);
            }
            Ok(_) => {}
            Err(e) if is_closure(&e) => {
                self.observe_closure();
                return Err(TransportError::EndpointClosed);
            }
            Err(e) => return Err(e.into()),
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }

        let Some(creds) = self.active_credentials() else {
            return Ok(line);
        };

        // A line without the separator is an out-of-band plaintext frame
        // even when credentials are active.
        let Some((ciphertext, signature)) = line.split_once(FRAME_SEPARATOR) else {
            return Ok(line);
        };

        // Verify before decrypt.
        if !engine::verify_signature(ciphertext, signature, creds) {
            return Err(TransportError::SignatureInvalid);
        }
        Ok(engine::decrypt(ciphertext, creds)?)
    }

    /// Write one frame and flush.
    ///
    /// With valid credentials the payload is encrypted and signed. Without,
    /// it goes out verbatim; payloads containing a newline or the separator
    /// are rejected rather than corrupting the framing.
    pub async fn write_frame(&self, payload: &str) -> Result<(), TransportError> {
        if self.state() == EndpointState::Closed {
            return Err(TransportError::EndpointClosed);
        }

        let line = match self.active_credentials() {
            Some(creds) => {
                let ciphertext = engine::encrypt(payload, creds)?;
                let signature = engine::sign(&ciphertext, creds)?;
                format!("{ciphertext}{FRAME_SEPARATOR}{signature}\n")
            }
            None => {
                if payload.contains('\n') || payload.contains('\r') || payload.contains(FRAME_SEPARATOR)
                {
                    return Err(TransportError::UnframeablePayload);
                }
                format!("{payload}\n")
            }
        };

        let result = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(line.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_closure(&e) => {
                self.observe_closure();
                Err(TransportError::EndpointClosed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read one frame and decode it as JSON.
    pub async fn read_object<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        let line = self.read_frame().await?;
        serde_json::from_str(&line).map_err(|e| TransportError::Deserialization(e.to_string()))
    }

    /// Encode a value as single-line JSON and write it as one frame.
    pub async fn write_object<T: Serialize>(&self, value: &T) -> Result<(), TransportError> {
        let line = serde_json::to_string(value)
            .map_err(|e| TransportError::Deserialization(e.to_string()))?;
        self.write_frame(&line).await
    }

    /// Close the endpoint. Idempotent; subsequent frame operations fail
    /// with [`TransportError::EndpointClosed`].
    ///
    /// Wakes a read blocked on this endpoint, shuts down the write half
    /// (the peer's in-flight read then completes with end-of-stream), and
    /// emits the disconnect notification.
    pub async fn close(&self) {
        if self.state.swap(STATE_CLOSED, Ordering::AcqRel) == STATE_CLOSED {
            return;
        }
        debug!(endpoint = self.id, "closing endpoint");
        self.closed.notify_one();
        {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        self.emit_disconnect();
    }
}

impl<S> Endpoint<S> {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn state(&self) -> EndpointState {
        match self.state.load(Ordering::Acquire) {
            STATE_CONNECTING => EndpointState::Connecting,
            STATE_OPEN => EndpointState::Open,
            _ => EndpointState::Closed,
        }
    }

    /// True iff credentials are present and valid, i.e. frames are encrypted.
    pub fn is_secure(&self) -> bool {
        self.credentials.as_ref().is_some_and(|c| c.is_valid())
    }

    fn active_credentials(&self) -> Option<&SessionCredentials> {
        self.credentials.as_ref().filter(|c| c.is_valid())
    }

    /// Install the session established by a handshake. Must happen before
    /// the endpoint is shared.
    pub(crate) fn install_session(&mut self, session_id: Uuid, credentials: SessionCredentials) {
        self.session_id = Some(session_id);
        self.credentials = Some(credentials);
    }

    pub(crate) fn mark_open(&self) {
        // Close wins over a late handshake completion.
        let _ = self.state.compare_exchange(
            STATE_CONNECTING,
            STATE_OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Mark closed and emit the disconnect notification, before the
    /// `EndpointClosed` error reaches the caller.
    fn observe_closure(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.emit_disconnect();
    }

    /// At most one disconnect notification per endpoint, whether closure
    /// was observed on a frame operation or requested locally.
    fn emit_disconnect(&self) {
        if !self.disconnect_emitted.swap(true, Ordering::AcqRel) {
            debug!(endpoint = self.id, session = ?self.session_id, "endpoint disconnected");
            self.events.emit(SessionEvent::Disconnected {
                endpoint: self.id,
                session_id: self.session_id,
            });
        }
    }
}

impl<S> std::fmt::Debug for Endpoint<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("secure", &self.credentials.as_ref().map(|c| c.is_valid()))
            .finish()
    }
}

/// I/O error kinds that mean "the connection is gone" rather than a fault.
fn is_closure(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        error.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plaintext_round_trip() {
        let (a, b) = tokio::io::duplex(4096);
        let left = Endpoint::plaintext(a, SessionEvents::new());
        let right = Endpoint::plaintext(b, SessionEvents::new());

        left.write_frame("hello").await.unwrap();
        assert_eq!(right.read_frame().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_plaintext_write_rejects_framing_characters() {
        let (a, _b) = tokio::io::duplex(4096);
        let left = Endpoint::plaintext(a, SessionEvents::new());

        for payload in ["two\nlines", "carriage\rreturn", "looks|encrypted"] {
            assert!(matches!(
                left.write_frame(payload).await,
                Err(TransportError::UnframeablePayload)
            ));
        }
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let (a, _b) = tokio::io::duplex(4096);
        let endpoint = Endpoint::plaintext(a, SessionEvents::new());

        endpoint.close().await;
        endpoint.close().await; // idempotent

        assert_eq!(endpoint.state(), EndpointState::Closed);
        assert!(matches!(
            endpoint.read_frame().await,
            Err(TransportError::EndpointClosed)
        ));
        assert!(matches!(
            endpoint.write_frame("x").await,
            Err(TransportError::EndpointClosed)
        ));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (a, _b) = tokio::io::duplex(64);
        let endpoint = Endpoint::new(a, SessionEvents::new());
        assert_eq!(endpoint.state(), EndpointState::Connecting);

        endpoint.mark_open();
        assert_eq!(endpoint.state(), EndpointState::Open);

        endpoint.close().await;
        assert_eq!(endpoint.state(), EndpointState::Closed);

        // Closed is terminal.
        endpoint.mark_open();
        assert_eq!(endpoint.state(), EndpointState::Closed);
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        use std::sync::Arc;
        use std::time::Duration;

        let (a, _b) = tokio::io::duplex(64);
        let endpoint = Arc::new(Endpoint::plaintext(a, SessionEvents::new()));

        // The peer writes nothing, so this read blocks.
        let reading = Arc::clone(&endpoint);
        let pending = tokio::spawn(async move { reading.read_frame().await });
        tokio::task::yield_now().await;

        endpoint.close().await;

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("read stayed pending across a local close")
            .unwrap();
        assert!(matches!(result, Err(TransportError::EndpointClosed)));
        assert_eq!(endpoint.state(), EndpointState::Closed);
    }

    #[tokio::test]
    async fn test_local_close_emits_exactly_one_disconnect() {
        let (a, _b) = tokio::io::duplex(64);
        let events = SessionEvents::new();
        let mut observer = events.subscribe();
        let endpoint = Endpoint::plaintext(a, events);

        endpoint.close().await;

        let event = observer.recv().await.unwrap();
        assert!(matches!(
            event,
            SessionEvent::Disconnected { endpoint: id, .. } if id == endpoint.id()
        ));

        // Later failures and repeated closes emit nothing further.
        assert!(matches!(
            endpoint.read_frame().await,
            Err(TransportError::EndpointClosed)
        ));
        endpoint.close().await;
        assert!(matches!(
            observer.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_endpoint_ids_are_unique() {
        let (a, b) = tokio::io::duplex(64);
        let events = SessionEvents::new();
        let left = Endpoint::plaintext(a, events.clone());
        let right = Endpoint::plaintext(b, events);
        assert_ne!(left.id(), right.id());
    }
}
