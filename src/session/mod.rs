//! Remote auth protocol state machine
//!
//! Owns the transport, interprets inbound frames, drives the crypto
//! primitives and reports lifecycle events through [`AuthHandler`].
//! Exactly one session exists per login attempt; it is created when the
//! gateway says `hello` and destroyed when the handshake ends, whatever
//! the outcome. Every terminal path funnels through the same teardown:
//! stop the liveness monitor with a bounded join, close the transport,
//! drop the session.
//!
//! Frame handling is strictly sequential. Each protocol step depends on
//! cryptographic state established by the previous one, so frames are
//! processed in receipt order on the caller's task, never in parallel.

pub mod error;
pub mod frames;
pub mod heartbeat;
pub mod user;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::crypto::{self, compute_fingerprint, SessionKeypair};
use crate::event::AuthHandler;
use crate::exchange::{ExchangeError, HttpExchanger, ProxySpec, TicketExchanger};
use crate::qr::{PlainTextRenderer, QrRenderer};
use crate::transport::{self, Connection, FrameStream, SharedSink, TransportError};

use error::{AuthError, CaptchaChallenge};
use frames::{Inbound, Outbound};
use heartbeat::{AckFlag, LivenessMonitor};
use user::UserData;

/// Gateway endpoint, protocol version pinned by the query parameter
pub const GATEWAY_URL: &str = "wss://remote-auth-gateway.discord.gg/?v=2";

/// Scannable payload embedding a session fingerprint
pub fn qr_url(fingerprint: &str) -> String {
    format!("https://discord.com/ra/{fingerprint}")
}

/// Longest single blocking read
const READ_TIMEOUT_MAX: Duration = Duration::from_secs(5);

/// Shortest single blocking read as the deadline approaches
const READ_TIMEOUT_MIN: Duration = Duration::from_millis(500);

/// Protocol states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Opening the transport
    Connecting,
    /// Waiting for session parameters
    AwaitHello,
    /// Waiting for the proof-of-possession challenge
    AwaitNonce,
    /// Waiting for the gateway-reported fingerprint
    AwaitFingerprint,
    /// Code displayed; waiting for scan and confirmation
    AwaitScan,
    /// Token obtained
    Done,
    /// Peer-side user declined
    Cancelled,
    /// Deadline passed, the transport silently died, or the caller closed
    TimedOut,
    /// Fatal error
    Failed,
}

impl AuthState {
    /// Whether the handshake has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthState::Done | AuthState::Cancelled | AuthState::TimedOut | AuthState::Failed
        )
    }
}

/// External abort signal shared with [`CloseHandle`]s
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    fn new() -> Self {
        CloseSignal {
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if self.is_closed() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Handle for aborting a running handshake from another task
///
/// Idempotent: closing twice, or after the handshake already ended, has
/// no further effect and never errors. The blocking read observes the
/// signal and exits through the timeout-class path. A closed client
/// stays closed; start a new client for another attempt.
#[derive(Clone)]
pub struct CloseHandle {
    signal: Arc<CloseSignal>,
}

impl CloseHandle {
    /// Abort the handshake
    pub fn close(&self) {
        self.signal.close();
    }
}

/// Per-attempt protocol state
///
/// Owns the key pair, the peer-declared timing parameters and the
/// liveness machinery. The private key never leaves `keypair`.
struct Session {
    keypair: SessionKeypair,
    timeout_ms: u64,
    heartbeat_interval: u64,
    fingerprint: Option<String>,
    user: Option<UserData>,
    token: Option<String>,
    ack: Arc<AckFlag>,
    monitor: Option<LivenessMonitor>,
}

/// What one blocking read produced
enum ReadEvent {
    CloseRequested,
    ReadTimedOut,
    Frame(String),
    StreamEnded,
    StreamError(TransportError),
}

/// QR-code remote authentication client
///
/// Construct with a handler, optionally configure, then call
/// [`connect_and_wait`](RemoteAuthClient::connect_and_wait).
pub struct RemoteAuthClient {
    handler: Arc<dyn AuthHandler>,
    renderer: Box<dyn QrRenderer>,
    exchanger: Option<Box<dyn TicketExchanger>>,
    proxy: Option<ProxySpec>,
    state: AuthState,
    session: Option<Session>,
    signal: Arc<CloseSignal>,
}

impl RemoteAuthClient {
    /// Create a client with the fallback renderer and HTTPS exchanger
    pub fn new(handler: Arc<dyn AuthHandler>) -> Self {
        RemoteAuthClient {
            handler,
            renderer: Box::new(PlainTextRenderer),
            exchanger: None,
            proxy: None,
            state: AuthState::Connecting,
            session: None,
            signal: Arc::new(CloseSignal::new()),
        }
    }

    /// Route the ticket exchange through a proxy
    pub fn with_proxy(mut self, proxy: ProxySpec) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Replace the fallback renderer
    pub fn with_renderer(mut self, renderer: Box<dyn QrRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the ticket exchanger (tests, alternate endpoints)
    pub fn with_exchanger(mut self, exchanger: Box<dyn TicketExchanger>) -> Self {
        self.exchanger = Some(exchanger);
        self
    }

    /// Current protocol state
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Handle for aborting the handshake from another task
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            signal: self.signal.clone(),
        }
    }

    /// Abort the handshake; idempotent, safe in any state
    pub fn close(&self) {
        self.signal.close();
    }

    /// Connect to the gateway and block until a terminal outcome
    ///
    /// `Ok(Some(token))` on success. `Ok(None)` when the peer-side user
    /// cancelled, the deadline passed, or [`close`](Self::close) was
    /// called; [`state`](Self::state) records which. `Err` for the fatal
    /// taxonomy. Without a caller timeout, the peer-declared limit takes
    /// over once `hello` arrives.
    pub async fn connect_and_wait(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, AuthError> {
        // The whole handshake is pointless without a crypto backend
        if let Err(e) = crypto::ensure_available() {
            return self.fail(e.into());
        }

        self.state = AuthState::Connecting;
        let conn = match transport::websocket::connect(GATEWAY_URL).await {
            Ok(conn) => conn,
            Err(e) => return self.fail(e.into()),
        };

        self.run(conn, timeout).await
    }

    /// Drive the handshake over an already-established connection
    ///
    /// Seam used by `connect_and_wait` and by tests feeding frames
    /// through an in-memory pair.
    pub async fn run(
        &mut self,
        conn: Connection,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, AuthError> {
        let Connection { sink, mut stream } = conn;
        let sink: SharedSink = Arc::new(Mutex::new(sink));

        self.state = AuthState::AwaitHello;
        self.session = None;

        let result = self.dispatch(&sink, stream.as_mut(), timeout).await;

        // Single teardown funnel: every terminal path passes through here
        if let Some(session) = self.session.as_mut() {
            if let Some(monitor) = session.monitor.take() {
                monitor.stop().await;
            }
        }
        {
            let mut sink = sink.lock().await;
            let _ = sink.close().await;
        }
        self.session = None;

        match result {
            Ok(token) => Ok(token),
            Err(err) => self.fail(err),
        }
    }

    /// Record a fatal outcome and report it to the handler
    fn fail(&mut self, err: AuthError) -> Result<Option<String>, AuthError> {
        self.state = AuthState::Failed;
        self.handler.on_error(&err);
        Err(err)
    }

    async fn dispatch(
        &mut self,
        sink: &SharedSink,
        stream: &mut dyn FrameStream,
        caller_timeout: Option<Duration>,
    ) -> Result<Option<String>, AuthError> {
        let started = Instant::now();
        // The caller's deadline applies from the start; the peer-declared
        // one takes over at `hello` only if the caller supplied none.
        let mut effective: Option<Duration> = caller_timeout;
        let signal = self.signal.clone();

        loop {
            if signal.is_closed() {
                debug!("close requested, abandoning handshake");
                self.state = AuthState::TimedOut;
                return Ok(None);
            }
            if let Some(limit) = effective {
                if started.elapsed() >= limit {
                    info!("authentication deadline passed");
                    self.state = AuthState::TimedOut;
                    return Ok(None);
                }
            }

            // Adaptive read: shrink toward the deadline, never block
            // indefinitely, never busy-wait
            let read_timeout = match effective {
                Some(limit) => limit
                    .saturating_sub(started.elapsed())
                    .clamp(READ_TIMEOUT_MIN, READ_TIMEOUT_MAX),
                None => READ_TIMEOUT_MAX,
            };

            let event = tokio::select! {
                _ = signal.wait() => ReadEvent::CloseRequested,
                read = timeout(read_timeout, stream.next_frame()) => match read {
                    Err(_) => ReadEvent::ReadTimedOut,
                    Ok(Ok(Some(text))) => ReadEvent::Frame(text),
                    Ok(Ok(None)) => ReadEvent::StreamEnded,
                    Ok(Err(e)) => ReadEvent::StreamError(e),
                },
            };

            let text = match event {
                // Loop around; the checks at the top decide
                ReadEvent::CloseRequested | ReadEvent::ReadTimedOut => continue,
                ReadEvent::Frame(text) => text,
                ReadEvent::StreamEnded => return Ok(self.finish_closed()),
                ReadEvent::StreamError(e) => {
                    warn!("transport error: {e}");
                    return Ok(self.finish_closed());
                }
            };

            let frame = Inbound::parse(&text)
                .map_err(|e| AuthError::MalformedFrame(e.to_string()))?;

            match frame {
                Inbound::Hello {
                    timeout_ms,
                    heartbeat_interval,
                } => {
                    debug!(timeout_ms, heartbeat_interval, "session parameters received");
                    let mut session = Session {
                        keypair: SessionKeypair::generate()?,
                        timeout_ms,
                        heartbeat_interval,
                        fingerprint: None,
                        user: None,
                        token: None,
                        ack: Arc::new(AckFlag::new()),
                        monitor: None,
                    };
                    session.monitor = Some(LivenessMonitor::spawn(
                        sink.clone(),
                        Duration::from_millis(session.heartbeat_interval),
                        session.ack.clone(),
                    ));
                    let init = Outbound::Init {
                        encoded_public_key: session.keypair.public_key_b64().to_string(),
                    };
                    if effective.is_none() {
                        effective = Some(Duration::from_millis(session.timeout_ms));
                    }
                    self.session = Some(session);
                    self.send(sink, &init).await?;
                    self.state = AuthState::AwaitNonce;
                }

                Inbound::NonceProof { encrypted_nonce } => {
                    let proof = self.session_mut()?.keypair.nonce_proof(&encrypted_nonce)?;
                    self.send(sink, &Outbound::NonceProof { proof }).await?;
                    self.state = AuthState::AwaitFingerprint;
                }

                Inbound::PendingRemoteInit { fingerprint } => {
                    let session = self.session_mut()?;
                    let expected = compute_fingerprint(session.keypair.public_key_b64())?;
                    if fingerprint != expected {
                        warn!("fingerprint mismatch - possible MITM");
                        return Err(AuthError::FingerprintMismatch);
                    }
                    let url = qr_url(session.fingerprint.insert(fingerprint));
                    let rendered = self.renderer.render(&url);
                    info!("scannable code ready: {url}");
                    self.handler.on_qr_code(&url, &rendered);
                    self.state = AuthState::AwaitScan;
                }

                Inbound::PendingTicket {
                    encrypted_user_payload,
                } => {
                    if let Some(encrypted) = encrypted_user_payload {
                        let session = self.session_mut()?;
                        let payload = session.keypair.decrypt_b64(&encrypted)?;
                        let user = UserData::parse(&payload)?;
                        session.user = Some(user.clone());
                        info!("code scanned by {}", user.display_name());
                        self.handler.on_user_data(&user);
                    }
                    self.handler.on_waiting();
                    // Stays in AwaitScan; the frame may recur
                }

                Inbound::PendingLogin { ticket } => {
                    let session = self.session_mut()?;
                    let decrypted = session.keypair.decrypt_b64(&ticket)?;
                    let scanned_by = session.user.as_ref().map(UserData::display_name);
                    debug!("ticket decrypted, exchanging for authentication token");
                    let token = self.exchange_ticket(&decrypted).await?;
                    if let Some(session) = self.session.as_mut() {
                        session.token = Some(token.clone());
                    }
                    match scanned_by {
                        Some(name) => info!("remote auth successful for {name}"),
                        None => info!("remote auth successful"),
                    }
                    self.handler.on_token(&token);
                    self.state = AuthState::Done;
                    return Ok(Some(token));
                }

                Inbound::Cancel => {
                    info!("authentication cancelled by the peer-side user");
                    self.state = AuthState::Cancelled;
                    return Ok(None);
                }

                Inbound::Captcha {
                    captcha_sitekey,
                    captcha_service,
                    captcha_rqdata,
                    captcha_rqtoken,
                } => {
                    return Err(AuthError::CaptchaRequired(CaptchaChallenge {
                        sitekey: captcha_sitekey,
                        service: captcha_service,
                        rqdata: captcha_rqdata,
                        rqtoken: captcha_rqtoken,
                    }));
                }

                Inbound::HeartbeatAck => {
                    if let Some(session) = &self.session {
                        session.ack.mark_acked();
                    }
                }

                Inbound::Unknown => {
                    debug!("ignoring unknown opcode: {text}");
                }
            }
        }
    }

    async fn send(&self, sink: &SharedSink, frame: &Outbound) -> Result<(), AuthError> {
        let text = frame
            .encode()
            .map_err(|e| AuthError::MalformedFrame(e.to_string()))?;
        let mut sink = sink.lock().await;
        sink.send(text).await?;
        Ok(())
    }

    /// Terminal verdict for a closed or dead transport
    ///
    /// A close right after the final frame still counts as success;
    /// anything earlier is a timeout-class outcome, including a ticket
    /// decrypted but never exchanged, which is discarded rather than
    /// retried.
    fn finish_closed(&mut self) -> Option<String> {
        if let Some(token) = self.session.as_ref().and_then(|s| s.token.clone()) {
            self.state = AuthState::Done;
            return Some(token);
        }
        info!("connection closed before completion");
        self.state = AuthState::TimedOut;
        None
    }

    fn session_mut(&mut self) -> Result<&mut Session, AuthError> {
        self.session
            .as_mut()
            .ok_or_else(|| AuthError::MalformedFrame("frame received before hello".to_string()))
    }

    async fn exchange_ticket(&self, ticket: &str) -> Result<String, ExchangeError> {
        match &self.exchanger {
            Some(exchanger) => exchanger.exchange(ticket).await,
            None => {
                let exchanger = HttpExchanger::new(self.proxy.clone());
                exchanger.exchange(ticket).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::oaep_encrypt_b64;
    use crate::transport::memory;

    use std::sync::Mutex as StdMutex;

    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use serde_json::json;
    use sha2::{Digest, Sha256};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        QrCode(String, String),
        User(String),
        Token(String),
        Error(String),
        Waiting,
    }

    #[derive(Default)]
    struct Recording(StdMutex<Vec<Event>>);

    impl Recording {
        fn events(&self) -> Vec<Event> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, matcher: impl Fn(&Event) -> bool) -> usize {
            self.events().iter().filter(|e| matcher(e)).count()
        }
    }

    impl AuthHandler for Recording {
        fn on_qr_code(&self, url: &str, rendered: &str) {
            self.0
                .lock()
                .unwrap()
                .push(Event::QrCode(url.to_string(), rendered.to_string()));
        }
        fn on_user_data(&self, user: &UserData) {
            self.0.lock().unwrap().push(Event::User(user.display_name()));
        }
        fn on_token(&self, token: &str) {
            self.0.lock().unwrap().push(Event::Token(token.to_string()));
        }
        fn on_error(&self, error: &AuthError) {
            self.0.lock().unwrap().push(Event::Error(error.to_string()));
        }
        fn on_waiting(&self) {
            self.0.lock().unwrap().push(Event::Waiting);
        }
    }

    struct FakeExchanger {
        expected_ticket: String,
        token: String,
    }

    #[async_trait::async_trait]
    impl TicketExchanger for FakeExchanger {
        async fn exchange(&self, ticket: &str) -> Result<String, ExchangeError> {
            if ticket == self.expected_ticket {
                Ok(self.token.clone())
            } else {
                Err(ExchangeError::NoTokenInResponse)
            }
        }
    }

    struct TaggingRenderer;

    impl QrRenderer for TaggingRenderer {
        fn render(&self, url: &str) -> String {
            format!("RENDERED:{url}")
        }
    }

    async fn send_json(conn: &mut Connection, value: serde_json::Value) {
        conn.sink.send(value.to_string()).await.unwrap();
    }

    /// Next frame from the client, skipping keep-alives
    async fn recv_json(conn: &mut Connection) -> serde_json::Value {
        loop {
            let text = conn
                .stream
                .next_frame()
                .await
                .unwrap()
                .expect("client closed the connection");
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            if value["op"] == "heartbeat" {
                continue;
            }
            return value;
        }
    }

    #[tokio::test]
    async fn test_full_handshake_to_done() {
        let (client_conn, mut peer) = memory::create_pair();
        let handler = Arc::new(Recording::default());
        let mut client = RemoteAuthClient::new(handler.clone())
            .with_renderer(Box::new(TaggingRenderer))
            .with_exchanger(Box::new(FakeExchanger {
                expected_ticket: "ticket-123".to_string(),
                token: "token-abc".to_string(),
            }));

        let peer_task = tokio::spawn(async move {
            send_json(
                &mut peer,
                json!({"op": "hello", "timeout_ms": 300_000u64, "heartbeat_interval": 41_250u64}),
            )
            .await;

            let init = recv_json(&mut peer).await;
            assert_eq!(init["op"], "init");
            let public_key = init["encoded_public_key"].as_str().unwrap().to_string();

            send_json(
                &mut peer,
                json!({"op": "nonce_proof", "encrypted_nonce": oaep_encrypt_b64(&public_key, "the-nonce")}),
            )
            .await;

            let answer = recv_json(&mut peer).await;
            assert_eq!(answer["op"], "nonce_proof");
            let expected = URL_SAFE_NO_PAD.encode(Sha256::digest("the-nonce".as_bytes()));
            assert_eq!(answer["proof"].as_str().unwrap(), expected);

            let fingerprint = compute_fingerprint(&public_key).unwrap();
            send_json(
                &mut peer,
                json!({"op": "pending_remote_init", "fingerprint": fingerprint}),
            )
            .await;
            send_json(
                &mut peer,
                json!({"op": "pending_ticket", "encrypted_user_payload": oaep_encrypt_b64(&public_key, "171711111111111111:0:a1b2c3:alice")}),
            )
            .await;
            send_json(
                &mut peer,
                json!({"op": "pending_login", "ticket": oaep_encrypt_b64(&public_key, "ticket-123")}),
            )
            .await;

            fingerprint
        });

        let result = client.run(client_conn, Some(Duration::from_secs(60))).await;
        let fingerprint = peer_task.await.unwrap();

        assert_eq!(result.unwrap().as_deref(), Some("token-abc"));
        assert_eq!(client.state(), AuthState::Done);

        let url = qr_url(&fingerprint);
        assert_eq!(
            handler.events(),
            vec![
                Event::QrCode(url.clone(), format!("RENDERED:{url}")),
                Event::User("alice".to_string()),
                Event::Waiting,
                Event::Token("token-abc".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_fails_without_token() {
        let (client_conn, mut peer) = memory::create_pair();
        let handler = Arc::new(Recording::default());
        let mut client = RemoteAuthClient::new(handler.clone());

        let peer_task = tokio::spawn(async move {
            send_json(&mut peer, json!({"op": "hello"})).await;
            let init = recv_json(&mut peer).await;
            assert_eq!(init["op"], "init");
            send_json(
                &mut peer,
                json!({"op": "pending_remote_init", "fingerprint": "bogus-fingerprint"}),
            )
            .await;
            // Hold the connection open until the client reacts
            peer
        });

        let result = client.run(client_conn, Some(Duration::from_secs(60))).await;
        drop(peer_task.await.unwrap());

        assert!(matches!(result, Err(AuthError::FingerprintMismatch)));
        assert_eq!(client.state(), AuthState::Failed);
        assert_eq!(handler.count(|e| matches!(e, Event::Token(_))), 0);
        assert_eq!(handler.count(|e| matches!(e, Event::QrCode(..))), 0);
        assert_eq!(handler.count(|e| matches!(e, Event::Error(_))), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_a_benign_outcome() {
        let (client_conn, mut peer) = memory::create_pair();
        let handler = Arc::new(Recording::default());
        let mut client = RemoteAuthClient::new(handler.clone());

        let peer_task = tokio::spawn(async move {
            send_json(&mut peer, json!({"op": "hello"})).await;
            send_json(&mut peer, json!({"op": "cancel"})).await;
            peer
        });

        let result = client.run(client_conn, Some(Duration::from_secs(60))).await;
        drop(peer_task.await.unwrap());

        assert_eq!(result.unwrap(), None);
        assert_eq!(client.state(), AuthState::Cancelled);
        // Cancellation is not an error
        assert_eq!(handler.count(|e| matches!(e, Event::Error(_))), 0);
    }

    #[tokio::test]
    async fn test_captcha_carries_challenge_data() {
        let (client_conn, mut peer) = memory::create_pair();
        let mut client = RemoteAuthClient::new(Arc::new(Recording::default()));

        let peer_task = tokio::spawn(async move {
            send_json(&mut peer, json!({"op": "hello"})).await;
            send_json(
                &mut peer,
                json!({"op": "captcha", "captcha_sitekey": "key-1", "captcha_rqdata": "rq"}),
            )
            .await;
            peer
        });

        let result = client.run(client_conn, Some(Duration::from_secs(60))).await;
        drop(peer_task.await.unwrap());

        match result {
            Err(AuthError::CaptchaRequired(challenge)) => {
                assert_eq!(challenge.sitekey.as_deref(), Some("key-1"));
                assert_eq!(challenge.service, "hcaptcha");
                assert_eq!(challenge.rqdata.as_deref(), Some("rq"));
                assert_eq!(challenge.rqtoken, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(client.state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_opcodes_are_ignored() {
        let (client_conn, mut peer) = memory::create_pair();
        let mut client = RemoteAuthClient::new(Arc::new(Recording::default()));

        let peer_task = tokio::spawn(async move {
            send_json(&mut peer, json!({"op": "hello"})).await;
            send_json(&mut peer, json!({"op": "brand_new_op", "x": 1})).await;
            send_json(&mut peer, json!({"op": "cancel"})).await;
            peer
        });

        let result = client.run(client_conn, Some(Duration::from_secs(60))).await;
        drop(peer_task.await.unwrap());

        // The unknown frame did not derail the handshake
        assert_eq!(result.unwrap(), None);
        assert_eq!(client.state(), AuthState::Cancelled);
    }

    #[tokio::test]
    async fn test_frame_before_hello_is_a_protocol_error() {
        let (client_conn, mut peer) = memory::create_pair();
        let mut client = RemoteAuthClient::new(Arc::new(Recording::default()));

        let peer_task = tokio::spawn(async move {
            send_json(
                &mut peer,
                json!({"op": "nonce_proof", "encrypted_nonce": "abc"}),
            )
            .await;
            peer
        });

        let result = client.run(client_conn, Some(Duration::from_secs(60))).await;
        drop(peer_task.await.unwrap());

        assert!(matches!(result, Err(AuthError::MalformedFrame(_))));
        assert_eq!(client.state(), AuthState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_yields_no_token() {
        let (client_conn, _peer) = memory::create_pair();
        let mut client = RemoteAuthClient::new(Arc::new(Recording::default()));

        let result = client.run(client_conn, Some(Duration::from_secs(3))).await;

        assert_eq!(result.unwrap(), None);
        assert_eq!(client.state(), AuthState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_timeout_applies_after_hello() {
        let (client_conn, mut peer) = memory::create_pair();
        let handler = Arc::new(Recording::default());
        let mut client = RemoteAuthClient::new(handler.clone());

        // Buffered before the run; the peer then stays silent
        send_json(
            &mut peer,
            json!({"op": "hello", "timeout_ms": 2_000u64, "heartbeat_interval": 600_000u64}),
        )
        .await;

        let result = client.run(client_conn, None).await;

        assert_eq!(result.unwrap(), None);
        assert_eq!(client.state(), AuthState::TimedOut);
        // Timeout is not an error
        assert_eq!(handler.count(|e| matches!(e, Event::Error(_))), 0);
    }

    #[tokio::test]
    async fn test_transport_closed_without_token_times_out() {
        let (client_conn, peer) = memory::create_pair();
        let mut client = RemoteAuthClient::new(Arc::new(Recording::default()));

        drop(peer);

        let result = client.run(client_conn, Some(Duration::from_secs(60))).await;

        assert_eq!(result.unwrap(), None);
        assert_eq!(client.state(), AuthState::TimedOut);
    }

    #[tokio::test]
    async fn test_close_interrupts_and_is_idempotent() {
        let (client_conn, _peer) = memory::create_pair();
        let mut client = RemoteAuthClient::new(Arc::new(Recording::default()));
        let handle = client.close_handle();

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.close();
            handle.close();
            handle
        });

        // No deadline: only the close can end this
        let result = client.run(client_conn, None).await;
        let handle = closer.await.unwrap();

        assert_eq!(result.unwrap(), None);
        assert_eq!(client.state(), AuthState::TimedOut);

        // Closing after completion is still a no-op
        handle.close();
        client.close();
    }
}
