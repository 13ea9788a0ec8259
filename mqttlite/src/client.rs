//! QoS 0 MQTT subscriber client.
//!
//! A single-connection, fully sequential session: CONNECT/CONNACK, then
//! SUBSCRIBE/SUBACK, then a receive loop that dispatches matching PUBLISH
//! payloads and keeps the connection alive with PINGREQ when idle.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{BoxError, Error, Result};
use crate::protocol::v4::{ConnAck, Connect, Message, SubAck, Subscribe};
use crate::protocol::MAX_PACKET_SIZE;
use crate::reader::{read_exact, read_frame};
use crate::types::{MessageType, SessionState};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker address (host:port).
    pub addr: String,
    /// Client ID. Empty lets the broker assign one.
    pub client_id: String,
    /// Keep alive interval in seconds, sent in CONNECT.
    pub keep_alive: u16,
    /// Clean session flag.
    pub clean_session: bool,
    /// Topic filter to subscribe to.
    pub subscription: String,
    /// How long the receive loop waits for input before sending PINGREQ.
    pub idle_timeout: Duration,
    /// How long to wait for PINGRESP before logging a keepalive timeout.
    pub ping_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Maximum inbound body size.
    pub max_packet_size: usize,
}

impl ClientConfig {
    /// Create a new client config with the defaults used on the wire:
    /// empty client id, 60s keep alive, clean session, subscription `#`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            client_id: String::new(),
            keep_alive: 60,
            clean_session: true,
            subscription: "#".to_string(),
            idle_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            max_packet_size: MAX_PACKET_SIZE,
        }
    }

    /// Set client ID.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set keep alive interval.
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    /// Set clean session flag.
    pub fn with_clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Set the topic filter to subscribe to.
    pub fn with_subscription(mut self, filter: impl Into<String>) -> Self {
        self.subscription = filter.into();
        self
    }

    /// Set the idle wait before a ping is sent.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the wait for PINGRESP.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Set TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum inbound body size.
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    fn connect_message(&self) -> Connect {
        Connect {
            client_id: self.client_id.clone(),
            keep_alive: self.keep_alive,
            clean_session: self.clean_session,
        }
    }
}

/// Outcome of waiting for input.
enum Readiness {
    Ready,
    TimedOut,
    Cancelled,
}

/// QoS 0 MQTT subscriber session.
///
/// Owns the stream exclusively. Generic over the transport so the session
/// can run on anything that reads and writes bytes.
pub struct Client<S = TcpStream> {
    stream: BufReader<S>,
    config: ClientConfig,
    state: SessionState,
}

impl Client<TcpStream> {
    /// Open a TCP connection to the broker. No MQTT packets are exchanged yet.
    pub async fn open(config: ClientConfig) -> Result<Self> {
        debug!("Connecting to {}", config.addr);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.addr))
            .await
            .map_err(|_| Error::Timeout(format!("connect to {}", config.addr)))??;
        stream.set_nodelay(true)?;

        Ok(Self::new(stream, config))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    /// Wrap an already open stream.
    pub fn new(stream: S, config: ClientConfig) -> Self {
        Self {
            stream: BufReader::new(stream),
            config,
            state: SessionState::Disconnected,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send CONNECT and validate the CONNACK byte for byte.
    pub async fn connect(&mut self) -> Result<()> {
        self.expect_state(SessionState::Disconnected)?;
        self.state = SessionState::Connecting;

        let connect = Message::Connect(self.config.connect_message());
        let result = self
            .handshake("CONNACK", connect, Message::ConnAck(ConnAck::default()))
            .await;

        if let Err(Error::HandshakeFailed { got, .. }) = &result {
            if got[0] >> 4 == MessageType::ConnAck as u8 {
                if let Ok(connack) = ConnAck::decode(&got[2..]) {
                    warn!("Broker refused connection: return code {}", connack.code);
                }
            }
        }

        self.settle(result, SessionState::Connected)?;
        debug!("Connected to {}", self.config.addr);
        Ok(())
    }

    /// Send SUBSCRIBE for the configured filter and validate the SUBACK.
    pub async fn subscribe(&mut self) -> Result<()> {
        self.expect_state(SessionState::Connected)?;
        self.state = SessionState::Subscribing;

        let subscribe = Message::Subscribe(Subscribe::new(self.config.subscription.clone()));
        let result = self
            .handshake("SUBACK", subscribe, Message::SubAck(SubAck::default()))
            .await;

        if let Err(Error::HandshakeFailed { got, .. }) = &result {
            if got[0] >> 4 == MessageType::SubAck as u8 {
                if let Ok(suback) = SubAck::decode(&got[2..]) {
                    warn!("Subscription rejected: pkid={} code={:#04x}", suback.pkid, suback.granted_qos);
                }
            }
        }

        self.settle(result, SessionState::Active)?;
        debug!("Subscribed to {}", self.config.subscription);
        Ok(())
    }

    /// Run the receive loop until cancelled or a fatal error.
    ///
    /// Every PUBLISH whose topic ends with `topic_suffix` has its payload
    /// parsed as JSON and handed to `on_message`. An error from the callback
    /// ends the loop. Returns `Ok(())` only when `cancel` fires.
    ///
    /// PINGREQ is sent only after `idle_timeout` without inbound data, so a
    /// steady publish stream means the client itself never sends within
    /// `keep_alive`; brokers that enforce keep alive on client traffic
    /// will drop such a session after 1.5x `keep_alive`.
    pub async fn run<F>(
        &mut self,
        topic_suffix: &str,
        cancel: &CancellationToken,
        mut on_message: F,
    ) -> Result<()>
    where
        F: FnMut(Value) -> std::result::Result<(), BoxError>,
    {
        self.expect_state(SessionState::Active)?;

        let result = self.receive_loop(topic_suffix, cancel, &mut on_message).await;
        if result.is_err() {
            self.state = SessionState::Closed;
        }
        result
    }

    /// Send DISCONNECT (if a session was established) and close the stream.
    pub async fn disconnect(&mut self) -> Result<()> {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        match previous {
            SessionState::Closed => return Ok(()),
            SessionState::Disconnected => {}
            _ => {
                debug!("Disconnecting");
                self.send(&Message::Disconnect).await?;
            }
        }
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }

    async fn receive_loop<F>(
        &mut self,
        topic_suffix: &str,
        cancel: &CancellationToken,
        on_message: &mut F,
    ) -> Result<()>
    where
        F: FnMut(Value) -> std::result::Result<(), BoxError>,
    {
        loop {
            match self.wait_readable(self.config.idle_timeout, cancel).await? {
                Readiness::Cancelled => break,
                Readiness::Ready => self.dispatch(topic_suffix, on_message).await?,
                Readiness::TimedOut => {
                    info!("Sending ping");
                    self.send(&Message::PingReq).await?;

                    match self.wait_readable(self.config.ping_timeout, cancel).await? {
                        Readiness::Cancelled => break,
                        Readiness::Ready => self.expect_exact("PINGRESP", &Message::PingResp).await?,
                        Readiness::TimedOut => {
                            warn!("Ping timeout: no PINGRESP within {:?}", self.config.ping_timeout)
                        }
                    }
                }
            }
        }

        debug!("Receive loop cancelled");
        Ok(())
    }

    /// Read one frame and hand a matching publish to the callback.
    async fn dispatch<F>(&mut self, topic_suffix: &str, on_message: &mut F) -> Result<()>
    where
        F: FnMut(Value) -> std::result::Result<(), BoxError>,
    {
        let frame = read_frame(&mut self.stream, self.config.max_packet_size).await?;

        match Message::decode(frame.header.type_and_flags, frame.body) {
            Ok(Message::Publish(publish)) => {
                debug!("Received topic={} ({} bytes)", publish.topic, publish.payload.len());
                if publish.topic.ends_with(topic_suffix) {
                    let value: Value = serde_json::from_slice(&publish.payload)?;
                    on_message(value).map_err(Error::Callback)?;
                }
                Ok(())
            }
            Ok(other) => {
                trace!("Ignoring {:?}", other.message_type());
                Ok(())
            }
            Err(Error::UnhandledMessageType(t)) => {
                warn!(
                    "Skipping unhandled message type {} ({} bytes)",
                    t, frame.header.remaining_length
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Wait until input is buffered, the timeout elapses, or `cancel` fires.
    ///
    /// Buffered bytes are kept, so a timed-out wait loses nothing.
    async fn wait_readable(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Readiness> {
        let stream = &mut self.stream;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Readiness::Cancelled),
            ready = tokio::time::timeout(timeout, stream.fill_buf()) => match ready {
                Ok(Ok(buf)) if buf.is_empty() => Err(Error::ConnectionClosed),
                Ok(Ok(_)) => Ok(Readiness::Ready),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Ok(Readiness::TimedOut),
            },
        }
    }

    async fn handshake(&mut self, step: &'static str, request: Message, expected: Message) -> Result<()> {
        self.send(&request).await?;
        self.expect_exact(step, &expected).await
    }

    /// Read exactly the encoding of `expected` and compare byte for byte.
    async fn expect_exact(&mut self, step: &'static str, expected: &Message) -> Result<()> {
        let expected = expected.encode()?;
        let got = read_exact(&mut self.stream, expected.len()).await?;
        if got != expected {
            return Err(Error::HandshakeFailed { step, expected, got });
        }
        trace!("Received expected {}", step);
        Ok(())
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        let bytes = message.encode()?;
        trace!("Sending {:?} ({} bytes)", message.message_type(), bytes.len());

        let stream = self.stream.get_mut();
        stream.write_all(&bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn settle(&mut self, result: Result<()>, next: SessionState) -> Result<()> {
        match result {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e)
            }
        }
    }
}
