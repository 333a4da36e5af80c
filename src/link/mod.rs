//! Network link: decoded telegrams over any transport.
//!
//! A [`NetworkLink`] owns one [`Transport`] and everything needed to talk
//! over it: the optional secure session, the tunnel connection and their
//! sequence counters. All of that state sits behind one async mutex, so
//! concurrent senders are serialized together with the counters they bump.
//!
//! ## Lifecycle
//!
//! ```text
//! open ──> [secure handshake] ──> [tunnel CONNECT] ──> open ──> close / failure
//!                                                       │
//!                         receive task ─────────────────┤ events (broadcast)
//!                         keep-alive task ──────────────┘
//! ```
//!
//! One receive task decodes incoming frames and publishes [`LinkEvent`]s in
//! receive order. A keep-alive task sends `CONNECTIONSTATE_REQUEST`s and
//! closes the link with [`DisconnectReason::SessionTimeout`] when an
//! acknowledgment is missed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use knx_link::config::LinkConfig;
//! use knx_link::link::{LinkEvent, NetworkLink};
//! use knx_link::net::MemoryTransport;
//!
//! # async fn run() -> knx_link::Result<()> {
//! let (transport, _server) = MemoryTransport::pair();
//! let link = NetworkLink::open(Arc::new(transport), &LinkConfig::tunneling()).await?;
//! let mut events = link.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let LinkEvent::Indication(frame) = event {
//!         println!("{:?} -> {:?}", frame.source, frame.destination);
//!     }
//! }
//! link.close().await;
//! # Ok(())
//! # }
//! ```

pub mod event;

pub use event::{DisconnectReason, LinkEvent};

use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};

use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::time::{timeout, timeout_at, Instant};

use crate::addressing::IndividualAddress;
use crate::config::{LinkConfig, Medium};
use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::net::transport::Transport;
use crate::protocol::cemi::LDataFrame;
use crate::protocol::constants::{CEMIMessageCode, ServiceType};
use crate::protocol::frame::KnxnetIpFrame;
use crate::protocol::services::{DisconnectResponse, RoutingIndication};
use crate::protocol::tunnel::{Connected, TunnelClient};
use crate::secure::session::{SecureSession, SessionState};

/// State shared by senders and the receive task
#[derive(Debug)]
struct ChannelState {
    tunnel: Option<TunnelClient<Connected>>,
    session: Option<SecureSession>,
}

impl ChannelState {
    /// Wrap an outgoing frame when a session is in use
    fn seal(&mut self, frame: Vec<u8>) -> Result<Vec<u8>> {
        match self.session.as_mut() {
            Some(session) => session.wrap(&frame),
            None => Ok(frame),
        }
    }

    /// Unwrap an incoming frame when a session is in use
    fn unseal(&mut self, frame: Vec<u8>) -> Result<Vec<u8>> {
        match self.session.as_mut() {
            Some(session) => session.unwrap_frame(&frame),
            None => Ok(frame),
        }
    }

    /// Tear everything down, returning the goodbye frames still worth sending
    fn shut(&mut self, reason: DisconnectReason) -> Vec<Vec<u8>> {
        let polite = reason == DisconnectReason::Requested;
        let mut frames = Vec::new();

        if let Some(tunnel) = self.tunnel.take() {
            if polite {
                if let Ok((closing, request)) = tunnel.disconnect() {
                    frames.extend(self.seal(request));
                    closing.finish();
                }
            }
        }
        if let Some(session) = self.session.as_mut() {
            if reason == DisconnectReason::SessionTimeout {
                session.expire();
            } else if let Some(close) = session.close() {
                if polite {
                    frames.push(close);
                }
            }
        }
        frames
    }
}

#[derive(Debug)]
struct LinkInner {
    transport: Arc<dyn Transport>,
    medium: Medium,
    address: IndividualAddress,
    response_timeout: Duration,
    channel: Mutex<ChannelState>,
    events: broadcast::Sender<LinkEvent>,
    first_subscriber: std::sync::Mutex<Option<broadcast::Receiver<LinkEvent>>>,
    closed: AtomicBool,
    stop: watch::Sender<bool>,
    keep_alive_ack: Notify,
}

/// An open connection to the bus.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Debug, Clone)]
pub struct NetworkLink {
    inner: Arc<LinkInner>,
}

impl NetworkLink {
    /// Establish the channel over `transport`.
    ///
    /// Runs the secure handshake when `config` carries credentials, then
    /// connects the tunnel (routing needs neither).
    ///
    /// # Errors
    ///
    /// A link error whose cause is the underlying failure: a transport error,
    /// a handshake error (authentication, refused tunnel, timeout) or an
    /// unsupported medium for secure routing.
    pub async fn open(transport: Arc<dyn Transport>, config: &LinkConfig) -> Result<Self> {
        if config.medium == Medium::Routing && config.is_secure() {
            return Err(KnxError::unsupported_medium());
        }

        let mut channel = ChannelState {
            tunnel: None,
            session: None,
        };
        if let Err(err) = establish(transport.as_ref(), config, &mut channel).await {
            knx_log!(warn, "Could not open link: {}", err);
            channel.shut(DisconnectReason::TransportLost);
            transport.close().await;
            return Err(err);
        }

        let address = channel
            .tunnel
            .as_ref()
            .and_then(|tunnel| tunnel.tunnel_address())
            .unwrap_or(config.individual_address);
        let (events, first_subscriber) = broadcast::channel(config.event_capacity.max(1));
        let inner = Arc::new(LinkInner {
            transport,
            medium: config.medium,
            address,
            response_timeout: config.response_timeout,
            channel: Mutex::new(channel),
            events,
            first_subscriber: std::sync::Mutex::new(Some(first_subscriber)),
            closed: AtomicBool::new(false),
            stop: watch::Sender::new(false),
            keep_alive_ack: Notify::new(),
        });

        let _ = inner.events.send(LinkEvent::Connected);
        tokio::spawn(receive_loop(
            Arc::downgrade(&inner),
            Arc::clone(&inner.transport),
            inner.stop.subscribe(),
        ));
        if config.medium == Medium::Tunneling && !config.keep_alive_interval.is_zero() {
            tokio::spawn(keep_alive_loop(
                Arc::downgrade(&inner),
                inner.stop.subscribe(),
                config.keep_alive_interval,
                config.keep_alive_timeout,
            ));
        }

        knx_log!(info, "Link open as {} ({:?}, secure: {})", address, config.medium, config.is_secure());
        Ok(Self { inner })
    }

    /// Receive link events.
    ///
    /// The first subscriber also sees the initial [`LinkEvent::Connected`];
    /// later subscribers only see events published after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        let first = self
            .inner
            .first_subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        first.unwrap_or_else(|| self.inner.events.subscribe())
    }

    /// Send a telegram.
    ///
    /// # Errors
    ///
    /// A link-closed error once the link is closed; a link transport error
    /// if the transport rejects the frame.
    pub async fn send(&self, frame: &LDataFrame) -> Result<()> {
        if self.is_closed() {
            return Err(KnxError::link_closed());
        }
        let cemi = frame.encode()?;

        let mut channel = self.inner.channel.lock().await;
        if self.is_closed() {
            return Err(KnxError::link_closed());
        }
        let plain = match self.inner.medium {
            Medium::Tunneling => channel
                .tunnel
                .as_mut()
                .ok_or_else(KnxError::link_closed)?
                .send_tunneling_request(&cemi)?,
            Medium::Routing => RoutingIndication { cemi_data: &cemi }.build()?,
        };
        let wire = channel.seal(plain).map_err(|err| {
            if err.is_session_closed() || err.is_session_timeout() {
                KnxError::link_closed()
            } else {
                err
            }
        })?;
        self.inner
            .transport
            .send(&wire)
            .await
            .map_err(KnxError::link_transport)
    }

    /// Close the link. Closing twice, or after a failure, does nothing.
    ///
    /// Dropping the last handle also closes the link, but without the
    /// goodbye frames and without a [`LinkEvent::Disconnected`].
    pub async fn close(&self) {
        self.inner.terminate(DisconnectReason::Requested).await;
    }

    /// Whether the link was closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Source address for outgoing telegrams (assigned by the server if it
    /// reported one)
    pub fn individual_address(&self) -> IndividualAddress {
        self.inner.address
    }

    /// Medium the link runs on
    pub fn medium(&self) -> Medium {
        self.inner.medium
    }

    /// Configured bound for read responses
    pub fn response_timeout(&self) -> Duration {
        self.inner.response_timeout
    }

    /// State of the secure session, if the link is secure
    pub async fn session_state(&self) -> Option<SessionState> {
        self.inner
            .channel
            .lock()
            .await
            .session
            .as_ref()
            .map(SecureSession::state)
    }
}

impl LinkInner {
    /// Close once for `reason`, then publish the disconnect
    async fn terminate(&self, reason: DisconnectReason) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.send_replace(true);

        let goodbye = self.channel.lock().await.shut(reason);
        for frame in goodbye {
            if let Err(err) = self.transport.send(&frame).await {
                knx_log!(debug, "Could not send goodbye frame: {}", err);
                break;
            }
        }
        self.transport.close().await;

        knx_log!(info, "Link closed: {:?}", reason);
        let _ = self.events.send(LinkEvent::Disconnected(reason));
    }

    fn drop_frame(&self, err: KnxError) {
        knx_log!(warn, "Dropped received frame: {}", err);
        let _ = self.events.send(LinkEvent::FrameDropped(Arc::new(err)));
    }

    fn deliver(&self, cemi: &[u8]) {
        match LDataFrame::parse(cemi) {
            Ok(frame) if frame.message_code == CEMIMessageCode::LDataInd => {
                let _ = self.events.send(LinkEvent::Indication(frame));
            }
            Ok(frame) => knx_log!(trace, "Skipping {:?} telegram", frame.message_code),
            Err(err) => self.drop_frame(err),
        }
    }

    /// Process one received frame; `Some` ends the link
    async fn handle_frame(&self, frame: Vec<u8>) -> Option<DisconnectReason> {
        let mut channel = self.channel.lock().await;
        let plain = match channel.unseal(frame) {
            Ok(plain) => plain,
            Err(err) if err.is_session_closed() => return Some(DisconnectReason::SessionClosed),
            Err(err) => {
                self.drop_frame(err);
                let ended = channel
                    .session
                    .as_ref()
                    .is_some_and(|session| session.state() == SessionState::Closed);
                return ended.then_some(DisconnectReason::SessionClosed);
            }
        };

        let parsed = match KnxnetIpFrame::parse(&plain) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.drop_frame(err);
                return None;
            }
        };

        match parsed.service_type() {
            ServiceType::TunnellingRequest => {
                let Some(tunnel) = channel.tunnel.as_mut() else {
                    return None;
                };
                match tunnel.handle_tunneling_indication(parsed.body()) {
                    Ok(cemi) => self.deliver(cemi),
                    Err(err) => self.drop_frame(err),
                }
            }
            ServiceType::RoutingIndication if self.medium == Medium::Routing => {
                self.deliver(RoutingIndication::parse(parsed.body()).cemi_data);
            }
            ServiceType::ConnectionstateResponse => {
                let tunnel = channel.tunnel.as_ref()?;
                if tunnel.handle_heartbeat_response(parsed.body()).is_err() {
                    knx_log!(warn, "Server reports tunnel channel {} lost", tunnel.channel_id());
                    return Some(DisconnectReason::ServerDisconnect);
                }
                self.keep_alive_ack.notify_waiters();
            }
            ServiceType::DisconnectRequest => {
                if let Some(tunnel) = channel.tunnel.take() {
                    let response = DisconnectResponse {
                        channel_id: tunnel.channel_id(),
                        status: 0,
                    }
                    .build()
                    .and_then(|frame| channel.seal(frame));
                    if let Ok(response) = response {
                        if let Err(err) = self.transport.send(&response).await {
                            knx_log!(debug, "Could not answer disconnect: {}", err);
                        }
                    }
                }
                return Some(DisconnectReason::ServerDisconnect);
            }
            ServiceType::SessionStatus => knx_log!(trace, "Session keep-alive from server"),
            other => knx_log!(debug, "Ignoring {:?}", other),
        }
        None
    }

    async fn send_keep_alive(&self) -> Result<()> {
        let mut channel = self.channel.lock().await;
        let heartbeat = channel
            .tunnel
            .as_ref()
            .ok_or_else(KnxError::link_closed)?
            .heartbeat()?;
        let frame = channel.seal(heartbeat)?;
        self.transport.send(&frame).await
    }
}

impl Drop for LinkInner {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.send_replace(true);
        self.channel.get_mut().shut(DisconnectReason::TransportLost);

        let transport = Arc::clone(&self.transport);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { transport.close().await });
            }
            Err(_) => knx_log!(warn, "Link dropped outside a runtime, transport left to its owner"),
        }
        knx_log!(debug, "Link dropped without close");
    }
}

/// Decode incoming frames until the link ends.
///
/// Holds the link weakly so dropping every handle ends the task.
async fn receive_loop(link: Weak<LinkInner>, transport: Arc<dyn Transport>, mut stop: watch::Receiver<bool>) {
    loop {
        let received = tokio::select! {
            received = transport.recv() => received,
            _ = stop.changed() => return,
        };
        let Some(inner) = link.upgrade() else {
            return;
        };
        let reason = match received {
            Ok(frame) => inner.handle_frame(frame).await,
            Err(err) => {
                knx_log!(warn, "Transport failed: {}", err);
                Some(DisconnectReason::TransportLost)
            }
        };
        if let Some(reason) = reason {
            inner.terminate(reason).await;
            return;
        }
    }
}

async fn keep_alive_loop(
    link: Weak<LinkInner>,
    mut stop: watch::Receiver<bool>,
    interval: Duration,
    wait: Duration,
) {
    loop {
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = stop.changed() => return,
        }
        let Some(inner) = link.upgrade() else {
            return;
        };

        let acked = inner.keep_alive_ack.notified();
        tokio::pin!(acked);
        acked.as_mut().enable();

        if let Err(err) = inner.send_keep_alive().await {
            knx_log!(warn, "Could not send keep-alive: {}", err);
            inner.terminate(DisconnectReason::TransportLost).await;
            return;
        }
        tokio::select! {
            acked = timeout(wait, acked.as_mut()) => {
                if acked.is_err() {
                    knx_log!(warn, "No keep-alive acknowledgment within {:?}", wait);
                    inner.terminate(DisconnectReason::SessionTimeout).await;
                    return;
                }
                knx_log!(trace, "Keep-alive acknowledged");
            }
            _ = stop.changed() => return,
        }
    }
}

/// Handshake and connect on a fresh transport
async fn establish(transport: &dyn Transport, config: &LinkConfig, channel: &mut ChannelState) -> Result<()> {
    let deadline = config.connect_timeout;

    if let Some(credentials) = &config.security {
        let session = channel.session.insert(SecureSession::new(credentials.clone()));
        let request = session.request().map_err(KnxError::link_handshake)?;
        let response = exchange(transport, &request, deadline).await?;
        let authenticate = session.handle_response(&response).map_err(KnxError::link_handshake)?;
        let status = exchange(transport, &authenticate, deadline).await?;
        session.handle_status(&status).map_err(KnxError::link_handshake)?;
    }

    if config.medium == Medium::Tunneling {
        let tunnel = connect_tunnel(transport, channel, deadline).await?;
        channel.tunnel = Some(tunnel);
    }
    Ok(())
}

/// Send one handshake frame and wait for the answer
async fn exchange(transport: &dyn Transport, frame: &[u8], wait: Duration) -> Result<Vec<u8>> {
    transport.send(frame).await.map_err(KnxError::link_transport)?;
    match timeout(wait, transport.recv()).await {
        Ok(received) => received.map_err(KnxError::link_transport),
        Err(_) => Err(KnxError::link_handshake(KnxError::connection_timeout())),
    }
}

async fn connect_tunnel(
    transport: &dyn Transport,
    channel: &mut ChannelState,
    wait: Duration,
) -> Result<TunnelClient<Connected>> {
    let (client, request) = TunnelClient::new().connect().map_err(KnxError::link_handshake)?;
    let request = channel.seal(request).map_err(KnxError::link_handshake)?;
    transport.send(&request).await.map_err(KnxError::link_transport)?;

    let deadline = Instant::now() + wait;
    loop {
        let frame = match timeout_at(deadline, transport.recv()).await {
            Ok(received) => received.map_err(KnxError::link_transport)?,
            Err(_) => return Err(KnxError::link_handshake(KnxError::connection_timeout())),
        };
        let plain = channel.unseal(frame).map_err(KnxError::link_handshake)?;
        let parsed = KnxnetIpFrame::parse(&plain).map_err(KnxError::link_handshake)?;
        if parsed.service_type() == ServiceType::ConnectResponse {
            return client
                .handle_connect_response(parsed.body())
                .map_err(KnxError::link_handshake);
        }
        knx_log!(debug, "Ignoring {:?} while connecting", parsed.service_type());
    }
}
