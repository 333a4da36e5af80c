//! In-process KNXnet/IP server for the integration tests.
//!
//! The server answers the secure handshake with a [`SessionResponder`],
//! accepts one tunnel connection, acknowledges a configurable number of
//! keep-alives and records every telegram the client sends. Tests drive
//! it through a [`ServerHandle`].

#![allow(dead_code, reason = "shared by several test binaries")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use knx_link::net::{MemoryTransport, Transport};
use knx_link::protocol::cemi::{GroupService, LDataFrame};
use knx_link::protocol::constants::{CEMIMessageCode, ServiceType};
use knx_link::protocol::frame::{Hpai, KnxnetIpFrame};
use knx_link::protocol::services::{
    ConnectResponse, ConnectionHeader, ConnectionStateResponse, DisconnectResponse, TunnelingRequest,
};
use knx_link::secure::{SecretKey, SecureCredentials, SessionResponder, SessionState};
use knx_link::{GroupAddress, IndividualAddress, LinkConfig, NetworkLink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const CHANNEL_ID: u8 = 7;
pub const USER_ID: u8 = 2;
pub const USER_KEY: [u8; 16] = [0x42; 16];
pub const DEVICE_CODE: [u8; 16] = [0xDA; 16];
pub const SERIAL: [u8; 6] = [0x00, 0xFA, 0x01, 0x02, 0x03, 0x04];

/// Address the server assigns to the tunnel (1.1.250)
pub fn tunnel_address() -> IndividualAddress {
    IndividualAddress::from(0x11FA)
}

/// Another device on the bus (1.1.5)
pub fn peer_address() -> IndividualAddress {
    IndividualAddress::from(0x1105)
}

/// Client credentials matching the server
pub fn credentials() -> SecureCredentials {
    SecureCredentials::new(
        USER_ID,
        SecretKey::from_bytes(USER_KEY),
        SecretKey::from_bytes(DEVICE_CODE),
        SERIAL,
    )
    .expect("valid credentials")
}

/// Secure tunneling config without keep-alives
pub fn secure_config() -> LinkConfig {
    LinkConfig::tunneling()
        .with_security(credentials())
        .with_keep_alive(Duration::ZERO, Duration::ZERO)
}

/// A group telegram as the bus would deliver it
pub fn bus_telegram(service: GroupService, group: GroupAddress, data: &[u8]) -> LDataFrame {
    LDataFrame::group(service, peer_address(), group, data, true)
        .expect("valid telegram")
        .with_message_code(CEMIMessageCode::LDataInd)
}

/// What the server saw
#[derive(Debug, Default)]
pub struct ServerLog {
    pub heartbeats: usize,
    pub disconnect_requested: bool,
    pub session_closed: bool,
}

#[derive(Debug)]
enum Command {
    Indicate(LDataFrame),
    Corrupt(LDataFrame),
    ReplayLast,
    CloseSession,
}

/// Handle to a running server task
#[derive(Debug)]
pub struct ServerHandle {
    pub telegrams: mpsc::UnboundedReceiver<LDataFrame>,
    pub log: Arc<Mutex<ServerLog>>,
    pub task: JoinHandle<()>,
    commands: mpsc::UnboundedSender<Command>,
}

impl ServerHandle {
    /// Put a telegram on the bus; the server forwards it to the client
    pub fn indicate(&self, frame: LDataFrame) {
        self.commands.send(Command::Indicate(frame)).expect("server running");
    }

    /// Send the last frame again, byte for byte
    pub fn replay_last(&self) {
        self.commands.send(Command::ReplayLast).expect("server running");
    }

    /// Send a telegram whose wrapper fails authentication
    pub fn corrupt(&self, frame: LDataFrame) {
        self.commands.send(Command::Corrupt(frame)).expect("server running");
    }

    /// End the secure session with a wrapped `SESSION_STATUS(CLOSE)`
    pub fn close_session(&self) {
        self.commands.send(Command::CloseSession).expect("server running");
    }

    /// Next telegram sent by the client
    pub async fn next_telegram(&mut self) -> LDataFrame {
        tokio::time::timeout(Duration::from_secs(5), self.telegrams.recv())
            .await
            .expect("telegram within 5s")
            .expect("server running")
    }

    pub fn heartbeats(&self) -> usize {
        self.log.lock().unwrap().heartbeats
    }
}

/// Server behavior
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub secure: bool,
    /// Keep-alives answered before the server goes quiet
    pub heartbeat_acks: usize,
    pub device_code: [u8; 16],
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            secure: true,
            heartbeat_acks: usize::MAX,
            device_code: DEVICE_CODE,
        }
    }
}

struct Server {
    transport: MemoryTransport,
    responder: Option<SessionResponder>,
    heartbeat_acks: usize,
    send_sequence: u8,
    last_sent: Option<Vec<u8>>,
    telegrams: mpsc::UnboundedSender<LDataFrame>,
    log: Arc<Mutex<ServerLog>>,
}

impl Server {
    async fn reply(&mut self, plain: Vec<u8>) {
        let wire = match self.responder.as_mut() {
            Some(responder) => match responder.wrap(&plain) {
                Ok(wire) => wire,
                Err(_) => return,
            },
            None => plain,
        };
        self.transmit(wire).await;
    }

    async fn transmit(&mut self, wire: Vec<u8>) {
        let _ = self.transport.send(&wire).await;
        self.last_sent = Some(wire);
    }

    async fn handle(&mut self, frame: Vec<u8>) {
        let plain = match self.responder.as_mut() {
            None => frame,
            Some(responder) => match responder.state() {
                SessionState::Idle => {
                    if let Ok(reply) = responder.handle_request(&frame) {
                        self.transmit(reply).await;
                    }
                    return;
                }
                SessionState::Handshaking => {
                    if let Ok(reply) = responder.handle_authenticate(&frame) {
                        self.transmit(reply).await;
                    }
                    return;
                }
                SessionState::Established => match responder.unwrap_frame(&frame) {
                    Ok(plain) => plain,
                    Err(err) => {
                        if err.is_session_closed() {
                            self.log.lock().unwrap().session_closed = true;
                        }
                        return;
                    }
                },
                SessionState::Closed => return,
            },
        };

        let Ok(parsed) = KnxnetIpFrame::parse(&plain) else {
            return;
        };
        match parsed.service_type() {
            ServiceType::ConnectRequest => {
                let response = ConnectResponse::accepted(CHANNEL_ID, Hpai::tcp_route_back(), tunnel_address());
                self.reply(response.build().unwrap()).await;
            }
            ServiceType::ConnectionstateRequest => {
                let count = {
                    let mut log = self.log.lock().unwrap();
                    log.heartbeats += 1;
                    log.heartbeats
                };
                if count <= self.heartbeat_acks {
                    let response = ConnectionStateResponse {
                        channel_id: CHANNEL_ID,
                        status: 0,
                    };
                    self.reply(response.build().unwrap()).await;
                }
            }
            ServiceType::TunnellingRequest => {
                let request = TunnelingRequest::parse(parsed.body()).unwrap();
                let frame = LDataFrame::parse(request.cemi_data).unwrap();
                let _ = self.telegrams.send(frame);
            }
            ServiceType::DisconnectRequest => {
                self.log.lock().unwrap().disconnect_requested = true;
                let response = DisconnectResponse {
                    channel_id: CHANNEL_ID,
                    status: 0,
                };
                self.reply(response.build().unwrap()).await;
            }
            _ => {}
        }
    }

    fn tunneling_request(&mut self, frame: &LDataFrame) -> Vec<u8> {
        let cemi = frame.encode().unwrap();
        let header = ConnectionHeader::new(CHANNEL_ID, self.send_sequence);
        self.send_sequence = self.send_sequence.wrapping_add(1);
        TunnelingRequest::new(header, &cemi).build().unwrap()
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Indicate(frame) => {
                let request = self.tunneling_request(&frame);
                self.reply(request).await;
            }
            Command::Corrupt(frame) => {
                let request = self.tunneling_request(&frame);
                let Some(responder) = self.responder.as_mut() else {
                    return;
                };
                let mut wire = responder.wrap(&request).unwrap();
                let last = wire.len() - 1;
                wire[last] ^= 0xFF;
                self.transmit(wire).await;
            }
            Command::CloseSession => {
                if let Some(close) = self.responder.as_mut().and_then(SessionResponder::close) {
                    self.transmit(close).await;
                }
            }
            Command::ReplayLast => {
                if let Some(wire) = self.last_sent.clone() {
                    let _ = self.transport.send(&wire).await;
                }
            }
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                received = self.transport.recv() => match received {
                    Ok(frame) => self.handle(frame).await,
                    Err(_) => return,
                },
                Some(command) = commands.recv() => self.execute(command).await,
            }
        }
    }
}

/// Start a server on one end of a transport pair, returning the other end
pub fn spawn_server(options: ServerOptions) -> (MemoryTransport, ServerHandle) {
    let (client, transport) = MemoryTransport::pair();
    let responder = options.secure.then(|| {
        let mut responder = SessionResponder::new(SecretKey::from_bytes(options.device_code), SERIAL);
        responder.add_user(USER_ID, SecretKey::from_bytes(USER_KEY));
        responder
    });
    let (telegram_tx, telegrams) = mpsc::unbounded_channel();
    let (commands, command_rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(ServerLog::default()));

    let server = Server {
        transport,
        responder,
        heartbeat_acks: options.heartbeat_acks,
        send_sequence: 0,
        last_sent: None,
        telegrams: telegram_tx,
        log: Arc::clone(&log),
    };
    let task = tokio::spawn(server.run(command_rx));

    (
        client,
        ServerHandle {
            telegrams,
            log,
            task,
            commands,
        },
    )
}

/// Open a link to a fresh server
pub async fn open_link(options: ServerOptions, config: &LinkConfig) -> (NetworkLink, ServerHandle) {
    let (client, server) = spawn_server(options);
    let link = NetworkLink::open(Arc::new(client), config)
        .await
        .expect("link opens");
    (link, server)
}

/// Poll `condition` until it holds or five seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
