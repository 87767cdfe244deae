//! One live connection to a remote peer.
//!
//! A connection is a pair of tasks sharing a [PeerHandle]: the writer drains the outbound queue into
//! the framed transport, and the reader dispatches every inbound frame. Only the reader mutates the
//! peer's cached state from the wire; either side may end the connection, after which all of its
//! pending requests are failed and the table is told through a [PeerEvent].
use super::config::PeerTableConfig;
use super::correlation::ReplyHandle;
use super::ledger::{LedgerContext, LedgerView};
use super::peer::{ConnectionState, Direction, PeerState, PeerSummary};
use super::prelude::*;
use actix_derive::Message;

use crate::ucp::{DecodeError, Frame, UcpCodec};

use futures::stream::{SplitSink, SplitStream};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// A command from a peer which neither answers a request nor reports state.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct InboundCommand {
    pub peer: Id,
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Disconnected { id: Id, serial: u64 },
}

/// What the table shares with every connection.
pub struct ConnectionContext {
    pub config: Arc<PeerTableConfig>,
    pub ledger: Arc<LedgerView>,
    pub dispatcher: Option<Recipient<InboundCommand>>,
    pub events: mpsc::UnboundedSender<PeerEvent>,
    /// Height announced in our handshakes.
    pub local_height: AtomicU32,
}

#[derive(Clone)]
pub struct PeerHandle {
    id: Id,
    addr: SocketAddr,
    direction: Direction,
    serial: u64,
    state: Arc<Mutex<PeerState>>,
    transitions: Arc<watch::Sender<ConnectionState>>,
    watcher: watch::Receiver<ConnectionState>,
    outbound: mpsc::Sender<Command>,
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "PeerHandle({}, {}, {:?})", self.id, self.addr, self.direction)
    }
}

/// Frames `stream` and starts the reader and writer tasks. The returned connection is
/// `Handshaking`; [handshake] takes it to `Ready`.
pub fn spawn<S>(
    id: Id,
    addr: SocketAddr,
    direction: Direction,
    serial: u64,
    stream: S,
    context: Arc<ConnectionContext>,
) -> PeerHandle
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let config = context.config.clone();
    let (sink, frames) = Framed::new(stream, UcpCodec::new(config.max_message_size)).split();
    let (outbound, queue) = mpsc::channel(config.outbound_queue.max(1));
    let (transitions, watcher) = watch::channel(ConnectionState::Connecting);
    let handle = PeerHandle {
        id,
        addr,
        direction,
        serial,
        state: Arc::new(Mutex::new(PeerState::new(config.request_timeout()))),
        transitions: Arc::new(transitions),
        watcher,
        outbound,
    };
    let _ = handle.transition(ConnectionState::Handshaking);
    let _ = tokio::spawn(write_loop(handle.clone(), sink, queue));
    let _ = tokio::spawn(read_loop(handle.clone(), frames, context));
    handle
}

/// Completes the handshake within the connect timeout. On failure the connection is closed.
pub async fn handshake(handle: &PeerHandle, context: &ConnectionContext) -> Result<()> {
    let deadline = context.config.connect_timeout();
    let result = match handle.direction {
        Direction::Outbound => timeout(deadline, offer_handshake(handle, context)).await,
        Direction::Inbound => timeout(deadline, await_handshake(handle)).await,
    };
    let result = match result {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    };
    if let Err(err) = &result {
        let reason = err.to_string();
        warn!("{} handshake with {} failed: {}", "[p2p]".yellow(), handle.addr, reason);
        let _ = handle.disconnect(|| Error::HandshakeFailed(reason.clone()));
    }
    result
}

async fn offer_handshake(handle: &PeerHandle, context: &ConnectionContext) -> Result<()> {
    let (request_id, reply) = {
        let mut state = handle.state.lock();
        let request_id = state.pending.next_request_id();
        (request_id, state.pending.register(request_id, CommandKind::Handshake)?)
    };
    let config = &context.config;
    let hello = Command::handshake(
        request_id,
        &config.protocol_version,
        &config.network,
        context.local_height.load(Ordering::Relaxed),
    )?;
    handle.enqueue(hello)?;
    // The reader accepts the ACK before it handles any later frame
    let _ = reply.wait().await?;
    Ok(())
}

async fn await_handshake(handle: &PeerHandle) -> Result<()> {
    let mut watcher = handle.watcher.clone();
    loop {
        match handle.state() {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Disconnected => {
                return Err(Error::HandshakeFailed("closed during handshake".to_owned()))
            }
            _ => {
                if watcher.changed().await.is_err() {
                    return Err(Error::ConnectionLost);
                }
            }
        }
    }
}

fn check_peer(hello: &Command, config: &PeerTableConfig) -> Result<()> {
    let network = hello.message("network").unwrap_or_default();
    if network != config.network {
        return Err(Error::HandshakeFailed(format!(
            "peer is on {}, expected {}",
            network, config.network
        )));
    }
    let version = hello.message("protocol_version").unwrap_or_default();
    if version != config.protocol_version {
        warn!("peer speaks protocol {}, we speak {}", version, config.protocol_version);
    }
    Ok(())
}

impl PeerHandle {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().connection_state
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().is_alive()
    }

    pub fn summary(&self) -> PeerSummary {
        self.state.lock().summary(self.id, self.addr, self.direction)
    }

    pub fn next_request_id(&self) -> u32 {
        self.state.lock().pending.next_request_id()
    }

    pub fn pending_requests(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Queues a command without registering for a reply.
    pub fn send(&self, command: Command) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::NotConnected);
        }
        self.enqueue(command)
    }

    /// Registers the command's request id, then queues it. The returned handle completes with the
    /// reply, a rejection, a timeout or the loss of the connection.
    pub fn request(&self, command: Command) -> Result<ReplyHandle> {
        let kind = command.kind();
        let request_id = match command.request_id() {
            Some(request_id) if kind.expects_reply() => request_id,
            _ => return Err(Error::NotARequest(kind)),
        };
        let reply = {
            let mut state = self.state.lock();
            if !state.is_alive() {
                return Err(Error::NotConnected);
            }
            let _ = state.pending.expire(Instant::now());
            state.pending.register(request_id, kind)?
        };
        if let Err(err) = self.enqueue(command) {
            let _ = self.state.lock().pending.fail(request_id, Error::NotConnected);
            return Err(err);
        }
        Ok(reply)
    }

    /// Fails requests older than the request timeout.
    pub fn expire_pending(&self, now: Instant) -> usize {
        self.state.lock().pending.expire(now).len()
    }

    /// Ends the connection, failing everything pending with `reason`. Returns `false` if it had
    /// already ended.
    pub fn disconnect<F: Fn() -> Error>(&self, reason: F) -> bool {
        let failed = {
            let mut state = self.state.lock();
            if state.connection_state == ConnectionState::Disconnected {
                return false;
            }
            state.connection_state = ConnectionState::Disconnected;
            let _ = self.transitions.send(ConnectionState::Disconnected);
            state.pending.fail_all(reason)
        };
        info!("{} {} {} ({} pending failed)", "[p2p]".yellow(), self.id, "disconnected".red(), failed);
        true
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        self.outbound.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => Error::QueueFull,
            TrySendError::Closed(_) => Error::ConnectionLost,
        })
    }

    fn transition(&self, to: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if state.connection_state == ConnectionState::Disconnected {
            return false;
        }
        state.connection_state = to;
        let _ = self.transitions.send(to);
        true
    }

    /// Records what the remote announced in its handshake and marks the connection `Ready`.
    fn accept(&self, hello: &Command) -> Result<()> {
        let height = hello.height("height");
        {
            let mut state = self.state.lock();
            if state.connection_state == ConnectionState::Disconnected {
                return Err(Error::ConnectionLost);
            }
            state.best_height = height;
            state.connection_state = ConnectionState::Ready;
            let _ = self.transitions.send(ConnectionState::Ready);
        }
        info!(
            "{} {} {} at height {}",
            "[p2p]".yellow(),
            self.id,
            "ready".green(),
            height.unwrap_or_default()
        );
        Ok(())
    }
}

async fn write_loop<S>(
    handle: PeerHandle,
    mut sink: SplitSink<Framed<S, UcpCodec>, Command>,
    mut queue: mpsc::Receiver<Command>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut watcher = handle.watcher.clone();
    loop {
        tokio::select! {
            command = queue.recv() => match command {
                Some(command) => {
                    if !write(&handle, &mut sink, command).await {
                        break;
                    }
                }
                None => break,
            },
            _ = watcher.changed() => {}
        }
        if handle.state() == ConnectionState::Disconnected {
            // Flush what was queued before the end, e.g. a handshake rejection
            while let Ok(command) = queue.try_recv() {
                if !write(&handle, &mut sink, command).await {
                    break;
                }
            }
            break;
        }
    }
    let _ = sink.close().await;
}

/// Returns `false` once the transport is unusable.
async fn write<S>(
    handle: &PeerHandle,
    sink: &mut SplitSink<Framed<S, UcpCodec>, Command>,
    command: Command,
) -> bool
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let kind = command.kind();
    match sink.send(command).await {
        Ok(()) => true,
        Err(Error::Decode(err @ DecodeError::TooLarge { .. })) => {
            warn!("{} dropped outbound {}: {}", handle.id, kind, err);
            true
        }
        Err(err) => {
            warn!("{} write failed: {}", handle.id, err);
            let _ = handle.disconnect(|| Error::ConnectionLost);
            false
        }
    }
}

async fn read_loop<S>(
    handle: PeerHandle,
    mut frames: SplitStream<Framed<S, UcpCodec>>,
    context: Arc<ConnectionContext>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut watcher = handle.watcher.clone();
    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Frame::Command(command))) => on_command(&handle, command, &context),
                Some(Ok(Frame::Malformed(err))) => on_malformed(&handle, err, &context),
                Some(Err(err)) => {
                    warn!("{} read failed: {}", handle.id, err);
                    let _ = handle.disconnect(|| Error::ConnectionLost);
                }
                None => {
                    debug!("{} closed the connection", handle.id);
                    let _ = handle.disconnect(|| Error::ConnectionLost);
                }
            },
            _ = watcher.changed() => {}
        }
        if handle.state() == ConnectionState::Disconnected {
            break;
        }
    }
    let _ = context.events.send(PeerEvent::Disconnected { id: handle.id, serial: handle.serial });
}

fn on_malformed(handle: &PeerHandle, err: DecodeError, context: &ConnectionContext) {
    let violations = {
        let mut state = handle.state.lock();
        state.decode_violations += 1;
        state.decode_violations
    };
    warn!("{} sent a malformed command ({}): {}", handle.id, violations, err);
    let limit = context.config.max_decode_violations;
    if limit > 0 && violations >= limit {
        warn!("{} reached {} malformed commands", handle.id, limit);
        let _ = handle.disconnect(|| Error::ConnectionLost);
    }
}

fn on_command(handle: &PeerHandle, command: Command, context: &ConnectionContext) {
    let connection_state = {
        let mut state = handle.state.lock();
        state.last_seen_at = Instant::now();
        state.connection_state
    };
    match connection_state {
        ConnectionState::Handshaking => on_handshaking(handle, command, context),
        ConnectionState::Ready => on_ready(handle, command, context),
        state => debug!("{} dropped {} while {}", handle.id, command.kind(), state),
    }
}

fn on_handshaking(handle: &PeerHandle, command: Command, context: &ConnectionContext) {
    match (handle.direction, command.kind()) {
        (Direction::Inbound, CommandKind::Handshake) => answer_handshake(handle, command, context),
        (Direction::Outbound, CommandKind::HandshakeAck) => accept_handshake(handle, command, context),
        (Direction::Outbound, kind) if kind.is_reply() => resolve(handle, command),
        (_, kind) => warn!("{} sent {} before the handshake completed", handle.id, kind),
    }
}

/// Takes an outbound connection to `Ready` on the ACK to our handshake, then completes the
/// handshake request with it.
fn accept_handshake(handle: &PeerHandle, ack: Command, context: &ConnectionContext) {
    let awaited =
        ack.request_id().filter(|request_id| handle.state.lock().pending.awaits(*request_id, ack.kind()));
    let request_id = match awaited {
        Some(request_id) => request_id,
        None => return resolve(handle, ack),
    };
    let accepted = check_peer(&ack, &context.config).and_then(|()| handle.accept(&ack));
    let mut state = handle.state.lock();
    match accepted {
        Ok(()) => {
            let _ = state.pending.resolve(request_id, ack);
        }
        Err(err) => {
            let _ = state.pending.fail(request_id, err);
        }
    }
}

fn answer_handshake(handle: &PeerHandle, hello: Command, context: &ConnectionContext) {
    let request_id = hello.request_id().unwrap_or_default();
    let config = &context.config;
    if let Err(err) = check_peer(&hello, config) {
        if let Ok(reply) = Command::error(request_id, &err.to_string()) {
            let _ = handle.enqueue(reply);
        }
        let reason = err.to_string();
        warn!("{} rejected: {}", handle.id, reason);
        let _ = handle.disconnect(|| Error::HandshakeFailed(reason.clone()));
        return;
    }
    let height = context.local_height.load(Ordering::Relaxed);
    let queued = Command::handshake_ack(request_id, &config.protocol_version, &config.network, height)
        .map_err(Error::from)
        .and_then(|ack| handle.enqueue(ack));
    match queued.and_then(|()| handle.accept(&hello)) {
        Ok(()) => (),
        Err(err) => {
            warn!("{} handshake reply failed: {}", handle.id, err);
            let _ = handle.disconnect(|| Error::ConnectionLost);
        }
    }
}

fn on_ready(handle: &PeerHandle, command: Command, context: &ConnectionContext) {
    let kind = command.kind();
    if kind.is_state_report() {
        on_report(handle, command, context);
        return;
    }
    if kind.is_reply() {
        resolve(handle, command);
        return;
    }
    match kind {
        CommandKind::Ping => {
            let request_id = command.request_id().unwrap_or_default();
            let timestamp = command.timestamp("timestamp").unwrap_or_default();
            if let Err(err) = handle.enqueue(Command::pong(request_id, timestamp)) {
                warn!("{} pong failed: {}", handle.id, err);
            }
        }
        CommandKind::Handshake => {
            let request_id = command.request_id().unwrap_or_default();
            if let Ok(reply) = Command::error(request_id, "already handshaken") {
                let _ = handle.enqueue(reply);
            }
        }
        _ => match &context.dispatcher {
            Some(dispatcher) => {
                let _ = dispatcher.do_send(InboundCommand { peer: handle.id, command });
            }
            None => debug!("{} sent {}, no dispatcher", handle.id, kind),
        },
    }
}

fn on_report(handle: &PeerHandle, report: Command, context: &ConnectionContext) {
    let kind = report.kind();
    let mut state = handle.state.lock();
    // A report may also answer a request; unsolicited reports are expected
    let answering = report.request_id().filter(|request_id| state.pending.awaits(*request_id, kind));
    if !state.apply_report(&report) {
        if let Some(request_id) = answering {
            let _ = state.pending.fail(request_id, Error::UnusableReply(kind));
        }
        drop(state);
        warn!("{} sent an unusable {}", handle.id, kind);
        return;
    }
    if let Some(request_id) = answering {
        let _ = state.pending.resolve(request_id, report.clone());
    }
    drop(state);
    if let Some(ledger) = LedgerContext::from_report(&report) {
        let _ = context.ledger.merge(ledger);
    }
}

fn resolve(handle: &PeerHandle, reply: Command) {
    match reply.request_id() {
        Some(request_id) => {
            let _ = handle.state.lock().pending.resolve(request_id, reply);
        }
        None => warn!("{} sent {} without a request id", handle.id, reply.kind()),
    }
}
