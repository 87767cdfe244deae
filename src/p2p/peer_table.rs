//! The set of live peer connections and the aggregate view over them.
//!
//! Connections come and go underneath the table: the listener and bootstrap dialling add them,
//! transport failures remove them (through [PeerEvent]s handled by the reaper task). Every query
//! reads a fresh snapshot of the peers that are `Ready` at the time of the call.
use super::config::PeerTableConfig;
use super::connection::{self, ConnectionContext, InboundCommand, PeerEvent, PeerHandle};
use super::correlation::ReplyHandle;
use super::ledger::{LedgerContext, LedgerView};
use super::peer::{ConnectionState, Direction, DownloadStatus, PeerSummary};
use super::prelude::*;

use crate::id::parse_peer;

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Instant;

/// A transaction signed by the wallet, ready to be advertised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Hex encoded transaction hash.
    pub tx_id: String,
    pub raw: Vec<u8>,
}

/// Synchronisation status aggregated over the ready peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStatusResponse {
    pub status: DownloadStatus,
    pub current_height: u32,
    pub best_height: Option<u32>,
    /// Ready peers the status was computed from.
    pub peers: usize,
}

#[derive(Clone)]
pub struct PeerTable {
    inner: Arc<Inner>,
}

struct Inner {
    context: Arc<ConnectionContext>,
    peers: RwLock<HashMap<Id, PeerHandle>>,
    started: AtomicBool,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
    close_rx: watch::Receiver<bool>,
    events: Mutex<Option<mpsc::UnboundedReceiver<PeerEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    serial: AtomicU64,
}

impl PeerTable {
    pub fn new(config: PeerTableConfig, dispatcher: Option<Recipient<InboundCommand>>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let context = ConnectionContext {
            config: Arc::new(config),
            ledger: Arc::new(LedgerView::new()),
            dispatcher,
            events: events_tx,
            local_height: AtomicU32::new(0),
        };
        PeerTable {
            inner: Arc::new(Inner {
                context: Arc::new(context),
                peers: RwLock::new(HashMap::new()),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                close_tx,
                close_rx,
                events: Mutex::new(Some(events_rx)),
                tasks: Mutex::new(vec![]),
                serial: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PeerTableConfig {
        &self.inner.context.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::TableClosed)
        } else {
            Ok(())
        }
    }

    /// Height announced to peers in our handshakes.
    pub fn set_local_height(&self, height: u32) {
        self.inner.context.local_height.store(height, Ordering::Relaxed)
    }

    /// Starts the reaper, the listener and bootstrap dialling. Must be called within a tokio
    /// runtime. Calling it again has no effect.
    pub fn start(&self) -> Result<()> {
        self.ensure_open()?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut tasks = vec![];
        if let Some(events) = self.inner.events.lock().take() {
            tasks.push(tokio::spawn(reap(Arc::downgrade(&self.inner), events)));
        }
        if let Some(listen_addr) = self.config().listen_addr {
            tasks.push(tokio::spawn(listen(self.clone(), listen_addr)));
        }
        for peer in self.config().bootstrap_peers.iter() {
            match parse_peer(peer) {
                Ok((id, addr)) => {
                    let table = self.clone();
                    tasks.push(tokio::spawn(async move {
                        if let Err(err) = table.connect_to(id, addr).await {
                            warn!("{} bootstrap peer {} unreachable: {}", "[p2p]".yellow(), addr, err);
                        }
                    }));
                }
                Err(err) => warn!("{} invalid bootstrap peer {}: {:?}", "[p2p]".yellow(), peer, err),
            }
        }
        self.inner.tasks.lock().extend(tasks);
        info!("{} peer table started on {}", "[p2p]".yellow(), self.config().network.cyan());
        Ok(())
    }

    /// Closes the table: background tasks stop, every peer is disconnected with its pending
    /// requests failing as [Error::TableClosed], and status computations in flight are interrupted.
    /// Calling it again has no effect.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.close_tx.send(true);
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        let peers: Vec<PeerHandle> = self.inner.peers.write().drain().map(|(_, p)| p).collect();
        for peer in peers.iter() {
            let _ = peer.disconnect(|| Error::TableClosed);
        }
        self.inner.context.ledger.clear();
        info!("{} peer table {} ({} peers dropped)", "[p2p]".yellow(), "closed".red(), peers.len());
    }

    /// Dials `addr` and completes the handshake, returning the identity of the new peer.
    pub async fn connect(&self, addr: SocketAddr) -> Result<Id> {
        let handle = self.connect_to(Id::from_ip(&addr), addr).await?;
        Ok(handle.id())
    }

    async fn connect_to(&self, id: Id, addr: SocketAddr) -> Result<PeerHandle> {
        self.ensure_open()?;
        let stream = match timeout(self.config().connect_timeout(), TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => return Err(Error::Timeout),
        };
        self.attach(id, addr, stream, Direction::Outbound).await
    }

    /// Runs a connection over an established transport and waits for its handshake.
    pub async fn attach<S>(
        &self,
        id: Id,
        addr: SocketAddr,
        stream: S,
        direction: Direction,
    ) -> Result<PeerHandle>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.ensure_open()?;
        let serial = self.inner.serial.fetch_add(1, Ordering::Relaxed);
        let handle = {
            let mut peers = self.inner.peers.write();
            if let Some(existing) = peers.get(&id) {
                if existing.state() != ConnectionState::Disconnected {
                    return Err(Error::AlreadyConnected(id));
                }
            }
            let handle =
                connection::spawn(id, addr, direction, serial, stream, self.inner.context.clone());
            let _ = peers.insert(id, handle.clone());
            handle
        };
        // Shutdown may have drained the map before the insert
        if self.is_closed() {
            let _ = handle.disconnect(|| Error::TableClosed);
            return Err(Error::TableClosed);
        }
        if let Err(err) = connection::handshake(&handle, &self.inner.context).await {
            self.remove(id, serial);
            return Err(err);
        }
        Ok(handle)
    }

    fn remove(&self, id: Id, serial: u64) {
        let mut peers = self.inner.peers.write();
        if peers.get(&id).map(|p| p.serial()) == Some(serial) {
            let _ = peers.remove(&id);
        }
    }

    /// Drops the peer `id`. Returns `false` if it was not in the table.
    pub fn disconnect(&self, id: &Id) -> Result<bool> {
        self.ensure_open()?;
        let removed = self.inner.peers.write().remove(id);
        match removed {
            Some(peer) => {
                let _ = peer.disconnect(|| Error::ConnectionLost);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn ready_peers(&self) -> Vec<PeerHandle> {
        self.inner.peers.read().values().filter(|p| p.is_alive()).cloned().collect()
    }

    fn ready_summaries(&self) -> Vec<PeerSummary> {
        self.inner
            .peers
            .read()
            .values()
            .map(|p| p.summary())
            .filter(|s| s.state == ConnectionState::Ready)
            .collect()
    }

    /// Broadcasts `tx` to every ready peer. Returns how many peers it was queued for; peers that
    /// could not take it are logged and skipped.
    pub fn advertise(&self, tx: &SignedTransaction) -> Result<usize> {
        self.ensure_open()?;
        let command = Command::advertise_transaction(&tx.tx_id, &tx.raw)?;
        let mut queued = 0;
        for peer in self.ready_peers() {
            match peer.send(command.clone()) {
                Ok(()) => queued += 1,
                Err(err) => warn!("{} advertise to {} failed: {}", "[p2p]".yellow(), peer.id(), err),
            }
        }
        debug!("{} advertised {} to {} peers", "[p2p]".yellow(), tx.tx_id, queued);
        Ok(queued)
    }

    /// Sends a request to one peer.
    pub fn request(&self, id: &Id, command: Command) -> Result<ReplyHandle> {
        self.ensure_open()?;
        let peer = self.inner.peers.read().get(id).cloned().ok_or(Error::UnknownPeer)?;
        peer.request(command)
    }

    /// Asks every ready peer for the state of `addresses`; reports merge into the ledger view as
    /// they arrive. Returns how many peers were asked.
    pub fn query_ledger(&self, addresses: &[String]) -> Result<usize> {
        self.ensure_open()?;
        let mut asked = 0;
        for peer in self.ready_peers() {
            let command = Command::get_ledger_state(peer.next_request_id(), addresses.to_vec())?;
            match peer.request(command) {
                Ok(_reply) => asked += 1,
                Err(err) => warn!("{} ledger query to {} failed: {}", "[p2p]".yellow(), peer.id(), err),
            }
        }
        Ok(asked)
    }

    /// Highest signature index any peer reported for `address`, or `None` if unknown.
    pub fn get_signature_index(&self, address: &str) -> Result<Option<i64>> {
        self.ensure_open()?;
        Ok(self.inner.context.ledger.signature_index(address))
    }

    pub fn get_available_peers(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.ready_peers().len())
    }

    /// Highest block height reported by a ready peer, or `None` if no ready peer reported one.
    pub fn get_best_block_height(&self) -> Result<Option<u32>> {
        self.ensure_open()?;
        Ok(self.ready_summaries().iter().filter_map(|s| s.best_height).max())
    }

    pub fn get_address_state(&self) -> Result<HashMap<String, LedgerContext>> {
        self.ensure_open()?;
        Ok(self.inner.context.ledger.snapshot())
    }

    /// Asks every ready peer for its download status, waiting at most the request timeout, and
    /// aggregates the replies with the cached status of peers that did not answer.
    pub async fn get_download_status(&self) -> Result<DownloadStatusResponse> {
        self.ensure_open()?;
        let mut closed = self.inner.close_rx.clone();
        let table = self.clone();
        let mut computation = tokio::spawn(async move { table.compute_download_status().await });
        tokio::select! {
            biased;
            _ = closed.changed() => {
                computation.abort();
                Err(Error::Interrupted)
            }
            result = &mut computation => match result {
                Ok(_) if self.is_closed() => Err(Error::Interrupted),
                Ok(response) => Ok(response),
                Err(err) => Err(Error::ExecutionFailure(err.to_string())),
            },
        }
    }

    async fn compute_download_status(&self) -> DownloadStatusResponse {
        let wait = self.config().request_timeout();
        let mut replies = vec![];
        for peer in self.ready_peers() {
            match peer.request(Command::get_download_status(peer.next_request_id())) {
                Ok(reply) => replies.push(timeout(wait, reply.wait())),
                Err(err) => debug!("{} status query to {} failed: {}", "[p2p]".yellow(), peer.id(), err),
            }
        }
        // Replies update each peer's cached status; failures leave the cached one in place
        let _ = futures::future::join_all(replies).await;
        aggregate_download_status(&self.ready_summaries())
    }

    pub fn peers(&self) -> Result<Vec<PeerSummary>> {
        self.ensure_open()?;
        Ok(self.inner.peers.read().values().map(|p| p.summary()).collect())
    }

    /// Fails requests that outlived the request timeout on every peer.
    pub fn expire_pending(&self) -> usize {
        let now = Instant::now();
        let peers: Vec<PeerHandle> = self.inner.peers.read().values().cloned().collect();
        peers.iter().map(|p| p.expire_pending(now)).sum()
    }
}

/// Aggregates the status of ready peers. A single peer at the best height is enough for `Ready`;
/// a lagging majority never hides it.
pub fn aggregate_download_status(peers: &[PeerSummary]) -> DownloadStatusResponse {
    let ready: Vec<&PeerSummary> =
        peers.iter().filter(|p| p.state == ConnectionState::Ready).collect();
    let best_height = ready.iter().filter_map(|p| p.best_height).max();
    let synced = ready.iter().any(|p| {
        p.download_status == DownloadStatus::Ready && p.best_height.is_some()
            && p.best_height == best_height
    });
    let current = ready
        .iter()
        .filter_map(|p| match p.download_status {
            DownloadStatus::Downloading { current, .. } => Some(current),
            DownloadStatus::Ready => p.best_height,
            DownloadStatus::Discovering => None,
        })
        .max();

    let status = if ready.is_empty() {
        DownloadStatus::Discovering
    } else if synced {
        DownloadStatus::Ready
    } else if ready.iter().any(|p| matches!(p.download_status, DownloadStatus::Downloading { .. })) {
        DownloadStatus::Downloading {
            current: current.unwrap_or_default(),
            target: best_height.unwrap_or_default(),
        }
    } else {
        DownloadStatus::Discovering
    };
    let current_height = match status {
        DownloadStatus::Ready => best_height.unwrap_or_default(),
        _ => current.unwrap_or_default(),
    };
    DownloadStatusResponse { status, current_height, best_height, peers: ready.len() }
}

async fn reap(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<PeerEvent>) {
    while let Some(event) = events.recv().await {
        let inner = match inner.upgrade() {
            Some(inner) => inner,
            None => break,
        };
        match event {
            PeerEvent::Disconnected { id, serial } => {
                let mut peers = inner.peers.write();
                if peers.get(&id).map(|p| p.serial()) == Some(serial) {
                    let _ = peers.remove(&id);
                    debug!("{} reaped {}", "[p2p]".yellow(), id);
                }
            }
        }
    }
}

async fn listen(table: PeerTable, listen_addr: SocketAddr) {
    let listener = match TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("{} cannot listen on {}: {}", "[p2p]".yellow(), listen_addr, err);
            return;
        }
    };
    info!("{} listening on {}", "[p2p]".yellow(), listen_addr);
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let table = table.clone();
                let _ = tokio::spawn(async move {
                    let id = Id::from_ip(&addr);
                    match table.attach(id, addr, stream, Direction::Inbound).await {
                        Ok(_) => info!("{} accepted {} ({})", "[p2p]".yellow(), addr, id),
                        Err(err) => debug!("{} inbound {} refused: {}", "[p2p]".yellow(), addr, err),
                    }
                });
            }
            Err(err) => warn!("{} accept failed: {}", "[p2p]".yellow(), err),
        }
    }
}
