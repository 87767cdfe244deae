//! Pairs outbound requests with the replies that later arrive under the same request id.
use super::prelude::*;

use tokio::sync::oneshot;

use std::collections::HashMap;
use std::time::Instant;

struct PendingRequest {
    kind: CommandKind,
    registered_at: Instant,
    sender: oneshot::Sender<Result<Command>>,
}

/// Outcome of offering a reply or failure to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A pending request was completed.
    Delivered,
    /// Nothing is pending under the id; the reply is a protocol anomaly.
    Unmatched,
}

/// Completion side of a registered request.
#[derive(Debug)]
pub struct ReplyHandle {
    request_id: u32,
    receiver: oneshot::Receiver<Result<Command>>,
}

impl ReplyHandle {
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Waits for the reply. Every registered request completes exactly once: with the reply,
    /// with the peer's rejection, or with the error it was failed with.
    pub async fn wait(self) -> Result<Command> {
        match self.receiver.await {
            Ok(result) => result,
            // The table was dropped together with its connection
            Err(_) => Err(Error::ConnectionLost),
        }
    }
}

/// Pending requests of a single connection.
pub struct RequestTable {
    timeout: Duration,
    pending: HashMap<u32, PendingRequest>,
    next_id: u32,
    anomalies: u64,
}

impl RequestTable {
    pub fn new(timeout: Duration) -> Self {
        RequestTable { timeout, pending: HashMap::new(), next_id: 1, anomalies: 0 }
    }

    /// Returns an id which is not pending. Ids start at 1 and wrap.
    pub fn next_request_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn register(&mut self, request_id: u32, kind: CommandKind) -> Result<ReplyHandle> {
        if self.pending.contains_key(&request_id) {
            return Err(Error::DuplicateRequest(request_id));
        }
        let (sender, receiver) = oneshot::channel();
        let registered_at = Instant::now();
        let _ = self.pending.insert(request_id, PendingRequest { kind, registered_at, sender });
        Ok(ReplyHandle { request_id, receiver })
    }

    /// Completes the request pending under `request_id` with `reply`. Failure replies complete it
    /// with [Error::Rejected]. A reply whose kind does not answer the pending request leaves it
    /// pending and counts as an anomaly.
    pub fn resolve(&mut self, request_id: u32, reply: Command) -> Resolution {
        if !self.awaits(request_id, reply.kind()) {
            self.anomalies += 1;
            warn!("unmatched {} for request {}", reply.kind(), request_id);
            return Resolution::Unmatched;
        }
        match self.pending.remove(&request_id) {
            Some(request) => {
                debug!("{} -> {} [{}]", request.kind, reply.kind(), request_id);
                let result = match reply.failure_reason() {
                    Some(reason) => Err(Error::Rejected(reason.to_owned())),
                    None => Ok(reply),
                };
                // The caller may have stopped waiting
                let _ = request.sender.send(result);
                Resolution::Delivered
            }
            None => Resolution::Unmatched,
        }
    }

    pub fn fail(&mut self, request_id: u32, err: Error) -> Resolution {
        match self.pending.remove(&request_id) {
            Some(request) => {
                let _ = request.sender.send(Err(err));
                Resolution::Delivered
            }
            None => Resolution::Unmatched,
        }
    }

    /// Fails every request older than the timeout with [Error::Timeout], returning their ids.
    pub fn expire(&mut self, now: Instant) -> Vec<u32> {
        let timeout = self.timeout;
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, request)| now.saturating_duration_since(request.registered_at) > timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in expired.iter() {
            let _ = self.fail(*id, Error::Timeout);
        }
        expired
    }

    /// Fails everything still pending, returning how many requests were failed.
    pub fn fail_all<F: Fn() -> Error>(&mut self, make_error: F) -> usize {
        let n = self.pending.len();
        for (_, request) in self.pending.drain() {
            let _ = request.sender.send(Err(make_error()));
        }
        n
    }

    pub fn is_pending(&self, request_id: u32) -> bool {
        self.pending.contains_key(&request_id)
    }

    /// Whether a request is pending under `request_id` which a `reply` kind would complete.
    pub fn awaits(&self, request_id: u32, reply: CommandKind) -> bool {
        self.pending.get(&request_id).map_or(false, |request| reply.answers(request.kind))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Replies that matched nothing so far.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_reply_is_delivered_once() {
        let mut table = RequestTable::new(Duration::from_secs(10));
        let handle = table.register(7, CommandKind::MiningSubmit).unwrap();

        let reply = Command::mining_submit_success(7);
        assert_eq!(table.resolve(7, reply.clone()), Resolution::Delivered);
        assert_eq!(table.resolve(7, reply.clone()), Resolution::Unmatched);
        assert_eq!(table.anomalies(), 1);
        assert!(table.is_empty());

        assert_eq!(handle.wait().await.unwrap(), reply);
    }

    #[actix_rt::test]
    async fn test_failure_reply_rejects() {
        let mut table = RequestTable::new(Duration::from_secs(10));
        let handle = table.register(42, CommandKind::MiningSubmit).unwrap();
        let reply = Command::mining_submit_failure(42, "stale share").unwrap();
        assert_eq!(table.resolve(42, reply), Resolution::Delivered);

        match handle.wait().await {
            Err(Error::Rejected(reason)) => assert_eq!(reason, "stale share"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_reply_of_the_wrong_kind_leaves_the_request_pending() {
        let mut table = RequestTable::new(Duration::from_secs(10));
        let handle = table.register(0, CommandKind::MiningSubmit).unwrap();

        let report = Command::ledger_state(0, "V5Ujv72h", 3, 10).unwrap();
        assert!(!table.awaits(0, CommandKind::LedgerState));
        assert_eq!(table.resolve(0, report), Resolution::Unmatched);
        assert_eq!(table.resolve(0, Command::pong(0, 1)), Resolution::Unmatched);
        assert_eq!(table.anomalies(), 2);
        assert!(table.is_pending(0));

        assert_eq!(table.resolve(0, Command::mining_submit_success(0)), Resolution::Delivered);
        assert_eq!(handle.wait().await.unwrap(), Command::mining_submit_success(0));
    }

    #[actix_rt::test]
    async fn test_error_answers_any_request() {
        let mut table = RequestTable::new(Duration::from_secs(10));
        let handle = table.register(4, CommandKind::GetLedgerState).unwrap();
        assert!(table.awaits(4, CommandKind::Error));
        let reply = Command::error(4, "unknown address").unwrap();
        assert_eq!(table.resolve(4, reply), Resolution::Delivered);
        assert!(matches!(handle.wait().await, Err(Error::Rejected(_))));
    }

    #[actix_rt::test]
    async fn test_duplicate_registration_is_refused() {
        let mut table = RequestTable::new(Duration::from_secs(10));
        let _first = table.register(3, CommandKind::Ping).unwrap();
        assert!(matches!(table.register(3, CommandKind::Ping), Err(Error::DuplicateRequest(3))));
        assert_eq!(table.len(), 1);
    }

    #[actix_rt::test]
    async fn test_expired_requests_time_out() {
        let mut table = RequestTable::new(Duration::from_millis(50));
        let handle = table.register(1, CommandKind::GetDownloadStatus).unwrap();

        assert!(table.expire(Instant::now()).is_empty());
        let later = Instant::now() + Duration::from_millis(100);
        assert_eq!(table.expire(later), vec![1]);
        assert!(matches!(handle.wait().await, Err(Error::Timeout)));

        // A reply arriving after the deadline is an anomaly, not a second completion
        assert_eq!(table.resolve(1, Command::download_status(1, "READY", 5, 5).unwrap()), Resolution::Unmatched);
    }

    #[actix_rt::test]
    async fn test_fail_all_completes_everything() {
        let mut table = RequestTable::new(Duration::from_secs(10));
        let a = table.register(1, CommandKind::Ping).unwrap();
        let b = table.register(2, CommandKind::MiningSubmit).unwrap();

        assert_eq!(table.fail_all(|| Error::ConnectionLost), 2);
        assert!(matches!(a.wait().await, Err(Error::ConnectionLost)));
        assert!(matches!(b.wait().await, Err(Error::ConnectionLost)));
        assert_eq!(table.fail(1, Error::Timeout), Resolution::Unmatched);
    }

    #[actix_rt::test]
    async fn test_dropped_table_loses_the_connection() {
        let mut table = RequestTable::new(Duration::from_secs(10));
        let handle = table.register(9, CommandKind::Ping).unwrap();
        drop(table);
        assert!(matches!(handle.wait().await, Err(Error::ConnectionLost)));
    }

    #[test]
    fn test_request_ids_skip_pending_entries() {
        let mut table = RequestTable::new(Duration::from_secs(10));
        assert_eq!(table.next_request_id(), 1);
        let _two = table.register(2, CommandKind::Ping).unwrap();
        assert_eq!(table.next_request_id(), 3);

        table.next_id = u32::MAX;
        assert_eq!(table.next_request_id(), u32::MAX);
        assert_eq!(table.next_request_id(), 1);
    }
}
