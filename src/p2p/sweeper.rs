use super::peer_table::PeerTable;
use super::prelude::*;
use actix_derive::Message;

use actix::ActorContext;

// The sweeper periodically expires requests whose reply never came, so that callers waiting on
// them observe `Timeout` even when no further traffic touches the peer.

pub struct Sweeper {
    table: PeerTable,
    interval: Duration,
    expired: usize,
}

impl Sweeper {
    pub fn new(table: PeerTable, interval: Duration) -> Self {
        Sweeper { table, interval, expired: 0 }
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "usize")]
pub struct Sweep;

impl Actor for Sweeper {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        ctx.notify_later(Sweep, self.interval);
    }

    fn stopped(&mut self, _ctx: &mut Context<Self>) {
        info!("[sweeper] stopped ({} requests expired)", self.expired);
    }
}

impl Handler<Sweep> for Sweeper {
    type Result = usize;

    fn handle(&mut self, _msg: Sweep, ctx: &mut Context<Self>) -> usize {
        if self.table.is_closed() {
            ctx.stop();
            return 0;
        }
        let expired = self.table.expire_pending();
        if expired > 0 {
            debug!("[sweeper] expired {} requests", expired);
            self.expired += expired;
        }
        ctx.notify_later(Sweep, self.interval);
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::PeerTableConfig;

    #[actix_rt::test]
    async fn test_sweeper_stops_with_the_table() {
        let table = PeerTable::new(PeerTableConfig::default(), None);
        let sweeper = Sweeper::new(table.clone(), Duration::from_secs(3600)).start();
        assert_eq!(sweeper.send(Sweep).await.unwrap(), 0);

        table.shutdown();
        assert_eq!(sweeper.send(Sweep).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sweeper.send(Sweep).await.is_err());
    }
}
