use crate::p2p::{InboundCommand, PeerTable, PeerTableConfig, Sweeper};
use crate::Result;

use actix::{Actor, Context, Handler, Recipient};
use tracing::info;

/// Logs commands no other component handles yet.
pub struct InboundLog;

impl Actor for InboundLog {
    type Context = Context<Self>;
}

impl Handler<InboundCommand> for InboundLog {
    type Result = ();

    fn handle(&mut self, msg: InboundCommand, _ctx: &mut Context<Self>) {
        info!("[node] {} from {}", msg.command.kind(), msg.peer);
    }
}

/// Starts the peer table and its sweeper. Must run inside an actix system.
pub fn run(config: PeerTableConfig) -> Result<PeerTable> {
    let dispatcher: Recipient<InboundCommand> = InboundLog.start().recipient();
    let sweep_interval = config.sweep_interval();
    let table = PeerTable::new(config, Some(dispatcher));
    table.start()?;
    let _ = Sweeper::new(table.clone(), sweep_interval).start();
    info!("[node] started");
    Ok(table)
}

pub fn stop(table: &PeerTable) {
    table.shutdown();
    info!("[node] stopped");
}
