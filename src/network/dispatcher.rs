//! Peer message dispatcher
//!
//! Routes decoded frames to chain, sync, pool, and roster actions. Every
//! handler is fault-isolated per message: a frame that fails to decode or a
//! handler that errors costs a log line, never the connection. Only an
//! explicit DISCONNECT (or a handshake mismatch) closes the transport.

use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, ImportResult};
use crate::error::Result;
use crate::network::manager::{Manager, PROTOCOL_VERSION};
use crate::network::message::{Message, Status};
use crate::network::sync::{SyncRequest, SyncState};
use log::{info, warn};
use std::sync::Arc;

/// What the transport should do after a frame is handled.
#[derive(Default)]
pub struct DispatchAction {
    pub replies: Vec<Message>,
    pub close: bool,
}

impl DispatchAction {
    fn close() -> DispatchAction {
        DispatchAction {
            replies: vec![],
            close: true,
        }
    }

    fn reply(message: Message) -> DispatchAction {
        DispatchAction {
            replies: vec![message],
            close: false,
        }
    }

    fn none() -> DispatchAction {
        DispatchAction::default()
    }
}

pub struct Dispatcher {
    manager: Arc<Manager>,
}

impl Dispatcher {
    pub fn new(manager: Arc<Manager>) -> Dispatcher {
        Dispatcher { manager }
    }

    /// Decode and handle one frame. Decode and handler errors are logged
    /// and swallowed here so one bad message never tears the peer down.
    pub fn dispatch_frame(&self, frame: &[u8]) -> DispatchAction {
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable frame: {e}");
                return DispatchAction::none();
            }
        };

        match self.dispatch(message) {
            Ok(action) => action,
            Err(e) => {
                warn!("Message handler failed: {e}");
                DispatchAction::none()
            }
        }
    }

    fn dispatch(&self, message: Message) -> Result<DispatchAction> {
        match message {
            Message::Disconnect => {
                info!("Peer requested disconnect");
                Ok(DispatchAction::close())
            }
            Message::Status(status) => self.handle_status(status),
            Message::GetNodes { addr_from } => Ok(DispatchAction::reply(Message::Nodes {
                addrs: self.manager.peers().addrs_except(&addr_from),
            })),
            Message::Nodes { addrs } => {
                self.manager.peers().merge_known(&addrs);
                Ok(DispatchAction::none())
            }
            Message::NewTransactions { transactions, .. } => {
                for tx in transactions {
                    if !tx.verify() {
                        warn!("Discarding transaction with invalid signature");
                        continue;
                    }
                    if !self.manager.pool().contains(&tx.id()) {
                        self.manager.pool().admit(tx);
                    }
                }
                Ok(DispatchAction::none())
            }
            Message::NewBlock { addr_from, block } => {
                self.manager.handle_new_block(Some(&addr_from), &block)?;
                Ok(DispatchAction::none())
            }
            Message::GetBlocks { from, count, .. } => Ok(DispatchAction::reply(Message::Blocks {
                addr_from: GLOBAL_CONFIG.node_addr(),
                blocks: self.manager.chain().main_chain_blocks(from, count)?,
            })),
            Message::GetBlockHeaders { from, count, .. } => {
                Ok(DispatchAction::reply(Message::BlockHeaders {
                    addr_from: GLOBAL_CONFIG.node_addr(),
                    headers: self.manager.chain().main_chain_headers(from, count)?,
                }))
            }
            Message::Blocks { addr_from, blocks } => self.handle_blocks(&addr_from, blocks),
            Message::BlockHeaders { headers, .. } => {
                let request = self
                    .manager
                    .with_sync(|sync| sync.on_block_headers(self.manager.chain(), &headers));
                self.finish_sync_step(request)
            }
        }
    }

    fn handle_status(&self, status: Status) -> Result<DispatchAction> {
        if status.network_id != GLOBAL_CONFIG.network_id() {
            warn!(
                "Disconnecting {}: wrong network id {}",
                status.addr_from, status.network_id
            );
            return Ok(DispatchAction {
                replies: vec![Message::Disconnect],
                close: true,
            });
        }
        if status.protocol_version != PROTOCOL_VERSION {
            warn!(
                "Disconnecting {}: unsupported protocol version {}",
                status.addr_from, status.protocol_version
            );
            return Ok(DispatchAction {
                replies: vec![Message::Disconnect],
                close: true,
            });
        }
        if status.genesis_hash != self.manager.chain().genesis_hash()? {
            warn!("Disconnecting {}: different genesis", status.addr_from);
            return Ok(DispatchAction {
                replies: vec![Message::Disconnect],
                close: true,
            });
        }

        self.manager.peers().update_from_status(&status);

        let ours = self.manager.chain().best_total_difficulty();
        if status.total_difficulty > ours {
            // Peer is ahead: stop mining and begin the catch-up
            self.manager.pause_for_sync();
            let request = self.manager.with_sync(|sync| {
                sync.on_peer_status(
                    self.manager.chain(),
                    &status.addr_from,
                    status.total_difficulty,
                )
            });
            return self.finish_sync_step(request);
        }

        // We are caught up (or ahead): mine, and show the peer our status
        // so it can sync from us
        self.manager.start_mining();
        if status.total_difficulty < ours {
            return Ok(DispatchAction::reply(Message::Status(
                self.manager.local_status()?,
            )));
        }
        Ok(DispatchAction::none())
    }

    fn handle_blocks(&self, addr_from: &str, blocks: Vec<Block>) -> Result<DispatchAction> {
        if self.manager.sync_active() {
            let mut accepted: u64 = 0;
            for block in &blocks {
                match self.manager.import_block_quiet(block)? {
                    ImportResult::Invalid => {
                        warn!("Sync peer {addr_from} sent an invalid block");
                    }
                    _ => accepted += 1,
                }
            }
            let request = self.manager.with_sync(|sync| sync.on_blocks(accepted));
            return self.finish_sync_step(request);
        }

        // Outside a sync these are ordinary imports, no rebroadcast
        for block in &blocks {
            self.manager.import_block_quiet(block)?;
        }
        Ok(DispatchAction::none())
    }

    /// Turn a sync-machine request into a wire reply; restart mining when
    /// the machine just completed.
    fn finish_sync_step(&self, request: Option<SyncRequest>) -> Result<DispatchAction> {
        if let Some(request) = request {
            let addr_from = GLOBAL_CONFIG.node_addr();
            let message = match request {
                SyncRequest::GetHeaders { from, count } => Message::GetBlockHeaders {
                    addr_from,
                    from,
                    count,
                },
                SyncRequest::GetBlocks { from, count } => Message::GetBlocks {
                    addr_from,
                    from,
                    count,
                },
            };
            return Ok(DispatchAction::reply(message));
        }

        if self.manager.with_sync(|sync| sync.state()) == SyncState::InitSyncCompleted {
            info!("Initial sync completed");
            self.manager.start_mining();
        }
        Ok(DispatchAction::none())
    }
}
