//! TCP transport
//!
//! Conversations are strict request-response: whichever side just handled a
//! frame either owes reply frames on the same stream or closes it. The
//! server side reads first; an outbound conversation writes its opening
//! frame and then runs the same loop. Sync therefore rides a single
//! connection from handshake to completion.

use crate::config::GLOBAL_CONFIG;
use crate::error::{NodeError, Result};
use crate::network::dispatcher::Dispatcher;
use crate::network::manager::Manager;
use crate::network::message::{read_frame, write_frame, Message};
use log::{error, info, warn};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Well-known first contact for new nodes.
pub const CENTRAL_NODE: &str = "127.0.0.1:2001";

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
const TCP_WRITE_TIMEOUT: Duration = Duration::from_millis(5000);
const TCP_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Cadence of the sync-stall watchdog and peer discovery.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5);

pub struct Server {
    manager: Arc<Manager>,
}

impl Server {
    pub fn new(manager: Arc<Manager>) -> Server {
        Server { manager }
    }

    pub fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| NodeError::Network(format!("Failed to bind to {addr}: {e}")))?;
        info!("Server listening on {addr}");

        if addr != CENTRAL_NODE {
            if let Err(e) = self.connect_to_network() {
                warn!("Could not reach the central node: {e}");
            }
        }

        self.start_maintenance();

        // A solo miner starts without waiting for a peer handshake
        self.manager.start_mining();

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };

                    if self.manager.peers().at_capacity() {
                        warn!("Rejecting connection from {peer_addr}: peer limit reached");
                        let _ = stream.shutdown(Shutdown::Both);
                        continue;
                    }

                    let dispatcher = Dispatcher::new(Arc::clone(&self.manager));
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(dispatcher, stream) {
                            warn!("Connection from {peer_addr} ended with error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    /// Introduce ourselves to the central node; the reply conversation pulls
    /// us into a sync when the network is ahead.
    fn connect_to_network(&self) -> Result<()> {
        let status = self.manager.local_status()?;
        let dispatcher = Dispatcher::new(Arc::clone(&self.manager));
        send_and_converse(&dispatcher, CENTRAL_NODE, &Message::Status(status))
    }

    /// Background loop: abandon stalled syncs and keep the roster fed from
    /// the discovery set.
    fn start_maintenance(&self) {
        let manager = Arc::clone(&self.manager);

        thread::spawn(move || loop {
            thread::sleep(MAINTENANCE_INTERVAL);

            let stalled = manager.with_sync(|sync| sync.check_stall());
            if stalled {
                // The sync is gone; pick up mining again
                manager.start_mining();
            }

            if manager.peers().at_capacity() {
                continue;
            }

            // Ask one connected peer for its roster, then introduce
            // ourselves to discovered addresses we are not yet connected to
            let own_addr = GLOBAL_CONFIG.node_addr();
            let dispatcher = Dispatcher::new(Arc::clone(&manager));
            if let Some(peer) = manager.peers().addrs().first() {
                let _ = send_and_converse(
                    &dispatcher,
                    peer,
                    &Message::GetNodes {
                        addr_from: own_addr.clone(),
                    },
                );
            }

            let connected = manager.peers().addrs();
            for addr in manager.peers().known_addrs() {
                if addr == own_addr || connected.contains(&addr) {
                    continue;
                }
                if manager.peers().at_capacity() {
                    break;
                }
                match manager.local_status() {
                    Ok(status) => {
                        let _ = send_and_converse(&dispatcher, &addr, &Message::Status(status));
                    }
                    Err(e) => warn!("Could not build local status: {e}"),
                }
            }
        });
    }
}

fn handle_connection(dispatcher: Dispatcher, mut stream: TcpStream) -> Result<()> {
    stream
        .set_read_timeout(Some(TCP_READ_TIMEOUT))
        .map_err(|e| NodeError::Network(format!("Failed to set read timeout: {e}")))?;
    stream
        .set_write_timeout(Some(TCP_WRITE_TIMEOUT))
        .map_err(|e| NodeError::Network(format!("Failed to set write timeout: {e}")))?;

    converse(&dispatcher, &mut stream);
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

/// Read-dispatch-reply until one side has nothing further to say.
fn converse(dispatcher: &Dispatcher, stream: &mut TcpStream) {
    loop {
        let frame = match read_frame(stream) {
            Ok(frame) => frame,
            // EOF and timeouts both end the conversation
            Err(_) => break,
        };

        let action = dispatcher.dispatch_frame(&frame);
        let mut write_failed = false;
        for reply in &action.replies {
            if let Err(e) = write_frame(stream, reply) {
                warn!("Failed to write reply: {e}");
                write_failed = true;
                break;
            }
        }

        // No replies owed means the exchange is over
        if action.close || action.replies.is_empty() || write_failed {
            break;
        }
    }
}

/// Fire-and-forget send, used for broadcasts. The receiver owes no reply.
pub fn send_message(addr: &str, message: &Message) -> Result<()> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| NodeError::Network(format!("Invalid address {addr}: {e}")))?;

    let mut stream = TcpStream::connect_timeout(&socket_addr, TCP_CONNECT_TIMEOUT)
        .map_err(|e| NodeError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(TCP_WRITE_TIMEOUT))
        .map_err(|e| NodeError::Network(format!("Failed to set write timeout: {e}")))?;

    write_frame(&mut stream, message)
}

/// Open a conversation: write the first frame, then serve the reply loop on
/// the same stream.
pub fn send_and_converse(dispatcher: &Dispatcher, addr: &str, message: &Message) -> Result<()> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| NodeError::Network(format!("Invalid address {addr}: {e}")))?;

    let mut stream = TcpStream::connect_timeout(&socket_addr, TCP_CONNECT_TIMEOUT)
        .map_err(|e| NodeError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_read_timeout(Some(TCP_READ_TIMEOUT))
        .map_err(|e| NodeError::Network(format!("Failed to set read timeout: {e}")))?;
    stream
        .set_write_timeout(Some(TCP_WRITE_TIMEOUT))
        .map_err(|e| NodeError::Network(format!("Failed to set write timeout: {e}")))?;

    write_frame(&mut stream, message)?;
    converse(dispatcher, &mut stream);
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}
