//! P2P networking: wire messages, peer roster, sync, dispatch, lifecycle

pub mod dispatcher;
pub mod manager;
pub mod message;
pub mod peer;
pub mod server;
pub mod sync;

pub use dispatcher::{DispatchAction, Dispatcher};
pub use manager::{Manager, PROTOCOL_VERSION};
pub use message::{Message, Status};
pub use peer::{Peer, Peers};
pub use server::{send_message, Server, CENTRAL_NODE};
pub use sync::{SyncManager, SyncRequest, SyncState};
