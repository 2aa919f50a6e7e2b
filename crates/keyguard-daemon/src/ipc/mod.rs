//! IPC control socket
//!
//! Line-delimited JSON over a Unix domain socket. The lock UI reports
//! password attempts here, the settings UI writes policy keys, platform
//! services publish display/cover/proximity/call signals and `keyguardctl`
//! drives all of it by hand.

mod client;
mod framing;
mod server;
mod socket;
mod types;

pub use client::IpcClient;
pub use framing::MAX_FRAME_LEN;
pub use server::{IpcContext, IpcServer};
pub use types::{BusSignal, IpcRequest, IpcResponse};
