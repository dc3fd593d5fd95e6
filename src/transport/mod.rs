// Transport module - HOW DATAGRAMS MOVE
// One abstract endpoint seam with two implementations: the real UDP
// multicast socket and an in-process hub for protocol tests.

mod memory;
mod multicast;
mod traits;

pub use memory::{MemoryEndpoint, MemoryHub};
pub use multicast::MulticastEndpoint;
pub use traits::{Endpoint, NetStats, RecvOutcome, TransportError};
