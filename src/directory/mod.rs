// Directory module - WHO IS OUT THERE
// The locally known table of hosts and their advertised capabilities,
// plus the expiry rule that keeps it honest.

mod record;
mod registry;

pub use record::{HostFields, HostRecord, HostStatus};
pub use registry::HostDirectory;
