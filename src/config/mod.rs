// Config module - protocol tunables
// Everything the protocol consumes from the outside: group address, timing
// knobs, session capacity, local capabilities.

mod net;

pub use net::{ConfigError, NetConfig};
