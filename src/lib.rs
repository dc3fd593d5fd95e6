// tetramesh - LAN session synchronization for multi-host falling-block games
//
// No central server: hosts find each other over UDP multicast, elect a
// coordinator deterministically, agree on a partition of the shared
// game-ID space, gate the start behind a two-role handshake, and then
// replicate per-tick gameplay events to keep every host's view of remote
// boards consistent.
//
// Module map, leaf first:
// - config:    protocol tunables
// - directory: the table of known hosts and its expiry rule
// - protocol:  wire messages, reports, election/dispatch, string codecs
// - transport: the multicast endpoint behind an abstract seam
// - session:   the engine task, handshake, replication, and controller

pub mod config;
pub mod directory;
pub mod protocol;
pub mod session;
pub mod transport;
