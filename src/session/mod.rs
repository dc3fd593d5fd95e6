// Session module - WHO RUNS THE PROTOCOL
// The long-lived engine task (discovery, handshake, replication), the
// command channel the controller drives it with, and the controller-side
// logic that elects, dispatches, applies reports, and owns the views.

mod controller;
mod engine;
mod handshake;
mod mode;
mod replication;
mod view;

pub use controller::{SessionController, SessionError, SessionPlan};
pub use engine::{SessionEngine, SessionHandle};
pub use handshake::AckSet;
pub use mode::{Command, HandshakeProgress, SessionMode};
pub use replication::ReplicationState;
pub use view::GameView;
