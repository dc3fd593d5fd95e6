// Protocol module - WHAT GOES ON THE WIRE
// Closed set of datagram messages, the tagged gameplay report, leader
// election and game-ID range dispatch, and the two string codecs
// (assignment and board) the original wire format calls for.

mod assignment;
mod board;
mod message;
mod report;

pub use assignment::{dispatch, elect, GameAssignment, GameRange, HostKey, AI_KEY};
pub use board::{decode_board, encode_board};
pub use message::{GameUpdate, Message, MessageKind, ProtocolError};
pub use report::Report;
