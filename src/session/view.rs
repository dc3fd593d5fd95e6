// Game Views - per-game render snapshots
//
// One view per game in the session, local and remote alike. The
// presentation layer reads these; it never touches protocol internals.
// Reports fold into a view field by field, which is what makes the
// overwriting kinds safe under last-write-wins delivery.

use crate::protocol::Report;

/// Snapshot of one game for display
#[derive(Clone, Debug, Default)]
pub struct GameView {
    pub board: Vec<Vec<u8>>,
    pub piece_shape: Option<u8>,
    pub piece_rotation: u8,
    pub piece_row: i8,
    pub piece_col: i8,
    pub hold: Option<u8>,
    pub queue: Vec<u8>,
    pub score: i32,
    pub light_speed_flag: bool,
    pub lost: bool,
}

impl GameView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one report into the view.
    ///
    /// Returns `false` once this game is out (a `Loss` arrived); in a
    /// multi-board session a lost board shows score -1.
    pub fn apply(&mut self, report: &Report, multi_board: bool) -> bool {
        match report {
            Report::Move { row, col } => {
                self.piece_row = *row;
                self.piece_col = *col;
            }
            Report::Shape { shape, rotation } => {
                self.piece_shape = Some(*shape);
                self.piece_rotation = *rotation;
            }
            Report::Piece {
                shape,
                rotation,
                row,
                col,
            } => {
                self.piece_shape = Some(*shape);
                self.piece_rotation = *rotation;
                self.piece_row = *row;
                self.piece_col = *col;
            }
            Report::Hold(piece) => self.hold = *piece,
            Report::Queue(pieces) => self.queue = pieces.clone(),
            Report::Board(grid) => self.board = grid.clone(),
            // Wire-form boards are decoded by the replication channel
            // before application; one that leaks through is ignored.
            Report::BoardText(_) => {}
            Report::Clear { score, .. } => self.score = *score,
            Report::Bonus(_) => {}
            Report::Loss => {
                self.lost = true;
                if multi_board {
                    self.score = -1;
                }
            }
            Report::Winner(_) => {}
        }
        !self.lost
    }
}
