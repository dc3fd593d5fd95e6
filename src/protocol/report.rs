// Gameplay Reports - one tagged event per state change
//
// Produced by the gameplay collaborator, replicated verbatim except for
// board snapshots, which travel as their compact string form (BoardText).
//
// Kinds split into two delivery classes:
// - overwriting: a newer report fully supersedes an older one of the same
//   kind (piece position, hold slot, board snapshot, ...)
// - incremental: each report changes state by a delta (cleared lines,
//   bonus lines) or latches an outcome (loss, winner), so a stale one
//   must still be applied exactly once

use serde::{Deserialize, Serialize};

/// One tagged gameplay event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Report {
    /// Falling piece moved to a new position
    Move { row: i8, col: i8 },
    /// Falling piece changed shape/rotation in place
    Shape { shape: u8, rotation: u8 },
    /// New falling piece spawned at a position
    Piece {
        shape: u8,
        rotation: u8,
        row: i8,
        col: i8,
    },
    /// Hold slot changed
    Hold(Option<u8>),
    /// Upcoming piece queue changed
    Queue(Vec<u8>),
    /// Full board snapshot as a grid of cell values
    Board(Vec<Vec<u8>>),
    /// Wire form of `Board`: digit rows joined by ':'
    BoardText(String),
    /// Lines cleared, with the resulting score
    Clear { lines: u32, score: i32 },
    /// Penalty lines pushed onto this game
    Bonus(u32),
    /// This game topped out
    Loss,
    /// Session winner, by global game ID
    Winner(u32),
}

impl Report {
    /// Whether a newer report of this kind fully supersedes an older one
    pub fn is_overwrite(&self) -> bool {
        matches!(
            self,
            Report::Move { .. }
                | Report::Shape { .. }
                | Report::Piece { .. }
                | Report::Hold(_)
                | Report::Queue(_)
                | Report::Board(_)
                | Report::BoardText(_)
        )
    }

    /// Incremental or latching kinds that must be applied even out of order
    pub fn is_incremental(&self) -> bool {
        !self.is_overwrite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_classes() {
        assert!(Report::Move { row: 1, col: 2 }.is_overwrite());
        assert!(Report::Board(vec![vec![0]]).is_overwrite());
        assert!(Report::Clear { lines: 2, score: 300 }.is_incremental());
        assert!(Report::Bonus(1).is_incremental());
        assert!(Report::Loss.is_incremental());
        assert!(Report::Winner(3).is_incremental());
    }
}
