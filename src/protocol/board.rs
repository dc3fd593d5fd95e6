// Board Codec - compact string form for board snapshots
//
// A full grid would dominate a datagram if sent as a native structure, so
// board reports travel as digit rows joined by ':'. Cell values are 0-9,
// one character per cell.

use crate::protocol::message::ProtocolError;

/// Encode a rectangular grid of single-digit cells into its wire string
pub fn encode_board(board: &[Vec<u8>]) -> Result<String, ProtocolError> {
    let mut encoded = String::new();
    for (index, row) in board.iter().enumerate() {
        if index > 0 {
            encoded.push(':');
        }
        for &cell in row {
            if cell > 9 {
                return Err(ProtocolError::BadBoard(format!(
                    "cell value {cell} out of digit range"
                )));
            }
            encoded.push(char::from(b'0' + cell));
        }
    }
    Ok(encoded)
}

/// Decode a wire board string back into its grid.
///
/// Any non-digit character or ragged row fails the whole decode; a decode
/// failure is not the same thing as "no board yet".
pub fn decode_board(encoded: &str) -> Result<Vec<Vec<u8>>, ProtocolError> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    let mut board = Vec::new();
    let mut width = None;
    for line in encoded.split(':') {
        let mut row = Vec::with_capacity(line.len());
        for ch in line.chars() {
            let cell = ch
                .to_digit(10)
                .ok_or_else(|| ProtocolError::BadBoard(format!("non-digit cell {ch:?}")))?;
            row.push(cell as u8);
        }
        match width {
            None => width = Some(row.len()),
            Some(expected) if expected != row.len() => {
                return Err(ProtocolError::BadBoard("ragged rows".to_string()));
            }
            Some(_) => {}
        }
        board.push(row);
    }
    Ok(board)
}
