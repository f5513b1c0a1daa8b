// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal rendering of board snapshots

use p2ptt_core::{Cell, Role, BOARD_SIZE};

fn cell_char(cell: Cell) -> char {
    match cell {
        Some(Role::Host) => 'X',
        Some(Role::Guest) => 'O',
        None => '.',
    }
}

/// Render a board snapshot as three lines of `X`/`O`/`.`.
pub fn board(cells: &[[Cell; BOARD_SIZE]; BOARD_SIZE]) -> String {
    let mut out = String::with_capacity(BOARD_SIZE * (BOARD_SIZE * 2 + 1));
    for row in cells {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push(cell_char(*cell));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_markers_and_empty_cells() {
        let mut cells = [[None; BOARD_SIZE]; BOARD_SIZE];
        cells[0][0] = Some(Role::Host);
        cells[1][1] = Some(Role::Guest);
        assert_eq!(board(&cells), "X . .\n. O .\n. . .\n");
    }
}
