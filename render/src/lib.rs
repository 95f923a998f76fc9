//! Turns a coalesced board plus a viewer identity into a human-readable
//! picture. Pure function over engine output: it defines the externally
//! visible board-picture contract but never touches the engine itself.

use protocol::{Cell, CoalescedBoard, CoalescedCell, Coordinate, Dimensions, PlayerId, PlayerStatus};

/// Renders `board_state` from `viewer`'s point of view.
///
/// Rows are emitted from the highest row index down to 0 (row 0 is printed
/// last, so the display origin is bottom-left even though the coordinate
/// origin is top-left). Each row ends with `\n`.
///
/// Glyphs, per cell:
/// - `#` wall;
/// - space — walkable, no occupants;
/// - `@` — `viewer` occupies this cell and is alive (other occupants hidden);
/// - `&` — `viewer` occupies this cell and is dead;
/// - `x` — occupied, everyone dead, `viewer` not present;
/// - `1`-`9` — that many alive players, `viewer` not present;
/// - `*` — more than 9 alive players, `viewer` not present.
pub fn render(board_state: &CoalescedBoard, dimensions: Dimensions, viewer: &PlayerId) -> String {
    let mut picture = String::with_capacity((dimensions.rows) * (dimensions.cols + 1));

    for row in (0..dimensions.rows).rev() {
        for col in 0..dimensions.cols {
            let coord = Coordinate::new(row as i32, col as i32);
            picture.push(glyph_for(board_state.get(&coord), viewer));
        }
        picture.push('\n');
    }

    picture
}

fn glyph_for(cell: Option<&CoalescedCell>, viewer: &PlayerId) -> char {
    match cell {
        None | Some(CoalescedCell::Empty(Cell::Floor)) => ' ',
        Some(CoalescedCell::Empty(Cell::Wall)) => '#',
        Some(CoalescedCell::Occupied(occupants)) => {
            if let Some(status) = occupants.get(viewer) {
                return match status {
                    PlayerStatus::Alive => '@',
                    PlayerStatus::Dead => '&',
                };
            }

            let alive = occupants
                .values()
                .filter(|status| **status == PlayerStatus::Alive)
                .count();

            if alive == 0 {
                'x'
            } else if alive > 9 {
                '*'
            } else {
                char::from_digit(alive as u32, 10).expect("alive in 1..=9 is a single ASCII digit")
            }
        }
    }
}
