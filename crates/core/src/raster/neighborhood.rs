//! 8-connected neighbourhood and D8 direction encoding

/// D8 flow directions (ESRI encoding)
///
/// ```text
///   32  64  128
///   16   0    1
///    8   4    2
/// ```
///
/// The table order is also the routing priority: when two neighbours give
/// the same drop, the one listed first wins.
pub mod d8 {
    /// Cell has no downstream neighbour (outlet, exits grid, or unresolved)
    pub const NO_FLOW: u8 = 0;

    /// Cell has no elevation; used as the direction raster's nodata value
    pub const NODATA: u8 = 255;

    /// Direction codes in priority order: E, SE, S, SW, W, NW, N, NE
    pub const CODES: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

    /// (row_offset, col_offset) for each entry of [`CODES`]
    pub const OFFSETS: [(isize, isize); 8] = [
        (0, 1),   // E
        (1, 1),   // SE
        (1, 0),   // S
        (1, -1),  // SW
        (0, -1),  // W
        (-1, -1), // NW
        (-1, 0),  // N
        (-1, 1),  // NE
    ];

    /// Distance multipliers for each entry of [`CODES`]
    pub const DISTANCES: [f64; 8] = [
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
    ];

    /// Position of `code` in [`CODES`], if it is a direction
    pub fn index_of(code: u8) -> Option<usize> {
        if code == 0 || !code.is_power_of_two() {
            return None;
        }
        Some(code.trailing_zeros() as usize)
    }

    /// Neighbour `k` (index into [`OFFSETS`]) of (row, col), if inside the grid
    #[inline]
    pub fn neighbor(
        row: usize,
        col: usize,
        k: usize,
        rows: usize,
        cols: usize,
    ) -> Option<(usize, usize)> {
        let (dr, dc) = OFFSETS[k];
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
            return None;
        }
        Some((nr as usize, nc as usize))
    }

    /// Cell that (row, col) drains into under `code`.
    ///
    /// `None` for [`NO_FLOW`], [`NODATA`], invalid codes, and directions
    /// pointing off the grid.
    #[inline]
    pub fn downstream(
        row: usize,
        col: usize,
        code: u8,
        rows: usize,
        cols: usize,
    ) -> Option<(usize, usize)> {
        index_of(code).and_then(|k| neighbor(row, col, k, rows, cols))
    }

    /// Whether (row, col) lies on the outer ring of the grid
    #[inline]
    pub fn is_border(row: usize, col: usize, rows: usize, cols: usize) -> bool {
        row == 0 || col == 0 || row + 1 == rows || col + 1 == cols
    }
}

#[cfg(test)]
mod tests {
    use super::d8;

    #[test]
    fn test_d8_index_of() {
        assert_eq!(d8::index_of(1), Some(0));
        assert_eq!(d8::index_of(4), Some(2));
        assert_eq!(d8::index_of(128), Some(7));
        assert_eq!(d8::index_of(0), None);
        assert_eq!(d8::index_of(3), None);
        assert_eq!(d8::index_of(d8::NODATA), None);
    }

    #[test]
    fn test_d8_downstream_off_grid() {
        assert_eq!(d8::downstream(1, 1, 2, 3, 3), Some((2, 2)));
        assert_eq!(d8::downstream(0, 0, 64, 3, 3), None);
        assert_eq!(d8::downstream(2, 2, 1, 3, 3), None);
        assert_eq!(d8::downstream(1, 1, d8::NO_FLOW, 3, 3), None);
    }

    #[test]
    fn test_d8_offsets_point_back() {
        for k in 0..8 {
            let (dr, dc) = d8::OFFSETS[k];
            assert_eq!(d8::OFFSETS[(k + 4) % 8], (-dr, -dc));
        }
    }
}
