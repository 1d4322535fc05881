use std::fmt;

/// Structural identity of a tile: `(level, row, column)`.
///
/// Keys compare and hash by value, so two keys built independently for the
/// same triple address the same cache entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    pub level: u32,
    pub row: i32,
    pub column: i32,
}

impl TileKey {
    pub fn new(level: u32, row: i32, column: i32) -> Self {
        Self { level, row, column }
    }

    /// The tile one level coarser that covers this one.
    pub fn parent(&self) -> Option<TileKey> {
        if self.level == 0 {
            return None;
        }
        Some(TileKey::new(
            self.level - 1,
            self.row.div_euclid(2),
            self.column.div_euclid(2),
        ))
    }

    /// The ancestor at `level`, or `self` when `level` is this key's level.
    pub fn ancestor_at(&self, level: u32) -> Option<TileKey> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;
        Some(TileKey::new(
            level,
            self.row >> shift,
            self.column >> shift,
        ))
    }

    /// The four tiles at the next level, in `(2r,2c), (2r,2c+1), (2r+1,2c),
    /// (2r+1,2c+1)` order.
    pub fn children(&self) -> [TileKey; 4] {
        let level = self.level + 1;
        let row = self.row * 2;
        let column = self.column * 2;
        [
            TileKey::new(level, row, column),
            TileKey::new(level, row, column + 1),
            TileKey::new(level, row + 1, column),
            TileKey::new(level, row + 1, column + 1),
        ]
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::TileKey;
    use std::collections::HashSet;

    #[test]
    fn children_follow_quadtree_addressing() {
        let key = TileKey::new(2, 3, 5);
        assert_eq!(
            key.children(),
            [
                TileKey::new(3, 6, 10),
                TileKey::new(3, 6, 11),
                TileKey::new(3, 7, 10),
                TileKey::new(3, 7, 11),
            ]
        );
        for child in key.children() {
            assert_eq!(child.parent(), Some(key));
        }
    }

    #[test]
    fn ancestors_halve_indices() {
        let key = TileKey::new(3, 13, 6);
        assert_eq!(key.ancestor_at(3), Some(key));
        assert_eq!(key.ancestor_at(1), Some(TileKey::new(1, 3, 1)));
        assert_eq!(key.ancestor_at(0), Some(TileKey::new(0, 1, 0)));
        assert_eq!(key.ancestor_at(4), None);
        assert_eq!(TileKey::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn keys_are_interchangeable_by_value() {
        let mut set = HashSet::new();
        set.insert(TileKey::new(1, 2, 3));
        assert!(set.contains(&TileKey::new(1, 2, 3)));
        assert_eq!(TileKey::new(1, 2, 3).to_string(), "1/2/3");
    }
}
