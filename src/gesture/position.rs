//! Screen edge positions and position masks
//!
//! Four edges, each with a fixed index and bit flag. A [`PositionMask`] is
//! the set of edges a listener (or the aggregate of all listeners) wants
//! armed. [`GestureFlag::Unrestricted`] is a modifier rather than an edge: it
//! switches off the corner band that normally keeps the outer 10% of each
//! edge from triggering.

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};

/// Bit flags usable in a [`PositionMask`]
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureFlag {
    /// Left edge
    Left = 0x01,
    /// Bottom edge
    Bottom = 0x02,
    /// Right edge
    Right = 0x04,
    /// Top edge
    Top = 0x08,
    /// Accept touches over the full length of an edge, corners included
    Unrestricted = 0x10,
}

/// Set of armed edges plus modifiers
pub type PositionMask = BitFlags<GestureFlag>;

/// One of the four screen edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GesturePosition {
    /// Left edge
    Left,
    /// Bottom edge
    Bottom,
    /// Right edge
    Right,
    /// Top edge
    Top,
}

impl GesturePosition {
    /// All edges in index order
    pub const ALL: [GesturePosition; 4] = [
        GesturePosition::Left,
        GesturePosition::Bottom,
        GesturePosition::Right,
        GesturePosition::Top,
    ];

    /// Stable index of this edge
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Bottom => 1,
            Self::Right => 2,
            Self::Top => 3,
        }
    }

    /// Edge for an index, if in range
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Bit flag of this edge (`1 << index`)
    pub fn flag(self) -> GestureFlag {
        match self {
            Self::Left => GestureFlag::Left,
            Self::Bottom => GestureFlag::Bottom,
            Self::Right => GestureFlag::Right,
            Self::Top => GestureFlag::Top,
        }
    }

    /// Single-edge mask
    pub fn mask(self) -> PositionMask {
        self.flag().into()
    }

    /// Whether the edge is horizontal (gesture travels along the y axis)
    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Bottom | Self::Top)
    }
}

impl std::fmt::Display for GesturePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Bottom => write!(f, "bottom"),
            Self::Right => write!(f, "right"),
            Self::Top => write!(f, "top"),
        }
    }
}

impl std::str::FromStr for GesturePosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "bottom" => Ok(Self::Bottom),
            "right" => Ok(Self::Right),
            "top" => Ok(Self::Top),
            _ => Err(format!("Unknown edge position: {}", s)),
        }
    }
}

/// Edges contained in a mask, in index order. Modifier flags are skipped.
pub fn positions_in(mask: PositionMask) -> impl Iterator<Item = GesturePosition> {
    GesturePosition::ALL
        .into_iter()
        .filter(move |p| mask.contains(p.flag()))
}

/// Edge-only part of a mask
pub fn edges_of(mask: PositionMask) -> PositionMask {
    mask & !PositionMask::from(GestureFlag::Unrestricted)
}

/// Parse a comma separated list such as `"left,bottom,unrestricted"`
pub fn parse_mask(s: &str) -> Result<PositionMask, String> {
    let mut mask = PositionMask::empty();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.eq_ignore_ascii_case("unrestricted") {
            mask |= GestureFlag::Unrestricted;
        } else {
            mask |= part.parse::<GesturePosition>()?.flag();
        }
    }
    Ok(mask)
}

/// Render a mask in the format accepted by [`parse_mask`]
pub fn format_mask(mask: PositionMask) -> String {
    let mut parts: Vec<String> = positions_in(mask).map(|p| p.to_string()).collect();
    if mask.contains(GestureFlag::Unrestricted) {
        parts.push("unrestricted".to_string());
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_match_indices() {
        for position in GesturePosition::ALL {
            assert_eq!(
                position.mask().bits(),
                1u8 << position.index(),
                "flag of {} must be 1 << index",
                position
            );
            assert_eq!(GesturePosition::from_index(position.index()), Some(position));
        }
        assert_eq!(GesturePosition::from_index(4), None);
    }

    #[test]
    fn test_positions_in_skips_modifier() {
        let mask = GestureFlag::Right | GestureFlag::Left | GestureFlag::Unrestricted;
        let positions: Vec<_> = positions_in(mask).collect();
        assert_eq!(positions, vec![GesturePosition::Left, GesturePosition::Right]);
        assert_eq!(edges_of(mask), GestureFlag::Left | GestureFlag::Right);
    }

    #[test]
    fn test_parse_and_format_mask() {
        let mask = parse_mask("left, TOP,unrestricted").unwrap();
        assert!(mask.contains(GestureFlag::Left));
        assert!(mask.contains(GestureFlag::Top));
        assert!(mask.contains(GestureFlag::Unrestricted));
        assert_eq!(format_mask(mask), "left,top,unrestricted");

        assert_eq!(parse_mask("").unwrap(), PositionMask::empty());
        assert_eq!(format_mask(PositionMask::empty()), "none");
        assert!(parse_mask("left,middle").is_err());
    }

    #[test]
    fn test_orientation() {
        assert!(GesturePosition::Top.is_horizontal());
        assert!(GesturePosition::Bottom.is_horizontal());
        assert!(!GesturePosition::Left.is_horizontal());
    }
}
