//! Coordinate extraction from histogram names
//!
//! Names are matched against a fixed list of case-insensitive patterns, in
//! order. The first pattern that matches and whose captures both fit in an
//! `i32` decides the cell.

use lazy_static::lazy_static;
use regex::Regex;

use crate::index::Cell;

lazy_static! {
    static ref CELL_PATTERNS: Vec<Regex> = [
        // "ieta_5 ... iphi_12" as standalone words
        r"(?i)^.*?\bieta\s*_?(-?\d+)\b.*?\biphi\s*_?(\d+)\b",
        // "ieta 5 ... phi 12"
        r"(?i)^.*?\bieta\s*_?(-?\d+)\b.*?\bphi\s*_?(\d+)\b",
        // glued forms such as "h_ieta5_iphi12"
        r"(?i)^.*?ieta(-?\d+).*?iphi(\d+)",
        r"(?i)^.*?ieta(-?\d+).*?phi(\d+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("cell pattern is valid"))
    .collect();
}

/// Parse an `(ieta, iphi)` pair out of a histogram display name
pub fn extract_cell(name: &str) -> Option<Cell> {
    CELL_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(name)?;
        let ieta = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let iphi = caps.get(2)?.as_str().parse::<i32>().ok()?;
        Some(Cell::new(ieta, iphi))
    })
}

/// Strip the `;cycle` suffix from a key
pub fn display_name(key: &str) -> &str {
    key.split_once(';').map_or(key, |(name, _)| name)
}
