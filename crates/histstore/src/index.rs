//! Grid indexing: detector cell -> histogram key
//!
//! Two strategies:
//! - **by name**: coordinates parsed from each histogram's display name
//! - **by position**: histograms assigned to cells in file order, following
//!   the declared scan order
//!
//! Name-based mapping wins whenever it yields at least one cell.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::container::HistFile;
use crate::error::{Error, Result};
use crate::naming::{display_name, extract_cell};

/// One detector cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cell {
    /// Pseudorapidity index
    pub ieta: i32,
    /// Azimuthal index
    pub iphi: i32,
}

impl Cell {
    /// Create a cell
    pub fn new(ieta: i32, iphi: i32) -> Self {
        Self { ieta, iphi }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.ieta, self.iphi)
    }
}

/// Fill order for positional assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    /// ieta outer loop, iphi inner
    #[default]
    IetaMajor,
    /// iphi outer loop, ieta inner
    IphiMajor,
}

impl ScanOrder {
    /// Form-field spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOrder::IetaMajor => "ieta-major",
            ScanOrder::IphiMajor => "iphi-major",
        }
    }
}

impl fmt::Display for ScanOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ieta-major" => Ok(ScanOrder::IetaMajor),
            "iphi-major" => Ok(ScanOrder::IphiMajor),
            _ => Err(Error::InvalidOrder(s.to_string())),
        }
    }
}

/// Declared grid extent and scan order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    /// Number of ieta rows
    pub n_ieta: u32,
    /// Number of iphi columns
    pub n_iphi: u32,
    /// First ieta value
    pub ieta_min: i32,
    /// First iphi value
    pub iphi_min: i32,
    /// Positional fill order
    pub order: ScanOrder,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            n_ieta: Self::DEFAULT_N_IETA,
            n_iphi: Self::DEFAULT_N_IPHI,
            ieta_min: 0,
            iphi_min: 0,
            order: ScanOrder::IetaMajor,
        }
    }
}

impl GridSpec {
    /// Default number of ieta rows
    pub const DEFAULT_N_IETA: u32 = 96;

    /// Default number of iphi columns
    pub const DEFAULT_N_IPHI: u32 = 256;

    /// Build and validate a grid
    pub fn new(
        n_ieta: u32,
        n_iphi: u32,
        ieta_min: i32,
        iphi_min: i32,
        order: ScanOrder,
    ) -> Result<Self> {
        let grid = Self {
            n_ieta,
            n_iphi,
            ieta_min,
            iphi_min,
            order,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Reject empty grids and ranges that leave `i32`
    pub fn validate(&self) -> Result<()> {
        if self.n_ieta == 0 || self.n_iphi == 0 {
            return Err(Error::InvalidGrid(format!(
                "dimensions must be positive, got {} x {}",
                self.n_ieta, self.n_iphi
            )));
        }
        let ieta_max = i64::from(self.ieta_min) + i64::from(self.n_ieta) - 1;
        let iphi_max = i64::from(self.iphi_min) + i64::from(self.n_iphi) - 1;
        if ieta_max > i64::from(i32::MAX) || iphi_max > i64::from(i32::MAX) {
            return Err(Error::InvalidGrid(
                "coordinate range exceeds 32-bit integers".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of cells in the grid
    pub fn total_cells(&self) -> u64 {
        u64::from(self.n_ieta) * u64::from(self.n_iphi)
    }

    /// ieta values covered by the grid
    pub fn ieta_range(&self) -> RangeInclusive<i32> {
        self.ieta_min..=self.ieta_min.saturating_add_unsigned(self.n_ieta.saturating_sub(1))
    }

    /// iphi values covered by the grid
    pub fn iphi_range(&self) -> RangeInclusive<i32> {
        self.iphi_min..=self.iphi_min.saturating_add_unsigned(self.n_iphi.saturating_sub(1))
    }

    /// True if the cell lies inside the declared extent
    pub fn contains(&self, cell: Cell) -> bool {
        self.ieta_range().contains(&cell.ieta) && self.iphi_range().contains(&cell.iphi)
    }

    fn cell_at(&self, i: u32, j: u32) -> Cell {
        Cell::new(
            self.ieta_min.saturating_add_unsigned(i),
            self.iphi_min.saturating_add_unsigned(j),
        )
    }
}

/// How an index was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStrategy {
    /// Coordinates parsed from names
    ByName,
    /// Positional fallback
    ByPosition,
}

impl IndexStrategy {
    /// Short label used in logs and JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStrategy::ByName => "by-name",
            IndexStrategy::ByPosition => "by-position",
        }
    }
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable cell -> key mapping for one upload
#[derive(Debug, Clone, PartialEq)]
pub struct CellIndex {
    cells: BTreeMap<Cell, String>,
    strategy: IndexStrategy,
}

impl CellIndex {
    /// Wrap an existing mapping
    pub fn new(cells: BTreeMap<Cell, String>, strategy: IndexStrategy) -> Self {
        Self { cells, strategy }
    }

    /// Histogram key for a cell
    pub fn get(&self, cell: Cell) -> Option<&str> {
        self.cells.get(&cell).map(String::as_str)
    }

    /// Number of mapped cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if no cell is mapped
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Strategy that produced this index
    pub fn strategy(&self) -> IndexStrategy {
        self.strategy
    }

    /// Mapped cells in (ieta, iphi) order
    pub fn iter(&self) -> impl Iterator<Item = (Cell, &str)> + '_ {
        self.cells.iter().map(|(cell, key)| (*cell, key.as_str()))
    }
}

/// Map cells by parsing names. Later keys overwrite earlier ones.
pub fn index_by_name<S: AsRef<str>>(keys: &[S]) -> BTreeMap<Cell, String> {
    let mut cells = BTreeMap::new();
    for key in keys {
        let key = key.as_ref();
        if let Some(cell) = extract_cell(display_name(key)) {
            cells.insert(cell, key.to_string());
        }
    }
    cells
}

/// Map cells by position. Only the first `grid.total_cells()` keys are used.
pub fn index_by_position<S: AsRef<str>>(
    keys: &[S],
    grid: &GridSpec,
) -> Result<BTreeMap<Cell, String>> {
    grid.validate()?;

    let mut cells = BTreeMap::new();
    let mut keys = keys.iter();

    let (outer, inner) = match grid.order {
        ScanOrder::IetaMajor => (grid.n_ieta, grid.n_iphi),
        ScanOrder::IphiMajor => (grid.n_iphi, grid.n_ieta),
    };

    for a in 0..outer {
        for b in 0..inner {
            let Some(key) = keys.next() else {
                return Ok(cells);
            };
            let cell = match grid.order {
                ScanOrder::IetaMajor => grid.cell_at(a, b),
                ScanOrder::IphiMajor => grid.cell_at(b, a),
            };
            cells.insert(cell, key.as_ref().to_string());
        }
    }

    Ok(cells)
}

/// Index a list of histogram keys: by name first, positional fallback.
pub fn index_keys<S: AsRef<str>>(keys: &[S], grid: &GridSpec) -> Result<CellIndex> {
    let by_name = index_by_name(keys);
    if !by_name.is_empty() {
        return Ok(CellIndex::new(by_name, IndexStrategy::ByName));
    }
    let by_position = index_by_position(keys, grid)?;
    Ok(CellIndex::new(by_position, IndexStrategy::ByPosition))
}

/// Index every histogram in a container
pub fn build_index(file: &HistFile, grid: &GridSpec) -> Result<CellIndex> {
    index_keys(&file.histogram_keys(), grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram;
    use crate::writer::ContainerWriter;
    use tempfile::TempDir;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("h{};1", i)).collect()
    }

    fn grid(n_ieta: u32, n_iphi: u32, order: ScanOrder) -> GridSpec {
        GridSpec::new(n_ieta, n_iphi, 0, 0, order).unwrap()
    }

    #[test]
    fn test_scan_order_parse() {
        assert_eq!("ieta-major".parse::<ScanOrder>().unwrap(), ScanOrder::IetaMajor);
        assert_eq!(" IPHI-Major ".parse::<ScanOrder>().unwrap(), ScanOrder::IphiMajor);
        assert!(matches!(
            "diagonal".parse::<ScanOrder>(),
            Err(Error::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_grid_validation() {
        assert!(GridSpec::new(0, 10, 0, 0, ScanOrder::IetaMajor).is_err());
        assert!(GridSpec::new(10, 0, 0, 0, ScanOrder::IetaMajor).is_err());
        assert!(GridSpec::new(10, 10, i32::MAX - 5, 0, ScanOrder::IetaMajor).is_err());
        assert!(GridSpec::new(96, 256, -48, 1, ScanOrder::IetaMajor).is_ok());
    }

    #[test]
    fn test_grid_defaults() {
        let grid = GridSpec::default();
        assert_eq!(grid.total_cells(), 96 * 256);
        assert_eq!(grid.ieta_range(), 0..=95);
        assert_eq!(grid.iphi_range(), 0..=255);
        assert!(grid.contains(Cell::new(95, 255)));
        assert!(!grid.contains(Cell::new(96, 0)));
    }

    #[test]
    fn test_ieta_major_fill() {
        let cells = index_by_position(&keys(6), &grid(2, 3, ScanOrder::IetaMajor)).unwrap();

        assert_eq!(cells[&Cell::new(0, 0)], "h0;1");
        assert_eq!(cells[&Cell::new(0, 2)], "h2;1");
        assert_eq!(cells[&Cell::new(1, 0)], "h3;1");
        assert_eq!(cells[&Cell::new(1, 2)], "h5;1");
    }

    #[test]
    fn test_iphi_major_fill() {
        let cells = index_by_position(&keys(6), &grid(2, 3, ScanOrder::IphiMajor)).unwrap();

        assert_eq!(cells[&Cell::new(0, 0)], "h0;1");
        assert_eq!(cells[&Cell::new(1, 0)], "h1;1");
        assert_eq!(cells[&Cell::new(0, 1)], "h2;1");
        assert_eq!(cells[&Cell::new(1, 2)], "h5;1");
    }

    #[test]
    fn test_position_offsets() {
        let grid = GridSpec::new(2, 2, -1, 1, ScanOrder::IetaMajor).unwrap();
        let cells = index_by_position(&keys(4), &grid).unwrap();

        let mapped: Vec<Cell> = cells.keys().copied().collect();
        assert_eq!(
            mapped,
            vec![
                Cell::new(-1, 1),
                Cell::new(-1, 2),
                Cell::new(0, 1),
                Cell::new(0, 2)
            ]
        );
    }

    #[test]
    fn test_position_truncates_extra_keys() {
        let cells = index_by_position(&keys(10), &grid(2, 2, ScanOrder::IetaMajor)).unwrap();
        assert_eq!(cells.len(), 4);
        assert!(!cells.values().any(|k| k == "h4;1"));
    }

    #[test]
    fn test_position_fewer_keys_than_cells() {
        let cells = index_by_position(&keys(3), &grid(2, 2, ScanOrder::IetaMajor)).unwrap();
        assert_eq!(cells.len(), 3);
        assert!(!cells.contains_key(&Cell::new(1, 1)));
    }

    #[test]
    fn test_position_no_keys() {
        let cells = index_by_position(&keys(0), &GridSpec::default()).unwrap();
        assert!(cells.is_empty());
    }

    #[test]
    fn test_name_later_key_wins() {
        let keys = vec!["a/ieta1_iphi2;1", "b/ieta1_iphi2;1", "summary;1"];
        let cells = index_by_name(&keys);

        assert_eq!(cells.len(), 1);
        assert_eq!(cells[&Cell::new(1, 2)], "b/ieta1_iphi2;1");
    }

    #[test]
    fn test_name_takes_precedence() {
        let keys = vec!["first;1", "h_ieta7_iphi9;1", "third;1"];
        let index = index_keys(&keys, &GridSpec::default()).unwrap();

        assert_eq!(index.strategy(), IndexStrategy::ByName);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(Cell::new(7, 9)), Some("h_ieta7_iphi9;1"));
        assert_eq!(index.get(Cell::new(0, 0)), None);
    }

    #[test]
    fn test_fallback_when_no_names_match() {
        let index = index_keys(&keys(3), &grid(4, 4, ScanOrder::IetaMajor)).unwrap();

        assert_eq!(index.strategy(), IndexStrategy::ByPosition);
        assert_eq!(index.get(Cell::new(0, 2)), Some("h2;1"));
    }

    #[test]
    fn test_build_index_skips_non_histograms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grid.hgrid");
        let hist = Histogram::uniform("h", 0.0, 1.0, vec![1.0]).unwrap();

        let mut writer = ContainerWriter::new();
        writer.add_directory("ieta1_iphi1").unwrap();
        writer.add_object("ieta2_iphi2", b"x").unwrap();
        writer.add_histogram("cells/ieta3_iphi4", &hist).unwrap();
        writer.finish(&path).unwrap();

        let file = HistFile::open(&path).unwrap();
        let index = build_index(&file, &GridSpec::default()).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(Cell::new(3, 4)), Some("cells/ieta3_iphi4;1"));
        assert_eq!(index.get(Cell::new(1, 1)), None);
    }
}
