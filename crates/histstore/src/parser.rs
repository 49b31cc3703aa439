//! HGRID container format parser using nom
//!
//! File format (all integers little-endian):
//! ```text
//! HGRID01\n
//! [version: u32]
//! [entry_count: u32]
//! [index_offset: u64]
//! ...payloads (raw or zlib)...
//! ...entry table at index_offset...
//! ```
//!
//! Entry record:
//! ```text
//! [path_len: u16][path: utf-8][cycle: u16][kind: u8][codec: u8]
//! [payload_offset: u64][payload_len: u32]
//! ```
//!
//! Hist1D payload (after decoding):
//! ```text
//! [title_len: u16][title: utf-8][n_bins: u32]
//! [edges: (n_bins + 1) x f64][counts: n_bins x f64]
//! [underflow: f64][overflow: f64]
//! ```

use nom::{
    combinator::{all_consuming, map_opt, map_res},
    error::ErrorKind,
    multi::{count, length_data},
    number::complete::{le_f64, le_u16, le_u32, le_u64, le_u8},
    sequence::tuple,
    IResult,
};

use crate::error::{Error, Result};
use crate::histogram::Histogram;

/// Magic header for HGRID containers
pub const HGRID_MAGIC: &[u8] = b"HGRID01\n";

/// Container format version written and accepted by this crate
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header
pub const HEADER_LEN: usize = HGRID_MAGIC.len() + 4 + 4 + 8;

/// Smallest possible entry record (empty path)
const MIN_ENTRY_LEN: usize = 2 + 2 + 1 + 1 + 8 + 4;

/// Container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// File format version
    pub version: u32,
    /// Number of records in the entry table
    pub entry_count: u32,
    /// Absolute offset of the entry table
    pub index_offset: u64,
}

/// What an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory marker, no payload
    Directory,
    /// One-dimensional histogram
    Hist1D,
    /// Anything else; carried but never indexed
    Object,
}

impl EntryKind {
    fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EntryKind::Directory),
            1 => Some(EntryKind::Hist1D),
            2 => Some(EntryKind::Object),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EntryKind::Directory => 0,
            EntryKind::Hist1D => 1,
            EntryKind::Object => 2,
        }
    }
}

/// Payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Stored as-is
    Raw,
    /// zlib stream
    Zlib,
}

impl Codec {
    fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Codec::Raw),
            1 => Some(Codec::Zlib),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Codec::Raw => 0,
            Codec::Zlib => 1,
        }
    }
}

/// One record of the entry table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// `/`-separated location inside the container
    pub path: String,
    /// Cycle number; repeated paths get increasing cycles
    pub cycle: u16,
    /// Payload kind
    pub kind: EntryKind,
    /// Payload encoding
    pub codec: Codec,
    /// Absolute payload offset
    pub offset: u64,
    /// Encoded payload length
    pub len: u32,
}

impl EntryRecord {
    /// Full key, `path;cycle`
    pub fn key(&self) -> String {
        format!("{};{}", self.path, self.cycle)
    }

    /// True for entries that decode to a histogram
    pub fn is_histogram(&self) -> bool {
        self.kind == EntryKind::Hist1D
    }
}

fn header_fields(input: &[u8]) -> IResult<&[u8], (u32, u32, u64)> {
    tuple((le_u32, le_u32, le_u64))(input)
}

/// Parse the container header
pub fn parse_header(input: &[u8]) -> Result<ContainerHeader> {
    if input.len() < HEADER_LEN {
        return Err(Error::Parse("Input too short for header".to_string()));
    }

    if &input[0..HGRID_MAGIC.len()] != HGRID_MAGIC {
        return Err(Error::Parse("Invalid HGRID magic header".to_string()));
    }

    let (_, (version, entry_count, index_offset)) =
        header_fields(&input[HGRID_MAGIC.len()..HEADER_LEN])?;

    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    Ok(ContainerHeader {
        version,
        entry_count,
        index_offset,
    })
}

/// Encode a container header
pub fn encode_header(header: &ContainerHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(HGRID_MAGIC);
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.entry_count.to_le_bytes());
    out.extend_from_slice(&header.index_offset.to_le_bytes());
    out
}

fn utf8_string(input: &[u8]) -> IResult<&[u8], &str> {
    map_res(length_data(le_u16), std::str::from_utf8)(input)
}

fn entry_record(input: &[u8]) -> IResult<&[u8], EntryRecord> {
    let (input, path) = utf8_string(input)?;
    let (input, cycle) = le_u16(input)?;
    let (input, kind) = map_opt(le_u8, EntryKind::from_u8)(input)?;
    let (input, codec) = map_opt(le_u8, Codec::from_u8)(input)?;
    let (input, (offset, len)) = tuple((le_u64, le_u32))(input)?;

    Ok((
        input,
        EntryRecord {
            path: path.to_string(),
            cycle,
            kind,
            codec,
            offset,
            len,
        },
    ))
}

/// Parse `entries` records from the entry table
pub fn parse_entry_table(input: &[u8], entries: u32) -> Result<Vec<EntryRecord>> {
    let entries = entries as usize;
    if input.len() / MIN_ENTRY_LEN < entries {
        return Err(Error::Parse(format!(
            "entry table too short for {} entries ({} bytes)",
            entries,
            input.len()
        )));
    }

    let (_, records) = count(entry_record, entries)(input)?;
    Ok(records)
}

/// Append an encoded entry record to `out`
pub fn encode_entry(record: &EntryRecord, out: &mut Vec<u8>) -> Result<()> {
    let path_len = u16::try_from(record.path.len())
        .map_err(|_| Error::Parse(format!("path too long: {} bytes", record.path.len())))?;

    out.extend_from_slice(&path_len.to_le_bytes());
    out.extend_from_slice(record.path.as_bytes());
    out.extend_from_slice(&record.cycle.to_le_bytes());
    out.push(record.kind.as_u8());
    out.push(record.codec.as_u8());
    out.extend_from_slice(&record.offset.to_le_bytes());
    out.extend_from_slice(&record.len.to_le_bytes());
    Ok(())
}

fn hist1d(input: &[u8]) -> IResult<&[u8], Histogram> {
    let (input, title) = utf8_string(input)?;
    let (input, n_bins) = le_u32(input)?;

    // edges + counts + two flow bins
    let n = n_bins as usize;
    let needed = n.saturating_mul(2).saturating_add(3).saturating_mul(8);
    if input.len() < needed {
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Eof)));
    }

    let (input, edges) = count(le_f64, n + 1)(input)?;
    let (input, counts) = count(le_f64, n)(input)?;
    let (input, (underflow, overflow)) = tuple((le_f64, le_f64))(input)?;

    Ok((
        input,
        Histogram {
            title: title.to_string(),
            edges,
            counts,
            underflow,
            overflow,
        },
    ))
}

/// Parse a decoded Hist1D payload
pub fn parse_hist1d(input: &[u8]) -> Result<Histogram> {
    let (_, hist) = all_consuming(hist1d)(input)?;
    hist.validate()?;
    Ok(hist)
}

/// Encode a histogram as a Hist1D payload
pub fn encode_hist1d(hist: &Histogram) -> Result<Vec<u8>> {
    hist.validate()?;

    let title_len = u16::try_from(hist.title.len())
        .map_err(|_| Error::Parse(format!("title too long: {} bytes", hist.title.len())))?;
    let n_bins = u32::try_from(hist.counts.len())
        .map_err(|_| Error::Parse(format!("too many bins: {}", hist.counts.len())))?;

    let floats = hist.edges.len() + hist.counts.len() + 2;
    let mut out = Vec::with_capacity(2 + hist.title.len() + 4 + floats * 8);
    out.extend_from_slice(&title_len.to_le_bytes());
    out.extend_from_slice(hist.title.as_bytes());
    out.extend_from_slice(&n_bins.to_le_bytes());
    for edge in &hist.edges {
        out.extend_from_slice(&edge.to_le_bytes());
    }
    for value in &hist.counts {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&hist.underflow.to_le_bytes());
    out.extend_from_slice(&hist.overflow.to_le_bytes());
    Ok(out)
}

/// Slice `len` bytes starting at `offset`, checking bounds
pub fn payload_slice(input: &[u8], offset: u64, len: u32) -> Result<&[u8]> {
    let start = usize::try_from(offset)
        .map_err(|_| Error::Parse(format!("payload offset {} out of range", offset)))?;
    if start > input.len() {
        return Err(Error::Parse(format!(
            "payload offset {} beyond end of file ({} bytes)",
            offset,
            input.len()
        )));
    }
    let end = start
        .checked_add(len as usize)
        .filter(|&end| end <= input.len())
        .ok_or_else(|| {
            Error::Parse(format!(
                "payload at {} with {} bytes runs past end of file",
                offset, len
            ))
        })?;
    Ok(&input[start..end])
}
