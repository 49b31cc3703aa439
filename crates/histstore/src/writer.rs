//! Container writer
//!
//! Builds HGRID files in memory: payloads first, entry table last, header
//! patched with the table offset.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::histogram::Histogram;
use crate::parser::{
    encode_entry, encode_header, encode_hist1d, Codec, ContainerHeader, EntryKind, EntryRecord,
    FORMAT_VERSION, HEADER_LEN,
};

struct PendingEntry {
    path: String,
    cycle: u16,
    kind: EntryKind,
    payload: Vec<u8>,
}

/// Accumulates entries and serializes them as an HGRID container
#[derive(Default)]
pub struct ContainerWriter {
    compress: bool,
    entries: Vec<PendingEntry>,
    cycles: HashMap<String, u16>,
}

impl ContainerWriter {
    /// Create an empty writer (payloads stored raw)
    pub fn new() -> Self {
        Self::default()
    }

    /// Store histogram and object payloads zlib-compressed
    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Number of entries added so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been added
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a directory marker. Returns the entry key.
    pub fn add_directory(&mut self, path: &str) -> Result<String> {
        self.push(path, EntryKind::Directory, Vec::new())
    }

    /// Add a histogram. Returns the entry key (`path;cycle`).
    pub fn add_histogram(&mut self, path: &str, hist: &Histogram) -> Result<String> {
        let payload = encode_hist1d(hist)?;
        self.push(path, EntryKind::Hist1D, payload)
    }

    /// Add an opaque object that readers list but never index.
    pub fn add_object(&mut self, path: &str, bytes: &[u8]) -> Result<String> {
        self.push(path, EntryKind::Object, bytes.to_vec())
    }

    fn push(&mut self, path: &str, kind: EntryKind, payload: Vec<u8>) -> Result<String> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(Error::Parse("entry path must not be empty".to_string()));
        }
        if path.contains(';') {
            return Err(Error::Parse(format!("entry path must not contain ';': {}", path)));
        }
        if path.len() > u16::MAX as usize {
            return Err(Error::Parse(format!("path too long: {} bytes", path.len())));
        }

        let cycle = match self.cycles.get(path) {
            Some(&last) => last
                .checked_add(1)
                .ok_or_else(|| Error::Parse(format!("too many cycles for {}", path)))?,
            None => 1,
        };
        self.cycles.insert(path.to_string(), cycle);

        let key = format!("{};{}", path, cycle);
        self.entries.push(PendingEntry {
            path: path.to_string(),
            cycle,
            kind,
            payload,
        });
        Ok(key)
    }

    /// Serialize the container
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let entry_count = u32::try_from(self.entries.len())
            .map_err(|_| Error::Parse(format!("too many entries: {}", self.entries.len())))?;

        let mut out = vec![0u8; HEADER_LEN];
        let mut records = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let (codec, payload) = if self.compress && entry.kind != EntryKind::Directory {
                (Codec::Zlib, zlib(&entry.payload)?)
            } else {
                (Codec::Raw, entry.payload.clone())
            };
            let len = u32::try_from(payload.len())
                .map_err(|_| Error::Parse(format!("payload too large: {} bytes", payload.len())))?;

            records.push(EntryRecord {
                path: entry.path.clone(),
                cycle: entry.cycle,
                kind: entry.kind,
                codec,
                offset: out.len() as u64,
                len,
            });
            out.extend_from_slice(&payload);
        }

        let index_offset = out.len() as u64;
        for record in &records {
            encode_entry(record, &mut out)?;
        }

        let header = encode_header(&ContainerHeader {
            version: FORMAT_VERSION,
            entry_count,
            index_offset,
        });
        out[..HEADER_LEN].copy_from_slice(&header);

        Ok(out)
    }

    /// Serialize and write the container to `path`
    pub fn finish<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

fn zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
