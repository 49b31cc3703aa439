//! Memory-mapped container reader
//!
//! The whole file is mapped once at open time; the entry table is parsed
//! eagerly and every payload range is bounds-checked so later reads only
//! slice the map.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::histogram::Histogram;
use crate::parser::{
    parse_entry_table, parse_header, parse_hist1d, payload_slice, Codec, ContainerHeader,
    EntryRecord, HEADER_LEN,
};

/// Maximum decoded payload size (256 MB)
const MAX_PAYLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Read-only handle on an HGRID container
pub struct HistFile {
    mmap: Mmap,
    header: ContainerHeader,
    entries: Vec<EntryRecord>,
    /// (path, cycle) -> position in `entries`
    lookup: HashMap<(String, u16), usize>,
    /// path -> position of its highest cycle
    latest: HashMap<String, usize>,
}

impl HistFile {
    /// Open and validate a container
    ///
    /// # Arguments
    /// * `path` - Container file path
    ///
    /// # Returns
    /// * `Result<HistFile>` - Handle with the entry table loaded
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN as u64 {
            return Err(Error::Parse(format!(
                "file too short for header: {} bytes",
                file_len
            )));
        }

        // SAFETY: uploads are written once and never modified while mapped.
        let mmap = unsafe { Mmap::map(&file)? };

        let header = parse_header(&mmap)?;
        let table = usize::try_from(header.index_offset)
            .ok()
            .filter(|&offset| offset >= HEADER_LEN && offset <= mmap.len())
            .ok_or_else(|| {
                Error::Parse(format!(
                    "entry table offset {} outside file ({} bytes)",
                    header.index_offset,
                    mmap.len()
                ))
            })?;
        let entries = parse_entry_table(&mmap[table..], header.entry_count)?;

        let mut lookup = HashMap::with_capacity(entries.len());
        let mut latest: HashMap<String, usize> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            payload_slice(&mmap, entry.offset, entry.len)?;
            lookup.insert((entry.path.clone(), entry.cycle), idx);

            let newer = latest
                .get(&entry.path)
                .map_or(true, |&prev| entries[prev].cycle <= entry.cycle);
            if newer {
                latest.insert(entry.path.clone(), idx);
            }
        }

        Ok(Self {
            mmap,
            header,
            entries,
            lookup,
            latest,
        })
    }

    /// Parsed header
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Number of entries of any kind
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the container holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in file order, directories included
    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    /// All keys in file order
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(EntryRecord::key)
    }

    /// Keys of histogram entries only, in file order
    pub fn histogram_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.is_histogram())
            .map(EntryRecord::key)
            .collect()
    }

    /// Resolve a key to its entry.
    ///
    /// `path;cycle` selects an exact cycle; a bare path selects the highest
    /// cycle stored under it.
    pub fn find(&self, key: &str) -> Option<&EntryRecord> {
        if let Some((path, cycle)) = key.rsplit_once(';') {
            if let Ok(cycle) = cycle.parse::<u16>() {
                return self
                    .lookup
                    .get(&(path.to_string(), cycle))
                    .map(|&idx| &self.entries[idx]);
            }
        }
        self.latest.get(key).map(|&idx| &self.entries[idx])
    }

    /// Decode the histogram stored under `key`
    pub fn read_histogram(&self, key: &str) -> Result<Histogram> {
        let entry = self
            .find(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        if !entry.is_histogram() {
            return Err(Error::NotAHistogram(key.to_string()));
        }

        let payload = self.payload(entry)?;
        parse_hist1d(&payload)
    }

    /// Decoded payload bytes of any entry
    pub fn read_raw(&self, key: &str) -> Result<Vec<u8>> {
        let entry = self
            .find(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        self.payload(entry)
    }

    fn payload(&self, entry: &EntryRecord) -> Result<Vec<u8>> {
        let raw = payload_slice(&self.mmap, entry.offset, entry.len)?;
        match entry.codec {
            Codec::Raw => Ok(raw.to_vec()),
            Codec::Zlib => {
                let mut decoded = Vec::new();
                ZlibDecoder::new(raw)
                    .take(MAX_PAYLOAD_SIZE + 1)
                    .read_to_end(&mut decoded)?;
                if decoded.len() as u64 > MAX_PAYLOAD_SIZE {
                    return Err(Error::Parse(format!(
                        "payload of {} exceeds {} bytes when decoded",
                        entry.key(),
                        MAX_PAYLOAD_SIZE
                    )));
                }
                Ok(decoded)
            }
        }
    }
}
