//! Embedded pakfile access.
//!
//! The last lump of a map is a plain ZIP archive carrying map-specific
//! assets: cubemap patches, per-map materials, and the baked vertex
//! lighting files for static props. Entry lookup is case-insensitive with
//! normalized separators, because the engine's file system is.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::Result;

/// The map's embedded asset archive.
pub struct PakFile {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    entries: HashMap<String, usize>,
}

impl PakFile {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;

        let mut entries = HashMap::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            entries.insert(normalize(entry.name()), index);
        }

        Ok(Self { archive, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize(path))
    }

    /// Normalized names of every entry.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Read one entry's full contents.
    pub fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let index = *self
            .entries
            .get(&normalize(path))
            .ok_or(zip::result::ZipError::FileNotFound)?;
        let mut entry = self.archive.by_index(index)?;
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        Ok(contents)
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_ascii_lowercase()
}
