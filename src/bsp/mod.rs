//! Compiled map container.
//!
//! A map file is a small header plus 64 fixed directory entries, each
//! locating one lump. Only the lumps this crate decodes get typed
//! accessors; anything else can still be fetched as a raw byte slice.

pub mod pakfile;
pub mod props;
pub mod vis;

pub use pakfile::PakFile;
pub use props::{StaticProp, StaticPropFlags, StaticPropsLump};
pub use vis::Visibility;

use std::io::{Cursor, Read};

use crate::error::{Result, SourceError};
use crate::lump::LumpReader;

/// `VBSP` magic.
const BSP_ID: i32 = i32::from_le_bytes(*b"VBSP");
const LUMP_COUNT: usize = 64;

/// Static-prop game lump identifier, `sprp`.
const GAME_LUMP_STATIC_PROPS: i32 = i32::from_le_bytes(*b"sprp");

pub const LUMP_VISIBILITY: usize = 4;
pub const LUMP_LEAVES: usize = 10;
pub const LUMP_GAME: usize = 35;
pub const LUMP_PAKFILE: usize = 40;

#[derive(Debug, Clone, Copy)]
struct LumpEntry {
    offset: i32,
    length: i32,
    version: i32,
}

/// A map file held in memory, with its lump directory parsed.
pub struct BspFile {
    version: i32,
    map_revision: i32,
    lumps: Vec<LumpEntry>,
    data: Vec<u8>,
}

impl BspFile {
    pub fn read(mut stream: impl Read) -> Result<Self> {
        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mut reader = LumpReader::new(Cursor::new(&data))?;

        let id = reader.read_i32()?;
        if id != BSP_ID {
            return Err(SourceError::Malformed("missing map signature".to_string()));
        }
        let version = reader.read_i32()?;
        if !(19..=21).contains(&version) {
            return Err(SourceError::UnsupportedFormat(format!(
                "map version {version}"
            )));
        }

        let mut lumps = Vec::with_capacity(LUMP_COUNT);
        for index in 0..LUMP_COUNT {
            let offset = reader.read_i32()?;
            let length = reader.read_i32()?;
            let lump_version = reader.read_i32()?;
            let _four_cc = reader.read_i32()?;
            if offset < 0 || length < 0 {
                return Err(SourceError::Malformed(format!(
                    "lump {index} has negative extent {offset}+{length}"
                )));
            }
            lumps.push(LumpEntry {
                offset,
                length,
                version: lump_version,
            });
        }
        let map_revision = reader.read_i32()?;
        log::debug!("map version {version}, revision {map_revision}, {} bytes", data.len());

        Ok(Self {
            version,
            map_revision,
            lumps,
            data,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn map_revision(&self) -> i32 {
        self.map_revision
    }

    /// Raw bytes of one lump.
    pub fn lump_data(&self, index: usize) -> Result<&[u8]> {
        let entry = self.lumps.get(index).ok_or_else(|| {
            SourceError::Malformed(format!("lump index {index} outside directory"))
        })?;
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        self.data.get(start..end).ok_or_else(|| {
            SourceError::Malformed(format!(
                "lump {index} extent {start}..{end} outside map of {} bytes",
                self.data.len()
            ))
        })
    }

    pub fn lump_version(&self, index: usize) -> Result<i32> {
        self.lumps
            .get(index)
            .map(|entry| entry.version)
            .ok_or_else(|| {
                SourceError::Malformed(format!("lump index {index} outside directory"))
            })
    }

    /// Per-leaf visibility cluster ids from the leaves lump.
    pub fn leaf_clusters(&self) -> Result<Vec<i16>> {
        let data = self.lump_data(LUMP_LEAVES)?;
        // Leaf records shrank when the ambient lighting samples moved to
        // their own lump; the lump version tells the two layouts apart.
        let record_size = if self.lump_version(LUMP_LEAVES)? >= 1 {
            32
        } else {
            56
        };
        if data.len() % record_size != 0 {
            return Err(SourceError::Malformed(format!(
                "leaves lump length {} is not a multiple of {record_size}",
                data.len()
            )));
        }

        let clusters = data
            .chunks_exact(record_size)
            .map(|leaf| i16::from_le_bytes([leaf[4], leaf[5]]))
            .collect();
        Ok(clusters)
    }

    /// The static-prop game lump: its version and raw bytes.
    pub fn static_prop_lump(&self) -> Result<(u16, &[u8])> {
        let game = self.lump_data(LUMP_GAME)?;
        let mut reader = LumpReader::new(Cursor::new(game))?;

        let count = reader.read_i32()?;
        if count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative game lump count {count}"
            )));
        }
        for _ in 0..count {
            let id = reader.read_i32()?;
            let _flags = reader.read_u16()?;
            let version = reader.read_u16()?;
            let offset = reader.read_i32()?;
            let length = reader.read_i32()?;
            if id != GAME_LUMP_STATIC_PROPS {
                continue;
            }

            // Game lump offsets address the whole map file, not the lump.
            let start = offset.max(0) as usize;
            let end = start + length.max(0) as usize;
            let data = self.data.get(start..end).ok_or_else(|| {
                SourceError::Malformed(format!(
                    "static prop lump extent {start}..{end} outside map of {} bytes",
                    self.data.len()
                ))
            })?;
            return Ok((version, data));
        }

        Err(SourceError::Malformed(
            "map has no static prop game lump".to_string(),
        ))
    }

    /// Parse the static-prop placement table.
    pub fn static_props(&self) -> Result<StaticPropsLump> {
        let leaf_clusters = self.leaf_clusters()?;
        let (version, data) = self.static_prop_lump()?;
        StaticPropsLump::parse(data, version, &leaf_clusters)
    }

    /// Parse the visibility tables. The returned value owns the per-map
    /// session PVS cache; create it once per session and share it.
    pub fn visibility(&self) -> Result<Visibility> {
        Visibility::parse(self.lump_data(LUMP_VISIBILITY)?)
    }

    /// Open the embedded pakfile archive.
    pub fn pakfile(&self) -> Result<PakFile> {
        PakFile::new(self.lump_data(LUMP_PAKFILE)?.to_vec())
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    pub const HEADER_SIZE: usize = 8 + 16 * LUMP_COUNT + 4;

    /// Assemble a map file from raw lump payloads.
    pub fn bsp_bytes(version: i32, lumps: &[(usize, i32, Vec<u8>)]) -> Vec<u8> {
        let mut directory = vec![(0i32, 0i32, 0i32); LUMP_COUNT];
        let mut payload = Vec::new();
        for (index, lump_version, bytes) in lumps {
            let offset = HEADER_SIZE + payload.len();
            directory[*index] = (offset as i32, bytes.len() as i32, *lump_version);
            payload.extend_from_slice(bytes);
        }

        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(BSP_ID).unwrap();
        data.write_i32::<LittleEndian>(version).unwrap();
        for (offset, length, lump_version) in directory {
            data.write_i32::<LittleEndian>(offset).unwrap();
            data.write_i32::<LittleEndian>(length).unwrap();
            data.write_i32::<LittleEndian>(lump_version).unwrap();
            data.write_i32::<LittleEndian>(0).unwrap();
        }
        data.write_i32::<LittleEndian>(3).unwrap(); // map revision
        assert_eq!(data.len(), HEADER_SIZE);
        data.extend_from_slice(&payload);
        data
    }

    /// A v1 leaves lump with the given cluster per leaf.
    pub fn leaves_lump(clusters: &[i16]) -> Vec<u8> {
        let mut data = Vec::new();
        for &cluster in clusters {
            let mut leaf = vec![0u8; 32];
            leaf[4..6].copy_from_slice(&cluster.to_le_bytes());
            data.extend_from_slice(&leaf);
        }
        data
    }

    /// A game lump directory whose static-prop entry points at `sprp_body`
    /// placed directly after the directory.
    pub fn game_lump(game_lump_offset: usize, sprp_version: u16, sprp_body: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(1).unwrap();
        data.write_i32::<LittleEndian>(GAME_LUMP_STATIC_PROPS).unwrap();
        data.write_u16::<LittleEndian>(0).unwrap();
        data.write_u16::<LittleEndian>(sprp_version).unwrap();
        // Offsets address the whole map file.
        data.write_i32::<LittleEndian>((game_lump_offset + 16 + 4) as i32).unwrap();
        data.write_i32::<LittleEndian>(sprp_body.len() as i32).unwrap();
        data.extend_from_slice(sprp_body);
        data
    }
}
