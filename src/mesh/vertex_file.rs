//! Raw-vertex file parsing.
//!
//! The raw-vertex file stores one shared vertex table plus a fixup table.
//! Without fixups, a LOD's vertices are simply the first `n` entries of the
//! table. With fixups, each LOD is assembled by concatenating the table
//! ranges whose fixup covers that LOD or a finer one.

use std::io::{Read, Seek};

use crate::error::{Result, SourceError};
use crate::lump::{LumpReader, LumpRecord};
use crate::mesh::{StudioVertex, VertexSource};

/// `IDSV` magic.
const VERTEX_FILE_ID: i32 = i32::from_le_bytes(*b"IDSV");
const VERTEX_FILE_VERSION: i32 = 4;
const MAX_LODS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Fixup {
    lod: i32,
    source_vertex_id: i32,
    vertex_count: i32,
}

impl LumpRecord for Fixup {
    const SIZE: u64 = 12;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        Ok(Self {
            lod: reader.read_i32()?,
            source_vertex_id: reader.read_i32()?,
            vertex_count: reader.read_i32()?,
        })
    }
}

/// A parsed raw-vertex file.
pub struct VertexFile {
    checksum: i32,
    lod_count: usize,
    lod_vertex_counts: [usize; MAX_LODS],
    fixups: Vec<Fixup>,
    vertices: Vec<StudioVertex>,
}

impl VertexFile {
    pub fn read(stream: impl Read + Seek) -> Result<Self> {
        let mut reader = LumpReader::new(stream)?;

        let id = reader.read_i32()?;
        if id != VERTEX_FILE_ID {
            return Err(SourceError::Malformed(
                "missing raw-vertex file signature".to_string(),
            ));
        }
        let version = reader.read_i32()?;
        if version != VERTEX_FILE_VERSION {
            return Err(SourceError::Malformed(format!(
                "raw-vertex file version {version}, expected {VERTEX_FILE_VERSION}"
            )));
        }

        let checksum = reader.read_i32()?;
        let lod_count = reader.read_i32()?;
        if lod_count <= 0 || lod_count as usize > MAX_LODS {
            return Err(SourceError::Malformed(format!(
                "raw-vertex file declares {lod_count} LODs"
            )));
        }

        let mut lod_vertex_counts = [0usize; MAX_LODS];
        for count in &mut lod_vertex_counts {
            let value = reader.read_i32()?;
            if value < 0 {
                return Err(SourceError::Malformed(format!(
                    "negative LOD vertex count {value}"
                )));
            }
            *count = value as usize;
        }

        let fixup_count = reader.read_i32()?;
        let fixup_table_start = reader.read_i32()?;
        let vertex_data_start = reader.read_i32()?;
        let tangent_data_start = reader.read_i32()?;

        // The vertex table spans from its start to the tangent table.
        if vertex_data_start < 0
            || tangent_data_start < vertex_data_start
            || tangent_data_start as u64 > reader.len()
        {
            return Err(SourceError::Malformed(format!(
                "vertex data range {vertex_data_start}..{tangent_data_start} \
                 outside stream of {} bytes",
                reader.len()
            )));
        }
        let vertex_bytes = (tangent_data_start - vertex_data_start) as u64;
        let vertex_count = vertex_bytes / StudioVertex::SIZE;

        reader.seek_to(vertex_data_start as u64)?;
        let mut vertices = Vec::with_capacity(vertex_count as usize);
        for _ in 0..vertex_count {
            vertices.push(StudioVertex::read(&mut reader)?);
        }

        if fixup_count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative fixup count {fixup_count}"
            )));
        }
        reader.seek_to(fixup_table_start.max(0) as u64)?;
        let mut fixups = Vec::with_capacity(fixup_count as usize);
        for _ in 0..fixup_count {
            fixups.push(Fixup::read(&mut reader)?);
        }

        Ok(Self {
            checksum,
            lod_count: lod_count as usize,
            lod_vertex_counts,
            fixups,
            vertices,
        })
    }

    /// Checksum shared with the companion model and optimized mesh files.
    pub fn checksum(&self) -> i32 {
        self.checksum
    }

    pub fn lod_count(&self) -> usize {
        self.lod_count
    }
}

impl VertexSource for VertexFile {
    fn vertex_count(&self, lod: usize) -> usize {
        if lod < self.lod_count {
            self.lod_vertex_counts[lod]
        } else {
            0
        }
    }

    fn copy_vertices(&self, lod: usize, dest: &mut Vec<StudioVertex>) -> Result<()> {
        let count = self.vertex_count(lod);

        if self.fixups.is_empty() {
            let table = self.vertices.get(..count).ok_or_else(|| {
                SourceError::Malformed(format!(
                    "LOD {lod} declares {count} vertices but the table holds {}",
                    self.vertices.len()
                ))
            })?;
            dest.extend_from_slice(table);
            return Ok(());
        }

        for fixup in &self.fixups {
            if (fixup.lod as usize) < lod {
                continue;
            }
            let start = fixup.source_vertex_id.max(0) as usize;
            let end = start + fixup.vertex_count.max(0) as usize;
            let range = self.vertices.get(start..end).ok_or_else(|| {
                SourceError::Malformed(format!(
                    "fixup range {start}..{end} outside vertex table of {}",
                    self.vertices.len()
                ))
            })?;
            dest.extend_from_slice(range);
        }
        Ok(())
    }
}
