//! Baked per-vertex lighting for static props.
//!
//! Each lit prop ships a small sidecar file inside the map's pakfile holding
//! per-vertex color samples, grouped per mesh and LOD. The viewer fetches
//! these as plain sample arrays to tint prop vertices at draw time.

use std::io::{Read, Seek};

use crate::error::{Result, SourceError};
use crate::lump::LumpReader;
use crate::types::ColorRgb;

const VERTEX_LIGHTING_VERSION: i32 = 2;
const FILE_HEADER_SIZE: u64 = 40;
const MESH_HEADER_SIZE: u64 = 28;

struct MeshSamples {
    lod: u32,
    samples: Vec<ColorRgb>,
}

/// A parsed vertex lighting file.
pub struct VertexLightingFile {
    checksum: i32,
    vertex_flags: u32,
    meshes: Vec<MeshSamples>,
}

impl VertexLightingFile {
    pub fn read(stream: impl Read + Seek) -> Result<Self> {
        let mut reader = LumpReader::new(stream)?;

        let version = reader.read_i32()?;
        if version != VERTEX_LIGHTING_VERSION {
            return Err(SourceError::Malformed(format!(
                "vertex lighting version {version}, expected {VERTEX_LIGHTING_VERSION}"
            )));
        }
        let checksum = reader.read_i32()?;
        let vertex_flags = reader.read_u32()?;
        let vertex_size = reader.read_u32()?;
        if vertex_size < 3 {
            return Err(SourceError::Malformed(format!(
                "vertex lighting sample size {vertex_size}"
            )));
        }
        let _total_vertex_count = reader.read_u32()?;
        let mesh_count = reader.read_i32()?;
        if mesh_count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative mesh count {mesh_count}"
            )));
        }
        reader.skip(16)?; // reserved

        let mut headers = Vec::with_capacity(mesh_count as usize);
        for index in 0..mesh_count as u64 {
            reader.seek_to(FILE_HEADER_SIZE + index * MESH_HEADER_SIZE)?;
            let lod = reader.read_u32()?;
            let vertex_count = reader.read_u32()?;
            let offset = reader.read_u32()?;
            headers.push((lod, vertex_count, offset));
        }

        let mut meshes = Vec::with_capacity(headers.len());
        for (lod, vertex_count, offset) in headers {
            reader.seek_to(offset as u64)?;
            let mut samples = Vec::with_capacity(vertex_count as usize);
            for _ in 0..vertex_count {
                let r = reader.read_u8()?;
                let g = reader.read_u8()?;
                let b = reader.read_u8()?;
                reader.skip(vertex_size as u64 - 3)?;
                samples.push(ColorRgb::new(r, g, b));
            }
            meshes.push(MeshSamples { lod, samples });
        }

        Ok(Self {
            checksum,
            vertex_flags,
            meshes,
        })
    }

    /// Checksum of the model this lighting was baked for.
    pub fn checksum(&self) -> i32 {
        self.checksum
    }

    pub fn vertex_flags(&self) -> u32 {
        self.vertex_flags
    }

    /// Number of sample arrays baked for `lod`.
    pub fn mesh_count(&self, lod: u32) -> usize {
        self.meshes.iter().filter(|mesh| mesh.lod == lod).count()
    }

    /// The `mesh`-th sample array of `lod`.
    pub fn samples(&self, lod: u32, mesh: usize) -> Result<&[ColorRgb]> {
        self.meshes
            .iter()
            .filter(|entry| entry.lod == lod)
            .nth(mesh)
            .map(|entry| entry.samples.as_slice())
            .ok_or_else(|| {
                SourceError::CrossReference(format!(
                    "mesh index {mesh} outside LOD {lod}'s {} lit meshes",
                    self.mesh_count(lod)
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Cursor;

    fn vhv_bytes(meshes: &[(u32, Vec<[u8; 3]>)]) -> Vec<u8> {
        let data_base = FILE_HEADER_SIZE + meshes.len() as u64 * MESH_HEADER_SIZE;
        let total: u32 = meshes.iter().map(|(_, samples)| samples.len() as u32).sum();

        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(VERTEX_LIGHTING_VERSION).unwrap();
        data.write_i32::<LittleEndian>(0x1234).unwrap();
        data.write_u32::<LittleEndian>(0).unwrap(); // vertex flags
        data.write_u32::<LittleEndian>(4).unwrap(); // sample size
        data.write_u32::<LittleEndian>(total).unwrap();
        data.write_i32::<LittleEndian>(meshes.len() as i32).unwrap();
        data.extend_from_slice(&[0; 16]);
        assert_eq!(data.len() as u64, FILE_HEADER_SIZE);

        let mut offset = data_base;
        for (lod, samples) in meshes {
            data.write_u32::<LittleEndian>(*lod).unwrap();
            data.write_u32::<LittleEndian>(samples.len() as u32).unwrap();
            data.write_u32::<LittleEndian>(offset as u32).unwrap();
            data.extend_from_slice(&[0; 16]); // reserved
            offset += samples.len() as u64 * 4;
        }

        for (_, samples) in meshes {
            for sample in samples {
                data.extend_from_slice(sample);
                data.push(255); // alpha
            }
        }
        data
    }

    #[test]
    fn test_samples_grouped_by_lod() {
        let data = vhv_bytes(&[
            (0, vec![[10, 20, 30], [40, 50, 60]]),
            (1, vec![[1, 2, 3]]),
            (0, vec![[70, 80, 90]]),
        ]);
        let file = VertexLightingFile::read(Cursor::new(data)).unwrap();

        assert_eq!(file.checksum(), 0x1234);
        assert_eq!(file.mesh_count(0), 2);
        assert_eq!(file.mesh_count(1), 1);
        assert_eq!(
            file.samples(0, 0).unwrap(),
            &[ColorRgb::new(10, 20, 30), ColorRgb::new(40, 50, 60)]
        );
        assert_eq!(file.samples(0, 1).unwrap(), &[ColorRgb::new(70, 80, 90)]);
    }

    #[test]
    fn test_missing_mesh_is_cross_reference() {
        let data = vhv_bytes(&[(0, vec![[1, 1, 1]])]);
        let file = VertexLightingFile::read(Cursor::new(data)).unwrap();
        assert!(matches!(
            file.samples(0, 3),
            Err(SourceError::CrossReference(_))
        ));
    }

    #[test]
    fn test_offset_outside_stream_is_malformed() {
        let mut data = vhv_bytes(&[(0, vec![[1, 1, 1]])]);
        // Corrupt the mesh offset.
        let at = FILE_HEADER_SIZE as usize + 8;
        data[at..at + 4].copy_from_slice(&9999u32.to_le_bytes());
        assert!(matches!(
            VertexLightingFile::read(Cursor::new(data)),
            Err(SourceError::Malformed(_))
        ));
    }
}
