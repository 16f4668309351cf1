//! Optimized mesh reconstruction.
//!
//! A renderable model is split across three companion files: the optimized
//! mesh stream holds strip topology, the raw-vertex file holds
//! fully-featured vertices, and the model file maps each mesh to its slice
//! of the raw vertex array. [`TriangleFile`] cross-references all three into
//! flat vertex and index buffers a renderer can upload directly.

pub mod model_file;
pub mod triangle_file;
pub mod vertex_file;
pub mod vertex_lighting;

pub use model_file::ModelFile;
pub use triangle_file::{MeshSlice, TriangleFile};
pub use vertex_file::VertexFile;
pub use vertex_lighting::VertexLightingFile;

use std::io::{Read, Seek};

use glam::{Vec2, Vec3};

use crate::error::Result;
use crate::lump::{LumpReader, LumpRecord};

/// Maximum bone influences per vertex.
pub const MAX_BONES_PER_VERTEX: usize = 3;

/// A fully-featured model vertex from the raw-vertex file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StudioVertex {
    pub bone_weights: [f32; MAX_BONES_PER_VERTEX],
    pub bones: [u8; MAX_BONES_PER_VERTEX],
    pub bone_count: u8,
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl LumpRecord for StudioVertex {
    const SIZE: u64 = 48;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        let mut vertex = StudioVertex::default();
        for weight in &mut vertex.bone_weights {
            *weight = reader.read_f32()?;
        }
        for bone in &mut vertex.bones {
            *bone = reader.read_u8()?;
        }
        vertex.bone_count = reader.read_u8()?;
        vertex.position = read_vec3(reader)?;
        vertex.normal = read_vec3(reader)?;
        vertex.tex_coord = Vec2::new(reader.read_f32()?, reader.read_f32()?);
        Ok(vertex)
    }
}

pub(crate) fn read_vec3<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Vec3> {
    Ok(Vec3::new(
        reader.read_f32()?,
        reader.read_f32()?,
        reader.read_f32()?,
    ))
}

/// Provider of per-LOD raw vertex arrays.
///
/// Implemented by [`VertexFile`]; test doubles can stand in for it.
pub trait VertexSource {
    fn vertex_count(&self, lod: usize) -> usize;

    /// Append `vertex_count(lod)` vertices to `dest`.
    fn copy_vertices(&self, lod: usize, dest: &mut Vec<StudioVertex>) -> Result<()>;
}

/// Provider of per-mesh vertex offsets into the raw vertex arrays.
///
/// Implemented by [`ModelFile`].
pub trait TopologySource {
    fn mesh_vertex_offset(&self, body_part: usize, model: usize, mesh: usize) -> Result<usize>;
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use crate::error::SourceError;
    use byteorder::{LittleEndian, WriteBytesExt};

    /// In-memory vertex source with recognizable positions.
    pub struct FakeVertices {
        vertices: Vec<StudioVertex>,
    }

    impl FakeVertices {
        /// `count` vertices whose position x equals their index.
        pub fn sequential(count: usize) -> Self {
            let vertices = (0..count)
                .map(|index| StudioVertex {
                    position: Vec3::new(index as f32, 0.0, 0.0),
                    bone_count: 1,
                    bone_weights: [1.0, 0.0, 0.0],
                    ..Default::default()
                })
                .collect();
            Self { vertices }
        }
    }

    impl VertexSource for FakeVertices {
        fn vertex_count(&self, lod: usize) -> usize {
            if lod == 0 {
                self.vertices.len()
            } else {
                0
            }
        }

        fn copy_vertices(&self, lod: usize, dest: &mut Vec<StudioVertex>) -> Result<()> {
            if lod == 0 {
                dest.extend_from_slice(&self.vertices);
            }
            Ok(())
        }
    }

    /// Topology source with one vertex offset per mesh.
    pub struct FakeTopology {
        offsets: Vec<usize>,
    }

    impl FakeTopology {
        pub fn new(offsets: Vec<usize>) -> Self {
            Self { offsets }
        }
    }

    impl TopologySource for FakeTopology {
        fn mesh_vertex_offset(&self, _body_part: usize, _model: usize, mesh: usize) -> Result<usize> {
            self.offsets.get(mesh).copied().ok_or_else(|| {
                SourceError::CrossReference(format!(
                    "mesh index {mesh} outside count {}",
                    self.offsets.len()
                ))
            })
        }
    }

    /// Serializes an optimized mesh stream with one body part, one model,
    /// one LOD, and one single-strip strip group per mesh.
    pub struct TriangleFileBuilder {
        /// Per mesh: optimized vertex ids and strip-group-local indices.
        pub meshes: Vec<(Vec<u16>, Vec<u16>)>,
        pub strip_flags: u8,
    }

    impl TriangleFileBuilder {
        pub fn build(&self) -> Vec<u8> {
            let mesh_count = self.meshes.len();
            let mesh_base = 64u64;

            // Lay out each mesh's strip group header and payload after the
            // mesh header array.
            let mut cursor = mesh_base + 9 * mesh_count as u64;
            let mut group_pos = Vec::new();
            let mut verts_pos = Vec::new();
            let mut indices_pos = Vec::new();
            let mut strips_pos = Vec::new();
            for (verts, indices) in &self.meshes {
                group_pos.push(cursor);
                cursor += 24;
                verts_pos.push(cursor);
                cursor += 9 * verts.len() as u64;
                indices_pos.push(cursor);
                cursor += 2 * indices.len() as u64;
                strips_pos.push(cursor);
                cursor += 27;
            }

            let mut data = Vec::new();
            let rel = |target: u64, origin: u64| (target as i64 - origin as i64) as i32;

            // File header; body parts start right after it.
            data.write_i32::<LittleEndian>(7).unwrap(); // version
            data.write_i32::<LittleEndian>(24).unwrap(); // vert cache size
            data.write_u16::<LittleEndian>(53).unwrap();
            data.write_u16::<LittleEndian>(9).unwrap();
            data.write_i32::<LittleEndian>(3).unwrap();
            data.write_i32::<LittleEndian>(0x1234).unwrap(); // checksum
            data.write_i32::<LittleEndian>(1).unwrap(); // lod count
            data.write_i32::<LittleEndian>(0).unwrap(); // material replacements
            data.write_i32::<LittleEndian>(1).unwrap(); // body part count
            data.write_i32::<LittleEndian>(0).unwrap(); // body parts follow

            // Body part header at 36.
            data.write_i32::<LittleEndian>(1).unwrap();
            data.write_i32::<LittleEndian>(0).unwrap(); // models follow

            // Model header at 44.
            data.write_i32::<LittleEndian>(1).unwrap();
            data.write_i32::<LittleEndian>(0).unwrap(); // lods follow

            // LOD header at 52; meshes start at 64, offset field ends at 60.
            data.write_i32::<LittleEndian>(mesh_count as i32).unwrap();
            data.write_i32::<LittleEndian>(rel(mesh_base, 60)).unwrap();
            data.write_f32::<LittleEndian>(0.0).unwrap(); // switch point

            for index in 0..mesh_count {
                let base = mesh_base + 9 * index as u64;
                data.write_i32::<LittleEndian>(1).unwrap();
                data.write_i32::<LittleEndian>(rel(group_pos[index], base + 8)).unwrap();
                data.push(0); // mesh flags
            }

            for (index, (verts, indices)) in self.meshes.iter().enumerate() {
                let base = group_pos[index];
                assert_eq!(data.len() as u64, base);
                data.write_i32::<LittleEndian>(verts.len() as i32).unwrap();
                data.write_i32::<LittleEndian>(rel(verts_pos[index], base + 8)).unwrap();
                data.write_i32::<LittleEndian>(indices.len() as i32).unwrap();
                data.write_i32::<LittleEndian>(rel(indices_pos[index], base + 16)).unwrap();
                data.write_i32::<LittleEndian>(1).unwrap();
                data.write_i32::<LittleEndian>(rel(strips_pos[index], base + 24)).unwrap();

                for &orig_id in verts {
                    data.extend_from_slice(&[0, 0, 0]); // bone weight indices
                    data.push(1); // bone count
                    data.write_u16::<LittleEndian>(orig_id).unwrap();
                    data.extend_from_slice(&[0, 0, 0]); // bone ids
                }
                for &local in indices {
                    data.write_u16::<LittleEndian>(local).unwrap();
                }

                // One strip covering the whole index array.
                data.write_i32::<LittleEndian>(indices.len() as i32).unwrap();
                data.write_i32::<LittleEndian>(0).unwrap();
                data.write_i32::<LittleEndian>(verts.len() as i32).unwrap();
                data.write_i32::<LittleEndian>(0).unwrap();
                data.write_i16::<LittleEndian>(1).unwrap();
                data.push(self.strip_flags);
                data.write_i32::<LittleEndian>(0).unwrap();
                data.write_i32::<LittleEndian>(0).unwrap();
            }

            data
        }
    }
}
