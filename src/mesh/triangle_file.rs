//! Optimized mesh stream decoding.
//!
//! The stream is a five-level hierarchy of lump headers: body parts, models,
//! LODs, meshes, and strip groups. Each level stores only a count and a
//! relative offset to its children. The walk flattens every level into
//! arena-style arrays with base/count range pointers, remapping each strip
//! group's local vertices through the raw-vertex file as it goes. Only LOD 0
//! is reconstructed; lower-detail levels are skipped by design.

use std::io::{Read, Seek};

use bitflags::bitflags;
use serde::Serialize;

use crate::error::{Result, SourceError};
use crate::lump::{LumpReader, LumpRecord, LumpRef};
use crate::mesh::{StudioVertex, TopologySource, VertexSource};

const TRIANGLE_FILE_VERSION: i32 = 7;

struct BodyPartHeader {
    models: LumpRef,
}

impl LumpRecord for BodyPartHeader {
    const SIZE: u64 = 8;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        Ok(Self {
            models: reader.read_lump_ref()?,
        })
    }
}

struct ModelHeader {
    lods: LumpRef,
}

impl LumpRecord for ModelHeader {
    const SIZE: u64 = 8;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        Ok(Self {
            lods: reader.read_lump_ref()?,
        })
    }
}

struct ModelLodHeader {
    meshes: LumpRef,
    #[allow(dead_code)]
    switch_point: f32,
}

impl LumpRecord for ModelLodHeader {
    const SIZE: u64 = 12;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        Ok(Self {
            meshes: reader.read_lump_ref()?,
            switch_point: reader.read_f32()?,
        })
    }
}

struct MeshHeader {
    strip_groups: LumpRef,
    #[allow(dead_code)]
    flags: u8,
}

impl LumpRecord for MeshHeader {
    const SIZE: u64 = 9;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        Ok(Self {
            strip_groups: reader.read_lump_ref()?,
            flags: reader.read_u8()?,
        })
    }
}

struct StripGroupHeader {
    vertices: LumpRef,
    indices: LumpRef,
    strips: LumpRef,
}

impl LumpRecord for StripGroupHeader {
    const SIZE: u64 = 24;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        Ok(Self {
            vertices: reader.read_lump_ref()?,
            indices: reader.read_lump_ref()?,
            strips: reader.read_lump_ref()?,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy)]
    struct StripFlags: u8 {
        const IS_TRI_LIST = 0x1;
        const IS_TRI_STRIP = 0x2;
    }
}

struct StripHeader {
    index_count: i32,
    /// Element offset into the strip group's index array, not a byte offset.
    index_offset: i32,
    #[allow(dead_code)]
    vertex_count: i32,
    #[allow(dead_code)]
    vertex_offset: i32,
    #[allow(dead_code)]
    bone_count: i16,
    flags: StripFlags,
}

impl LumpRecord for StripHeader {
    const SIZE: u64 = 27;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        let header = Self {
            index_count: reader.read_i32()?,
            index_offset: reader.read_i32()?,
            vertex_count: reader.read_i32()?,
            vertex_offset: reader.read_i32()?,
            bone_count: reader.read_i16()?,
            flags: StripFlags::from_bits_retain(reader.read_u8()?),
        };
        reader.skip(8)?; // bone state change table
        Ok(header)
    }
}

/// A strip group's local vertex: bone indirection plus an index into the
/// original mesh's vertex array. Consumed during reconstruction, never kept.
struct OptimizedVertex {
    #[allow(dead_code)]
    bone_weight_indices: [u8; 3],
    #[allow(dead_code)]
    bone_count: u8,
    orig_mesh_vertex_id: u16,
    #[allow(dead_code)]
    bone_ids: [i8; 3],
}

impl LumpRecord for OptimizedVertex {
    const SIZE: u64 = 9;

    fn read<R: Read + Seek>(reader: &mut LumpReader<R>) -> Result<Self> {
        let mut bone_weight_indices = [0u8; 3];
        reader.read_bytes(&mut bone_weight_indices)?;
        let bone_count = reader.read_u8()?;
        let orig_mesh_vertex_id = reader.read_u16()?;
        let mut bone_ids = [0i8; 3];
        for bone in &mut bone_ids {
            *bone = reader.read_i8()?;
        }
        Ok(Self {
            bone_weight_indices,
            bone_count,
            orig_mesh_vertex_id,
            bone_ids,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct BodyPartRange {
    model_base: usize,
    model_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct ModelRange {
    lod_base: usize,
    lod_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct LodRange {
    mesh_base: usize,
    mesh_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct MeshData {
    lod_index_base: usize,
    lod_vertex_base: usize,
    index_offset: usize,
    index_count: usize,
    vertex_offset: usize,
    vertex_count: usize,
}

/// One mesh's slice of its LOD's vertex and index ranges.
///
/// Offsets are relative to the LOD the mesh belongs to, matching what a
/// renderer that uploads one buffer per LOD expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeshSlice {
    pub index_offset: usize,
    pub index_count: usize,
    pub vertex_offset: usize,
    pub vertex_count: usize,
}

/// A reconstructed model: flat buffers plus the per-mesh slice table.
#[derive(Debug)]
pub struct TriangleFile {
    checksum: i32,
    lod_count: usize,
    body_parts: Vec<BodyPartRange>,
    models: Vec<ModelRange>,
    lods: Vec<LodRange>,
    meshes: Vec<MeshData>,
    vertices: Vec<StudioVertex>,
    indices: Vec<u32>,
}

impl TriangleFile {
    /// Decode an optimized mesh stream against its companion sources.
    pub fn decode(
        stream: impl Read + Seek,
        vertex_source: &impl VertexSource,
        topology_source: &impl TopologySource,
    ) -> Result<Self> {
        let mut reader = LumpReader::new(stream)?;

        let version = reader.read_i32()?;
        if version != TRIANGLE_FILE_VERSION {
            return Err(SourceError::Malformed(format!(
                "optimized mesh version {version}, expected {TRIANGLE_FILE_VERSION}"
            )));
        }

        let _vert_cache_size = reader.read_i32()?;
        let _max_bones_per_strip = reader.read_u16()?;
        let _max_bones_per_tri = reader.read_u16()?;
        let _max_bones_per_vert = reader.read_i32()?;
        let checksum = reader.read_i32()?;
        let lod_count = reader.read_i32()?;
        let _material_replacements = reader.read_i32()?;
        let body_part_lump = reader.read_lump_ref()?;

        // Only LOD 0 is reconstructed; fetch its raw vertices up front.
        let mut lod_vertices = Vec::with_capacity(vertex_source.vertex_count(0));
        vertex_source.copy_vertices(0, &mut lod_vertices)?;

        let mut body_parts = Vec::with_capacity(body_part_lump.count());
        let mut models = Vec::new();
        let mut lods = Vec::new();
        let mut meshes = Vec::new();
        let mut out_vertices: Vec<StudioVertex> = Vec::new();
        let mut out_indices: Vec<u32> = Vec::new();

        reader.read_lump::<BodyPartHeader, _>(&body_part_lump, |reader, bp_index, body_part| {
            let model_base = models.len();

            reader.read_lump::<ModelHeader, _>(&body_part.models, |reader, m_index, model| {
                let lod_base = lods.len();

                reader.read_lump::<ModelLodHeader, _>(&model.lods, |reader, lod_index, lod| {
                    if lod_index > 0 {
                        return Ok(());
                    }

                    let mesh_base = meshes.len();
                    let lod_index_base = out_indices.len();
                    let lod_vertex_base = out_vertices.len();

                    reader.read_lump::<MeshHeader, _>(&lod.meshes, |reader, mesh_index, mesh| {
                        let orig_vertex_offset =
                            topology_source.mesh_vertex_offset(bp_index, m_index, mesh_index)?;

                        let mut mesh_data = MeshData {
                            lod_index_base,
                            lod_vertex_base,
                            index_offset: out_indices.len(),
                            index_count: 0,
                            vertex_offset: out_vertices.len(),
                            vertex_count: 0,
                        };

                        reader.read_lump::<StripGroupHeader, _>(
                            &mesh.strip_groups,
                            |reader, _, strip_group| {
                                decode_strip_group(
                                    reader,
                                    &strip_group,
                                    orig_vertex_offset,
                                    &lod_vertices,
                                    lod_vertex_base,
                                    &mut out_vertices,
                                    &mut out_indices,
                                )
                            },
                        )?;

                        mesh_data.index_count = out_indices.len() - mesh_data.index_offset;
                        mesh_data.vertex_count = out_vertices.len() - mesh_data.vertex_offset;
                        meshes.push(mesh_data);
                        Ok(())
                    })?;

                    lods.push(LodRange {
                        mesh_base,
                        mesh_count: meshes.len() - mesh_base,
                    });
                    Ok(())
                })?;

                models.push(ModelRange {
                    lod_base,
                    lod_count: lods.len() - lod_base,
                });
                Ok(())
            })?;

            body_parts.push(BodyPartRange {
                model_base,
                model_count: models.len() - model_base,
            });
            Ok(())
        })?;

        log::debug!(
            "reconstructed {} vertices and {} indices across {} body parts",
            out_vertices.len(),
            out_indices.len(),
            body_parts.len()
        );

        Ok(Self {
            checksum,
            lod_count: lod_count.max(0) as usize,
            body_parts,
            models,
            lods,
            meshes,
            vertices: out_vertices,
            indices: out_indices,
        })
    }

    /// Checksum shared with the companion model and raw-vertex files.
    pub fn checksum(&self) -> i32 {
        self.checksum
    }

    /// LOD count declared by the stream, including the skipped ones.
    pub fn declared_lod_count(&self) -> usize {
        self.lod_count
    }

    /// The global reconstructed vertex buffer.
    pub fn vertices(&self) -> &[StudioVertex] {
        &self.vertices
    }

    /// The global reconstructed index buffer. Indices are relative to their
    /// owning LOD's vertex base.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn body_part_count(&self) -> usize {
        self.body_parts.len()
    }

    pub fn model_count(&self, body_part: usize) -> Result<usize> {
        Ok(self.body_part(body_part)?.model_count)
    }

    pub fn mesh_count(&self, body_part: usize, model: usize, lod: usize) -> Result<usize> {
        Ok(self.lod(body_part, model, lod)?.mesh_count)
    }

    /// One mesh's slice of its LOD's buffers.
    pub fn slice(
        &self,
        body_part: usize,
        model: usize,
        lod: usize,
        mesh: usize,
    ) -> Result<MeshSlice> {
        let lod_range = self.lod(body_part, model, lod)?;
        if mesh >= lod_range.mesh_count {
            return Err(out_of_range("mesh", mesh, lod_range.mesh_count));
        }
        let data = &self.meshes[lod_range.mesh_base + mesh];
        Ok(MeshSlice {
            index_offset: data.index_offset - data.lod_index_base,
            index_count: data.index_count,
            vertex_offset: data.vertex_offset - data.lod_vertex_base,
            vertex_count: data.vertex_count,
        })
    }

    /// Total vertices across a LOD's meshes.
    pub fn lod_vertex_count(&self, body_part: usize, model: usize, lod: usize) -> Result<usize> {
        let lod_range = self.lod(body_part, model, lod)?;
        Ok(self.lod_meshes(lod_range).map(|mesh| mesh.vertex_count).sum())
    }

    /// Total indices across a LOD's meshes.
    pub fn lod_index_count(&self, body_part: usize, model: usize, lod: usize) -> Result<usize> {
        let lod_range = self.lod(body_part, model, lod)?;
        Ok(self.lod_meshes(lod_range).map(|mesh| mesh.index_count).sum())
    }

    /// Append a LOD's vertices, mesh by mesh, to `dest`.
    pub fn copy_lod_vertices(
        &self,
        body_part: usize,
        model: usize,
        lod: usize,
        dest: &mut Vec<StudioVertex>,
    ) -> Result<usize> {
        let lod_range = self.lod(body_part, model, lod)?;
        let mut copied = 0;
        for mesh in self.lod_meshes(lod_range) {
            let start = mesh.vertex_offset;
            dest.extend_from_slice(&self.vertices[start..start + mesh.vertex_count]);
            copied += mesh.vertex_count;
        }
        Ok(copied)
    }

    /// Append a LOD's indices, mesh by mesh, to `dest`.
    pub fn copy_lod_indices(
        &self,
        body_part: usize,
        model: usize,
        lod: usize,
        dest: &mut Vec<u32>,
    ) -> Result<usize> {
        let lod_range = self.lod(body_part, model, lod)?;
        let mut copied = 0;
        for mesh in self.lod_meshes(lod_range) {
            let start = mesh.index_offset;
            dest.extend_from_slice(&self.indices[start..start + mesh.index_count]);
            copied += mesh.index_count;
        }
        Ok(copied)
    }

    fn lod_meshes<'a>(&'a self, lod: &'a LodRange) -> impl Iterator<Item = &'a MeshData> {
        self.meshes[lod.mesh_base..lod.mesh_base + lod.mesh_count].iter()
    }

    fn body_part(&self, body_part: usize) -> Result<&BodyPartRange> {
        self.body_parts
            .get(body_part)
            .ok_or_else(|| out_of_range("body part", body_part, self.body_parts.len()))
    }

    fn lod(&self, body_part: usize, model: usize, lod: usize) -> Result<&LodRange> {
        let body_part = self.body_part(body_part)?;
        if model >= body_part.model_count {
            return Err(out_of_range("model", model, body_part.model_count));
        }
        let model = &self.models[body_part.model_base + model];
        if lod >= model.lod_count {
            return Err(out_of_range("LOD", lod, model.lod_count));
        }
        Ok(&self.lods[model.lod_base + lod])
    }
}

fn out_of_range(what: &str, index: usize, count: usize) -> SourceError {
    SourceError::CrossReference(format!("{what} index {index} outside count {count}"))
}

#[allow(clippy::too_many_arguments)]
fn decode_strip_group<R: Read + Seek>(
    reader: &mut LumpReader<R>,
    strip_group: &StripGroupHeader,
    orig_vertex_offset: usize,
    lod_vertices: &[StudioVertex],
    lod_vertex_base: usize,
    out_vertices: &mut Vec<StudioVertex>,
    out_indices: &mut Vec<u32>,
) -> Result<()> {
    let mut group_vertices: Vec<OptimizedVertex> = Vec::new();
    reader.read_lump_into(&strip_group.vertices, &mut group_vertices)?;

    // Indices emitted below are relative to the LOD's vertex base.
    let group_index_offset = (out_vertices.len() - lod_vertex_base) as u32;
    for optimized in &group_vertices {
        let vertex_index = orig_vertex_offset + optimized.orig_mesh_vertex_id as usize;
        let vertex = lod_vertices.get(vertex_index).ok_or_else(|| {
            SourceError::CrossReference(format!(
                "optimized vertex remaps to {vertex_index} outside raw vertex array of {}",
                lod_vertices.len()
            ))
        })?;
        out_vertices.push(*vertex);
    }

    let mut group_indices: Vec<u16> = Vec::new();
    reader.read_lump_into(&strip_group.indices, &mut group_indices)?;

    reader.read_lump::<StripHeader, _>(&strip_group.strips, |_, _, strip| {
        if strip.flags.contains(StripFlags::IS_TRI_STRIP) {
            return Err(SourceError::UnsupportedFormat(
                "triangle-strip encoded strip".to_string(),
            ));
        }
        if !strip.flags.contains(StripFlags::IS_TRI_LIST) {
            return Ok(());
        }

        let start = strip.index_offset.max(0) as usize;
        let count = strip.index_count.max(0) as usize;
        if start + count > group_indices.len() {
            return Err(SourceError::Malformed(format!(
                "strip spans indices {start}..{} outside its strip group's {}",
                start + count,
                group_indices.len()
            )));
        }

        for &local in &group_indices[start..start + count] {
            if local as usize >= group_vertices.len() {
                return Err(SourceError::Malformed(format!(
                    "strip index {local} outside its strip group's {} vertices",
                    group_vertices.len()
                )));
            }
            out_indices.push(group_index_offset + local as u32);
        }
        Ok(())
    })
}
