//! Model topology metadata.
//!
//! The model file is a sprawling container; only what the mesh decoder and
//! the prop index need is parsed here: the body part / model / mesh
//! hierarchy, each mesh's vertex offset into the raw-vertex file, and the
//! file's identity fields. Unlike the optimized mesh stream, this format
//! addresses children relative to each parent struct's own start.

use std::io::{Read, Seek};

use crate::error::{Result, SourceError};
use crate::lump::{LumpReader, LumpRecord};
use crate::mesh::{StudioVertex, TopologySource};

/// `IDST` magic.
const MODEL_FILE_ID: i32 = i32::from_le_bytes(*b"IDST");

const BODY_PART_SIZE: u64 = 16;
const MODEL_SIZE: u64 = 148;
const MESH_SIZE: u64 = 116;

#[derive(Debug, Clone, Copy)]
struct BodyPart {
    model_base: usize,
    model_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct Model {
    mesh_base: usize,
    mesh_count: usize,
    /// First raw vertex of this model, in vertices.
    vertex_base: usize,
}

#[derive(Debug, Clone, Copy)]
struct Mesh {
    material: i32,
    /// Offset into the owning model's vertices.
    vertex_offset: usize,
}

/// Parsed model file subset.
pub struct ModelFile {
    version: i32,
    checksum: i32,
    name: String,
    body_parts: Vec<BodyPart>,
    models: Vec<Model>,
    meshes: Vec<Mesh>,
}

impl ModelFile {
    pub fn read(stream: impl Read + Seek) -> Result<Self> {
        let mut reader = LumpReader::new(stream)?;

        let id = reader.read_i32()?;
        if id != MODEL_FILE_ID {
            return Err(SourceError::Malformed(
                "missing model file signature".to_string(),
            ));
        }
        let version = reader.read_i32()?;
        if !(44..=49).contains(&version) {
            return Err(SourceError::Malformed(format!(
                "model file version {version} outside supported range 44-49"
            )));
        }
        let checksum = reader.read_i32()?;

        let mut name_bytes = [0u8; 64];
        reader.read_bytes(&mut name_bytes)?;
        let name = read_fixed_string(&name_bytes);
        let _data_length = reader.read_i32()?;

        // Eye/illumination positions, hulls, view bounding box.
        reader.skip(72)?;
        let _flags = reader.read_i32()?;
        // Bone, bone controller, hitbox, animation, sequence, activity,
        // texture, texture dir, and skin tables.
        reader.skip(72)?;

        let body_part_count = reader.read_i32()?;
        let body_part_offset = reader.read_i32()?;
        if body_part_count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative body part count {body_part_count}"
            )));
        }

        let mut body_parts = Vec::with_capacity(body_part_count as usize);
        let mut models = Vec::new();
        let mut meshes = Vec::new();

        for bp_index in 0..body_part_count as u64 {
            let bp_base = body_part_offset as u64 + bp_index * BODY_PART_SIZE;
            reader.seek_to(bp_base)?;
            let _name_offset = reader.read_i32()?;
            let model_count = reader.read_i32()?;
            let _base = reader.read_i32()?;
            let model_offset = reader.read_i32()?;
            if model_count < 0 {
                return Err(SourceError::Malformed(format!(
                    "negative model count {model_count}"
                )));
            }

            let model_base = models.len();
            for m_index in 0..model_count as u64 {
                let m_base = add_offset(bp_base, model_offset)? + m_index * MODEL_SIZE;
                reader.seek_to(m_base)?;
                reader.skip(64)?; // model name
                let _kind = reader.read_i32()?;
                let _bounding_radius = reader.read_f32()?;
                let mesh_count = reader.read_i32()?;
                let mesh_offset = reader.read_i32()?;
                let _vertex_count = reader.read_i32()?;
                let vertex_index = reader.read_i32()?;
                if mesh_count < 0 {
                    return Err(SourceError::Malformed(format!(
                        "negative mesh count {mesh_count}"
                    )));
                }
                if vertex_index < 0 || vertex_index as u64 % StudioVertex::SIZE != 0 {
                    return Err(SourceError::Malformed(format!(
                        "model vertex index {vertex_index} is not vertex-aligned"
                    )));
                }

                let mesh_base = meshes.len();
                for mesh_index in 0..mesh_count as u64 {
                    let mesh_pos = add_offset(m_base, mesh_offset)? + mesh_index * MESH_SIZE;
                    reader.seek_to(mesh_pos)?;
                    let material = reader.read_i32()?;
                    let _model_index = reader.read_i32()?;
                    let vertex_count = reader.read_i32()?;
                    let vertex_offset = reader.read_i32()?;
                    if vertex_count < 0 || vertex_offset < 0 {
                        return Err(SourceError::Malformed(format!(
                            "mesh vertex range {vertex_offset}+{vertex_count} is negative"
                        )));
                    }
                    meshes.push(Mesh {
                        material,
                        vertex_offset: vertex_offset as usize,
                    });
                }

                models.push(Model {
                    mesh_base,
                    mesh_count: mesh_count as usize,
                    vertex_base: vertex_index as usize / StudioVertex::SIZE as usize,
                });
            }

            body_parts.push(BodyPart {
                model_base,
                model_count: model_count as usize,
            });
        }

        Ok(Self {
            version,
            checksum,
            name,
            body_parts,
            models,
            meshes,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Checksum shared with the companion raw-vertex and optimized mesh
    /// files.
    pub fn checksum(&self) -> i32 {
        self.checksum
    }

    /// Internal model name, e.g. `props/crate001.mdl`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body_part_count(&self) -> usize {
        self.body_parts.len()
    }

    pub fn model_count(&self, body_part: usize) -> Result<usize> {
        Ok(self.body_part(body_part)?.model_count)
    }

    pub fn mesh_count(&self, body_part: usize, model: usize) -> Result<usize> {
        Ok(self.model(body_part, model)?.mesh_count)
    }

    /// Material table index of one mesh.
    pub fn mesh_material(&self, body_part: usize, model: usize, mesh: usize) -> Result<i32> {
        Ok(self.mesh(body_part, model, mesh)?.material)
    }

    fn body_part(&self, body_part: usize) -> Result<&BodyPart> {
        self.body_parts.get(body_part).ok_or_else(|| {
            cross_reference("body part", body_part, self.body_parts.len())
        })
    }

    fn model(&self, body_part: usize, model: usize) -> Result<&Model> {
        let body_part = self.body_part(body_part)?;
        if model >= body_part.model_count {
            return Err(cross_reference("model", model, body_part.model_count));
        }
        Ok(&self.models[body_part.model_base + model])
    }

    fn mesh(&self, body_part: usize, model: usize, mesh: usize) -> Result<&Mesh> {
        let model = self.model(body_part, model)?;
        if mesh >= model.mesh_count {
            return Err(cross_reference("mesh", mesh, model.mesh_count));
        }
        Ok(&self.meshes[model.mesh_base + mesh])
    }
}

impl TopologySource for ModelFile {
    fn mesh_vertex_offset(&self, body_part: usize, model: usize, mesh: usize) -> Result<usize> {
        let model_data = self.model(body_part, model)?;
        let mesh = self.mesh(body_part, model, mesh)?;
        Ok(model_data.vertex_base + mesh.vertex_offset)
    }
}

fn cross_reference(what: &str, index: usize, count: usize) -> SourceError {
    SourceError::CrossReference(format!("{what} index {index} outside count {count}"))
}

fn add_offset(base: u64, offset: i32) -> Result<u64> {
    let absolute = base as i64 + offset as i64;
    if absolute < 0 {
        return Err(SourceError::Malformed(format!(
            "offset {offset} from {base} resolves before stream start"
        )));
    }
    Ok(absolute as u64)
}

fn read_fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
