//! JSON projections for the map viewer.
//!
//! The HTTP layer lives outside this crate; these are the serializable
//! shapes it exposes upward. They mirror what the browser front end
//! consumes: the model dictionary with per-prop placement data, per-mesh
//! buffer slices, and baked vertex lighting sample arrays.

use serde::Serialize;

use crate::bsp::{StaticPropFlags, StaticPropsLump};
use crate::error::Result;
use crate::mesh::{MeshSlice, TriangleFile, VertexLightingFile};

/// The full static-prop listing for a map.
#[derive(Debug, Serialize)]
pub struct StaticPropsResponse {
    pub models: Vec<String>,
    pub props: Vec<StaticPropInfo>,
}

/// One prop's placement data.
#[derive(Debug, Serialize)]
pub struct StaticPropInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<usize>,
    pub skin: i32,
    pub origin: [f32; 3],
    pub angles: [f32; 3],
    pub flags: u8,
    pub solid: bool,
    pub albedo: u32,
    pub clusters: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_min: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_max: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_scale: Option<f32>,
}

/// Project the parsed prop tables into their response shape.
pub fn static_props_response(lump: &StaticPropsLump) -> StaticPropsResponse {
    let props = lump
        .props()
        .iter()
        .map(|prop| {
            let fades = prop.flags.contains(StaticPropFlags::FADES);
            StaticPropInfo {
                model: prop.model_index,
                skin: prop.skin,
                origin: prop.origin.to_array(),
                angles: prop.angles.to_array(),
                flags: prop.flags.bits(),
                solid: prop.solid,
                albedo: prop.albedo_tint.to_u32(),
                clusters: prop.clusters.clone(),
                fade_min: fades.then_some(prop.fade_min),
                fade_max: fades.then_some(prop.fade_max),
                fade_scale: fades.then_some(prop.fade_scale),
            }
        })
        .collect();

    StaticPropsResponse {
        models: lump.model_names().to_vec(),
        props,
    }
}

/// Baked vertex lighting samples, one RGB array per mesh.
#[derive(Debug, Serialize)]
pub struct VertexLightingResponse {
    pub meshes: Vec<Vec<[u8; 3]>>,
}

pub fn vertex_lighting_response(
    file: &VertexLightingFile,
    lod: u32,
) -> Result<VertexLightingResponse> {
    let mut meshes = Vec::with_capacity(file.mesh_count(lod));
    for mesh in 0..file.mesh_count(lod) {
        let samples = file.samples(lod, mesh)?;
        meshes.push(
            samples
                .iter()
                .map(|sample| [sample.r, sample.g, sample.b])
                .collect(),
        );
    }
    Ok(VertexLightingResponse { meshes })
}

/// Per-mesh buffer slices for one (body part, model, LOD).
pub fn mesh_slices(
    file: &TriangleFile,
    body_part: usize,
    model: usize,
    lod: usize,
) -> Result<Vec<MeshSlice>> {
    let mut slices = Vec::with_capacity(file.mesh_count(body_part, model, lod)?);
    for mesh in 0..file.mesh_count(body_part, model, lod)? {
        slices.push(file.slice(body_part, model, lod, mesh)?);
    }
    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::props::test_fixtures::{sprp_bytes, PropFixture};
    use crate::bsp::StaticPropFlags;

    #[test]
    fn test_static_props_serialize_with_conditional_fade_fields() {
        let data = sprp_bytes(
            &["props/crate001a.mdl"],
            &[0],
            &[
                PropFixture {
                    model_index: 0,
                    leaf_count: 1,
                    flags: StaticPropFlags::FADES.bits(),
                    fade_min: 10.0,
                    fade_max: 90.0,
                    ..Default::default()
                },
                PropFixture {
                    model_index: 0,
                    leaf_count: 1,
                    ..Default::default()
                },
            ],
        );
        let lump = StaticPropsLump::parse(&data, 5, &[4]).unwrap();

        let response = static_props_response(&lump);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["models"][0], "props/crate001a.mdl");
        assert_eq!(json["props"][0]["fade_max"], 90.0);
        assert_eq!(json["props"][0]["clusters"][0], 4);
        // The non-fading prop serializes without fade fields.
        assert!(json["props"][1].get("fade_max").is_none());
    }

    #[test]
    fn test_mesh_slices_projection() {
        use crate::mesh::test_fixtures::{FakeTopology, FakeVertices, TriangleFileBuilder};

        let builder = TriangleFileBuilder {
            meshes: vec![(vec![0, 1, 2], vec![0, 1, 2]), (vec![0, 1], vec![0, 1])],
            strip_flags: 0x1,
        };
        let file = TriangleFile::decode(
            std::io::Cursor::new(builder.build()),
            &FakeVertices::sequential(4),
            &FakeTopology::new(vec![0, 1]),
        )
        .unwrap();

        let slices = mesh_slices(&file, 0, 0, 0).unwrap();
        assert_eq!(slices.len(), 2);
        let json = serde_json::to_value(&slices).unwrap();
        assert_eq!(json[1]["vertex_offset"], 3);
        assert_eq!(json[1]["index_count"], 2);
    }
}
