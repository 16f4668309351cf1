//! Static prop placement tables.
//!
//! The static-prop game lump holds three tables: a model-name dictionary of
//! fixed 128-byte entries, a leaf membership list, and the prop records
//! themselves. Record layout grew by version; versions 4 through 7 are
//! handled here. Prop model references are resolved against the dictionary
//! while parsing, and leaf membership is translated to visibility cluster
//! ids so the viewer never sees raw leaf indices.

use std::io::Cursor;

use bitflags::bitflags;
use glam::Vec3;
use log::warn;

use crate::error::{Result, SourceError};
use crate::lump::LumpReader;
use crate::mesh::read_vec3;
use crate::types::{BoundingBox, ColorRgb};

const MODEL_NAME_SIZE: usize = 128;

bitflags! {
    /// Per-prop behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StaticPropFlags: u8 {
        const FADES = 0x1;
        const USE_LIGHTING_ORIGIN = 0x2;
        const NO_DRAW = 0x4;
        const IGNORE_NORMALS = 0x8;
        const NO_SHADOW = 0x10;
        const SCREEN_SPACE_FADE = 0x20;
        const NO_PER_VERTEX_LIGHTING = 0x40;
        const NO_SELF_SHADOWING = 0x80;
    }
}

/// One placed prop instance.
#[derive(Debug, Clone)]
pub struct StaticProp {
    pub origin: Vec3,
    /// Pitch, yaw, roll in degrees.
    pub angles: Vec3,
    /// Dictionary index of the model, when the prop is renderable.
    pub model_index: Option<usize>,
    /// Resolved model path, when the prop is renderable.
    pub model_name: Option<String>,
    pub skin: i32,
    pub solid: bool,
    pub flags: StaticPropFlags,
    pub fade_min: f32,
    pub fade_max: f32,
    pub fade_scale: f32,
    pub lighting_origin: Vec3,
    pub albedo_tint: ColorRgb,
    /// Visibility clusters the prop touches. Empty for non-renderable
    /// props.
    pub clusters: Vec<i32>,
}

impl StaticProp {
    /// Whether the prop has a mesh to draw at all.
    pub fn is_renderable(&self) -> bool {
        self.model_name.is_some()
    }

    /// Fade visibility test: a prop that does not fade is always in range;
    /// otherwise it is in range iff the minimum distance from the query
    /// bounds to its origin is within the configured fade maximum.
    pub fn in_fade_range(&self, bounds: &BoundingBox) -> bool {
        if !self.flags.contains(StaticPropFlags::FADES) {
            return true;
        }
        bounds.distance_to_point(self.origin) <= self.fade_max
    }
}

/// The parsed static-prop tables.
pub struct StaticPropsLump {
    model_names: Vec<String>,
    props: Vec<StaticProp>,
}

impl StaticPropsLump {
    /// Parse a static-prop lump. `leaf_clusters` maps map leaf indices to
    /// visibility cluster ids.
    pub fn parse(data: &[u8], version: u16, leaf_clusters: &[i16]) -> Result<Self> {
        if !(4..=7).contains(&version) {
            return Err(SourceError::UnsupportedFormat(format!(
                "static prop lump version {version}"
            )));
        }

        let mut reader = LumpReader::new(Cursor::new(data))?;

        // Model name dictionary.
        let model_count = reader.read_i32()?;
        if model_count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative model name count {model_count}"
            )));
        }
        let mut model_names = Vec::with_capacity(model_count as usize);
        let mut name_bytes = [0u8; MODEL_NAME_SIZE];
        for _ in 0..model_count {
            reader.read_bytes(&mut name_bytes)?;
            let end = name_bytes
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(MODEL_NAME_SIZE);
            model_names.push(String::from_utf8_lossy(&name_bytes[..end]).into_owned());
        }

        // Leaf membership list.
        let leaf_count = reader.read_i32()?;
        if leaf_count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative leaf list count {leaf_count}"
            )));
        }
        let mut leaf_list = Vec::with_capacity(leaf_count as usize);
        for _ in 0..leaf_count {
            leaf_list.push(reader.read_u16()?);
        }

        // Prop records.
        let prop_count = reader.read_i32()?;
        if prop_count < 0 {
            return Err(SourceError::Malformed(format!(
                "negative prop count {prop_count}"
            )));
        }
        let mut props = Vec::with_capacity(prop_count as usize);
        for prop_index in 0..prop_count {
            let origin = read_vec3(&mut reader)?;
            let angles = read_vec3(&mut reader)?;
            let model_index = reader.read_u16()? as usize;
            let first_leaf = reader.read_u16()?;
            let prop_leaf_count = reader.read_u16()?;
            let solid = reader.read_u8()? != 0;
            let flags = StaticPropFlags::from_bits_retain(reader.read_u8()?);
            let skin = reader.read_i32()?;
            let fade_min = reader.read_f32()?;
            let fade_max = reader.read_f32()?;
            let lighting_origin = read_vec3(&mut reader)?;
            let fade_scale = if version >= 5 { reader.read_f32()? } else { 1.0 };
            if version >= 6 {
                let _min_dx_level = reader.read_u16()?;
                let _max_dx_level = reader.read_u16()?;
            }
            let albedo_tint = if version >= 7 {
                let r = reader.read_u8()?;
                let g = reader.read_u8()?;
                let b = reader.read_u8()?;
                let _a = reader.read_u8()?;
                ColorRgb::new(r, g, b)
            } else {
                ColorRgb::WHITE
            };

            let resolved_model = model_names.get(model_index).cloned();
            let renderable =
                !flags.contains(StaticPropFlags::NO_DRAW) && resolved_model.is_some();
            if resolved_model.is_none() {
                warn!(
                    "static prop {prop_index} references model {model_index} \
                     outside dictionary of {}",
                    model_names.len()
                );
            }

            // Non-renderable props keep no mesh reference and no cluster
            // membership.
            let (model_index, model_name, clusters) = if renderable {
                let clusters = resolve_clusters(
                    &leaf_list,
                    leaf_clusters,
                    first_leaf as usize,
                    prop_leaf_count as usize,
                )?;
                (Some(model_index), resolved_model, clusters)
            } else {
                (None, None, Vec::new())
            };

            props.push(StaticProp {
                origin,
                angles,
                model_index,
                model_name,
                skin,
                solid,
                flags,
                fade_min,
                fade_max,
                fade_scale,
                lighting_origin,
                albedo_tint,
                clusters,
            });
        }

        Ok(Self { model_names, props })
    }

    pub fn model_names(&self) -> &[String] {
        &self.model_names
    }

    pub fn props(&self) -> &[StaticProp] {
        &self.props
    }

    pub fn prop_count(&self) -> usize {
        self.props.len()
    }
}

fn resolve_clusters(
    leaf_list: &[u16],
    leaf_clusters: &[i16],
    first_leaf: usize,
    count: usize,
) -> Result<Vec<i32>> {
    let leaves = leaf_list.get(first_leaf..first_leaf + count).ok_or_else(|| {
        SourceError::Malformed(format!(
            "prop leaf range {first_leaf}+{count} outside leaf list of {}",
            leaf_list.len()
        ))
    })?;

    let mut clusters = Vec::with_capacity(leaves.len());
    for &leaf in leaves {
        let cluster = *leaf_clusters.get(leaf as usize).ok_or_else(|| {
            SourceError::CrossReference(format!(
                "prop leaf {leaf} outside leaves lump of {}",
                leaf_clusters.len()
            ))
        })?;
        // Solid leaves belong to no cluster.
        if cluster < 0 {
            continue;
        }
        let cluster = cluster as i32;
        if !clusters.contains(&cluster) {
            clusters.push(cluster);
        }
    }
    Ok(clusters)
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    pub struct PropFixture {
        pub origin: [f32; 3],
        pub model_index: u16,
        pub first_leaf: u16,
        pub leaf_count: u16,
        pub flags: u8,
        pub fade_min: f32,
        pub fade_max: f32,
    }

    impl Default for PropFixture {
        fn default() -> Self {
            Self {
                origin: [0.0; 3],
                model_index: 0,
                first_leaf: 0,
                leaf_count: 0,
                flags: 0,
                fade_min: 0.0,
                fade_max: 0.0,
            }
        }
    }

    /// Serialize a version-5 static prop lump body.
    pub fn sprp_bytes(model_names: &[&str], leaf_list: &[u16], props: &[PropFixture]) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(model_names.len() as i32).unwrap();
        for name in model_names {
            let mut bytes = [0u8; MODEL_NAME_SIZE];
            bytes[..name.len()].copy_from_slice(name.as_bytes());
            data.extend_from_slice(&bytes);
        }
        data.write_i32::<LittleEndian>(leaf_list.len() as i32).unwrap();
        for &leaf in leaf_list {
            data.write_u16::<LittleEndian>(leaf).unwrap();
        }
        data.write_i32::<LittleEndian>(props.len() as i32).unwrap();
        for prop in props {
            for &component in &prop.origin {
                data.write_f32::<LittleEndian>(component).unwrap();
            }
            for _ in 0..3 {
                data.write_f32::<LittleEndian>(0.0).unwrap(); // angles
            }
            data.write_u16::<LittleEndian>(prop.model_index).unwrap();
            data.write_u16::<LittleEndian>(prop.first_leaf).unwrap();
            data.write_u16::<LittleEndian>(prop.leaf_count).unwrap();
            data.push(6); // solid
            data.push(prop.flags);
            data.write_i32::<LittleEndian>(0).unwrap(); // skin
            data.write_f32::<LittleEndian>(prop.fade_min).unwrap();
            data.write_f32::<LittleEndian>(prop.fade_max).unwrap();
            for _ in 0..3 {
                data.write_f32::<LittleEndian>(0.0).unwrap(); // lighting origin
            }
            data.write_f32::<LittleEndian>(2.5).unwrap(); // forced fade scale
        }
        data
    }
}
