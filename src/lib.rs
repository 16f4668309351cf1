//! # Source Assets
//!
//! A Rust library for decoding Source engine map, model, and texture assets
//! into renderer-ready data.
//!
//! ## Overview
//!
//! This library takes the compiled asset files of a Source engine game —
//! maps, optimized model meshes, compressed textures, and material
//! definitions — and reconstructs the normalized data a remote renderer
//! consumes: flat vertex/index buffers with per-mesh slice tables, encoded
//! images, prop placement tables, and visibility queries. It is strictly
//! decode-only; drawing and serving are the caller's business.
//!
//! ## Quick Start
//!
//! ```ignore
//! use source_assets::{load_bsp, TriangleFile, VertexFile, ModelFile};
//!
//! // Open a compiled map and list its props.
//! let bsp = load_bsp("maps/de_test.bsp")?;
//! let props = bsp.static_props()?;
//!
//! // Visibility queries are cached per map session.
//! let visibility = bsp.visibility()?;
//! let visible = visibility.pvs(12)?;
//!
//! // Reconstruct a model from its three companion files.
//! let mdl = ModelFile::read(std::fs::File::open("crate001.mdl")?)?;
//! let vvd = VertexFile::read(std::fs::File::open("crate001.vvd")?)?;
//! let vtx = TriangleFile::decode(
//!     std::fs::File::open("crate001.dx90.vtx")?, &vvd, &mdl)?;
//! ```
//!
//! Decode calls are pure functions of their input streams; the only session
//! state is the per-map visibility cache, which is safe to share across
//! concurrent readers.

pub mod api;
pub mod bsp;
pub mod error;
pub mod lump;
pub mod material;
pub mod mesh;
pub mod texture;
pub mod types;

// Re-export main types for convenience
pub use bsp::{BspFile, PakFile, StaticProp, StaticPropFlags, StaticPropsLump, Visibility};
pub use error::{Result, SourceError};
pub use lump::{LumpReader, LumpRecord, LumpRef};
pub use material::{MaterialFile, MaterialPropertyGroup};
pub use mesh::{
    MeshSlice, ModelFile, StudioVertex, TopologySource, TriangleFile, VertexFile,
    VertexLightingFile, VertexSource,
};
pub use texture::{
    convert_texture, ImageRecoder, OutputFormat, Recoder, TextureConverter, TextureFile,
    TextureFormat, TextureHeader, TextureRequest,
};
pub use types::{BoundingBox, ColorRgb};

/// Load a compiled map from a file path.
pub fn load_bsp<P: AsRef<std::path::Path>>(path: P) -> Result<BspFile> {
    BspFile::read(std::fs::File::open(path)?)
}

/// Load a material definition from a file path.
pub fn load_material<P: AsRef<std::path::Path>>(path: P) -> Result<MaterialFile> {
    MaterialFile::from_reader(std::fs::File::open(path)?)
}

/// Load a texture container from a file path.
pub fn load_texture<P: AsRef<std::path::Path>>(path: P) -> Result<TextureFile> {
    TextureFile::read(std::fs::File::open(path)?)
}
