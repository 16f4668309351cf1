//! Source Assets CLI
//!
//! Inspect and convert Source engine asset files.

use clap::{Parser, Subcommand};
use source_assets::{
    api, load_bsp, load_material, load_texture, ModelFile, OutputFormat, TextureConverter,
    TextureRequest, TriangleFile, VertexFile,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "source-assets")]
#[command(author, version, about = "Inspect and convert Source engine asset files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a summary of an asset file (bsp, vtf, vmt, mdl, vvd)
    Info {
        /// Path to the asset file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Convert a texture to PNG
    Texture {
        /// Input texture (.vtf)
        #[arg(short, long)]
        input: PathBuf,

        /// Output image path
        #[arg(short, long)]
        output: PathBuf,

        /// Mip level to convert
        #[arg(long, default_value = "0")]
        mip: u8,

        /// Animation frame
        #[arg(long, default_value = "0")]
        frame: u16,

        /// Cube face (for environment maps)
        #[arg(long, default_value = "0")]
        face: u16,
    },

    /// Dump a map's static props as JSON
    Props {
        /// Path to the compiled map (.bsp)
        #[arg(short, long)]
        bsp: PathBuf,

        /// Output JSON path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reconstruct a model's buffers and print its slice table
    Mesh {
        /// Optimized mesh file (.vtx)
        #[arg(long)]
        vtx: PathBuf,

        /// Raw vertex file (.vvd)
        #[arg(long)]
        vvd: PathBuf,

        /// Model file (.mdl)
        #[arg(long)]
        mdl: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { file } => info(&file)?,
        Commands::Texture {
            input,
            output,
            mip,
            frame,
            face,
        } => texture(&input, &output, mip, frame, face)?,
        Commands::Props { bsp, output } => props(&bsp, output.as_deref())?,
        Commands::Mesh { vtx, vvd, mdl } => mesh(&vtx, &vvd, &mdl)?,
    }

    Ok(())
}

fn info(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "bsp" => {
            let bsp = load_bsp(path)?;
            println!("map version {} revision {}", bsp.version(), bsp.map_revision());

            let props = bsp.static_props()?;
            println!("{} static props, {} models", props.prop_count(), props.model_names().len());

            let visibility = bsp.visibility()?;
            println!("{} visibility clusters", visibility.cluster_count());

            let pakfile = bsp.pakfile()?;
            println!("{} pakfile entries", pakfile.len());
        }
        "vtf" => {
            let texture = load_texture(path)?;
            let header = &texture.header;
            println!(
                "{}x{} {:?}, {} mips, {} frames, {} faces",
                header.width,
                header.height,
                header.format,
                header.mip_count,
                header.frame_count,
                header.face_count()
            );
        }
        "vmt" => {
            let material = load_material(path)?;
            for shader in material.shaders() {
                let group = material.get(shader).expect("listed shader");
                println!("{shader} ({} properties)", group.names().count());
            }
        }
        "mdl" => {
            let model = ModelFile::read(fs::File::open(path)?)?;
            println!(
                "{} version {} checksum {:#x}, {} body parts",
                model.name(),
                model.version(),
                model.checksum(),
                model.body_part_count()
            );
        }
        "vvd" => {
            let vertices = VertexFile::read(fs::File::open(path)?)?;
            println!(
                "checksum {:#x}, {} LODs, {} LOD 0 vertices",
                vertices.checksum(),
                vertices.lod_count(),
                source_assets::VertexSource::vertex_count(&vertices, 0)
            );
        }
        other => return Err(format!("unrecognized asset extension '{other}'").into()),
    }

    Ok(())
}

fn texture(
    input: &Path,
    output: &Path,
    mip: u8,
    frame: u16,
    face: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let texture = load_texture(input)?;
    let mut converter = TextureConverter::new();
    let png = converter.convert(
        &texture,
        TextureRequest {
            mip,
            frame,
            face,
            slice: 0,
        },
        OutputFormat::Png,
    )?;
    fs::write(output, png)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn props(bsp_path: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let bsp = load_bsp(bsp_path)?;
    let response = api::static_props_response(&bsp.static_props()?);
    let json = serde_json::to_string_pretty(&response)?;

    match output {
        Some(path) => {
            fs::write(path, json)?;
            println!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn mesh(vtx: &Path, vvd: &Path, mdl: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let model = ModelFile::read(fs::File::open(mdl)?)?;
    let vertices = VertexFile::read(fs::File::open(vvd)?)?;
    let triangles = TriangleFile::decode(fs::File::open(vtx)?, &vertices, &model)?;

    println!(
        "{}: {} vertices, {} indices",
        model.name(),
        triangles.vertices().len(),
        triangles.indices().len()
    );
    for body_part in 0..triangles.body_part_count() {
        for model_index in 0..triangles.model_count(body_part)? {
            let slices = api::mesh_slices(&triangles, body_part, model_index, 0)?;
            for (mesh_index, slice) in slices.iter().enumerate() {
                println!(
                    "  body part {body_part} model {model_index} mesh {mesh_index}: \
                     {} indices at {}, {} vertices at {}",
                    slice.index_count, slice.index_offset, slice.vertex_count, slice.vertex_offset
                );
            }
        }
    }
    Ok(())
}
