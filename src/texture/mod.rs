//! Texture container parsing and recoding.
//!
//! The container holds a small header, an optional low-resolution thumbnail,
//! and the high-resolution image data for every (mip, frame, face, slice)
//! combination. Mip levels are stored smallest first; within a mip the data
//! is ordered frame-major, then face, then depth slice.

pub mod convert;
pub mod dds;

pub use convert::{
    convert_texture, ImageRecoder, OutputFormat, PixelDescriptor, RawLayout, Recoder,
    TextureConverter, TextureRequest,
};

use std::io::{Read, Seek};

use bitflags::bitflags;
use glam::Vec3;

use crate::error::{Result, SourceError};
use crate::lump::LumpReader;

/// Pixel formats a texture container can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8888,
    Abgr8888,
    Rgb888,
    Bgr888,
    Rgb565,
    I8,
    Ia88,
    P8,
    A8,
    Rgb888Bluescreen,
    Bgr888Bluescreen,
    Argb8888,
    Bgra8888,
    Dxt1,
    Dxt3,
    Dxt5,
    Bgrx8888,
    Bgr565,
    Bgrx5551,
    Bgra4444,
    Dxt1OneBitAlpha,
    Bgra5551,
    Uv88,
    Uvwq8888,
    Rgba16161616F,
    Rgba16161616,
    Uvlx8888,
}

impl TextureFormat {
    pub fn from_tag(tag: i32) -> Result<Self> {
        use TextureFormat::*;
        Ok(match tag {
            0 => Rgba8888,
            1 => Abgr8888,
            2 => Rgb888,
            3 => Bgr888,
            4 => Rgb565,
            5 => I8,
            6 => Ia88,
            7 => P8,
            8 => A8,
            9 => Rgb888Bluescreen,
            10 => Bgr888Bluescreen,
            11 => Argb8888,
            12 => Bgra8888,
            13 => Dxt1,
            14 => Dxt3,
            15 => Dxt5,
            16 => Bgrx8888,
            17 => Bgr565,
            18 => Bgrx5551,
            19 => Bgra4444,
            20 => Dxt1OneBitAlpha,
            21 => Bgra5551,
            22 => Uv88,
            23 => Uvwq8888,
            24 => Rgba16161616F,
            25 => Rgba16161616,
            26 => Uvlx8888,
            other => {
                return Err(SourceError::UnsupportedFormat(format!(
                    "texture pixel format tag {other}"
                )))
            }
        })
    }

    /// True for the 4x4 block-compressed formats.
    pub fn is_block_compressed(self) -> bool {
        matches!(
            self,
            TextureFormat::Dxt1
                | TextureFormat::Dxt3
                | TextureFormat::Dxt5
                | TextureFormat::Dxt1OneBitAlpha
        )
    }

    /// Stored byte size of a `width` x `height` image in this format.
    pub fn data_size(self, width: u32, height: u32) -> u64 {
        use TextureFormat::*;
        if self.is_block_compressed() {
            let block_size = match self {
                Dxt1 | Dxt1OneBitAlpha => 8,
                _ => 16,
            };
            let blocks_x = ((width + 3) / 4).max(1) as u64;
            let blocks_y = ((height + 3) / 4).max(1) as u64;
            return blocks_x * blocks_y * block_size;
        }

        let bytes_per_pixel: u64 = match self {
            I8 | P8 | A8 => 1,
            Rgb565 | Ia88 | Bgr565 | Bgrx5551 | Bgra4444 | Bgra5551 | Uv88 => 2,
            Rgb888 | Bgr888 | Rgb888Bluescreen | Bgr888Bluescreen => 3,
            Rgba8888 | Abgr8888 | Argb8888 | Bgra8888 | Bgrx8888 | Uvwq8888 | Uvlx8888 => 4,
            Rgba16161616F | Rgba16161616 => 8,
            Dxt1 | Dxt3 | Dxt5 | Dxt1OneBitAlpha => unreachable!(),
        };
        width as u64 * height as u64 * bytes_per_pixel
    }
}

bitflags! {
    /// Texture header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureFlags: u32 {
        const POINT_SAMPLE = 0x1;
        const TRILINEAR = 0x2;
        const CLAMP_S = 0x4;
        const CLAMP_T = 0x8;
        const ANISOTROPIC = 0x10;
        const HINT_DXT5 = 0x20;
        const SRGB = 0x40;
        const NORMAL = 0x80;
        const NO_MIP = 0x100;
        const NO_LOD = 0x200;
        const ALL_MIPS = 0x400;
        const PROCEDURAL = 0x800;
        const ONE_BIT_ALPHA = 0x1000;
        const EIGHT_BIT_ALPHA = 0x2000;
        const ENVMAP = 0x4000;
        const RENDER_TARGET = 0x8000;
        const DEPTH_RENDER_TARGET = 0x10000;
    }
}

/// Parsed texture container header.
#[derive(Debug, Clone)]
pub struct TextureHeader {
    pub version: (u32, u32),
    pub width: u32,
    pub height: u32,
    pub flags: TextureFlags,
    pub frame_count: u16,
    pub first_frame: u16,
    pub reflectivity: Vec3,
    pub bumpmap_scale: f32,
    pub format: TextureFormat,
    pub mip_count: u8,
    pub low_res_format: Option<TextureFormat>,
    pub low_res_width: u8,
    pub low_res_height: u8,
    pub depth: u16,
}

impl TextureHeader {
    /// Environment maps carry six cube faces; everything else one.
    pub fn face_count(&self) -> u16 {
        if self.flags.contains(TextureFlags::ENVMAP) {
            6
        } else {
            1
        }
    }

    /// Pixel dimensions of `mip`, floored at one pixel.
    pub fn mip_dimensions(&self, mip: u8) -> (u32, u32) {
        ((self.width >> mip).max(1), (self.height >> mip).max(1))
    }
}

/// A texture container with its high-resolution data in memory.
#[derive(Debug)]
pub struct TextureFile {
    pub header: TextureHeader,
    hi_res: Vec<u8>,
}

impl TextureFile {
    pub fn read(stream: impl Read + Seek) -> Result<Self> {
        let mut reader = LumpReader::new(stream)?;

        let mut signature = [0u8; 4];
        reader.read_bytes(&mut signature)?;
        if &signature != b"VTF\0" {
            return Err(SourceError::Malformed(
                "missing VTF signature".to_string(),
            ));
        }

        let major = reader.read_u32()?;
        let minor = reader.read_u32()?;
        if major != 7 {
            return Err(SourceError::UnsupportedFormat(format!(
                "texture container version {major}.{minor}"
            )));
        }

        let header_size = reader.read_u32()?;
        let width = reader.read_u16()? as u32;
        let height = reader.read_u16()? as u32;
        if width == 0 || height == 0 {
            return Err(SourceError::Malformed(format!(
                "texture dimensions {width}x{height}"
            )));
        }

        let flags = TextureFlags::from_bits_retain(reader.read_u32()?);
        let frame_count = reader.read_u16()?;
        let first_frame = reader.read_u16()?;
        reader.skip(4)?;
        let reflectivity = Vec3::new(
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        );
        reader.skip(4)?;
        let bumpmap_scale = reader.read_f32()?;
        let format = TextureFormat::from_tag(reader.read_i32()?)?;
        let mip_count = reader.read_u8()?;
        if mip_count == 0 {
            return Err(SourceError::Malformed("texture with zero mips".to_string()));
        }

        let low_res_tag = reader.read_i32()?;
        let low_res_format = if low_res_tag == -1 {
            None
        } else {
            Some(TextureFormat::from_tag(low_res_tag)?)
        };
        let low_res_width = reader.read_u8()?;
        let low_res_height = reader.read_u8()?;
        let depth = if minor >= 2 { reader.read_u16()? } else { 1 };

        let header = TextureHeader {
            version: (major, minor),
            width,
            height,
            flags,
            frame_count: frame_count.max(1),
            first_frame,
            reflectivity,
            bumpmap_scale,
            format,
            mip_count,
            low_res_format,
            low_res_width,
            low_res_height,
            depth: depth.max(1),
        };

        // High-resolution data follows the declared header size and the
        // low-resolution thumbnail.
        let low_res_size = low_res_format.map_or(0, |format| {
            format.data_size(low_res_width as u32, low_res_height as u32)
        });
        let data_start = header_size as u64 + low_res_size;
        reader.seek_to(data_start)?;
        let mut hi_res = vec![0u8; (reader.len() - data_start) as usize];
        reader.read_bytes(&mut hi_res)?;

        Ok(Self { header, hi_res })
    }

    /// Stored byte size of one face image at `mip`.
    pub fn mip_size(&self, mip: u8) -> u64 {
        let (width, height) = self.header.mip_dimensions(mip);
        self.header.format.data_size(width, height)
    }

    /// Append the raw stored bytes of one (mip, frame, face, slice) image to
    /// `dest`.
    pub fn write_pixel_data(
        &self,
        mip: u8,
        frame: u16,
        face: u16,
        slice: u16,
        dest: &mut Vec<u8>,
    ) -> Result<()> {
        let header = &self.header;
        if mip >= header.mip_count
            || frame >= header.frame_count
            || face >= header.face_count()
            || slice >= header.depth
        {
            return Err(SourceError::Malformed(format!(
                "requested image (mip {mip}, frame {frame}, face {face}, slice {slice}) \
                 outside texture extents"
            )));
        }

        // Skip every smaller mip (stored first), then index into the
        // requested one.
        let mut offset = 0u64;
        for smaller in (mip + 1)..header.mip_count {
            offset += self.mip_size(smaller)
                * header.frame_count as u64
                * header.face_count() as u64
                * header.depth as u64;
        }
        let size = self.mip_size(mip);
        let images_before =
            (frame as u64 * header.face_count() as u64 + face as u64) * header.depth as u64
                + slice as u64;
        offset += images_before * size;

        let end = offset + size;
        if end > self.hi_res.len() as u64 {
            return Err(SourceError::Malformed(format!(
                "image data range {offset}..{end} outside {} stored bytes",
                self.hi_res.len()
            )));
        }

        dest.extend_from_slice(&self.hi_res[offset as usize..end as usize]);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use byteorder::{LittleEndian, WriteBytesExt};

    /// Serialize a minimal 7.1 texture container.
    pub fn vtf_bytes(
        format_tag: i32,
        width: u16,
        height: u16,
        mip_count: u8,
        frame_count: u16,
        flags: u32,
        hi_res: &[u8],
    ) -> Vec<u8> {
        const HEADER_SIZE: u32 = 80;

        let mut data = Vec::new();
        data.extend_from_slice(b"VTF\0");
        data.write_u32::<LittleEndian>(7).unwrap();
        data.write_u32::<LittleEndian>(1).unwrap();
        data.write_u32::<LittleEndian>(HEADER_SIZE).unwrap();
        data.write_u16::<LittleEndian>(width).unwrap();
        data.write_u16::<LittleEndian>(height).unwrap();
        data.write_u32::<LittleEndian>(flags).unwrap();
        data.write_u16::<LittleEndian>(frame_count).unwrap();
        data.write_u16::<LittleEndian>(0).unwrap(); // first frame
        data.extend_from_slice(&[0; 4]);
        for _ in 0..3 {
            data.write_f32::<LittleEndian>(0.5).unwrap(); // reflectivity
        }
        data.extend_from_slice(&[0; 4]);
        data.write_f32::<LittleEndian>(1.0).unwrap(); // bumpmap scale
        data.write_i32::<LittleEndian>(format_tag).unwrap();
        data.push(mip_count);
        data.write_i32::<LittleEndian>(-1).unwrap(); // no low-res thumbnail
        data.push(0);
        data.push(0);
        data.resize(HEADER_SIZE as usize, 0);
        data.extend_from_slice(hi_res);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_fields() {
        let data = fixtures::vtf_bytes(13, 8, 8, 2, 1, 0, &[0; 40]);
        let texture = TextureFile::read(Cursor::new(data)).unwrap();
        let header = &texture.header;
        assert_eq!(header.width, 8);
        assert_eq!(header.height, 8);
        assert_eq!(header.format, TextureFormat::Dxt1);
        assert_eq!(header.mip_count, 2);
        assert_eq!(header.face_count(), 1);
        assert_eq!(header.depth, 1);
    }

    #[test]
    fn test_unknown_format_tag_names_the_tag() {
        let data = fixtures::vtf_bytes(99, 4, 4, 1, 1, 0, &[]);
        let err = TextureFile::read(Cursor::new(data)).unwrap_err();
        match err {
            SourceError::UnsupportedFormat(message) => assert!(message.contains("99")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_envmap_has_six_faces() {
        let data = fixtures::vtf_bytes(13, 4, 4, 1, 1, TextureFlags::ENVMAP.bits(), &[0; 48]);
        let texture = TextureFile::read(Cursor::new(data)).unwrap();
        assert_eq!(texture.header.face_count(), 6);
    }

    #[test]
    fn test_mip_data_stored_smallest_first() {
        // 8x8 DXT1 with 2 mips: mip 1 (one block) stored before mip 0
        // (four blocks).
        let mut hi_res = vec![0x11u8; 8];
        hi_res.extend_from_slice(&[0x22; 32]);
        let data = fixtures::vtf_bytes(13, 8, 8, 2, 1, 0, &hi_res);
        let texture = TextureFile::read(Cursor::new(data)).unwrap();

        let mut out = Vec::new();
        texture.write_pixel_data(1, 0, 0, 0, &mut out).unwrap();
        assert_eq!(out, vec![0x11; 8]);

        out.clear();
        texture.write_pixel_data(0, 0, 0, 0, &mut out).unwrap();
        assert_eq!(out, vec![0x22; 32]);
    }

    #[test]
    fn test_frames_indexed_within_a_mip() {
        // 4x4 DXT1, 1 mip, 2 frames of one block each.
        let mut hi_res = vec![0xaau8; 8];
        hi_res.extend_from_slice(&[0xbb; 8]);
        let data = fixtures::vtf_bytes(13, 4, 4, 1, 2, 0, &hi_res);
        let texture = TextureFile::read(Cursor::new(data)).unwrap();

        let mut out = Vec::new();
        texture.write_pixel_data(0, 1, 0, 0, &mut out).unwrap();
        assert_eq!(out, vec![0xbb; 8]);
    }

    #[test]
    fn test_truncated_image_data_is_malformed() {
        let data = fixtures::vtf_bytes(13, 8, 8, 1, 1, 0, &[0; 8]);
        let texture = TextureFile::read(Cursor::new(data)).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            texture.write_pixel_data(0, 0, 0, 0, &mut out),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn test_request_outside_extents_is_malformed() {
        let data = fixtures::vtf_bytes(13, 4, 4, 1, 1, 0, &[0; 8]);
        let texture = TextureFile::read(Cursor::new(data)).unwrap();
        let mut out = Vec::new();
        assert!(texture.write_pixel_data(0, 1, 0, 0, &mut out).is_err());
        assert!(texture.write_pixel_data(0, 0, 1, 0, &mut out).is_err());
    }

    #[test]
    fn test_mip_dimensions_floor_at_one() {
        let data = fixtures::vtf_bytes(13, 8, 4, 4, 1, 0, &[0; 64]);
        let texture = TextureFile::read(Cursor::new(data)).unwrap();
        assert_eq!(texture.header.mip_dimensions(0), (8, 4));
        assert_eq!(texture.header.mip_dimensions(2), (2, 1));
        assert_eq!(texture.header.mip_dimensions(3), (1, 1));
    }
}
