//! Block-compressed container header synthesis.
//!
//! Compressed texture data is handed to the recoder wrapped in a standard
//! DDS container so the recoder does not need to understand the proprietary
//! source container. Only the header is synthesized here; the compressed
//! payload is copied through untouched.

use bitflags::bitflags;

use crate::error::{Result, SourceError};
use crate::texture::TextureFormat;

/// `"DDS "` magic.
pub const MAGIC: u32 = 0x2053_4444;

/// Byte length of the magic plus the fixed-size header.
pub const HEADER_LEN: usize = 128;

bitflags! {
    #[derive(Debug, Clone, Copy)]
    pub struct HeaderFlags: u32 {
        const CAPS = 0x1;
        const HEIGHT = 0x2;
        const WIDTH = 0x4;
        const PITCH = 0x8;
        const PIXEL_FORMAT = 0x1000;
        const MIPMAP_COUNT = 0x20000;
        const LINEAR_SIZE = 0x80000;
        const DEPTH = 0x800000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy)]
    pub struct Caps: u32 {
        const COMPLEX = 0x8;
        const MIPMAP = 0x400000;
        const TEXTURE = 0x1000;
    }
}

const PIXEL_FORMAT_FOURCC: u32 = 0x4;

/// Block compression parameters for a texture format.
#[derive(Debug, Clone, Copy)]
pub struct BlockFormat {
    pub four_cc: u32,
    pub block_size: u32,
}

/// The two supported block formats. Anything else compressed is
/// unimplemented.
pub fn block_format(format: TextureFormat) -> Result<BlockFormat> {
    match format {
        TextureFormat::Dxt1 => Ok(BlockFormat {
            four_cc: u32::from_le_bytes(*b"DXT1"),
            block_size: 8,
        }),
        TextureFormat::Dxt5 => Ok(BlockFormat {
            four_cc: u32::from_le_bytes(*b"DXT5"),
            block_size: 16,
        }),
        other => Err(SourceError::UnsupportedFormat(format!(
            "block container synthesis for texture format {other:?}"
        ))),
    }
}

/// Append the magic and 124-byte header for a single-mip image.
pub fn write_header(dest: &mut Vec<u8>, width: u32, height: u32, pitch: u32, four_cc: u32) {
    let push = |dest: &mut Vec<u8>, value: u32| dest.extend_from_slice(&value.to_le_bytes());

    push(dest, MAGIC);
    push(dest, 124); // header size
    let flags =
        HeaderFlags::CAPS | HeaderFlags::HEIGHT | HeaderFlags::WIDTH | HeaderFlags::PIXEL_FORMAT;
    push(dest, flags.bits());
    push(dest, height);
    push(dest, width);
    push(dest, pitch);
    push(dest, 1); // depth
    push(dest, 1); // mip count
    for _ in 0..11 {
        push(dest, 0); // reserved
    }
    push(dest, 32); // pixel format size
    push(dest, PIXEL_FORMAT_FOURCC);
    push(dest, four_cc);
    for _ in 0..5 {
        push(dest, 0); // rgb bit count and channel masks
    }
    push(dest, Caps::TEXTURE.bits());
    for _ in 0..4 {
        push(dest, 0); // caps2-4 and reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut out = Vec::new();
        write_header(&mut out, 4, 8, 16, u32::from_le_bytes(*b"DXT1"));

        assert_eq!(out.len(), HEADER_LEN);
        assert_eq!(&out[0..4], b"DDS ");
        // dwHeight at 12, dwWidth at 16, pitch at 20.
        assert_eq!(u32::from_le_bytes(out[12..16].try_into().unwrap()), 8);
        assert_eq!(u32::from_le_bytes(out[16..20].try_into().unwrap()), 4);
        assert_eq!(u32::from_le_bytes(out[20..24].try_into().unwrap()), 16);
        // FourCC at 84.
        assert_eq!(&out[84..88], b"DXT1");
    }

    #[test]
    fn test_block_format_table() {
        assert_eq!(block_format(TextureFormat::Dxt1).unwrap().block_size, 8);
        assert_eq!(block_format(TextureFormat::Dxt5).unwrap().block_size, 16);
        assert!(matches!(
            block_format(TextureFormat::Dxt3),
            Err(SourceError::UnsupportedFormat(_))
        ));
    }
}
