//! Driving the external recoder.
//!
//! Converting a texture means extracting one stored image, wrapping it in a
//! container the recoder understands (a synthesized DDS header for the block
//! formats, bare interleaved pixels otherwise), and asking the recoder for
//! the display format. The recoder itself is a capability boundary: this
//! module only describes its input and requests an output format.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::{Result, SourceError};
use crate::texture::{dds, TextureFile, TextureFormat};

/// Encoded output formats the recoder can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
}

/// Interleaved raw pixel layouts handed to the recoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLayout {
    Bgra8,
    Bgr8,
    /// Half-float RGBA, the high-dynamic-range layout.
    Rgba16F,
}

impl RawLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            RawLayout::Bgra8 => 4,
            RawLayout::Bgr8 => 3,
            RawLayout::Rgba16F => 8,
        }
    }

    pub fn bits_per_channel(self) -> u32 {
        match self {
            RawLayout::Bgra8 | RawLayout::Bgr8 => 8,
            RawLayout::Rgba16F => 16,
        }
    }
}

/// Describes the pixel buffer handed to the recoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelDescriptor {
    /// A block-compressed container with an embedded header.
    Dds,
    /// Raw interleaved pixels with explicit layout and dimensions.
    Raw {
        layout: RawLayout,
        width: u32,
        height: u32,
    },
}

/// The external image recoding capability.
///
/// `explicit_dimensions` carries the true intended output size when the
/// input container cannot express it (block containers round up to 4x4).
pub trait Recoder {
    fn recode(
        &self,
        input: &[u8],
        descriptor: &PixelDescriptor,
        output: OutputFormat,
        explicit_dimensions: Option<(u32, u32)>,
    ) -> Result<Vec<u8>>;
}

impl<T: Recoder> Recoder for &T {
    fn recode(
        &self,
        input: &[u8],
        descriptor: &PixelDescriptor,
        output: OutputFormat,
        explicit_dimensions: Option<(u32, u32)>,
    ) -> Result<Vec<u8>> {
        (*self).recode(input, descriptor, output, explicit_dimensions)
    }
}

/// Which stored image of a texture to convert.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextureRequest {
    pub mip: u8,
    pub frame: u16,
    pub face: u16,
    pub slice: u16,
}

/// Texture conversion driver with a reusable scratch buffer.
///
/// The scratch buffer is confined to this converter; one converter must not
/// be shared across concurrent callers.
pub struct TextureConverter<R: Recoder> {
    recoder: R,
    scratch: Vec<u8>,
}

impl Default for TextureConverter<ImageRecoder> {
    fn default() -> Self {
        Self::with_recoder(ImageRecoder)
    }
}

impl TextureConverter<ImageRecoder> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: Recoder> TextureConverter<R> {
    pub fn with_recoder(recoder: R) -> Self {
        Self {
            recoder,
            scratch: Vec::new(),
        }
    }

    /// Convert one stored image of `texture` to `output`.
    pub fn convert(
        &mut self,
        texture: &TextureFile,
        request: TextureRequest,
        output: OutputFormat,
    ) -> Result<Vec<u8>> {
        let header = &texture.header;
        // A request past the smallest stored mip falls back to it.
        let mip = request.mip.min(header.mip_count - 1);
        let (width, height) = header.mip_dimensions(mip);

        self.scratch.clear();

        if header.format.is_block_compressed() {
            let block = dds::block_format(header.format)?;
            let pitch = ((header.width + 3) / 4).max(1) * block.block_size;
            dds::write_header(
                &mut self.scratch,
                width.max(4),
                height.max(4),
                pitch,
                block.four_cc,
            );
            texture.write_pixel_data(
                mip,
                request.frame,
                request.face,
                request.slice,
                &mut self.scratch,
            )?;

            // The block container cannot express dimensions below one block;
            // tell the recoder the true target size.
            let explicit = (width < 4 || height < 4).then_some((width, height));
            return self
                .recoder
                .recode(&self.scratch, &PixelDescriptor::Dds, output, explicit);
        }

        let layout = match header.format {
            TextureFormat::Bgra8888 => RawLayout::Bgra8,
            TextureFormat::Bgr888 => RawLayout::Bgr8,
            TextureFormat::Rgba16161616F => RawLayout::Rgba16F,
            other => {
                return Err(SourceError::UnsupportedFormat(format!(
                    "texture pixel format {other:?}"
                )))
            }
        };

        texture.write_pixel_data(
            mip,
            request.frame,
            request.face,
            request.slice,
            &mut self.scratch,
        )?;
        self.recoder.recode(
            &self.scratch,
            &PixelDescriptor::Raw {
                layout,
                width,
                height,
            },
            output,
            None,
        )
    }
}

/// One-shot conversion with a fresh scratch buffer.
pub fn convert_texture(
    texture: &TextureFile,
    request: TextureRequest,
    output: OutputFormat,
) -> Result<Vec<u8>> {
    TextureConverter::new().convert(texture, request, output)
}

/// Recoder backed by CPU block decompression and the `image` crate.
pub struct ImageRecoder;

impl Recoder for ImageRecoder {
    fn recode(
        &self,
        input: &[u8],
        descriptor: &PixelDescriptor,
        output: OutputFormat,
        explicit_dimensions: Option<(u32, u32)>,
    ) -> Result<Vec<u8>> {
        let decoded = match descriptor {
            PixelDescriptor::Dds => decode_dds(input)?,
            PixelDescriptor::Raw {
                layout,
                width,
                height,
            } => decode_raw(input, *layout, *width, *height)?,
        };

        let image = match explicit_dimensions {
            Some((width, height)) => crop_top_left(&decoded, width, height),
            None => decoded,
        };

        match output {
            OutputFormat::Png => {
                let mut encoded = Cursor::new(Vec::new());
                DynamicImage::ImageRgba8(image).write_to(&mut encoded, ImageFormat::Png)?;
                Ok(encoded.into_inner())
            }
        }
    }
}

fn decode_dds(input: &[u8]) -> Result<RgbaImage> {
    if input.len() < dds::HEADER_LEN || &input[0..4] != b"DDS " {
        return Err(SourceError::Malformed(
            "recoder input is not a block container".to_string(),
        ));
    }

    let field = |at: usize| {
        u32::from_le_bytes([input[at], input[at + 1], input[at + 2], input[at + 3]])
    };
    let height = field(12) as usize;
    let width = field(16) as usize;
    let four_cc = &input[84..88];
    let data = &input[dds::HEADER_LEN..];

    let mut pixels = vec![0u32; width * height];
    let decode = match four_cc {
        b"DXT1" => texture2ddecoder::decode_bc1,
        b"DXT5" => texture2ddecoder::decode_bc3,
        other => {
            return Err(SourceError::UnsupportedFormat(format!(
                "block container FourCC {:?}",
                String::from_utf8_lossy(other)
            )))
        }
    };
    decode(data, width, height, &mut pixels)
        .map_err(|message| SourceError::Malformed(message.to_string()))?;

    // The decoder emits BGRA packed into u32s.
    let mut rgba = Vec::with_capacity(width * height * 4);
    for pixel in pixels {
        rgba.push((pixel >> 16) as u8);
        rgba.push((pixel >> 8) as u8);
        rgba.push(pixel as u8);
        rgba.push((pixel >> 24) as u8);
    }
    RgbaImage::from_raw(width as u32, height as u32, rgba)
        .ok_or_else(|| SourceError::Malformed("block decode size mismatch".to_string()))
}

fn decode_raw(input: &[u8], layout: RawLayout, width: u32, height: u32) -> Result<RgbaImage> {
    let expected = width as usize * height as usize * layout.bytes_per_pixel();
    if input.len() < expected {
        return Err(SourceError::Malformed(format!(
            "raw pixel buffer holds {} bytes, {expected} needed for {width}x{height}",
            input.len()
        )));
    }

    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    match layout {
        RawLayout::Bgra8 => {
            for pixel in input[..expected].chunks_exact(4) {
                rgba.extend_from_slice(&[pixel[2], pixel[1], pixel[0], pixel[3]]);
            }
        }
        RawLayout::Bgr8 => {
            for pixel in input[..expected].chunks_exact(3) {
                rgba.extend_from_slice(&[pixel[2], pixel[1], pixel[0], 255]);
            }
        }
        RawLayout::Rgba16F => {
            for pixel in input[..expected].chunks_exact(8) {
                for channel in pixel.chunks_exact(2) {
                    let bits = u16::from_le_bytes([channel[0], channel[1]]);
                    let value = f16_to_f32(bits).clamp(0.0, 1.0);
                    rgba.push((value * 255.0).round() as u8);
                }
            }
        }
    }

    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| SourceError::Malformed("raw decode size mismatch".to_string()))
}

fn crop_top_left(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let width = width.min(image.width()).max(1);
    let height = height.min(image.height()).max(1);
    RgbaImage::from_fn(width, height, |x, y| *image.get_pixel(x, y))
}

/// IEEE 754 half-precision to single-precision.
fn f16_to_f32(bits: u16) -> f32 {
    let sign = (bits >> 15) as u32;
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x3ff) as u32;

    let value = match (exponent, mantissa) {
        (0, 0) => sign << 31,
        (0, _) => {
            // Subnormal: renormalize so the leading bit becomes implicit.
            let shift = mantissa.leading_zeros() - 21;
            let mantissa = (mantissa << shift) & 0x3ff;
            let exponent = 113 - shift;
            (sign << 31) | (exponent << 23) | (mantissa << 13)
        }
        (0x1f, 0) => (sign << 31) | 0x7f80_0000,
        (0x1f, _) => (sign << 31) | 0x7f80_0000 | (mantissa << 13),
        _ => (sign << 31) | ((exponent + 127 - 15) << 23) | (mantissa << 13),
    };
    f32::from_bits(value)
}
