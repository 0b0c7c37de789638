//! Encoding replacement images into `Texture2D` payloads.

use std::path::Path;

use anyhow::{Context, Result};
use byteorder::{LE, WriteBytesExt};
use image::{RgbaImage, imageops};
use intel_tex_2::{RgbaSurface, bc1, bc3, bc7};
use serde_json::Value;

use crate::tree::{self, FieldError};

/// The subset of Unity's `TextureFormat` this tool can produce, plus the inputs it maps from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TextureFormat {
    Alpha8 = 1,
    ARGB4444 = 2,
    RGB24 = 3,
    RGBA32 = 4,
    ARGB32 = 5,
    RGB565 = 7,
    DXT1 = 10,
    DXT5 = 12,
    RGBA4444 = 13,
    BGRA32 = 14,
    BC7 = 25,
    DXT1Crunched = 28,
    DXT5Crunched = 29,
}

impl TextureFormat {
    pub fn from_id(id: i64) -> Option<TextureFormat> {
        Some(match id {
            1 => TextureFormat::Alpha8,
            2 => TextureFormat::ARGB4444,
            3 => TextureFormat::RGB24,
            4 => TextureFormat::RGBA32,
            5 => TextureFormat::ARGB32,
            7 => TextureFormat::RGB565,
            10 => TextureFormat::DXT1,
            12 => TextureFormat::DXT5,
            13 => TextureFormat::RGBA4444,
            14 => TextureFormat::BGRA32,
            25 => TextureFormat::BC7,
            28 => TextureFormat::DXT1Crunched,
            29 => TextureFormat::DXT5Crunched,
            _ => return None,
        })
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    fn is_block_compressed(self) -> bool {
        matches!(
            self,
            TextureFormat::DXT1 | TextureFormat::DXT5 | TextureFormat::BC7
        )
    }
}

/// The format a texture stored as `format_id` gets re-encoded into.
/// Crunched formats lose their crunch layer; anything unsupported becomes `RGBA32`.
pub fn output_format(format_id: i64) -> TextureFormat {
    match TextureFormat::from_id(format_id) {
        Some(TextureFormat::DXT1Crunched) => TextureFormat::DXT1,
        Some(TextureFormat::DXT5Crunched) => TextureFormat::DXT5,
        Some(format) => format,
        None => {
            tracing::debug!("Texture format {format_id} is not supported, encoding as RGBA32");
            TextureFormat::RGBA32
        }
    }
}

/// An encoded replacement image.
#[derive(Debug, Clone)]
pub struct EncodedTexture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("Could not read image '{}'", path.display()))?;
    Ok(image.into_rgba8())
}

/// Encodes `image` for a texture currently stored as `format_id`.
/// Rows are flipped since Unity stores textures bottom-up.
pub fn encode(image: &RgbaImage, format_id: i64) -> Result<EncodedTexture> {
    let format = output_format(format_id);
    let flipped = imageops::flip_vertical(image);

    let data = if format.is_block_compressed() {
        let padded = pad_to_blocks(flipped);
        let surface = RgbaSurface {
            data: padded.as_raw(),
            width: padded.width(),
            height: padded.height(),
            stride: padded.width() * 4,
        };
        match format {
            TextureFormat::DXT1 => bc1::compress_blocks(&surface),
            TextureFormat::DXT5 => bc3::compress_blocks(&surface),
            _ => bc7::compress_blocks(&bc7::alpha_basic_settings(), &surface),
        }
    } else {
        encode_uncompressed(&flipped, format)?
    };

    Ok(EncodedTexture {
        data,
        width: image.width(),
        height: image.height(),
        format,
    })
}

fn pad_to_blocks(image: RgbaImage) -> RgbaImage {
    let width = image.width().div_ceil(4) * 4;
    let height = image.height().div_ceil(4) * 4;
    if (width, height) == image.dimensions() {
        return image;
    }
    let mut padded = RgbaImage::new(width, height);
    imageops::replace(&mut padded, &image, 0, 0);
    padded
}

fn encode_uncompressed(image: &RgbaImage, format: TextureFormat) -> Result<Vec<u8>> {
    let pixels = image.pixels().map(|pixel| pixel.0);
    let bytes_per_pixel = match format {
        TextureFormat::Alpha8 => 1,
        TextureFormat::RGB24 => 3,
        TextureFormat::ARGB4444 | TextureFormat::RGBA4444 | TextureFormat::RGB565 => 2,
        _ => 4,
    };
    let mut out = Vec::with_capacity(image.len() / 4 * bytes_per_pixel);

    for [r, g, b, a] in pixels {
        match format {
            TextureFormat::Alpha8 => out.push(a),
            TextureFormat::RGB24 => out.extend_from_slice(&[r, g, b]),
            TextureFormat::ARGB32 => out.extend_from_slice(&[a, r, g, b]),
            TextureFormat::BGRA32 => out.extend_from_slice(&[b, g, r, a]),
            TextureFormat::RGB565 => {
                let value =
                    (u16::from(r) >> 3) << 11 | (u16::from(g) >> 2) << 5 | u16::from(b) >> 3;
                out.write_u16::<LE>(value)?;
            }
            TextureFormat::ARGB4444 => out.write_u16::<LE>(pack4444([a, r, g, b]))?,
            TextureFormat::RGBA4444 => out.write_u16::<LE>(pack4444([r, g, b, a]))?,
            _ => out.extend_from_slice(&[r, g, b, a]),
        }
    }

    Ok(out)
}

fn pack4444(channels: [u8; 4]) -> u16 {
    channels
        .iter()
        .fold(0u16, |acc, &channel| acc << 4 | u16::from(channel >> 4))
}

/// Where a texture's pixels live.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    /// In a resource entry of the containing bundle
    Streamed { path: String, offset: u64, size: u64 },
    /// In the object's own `image data`
    Embedded,
}

pub fn storage(tree: &Value) -> Result<Storage, FieldError> {
    let path = match tree::get(tree, &["m_StreamData", "path"]) {
        Some(path) => path.as_str().unwrap_or_default(),
        None => return Ok(Storage::Embedded),
    };
    if path.is_empty() {
        return Ok(Storage::Embedded);
    }
    Ok(Storage::Streamed {
        path: path.to_owned(),
        offset: tree::get_u64(tree, &["m_StreamData", "offset"])?,
        size: tree::get_u64(tree, &["m_StreamData", "size"])?,
    })
}

pub fn format_id(tree: &Value) -> Result<i64, FieldError> {
    tree::get_i64(tree, &["m_TextureFormat"])
}

fn apply_common(tree: &mut Value, encoded: &EncodedTexture) -> Result<(), FieldError> {
    tree::set(tree, &["m_Width"], encoded.width)?;
    tree::set(tree, &["m_Height"], encoded.height)?;
    tree::set(tree, &["m_TextureFormat"], encoded.format.id())?;
    tree::set(tree, &["m_CompleteImageSize"], encoded.data.len())?;
    tree::set_if_present(tree, &["m_MipCount"], 1);
    Ok(())
}

/// Points the texture at `encoded`, stored at `offset` in its stream, and drops any inline pixels.
pub fn apply_streamed(
    tree: &mut Value,
    encoded: &EncodedTexture,
    offset: u64,
) -> Result<(), FieldError> {
    apply_common(tree, encoded)?;
    tree::set(tree, &["m_StreamData", "offset"], offset)?;
    tree::set(tree, &["m_StreamData", "size"], encoded.data.len())?;
    tree::set_if_present(tree, &["image data"], Value::Array(Vec::new()));
    Ok(())
}

/// Stores `encoded` inline in the texture.
pub fn apply_embedded(tree: &mut Value, encoded: &EncodedTexture) -> Result<(), FieldError> {
    apply_common(tree, encoded)?;
    tree::set(
        tree,
        &["image data"],
        Value::Array(encoded.data.iter().copied().map(Value::from).collect()),
    )?;
    tree::set_if_present(tree, &["m_StreamData", "offset"], 0);
    tree::set_if_present(tree, &["m_StreamData", "size"], 0);
    tree::set_if_present(tree, &["m_StreamData", "path"], "");
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::Rgba;
    use serde_json::json;

    use super::*;

    fn random_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |_, _| {
            Rgba([fastrand::u8(..), fastrand::u8(..), fastrand::u8(..), 255])
        })
    }

    #[test]
    fn rows_are_flipped() {
        let mut image = RgbaImage::new(1, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(0, 1, Rgba([0, 0, 255, 255]));

        let encoded = encode(&image, TextureFormat::RGBA32.id().into()).unwrap();
        assert_eq!(encoded.format, TextureFormat::RGBA32);
        assert_eq!(encoded.data, [0, 0, 255, 255, 255, 0, 0, 255]);
    }

    #[test]
    fn uncompressed_sizes() {
        let image = random_image(3, 5);
        let cases = [
            (TextureFormat::Alpha8, 15),
            (TextureFormat::RGB24, 45),
            (TextureFormat::RGB565, 30),
            (TextureFormat::ARGB4444, 30),
            (TextureFormat::BGRA32, 60),
        ];
        for (format, size) in cases {
            let encoded = encode(&image, format.id().into()).unwrap();
            assert_eq!(encoded.format, format);
            assert_eq!(encoded.data.len(), size, "{format:?}");
        }
    }

    #[test]
    fn channel_order() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 4]));
        assert_eq!(encode(&image, 5).unwrap().data, [4, 1, 2, 3]);
        assert_eq!(encode(&image, 14).unwrap().data, [3, 2, 1, 4]);
        assert_eq!(encode(&image, 3).unwrap().data, [1, 2, 3]);
    }

    #[test]
    fn block_formats_are_padded() {
        let image = random_image(5, 3);
        let bc7 = encode(&image, TextureFormat::BC7.id().into()).unwrap();
        assert_eq!(bc7.format, TextureFormat::BC7);
        assert_eq!((bc7.width, bc7.height), (5, 3));
        // 8x4 pixels -> 2 blocks of 16 bytes
        assert_eq!(bc7.data.len(), 32);

        let dxt1 = encode(&random_image(4, 4), TextureFormat::DXT1.id().into()).unwrap();
        assert_eq!(dxt1.data.len(), 8);
    }

    #[test]
    fn crunched_and_unsupported_formats() {
        assert_eq!(output_format(28), TextureFormat::DXT1);
        assert_eq!(output_format(29), TextureFormat::DXT5);
        // ETC2_RGBA8
        assert_eq!(output_format(47), TextureFormat::RGBA32);

        let encoded = encode(&random_image(4, 4), 29).unwrap();
        assert_eq!(encoded.format, TextureFormat::DXT5);
        assert_eq!(encoded.data.len(), 16);
    }

    fn texture_tree(path: &str) -> Value {
        json!({
            "m_Name": "chinese_body Atlas",
            "m_Width": 2048,
            "m_Height": 2048,
            "m_CompleteImageSize": 4194304,
            "m_MipCount": 1,
            "m_TextureFormat": 4,
            "image data": [],
            "m_StreamData": { "offset": 1000, "size": 4194304, "path": path }
        })
    }

    #[test]
    fn storage_kinds() {
        let streamed = texture_tree("archive:/CAB-a/CAB-a.resS");
        assert_eq!(
            storage(&streamed).unwrap(),
            Storage::Streamed {
                path: "archive:/CAB-a/CAB-a.resS".into(),
                offset: 1000,
                size: 4194304
            }
        );
        assert_eq!(storage(&texture_tree("")).unwrap(), Storage::Embedded);
    }

    #[test]
    fn apply_updates_metadata() {
        let encoded = EncodedTexture {
            data: vec![7; 64],
            width: 4,
            height: 4,
            format: TextureFormat::RGBA32,
        };

        let mut streamed = texture_tree("archive:/CAB-a/CAB-a.resS");
        apply_streamed(&mut streamed, &encoded, 128).unwrap();
        assert_eq!(streamed["m_StreamData"]["offset"], 128);
        assert_eq!(streamed["m_StreamData"]["size"], 64);
        assert_eq!(streamed["m_CompleteImageSize"], 64);
        assert_eq!(streamed["m_Width"], 4);

        let mut embedded = texture_tree("");
        apply_embedded(&mut embedded, &encoded).unwrap();
        assert_eq!(embedded["image data"].as_array().unwrap().len(), 64);
        assert_eq!(embedded["m_StreamData"]["size"], 0);
    }
}
