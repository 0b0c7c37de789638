//! Rebuilding a resource stream shared by several textures.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rabex::objects::pptr::PathId;
use serde_json::Value;

use crate::container::{Bundle, ObjectTable};
use crate::texture::{self, EncodedTexture};
use crate::utils::friendly_size;

/// A texture whose pixels live in a resource entry of the same bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamedTexture {
    pub table: String,
    pub path_id: PathId,
    pub name: String,
    /// Offset into the stream before repacking
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepackedTexture {
    pub name: String,
    pub path_id: PathId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Default, PartialEq)]
pub struct RepackOutcome {
    pub stream: String,
    /// Size of the rebuilt stream, `None` if it was left alone
    pub stream_len: Option<u64>,
    pub replaced: Vec<RepackedTexture>,
    pub skipped: Vec<String>,
}

struct Prepared<'a> {
    texture: &'a StreamedTexture,
    tree: Value,
    encoded: EncodedTexture,
}

/// Reads and re-encodes one texture. The returned tree already carries the new metadata at
/// offset 0, so a texture whose fields can't take it is rejected before the stream is touched.
fn prepare<T: ObjectTable>(
    bundle: &Bundle<T>,
    texture: &StreamedTexture,
    png: &Path,
) -> Result<(Value, EncodedTexture)> {
    let table = bundle
        .table(&texture.table)
        .with_context(|| format!("'{}' is not a serialized file of the bundle", texture.table))?;
    let mut tree = table.read_tree(texture.path_id)?;
    let image = texture::load_image(png)?;
    let encoded = texture::encode(&image, texture::format_id(&tree)?)?;
    texture::apply_streamed(&mut tree, &encoded, 0)?;
    Ok((tree, encoded))
}

/// Replaces the stream entry `stream` with the concatenated re-encodings of every texture in
/// `group` that has a sidecar image, and points those textures at their new windows.
///
/// Textures without a sidecar keep their old offset and size. Their old bytes are not carried
/// over, so only replaced textures are guaranteed to be readable afterwards.
pub fn repack_shared_stream<T: ObjectTable>(
    bundle: &mut Bundle<T>,
    stream: &str,
    group: &[StreamedTexture],
    sidecar: impl Fn(&str) -> PathBuf,
) -> Result<RepackOutcome> {
    let mut outcome = RepackOutcome {
        stream: stream.to_owned(),
        ..Default::default()
    };

    let mut group: Vec<&StreamedTexture> = group.iter().collect();
    group.sort_by_key(|texture| texture.offset);
    tracing::info!("Processing {} textures in '{stream}'", group.len());

    let mut prepared = Vec::new();
    for texture in group {
        let png = sidecar(&texture.name);
        if !png.is_file() {
            tracing::debug!("No replacement for '{}' at '{}'", texture.name, png.display());
            outcome.skipped.push(texture.name.clone());
            continue;
        }
        match prepare(bundle, texture, &png) {
            Ok((tree, encoded)) => prepared.push(Prepared {
                texture,
                tree,
                encoded,
            }),
            Err(e) => {
                tracing::warn!("Skipping texture '{}': {e:?}", texture.name);
                outcome.skipped.push(texture.name.clone());
            }
        }
    }
    if prepared.is_empty() {
        return Ok(outcome);
    }

    let mut blob = Vec::with_capacity(prepared.iter().map(|p| p.encoded.data.len()).sum());
    let mut offsets = Vec::with_capacity(prepared.len());
    for item in &prepared {
        offsets.push(blob.len() as u64);
        blob.extend_from_slice(&item.encoded.data);
    }
    let stream_len = blob.len();

    bundle
        .resource_mut(stream)
        .with_context(|| format!("Stream '{stream}' is not an entry of the bundle"))?
        .replace(blob);
    outcome.stream_len = Some(stream_len as u64);
    tracing::info!("Rebuilt '{stream}', new size {}", friendly_size(stream_len));

    for (item, offset) in prepared.into_iter().zip(offsets) {
        let Prepared {
            texture,
            mut tree,
            encoded,
        } = item;
        let written = texture::apply_streamed(&mut tree, &encoded, offset)
            .map_err(anyhow::Error::from)
            .and_then(|()| {
                bundle
                    .table_mut(&texture.table)
                    .with_context(|| {
                        format!("'{}' is not a serialized file of the bundle", texture.table)
                    })?
                    .write_tree(texture.path_id, &tree)
            });
        if let Err(e) = written {
            tracing::warn!("Could not update texture '{}': {e:?}", texture.name);
            outcome.skipped.push(texture.name.clone());
            continue;
        }
        tracing::info!("Updated metadata of '{}'", texture.name);

        outcome.replaced.push(RepackedTexture {
            name: texture.name.clone(),
            path_id: texture.path_id,
            offset,
            size: encoded.data.len() as u64,
        });
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};
    use rabex::objects::ClassId;
    use serde_json::json;

    use super::*;
    use crate::container::memory::MemoryTable;
    use crate::container::{Entry, Resource};
    use crate::texture::TextureFormat;

    const STREAM: &str = "shared.resS";

    fn texture_tree(name: &str, offset: u64) -> Value {
        json!({
            "m_Name": name,
            "m_Width": 8,
            "m_Height": 8,
            "m_CompleteImageSize": 1000,
            "m_MipCount": 1,
            "m_TextureFormat": TextureFormat::RGBA32.id(),
            "image data": [],
            "m_StreamData": { "offset": offset, "size": 1000, "path": format!("archive:/CAB-fonts/{STREAM}") }
        })
    }

    fn setup() -> (Bundle<MemoryTable>, Vec<StreamedTexture>) {
        let mut table = MemoryTable::new("CAB-fonts");
        let textures = (0..3)
            .map(|i| {
                let name = format!("atlas {i}");
                let path_id = table.insert(ClassId::Texture2D, texture_tree(&name, i * 1000));
                StreamedTexture {
                    table: "CAB-fonts".into(),
                    path_id,
                    name,
                    offset: i * 1000,
                }
            })
            .collect();

        let mut bundle = Bundle::default();
        bundle
            .entries
            .insert("CAB-fonts".into(), Entry::Table(table));
        bundle
            .entries
            .insert(STREAM.into(), Entry::Resource(Resource::original(vec![0xAA; 3000])));
        (bundle, textures)
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        let image = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        image.save(dir.join(format!("{name}.png"))).unwrap();
    }

    fn sidecars(dir: &Path) -> impl Fn(&str) -> PathBuf + '_ {
        move |name: &str| dir.join(format!("{name}.png"))
    }

    fn table(bundle: &Bundle<MemoryTable>) -> &MemoryTable {
        bundle.table("CAB-fonts").unwrap()
    }

    #[test]
    fn skipped_textures_keep_their_window() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "atlas 0", 4, 2);
        write_png(dir.path(), "atlas 2", 2, 2);

        let (mut bundle, mut textures) = setup();
        let before = table(&bundle).tree(textures[1].path_id).clone();
        textures.reverse();

        let outcome = repack_shared_stream(&mut bundle, STREAM, &textures, sidecars(dir.path())).unwrap();
        assert_eq!(outcome.skipped, ["atlas 1"]);
        assert_eq!(outcome.stream_len, Some(32 + 16));

        let first = table(&bundle).tree(1);
        assert_eq!(first["m_StreamData"]["offset"], 0);
        assert_eq!(first["m_StreamData"]["size"], 32);
        assert_eq!(first["m_Width"], 4);
        assert_eq!(first["m_Height"], 2);
        assert_eq!(first["m_CompleteImageSize"], 32);

        let third = table(&bundle).tree(3);
        assert_eq!(third["m_StreamData"]["offset"], 32);
        assert_eq!(third["m_StreamData"]["size"], 16);

        assert_eq!(table(&bundle).tree(2), &before);
    }

    #[test]
    fn windows_bound_their_own_bytes() {
        let dir = tempfile::tempdir().unwrap();
        for (i, size) in [3u32, 5, 1].into_iter().enumerate() {
            write_png(dir.path(), &format!("atlas {i}"), size, size);
        }

        let (mut bundle, textures) = setup();
        let outcome = repack_shared_stream(&mut bundle, STREAM, &textures, sidecars(dir.path())).unwrap();
        assert_eq!(outcome.replaced.len(), 3);

        let resource = bundle.resource_mut(STREAM).unwrap();
        assert_eq!(resource.len(), outcome.stream_len.unwrap());

        let mut end = 0;
        for (i, replaced) in outcome.replaced.iter().enumerate() {
            assert!(replaced.offset >= end, "windows overlap");
            end = replaced.offset + replaced.size;

            let image = texture::load_image(&dir.path().join(format!("atlas {i}.png"))).unwrap();
            let expected = texture::encode(&image, TextureFormat::RGBA32.id().into()).unwrap();
            let window = resource.read_window(replaced.offset, replaced.size as usize).unwrap();
            assert_eq!(window, expected.data);
        }
        assert_eq!(end, resource.len());
    }

    #[test]
    fn nothing_to_replace() {
        let dir = tempfile::tempdir().unwrap();
        let (mut bundle, textures) = setup();
        let before = table(&bundle).clone();

        let outcome = repack_shared_stream(&mut bundle, STREAM, &textures, sidecars(dir.path())).unwrap();
        assert_eq!(outcome.stream_len, None);
        assert_eq!(outcome.skipped.len(), 3);
        assert!(!bundle.is_modified());
        assert_eq!(
            table(&bundle).to_bytes().unwrap(),
            before.to_bytes().unwrap()
        );
    }

    #[test]
    fn broken_sidecar_only_skips_that_texture() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "atlas 0", 2, 2);
        std::fs::write(dir.path().join("atlas 1.png"), b"not a png").unwrap();

        let (mut bundle, textures) = setup();
        let outcome = repack_shared_stream(&mut bundle, STREAM, &textures, sidecars(dir.path())).unwrap();
        assert_eq!(outcome.replaced.len(), 1);
        assert_eq!(outcome.skipped, ["atlas 1", "atlas 2"]);
    }

    #[test]
    fn rejected_metadata_stays_out_of_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        for (i, size) in [2u32, 3, 4].into_iter().enumerate() {
            write_png(dir.path(), &format!("atlas {i}"), size, size);
        }

        let (mut bundle, textures) = setup();
        let broken = textures[1].path_id;
        let fonts = bundle.table_mut("CAB-fonts").unwrap();
        let tree = &mut fonts.objects.get_mut(&broken).unwrap().1;
        tree.as_object_mut().unwrap().remove("m_CompleteImageSize");
        let before = tree.clone();

        let outcome = repack_shared_stream(&mut bundle, STREAM, &textures, sidecars(dir.path())).unwrap();
        assert_eq!(outcome.skipped, ["atlas 1"]);
        assert_eq!(outcome.stream_len, Some(16 + 64));
        assert_eq!(table(&bundle).tree(broken), &before);

        let first = table(&bundle).tree(textures[0].path_id);
        assert_eq!(first["m_StreamData"]["offset"], 0);
        assert_eq!(first["m_StreamData"]["size"], 16);
        let third = table(&bundle).tree(textures[2].path_id);
        assert_eq!(third["m_StreamData"]["offset"], 16);
        assert_eq!(third["m_StreamData"]["size"], 64);

        let mut expected = Vec::new();
        for i in [0, 2] {
            let image = texture::load_image(&dir.path().join(format!("atlas {i}.png"))).unwrap();
            expected.extend(texture::encode(&image, TextureFormat::RGBA32.id().into()).unwrap().data);
        }
        let resource = bundle.resource_mut(STREAM).unwrap();
        assert_eq!(&*resource.serialize(), expected.as_slice());
    }

    #[test]
    fn missing_stream_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "atlas 0", 2, 2);

        let (mut bundle, textures) = setup();
        assert!(repack_shared_stream(&mut bundle, "other.resS", &textures, sidecars(dir.path())).is_err());
    }
}
