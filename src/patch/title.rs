use std::path::Path;

use anyhow::Result;
use rabex::objects::ClassId;

use super::repack::{RepackOutcome, StreamedTexture, repack_shared_stream};
use crate::container::{Bundle, ObjectTable};
use crate::texture::{self, Storage};

/// Name prefix of the sprite atlas page that holds the game logo.
pub const TITLE_TEXTURE_PREFIX: &str = "sactx-0-1024x1024-BC7-Title-";

#[derive(Debug, PartialEq)]
pub enum TitleOutcome {
    MissingLogo,
    NotFound,
    /// The texture is stored inline, which isn't supported
    NotStreamed(String),
    Replaced(RepackOutcome),
}

enum Found {
    Streamed { stream: String, texture: StreamedTexture },
    Embedded(String),
}

fn find_title_texture<T: ObjectTable>(bundle: &Bundle<T>) -> Result<Option<Found>> {
    for (table_name, table) in bundle.tables() {
        for object in table.objects() {
            if object.class_id != ClassId::Texture2D {
                continue;
            }
            let name = match table.object_name(object.path_id) {
                Ok(Some(name)) if name.starts_with(TITLE_TEXTURE_PREFIX) => name,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("Could not read texture {}: {e:?}", object.path_id);
                    continue;
                }
            };
            tracing::info!("Found the title logo '{name}'");

            let tree = table.read_tree(object.path_id)?;
            return Ok(Some(match texture::storage(&tree)? {
                Storage::Streamed { path, offset, .. } => Found::Streamed {
                    stream: super::stream_name(&path).to_owned(),
                    texture: StreamedTexture {
                        table: table_name.to_owned(),
                        path_id: object.path_id,
                        name,
                        offset,
                    },
                },
                Storage::Embedded => Found::Embedded(name),
            }));
        }
    }
    Ok(None)
}

/// Replaces the title logo with `logo_png`. The logo's stream is rebuilt to contain only the new
/// logo, at offset 0.
pub fn patch_title_logo<T: ObjectTable>(bundle: &mut Bundle<T>, logo_png: &Path) -> Result<TitleOutcome> {
    if !logo_png.is_file() {
        tracing::info!("'{}' not found, keeping the original title logo", logo_png.display());
        return Ok(TitleOutcome::MissingLogo);
    }

    let mut outcome = None;
    bundle.visit_mut(&mut |level| {
        if outcome.is_some() {
            return Ok(());
        }
        outcome = match find_title_texture(level)? {
            None => None,
            Some(Found::Embedded(name)) => {
                tracing::warn!("The title logo '{name}' is not stored in a stream, skipping it");
                Some(TitleOutcome::NotStreamed(name))
            }
            Some(Found::Streamed { stream, texture }) => {
                let repacked = repack_shared_stream(level, &stream, &[texture], |_| logo_png.to_path_buf())?;
                Some(TitleOutcome::Replaced(repacked))
            }
        };
        Ok(())
    })?;

    Ok(outcome.unwrap_or_else(|| {
        tracing::warn!("No title logo texture found");
        TitleOutcome::NotFound
    }))
}
