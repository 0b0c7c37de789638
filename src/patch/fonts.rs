//! The font bundle: TextMeshPro font assets, their atlas textures and materials.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rabex::objects::ClassId;
use serde_json::Value;

use super::ObjectLocation;
use super::repack::{RepackOutcome, StreamedTexture, repack_shared_stream};
use crate::container::{Bundle, ObjectTable};
use crate::texture::{self, Storage};
use crate::tree;
use crate::utils::sanitize_filename;

pub const FONT_NAMES: [&str; 3] = ["chinese_body", "chinese_body_bold", "do_not_use_chinese_body_bold"];
pub const MATERIAL_NAMES: [&str; 3] = [
    "simsun_tmpro Material",
    "chinese_body_bold Material",
    "do_not_use_chinese_body_bold Material",
];
pub const ATLAS_NAMES: [&str; 3] = [
    "chinese_body Atlas",
    "chinese_body_bold Atlas",
    "do_not_use_chinese_body_bold Atlas",
];
/// Not replaced when keeping the game's own font files.
pub const BOLD_ATLAS: &str = "chinese_body_bold Atlas";

const FONT_FIELDS: [&str; 2] = ["m_fontInfo", "m_glyphInfoList"];
const MATERIAL_TEXTURE_SIZE: f64 = 4096.0;

/// The asset whose sidecar file is used for `name`.
pub fn sidecar_source(name: &str) -> &str {
    match name {
        "do_not_use_chinese_body_bold" => "chinese_body_bold",
        "do_not_use_chinese_body_bold Atlas" => "chinese_body_bold Atlas",
        _ => name,
    }
}

pub fn atlas_sidecar(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.png", sanitize_filename(sidecar_source(name))))
}

pub fn font_sidecar(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", sidecar_source(name)))
}

#[derive(Debug, Default)]
pub struct FontPatchReport {
    pub streams: Vec<RepackOutcome>,
    pub embedded_textures: usize,
    pub fonts: usize,
    pub materials: usize,
    pub failures: usize,
}

/// Objects of one bundle level, in the order they are patched.
#[derive(Debug, Default)]
struct Plan {
    streams: IndexMap<String, Vec<StreamedTexture>>,
    embedded: Vec<ObjectLocation>,
    fonts: Vec<ObjectLocation>,
    materials: Vec<ObjectLocation>,
}

fn classify<T: ObjectTable>(bundle: &Bundle<T>, skip_bold_atlas: bool) -> Plan {
    let mut plan = Plan::default();

    for (table_name, table) in bundle.tables() {
        for object in table.objects() {
            let class_id = object.class_id;
            if class_id != ClassId::MonoBehaviour
                && class_id != ClassId::Material
                && class_id != ClassId::Texture2D
            {
                continue;
            }
            let name = match table.object_name(object.path_id) {
                Ok(Some(name)) => name,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Could not read object {}: {e:?}", object.path_id);
                    continue;
                }
            };
            let location = |name: String| ObjectLocation {
                table: table_name.to_owned(),
                path_id: object.path_id,
                name,
            };

            if class_id == ClassId::MonoBehaviour && FONT_NAMES.contains(&name.as_str()) {
                plan.fonts.push(location(name));
            } else if class_id == ClassId::Material && MATERIAL_NAMES.contains(&name.as_str()) {
                plan.materials.push(location(name));
            } else if class_id == ClassId::Texture2D && ATLAS_NAMES.contains(&name.as_str()) {
                if skip_bold_atlas && name == BOLD_ATLAS {
                    tracing::info!("Keeping the original '{BOLD_ATLAS}'");
                    continue;
                }
                let storage = table
                    .read_tree(object.path_id)
                    .and_then(|tree| Ok(texture::storage(&tree)?));
                match storage {
                    Ok(Storage::Streamed { path, offset, .. }) => {
                        let stream = super::stream_name(&path).to_owned();
                        plan.streams.entry(stream).or_default().push(StreamedTexture {
                            table: table_name.to_owned(),
                            path_id: object.path_id,
                            name,
                            offset,
                        });
                    }
                    Ok(Storage::Embedded) => plan.embedded.push(location(name)),
                    Err(e) => tracing::warn!("Could not read texture '{name}': {e:?}"),
                }
            }
        }
    }

    plan
}

fn patch_embedded_texture<T: ObjectTable>(
    table: &mut T,
    object: &ObjectLocation,
    sidecar_dir: &Path,
) -> Result<bool> {
    let png = atlas_sidecar(sidecar_dir, &object.name);
    if !png.is_file() {
        return Ok(false);
    }
    let mut tree = table.read_tree(object.path_id)?;
    let image = texture::load_image(&png)?;
    let encoded = texture::encode(&image, texture::format_id(&tree)?)?;
    texture::apply_embedded(&mut tree, &encoded)?;
    table.write_tree(object.path_id, &tree)?;
    Ok(true)
}

fn patch_font<T: ObjectTable>(
    table: &mut T,
    object: &ObjectLocation,
    sidecar_dir: &Path,
) -> Result<bool> {
    let json = font_sidecar(sidecar_dir, &object.name);
    if !json.is_file() {
        return Ok(false);
    }
    let source: Value = serde_json::from_slice(
        &std::fs::read(&json).with_context(|| format!("Could not read '{}'", json.display()))?,
    )
    .with_context(|| format!("Invalid font data in '{}'", json.display()))?;

    let mut tree = table.read_tree(object.path_id)?;
    let copied = tree::copy_fields(&mut tree, &source, &FONT_FIELDS);
    tracing::debug!("Copied {copied:?} into '{}'", object.name);
    table.write_tree(object.path_id, &tree)?;
    Ok(true)
}

/// Sets the texture size properties the shader scales glyph UVs with.
pub fn fix_material_floats(tree: &mut Value) -> Result<bool, tree::FieldError> {
    let Some(floats) = tree::get_mut(tree, &["m_SavedProperties", "m_Floats"]) else {
        return Ok(false);
    };
    let floats = floats
        .as_array_mut()
        .ok_or_else(|| tree::FieldError::WrongType {
            path: "m_SavedProperties.m_Floats".into(),
            expected: "an array",
        })?;
    tree::upsert_pair(floats, "_TextureHeight", MATERIAL_TEXTURE_SIZE);
    tree::upsert_pair(floats, "_TextureWidth", MATERIAL_TEXTURE_SIZE);
    Ok(true)
}

fn patch_material<T: ObjectTable>(table: &mut T, object: &ObjectLocation) -> Result<bool> {
    let mut tree = table.read_tree(object.path_id)?;
    if !fix_material_floats(&mut tree)? {
        return Ok(false);
    }
    table.write_tree(object.path_id, &tree)?;
    Ok(true)
}

fn run_each<T: ObjectTable>(
    bundle: &mut Bundle<T>,
    objects: &[ObjectLocation],
    kind: &str,
    failures: &mut usize,
    mut patch: impl FnMut(&mut T, &ObjectLocation) -> Result<bool>,
) -> usize {
    let mut patched = 0;
    for object in objects {
        let result = bundle
            .table_mut(&object.table)
            .with_context(|| format!("'{}' is not a serialized file of the bundle", object.table))
            .and_then(|table| patch(table, object));
        match result {
            Ok(true) => {
                tracing::info!("Updated {kind} '{}'", object.name);
                patched += 1;
            }
            Ok(false) => tracing::debug!("Nothing to apply to {kind} '{}'", object.name),
            Err(e) => {
                tracing::warn!("Could not patch {kind} '{}': {e:?}", object.name);
                *failures += 1;
            }
        }
    }
    patched
}

/// Replaces font data, atlas textures and material properties in every level of `bundle`.
/// Shared streams are rebuilt first, before anything else touches texture metadata.
pub fn patch_font_bundle<T: ObjectTable>(
    bundle: &mut Bundle<T>,
    sidecar_dir: &Path,
    skip_bold_atlas: bool,
) -> Result<FontPatchReport> {
    let mut report = FontPatchReport::default();

    bundle.visit_mut(&mut |level| {
        let plan = classify(level, skip_bold_atlas);

        for (stream, group) in &plan.streams {
            match repack_shared_stream(level, stream, group, |name| atlas_sidecar(sidecar_dir, name)) {
                Ok(outcome) => report.streams.push(outcome),
                Err(e) => {
                    tracing::warn!("Could not repack '{stream}': {e:?}");
                    report.failures += 1;
                }
            }
        }

        report.embedded_textures += run_each(level, &plan.embedded, "texture", &mut report.failures, |table, object| {
            patch_embedded_texture(table, object, sidecar_dir)
        });
        report.fonts += run_each(level, &plan.fonts, "font", &mut report.failures, |table, object| {
            patch_font(table, object, sidecar_dir)
        });
        report.materials += run_each(level, &plan.materials, "material", &mut report.failures, patch_material);
        Ok(())
    })?;

    Ok(report)
}
