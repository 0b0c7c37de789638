//! Pointing the map's text components at the bold font of the font bundle.
//!
//! The map bundle's `fontZH` fields reference a font by `(m_FileID, m_PathID)`, where the file id
//! is a 1-based index into the map file's external references. The font bundle is added as an
//! external if it isn't referenced yet.

use anyhow::{Context, Result};
use rabex::objects::ClassId;
use rabex::objects::pptr::PathId;
use serde_json::Value;

use crate::addressables::ArchivePath;
use crate::container::{Container, ExternalFile, ObjectTable};
use crate::tree;

pub const TARGET_FONT_NAMES: [&str; 2] = ["chinese_body_bold", "do_not_use_chinese_body_bold"];
pub const CARRIER_FIELD: &str = "fontZH";

/// The external type marker of asset bundle references.
const EXTERNAL_TYPE_ASSET: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontReference {
    pub file_id: i32,
    pub path_id: PathId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceOutcome {
    pub reference: FontReference,
    pub added_external: bool,
    pub patched: Vec<PathId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub expected: FontReference,
    /// File id of the font bundle in the map's externals, `None` if it isn't listed
    pub external_file_id: Option<i32>,
    pub checked: usize,
    pub mismatched: Vec<PathId>,
}
impl VerifyReport {
    pub fn external_matches(&self) -> bool {
        self.external_file_id == Some(self.expected.file_id)
    }

    pub fn is_ok(&self) -> bool {
        self.external_matches() && self.mismatched.is_empty()
    }
}

/// The first MonoBehaviour named like one of `names`, in any serialized file of `container`.
pub fn find_target_font<T: ObjectTable>(container: &Container<T>, names: &[&str]) -> Option<PathId> {
    for table in container.tables() {
        for object in table.objects() {
            if object.class_id != ClassId::MonoBehaviour {
                continue;
            }
            match table.object_name(object.path_id) {
                Ok(Some(name)) if names.contains(&name.as_str()) => {
                    tracing::info!("Found target font '{name}' at path id {}", object.path_id);
                    return Some(object.path_id);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Could not read object {}: {e:?}", object.path_id),
            }
        }
    }
    tracing::warn!("No target font found in the font bundle");
    None
}

/// The file id of the external whose file name is `cab`.
pub fn external_file_id(externals: &[String], cab: &str) -> Option<i32> {
    externals
        .iter()
        .position(|path| super::stream_name(&path.replace('\\', "/")) == cab)
        .map(|index| index as i32 + 1)
}

/// An external reference to the serialized file `cab` of another bundle.
/// Which fields are written depends on the referencing file's format version.
pub fn new_external(cab: &str, format_version: u32) -> ExternalFile {
    ExternalFile {
        path_name: ArchivePath::same(cab).to_string(),
        guid: (format_version >= 5).then(|| *uuid::Uuid::new_v4().as_bytes()),
        type_id: (format_version >= 5).then_some(EXTERNAL_TYPE_ASSET),
        temp_empty: (format_version >= 6).then(String::new),
    }
}

fn font_cab_name<A: ObjectTable>(font: &Container<A>) -> Result<String> {
    Ok(font
        .main_table()
        .context("The font bundle contains no serialized file")?
        .table_name()
        .to_owned())
}

fn carrier(tree: &mut Value) -> Option<&mut serde_json::Map<String, Value>> {
    tree.get_mut(CARRIER_FIELD)?.as_object_mut()
}

/// Sets every `fontZH` reference in the main file of `map` to `target` in `font`.
pub fn patch_references<A: ObjectTable, B: ObjectTable>(
    map: &mut Container<B>,
    font: &Container<A>,
    target: PathId,
) -> Result<ReferenceOutcome> {
    let cab = font_cab_name(font)?;
    let main = map
        .main_table_mut()
        .context("The map bundle contains no serialized file")?;

    let (file_id, added_external) = match external_file_id(&main.externals(), &cab) {
        Some(file_id) => (file_id, false),
        None => {
            tracing::info!("Adding an external reference to '{cab}'");
            let file_id = main.push_external(new_external(&cab, main.format_version()));
            (file_id, true)
        }
    };
    let reference = FontReference {
        file_id,
        path_id: target,
    };

    let mut patched = Vec::new();
    for object in main.objects() {
        if object.class_id != ClassId::MonoBehaviour {
            continue;
        }
        let mut tree = match main.read_tree(object.path_id) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::debug!("Could not read object {}: {e:?}", object.path_id);
                continue;
            }
        };
        let Some(font_ref) = carrier(&mut tree) else {
            continue;
        };
        font_ref.insert("m_FileID".into(), reference.file_id.into());
        font_ref.insert("m_PathID".into(), reference.path_id.into());

        match main.write_tree(object.path_id, &tree) {
            Ok(()) => patched.push(object.path_id),
            Err(e) => tracing::warn!("Could not update object {}: {e:?}", object.path_id),
        }
    }

    if patched.is_empty() {
        tracing::warn!("No map text objects reference a font");
    } else {
        tracing::info!("Updated the font reference of {} map text objects", patched.len());
    }

    Ok(ReferenceOutcome {
        reference,
        added_external,
        patched,
    })
}

/// Decodes every carrier of `map` again and compares its reference to `expected`.
/// Mismatches, including a wrong or missing external entry, end up in the report.
pub fn verify_references<A: ObjectTable, B: ObjectTable>(
    map: &Container<B>,
    font: &Container<A>,
    expected: FontReference,
) -> Result<VerifyReport> {
    let cab = font_cab_name(font)?;
    let main = map
        .main_table()
        .context("The map bundle contains no serialized file")?;
    let mut report = VerifyReport {
        expected,
        external_file_id: external_file_id(&main.externals(), &cab),
        checked: 0,
        mismatched: Vec::new(),
    };
    match report.external_file_id {
        Some(file_id) if file_id != expected.file_id => tracing::warn!(
            "'{cab}' is external {file_id}, expected {}",
            expected.file_id
        ),
        Some(_) => {}
        None => tracing::warn!("The map bundle doesn't reference '{cab}'"),
    }

    for object in main.objects() {
        if object.class_id != ClassId::MonoBehaviour {
            continue;
        }
        let Ok(mut tree) = main.read_tree(object.path_id) else {
            continue;
        };
        if carrier(&mut tree).is_none() {
            continue;
        }
        report.checked += 1;
        let stored = (
            tree::get_i64(&tree, &[CARRIER_FIELD, "m_FileID"]),
            tree::get_i64(&tree, &[CARRIER_FIELD, "m_PathID"]),
        );
        if stored != (Ok(i64::from(expected.file_id)), Ok(expected.path_id)) {
            tracing::warn!("Object {} has font reference {stored:?}", object.path_id);
            report.mismatched.push(object.path_id);
        }
    }
    Ok(report)
}

/// Finds the target font in `font` and points `map` at it. Leaves `map` untouched if there is no
/// target font. A failed verification is reported, not returned as an error.
pub fn patch_map_font<A: ObjectTable, B: ObjectTable>(
    map: &mut Container<B>,
    font: &Container<A>,
) -> Result<Option<(ReferenceOutcome, VerifyReport)>> {
    let Some(target) = find_target_font(font, &TARGET_FONT_NAMES) else {
        return Ok(None);
    };
    let outcome = patch_references(map, font, target)?;
    let report = verify_references(map, font, outcome.reference)?;
    if report.is_ok() {
        tracing::info!("Verified {} font references", report.checked);
    } else if !report.mismatched.is_empty() {
        tracing::warn!(
            "{} of {} font references don't match after patching",
            report.mismatched.len(),
            report.checked
        );
    }
    Ok(Some((outcome, report)))
}
