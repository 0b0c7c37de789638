use std::path::Path;

use anyhow::{Context, Result};
use rabex::objects::ClassId;

use crate::container::{Container, ObjectTable};
use crate::tree;

/// The localization tables of the Chinese language.
pub const TEXT_ASSET_NAMES: [&str; 36] = [
    "ZH_Achievements",
    "ZH_AutoSaveNames",
    "ZH_Belltown",
    "ZH_Bonebottom",
    "ZH_Caravan",
    "ZH_City",
    "ZH_Coral",
    "ZH_Crawl",
    "ZH_Credits List",
    "ZH_Deprecated",
    "ZH_Dust",
    "ZH_Enclave",
    "ZH_Error",
    "ZH_Fast Travel",
    "ZH_Forge",
    "ZH_General",
    "ZH_Greymoor",
    "ZH_Inspect",
    "ZH_Journal",
    "ZH_Lore",
    "ZH_MainMenu",
    "ZH_Map Zones",
    "ZH_Peak",
    "ZH_Pilgrims",
    "ZH_Prompts",
    "ZH_Quests",
    "ZH_Shellwood",
    "ZH_Shop",
    "ZH_Song",
    "ZH_Titles",
    "ZH_Tools",
    "ZH_UI",
    "ZH_Under",
    "ZH_Wanderers",
    "ZH_Weave",
    "ZH_Wilds",
];

fn replace_text<T: ObjectTable>(table: &mut T, path_id: i64, source: &Path) -> Result<()> {
    let bytes =
        std::fs::read(source).with_context(|| format!("Could not read '{}'", source.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut tree = table.read_tree(path_id)?;
    tree::set(&mut tree, &["m_Script"], &*text)?;
    table.write_tree(path_id, &tree)
}

/// Replaces the script of every known text asset that has a `<name>.txt` in `text_dir`.
/// Returns how many were replaced.
pub fn patch_text_assets<T: ObjectTable>(container: &mut Container<T>, text_dir: &Path) -> Result<usize> {
    tracing::info!("Replacing text from '{}'", text_dir.display());

    let mut count = 0;
    for table in container.tables_mut() {
        for object in table.objects() {
            if object.class_id != ClassId::TextAsset {
                continue;
            }
            let name = match table.object_name(object.path_id) {
                Ok(Some(name)) if TEXT_ASSET_NAMES.contains(&name.as_str()) => name,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("Could not read text asset {}: {e:?}", object.path_id);
                    continue;
                }
            };
            let source = text_dir.join(format!("{name}.txt"));
            if !source.is_file() {
                tracing::debug!("No text for '{name}'");
                continue;
            }
            match replace_text(table, object.path_id, &source) {
                Ok(()) => count += 1,
                Err(e) => tracing::warn!("Could not replace '{name}': {e:?}"),
            }
        }
    }

    tracing::info!("Replaced {count} text files");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::container::memory::MemoryTable;

    fn resources() -> (Container<MemoryTable>, [i64; 4]) {
        let mut table = MemoryTable::new("resources.assets");
        let ids = [
            table.insert(ClassId::TextAsset, json!({ "m_Name": "ZH_General", "m_Script": "old" })),
            table.insert(ClassId::TextAsset, json!({ "m_Name": "ZH_Map Zones", "m_Script": "old" })),
            table.insert(ClassId::TextAsset, json!({ "m_Name": "EN_General", "m_Script": "old" })),
            table.insert(ClassId::MonoBehaviour, json!({ "m_Name": "ZH_UI", "m_Script": "old" })),
        ];
        (Container::Table(table), ids)
    }

    fn script(container: &Container<MemoryTable>, path_id: i64) -> &str {
        container.main_table().unwrap().tree(path_id)["m_Script"].as_str().unwrap()
    }

    #[test]
    fn all_names_are_distinct() {
        let mut names = TEXT_ASSET_NAMES.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), TEXT_ASSET_NAMES.len());
    }

    #[test]
    fn replaces_known_text_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ZH_General.txt"), "測試文字內容").unwrap();
        std::fs::write(dir.path().join("EN_General.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("ZH_UI.txt"), "ignored").unwrap();

        let (mut container, [general, map_zones, english, behaviour]) = resources();
        let count = patch_text_assets(&mut container, dir.path()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(script(&container, general), "測試文字內容");
        assert_eq!(script(&container, map_zones), "old");
        assert_eq!(script(&container, english), "old");
        assert_eq!(script(&container, behaviour), "old");
    }

    #[test]
    fn invalid_utf8_is_replaced_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = "地圖".as_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice("區域".as_bytes());
        std::fs::write(dir.path().join("ZH_Map Zones.txt"), bytes).unwrap();

        let (mut container, [_, map_zones, ..]) = resources();
        assert_eq!(patch_text_assets(&mut container, dir.path()).unwrap(), 1);
        assert_eq!(script(&container, map_zones), "地圖\u{FFFD}\u{FFFD}區域");
    }

    #[test]
    fn missing_directory_changes_nothing() {
        let (mut container, _) = resources();
        let count = patch_text_assets(&mut container, Path::new("/nonexistent/Text")).unwrap();
        assert_eq!(count, 0);
        assert!(!container.is_modified());
    }
}
