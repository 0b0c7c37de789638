use std::borrow::Cow;
use std::io::Cursor;

use anyhow::{Context, Result};
use rabex::files::SerializedFile;
use rabex::files::serializedfile::builder::SerializedFileBuilder;
use rabex::files::serializedfile::{FileIdentifier, build_common_offset_map};
use rabex::objects::pptr::PathId;
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::{ExternalFile, ObjectSummary, ObjectTable};
use crate::Environment;
use crate::handle::SerializedFileHandle;
use crate::unity::types::NamedObject;

/// A serialized file backed by rabex. Edited objects are kept as encoded payloads and only
/// merged into a new file by [`ObjectTable::to_bytes`].
pub struct SerializedAsset<'env> {
    name: String,
    file: SerializedFile,
    data: Vec<u8>,
    env: &'env Environment,
    replacements: FxHashMap<PathId, Vec<u8>>,
    externals_changed: bool,
}

impl std::fmt::Debug for SerializedAsset<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedAsset")
            .field("name", &self.name)
            .field("replacements", &self.replacements.len())
            .finish()
    }
}

impl<'env> SerializedAsset<'env> {
    pub fn parse(name: String, data: Vec<u8>, env: &'env Environment) -> Result<Self> {
        let mut file = SerializedFile::from_reader(&mut Cursor::new(data.as_slice()))?;
        file.m_UnityVersion
            .get_or_insert(env.unity_version()?.clone());
        Ok(SerializedAsset {
            name,
            file,
            data,
            env,
            replacements: FxHashMap::default(),
            externals_changed: false,
        })
    }

    fn handle(&self) -> SerializedFileHandle<'_> {
        SerializedFileHandle::new(self.env, &self.file, &self.data)
    }
}

impl ObjectTable for SerializedAsset<'_> {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn format_version(&self) -> u32 {
        self.file.m_Header.m_Version as u32
    }

    fn objects(&self) -> Vec<ObjectSummary> {
        self.file
            .objects()
            .map(|info| ObjectSummary {
                path_id: info.m_PathID,
                class_id: info.m_ClassID,
            })
            .collect()
    }

    fn read_tree(&self, path_id: PathId) -> Result<Value> {
        let object = self.handle().object_at::<Value>(path_id)?;
        match self.replacements.get(&path_id) {
            Some(data) => object.decode(data),
            None => object.read(),
        }
    }

    fn write_tree(&mut self, path_id: PathId, tree: &Value) -> Result<()> {
        let data = self.handle().object_at::<Value>(path_id)?.encode(tree)?;
        self.replacements.insert(path_id, data);
        Ok(())
    }

    /// Reads only `m_Name` unless the object was edited.
    fn object_name(&self, path_id: PathId) -> Result<Option<String>> {
        if self.replacements.contains_key(&path_id) {
            let tree = self.read_tree(path_id)?;
            return Ok(crate::tree::name(&tree).map(str::to_owned));
        }
        let handle = self.handle();
        let object = self.file.get_object::<NamedObject>(path_id, &self.env.tpk)?;
        let named = object.read(&mut handle.reader())?;
        Ok(Some(named.m_Name).filter(|name| !name.is_empty()))
    }

    fn externals(&self) -> Vec<String> {
        self.file
            .m_Externals
            .iter()
            .map(|external| external.pathName.clone())
            .collect()
    }

    fn push_external(&mut self, external: ExternalFile) -> i32 {
        self.file.m_Externals.push(FileIdentifier {
            tempEmpty: external.temp_empty,
            guid: external.guid,
            typeId: external.type_id,
            pathName: external.path_name,
        });
        self.externals_changed = true;
        self.file.m_Externals.len() as i32
    }

    fn is_modified(&self) -> bool {
        self.externals_changed || !self.replacements.is_empty()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        if !self.is_modified() {
            return Ok(self.data.clone());
        }

        let unity_version = self.env.unity_version()?;
        let com = build_common_offset_map(&self.env.tpk.inner, unity_version);
        let mut builder = SerializedFileBuilder::from_serialized(
            unity_version,
            &self.file,
            &self.data,
            &self.env.tpk,
            &com,
            self.file.objects().cloned(),
        );
        for (path_id, data) in &self.replacements {
            let object = builder
                .objects
                .get_mut(path_id)
                .with_context(|| format!("Object {path_id} vanished from '{}'", self.name))?;
            object.1 = Cow::Owned(data.clone());
        }
        builder.serialized.m_Externals.clone_from(&self.file.m_Externals);

        let out = builder
            .write_vec()
            .with_context(|| format!("Failed to write '{}'", self.name))?;
        Ok(out)
    }
}
