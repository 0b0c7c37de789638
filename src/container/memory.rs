use anyhow::{Context, Result};
use indexmap::IndexMap;
use rabex::objects::ClassId;
use rabex::objects::pptr::PathId;
use serde_json::{Value, json};

use super::{ExternalFile, ObjectSummary, ObjectTable};

/// Object table that keeps decoded trees in memory.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub name: String,
    pub version: u32,
    pub objects: IndexMap<PathId, (ClassId, Value)>,
    pub externals: Vec<ExternalFile>,
    pub writes: usize,
    pushed_externals: bool,
    next_path_id: PathId,
}

impl MemoryTable {
    pub fn new(name: &str) -> Self {
        MemoryTable {
            name: name.to_owned(),
            version: 22,
            objects: IndexMap::new(),
            externals: Vec::new(),
            writes: 0,
            pushed_externals: false,
            next_path_id: 1,
        }
    }

    pub fn insert(&mut self, class_id: ClassId, tree: Value) -> PathId {
        let path_id = self.next_path_id;
        self.next_path_id += 1;
        self.objects.insert(path_id, (class_id, tree));
        path_id
    }

    pub fn with_external(mut self, path_name: &str) -> Self {
        self.externals.push(ExternalFile {
            path_name: path_name.to_owned(),
            guid: Some([0; 16]),
            type_id: Some(0),
            temp_empty: Some(String::new()),
        });
        self
    }

    pub fn tree(&self, path_id: PathId) -> &Value {
        &self.objects[&path_id].1
    }
}

impl ObjectTable for MemoryTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn format_version(&self) -> u32 {
        self.version
    }

    fn objects(&self) -> Vec<ObjectSummary> {
        self.objects
            .iter()
            .map(|(&path_id, (class_id, _))| ObjectSummary {
                path_id,
                class_id: *class_id,
            })
            .collect()
    }

    fn read_tree(&self, path_id: PathId) -> Result<Value> {
        let (_, tree) = self
            .objects
            .get(&path_id)
            .with_context(|| format!("no object {path_id}"))?;
        Ok(tree.clone())
    }

    fn write_tree(&mut self, path_id: PathId, tree: &Value) -> Result<()> {
        let (_, slot) = self
            .objects
            .get_mut(&path_id)
            .with_context(|| format!("no object {path_id}"))?;
        *slot = tree.clone();
        self.writes += 1;
        Ok(())
    }

    fn externals(&self) -> Vec<String> {
        self.externals.iter().map(|e| e.path_name.clone()).collect()
    }

    fn push_external(&mut self, external: ExternalFile) -> i32 {
        self.externals.push(external);
        self.pushed_externals = true;
        self.externals.len() as i32
    }

    fn is_modified(&self) -> bool {
        self.writes > 0 || self.pushed_externals
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let objects: Vec<_> = self
            .objects
            .iter()
            .map(|(path_id, (class_id, tree))| json!([path_id, format!("{class_id:?}"), tree]))
            .collect();
        let externals: Vec<_> = self
            .externals
            .iter()
            .map(|e| json!([e.path_name, e.guid, e.type_id, e.temp_empty]))
            .collect();
        Ok(serde_json::to_vec(&json!({
            "name": self.name,
            "objects": objects,
            "externals": externals,
        }))?)
    }
}
