//! Loaded asset containers.
//!
//! A [`Container`] is either a bare serialized file (`resources.assets`) or an asset bundle whose
//! entries are serialized files, raw resource streams or further bundles. Patch procedures only
//! see serialized files through [`ObjectTable`], so they can run against in-memory tables in tests.

#[cfg(test)]
pub(crate) mod memory;
pub mod resource;
pub mod serialized;

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rabex::UnityVersion;
use rabex::files::bundlefile::{BundleFileBuilder, BundleFileReader, CompressionType};
use rabex::objects::ClassId;
use rabex::objects::pptr::PathId;
use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::Environment;
use crate::tree;
pub use resource::{Resource, ResourceStream};
pub use serialized::SerializedAsset;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectSummary {
    pub path_id: PathId,
    pub class_id: ClassId,
}

/// A new entry for a serialized file's external reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFile {
    pub path_name: String,
    pub guid: Option<[u8; 16]>,
    pub type_id: Option<i32>,
    pub temp_empty: Option<String>,
}

/// The object table of one serialized file.
pub trait ObjectTable {
    /// The entry name of the file, e.g. `CAB-5c6ffd4a0a4e2a1bbdc2a1a1c0f7e0a1`.
    fn table_name(&self) -> &str;

    /// Serialized file format version, which decides which fields an external reference has.
    fn format_version(&self) -> u32;

    fn objects(&self) -> Vec<ObjectSummary>;

    /// Decodes an object into an editable field tree, including pending writes.
    fn read_tree(&self, path_id: PathId) -> Result<Value>;

    fn write_tree(&mut self, path_id: PathId, tree: &Value) -> Result<()>;

    fn object_name(&self, path_id: PathId) -> Result<Option<String>> {
        let tree = self.read_tree(path_id)?;
        Ok(tree::name(&tree).map(str::to_owned))
    }

    /// Path names of the external references, in file id order starting at 1.
    fn externals(&self) -> Vec<String>;

    /// Appends an external reference and returns its file id.
    fn push_external(&mut self, external: ExternalFile) -> i32;

    fn is_modified(&self) -> bool;

    fn to_bytes(&self) -> Result<Vec<u8>>;
}

#[derive(Debug)]
pub enum Entry<T> {
    Table(T),
    Bundle(Bundle<T>),
    Resource(Resource),
}

impl<T: ObjectTable> Entry<T> {
    fn to_bytes(
        &self,
        unity_version: &UnityVersion,
        compression: CompressionType,
    ) -> Result<Vec<u8>> {
        Ok(match self {
            Entry::Table(table) => table.to_bytes()?,
            Entry::Bundle(bundle) => {
                let mut out = Cursor::new(Vec::new());
                bundle.write(&mut out, unity_version, compression)?;
                out.into_inner()
            }
            Entry::Resource(resource) => resource.serialize().into_owned(),
        })
    }
}

#[derive(Debug)]
pub struct Bundle<T> {
    pub entries: IndexMap<String, Entry<T>>,
}

impl<T> Default for Bundle<T> {
    fn default() -> Self {
        Bundle {
            entries: IndexMap::new(),
        }
    }
}

impl<T: ObjectTable> Bundle<T> {
    /// The serialized files directly inside this bundle.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            Entry::Table(table) => Some((name.as_str(), table)),
            _ => None,
        })
    }

    pub fn table(&self, name: &str) -> Option<&T> {
        match self.entries.get(name)? {
            Entry::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut T> {
        match self.entries.get_mut(name)? {
            Entry::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        match self.entries.get_mut(name)? {
            Entry::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    /// Serialized files of this bundle come before the ones of nested bundles.
    pub fn first_table(&self) -> Option<&T> {
        self.tables().map(|(_, table)| table).next().or_else(|| {
            self.entries.values().find_map(|entry| match entry {
                Entry::Bundle(nested) => nested.first_table(),
                _ => None,
            })
        })
    }

    pub fn first_table_mut(&mut self) -> Option<&mut T> {
        let direct = self
            .entries
            .values()
            .position(|entry| matches!(entry, Entry::Table(_)));
        if let Some(index) = direct {
            return match self.entries.get_index_mut(index) {
                Some((_, Entry::Table(table))) => Some(table),
                _ => None,
            };
        }
        self.entries.values_mut().find_map(|entry| match entry {
            Entry::Bundle(nested) => nested.first_table_mut(),
            _ => None,
        })
    }

    fn collect_tables_mut<'a>(&'a mut self, out: &mut Vec<&'a mut T>) {
        for entry in self.entries.values_mut() {
            match entry {
                Entry::Table(table) => out.push(table),
                Entry::Bundle(nested) => nested.collect_tables_mut(out),
                Entry::Resource(_) => {}
            }
        }
    }

    /// Calls `f` for this bundle, then for every nested bundle depth-first.
    pub fn visit_mut<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Bundle<T>) -> Result<()>,
    {
        f(self)?;
        for entry in self.entries.values_mut() {
            if let Entry::Bundle(nested) = entry {
                nested.visit_mut(f)?;
            }
        }
        Ok(())
    }

    pub fn is_modified(&self) -> bool {
        self.entries.values().any(|entry| match entry {
            Entry::Table(table) => table.is_modified(),
            Entry::Bundle(nested) => nested.is_modified(),
            Entry::Resource(resource) => resource.is_replaced(),
        })
    }

    pub fn write(
        &self,
        writer: impl Write + Seek,
        unity_version: &UnityVersion,
        compression: CompressionType,
    ) -> Result<()> {
        let mut builder = BundleFileBuilder::unityfs(8, unity_version);
        for (name, entry) in &self.entries {
            let data = entry
                .to_bytes(unity_version, compression)
                .with_context(|| format!("Failed to serialize bundle entry '{name}'"))?;
            builder.add_file(name, data.as_slice())?;
        }
        builder.write(writer, compression)?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum Container<T> {
    Table(T),
    Bundle(Bundle<T>),
}

impl<T: ObjectTable> Container<T> {
    /// The serialized file a bundle is named after, or the bare file itself.
    pub fn main_table(&self) -> Option<&T> {
        match self {
            Container::Table(table) => Some(table),
            Container::Bundle(bundle) => bundle.first_table(),
        }
    }

    pub fn main_table_mut(&mut self) -> Option<&mut T> {
        match self {
            Container::Table(table) => Some(table),
            Container::Bundle(bundle) => bundle.first_table_mut(),
        }
    }

    /// Every serialized file, depth-first in entry order.
    pub fn tables(&self) -> Vec<&T> {
        fn collect<'a, T: ObjectTable>(bundle: &'a Bundle<T>, out: &mut Vec<&'a T>) {
            for entry in bundle.entries.values() {
                match entry {
                    Entry::Table(table) => out.push(table),
                    Entry::Bundle(nested) => collect(nested, out),
                    Entry::Resource(_) => {}
                }
            }
        }
        match self {
            Container::Table(table) => vec![table],
            Container::Bundle(bundle) => {
                let mut out = Vec::new();
                collect(bundle, &mut out);
                out
            }
        }
    }

    pub fn tables_mut(&mut self) -> Vec<&mut T> {
        match self {
            Container::Table(table) => vec![table],
            Container::Bundle(bundle) => {
                let mut out = Vec::new();
                bundle.collect_tables_mut(&mut out);
                out
            }
        }
    }

    pub fn as_bundle_mut(&mut self) -> Option<&mut Bundle<T>> {
        match self {
            Container::Bundle(bundle) => Some(bundle),
            Container::Table(_) => None,
        }
    }

    pub fn is_modified(&self) -> bool {
        match self {
            Container::Table(table) => table.is_modified(),
            Container::Bundle(bundle) => bundle.is_modified(),
        }
    }

    pub fn save(
        &self,
        path: &Path,
        unity_version: &UnityVersion,
        compression: CompressionType,
    ) -> Result<()> {
        match self {
            Container::Table(table) => {
                std::fs::write(path, table.to_bytes()?)
                    .with_context(|| format!("Could not write '{}'", path.display()))?;
            }
            Container::Bundle(bundle) => {
                let file = File::create(path)
                    .with_context(|| format!("Could not create '{}'", path.display()))?;
                bundle.write(BufWriter::new(file), unity_version, compression)?;
            }
        }
        Ok(())
    }
}

fn bundle_from_reader<'env, D: AsRef<[u8]>>(
    reader: &BundleFileReader<Cursor<D>>,
    env: &'env Environment,
) -> Result<Bundle<SerializedAsset<'env>>> {
    let unity_version = env.unity_version()?;
    let serialized: FxHashSet<&str> = reader
        .serialized_files()
        .map(|entry| entry.path.as_str())
        .collect();

    let mut bundle = Bundle::default();
    for entry in reader.files() {
        let data = reader.read_at_entry(entry)?;
        let item = if serialized.contains(entry.path.as_str()) {
            Entry::Table(
                SerializedAsset::parse(entry.path.clone(), data, env)
                    .with_context(|| format!("Could not parse '{}'", entry.path))?,
            )
        } else if data.starts_with(b"UnityFS") {
            let nested = BundleFileReader::from_reader(
                Cursor::new(data),
                &rabex::files::bundlefile::ExtractionConfig::new(None, Some(unity_version.clone())),
            )?;
            Entry::Bundle(bundle_from_reader(&nested, env)?)
        } else {
            Entry::Resource(Resource::original(data))
        };
        bundle.entries.insert(entry.path.clone(), item);
    }
    Ok(bundle)
}

pub fn load_bundle<'env>(
    path: &Path,
    env: &'env Environment,
) -> Result<Container<SerializedAsset<'env>>> {
    let reader = env.open_bundle(path)?;
    let bundle = bundle_from_reader(&reader, env)
        .with_context(|| format!("Could not load bundle '{}'", path.display()))?;
    tracing::debug!(
        "Loaded {} with {} entries",
        path.display(),
        bundle.entries.len()
    );
    Ok(Container::Bundle(bundle))
}

pub fn load_serialized<'env>(
    path: &Path,
    env: &'env Environment,
) -> Result<Container<SerializedAsset<'env>>> {
    let data =
        std::fs::read(path).with_context(|| format!("Could not read '{}'", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let table = SerializedAsset::parse(name, data, env)
        .with_context(|| format!("Could not parse '{}'", path.display()))?;
    Ok(Container::Table(table))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::memory::MemoryTable;
    use super::*;

    fn nested_bundle() -> Bundle<MemoryTable> {
        let mut inner = Bundle::default();
        inner.entries.insert(
            "CAB-inner".into(),
            Entry::Table(MemoryTable::new("CAB-inner")),
        );

        let mut outer = Bundle::default();
        outer
            .entries
            .insert("CAB-outer.resS".into(), Entry::Resource(Resource::original(vec![0; 4])));
        outer.entries.insert("nested".into(), Entry::Bundle(inner));
        outer.entries.insert(
            "CAB-outer".into(),
            Entry::Table(MemoryTable::new("CAB-outer")),
        );
        outer
    }

    #[test]
    fn direct_tables_come_first() {
        let mut bundle = nested_bundle();
        assert_eq!(bundle.first_table().unwrap().table_name(), "CAB-outer");
        assert_eq!(bundle.first_table_mut().unwrap().table_name(), "CAB-outer");

        let container = Container::Bundle(bundle);
        let names: Vec<_> = container.tables().iter().map(|t| t.table_name()).collect();
        assert_eq!(names, ["CAB-inner", "CAB-outer"]);
    }

    #[test]
    fn tables_by_name() {
        let mut bundle = nested_bundle();
        let table = bundle.table_mut("CAB-outer").unwrap();
        let id = table.insert(ClassId::TextAsset, json!({ "m_Name": "x" }));
        table.write_tree(id, &json!({ "m_Name": "y" })).unwrap();
        assert_eq!(bundle.table("CAB-outer").unwrap().tree(id)["m_Name"], "y");

        assert!(bundle.table_mut("CAB-outer.resS").is_none());
        assert!(bundle.table_mut("nested").is_none());
        assert!(bundle.table_mut("CAB-inner").is_none());
    }

    #[test]
    fn nested_tables_are_found() {
        let mut outer = Bundle::default();
        let mut inner = Bundle::default();
        inner
            .entries
            .insert("CAB-deep".into(), Entry::Table(MemoryTable::new("CAB-deep")));
        outer.entries.insert("nested".into(), Entry::Bundle(inner));
        assert_eq!(outer.first_table().unwrap().table_name(), "CAB-deep");
        assert_eq!(outer.first_table_mut().unwrap().table_name(), "CAB-deep");
    }

    #[test]
    fn modification_tracking() {
        let mut container = Container::Bundle(nested_bundle());
        assert!(!container.is_modified());

        let mut visited = Vec::new();
        container
            .as_bundle_mut()
            .unwrap()
            .visit_mut(&mut |bundle| {
                visited.push(bundle.entries.len());
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, [3, 1]);

        for table in container.tables_mut() {
            if table.table_name() == "CAB-inner" {
                let id = table.insert(ClassId::TextAsset, json!({ "m_Name": "x" }));
                table.write_tree(id, &json!({ "m_Name": "y" })).unwrap();
            }
        }
        assert!(container.is_modified());

        let mut container = Container::Bundle(nested_bundle());
        container
            .as_bundle_mut()
            .unwrap()
            .resource_mut("CAB-outer.resS")
            .unwrap()
            .replace(vec![1]);
        assert!(container.is_modified());
    }
}
