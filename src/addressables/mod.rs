//! Locating serialized files referenced across addressables bundles.
//!
//! Bundles refer to each other's objects through externals like `archive:/CAB-…/CAB-…`, naming
//! the serialized file but not the bundle that holds it, so resolving them needs an index of
//! every bundle in the build folder.

mod archive_path;
pub mod settings;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use rabex::UnityVersion;
use rabex::files::bundlefile::{BundleFileReader, ExtractionConfig};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use walkdir::WalkDir;

use crate::addressables::settings::AddressablesSettings;

pub use archive_path::{ArchivePath, InvalidArchivePath};

pub struct AddressablesData {
    pub build_folder: PathBuf,
    pub settings: AddressablesSettings,
    /// `CAB-…` file name to the bundle containing it, relative to the build folder
    pub cab_to_bundle: FxHashMap<String, PathBuf>,
}
impl AddressablesData {
    pub fn bundle_for_cab(&self, cab: &str) -> Option<PathBuf> {
        self.cab_to_bundle
            .get(cab)
            .map(|relative| self.build_folder.join(relative))
    }

    /// Reads `StreamingAssets/aa/settings.json` below `data_dir` and indexes every bundle of the
    /// build target. Returns `None` for games without addressables.
    pub fn read(data_dir: &Path, unity_version: &UnityVersion) -> Result<Option<AddressablesData>> {
        let aa = data_dir.join(settings::AA_DIR);
        if !aa.exists() {
            return Ok(None);
        }
        let settings = AddressablesSettings::read(&aa.join("settings.json"))?;
        let build_folder = data_dir.join(settings.build_folder());

        let cab_to_bundle = index_bundles(&build_folder, unity_version)
            .context("could not determine CAB locations")?;
        tracing::debug!(
            "Indexed {} CABs in '{}'",
            cab_to_bundle.len(),
            build_folder.display()
        );

        Ok(Some(AddressablesData {
            build_folder,
            settings,
            cab_to_bundle,
        }))
    }
}

/// Entry names of the bundle at `path`.
fn bundle_entries(path: &Path, unity_version: &UnityVersion) -> Result<Vec<String>> {
    let reader = BundleFileReader::from_reader(
        BufReader::new(File::open(path)?),
        &ExtractionConfig::new(None, Some(unity_version.clone())),
    )?;
    Ok(reader.files().into_iter().map(|file| file.path.clone()).collect())
}

fn index_bundles(build_folder: &Path, unity_version: &UnityVersion) -> Result<FxHashMap<String, PathBuf>> {
    let bundles: Vec<PathBuf> = WalkDir::new(build_folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "bundle"))
        .collect();

    let indexed = bundles
        .par_iter()
        .map(|path| -> Result<_> {
            let relative = path.strip_prefix(build_folder)?;
            let entries = bundle_entries(path, unity_version)
                .with_context(|| format!("Could not read bundle '{}'", relative.display()))?;
            Ok((relative.to_owned(), entries))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut cab_to_bundle = FxHashMap::default();
    for (bundle, entries) in indexed {
        for entry in entries {
            cab_to_bundle.insert(entry, bundle.clone());
        }
    }
    Ok(cab_to_bundle)
}
