use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow, bail};
use elsa::sync::FrozenMap;
use memmap2::Mmap;
use rabex::UnityVersion;
use rabex::files::SerializedFile;
use rabex::files::bundlefile::{BundleFileReader, ExtractionConfig};
use rabex::objects::{ClassId, PPtr};
use rabex::tpk::TpkTypeTreeBlob;
use rabex::typetree::TypeTreeProvider as _;
use rabex::typetree::typetree_cache::sync::TypeTreeCache;
use typetree_generator_api::{GeneratorBackend, TypeTreeGenerator};

use crate::addressables::{AddressablesData, ArchivePath};
use crate::config::{FALLBACK_UNITY_VERSION, GamePaths};
use crate::game_files::GameFiles;
use crate::unity::types::MonoScript;

/// Bytes of a file, either read or mapped.
pub enum FileData {
    Owned(Vec<u8>),
    Mapped(Mmap),
}
impl AsRef<[u8]> for FileData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileData::Owned(data) => data.as_slice(),
            FileData::Mapped(mmap) => mmap.as_ref(),
        }
    }
}

/// Everything needed to decode objects of one game install: the embedded class type trees,
/// generated script type trees and the files that script references point into.
pub struct Environment {
    pub game_files: GameFiles,
    pub tpk: TypeTreeCache<TpkTypeTreeBlob>,
    pub typetree_generator: crate::typetree_generator_cache::TypeTreeGeneratorCache,
    externals: FrozenMap<PathBuf, Box<(SerializedFile, FileData)>>,
    unity_version: OnceLock<UnityVersion>,
    addressables: OnceLock<Option<AddressablesData>>,
}

impl Environment {
    pub fn new(game_files: GameFiles) -> Self {
        Environment {
            game_files,
            tpk: TypeTreeCache::embedded(),
            typetree_generator: Default::default(),
            externals: FrozenMap::default(),
            unity_version: OnceLock::new(),
            addressables: OnceLock::new(),
        }
    }

    pub fn for_paths(paths: &GamePaths) -> Result<Self> {
        Ok(Environment::new(GameFiles::new(&paths.data_dir)?))
    }

    /// Initializes [`Environment::typetree_generator`] from the `Managed` DLLs.
    /// Requires `libTypeTreeGenerator.so`/`TypeTreeGenerator.dll` next to the executing binary.
    pub fn load_typetree_generator(&mut self, backend: GeneratorBackend) -> Result<()> {
        let unity_version = self.unity_version()?.clone();
        let managed = self.game_files.managed_dir();

        let generator = TypeTreeGenerator::new_lib_next_to_exe(&unity_version, backend)?;
        generator
            .load_all_dll_in_dir(managed.clone())
            .with_context(|| format!("Cannot load game DLLs from '{}'", managed.display()))?;
        let base_node = self
            .tpk
            .get_typetree_node(ClassId::MonoBehaviour, &unity_version)
            .context("missing MonoBehaviour class in embedded typetrees")?;
        self.typetree_generator.install(generator, base_node.into_owned());
        tracing::debug!("Loaded script type trees from '{}'", managed.display());

        Ok(())
    }

    /// Read from `globalgamemanagers`, or the version the game shipped with if that fails.
    pub fn unity_version(&self) -> Result<&UnityVersion> {
        if let Some(unity_version) = self.unity_version.get() {
            return Ok(unity_version);
        }

        let unity_version = match self.read_unity_version() {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(
                    "Could not determine unity version ({e}), assuming {FALLBACK_UNITY_VERSION}"
                );
                FALLBACK_UNITY_VERSION
                    .parse::<UnityVersion>()
                    .map_err(|_| anyhow!("invalid unity version '{FALLBACK_UNITY_VERSION}'"))?
            }
        };
        Ok(self.unity_version.get_or_init(|| unity_version))
    }

    fn read_unity_version(&self) -> Result<UnityVersion> {
        let data = self.game_files.read("globalgamemanagers")?;
        let ggm = SerializedFile::from_reader(&mut Cursor::new(data.as_ref()))?;
        ggm.m_UnityVersion
            .context("missing unity version in globalgamemanagers")
    }

    /// Indexed on first use, which opens every bundle of the build folder.
    pub fn addressables(&self) -> Result<Option<&AddressablesData>> {
        if let Some(addressables) = self.addressables.get() {
            return Ok(addressables.as_ref());
        }
        let data = AddressablesData::read(self.game_files.base_dir(), self.unity_version()?)?;
        Ok(self.addressables.get_or_init(|| data).as_ref())
    }

    pub fn open_bundle(&self, path: &Path) -> Result<BundleFileReader<Cursor<Mmap>>> {
        let file = File::open(path)
            .with_context(|| format!("Could not open bundle '{}'", path.display()))?;
        if file.metadata()?.is_dir() {
            bail!("Attempted to load directory '{}' as assetbundle", path.display());
        }
        let data = unsafe { Mmap::map(&file)? };

        let reader = BundleFileReader::from_reader(
            Cursor::new(data),
            &ExtractionConfig::new(None, Some(self.unity_version()?.clone())),
        )
        .with_context(|| format!("Could not read bundle '{}'", path.display()))?;
        Ok(reader)
    }

    /// A serialized file referenced from another one, either a plain file of the data directory
    /// or an `archive:/CAB-…/CAB-…` inside some addressables bundle. Cached for the lifetime of
    /// the environment.
    fn external_file(&self, path_name: &str) -> Result<(&SerializedFile, &[u8])> {
        let key = Path::new(path_name);
        if let Some((file, data)) = self.externals.get(key) {
            return Ok((file, data.as_ref()));
        }

        let data = match ArchivePath::try_parse(path_name)? {
            Some(cab) => {
                let addressables = self
                    .addressables()?
                    .context("Can't use archive:/ external files without addressables in the game")?;
                let bundle_path = addressables
                    .bundle_for_cab(cab.bundle)
                    .with_context(|| format!("CAB {cab} doesn't exist"))?;
                let bundle = self.open_bundle(&bundle_path)?;
                let data = bundle.read_at(cab.file)?.with_context(|| {
                    format!("{cab} is missing from '{}'", bundle_path.display())
                })?;
                FileData::Owned(data)
            }
            None => self
                .game_files
                .read(key)
                .with_context(|| format!("Cannot read external file {path_name}"))?,
        };
        let mut file = SerializedFile::from_reader(&mut Cursor::new(data.as_ref()))?;
        file.m_UnityVersion
            .get_or_insert(self.unity_version()?.clone());

        let entry = self.externals.insert(key.to_owned(), Box::new((file, data)));
        Ok((&entry.0, entry.1.as_ref()))
    }

    /// Reads the `MonoScript` that `script` points to, relative to `file`.
    pub fn read_mono_script(&self, script: PPtr, file: &SerializedFile, data: &[u8]) -> Result<MonoScript> {
        let Some(index) = script.m_FileID.get_externals_index() else {
            return Ok(script.deref_local(file, &self.tpk)?.read(&mut Cursor::new(data))?);
        };

        let external = file
            .m_Externals
            .get(index)
            .with_context(|| format!("FileID {} out of range", script.m_FileID))?;
        let (external_file, external_data) = self
            .external_file(&external.pathName)
            .with_context(|| format!("Failed to load external file {}", external.pathName))?;
        let object = script
            .make_local()
            .deref_local(external_file, &self.tpk)
            .with_context(|| format!("In external {} {}", script.m_FileID, external.pathName))?;
        Ok(object.read(&mut Cursor::new(external_data))?)
    }
}
