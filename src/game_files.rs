use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Result, ensure};
use memmap2::Mmap;

use crate::env::FileData;

/// Files below a `<Game>_Data` directory.
pub struct GameFiles {
    data_dir: PathBuf,
}

/// `<Game>_Data` on Windows and Linux, `Data` inside a macOS app.
pub fn is_unity_data_dir(dir: &Path) -> bool {
    let named_like_data = dir
        .file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| name.ends_with("_Data") || name == "Data");
    named_like_data && dir.is_dir()
}

impl GameFiles {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<GameFiles> {
        let data_dir = data_dir.into();
        ensure!(
            is_unity_data_dir(&data_dir),
            "Game data directory '{}' does not exist or is not a unity data folder",
            data_dir.display()
        );
        Ok(GameFiles { data_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `MonoBehaviour` script assemblies.
    pub fn managed_dir(&self) -> PathBuf {
        self.data_dir.join("Managed")
    }

    /// Maps `path`, relative to the data directory.
    pub fn read(&self, path: impl AsRef<Path>) -> std::io::Result<FileData> {
        let file = File::open(self.data_dir.join(path))?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(FileData::Mapped(mmap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_relative_to_data_dir() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("Hollow Knight Silksong_Data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("app.info"), b"Team Cherry\nHollow Knight Silksong").unwrap();

        let files = GameFiles::new(&data).unwrap();
        let contents = files.read("app.info").unwrap();
        assert!(contents.as_ref().starts_with(b"Team Cherry"));
        assert!(files.read("missing").is_err());
        assert_eq!(files.managed_dir(), data.join("Managed"));
    }

    #[test]
    fn macos_data_dir() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("Contents/Resources/Data");
        std::fs::create_dir_all(&data).unwrap();
        assert!(GameFiles::new(&data).is_ok());
    }

    #[test]
    fn rejects_non_data_dir() {
        let root = tempfile::tempdir().unwrap();
        assert!(GameFiles::new(root.path()).is_err());
        assert!(GameFiles::new(root.path().join("Nope_Data")).is_err());
    }
}
