use std::path::{Path, PathBuf};

/// Turns an asset name into the file stem of its sidecar.
/// Keeps alphanumerics and ` .-_()`, then replaces spaces with underscores.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|&c| c.is_alphanumeric() || " .-_()".contains(c))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

pub fn friendly_size(size: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = size as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", size as usize, UNITS[unit])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

/// A scratch directory that is emptied on creation and removed when dropped.
pub struct ScratchDir {
    dir: PathBuf,
}
impl ScratchDir {
    pub fn create(dir: impl Into<PathBuf>) -> Result<ScratchDir, std::io::Error> {
        let dir = dir.into();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(ScratchDir { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}
impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("Could not remove '{}': {e}", self.dir.display());
        }
    }
}
