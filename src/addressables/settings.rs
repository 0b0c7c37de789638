use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde_derive::Deserialize;

/// Addressables root, relative to the data directory.
pub const AA_DIR: &str = "StreamingAssets/aa";

/// `StreamingAssets/aa/settings.json`
#[allow(non_snake_case)]
#[derive(Debug, Deserialize)]
pub struct AddressablesSettings {
    pub m_buildTarget: String,
    #[serde(default)]
    pub m_AddressablesVersion: String,
}
impl AddressablesSettings {
    pub fn read(path: &Path) -> Result<AddressablesSettings> {
        let file = File::open(path).with_context(|| format!("Could not open '{}'", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Could not parse '{}'", path.display()))
    }

    /// Build folder relative to the data directory.
    pub fn build_folder(&self) -> PathBuf {
        Path::new(AA_DIR).join(&self.m_buildTarget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_settings() {
        let json = r#"{
            "m_buildTarget": "StandaloneOSX",
            "m_SettingsHash": "abc",
            "m_CatalogLocations": [],
            "m_AddressablesVersion": "2.2.2"
        }"#;
        let settings: AddressablesSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.m_AddressablesVersion, "2.2.2");
        assert_eq!(
            settings.build_folder(),
            Path::new("StreamingAssets/aa/StandaloneOSX")
        );
    }

    #[test]
    fn missing_settings() {
        let dir = tempfile::tempdir().unwrap();
        let error = AddressablesSettings::read(&dir.path().join("settings.json")).unwrap_err();
        assert!(error.to_string().contains("settings.json"));
    }
}
