//! Per-run configuration.
//!
//! Everything here is a plain value: [`GamePaths::for_platform`] derives the on-disk layout of a
//! Silksong install from a [`Platform`] and a root directory, and [`PatchConfig`] bundles those
//! paths with the operator's choices for one run.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::bail;

pub const GAME_NAME: &str = "Hollow Knight Silksong";
/// Used when `globalgamemanagers` does not carry a version.
pub const FALLBACK_UNITY_VERSION: &str = "6000.0.50f1";

pub const FONT_BUNDLE: &str = "fonts_assets_chinese.bundle";
pub const MAP_BUNDLE: &str = "maps_assets_all.bundle";
pub const TITLE_BUNDLE: &str = "atlases_assets_assets/sprites/_atlases/title.spriteatlas.bundle";
pub const TEXT_ASSETS: &str = "resources.assets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Windows, Platform::Linux, Platform::MacOs];

    /// The platform this binary was built for. Other unix-likes are treated like Linux.
    pub fn detect() -> Platform {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Name of the addressables build target folder below `StreamingAssets/aa`.
    pub fn build_target(self) -> &'static str {
        match self {
            Platform::Windows => "StandaloneWindows64",
            Platform::Linux => "StandaloneLinux64",
            Platform::MacOs => "StandaloneOSX",
        }
    }

    /// The next entry of [`Platform::ALL`], wrapping around.
    pub fn next(self) -> Platform {
        let index = Platform::ALL.iter().position(|&p| p == self).unwrap_or(0);
        Platform::ALL[(index + 1) % Platform::ALL.len()]
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
            Platform::MacOs => "macOS",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            other => bail!("Unknown platform '{other}', expected one of windows, linux, macos"),
        })
    }
}

/// Locations of every file a run reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePaths {
    pub platform: Platform,
    pub root: PathBuf,
    /// The `<Game>_Data` directory
    pub data_dir: PathBuf,
    /// `StreamingAssets/aa/<build target>`
    pub build_dir: PathBuf,
    pub font_bundle: PathBuf,
    pub map_bundle: PathBuf,
    pub title_bundle: PathBuf,
    pub text_assets: PathBuf,
    pub backup_dir: PathBuf,
    pub scratch_dir: PathBuf,
}

impl GamePaths {
    pub fn for_platform(platform: Platform, root: impl Into<PathBuf>) -> GamePaths {
        let root = root.into();
        let data_dir = match platform {
            Platform::Windows | Platform::Linux => root.join(format!("{GAME_NAME}_Data")),
            Platform::MacOs => root
                .join(format!("{GAME_NAME}.app"))
                .join("Contents/Resources/Data"),
        };
        let build_dir = data_dir
            .join("StreamingAssets/aa")
            .join(platform.build_target());

        GamePaths {
            platform,
            font_bundle: build_dir.join(FONT_BUNDLE),
            map_bundle: build_dir.join(MAP_BUNDLE),
            title_bundle: build_dir.join(TITLE_BUNDLE),
            text_assets: data_dir.join(TEXT_ASSETS),
            backup_dir: root.join("Backup"),
            scratch_dir: root.join("temp_workspace"),
            build_dir,
            data_dir,
            root,
        }
    }

    /// Every file the patcher overwrites, in backup order.
    pub fn targets(&self) -> [&Path; 4] {
        [
            &self.font_bundle,
            &self.text_assets,
            &self.title_bundle,
            &self.map_bundle,
        ]
    }

    /// Where `target` is stored inside the backup directory, mirroring its path below the root.
    pub fn backup_path_for(&self, target: &Path) -> PathBuf {
        match target.strip_prefix(&self.root) {
            Ok(relative) => self.backup_dir.join(relative),
            Err(_) => self
                .backup_dir
                .join(target.file_name().unwrap_or(target.as_os_str())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationVariant {
    /// The first official simplified release, converted
    LegacyOfficial,
    /// Community retranslation
    CommunityRetranslation,
    /// The updated official simplified release, converted
    UpdatedOfficial,
}

impl TranslationVariant {
    pub const ALL: [TranslationVariant; 3] = [
        TranslationVariant::LegacyOfficial,
        TranslationVariant::CommunityRetranslation,
        TranslationVariant::UpdatedOfficial,
    ];

    pub fn folder_name(self) -> &'static str {
        match self {
            TranslationVariant::LegacyOfficial => "Text",
            TranslationVariant::CommunityRetranslation => "Text_Re",
            TranslationVariant::UpdatedOfficial => "Text_Chs",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TranslationVariant::LegacyOfficial => "舊版官方簡中",
            TranslationVariant::CommunityRetranslation => "繁體社群重譯",
            TranslationVariant::UpdatedOfficial => "新版官方簡中 (修車組轉正)",
        }
    }
}

impl FromStr for TranslationVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "1" | "text" | "legacy" => TranslationVariant::LegacyOfficial,
            "2" | "text_re" | "community" => TranslationVariant::CommunityRetranslation,
            "3" | "text_chs" | "updated" => TranslationVariant::UpdatedOfficial,
            other => bail!("Unknown translation variant '{other}'"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontMode {
    /// Replacement font data, atlases and the map font reference
    New,
    /// Keeps the game's bold atlas and map font
    Old,
}

impl FontMode {
    pub fn folder_name(self) -> &'static str {
        match self {
            FontMode::New => "font_new",
            FontMode::Old => "font_old",
        }
    }
}

impl FromStr for FontMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "1" | "new" => FontMode::New,
            "2" | "old" => FontMode::Old,
            other => bail!("Unknown font mode '{other}', expected new or old"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PatchConfig {
    pub paths: GamePaths,
    /// Root of the sidecar files, usually `CHT` next to the executable
    pub asset_dir: PathBuf,
    pub font_mode: FontMode,
    pub translation: TranslationVariant,
}

impl PatchConfig {
    pub fn font_asset_dir(&self) -> PathBuf {
        self.asset_dir.join(self.font_mode.folder_name())
    }

    pub fn logo_dir(&self) -> PathBuf {
        self.asset_dir.join("logo")
    }

    pub fn logo_path(&self) -> PathBuf {
        self.logo_dir().join("logo.png")
    }

    pub fn text_dir(&self) -> PathBuf {
        self.asset_dir.join(self.translation.folder_name())
    }

    /// Paths that must exist before anything is modified.
    pub fn required_paths(&self) -> Vec<PathBuf> {
        let mut required: Vec<PathBuf> = self
            .paths
            .targets()
            .iter()
            .map(|path| path.to_path_buf())
            .collect();
        required.extend([self.asset_dir.clone(), self.font_asset_dir(), self.logo_dir()]);
        required
    }
}

/// `CHT` next to the running executable, or in the working directory if that can't be determined.
pub fn default_asset_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("CHT")
}
