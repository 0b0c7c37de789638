//! A full patch run over the four game files, plus backup and restore.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rabex::files::bundlefile::CompressionType;
use typetree_generator_api::GeneratorBackend;

use crate::config::{FontMode, GamePaths, PatchConfig};
use crate::container::{self, Container, ObjectTable};
use crate::patch::fonts::{FontPatchReport, patch_font_bundle};
use crate::patch::reference::{ReferenceOutcome, VerifyReport, patch_map_font};
use crate::patch::text::patch_text_assets;
use crate::patch::title::{TitleOutcome, patch_title_logo};
use crate::utils::ScratchDir;
use crate::{Environment, utils};

pub struct ApplyOptions {
    pub compression: CompressionType,
}
impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions {
            compression: CompressionType::Lz4hc,
        }
    }
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub fonts: FontPatchReport,
    pub text_assets: usize,
    pub title: Option<TitleOutcome>,
    pub map_font: Option<(ReferenceOutcome, VerifyReport)>,
    /// Game files that were overwritten
    pub written: Vec<PathBuf>,
}

#[derive(Debug, Default, PartialEq)]
pub struct RestoreReport {
    pub restored: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

/// Fails with the list of every required file or directory that doesn't exist.
pub fn check_paths(config: &PatchConfig) -> Result<()> {
    let missing: Vec<_> = config
        .required_paths()
        .into_iter()
        .filter(|path| !path.exists())
        .collect();
    if !missing.is_empty() {
        let list = missing
            .iter()
            .map(|path| format!("  {}", path.display()))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required files:\n{list}");
    }
    Ok(())
}

fn copy_creating_parent(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create '{}'", parent.display()))?;
    }
    fs::copy(from, to)
        .with_context(|| format!("Could not copy '{}' to '{}'", from.display(), to.display()))?;
    Ok(())
}

/// Replaces the backup directory with fresh copies of every target file.
pub fn backup(paths: &GamePaths) -> Result<Vec<PathBuf>> {
    if paths.backup_dir.exists() {
        fs::remove_dir_all(&paths.backup_dir).with_context(|| {
            format!("Could not remove old backup '{}'", paths.backup_dir.display())
        })?;
    }

    let mut copies = Vec::new();
    for target in paths.targets() {
        let destination = paths.backup_path_for(target);
        copy_creating_parent(target, &destination)?;
        tracing::debug!("Backed up '{}'", target.display());
        copies.push(destination);
    }
    tracing::info!("Backed up {} files to '{}'", copies.len(), paths.backup_dir.display());
    Ok(copies)
}

/// Copies every backed up file back over the game's. Missing backups are skipped.
pub fn restore(paths: &GamePaths) -> Result<RestoreReport> {
    if !paths.backup_dir.is_dir() {
        bail!("No backup found at '{}'", paths.backup_dir.display());
    }

    let mut report = RestoreReport::default();
    for target in paths.targets() {
        let source = paths.backup_path_for(target);
        if !source.is_file() {
            tracing::warn!("No backup of '{}'", target.display());
            report.missing.push(target.to_path_buf());
            continue;
        }
        copy_creating_parent(&source, target)?;
        tracing::info!("Restored '{}'", target.display());
        report.restored.push(target.to_path_buf());
    }
    Ok(report)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("Could not move '{}' to '{}'", from.display(), to.display()))?;
    fs::remove_file(from)?;
    Ok(())
}

fn save_if_modified<T: ObjectTable>(
    container: &Container<T>,
    target: &Path,
    scratch: &ScratchDir,
    env: &Environment,
    compression: CompressionType,
) -> Result<Option<(PathBuf, PathBuf)>> {
    if !container.is_modified() {
        tracing::info!("'{}' is unchanged", target.display());
        return Ok(None);
    }
    let file_name = target
        .file_name()
        .with_context(|| format!("'{}' has no file name", target.display()))?;
    let output = scratch.path().join(file_name);
    container
        .save(&output, env.unity_version()?, compression)
        .with_context(|| format!("Could not save '{}'", target.display()))?;
    let size = fs::metadata(&output).map(|m| m.len() as usize).unwrap_or_default();
    tracing::info!("Wrote {} ({})", output.display(), utils::friendly_size(size));
    Ok(Some((output, target.to_path_buf())))
}

/// Backs up the game files, patches them in memory and replaces the originals once every
/// container was written successfully. The scratch directory is removed on every exit path.
pub fn apply(config: &PatchConfig, options: &ApplyOptions) -> Result<ApplyReport> {
    let paths = &config.paths;
    check_paths(config)?;
    backup(paths)?;

    let scratch = ScratchDir::create(&paths.scratch_dir)
        .with_context(|| format!("Could not create '{}'", paths.scratch_dir.display()))?;

    let mut env = Environment::for_paths(paths)?;
    env.load_typetree_generator(GeneratorBackend::AssetsTools)
        .context("Could not load the game's script type trees")?;
    tracing::info!("Unity version {:?}", env.unity_version()?);

    let mut font = container::load_bundle(&paths.font_bundle, &env)?;
    let mut text = container::load_serialized(&paths.text_assets, &env)?;
    let mut title = container::load_bundle(&paths.title_bundle, &env)?;
    let mut map = container::load_bundle(&paths.map_bundle, &env)?;

    let mut report = ApplyReport::default();

    tracing::info!("Patching fonts");
    let font_bundle = font
        .as_bundle_mut()
        .context("The font bundle is not an asset bundle")?;
    report.fonts = patch_font_bundle(
        font_bundle,
        &config.font_asset_dir(),
        config.font_mode == FontMode::Old,
    )?;

    tracing::info!("Patching text");
    report.text_assets = patch_text_assets(&mut text, &config.text_dir())?;

    tracing::info!("Patching the title logo");
    let title_bundle = title
        .as_bundle_mut()
        .context("The title bundle is not an asset bundle")?;
    report.title = Some(patch_title_logo(title_bundle, &config.logo_path())?);

    match config.font_mode {
        FontMode::New => {
            tracing::info!("Patching the map font");
            report.map_font = patch_map_font(&mut map, &font)?;
        }
        FontMode::Old => tracing::info!("Keeping the game's map font"),
    }

    let mut outputs = Vec::new();
    for (container, target) in [
        (&font, &paths.font_bundle),
        (&text, &paths.text_assets),
        (&title, &paths.title_bundle),
        (&map, &paths.map_bundle),
    ] {
        outputs.extend(save_if_modified(container, target, &scratch, &env, options.compression)?);
    }
    drop((font, text, title, map));

    for (output, target) in outputs {
        move_file(&output, &target)?;
        report.written.push(target);
    }
    Ok(report)
}
