mod logger;

use std::io::{BufRead as _, Write as _};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use paris::{error, info, success, warn};
use rabex::files::bundlefile::CompressionType;
use silksong_cht::config::default_asset_dir;
use silksong_cht::patch::title::TitleOutcome;
use silksong_cht::workflow::{self, ApplyOptions, ApplyReport, RestoreReport};
use silksong_cht::{FontMode, GamePaths, PatchConfig, Platform, TranslationVariant};

const BANNER: &str = "絲綢之歌繁體中文化工具 v1.20";

#[derive(Parser, Debug)]
#[command(version)]
struct Arguments {
    /// Build of the game to patch: windows, linux or macos. Defaults to the current OS.
    #[arg(long)]
    build: Option<Platform>,
    /// Game root directory, containing `Hollow Knight Silksong_Data` or the `.app`
    #[arg(long)]
    root: Option<PathBuf>,
    /// Directory of the replacement fonts, text and logo. Defaults to `CHT` next to the executable.
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Compression of the rewritten bundles
    #[arg(long, default_value = "lz4hc")]
    compression: Compression,

    /// Patch without the menu, using the given translation (1/legacy, 2/community, 3/updated)
    #[arg(long, conflicts_with = "restore")]
    apply: Option<TranslationVariant>,
    /// Font set to install together with `--apply`
    #[arg(long, default_value = "new", requires = "apply")]
    font: FontMode,
    /// Restore the backed up game files without the menu
    #[arg(long)]
    restore: bool,
    /// Don't ask for confirmation
    #[arg(long, short = 'y')]
    yes: bool,
    /// Also print per-object details
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum Compression {
    None,
    Lz4,
    /// Best compression at the cost of speed
    Lz4hc,
    Lzma,
}
impl From<Compression> for CompressionType {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => CompressionType::None,
            Compression::Lz4 => CompressionType::Lz4,
            Compression::Lz4hc => CompressionType::Lz4hc,
            Compression::Lzma => CompressionType::Lzma,
        }
    }
}

struct Session {
    platform: Platform,
    root: PathBuf,
    asset_dir: PathBuf,
    compression: CompressionType,
    yes: bool,
}

impl Session {
    fn paths(&self) -> GamePaths {
        GamePaths::for_platform(self.platform, &self.root)
    }

    fn config(&self, translation: TranslationVariant, font_mode: FontMode) -> PatchConfig {
        PatchConfig {
            paths: self.paths(),
            asset_dir: self.asset_dir.clone(),
            font_mode,
            translation,
        }
    }
}

fn main() {
    let args = Arguments::parse();
    logger::install(args.verbose);

    if let Err(e) = run(args) {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run(args: Arguments) -> Result<()> {
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir().context("Could not determine the working directory")?,
    };
    ensure!(root.is_dir(), "Game directory '{}' does not exist", root.display());

    let mut session = Session {
        platform: args.build.unwrap_or_else(Platform::detect),
        root,
        asset_dir: args.assets.unwrap_or_else(default_asset_dir),
        compression: args.compression.into(),
        yes: args.yes,
    };

    if args.restore {
        return restore(&session);
    }
    if let Some(translation) = args.apply {
        return apply(&session, translation, args.font);
    }
    menu(&mut session)
}

/// Reads one trimmed line from stdin. `None` once stdin is closed.
fn prompt(message: &str) -> Result<Option<String>> {
    print!("{message}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    Ok((read > 0).then(|| line.trim().to_owned()))
}

fn confirm(session: &Session, action: &str) -> Result<bool> {
    if session.yes {
        return Ok(true);
    }
    println!("\n即將{action}，目標目錄: {}", session.root.display());
    let answer = prompt("您是否要繼續執行？ (輸入 'y' 確認): ")?;
    Ok(matches!(answer.as_deref(), Some("y" | "Y")))
}

fn menu(session: &mut Session) -> Result<()> {
    loop {
        println!("{}", "=".repeat(60));
        println!("== {BANNER} ==");
        println!("{}", "=".repeat(60));
        println!("目前平台: {} (輸入 'T' 可手動切換)", session.platform);
        println!("遊戲目錄: {}", session.root.display());
        if !session.paths().font_bundle.is_file() {
            warn!("找不到遊戲檔案");
        }

        println!("\n請選擇要執行的操作：\n");
        println!("  1. 執行繁體中文化");
        println!("  2. 還原備份");
        println!("  3. 關於");
        println!("  4. 退出\n");

        let Some(choice) = prompt("請輸入選項 [1-4] 或 T 切換平台: ")? else {
            return Ok(());
        };
        let result = match choice.to_ascii_lowercase().as_str() {
            "1" => menu_apply(session),
            "2" => restore(session),
            "3" => {
                about();
                Ok(())
            }
            "4" => {
                info!("程式即將退出");
                return Ok(());
            }
            "t" => {
                session.platform = session.platform.next();
                info!("平台已切換至: {}", session.platform);
                Ok(())
            }
            _ => {
                warn!("無效指令");
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("{:?}", e);
        }

        if prompt("\n按下 Enter 鍵返回主選單...")?.is_none() {
            return Ok(());
        }
    }
}

fn menu_apply(session: &Session) -> Result<()> {
    println!("\n[翻譯版本選擇]");
    for (i, variant) in TranslationVariant::ALL.iter().enumerate() {
        println!("  {}. {}", i + 1, variant.description());
    }
    let Some(translation) = prompt("請選擇翻譯版本 [1-3]: ")? else {
        return Ok(());
    };
    let Ok(translation) = translation.parse::<TranslationVariant>() else {
        warn!("無效的選擇，返回主選單");
        return Ok(());
    };

    println!("\n[字體版本選擇]");
    println!("  1. 修改字體 (推薦)");
    println!("  2. 原版字體 (不修改地圖字體)");
    let Some(font_mode) = prompt("請選擇字體版本 [1-2]: ")? else {
        return Ok(());
    };
    let Ok(font_mode) = font_mode.parse::<FontMode>() else {
        warn!("無效的選擇，返回主選單");
        return Ok(());
    };

    apply(session, translation, font_mode)
}

fn apply(session: &Session, translation: TranslationVariant, font_mode: FontMode) -> Result<()> {
    let config = session.config(translation, font_mode);
    info!("平台: {}", session.platform);
    info!("翻譯版本: {}", translation.description());
    info!("字體資料夾: {}", config.font_asset_dir().display());

    if !confirm(session, "修改遊戲檔案")? {
        info!("操作已取消");
        return Ok(());
    }

    let start = Instant::now();
    let options = ApplyOptions {
        compression: session.compression,
    };
    let report = workflow::apply(&config, &options)?;
    print_apply_report(&report);
    success!("繁體中文化完成 ({:.2?})", start.elapsed());
    Ok(())
}

fn print_apply_report(report: &ApplyReport) {
    let fonts = &report.fonts;
    for stream in &fonts.streams {
        match stream.stream_len {
            Some(len) => info!(
                "{}: 替換 {} 張貼圖 ({} bytes)",
                stream.stream,
                stream.replaced.len(),
                len
            ),
            None => info!("{}: 未變更", stream.stream),
        }
        for name in &stream.skipped {
            warn!("略過貼圖 {name}");
        }
    }
    info!(
        "字體 {} 個，材質 {} 個，內嵌貼圖 {} 張",
        fonts.fonts, fonts.materials, fonts.embedded_textures
    );
    if fonts.failures > 0 {
        warn!("{} 個物件處理失敗", fonts.failures);
    }
    info!("已替換 {} 個文本檔案", report.text_assets);

    match &report.title {
        Some(TitleOutcome::Replaced(_)) => info!("已替換標題 Logo"),
        Some(TitleOutcome::MissingLogo) => info!("未提供 Logo，保留原版標題"),
        Some(TitleOutcome::NotFound) => warn!("找不到標題 Logo 貼圖"),
        Some(TitleOutcome::NotStreamed(name)) => warn!("標題 Logo {name} 不在資源串流中，已略過"),
        None => {}
    }

    match &report.map_font {
        Some((outcome, verify)) if verify.is_ok() => info!(
            "地圖字體已指向外部檔案 #{}，修改 {} 個物件",
            outcome.reference.file_id,
            outcome.patched.len()
        ),
        Some((_, verify)) if !verify.external_matches() => warn!(
            "地圖字體驗證失敗: 外部檔案編號為 {:?}，預期 #{}",
            verify.external_file_id,
            verify.expected.file_id
        ),
        Some((_, verify)) => warn!(
            "地圖字體驗證失敗: {} 個物件中有 {} 個不符",
            verify.checked,
            verify.mismatched.len()
        ),
        None => info!("地圖字體未變更"),
    }

    for path in &report.written {
        info!("已寫入 {}", path.display());
    }
}

fn restore(session: &Session) -> Result<()> {
    if !confirm(session, "以備份覆蓋遊戲檔案")? {
        info!("操作已取消");
        return Ok(());
    }
    let RestoreReport { restored, missing } = workflow::restore(&session.paths())?;
    for path in &missing {
        warn!("找不到備份: {}", path.display());
    }
    success!("已還原 {} 個檔案", restored.len());
    Ok(())
}

fn about() {
    println!("\n{}", "-".repeat(60));
    println!("關於此工具\n");
    println!("{BANNER}");
    println!("將絲綢之歌的簡體中文字體、文本與標題 Logo 替換為繁體中文版本。");
    println!("修改前會把遊戲檔案備份到遊戲目錄下的 Backup，可隨時還原。");
    println!("\n核心: rabex, intel_tex_2");
    println!("\n本工具為非官方修改，不提供相關技術支援。");
    println!("{}", "-".repeat(60));
}
