use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};

use thumbgenius::{
    InlineImage, ResolutionTier, SceneAnalysis, Session, Settings, StyleConfig, StylePatch,
    build_studio, settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "thumbgenius",
    version,
    about = "Turn a script into a styled 16:9 thumbnail"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a script, generate a background and export thumbnails
    Generate(GenerateArgs),
    /// Composite the title onto an existing background
    Export(ExportArgs),
    /// Render the interactive preview, optionally replaying a drag
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Script or description (read from stdin when omitted)
    #[arg(short = 's', long = "script")]
    script: Option<String>,

    /// Output resolution tier: 720, 1080 or 1440 (repeatable)
    #[arg(short = 'R', long = "resolution")]
    resolution: Vec<ResolutionTier>,

    /// Output directory (default: settings [output] dir)
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Also write the generated background image
    #[arg(long = "save-background")]
    save_background: bool,

    /// Also write preview.png
    #[arg(long = "preview")]
    preview: bool,

    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Background image to composite onto
    #[arg(short = 'b', long = "background")]
    background: PathBuf,

    /// Output resolution tier: 720, 1080 or 1440 (repeatable)
    #[arg(short = 'R', long = "resolution")]
    resolution: Vec<ResolutionTier>,

    /// Output directory (default: settings [output] dir)
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Background image shown behind the overlay
    #[arg(short = 'b', long = "background")]
    background: PathBuf,

    /// Preview container width in pixels
    #[arg(short = 'w', long = "width")]
    width: Option<u32>,

    /// Pointer-down position in container pixels, as X,Y
    #[arg(long = "drag-from", requires = "drag_to", allow_hyphen_values = true)]
    drag_from: Option<String>,

    /// Pointer-up position in container pixels, as X,Y
    #[arg(long = "drag-to", requires = "drag_from", allow_hyphen_values = true)]
    drag_to: Option<String>,

    /// Output file (default: preview.png, or preview.svg with --svg)
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// Write the SVG scene document instead of a PNG
    #[arg(long = "svg")]
    svg: bool,

    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args, Debug, Default)]
struct StyleArgs {
    /// TOML file with style fields
    #[arg(long = "style")]
    style: Option<PathBuf>,

    /// Overlay text
    #[arg(short = 't', long = "text")]
    text: Option<String>,

    /// IMPACT, CARTOON, MODERN, BOLD or CLEAN (or the family name)
    #[arg(short = 'f', long = "font")]
    font: Option<String>,

    /// Text color (#rgb, #rrggbb, #rrggbbaa)
    #[arg(long = "color")]
    color: Option<String>,

    /// Fill opacity, 0 to 1
    #[arg(long = "opacity")]
    opacity: Option<f32>,

    /// Disable the drop shadow
    #[arg(long = "no-shadow")]
    no_shadow: bool,

    #[arg(long = "shadow-color")]
    shadow_color: Option<String>,

    #[arg(long = "shadow-blur")]
    shadow_blur: Option<f32>,

    #[arg(long = "shadow-distance")]
    shadow_distance: Option<f32>,

    /// Disable the outline
    #[arg(long = "no-stroke")]
    no_stroke: bool,

    #[arg(long = "stroke-color")]
    stroke_color: Option<String>,

    /// Horizontal anchor, percent of width
    #[arg(long = "x", allow_hyphen_values = true)]
    x: Option<f32>,

    /// Vertical anchor, percent of height
    #[arg(long = "y", allow_hyphen_values = true)]
    y: Option<f32>,

    #[arg(long = "scale")]
    scale: Option<f32>,

    /// Rotation in degrees
    #[arg(long = "rotation", allow_hyphen_values = true)]
    rotation: Option<f32>,
}

impl StyleArgs {
    fn apply(&self, base: StyleConfig) -> Result<StyleConfig> {
        let mut style = base;
        if let Some(path) = &self.style {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read style: {}", path.display()))?;
            let patch: StylePatch = toml::from_str(&content)
                .with_context(|| format!("failed to parse style: {}", path.display()))?;
            style = style.merge(patch)?;
        }
        let flags = StylePatch {
            text: self.text.clone(),
            font: self.font.clone(),
            color: self.color.clone(),
            opacity: self.opacity,
            has_shadow: self.no_shadow.then_some(false),
            shadow_color: self.shadow_color.clone(),
            shadow_blur: self.shadow_blur,
            shadow_distance: self.shadow_distance,
            stroke: self.no_stroke.then_some(false),
            stroke_color: self.stroke_color.clone(),
            position_x: self.x,
            position_y: self.y,
            scale: self.scale,
            rotation: self.rotation,
        };
        Ok(style.merge(flags)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    thumbgenius::logging::init(cli.verbose)?;
    let settings = settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;

    match cli.command {
        Command::Generate(args) => run_generate(settings, args).await,
        Command::Export(args) => run_export(settings, args),
        Command::Preview(args) => run_preview(settings, args),
    }
}

async fn run_generate(settings: Settings, args: GenerateArgs) -> Result<()> {
    let script = match args.script {
        Some(script) => script,
        None => read_stdin()?,
    };
    let style = args.style.apply(settings.style.clone())?;
    let out_dir = args.out.unwrap_or_else(|| settings.output_dir.clone());

    let session = Session::from_env(args.key.as_deref());
    let mut studio = build_studio(&settings, session).with_style(style);
    studio.generate(&script).await?;

    if let Some(analysis) = studio.analysis() {
        print_analysis(analysis);
    }
    if args.save_background
        && let Some(background) = studio.background()
    {
        let path = out_dir.join(format!("background.{}", background.extension()));
        fs::create_dir_all(&out_dir)?;
        fs::write(&path, &background.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    for tier in tiers_or_default(&args.resolution) {
        if let Some(exported) = studio.export(tier)? {
            println!("{}", exported.save(&out_dir)?.display());
        }
    }
    if args.preview {
        let path = out_dir.join("preview.png");
        fs::write(&path, studio.preview_png()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    Ok(())
}

fn run_export(settings: Settings, args: ExportArgs) -> Result<()> {
    let style = args.style.apply(settings.style.clone())?;
    let background = InlineImage::load(&args.background)?;
    let out_dir = args.out.unwrap_or_else(|| settings.output_dir.clone());

    let mut studio = build_studio(&settings, Session::new()).with_style(style);
    studio.set_background(background);
    for tier in tiers_or_default(&args.resolution) {
        if let Some(exported) = studio.export(tier)? {
            println!("{}", exported.save(&out_dir)?.display());
        }
    }
    Ok(())
}

fn run_preview(mut settings: Settings, args: PreviewArgs) -> Result<()> {
    if let Some(width) = args.width {
        if width == 0 {
            return Err(anyhow!("--width must be positive"));
        }
        settings.preview_width = width;
    }
    let style = args.style.apply(settings.style.clone())?;
    let background = InlineImage::load(&args.background)?;

    let mut studio = build_studio(&settings, Session::new()).with_style(style);
    studio.set_background(background);

    if let (Some(from), Some(to)) = (args.drag_from.as_deref(), args.drag_to.as_deref()) {
        let (from_x, from_y) = parse_point(from)?;
        let (to_x, to_y) = parse_point(to)?;
        if studio.pointer_down(from_x, from_y) {
            studio.pointer_move(to_x, to_y);
            studio.pointer_up();
        } else {
            eprintln!("drag start ({}, {}) is not on the title", from_x, from_y);
        }
    }

    let out = args.out.unwrap_or_else(|| {
        PathBuf::from(if args.svg { "preview.svg" } else { "preview.png" })
    });
    if args.svg {
        fs::write(&out, studio.preview_svg())
    } else {
        fs::write(&out, studio.preview_png()?)
    }
    .with_context(|| format!("failed to write {}", out.display()))?;

    println!("{}", out.display());
    println!("positionX: {}", studio.style().position_x());
    println!("positionY: {}", studio.style().position_y());
    Ok(())
}

fn tiers_or_default(requested: &[ResolutionTier]) -> Vec<ResolutionTier> {
    if requested.is_empty() {
        vec![ResolutionTier::P1080]
    } else {
        requested.to_vec()
    }
}

fn read_stdin() -> Result<String> {
    if io::stdin().is_terminal() {
        return Err(anyhow!("no script given (use --script or pipe text on stdin)"));
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .with_context(|| "stdin must be UTF-8 text")?;
    Ok(buffer)
}

fn parse_point(value: &str) -> Result<(f32, f32)> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("expected X,Y but got '{}'", value))?;
    let x = x
        .trim()
        .parse::<f32>()
        .with_context(|| format!("invalid X in '{}'", value))?;
    let y = y
        .trim()
        .parse::<f32>()
        .with_context(|| format!("invalid Y in '{}'", value))?;
    Ok((x, y))
}

fn print_analysis(analysis: &SceneAnalysis) {
    println!("protagonist: {}", analysis.protagonist);
    println!("threat: {}", analysis.threat);
    println!("setting: {}", analysis.setting);
    println!("mood: {}", analysis.mood);
    println!("composition: {}", analysis.visual_composition);
    println!("suggested title: {}", analysis.suggested_title);
}
