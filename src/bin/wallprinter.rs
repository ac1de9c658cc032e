use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use wallprinter::{
    AspectRatio, Config, GeminiClient, GuideMode, Orientation, PlaceOpts, PlacementArea, Session,
    StockQuery, StockSource, UnsplashClient, imageio,
};

#[derive(Parser, Debug)]
#[command(name = "wallprinter", version)]
struct Cli {
    /// JSON config file (environment variables still take precedence).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a guide image locally (no network).
    Guide(GuideArgs),
    /// Render the placement area as a black/white mask (no network).
    Mask(MaskArgs),
    /// Blend an artwork into the scene's placement area with the image model.
    Place(PlaceArgs),
    /// Apply a free-text edit to a scene photo.
    EditScene(EditSceneArgs),
    /// Generate an artwork from a text description.
    Generate(GenerateArgs),
    /// Search stock photos; optionally download one.
    Search(SearchArgs),
}

#[derive(Parser, Debug)]
struct GuideArgs {
    /// Scene image (path or data: URL).
    #[arg(long)]
    scene: String,

    /// Artwork image (path or data: URL). Required for `--mode paste`.
    #[arg(long)]
    artwork: Option<String>,

    /// Placement area as "x,y x,y ..." in percent of the scene.
    #[arg(long, default_value_t = PlacementArea::default().to_string())]
    area: String,

    #[arg(long, value_enum, default_value_t = ModeChoice::Paste)]
    mode: ModeChoice,

    /// Fill color for `--mode fill`.
    #[arg(long, default_value = "#ff00ff")]
    color: String,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct MaskArgs {
    #[arg(long)]
    scene: String,

    #[arg(long, default_value_t = PlacementArea::default().to_string())]
    area: String,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct PlaceArgs {
    #[arg(long)]
    scene: String,

    #[arg(long)]
    artwork: String,

    #[arg(long, default_value_t = PlacementArea::default().to_string())]
    area: String,

    /// Extra instructions appended to the placement prompt.
    #[arg(long)]
    prompt: Option<String>,

    #[arg(long, value_enum, default_value_t = ModeChoice::Paste)]
    mode: ModeChoice,

    #[arg(long, default_value = "#ff00ff")]
    color: String,

    /// Also write the guide image sent to the model.
    #[arg(long)]
    guide_out: Option<PathBuf>,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct EditSceneArgs {
    #[arg(long)]
    scene: String,

    #[arg(long)]
    instruction: String,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,

    /// One of 1:1, 3:4, 4:3, 9:16, 16:9.
    #[arg(long, default_value = "1:1")]
    aspect: String,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct SearchArgs {
    #[arg(long)]
    query: String,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = 12)]
    per_page: u32,

    #[arg(long, value_enum)]
    orientation: Option<OrientationChoice>,

    /// Download the result at this index (0-based) to `--out`.
    #[arg(long, requires = "out")]
    download: Option<usize>,

    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Paste,
    Fill,
    Mask,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OrientationChoice {
    Landscape,
    Portrait,
    Squarish,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = Config::load(cli.config.as_deref())?;
    match cli.cmd {
        Command::Guide(args) => cmd_guide(args),
        Command::Mask(args) => cmd_mask(args),
        Command::Place(args) => cmd_place(&cfg, args),
        Command::EditScene(args) => cmd_edit_scene(&cfg, args),
        Command::Generate(args) => cmd_generate(&cfg, args),
        Command::Search(args) => cmd_search(&cfg, args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn guide_mode(choice: ModeChoice, color: &str) -> anyhow::Result<GuideMode> {
    Ok(match choice {
        ModeChoice::Paste => GuideMode::Paste,
        ModeChoice::Fill => GuideMode::Fill {
            color: wallprinter::parse_hex_color(color)?.0,
        },
        ModeChoice::Mask => GuideMode::Mask,
    })
}

fn load_rgba(source: &str) -> anyhow::Result<image::RgbaImage> {
    let bytes = imageio::load_source(source)?;
    imageio::decode_rgba(&bytes).with_context(|| format!("decode image '{}'", short(source)))
}

fn short(source: &str) -> &str {
    if source.starts_with("data:") {
        "data url"
    } else {
        source
    }
}

fn wrote(path: &Path) {
    eprintln!("wrote {}", path.display());
}

fn cmd_guide(args: GuideArgs) -> anyhow::Result<()> {
    let scene = load_rgba(&args.scene)?;
    let artwork = args.artwork.as_deref().map(load_rgba).transpose()?;
    let area = PlacementArea::parse(&args.area)?;
    let mode = guide_mode(args.mode, &args.color)?;

    let guide = wallprinter::render_guide(&scene, artwork.as_ref(), &area, mode)?;
    imageio::save_png(&args.out, &guide)?;
    wrote(&args.out);
    Ok(())
}

fn cmd_mask(args: MaskArgs) -> anyhow::Result<()> {
    let scene = load_rgba(&args.scene)?;
    let area = PlacementArea::parse(&args.area)?;
    let mask = wallprinter::render_guide(&scene, None, &area, GuideMode::Mask)?;
    imageio::save_png(&args.out, &mask)?;
    wrote(&args.out);
    Ok(())
}

fn cmd_place(cfg: &Config, args: PlaceArgs) -> anyhow::Result<()> {
    let model = GeminiClient::from_config(cfg)?;
    let mut session = Session::new(model, None::<UnsplashClient>, cfg.working_size);

    session.upload_scene(&args.scene, &imageio::load_source(&args.scene)?)?;
    session.upload_artwork(&imageio::load_source(&args.artwork)?)?;
    session.editor().set_area(PlacementArea::parse(&args.area)?);

    let opts = PlaceOpts {
        guide_mode: guide_mode(args.mode, &args.color)?,
        working_size: cfg.working_size,
        extra_prompt: args.prompt,
    };
    let result = session.place(&opts)?.clone();

    if let (Some(path), Some(guide)) = (&args.guide_out, session.last_guide()) {
        imageio::save_png(path, guide)?;
        wrote(path);
    }
    imageio::save_png(&args.out, &result)?;
    wrote(&args.out);
    Ok(())
}

fn cmd_edit_scene(cfg: &Config, args: EditSceneArgs) -> anyhow::Result<()> {
    let model = GeminiClient::from_config(cfg)?;
    let mut session = Session::new(model, None::<UnsplashClient>, cfg.working_size);
    session.upload_scene(&args.scene, &imageio::load_source(&args.scene)?)?;
    session.edit_scene(&args.instruction)?;

    let scene = session.scene().context("scene missing after edit (bug)")?;
    imageio::save_png(&args.out, &scene.image)?;
    wrote(&args.out);
    Ok(())
}

fn cmd_generate(cfg: &Config, args: GenerateArgs) -> anyhow::Result<()> {
    let model = GeminiClient::from_config(cfg)?;
    let aspect: AspectRatio = args.aspect.parse()?;
    let img = wallprinter::generate_artwork(&model, &args.prompt, aspect)?;
    imageio::save_png(&args.out, &img)?;
    wrote(&args.out);
    Ok(())
}

fn cmd_search(cfg: &Config, args: SearchArgs) -> anyhow::Result<()> {
    let client = UnsplashClient::from_config(cfg)?;
    let query = StockQuery {
        query: args.query,
        page: args.page,
        per_page: args.per_page,
        orientation: args.orientation.map(|o| match o {
            OrientationChoice::Landscape => Orientation::Landscape,
            OrientationChoice::Portrait => Orientation::Portrait,
            OrientationChoice::Squarish => Orientation::Squarish,
        }),
    };
    let page = client.search(&query)?;
    eprintln!("page {}/{} ({} total)", page.page, page.total_pages, page.total);
    for photo in &page.photos {
        println!("{}", serde_json::to_string(photo)?);
    }

    // clap enforces `--out` whenever `--download` is given.
    if let (Some(index), Some(out)) = (args.download, &args.out) {
        let photo = page
            .photos
            .get(index)
            .with_context(|| format!("no result at index {index}"))?;
        let bytes = client.download(photo)?;
        imageio::save_bytes(out, &bytes)?;
        wrote(out);
    }
    Ok(())
}
