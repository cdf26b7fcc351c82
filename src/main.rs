use clap::{Parser, Subcommand};
use photocal::batch::{self, BatchOptions};
use photocal::cache::PlacementCache;
use photocal::compose::{ComposeSettings, Composer};
use photocal::config::{self, ComposeConfig, Override, TestMode};
use photocal::entropy::{EntropyMap, FitParams, fit_rect};
use photocal::imaging::RustToolkit;
use photocal::output;
use photocal::placement::PlacementMode;
use photocal::render::CommandRenderer;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "photocal")]
#[command(about = "Place a calendar on the quietest part of a photo")]
#[command(long_about = "\
Place a calendar on the quietest part of a photo

The photo is reduced to a small entropy map (edge strength per cell) and the
largest rectangle of acceptably low entropy is chosen for the calendar. The
calendar is rendered by an external program at exactly that pixel size and
composited onto the photo, negated when the area underneath is dark.

Examples:

  photocal compose beach.jpg -d out                # current month, out/beach.jpg
  photocal compose photos/ --range 1:12/2026 -d out
  photocal compose 'photos/*.jpg' --range 0:0/0 --shuffle
  photocal compose beach.jpg --test print          # print W H X Y only
  photocal compose beach.jpg -- --lang=fr          # extra renderer arguments

Run 'photocal gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (TOML); stock defaults apply to anything it leaves out
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override a config key, e.g. --set placement.relax=0.3
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    set: Vec<String>,

    /// Log placement diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compose calendars onto one or more photos
    Compose(ComposeArgs),
    /// Fit a rectangle on a standalone P2 entropy map
    Fit(FitArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct ComposeArgs {
    /// Photo file, directory, or file name pattern (`*`, `?`)
    input: PathBuf,

    /// Month range: MONTH/YEAR, MONTH1-MONTH2/YEAR or MONTH:SPAN/YEAR
    #[arg(short, long)]
    range: Option<String>,

    /// Use N random photos (0: as many as there are months)
    #[arg(long, value_name = "N")]
    sample: Option<usize>,

    /// Shuffle the photos (same as --sample 0)
    #[arg(long)]
    shuffle: bool,

    /// Output file for a single photo
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'd', long)]
    outdir: Option<String>,

    /// Output image extension, e.g. png
    #[arg(long)]
    format: Option<String>,

    /// Prefix output names with YYYY-MM_
    #[arg(long, value_parser = ["no", "auto", "yes"])]
    prefix: Option<String>,

    /// Diagnostic mode instead of composing
    #[arg(long, value_parser = ["none", "area", "quant", "quantimg", "print", "crop"])]
    test: Option<String>,

    /// Placement mode
    #[arg(short, long, value_enum)]
    placement: Option<PlacementMode>,

    /// Minimum calendar size as a fraction of the photo (margin for compass modes)
    #[arg(long)]
    min_size: Option<f64>,

    /// Maximum calendar size as a fraction of the photo
    #[arg(long)]
    max_size: Option<f64>,

    /// Calendar aspect ratio: 0 (photo's), a number, or X/Y
    #[arg(long)]
    ratio: Option<String>,

    /// Entropy below which a size is accepted immediately
    #[arg(long)]
    low_entropy: Option<f64>,

    /// Accept larger sizes within this relative distance of the best
    #[arg(long)]
    relax: Option<f64>,

    /// Entropy grid size
    #[arg(long)]
    quantum: Option<u32>,

    /// Luminance under which the calendar is negated (0 never, 255 always)
    #[arg(long)]
    negative: Option<f64>,

    /// Brightness change under the calendar, percent
    #[arg(long, allow_hyphen_values = true)]
    brightness: Option<i32>,

    /// Saturation under the calendar, percent
    #[arg(long)]
    saturation: Option<u32>,

    /// Calendar program
    #[arg(long)]
    program: Option<String>,

    /// Calendar style
    #[arg(long)]
    style: Option<String>,

    /// Do not add --no-footer --border=0 to the renderer arguments
    #[arg(long)]
    vanilla: bool,

    /// Parallel jobs (capped at the core count)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Seed for random placement and sampling
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    seed: Option<i64>,

    /// Write a JSON report of every composed calendar
    #[arg(long)]
    report: Option<PathBuf>,

    /// Extra arguments for the calendar program
    #[arg(last = true)]
    renderer_args: Vec<String>,
}

impl ComposeArgs {
    /// Config overrides for every flag given on the command line.
    fn overrides(&self) -> Vec<Override> {
        let mut ov = Vec::new();
        if let Some(v) = &self.outdir {
            ov.push(Override::new("output.dir", v.as_str()));
        }
        if let Some(v) = &self.format {
            ov.push(Override::new("output.format", v.as_str()));
        }
        if let Some(v) = &self.prefix {
            ov.push(Override::new("output.prefix", v.as_str()));
        }
        if let Some(v) = &self.test {
            ov.push(Override::new("output.test", v.as_str()));
        }
        if let Some(v) = self.placement {
            ov.push(Override::new("placement.mode", v.as_str()));
        }
        if let Some(v) = self.min_size {
            ov.push(Override::new("placement.min_size", v));
        }
        if let Some(v) = self.max_size {
            ov.push(Override::new("placement.max_size", v));
        }
        if let Some(v) = &self.ratio {
            ov.push(Override::new("placement.ratio", v.as_str()));
        }
        if let Some(v) = self.low_entropy {
            ov.push(Override::new("placement.low_entropy", v));
        }
        if let Some(v) = self.relax {
            ov.push(Override::new("placement.relax", v));
        }
        if let Some(v) = self.quantum {
            ov.push(Override::new("placement.quantum", v as i64));
        }
        if let Some(v) = self.negative {
            ov.push(Override::new("placement.negative", v));
        }
        if let Some(v) = self.seed {
            ov.push(Override::new("placement.seed", v));
        }
        if let Some(v) = self.brightness {
            ov.push(Override::new("overlay.brightness", v as i64));
        }
        if let Some(v) = self.saturation {
            ov.push(Override::new("overlay.saturation", v as i64));
        }
        if let Some(v) = &self.program {
            ov.push(Override::new("calendar.program", v.as_str()));
        }
        if let Some(v) = &self.style {
            ov.push(Override::new("calendar.style", v.as_str()));
        }
        if self.vanilla {
            ov.push(Override::new("calendar.vanilla", true));
        }
        if !self.renderer_args.is_empty() {
            ov.push(Override::new("calendar.args", self.renderer_args.clone()));
        }
        if let Some(v) = self.jobs {
            ov.push(Override::new("processing.max_processes", v as i64));
        }
        ov
    }
}

#[derive(clap::Args)]
struct FitArgs {
    /// Square P2 raster
    map: PathBuf,

    /// Smallest block as a fraction of the grid
    #[arg(long, default_value_t = 0.333)]
    min_size: f64,

    /// Largest block as a fraction of the grid
    #[arg(long, default_value_t = 0.8)]
    max_size: f64,

    /// Average accepted immediately
    #[arg(long, default_value_t = 7.0)]
    low_entropy: f64,

    /// Relative tolerance above the smallest block's average
    #[arg(long, default_value_t = 0.2)]
    relax: f64,

    /// Block aspect ratio relative to the grid (1: square)
    #[arg(long, default_value_t = 1.0)]
    aspect: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Compose(args) => {
            let mut overrides = args.overrides();
            for spec in &cli.set {
                overrides.push(Override::parse(spec)?);
            }
            let config = config::load_config(cli.config.as_deref(), &overrides)?;
            compose(&args, &config)?;
        }
        Command::Fit(args) => {
            let content = std::fs::read_to_string(&args.map)?;
            let map: EntropyMap = content.parse()?;
            let fit = fit_rect(
                &map,
                &FitParams {
                    size_range: (args.min_size, args.max_size),
                    early_stop: args.low_entropy,
                    relax: args.relax,
                    ratio_of_ratios: args.aspect,
                },
            )?;
            for line in output::format_fit_result(&fit) {
                println!("{}", line);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn compose(args: &ComposeArgs, config: &ComposeConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_thread_pool(&config.processing);

    let settings = ComposeSettings::from_config(config)?;
    let options = BatchOptions {
        input: args.input.clone(),
        range: args.range.clone(),
        sample: args.sample,
        shuffle: args.shuffle,
        outfile: args.outfile.clone(),
        outdir: PathBuf::from(&config.output.dir),
        format: config.output.format.clone(),
        prefix: config.output.prefix,
    };
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let plan = batch::plan_jobs(&options, batch::today(), &mut rng)?;

    let test = settings.test;
    if test != TestMode::Print {
        create_output_dirs(&plan.jobs.iter().map(|j| j.output.as_path()).collect::<Vec<_>>())?;
    }

    let cache = plan.use_cache.then(PlacementCache::new);
    let toolkit = RustToolkit::new();
    let renderer = CommandRenderer::new(config.calendar.program.as_str());

    let (tx, rx) = std::sync::mpsc::channel();
    let quiet = test == TestMode::Print;
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_compose_event(&event, quiet) {
                println!("{}", line);
            }
        }
    });

    let composer = Composer::new(&toolkit, &renderer, settings)
        .with_cache(cache.as_ref())
        .with_events(Some(tx));
    let summary = batch::run(&composer, &plan.jobs, cache.as_ref());
    drop(composer);
    printer.join().map_err(|_| "output thread panicked")?;

    for line in output::format_summary(&summary, test) {
        println!("{}", line);
    }

    if let Some(report) = &args.report {
        let json = serde_json::to_string_pretty(&summary.records)?;
        std::fs::write(report, json)?;
    }

    if !summary.is_success() {
        return Err(format!(
            "{} of {} calendars not composed",
            summary.failures.len() + summary.skipped.len(),
            plan.jobs.len()
        )
        .into());
    }
    Ok(())
}

/// Create the parent directories of every output path.
fn create_output_dirs(outputs: &[&Path]) -> std::io::Result<()> {
    for dir in outputs.iter().filter_map(|p| p.parent()) {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
