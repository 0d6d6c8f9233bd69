use clap::{Parser, Subcommand};
use cli::{load_config, save_config, select_policy, target_name, MultiTargetReport, SketchKitError};
use color_eyre::eyre::Result;
use sketch::{load_rasters, ExtractMode, RasterImage, Scorer, ScoringConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a user drawing against one or more target drawings
    Score {
        /// Path to the user drawing
        #[arg(short, long)]
        user: PathBuf,
        /// Target drawing (repeat for several targets)
        #[arg(short, long, required = true)]
        target: Vec<PathBuf>,
        /// Scoring configuration (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Stroke extraction mode (edge or binary)
        #[arg(long)]
        mode: Option<ExtractMode>,
        /// Canvas side in pixels
        #[arg(long)]
        side: Option<u32>,
        /// Boundary distance cap in pixels
        #[arg(long)]
        tau: Option<f64>,
        /// Combination policy (hybrid, threshold_penalty or feature_blend)
        #[arg(long)]
        policy: Option<String>,
        /// Enable the texture sub-score
        #[arg(long)]
        texture: bool,
        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decompose a drawing into primitive shapes and print them as JSON
    Shapes {
        /// Path to the drawing
        #[arg(short, long)]
        input: PathBuf,
        /// Scoring configuration (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also save the normalized canvas as an image
        #[arg(long)]
        canvas: Option<PathBuf>,
    },
    /// Print the JSON schema of the scoring configuration
    Schema,
    /// Write the default configuration to a .toml or .json file
    InitConfig {
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Score {
            user,
            target,
            config,
            mode,
            side,
            tau,
            policy,
            texture,
            output,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(mode) = mode {
                config.mode = *mode;
            }
            if let Some(side) = side {
                config.side = *side;
            }
            if let Some(tau) = tau {
                config.tau = *tau;
            }
            if let Some(policy) = policy {
                select_policy(&mut config, policy)?;
            }
            if *texture {
                config.texture.enabled = true;
            }
            score(user, target, config, output.as_deref())?;
        }
        Commands::Shapes { input, config, canvas } => {
            shapes(input, load_config(config.as_deref())?, canvas.as_deref())?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&ScoringConfig::schema())?);
        }
        Commands::InitConfig { output } => {
            save_config(&ScoringConfig::default(), output)?;
            info!("Default configuration written to {:?}", output);
        }
    }

    Ok(())
}

fn score(user_path: &Path, target_paths: &[PathBuf], config: ScoringConfig, output: Option<&Path>) -> Result<()> {
    if target_paths.is_empty() {
        return Err(SketchKitError::MissingTarget.into());
    }

    let scorer = Scorer::new(config)?;
    info!(
        "Scoring {:?} against {} target(s) with the {} policy",
        user_path,
        target_paths.len(),
        scorer.policy_name()
    );

    let user = RasterImage::open(user_path)?;
    let targets = load_rasters(target_paths)?;
    let results = scorer.score_targets(&user, &targets)?;

    let names: Vec<String> = target_paths.iter().map(|p| target_name(p)).collect();
    let report = MultiTargetReport::from_results(&names, results);
    for result in &report.results {
        if !result.details.gates.is_empty() {
            warn!("Target '{}' capped by {:?}", result.name, result.details.gates);
        }
    }
    if let Some(best) = report.best() {
        info!("Best target: '{}' (#{}) with score {}", best.name, best.index, best.score);
    }

    match output {
        Some(path) => {
            report.to_json_file(path)?;
            info!("Report saved to: {:?}", path);
        }
        None => println!("{}", report.to_json()?),
    }
    Ok(())
}

fn shapes(input: &Path, config: ScoringConfig, canvas: Option<&Path>) -> Result<()> {
    let scorer = Scorer::new(config)?;
    let drawing = scorer.prepare(&RasterImage::open(input)?)?;
    let shapes = match drawing.shapes.clone() {
        Some(shapes) => shapes,
        None => scorer.decomposer().decompose(&drawing.canvas)?,
    };
    info!("Found {} shape(s) in {:?}", shapes.len(), input);

    if let Some(path) = canvas {
        drawing.save_canvas(path)?;
        info!("Normalized canvas saved to: {:?}", path);
    }
    println!("{}", shapes.to_json_string()?);
    Ok(())
}
