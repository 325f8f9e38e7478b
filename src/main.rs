use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use constellation::simulation::InitialLayout;
use constellation::zoom::ZoomConfig;
use constellation::{
    Constellation, ConstellationConfig, GraphDocument, NavigationContext, SettleReason, ZoomLevel,
};

/// Upper bound on worker events read while waiting for a layout to settle
const MAX_LAYOUT_EVENTS: usize = 100_000;

/// Force-directed 3D layout for engagement networks.
#[derive(Parser)]
#[command(name = "constellation")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out a graph document and write the settled positions as JSON
    Layout {
        /// Graph document (.json)
        #[arg(short, long)]
        input: PathBuf,

        /// Configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file; stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for the initial placement
        #[arg(long)]
        seed: Option<u64>,

        /// Skip animation and lay out in one shot
        #[arg(long)]
        reduced_motion: bool,
    },
    /// Print the zoom level and render configuration for a camera distance
    Zoom {
        /// Camera distance from its target
        #[arg(short, long, allow_negative_numbers = true)]
        distance: f32,

        /// Configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct LayoutOutput {
    settled: String,
    nodes: Vec<NodeOutput>,
}

#[derive(Serialize)]
struct NodeOutput {
    id: String,
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Serialize)]
struct ZoomOutput {
    distance: f32,
    level: ZoomLevel,
    config: ZoomConfig,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "constellation=debug"
    } else {
        "constellation=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ConstellationConfig> {
    match path {
        Some(path) => ConstellationConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ConstellationConfig::default()),
    }
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

async fn layout(
    input: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
    seed: Option<u64>,
    reduced_motion: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config)?;
    if reduced_motion {
        config.worker.reduced_motion = true;
    }
    if seed.is_some() {
        config.worker.layout = InitialLayout::Random { seed };
    }
    // Nothing is drawn between ticks, so run them back to back
    config.worker.manual_stepping = false;
    config.worker.tick_interval_ms = 0;

    let document = GraphDocument::from_path(input)
        .with_context(|| format!("failed to read graph {}", input.display()))?;
    info!(
        nodes = document.nodes.len(),
        edges = document.edges.len(),
        "laying out {}",
        input.display()
    );

    let mut session = Constellation::new(&config)?;
    session.load(NavigationContext::L1, document.nodes, document.edges);
    let reason = session
        .wait_until_settled(MAX_LAYOUT_EVENTS)
        .await
        .context("layout did not settle")?;
    if let SettleReason::Fault(message) = &reason {
        anyhow::bail!("simulation fault: {message}");
    }

    let result = LayoutOutput {
        settled: reason.as_str().to_string(),
        nodes: session
            .store()
            .nodes()
            .iter()
            .map(|n| NodeOutput {
                id: n.id.clone(),
                x: n.position.x,
                y: n.position.y,
                z: n.position.z,
            })
            .collect(),
    };
    session.shutdown();

    write_json(&result, output)
}

fn zoom(distance: f32, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let level = config.zoom.level_for_distance(distance);
    write_json(
        &ZoomOutput {
            distance,
            level,
            config: *level.config(),
        },
        None,
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Layout {
            input,
            config,
            output,
            seed,
            reduced_motion,
        } => {
            layout(
                &input,
                config.as_deref(),
                output.as_deref(),
                seed,
                reduced_motion,
            )
            .await?;
        }
        Commands::Zoom { distance, config } => {
            zoom(distance, config.as_deref())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_layout_subcommand() {
        let cli = Cli::try_parse_from([
            "constellation",
            "layout",
            "--input",
            "graph.json",
            "--output",
            "out.json",
            "--seed",
            "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Layout {
                input,
                output,
                seed,
                reduced_motion,
                config,
            } => {
                assert_eq!(input, PathBuf::from("graph.json"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert_eq!(seed, Some(7));
                assert!(!reduced_motion);
                assert!(config.is_none());
            }
            _ => panic!("Expected Layout command"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_zoom_subcommand() {
        let cli =
            Cli::try_parse_from(["constellation", "-v", "zoom", "--distance", "275"]).unwrap();
        match cli.command {
            Commands::Zoom { distance, .. } => assert_eq!(distance, 275.0),
            _ => panic!("Expected Zoom command"),
        }
        assert!(cli.verbose);
    }

    #[test]
    fn cli_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["constellation"]).is_err());
    }

    #[test]
    fn layout_requires_input() {
        assert!(Cli::try_parse_from(["constellation", "layout"]).is_err());
    }
}
