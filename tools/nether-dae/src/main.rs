//! nether-dae - COLLADA scene converter
//!
//! Converts `.dae` documents into a packed `.ndae` container (or a
//! `.json` + `.bin` pair) holding nodes, materials, geometry chunks, the
//! merged skeleton and resampled animation tracks.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nether_dae::{ConvertOptions, GeometryMerge, convert_file, export};

/// Extension of the container output
const CONTAINER_EXT: &str = "ndae";

#[derive(Parser)]
#[command(name = "nether-dae")]
#[command(about = "COLLADA scene converter")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a .dae file
    Convert {
        /// Input COLLADA file
        input: PathBuf,

        /// Output .ndae file (or base path with --split)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// TOML options file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Resample rate in frames per second
        #[arg(long)]
        fps: Option<f32>,

        /// Geometry merge mode
        #[arg(long, value_enum)]
        merge: Option<GeometryMerge>,

        /// Keep geometry only, skip animation resampling
        #[arg(long)]
        no_resample: bool,

        /// Write a .json index and a .bin blob instead of one container
        #[arg(long)]
        split: bool,
    },

    /// Print a summary of a .ndae container
    Info {
        /// Input .ndae file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            config,
            fps,
            merge,
            no_resample,
            split,
        } => {
            let mut options = match &config {
                Some(path) => ConvertOptions::load(path)?,
                None => ConvertOptions::default(),
            };
            if fps.is_some() {
                options.animation_fps = fps;
            }
            if let Some(merge) = merge {
                options.geometry_merge = merge;
            }
            if no_resample {
                options.enable_resampling = false;
            }

            let output = output.unwrap_or_else(|| input.with_extension(CONTAINER_EXT));
            tracing::info!("Converting {:?} -> {:?}", input, output);

            let converted = convert_file(&input, &options)?;
            if split {
                export::write_split_files(
                    &converted,
                    &output.with_extension("json"),
                    &output.with_extension("bin"),
                )?;
            } else {
                export::write_container_file(&converted, &output)?;
            }
            tracing::info!("Done!");
        }

        Commands::Info { input } => {
            let (index, blob) = export::read_container_file(&input)?;
            println!("{}", input.display());
            println!("  nodes:      {}", index.nodes.len());
            println!("  materials:  {}", index.materials.len());
            println!("  geometries: {}", index.geometries.len());
            for geometry in &index.geometries {
                println!(
                    "    {} ({} vertices, {} triangles{})",
                    geometry.name,
                    geometry.vertex_count,
                    geometry.triangle_count,
                    if geometry.bone_indices.is_some() { ", skinned" } else { "" }
                );
            }
            println!("  bones:      {}", index.bones.len());
            println!("  animations: {}", index.animations.len());
            for animation in &index.animations {
                println!(
                    "    {} ({} keyframes at {:.2} fps, {:.2}s, {} tracks)",
                    animation.name,
                    animation.keyframe_count,
                    animation.fps,
                    animation.duration,
                    animation.tracks.len()
                );
            }
            println!("  chunks:     {} ({} bytes)", index.chunks.len(), blob.len());
        }
    }

    Ok(())
}
