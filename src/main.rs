//! Batch command line front end: open, decode, render, save.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tilescope::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tilescope")]
#[command(version, about = "Decode raw binary tile data into a grid image")]
struct Args {
    /// Raw input file
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Output image path; format follows the extension (.png, .bmp, ...)
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Decoder plugin: a built-in name, a .rhai script, or a native module
    #[arg(long, short = 'p', default_value = "default")]
    plugin: String,

    /// Config exchange JSON for the plugin (overrides any sidecar file)
    #[arg(long)]
    plugin_cfg: Option<PathBuf>,

    /// Byte offset where decoding starts
    #[arg(long, default_value_t = 0)]
    start: u32,

    /// Bytes to decode; 0 means the rest of the file
    #[arg(long, default_value_t = 0)]
    size: u32,

    /// Tiles per row in the output grid
    #[arg(long, default_value_t = 32)]
    nrow: u16,

    /// Tile width in pixels
    #[arg(long, default_value_t = 24)]
    width: u32,

    /// Tile height in pixels
    #[arg(long, default_value_t = 24)]
    height: u32,

    /// Bits per pixel: 1, 2, 3, 4, 8, 16, 24 or 32
    #[arg(long, default_value_t = 8)]
    bpp: u8,

    /// Bytes per tile; 0 derives it from width, height and bpp
    #[arg(long, default_value_t = 0)]
    nbytes: u32,

    /// Run without a UI (batch is currently the only mode)
    #[arg(long, default_value_t = false)]
    no_gui: bool,
}

fn run(args: &Args) -> Result<()> {
    let mut solver = TileSolver::new();
    solver.load_file(&args.input)?;
    *solver.config_mut() = TileConfig {
        start: args.start,
        size: args.size,
        nrow: args.nrow,
        fmt: TileFormat {
            w: args.width,
            h: args.height,
            bpp: args.bpp,
            nbytes: args.nbytes,
        },
    };
    solver.select_plugin(&args.plugin)?;
    if let Some(path) = &args.plugin_cfg {
        solver.set_pending_config(std::fs::read_to_string(path)?);
    }
    solver.decode()?;
    solver.save(&args.output)?;
    solver.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if !args.no_gui {
        tracing::debug!("no UI is built in; running in batch mode");
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
