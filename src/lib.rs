//! # Tilescope
//!
//! A tile decode engine for raw binary files: slice a file into fixed-size
//! tiles, decode each tile's packed pixels, and compose the result into a
//! grid image.
//!
//! Decoding is pluggable. Three decoder kinds satisfy one [`decoder::Decoder`]
//! contract:
//!
//! - **Built-in**: the packed-pixel codec in [`codec`] (1/2/3/4/8/16/24/32
//!   bits per pixel, endianness and flip transforms)
//! - **Native**: platform dynamic libraries exporting the capability table
//!   in [`decoder::abi`]
//! - **Script**: embedded `rhai` programs driven through the capability API
//!   in [`script`]
//!
//! The [`solver::TileSolver`] dispatches a decode pass end to end and the
//! [`registry::PluginRegistry`] resolves plugin identifiers and owns the
//! active decoder.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tilescope::prelude::*;
//!
//! let mut solver = TileSolver::new();
//! solver.load_file(Path::new("sprites.bin"))?;
//! solver.select_plugin("default")?;
//! solver.config_mut().fmt = TileFormat::new(16, 16, 4);
//! solver.decode()?;
//! solver.save(Path::new("sprites.png"))?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod codec;
pub mod config;
pub mod decoder;
pub mod error;
pub mod registry;
pub mod script;
pub mod solver;
pub mod tile;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::codec::CodecOptions;
    pub use crate::config::{ConfigDoc, ConfigRecord};
    pub use crate::decoder::{Capabilities, Decoder, RawBuffer};
    pub use crate::error::{Error, Result, Status};
    pub use crate::registry::PluginRegistry;
    pub use crate::solver::TileSolver;
    pub use crate::tile::{Pixel, TileConfig, TileFormat, TilePosition};
}

pub use error::{Error, Result};
