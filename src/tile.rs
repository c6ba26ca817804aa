//! Core data model: tile geometry, positions, pixels and view-state records.
//!
//! These types are `#[repr(C)]` because they cross the native plugin ABI
//! unchanged (see [`crate::decoder::abi`]).

use serde::{Deserialize, Serialize};

/// Geometry of a single tile.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileFormat {
    /// Tile width in pixels.
    pub w: u32,
    /// Tile height in pixels.
    pub h: u32,
    /// Bits per pixel. 1, 2, 3, 4, 8, 16, 24 and 32 have defined behavior;
    /// other values are decoder-specific extensions.
    pub bpp: u8,
    /// Bytes per tile; 0 derives `ceil(w * h * bpp / 8)`.
    pub nbytes: u32,
}

impl TileFormat {
    /// Create a format with a derived byte size.
    pub fn new(w: u32, h: u32, bpp: u8) -> Self {
        Self {
            w,
            h,
            bpp,
            nbytes: 0,
        }
    }

    /// Effective bytes per tile: the explicit `nbytes` when non-zero,
    /// otherwise `ceil(w * h * bpp / 8)`.
    pub fn bytes_per_tile(&self) -> usize {
        if self.nbytes != 0 {
            self.nbytes as usize
        } else {
            (self.w as usize * self.h as usize * self.bpp as usize + 7) / 8
        }
    }

    /// Pixels per tile.
    pub fn pixels_per_tile(&self) -> usize {
        self.w as usize * self.h as usize
    }
}

impl Default for TileFormat {
    fn default() -> Self {
        Self {
            w: 24,
            h: 24,
            bpp: 8,
            nbytes: 0,
        }
    }
}

/// Process-wide tile decode configuration.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileConfig {
    /// Byte offset of the first tile in the file.
    pub start: u32,
    /// Total bytes to decode; 0 means the rest of the file.
    pub size: u32,
    /// Tiles per row in the rendered grid.
    pub nrow: u16,
    /// Tile geometry.
    pub fmt: TileFormat,
}

impl TileConfig {
    /// Number of whole tiles in `data_size` bytes, never less than one.
    ///
    /// Data shorter than a single tile still yields one (partial) tile.
    pub fn tile_count(&self, data_size: usize) -> usize {
        let nbytes = self.fmt.bytes_per_tile();
        if nbytes == 0 {
            return 1;
        }
        (data_size / nbytes).max(1)
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            start: 0,
            size: 0,
            nrow: 32,
            fmt: TileFormat::default(),
        }
    }
}

/// Addresses one pixel within the tile grid.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePosition {
    /// Tile index.
    pub i: i32,
    /// X coordinate within the tile.
    pub x: i32,
    /// Y coordinate within the tile.
    pub y: i32,
}

impl TilePosition {
    /// Create a position.
    pub fn new(i: i32, x: i32, y: i32) -> Self {
        Self { i, x, y }
    }
}

/// One RGBA pixel.
///
/// The four channels alias a little-endian 32-bit word: decoders that leave
/// raw indices in place write the word via [`Pixel::from_index`] and the
/// caller reads it back with [`Pixel::index`] instead of treating the
/// channels as display RGBA.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pixel {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Pixel {
    /// A fully opaque RGBA pixel.
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// A grayscale preview pixel (index replicated into R, G, B, opaque).
    pub fn gray(v: u8) -> Self {
        Self {
            r: v,
            g: v,
            b: v,
            a: 255,
        }
    }

    /// View the channels as the aliased little-endian 32-bit word.
    pub fn index(&self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }

    /// Store a raw 32-bit value into the aliased channel storage.
    pub fn from_index(d: u32) -> Self {
        let [r, g, b, a] = d.to_le_bytes();
        Self { r, g, b, a }
    }
}

/// Tile navigation record, passed through to the UI layer uninterpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TileNav {
    /// Currently selected tile index.
    pub index: i32,
    /// Tile offset in the file (including start).
    pub offset: i32,
    /// Tile start X position.
    pub x: i32,
    /// Tile start Y position.
    pub y: i32,
    /// Whether the view should scroll to the target position.
    pub scroll_to: bool,
}

/// Tile render style record, passed through to the UI layer uninterpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileStyle {
    /// View scale factor.
    pub scale: f32,
    /// Style flags.
    pub style: i64,
    /// Whether the scale should be reset.
    pub reset_scale: bool,
}

impl Default for TileStyle {
    fn default() -> Self {
        Self {
            scale: 1.0,
            style: 0,
            reset_scale: false,
        }
    }
}

/// Shared view state: the tile configuration plus the nav/style records the
/// UI layer and script decoders exchange.
///
/// The dispatcher is the only mutator during a decode pass; script capability
/// bindings close over the same instance through an `Arc<RwLock<_>>`.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    /// Tile decode configuration.
    pub cfg: TileConfig,
    /// Navigation record.
    pub nav: TileNav,
    /// Render style record.
    pub style: TileStyle,
}
