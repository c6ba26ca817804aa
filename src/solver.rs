//! The decode dispatcher: drives a full pass from raw bytes to tile buffers
//! and composes the rendered grid image.
//!
//! A pass is strictly sequential: receive pending config, pre hook, prepare
//! tile buffers, decode (bulk or per pixel), post hook. The active decoder
//! persists across passes; it is only closed on plugin switch or teardown.

use crate::decoder::{Decoder, RawBuffer};
use crate::error::{Error, Result};
use crate::registry::PluginRegistry;
use crate::tile::{Pixel, TileConfig, TilePosition};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::time::Instant;

/// Largest edge the rendered grid image may have.
pub const MAX_IMAGE_DIM: u32 = 16384;

pub struct TileSolver {
    registry: PluginRegistry,
    cfg: TileConfig,
    raw: RawBuffer,
    tiles: Vec<Vec<Pixel>>,
    /// Config exchange payload handed to the decoder at the next pass.
    pending_cfg: Option<String>,
}

impl TileSolver {
    pub fn new() -> Self {
        Self {
            registry: PluginRegistry::new(),
            cfg: TileConfig::default(),
            raw: RawBuffer::default(),
            tiles: Vec::new(),
            pending_cfg: None,
        }
    }

    pub fn config(&self) -> &TileConfig {
        &self.cfg
    }

    pub fn config_mut(&mut self) -> &mut TileConfig {
        &mut self.cfg
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    pub fn tiles(&self) -> &[Vec<Pixel>] {
        &self.tiles
    }

    /// Read the raw input file.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let data = std::fs::read(path)?;
        let size = data.len();
        tracing::info!(path = %path.display(), size, "raw file loaded");
        self.raw = RawBuffer::from(data);
        self.tiles.clear();
        Ok(size)
    }

    /// Replace the raw input buffer directly.
    pub fn set_raw(&mut self, data: impl Into<RawBuffer>) {
        self.raw = data.into();
        self.tiles.clear();
    }

    /// Queue a config exchange payload for the next decode pass.
    pub fn set_pending_config(&mut self, text: impl Into<String>) {
        self.pending_cfg = Some(text.into());
    }

    /// Switch decoders, recovering the previous one when the new open fails.
    ///
    /// The previous decoder is closed before the new one opens. If the new
    /// plugin cannot be opened, the previous plugin is reopened so a usable
    /// decoder stays active; the original open error is still returned.
    pub fn select_plugin(&mut self, identifier: &str) -> Result<()> {
        let previous = self.registry.active_id().map(String::from);
        if let Err(err) = self.registry.select(identifier) {
            if let Some(prev) = previous {
                if let Err(e) = self.registry.select(&prev) {
                    tracing::warn!(plugin = %prev, "could not restore previous decoder: {e}");
                }
            }
            return Err(err);
        }
        // A sidecar JSON next to the plugin seeds the config exchange.
        if let Some(sidecar) = self.registry.sidecar_path(identifier) {
            if sidecar.is_file() {
                match std::fs::read_to_string(&sidecar) {
                    Ok(text) => {
                        tracing::info!(path = %sidecar.display(), "plugin config loaded");
                        self.pending_cfg = Some(text);
                    }
                    Err(e) => {
                        tracing::warn!(path = %sidecar.display(), "plugin config unreadable: {e}")
                    }
                }
            }
        }
        Ok(())
    }

    /// The config exchange document published by the active decoder.
    pub fn fetch_schema(&mut self) -> Result<String> {
        let decoder = self
            .registry
            .active_mut()
            .ok_or_else(|| Error::Open("no active decoder".into()))?;
        if !decoder.capabilities().send_ui {
            return Ok(String::new());
        }
        let schema = decoder.send_ui_schema();
        drain_message(decoder.as_mut(), "send_ui");
        schema
    }

    /// Run one decode pass over the current raw buffer.
    pub fn decode(&mut self) -> Result<()> {
        let started = Instant::now();
        let decoder = self
            .registry
            .active_mut()
            .ok_or_else(|| Error::Open("no active decoder".into()))?;
        let caps = decoder.capabilities();

        if let Some(text) = self.pending_cfg.take() {
            if caps.recv_ui {
                // Config rejection is advisory; the pass continues with the
                // decoder's previous settings.
                if let Err(e) = decoder.receive_ui_values(&text) {
                    tracing::warn!(decoder = decoder.name(), "config rejected: {e}");
                }
                drain_message(decoder.as_mut(), "recv_ui");
            }
        }

        if caps.pre {
            let mut cfg = self.cfg;
            let result = decoder.pre(&self.raw, &mut cfg);
            drain_message(decoder.as_mut(), "pre");
            match result {
                Ok(()) => self.cfg = cfg,
                Err(e) => {
                    // No stale buffers survive a failed pre.
                    self.tiles.clear();
                    return Err(e);
                }
            }
        }

        let fmt = self.cfg.fmt;
        let nbytes = fmt.bytes_per_tile();
        if nbytes == 0 {
            return Err(Error::Format(format!(
                "tile format {}x{}@{} has zero byte size",
                fmt.w, fmt.h, fmt.bpp
            )));
        }
        let start = (self.cfg.start as usize).min(self.raw.len());
        let end = if self.cfg.size == 0 {
            self.raw.len()
        } else {
            self.raw.len().min(start + self.cfg.size as usize)
        };
        let window = &self.raw[start..end];
        let ntile = self.cfg.tile_count(window.len());
        let npixel = fmt.pixels_per_tile();
        self.tiles = vec![vec![Pixel::default(); npixel]; ntile];

        // A failed bulk decode still reaches the post hook below so the
        // decoder gets its cleanup pass; the error is surfaced afterwards.
        let mut decode_failed: Option<Error> = None;
        if caps.bulk {
            let result = decoder.decode_all(window, &fmt, true);
            drain_message(decoder.as_mut(), "decode_all");
            match result {
                Ok(pixels) => {
                    for (t, tile) in self.tiles.iter_mut().enumerate() {
                        let offset = t * npixel;
                        if offset + npixel > pixels.len() {
                            tracing::warn!(
                                tile = t,
                                got = pixels.len(),
                                "bulk decode returned fewer pixels than the tile grid needs"
                            );
                            break;
                        }
                        tile.copy_from_slice(&pixels[offset..offset + npixel]);
                    }
                }
                Err(e) => {
                    tracing::warn!(decoder = decoder.name(), "bulk decode failed: {e}");
                    decode_failed = Some(e);
                }
            }
        } else {
            let mut failed = 0usize;
            for t in 0..ntile {
                for y in 0..fmt.h {
                    for x in 0..fmt.w {
                        let pos = TilePosition::new(t as i32, x as i32, y as i32);
                        match decoder.decode_one(window, &pos, &fmt, false) {
                            Ok(pixel) => {
                                self.tiles[t][(x + y * fmt.w) as usize] = pixel;
                            }
                            Err(e) => {
                                // The pixel stays zeroed; the pass goes on.
                                failed += 1;
                                tracing::debug!(
                                    tile = t, x, y,
                                    "pixel decode failed: {e}"
                                );
                            }
                        }
                    }
                }
            }
            drain_message(decoder.as_mut(), "decode");
            if failed > 0 {
                tracing::warn!(failed, "pixels left at default after decode errors");
            }
        }

        if caps.post {
            let mut cfg = self.cfg;
            let result = decoder.post(&self.raw, &mut cfg);
            drain_message(decoder.as_mut(), "post");
            match result {
                Ok(()) => self.cfg = cfg,
                Err(e) => tracing::warn!(decoder = decoder.name(), "post failed: {e}"),
            }
        }

        if let Some(e) = decode_failed {
            return Err(e);
        }
        tracing::info!(
            tiles = ntile,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "decode pass complete"
        );
        Ok(())
    }

    /// Compose the decoded tiles into a row-major grid image.
    ///
    /// When the grid would exceed [`MAX_IMAGE_DIM`] on either edge, a smaller
    /// tiles-per-row is computed toward a square image and written back into
    /// the configuration.
    pub fn render(&mut self) -> Result<RgbaImage> {
        let ntile = self.tiles.len() as u32;
        if ntile == 0 {
            return Err(Error::Render("no tiles decoded".into()));
        }
        let (w, h) = (self.cfg.fmt.w, self.cfg.fmt.h);
        if w == 0 || h == 0 {
            return Err(Error::Render("tile format has a zero dimension".into()));
        }

        if w > MAX_IMAGE_DIM || h > MAX_IMAGE_DIM {
            return Err(Error::Render(format!(
                "tile {w}x{h} exceeds the {MAX_IMAGE_DIM} pixel image limit"
            )));
        }
        let mut nrow = (self.cfg.nrow as u32).max(1).min(ntile);
        if nrow as u64 * w as u64 > MAX_IMAGE_DIM as u64
            || ntile.div_ceil(nrow) as u64 * h as u64 > MAX_IMAGE_DIM as u64
        {
            let side = ((w as f64 * h as f64 * ntile as f64).sqrt().ceil()) as u32;
            nrow = ((side + w - 1) / w).clamp(1, MAX_IMAGE_DIM / w);
            if ntile.div_ceil(nrow) as u64 * h as u64 > MAX_IMAGE_DIM as u64 {
                return Err(Error::Render(format!(
                    "{ntile} tiles of {w}x{h} cannot fit a {MAX_IMAGE_DIM} pixel image"
                )));
            }
            self.cfg.nrow = nrow.min(u16::MAX as u32) as u16;
            tracing::info!(nrow, "grid exceeds image limits, tiles per row adjusted");
        }

        let img_w = nrow * w;
        let img_h = ntile.div_ceil(nrow) * h;
        let mut image = RgbaImage::new(img_w, img_h);
        for (t, tile) in self.tiles.iter().enumerate() {
            let tx = (t as u32 % nrow) * w;
            let ty = (t as u32 / nrow) * h;
            for y in 0..h {
                for x in 0..w {
                    let p = tile[(x + y * w) as usize];
                    image.put_pixel(tx + x, ty + y, Rgba([p.r, p.g, p.b, p.a]));
                }
            }
        }
        Ok(image)
    }

    /// Render and write the grid image; format follows the file extension.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        let image = self.render()?;
        image.save(path)?;
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "image saved"
        );
        Ok(())
    }

    /// Close the active decoder.
    pub fn shutdown(&mut self) {
        self.registry.close_active();
    }
}

impl Default for TileSolver {
    fn default() -> Self {
        Self::new()
    }
}

fn drain_message(decoder: &mut dyn Decoder, stage: &str) {
    let message = decoder.take_message();
    if !message.is_empty() {
        tracing::info!(decoder = decoder.name(), stage, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{BUILTIN_NAME, Capabilities};
    use crate::error::Error;
    use crate::tile::{TileFormat, TilePosition};

    fn solver_with_raw(data: Vec<u8>, cfg: TileConfig) -> TileSolver {
        let mut solver = TileSolver::new();
        solver.set_raw(data);
        *solver.config_mut() = cfg;
        solver.select_plugin(BUILTIN_NAME).unwrap();
        solver
    }

    #[test]
    fn test_grayscale_grid_scenario() {
        // 512 bytes of 8x8@8 tiles: 64 bytes per tile, 8 tiles.
        let data: Vec<u8> = (0..512).map(|i| (i % 256) as u8).collect();
        let cfg = TileConfig {
            nrow: 8,
            fmt: TileFormat::new(8, 8, 8),
            ..TileConfig::default()
        };
        let mut solver = solver_with_raw(data, cfg);
        solver.decode().unwrap();
        assert_eq!(solver.tiles().len(), 8);
        // Tile 0 pixel (0,0) is the first raw byte as gray.
        assert_eq!(solver.tiles()[0][0], Pixel::gray(0));
        // Tile 1 starts 64 bytes in.
        assert_eq!(solver.tiles()[1][0], Pixel::gray(64));
    }

    #[test]
    fn test_start_and_size_window() {
        let data = vec![0xaau8; 64];
        let cfg = TileConfig {
            start: 32,
            size: 16,
            fmt: TileFormat::new(4, 4, 8),
            ..TileConfig::default()
        };
        let mut solver = solver_with_raw(data, cfg);
        solver.decode().unwrap();
        // 16-byte window over 16-byte tiles.
        assert_eq!(solver.tiles().len(), 1);
    }

    #[test]
    fn test_short_buffer_still_yields_one_tile() {
        let cfg = TileConfig {
            fmt: TileFormat::new(8, 8, 8),
            ..TileConfig::default()
        };
        let mut solver = solver_with_raw(vec![7u8; 10], cfg);
        solver.decode().unwrap();
        assert_eq!(solver.tiles().len(), 1);
        // In-bounds pixels decode, the rest stay zeroed.
        assert_eq!(solver.tiles()[0][0], Pixel::gray(7));
        assert_eq!(solver.tiles()[0][63], Pixel::default());
    }

    #[test]
    fn test_decode_without_plugin() {
        let mut solver = TileSolver::new();
        solver.set_raw(vec![0u8; 16]);
        assert!(matches!(solver.decode(), Err(Error::Open(_))));
    }

    struct FailingPre;

    impl Decoder for FailingPre {
        fn name(&self) -> &str {
            "failing-pre"
        }
        fn open(&mut self, _source: &str) -> crate::error::Result<()> {
            Ok(())
        }
        fn close(&mut self) -> crate::error::Result<()> {
            Ok(())
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                pre: true,
                ..Capabilities::default()
            }
        }
        fn decode_one(
            &mut self,
            _data: &[u8],
            _pos: &TilePosition,
            _fmt: &TileFormat,
            _remain_index: bool,
        ) -> crate::error::Result<Pixel> {
            Ok(Pixel::default())
        }
        fn pre(
            &mut self,
            _raw: &RawBuffer,
            _cfg: &mut TileConfig,
        ) -> crate::error::Result<()> {
            Err(Error::Fail("not my format".into()))
        }
    }

    #[test]
    fn test_pre_failure_clears_tiles() {
        let cfg = TileConfig {
            fmt: TileFormat::new(2, 2, 8),
            ..TileConfig::default()
        };
        let mut solver = solver_with_raw(vec![1u8; 16], cfg);
        solver.decode().unwrap();
        assert!(!solver.tiles().is_empty());

        solver
            .registry_mut()
            .register_builtin("failing-pre", || Box::new(FailingPre));
        solver.select_plugin("failing-pre").unwrap();
        assert!(solver.decode().is_err());
        assert!(solver.tiles().is_empty());
    }

    #[test]
    fn test_failed_switch_restores_previous_plugin() {
        let cfg = TileConfig {
            fmt: TileFormat::new(2, 2, 8),
            ..TileConfig::default()
        };
        let mut solver = solver_with_raw(vec![1u8; 16], cfg);
        assert!(solver.select_plugin("no-such-plugin").is_err());
        // The built-in stays usable.
        solver.decode().unwrap();
        assert!(!solver.tiles().is_empty());
    }

    #[test]
    fn test_render_grid_layout() {
        let cfg = TileConfig {
            nrow: 2,
            fmt: TileFormat::new(2, 2, 8),
            ..TileConfig::default()
        };
        // Two tiles: all 0x10, then all 0x20.
        let mut data = vec![0x10u8; 4];
        data.extend_from_slice(&[0x20; 4]);
        let mut solver = solver_with_raw(data, cfg);
        solver.decode().unwrap();
        let image = solver.render().unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
        assert_eq!(image.get_pixel(0, 0).0, [0x10, 0x10, 0x10, 0xff]);
        assert_eq!(image.get_pixel(2, 0).0, [0x20, 0x20, 0x20, 0xff]);
    }

    #[test]
    fn test_render_autoshrink_writes_back_nrow() {
        let cfg = TileConfig {
            nrow: 4096,
            fmt: TileFormat::new(8, 8, 8),
            ..TileConfig::default()
        };
        let mut solver = solver_with_raw(vec![0u8; 64 * 4096], cfg);
        solver.decode().unwrap();
        assert_eq!(solver.tiles().len(), 4096);
        // 4096 * 8 = 32768 wide, over the limit.
        let image = solver.render().unwrap();
        assert!(image.width() <= MAX_IMAGE_DIM);
        assert!((solver.config().nrow as u32) < 4096);
        let side = ((8.0f64 * 8.0 * 4096.0).sqrt().ceil()) as u32;
        assert_eq!(solver.config().nrow as u32, (side + 7) / 8);
    }

    #[test]
    fn test_render_rejects_oversized_tile() {
        // A single tile wider than the image limit cannot be shrunk.
        let cfg = TileConfig {
            nrow: 1,
            fmt: TileFormat::new(20000, 1, 8),
            ..TileConfig::default()
        };
        let mut solver = solver_with_raw(vec![0u8; 20000], cfg);
        solver.decode().unwrap();
        assert!(matches!(solver.render(), Err(Error::Render(_))));
    }

    struct FailingBulk;

    impl Decoder for FailingBulk {
        fn name(&self) -> &str {
            "failing-bulk"
        }
        fn open(&mut self, _source: &str) -> crate::error::Result<()> {
            Ok(())
        }
        fn close(&mut self) -> crate::error::Result<()> {
            Ok(())
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                bulk: true,
                post: true,
                ..Capabilities::default()
            }
        }
        fn decode_one(
            &mut self,
            _data: &[u8],
            _pos: &TilePosition,
            _fmt: &TileFormat,
            _remain_index: bool,
        ) -> crate::error::Result<Pixel> {
            Ok(Pixel::default())
        }
        fn decode_all(
            &mut self,
            _data: &[u8],
            _fmt: &TileFormat,
            _remain_index: bool,
        ) -> crate::error::Result<Vec<Pixel>> {
            Err(Error::Fail("bad stream".into()))
        }
        fn post(
            &mut self,
            _raw: &RawBuffer,
            cfg: &mut TileConfig,
        ) -> crate::error::Result<()> {
            // Leaves a mark the test can observe.
            cfg.nrow = 7;
            Ok(())
        }
    }

    #[test]
    fn test_bulk_failure_still_runs_post() {
        let cfg = TileConfig {
            fmt: TileFormat::new(2, 2, 8),
            ..TileConfig::default()
        };
        let mut solver = solver_with_raw(vec![0u8; 8], cfg);
        solver
            .registry_mut()
            .register_builtin("failing-bulk", || Box::new(FailingBulk));
        solver.select_plugin("failing-bulk").unwrap();
        assert!(matches!(solver.decode(), Err(Error::Fail(_))));
        // The post hook ran and its config edit was committed.
        assert_eq!(solver.config().nrow, 7);
    }

    #[test]
    fn test_render_without_tiles() {
        let mut solver = TileSolver::new();
        assert!(matches!(solver.render(), Err(Error::Render(_))));
    }
}
