//! The built-in codec-backed decoder.
//!
//! Wraps [`crate::codec`] behind the [`Decoder`] contract and publishes the
//! codec transform options as a config exchange document so the
//! configuration surface can drive endianness, flips and channel order
//! without knowing the codec.

use super::{Capabilities, Decoder};
use crate::codec::{decode_pixel, CodecOptions};
use crate::config::{ConfigDoc, ConfigRecord};
use crate::error::Result;
use crate::tile::{Pixel, TileFormat, TilePosition};

/// Name the registry resolves to this decoder.
pub const BUILTIN_NAME: &str = "default";

/// Stateless per-pixel decoder for the standard bit depths.
#[derive(Debug, Default)]
pub struct BuiltinDecoder {
    opts: CodecOptions,
    message: String,
}

impl BuiltinDecoder {
    /// Create a decoder with default codec options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current codec options.
    pub fn options(&self) -> &CodecOptions {
        &self.opts
    }
}

impl Decoder for BuiltinDecoder {
    fn name(&self) -> &str {
        BUILTIN_NAME
    }

    fn open(&mut self, source: &str) -> Result<()> {
        self.message = format!("[builtin::open] {source}");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.opts = CodecOptions::default();
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            send_ui: true,
            recv_ui: true,
            ..Capabilities::default()
        }
    }

    fn decode_one(
        &mut self,
        data: &[u8],
        pos: &TilePosition,
        fmt: &TileFormat,
        remain_index: bool,
    ) -> Result<Pixel> {
        decode_pixel(data, pos, fmt, remain_index, &self.opts)
    }

    fn send_ui_schema(&mut self) -> Result<String> {
        let doc = ConfigDoc::new(vec![
            ConfigRecord::bool("big_endian", "reverse packed bit order", self.opts.big_endian),
            ConfigRecord::bool("flip_x", "mirror tiles horizontally", self.opts.flip_x),
            ConfigRecord::bool("flip_y", "mirror tiles vertically", self.opts.flip_y),
            ConfigRecord::bool("swap_rb", "swap red and blue channels", self.opts.swap_rb),
            ConfigRecord::bool("alpha_first", "alpha is the first packed byte", self.opts.alpha_first),
        ]);
        doc.to_text()
    }

    fn receive_ui_values(&mut self, text: &str) -> Result<()> {
        let doc = ConfigDoc::from_text(text)?;
        let mut applied = 0usize;
        let mut apply = |name: &str, slot: &mut bool| {
            if let Some(v) = doc.get(name).and_then(ConfigRecord::as_bool) {
                *slot = v;
                applied += 1;
            }
        };
        apply("big_endian", &mut self.opts.big_endian);
        apply("flip_x", &mut self.opts.flip_x);
        apply("flip_y", &mut self.opts.flip_y);
        apply("swap_rb", &mut self.opts.swap_rb);
        apply("alpha_first", &mut self.opts.alpha_first);
        self.message = format!("[builtin::recvui] applied {applied} values");
        Ok(())
    }

    fn take_message(&mut self) -> String {
        std::mem::take(&mut self.message)
    }
}
