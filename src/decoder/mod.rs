//! The decoder contract shared by built-in, native-module and script
//! decoders.
//!
//! The registry resolves a plugin identifier to one of the three kinds once;
//! past that point everything speaks [`Decoder`] and nothing branches on the
//! kind again. Optional entry points are advertised through
//! [`Capabilities`] so the dispatcher can skip what a decoder does not
//! implement instead of failing.

pub mod abi;
pub mod builtin;
pub mod native;

use crate::error::Result;
use crate::tile::{Pixel, TileConfig, TileFormat, TilePosition};
use std::sync::Arc;

pub use builtin::{BuiltinDecoder, BUILTIN_NAME};
pub use native::NativeDecoder;

/// The raw input buffer, shared between the dispatcher and decoder hooks.
///
/// Script decoders keep a clone alive for the duration of a pass so their
/// capability bindings can serve `get_rawdata` without copying.
pub type RawBuffer = Arc<[u8]>;

/// Optional entry points a decoder implements.
///
/// Absent capabilities degrade gracefully: bulk decode falls back to
/// per-pixel, hooks are skipped, and the config surface stays empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `decode_all` produces every pixel in one call.
    pub bulk: bool,
    /// `pre` runs before tile buffers are prepared and may rewrite the
    /// tile configuration.
    pub pre: bool,
    /// `post` runs after the decode loop.
    pub post: bool,
    /// `send_ui_schema` publishes a config exchange document.
    pub send_ui: bool,
    /// `receive_ui_values` accepts an edited config exchange document.
    pub recv_ui: bool,
}

/// A tile decoder.
///
/// Lifecycle: `open` → any number of decode passes → `close`. The registry
/// owns the instance and guarantees `close` is called exactly once before
/// the decoder is dropped or replaced.
///
/// Every call may leave diagnostic text in the message buffer; the
/// dispatcher drains it with [`Decoder::take_message`] after each call and
/// mirrors it to the log.
pub trait Decoder {
    /// Display name of the decoder.
    fn name(&self) -> &str;

    /// Open the decoder. For built-in and native decoders `source` is a
    /// display name; for script decoders it is the whole program source.
    fn open(&mut self, source: &str) -> Result<()>;

    /// Close the decoder and release its context.
    fn close(&mut self) -> Result<()>;

    /// Which optional entry points this decoder implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Decode the pixel at `pos`.
    fn decode_one(
        &mut self,
        data: &[u8],
        pos: &TilePosition,
        fmt: &TileFormat,
        remain_index: bool,
    ) -> Result<Pixel>;

    /// Decode every pixel in one call. Only invoked when
    /// [`Capabilities::bulk`] is set.
    fn decode_all(&mut self, _data: &[u8], _fmt: &TileFormat, _remain_index: bool) -> Result<Vec<Pixel>> {
        Err(crate::error::Error::Callback(format!(
            "{} has no bulk decode entry point",
            self.name()
        )))
    }

    /// Pre-decode hook; may rewrite `cfg` (e.g. geometry discovered from a
    /// file header). Only invoked when [`Capabilities::pre`] is set.
    fn pre(&mut self, _raw: &RawBuffer, _cfg: &mut TileConfig) -> Result<()> {
        Ok(())
    }

    /// Post-decode hook. Only invoked when [`Capabilities::post`] is set.
    fn post(&mut self, _raw: &RawBuffer, _cfg: &mut TileConfig) -> Result<()> {
        Ok(())
    }

    /// Publish the decoder's config exchange document.
    fn send_ui_schema(&mut self) -> Result<String> {
        Ok(String::new())
    }

    /// Receive an edited config exchange document.
    fn receive_ui_values(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Drain the diagnostic message buffer.
    fn take_message(&mut self) -> String {
        String::new()
    }
}
