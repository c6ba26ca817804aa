//! Plugin registry: resolves decoder identifiers and owns the active decoder.
//!
//! Identifier resolution order: registered built-in name, `.rhai` script
//! path, platform dynamic library path. At most one decoder is active; the
//! previous one is closed exactly once before its replacement opens, and a
//! failed open leaves the registry with no active decoder rather than a
//! half-initialized one.

use crate::decoder::{BuiltinDecoder, Decoder, NativeDecoder, BUILTIN_NAME};
use crate::error::{Error, Result};
use crate::script::ScriptDecoder;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

type DecoderFactory = Box<dyn Fn() -> Box<dyn Decoder>>;

pub struct PluginRegistry {
    builtins: HashMap<String, DecoderFactory>,
    active: Option<Box<dyn Decoder>>,
    active_id: Option<String>,
}

impl PluginRegistry {
    /// Registry with the built-in decoder preinstalled.
    pub fn new() -> Self {
        let mut registry = Self {
            builtins: HashMap::new(),
            active: None,
            active_id: None,
        };
        registry.register_builtin(BUILTIN_NAME, || Box::new(BuiltinDecoder::new()));
        registry
    }

    pub fn register_builtin(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Decoder> + 'static,
    ) {
        self.builtins.insert(name.into(), Box::new(factory));
    }

    pub fn active(&self) -> Option<&dyn Decoder> {
        self.active.as_deref()
    }

    pub fn active_mut(&mut self) -> Option<&mut Box<dyn Decoder>> {
        self.active.as_mut()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Switch to the decoder named by `identifier`.
    ///
    /// The current decoder, if any, is closed before the new one opens. When
    /// resolution or open fails, no decoder is active afterwards.
    pub fn select(&mut self, identifier: &str) -> Result<()> {
        self.close_active();
        let (mut decoder, open_arg) = self.instantiate(identifier)?;
        decoder.open(&open_arg)?;
        tracing::info!(plugin = identifier, "decoder opened");
        self.active = Some(decoder);
        self.active_id = Some(identifier.to_string());
        Ok(())
    }

    /// Close the active decoder, if any. A close failure is logged, not
    /// propagated; the slot is vacated either way.
    pub fn close_active(&mut self) {
        if let Some(mut old) = self.active.take() {
            let id = self.active_id.take().unwrap_or_default();
            if let Err(e) = old.close() {
                tracing::warn!(plugin = %id, "close failed: {e}");
            } else {
                tracing::info!(plugin = %id, "decoder closed");
            }
        }
    }

    /// JSON sidecar path for a file-based plugin. Built-ins have none.
    pub fn sidecar_path(&self, identifier: &str) -> Option<PathBuf> {
        if self.builtins.contains_key(identifier) {
            return None;
        }
        Some(Path::new(identifier).with_extension("json"))
    }

    fn instantiate(&self, identifier: &str) -> Result<(Box<dyn Decoder>, String)> {
        if let Some(factory) = self.builtins.get(identifier) {
            return Ok((factory(), identifier.to_string()));
        }
        let path = Path::new(identifier);
        let stem = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| identifier.to_string());
        match path.extension().and_then(OsStr::to_str) {
            Some("rhai") => {
                let source = std::fs::read_to_string(path)?;
                Ok((Box::new(ScriptDecoder::new(stem)), source))
            }
            Some(ext) if ext == std::env::consts::DLL_EXTENSION => {
                // SAFETY: the user explicitly named this module on the
                // command line; loading it is the requested operation.
                let decoder = unsafe { NativeDecoder::load(path) }?;
                Ok((Box::new(decoder), stem))
            }
            _ => Err(Error::Open(format!(
                "no such plugin: {identifier} (not a built-in, .rhai script, or native module)"
            ))),
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
