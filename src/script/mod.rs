//! Embedded script decoders on the `rhai` engine.
//!
//! Each load gets a fresh engine, compiled AST, and scope, so no state leaks
//! across loads. The script talks back through the capability bindings in
//! [`api`] and the scratch allocator in [`memory`]; entry points are
//! discovered from the AST at open time and absent optional ones simply
//! disable the matching capability.

pub mod api;
pub mod memory;

use crate::decoder::{Capabilities, Decoder, RawBuffer};
use crate::error::{Error, Result};
use crate::tile::{Pixel, TileConfig, TileFormat, TilePosition};
use api::SharedIo;
use rhai::{Array, Blob, Dynamic, Engine, EvalAltResult, Scope, AST};

const FN_DECODE_PIXEL: &str = "decode_pixel";
const FN_DECODE_PIXELS: &str = "decode_pixels";
const FN_DECODE_PRE: &str = "decode_pre";
const FN_DECODE_POST: &str = "decode_post";
const FN_DECODE_SENDUI: &str = "decode_sendui";
const FN_DECODE_RECVUI: &str = "decode_recvui";

/// A decoder implemented as a rhai script.
pub struct ScriptDecoder {
    name: String,
    engine: Engine,
    ast: Option<AST>,
    scope: Scope<'static>,
    io: SharedIo,
    caps: Capabilities,
}

impl ScriptDecoder {
    pub fn new(name: impl Into<String>) -> Self {
        let mut engine = Engine::new();
        let io = SharedIo::default();
        api::register(&mut engine, &io);
        Self {
            name: name.into(),
            engine,
            ast: None,
            scope: Scope::new(),
            io,
            caps: Capabilities::default(),
        }
    }

    fn ast(&self) -> Result<&AST> {
        self.ast
            .as_ref()
            .ok_or_else(|| Error::Callback(format!("{}: script not opened", self.name)))
    }

    fn map_call_error(&self, what: &str, err: Box<EvalAltResult>) -> Error {
        match *err {
            EvalAltResult::ErrorFunctionNotFound(name, _) => {
                Error::Callback(format!("{}: missing entry point {name}", self.name))
            }
            other => Error::Script(format!("{}: {what}: {other}", self.name)),
        }
    }

    fn has_fn(ast: &AST, name: &str) -> bool {
        ast.iter_functions().any(|f| f.name == name)
    }

    fn call(&mut self, what: &str, args: impl rhai::FuncArgs) -> Result<Dynamic> {
        let ast = self
            .ast
            .take()
            .ok_or_else(|| Error::Callback(format!("{}: script not opened", self.name)))?;
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut self.scope, &ast, what, args)
            .map_err(|e| self.map_call_error(what, e));
        self.ast = Some(ast);
        result
    }

    fn call_int(&mut self, what: &str, args: impl rhai::FuncArgs) -> Result<i64> {
        self.call(what, args)?.as_int().map_err(|actual| {
            Error::Script(format!(
                "{}: {what} returned {actual}, expected an integer",
                self.name
            ))
        })
    }

    fn call_bool(&mut self, what: &str, args: impl rhai::FuncArgs) -> Result<bool> {
        self.call(what, args)?.as_bool().map_err(|actual| {
            Error::Script(format!(
                "{}: {what} returned {actual}, expected a boolean",
                self.name
            ))
        })
    }

    /// Decompose a `decode_pixels` result array into host pixels.
    ///
    /// The script returns `[buf, npixel, offset]` where `buf` is a blob or a
    /// scratch handle; pixels are 32-bit little-endian words starting at
    /// `offset` bytes into the buffer.
    fn pixels_from_result(&self, result: Array) -> Result<Vec<Pixel>> {
        let fail = |why: &str| Error::Script(format!("{}: decode_pixels: {why}", self.name));
        if result.len() < 2 {
            return Err(fail("expected [buf, npixel, offset]"));
        }
        let npixel = result[1]
            .as_int()
            .map_err(|_| fail("npixel is not an integer"))?;
        let offset = if result.len() > 2 {
            result[2].as_int().map_err(|_| fail("offset is not an integer"))?
        } else {
            0
        };
        if npixel < 0 || offset < 0 {
            return Err(fail("npixel and offset must not be negative"));
        }
        let (npixel, offset) = (npixel as usize, offset as usize);
        let buf = result[0].clone();
        let bytes: Blob = if let Some(blob) = buf.clone().try_cast::<Blob>() {
            blob
        } else if let Ok(handle) = buf.as_int() {
            let io = self.io.borrow();
            let size = io.arena.size(handle);
            io.arena.read(handle, 0, size)
        } else {
            return Err(fail("buf is neither a blob nor a scratch handle"));
        };
        let needed = npixel
            .checked_mul(4)
            .and_then(|n| n.checked_add(offset))
            .ok_or_else(|| fail("pixel count overflows the buffer range"))?;
        if needed > bytes.len() {
            return Err(Error::Range {
                offset,
                needed: npixel * 4,
                size: bytes.len(),
            });
        }
        Ok(bytes[offset..needed]
            .chunks_exact(4)
            .map(|c| Pixel::from_index(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect())
    }
}

impl Decoder for ScriptDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    /// Compile and evaluate the script. `source` is the script text itself.
    fn open(&mut self, source: &str) -> Result<()> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| Error::Script(format!("{}: parse: {e}", self.name)))?;
        self.scope = Scope::new();
        self.engine
            .run_ast_with_scope(&mut self.scope, &ast)
            .map_err(|e| Error::Script(format!("{}: eval: {e}", self.name)))?;
        self.caps = Capabilities {
            bulk: Self::has_fn(&ast, FN_DECODE_PIXELS),
            // The host always binds the raw buffer in pre, so the stage runs
            // whether or not the script hooks it.
            pre: true,
            post: Self::has_fn(&ast, FN_DECODE_POST),
            send_ui: Self::has_fn(&ast, FN_DECODE_SENDUI),
            recv_ui: Self::has_fn(&ast, FN_DECODE_RECVUI),
        };
        self.ast = Some(ast);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ast = None;
        self.scope = Scope::new();
        self.caps = Capabilities::default();
        let mut io = self.io.borrow_mut();
        io.arena.clear();
        io.raw = RawBuffer::default();
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Scripts address the raw buffer through `get_rawdata`, so the host
    /// window is not passed down.
    fn decode_one(
        &mut self,
        _data: &[u8],
        pos: &TilePosition,
        _fmt: &TileFormat,
        _remain_index: bool,
    ) -> Result<Pixel> {
        let index = self.call_int(
            FN_DECODE_PIXEL,
            (pos.i as i64, pos.x as i64, pos.y as i64),
        )?;
        Ok(Pixel::from_index(index as u32))
    }

    fn decode_all(&mut self, _data: &[u8], _fmt: &TileFormat, _remain_index: bool) -> Result<Vec<Pixel>> {
        let result = self
            .call(FN_DECODE_PIXELS, ())?
            .try_cast::<Array>()
            .ok_or_else(|| {
                Error::Script(format!(
                    "{}: decode_pixels must return [buf, npixel, offset]",
                    self.name
                ))
            })?;
        self.pixels_from_result(result)
    }

    fn pre(&mut self, raw: &RawBuffer, cfg: &mut TileConfig) -> Result<()> {
        // Bind the raw buffer before anything in the script can run.
        {
            let mut io = self.io.borrow_mut();
            io.raw = raw.clone();
            io.view.cfg = *cfg;
        }
        if cfg.start as usize > raw.len() {
            return Err(Error::Range {
                offset: cfg.start as usize,
                needed: 0,
                size: raw.len(),
            });
        }
        if Self::has_fn(self.ast()?, FN_DECODE_PRE) {
            let ok = self.call_bool(FN_DECODE_PRE, ())?;
            if !ok {
                return Err(Error::Fail(format!("{}: decode_pre rejected", self.name)));
            }
        }
        *cfg = self.io.borrow().view.cfg;
        Ok(())
    }

    fn post(&mut self, _raw: &RawBuffer, cfg: &mut TileConfig) -> Result<()> {
        self.io.borrow_mut().view.cfg = *cfg;
        if Self::has_fn(self.ast()?, FN_DECODE_POST) {
            let ok = self.call_bool(FN_DECODE_POST, ())?;
            if !ok {
                return Err(Error::Fail(format!("{}: decode_post rejected", self.name)));
            }
        }
        *cfg = self.io.borrow().view.cfg;
        Ok(())
    }

    fn send_ui_schema(&mut self) -> Result<String> {
        if !self.caps.send_ui {
            return Ok(String::new());
        }
        self.call(FN_DECODE_SENDUI, ())?.into_string().map_err(|actual| {
            Error::Script(format!(
                "{}: decode_sendui returned {actual}, expected a string",
                self.name
            ))
        })
    }

    fn receive_ui_values(&mut self, text: &str) -> Result<()> {
        if !self.caps.recv_ui {
            return Ok(());
        }
        let ok = self.call_bool(FN_DECODE_RECVUI, (text.to_string(),))?;
        if !ok {
            return Err(Error::Fail(format!("{}: decode_recvui rejected", self.name)));
        }
        Ok(())
    }

    fn take_message(&mut self) -> String {
        std::mem::take(&mut self.io.borrow_mut().message)
    }
}

impl std::fmt::Debug for ScriptDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptDecoder")
            .field("name", &self.name)
            .field("opened", &self.ast.is_some())
            .field("caps", &self.caps)
            .finish()
    }
}
