//! Native decoder modules loaded with libloading.
//!
//! A module is resolved through its exported `decoder` static first, then a
//! `get_decoder` factory. The loaded library stays alive for as long as the
//! decoder instance; the descriptor's `context` pointer is owned by the
//! module between `open` and `close` and only ever passed back unmodified.

use super::abi::{GetDecoderFn, TileDecoderAbi, ABI_VERSION};
use super::{Capabilities, Decoder, RawBuffer};
use crate::error::{Error, Result, Status};
use crate::tile::{Pixel, TileConfig, TileFormat, TilePosition};
use libloading::Library;
use std::ffi::CString;
use std::path::Path;

/// A decoder backed by a platform loadable module.
pub struct NativeDecoder {
    /// The loaded library (kept alive for the descriptor's lifetime).
    _library: Library,
    /// Descriptor inside the module; valid while `_library` is loaded.
    abi: *mut TileDecoderAbi,
    name: String,
    message: String,
    opened: bool,
}

impl NativeDecoder {
    /// Load a module and validate its descriptor.
    ///
    /// # Safety
    ///
    /// Loading executes arbitrary code from the module; the module must be
    /// trusted and properly implement the decoder ABI.
    pub unsafe fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        // SAFETY: caller guarantees the module is trusted.
        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::Open(format!("{name}: load failed: {e}")))?;

        // SAFETY: symbol lookup in the library just loaded. A `decoder`
        // data symbol is the descriptor itself; the fallback factory
        // returns a pointer to one.
        let abi: *mut TileDecoderAbi = unsafe {
            if let Ok(sym) = library.get::<*mut TileDecoderAbi>(b"decoder\0") {
                *sym
            } else if let Ok(factory) = library.get::<GetDecoderFn>(b"get_decoder\0") {
                factory()
            } else {
                return Err(Error::Open(format!(
                    "{name}: no decoder symbol or get_decoder factory"
                )));
            }
        };
        if abi.is_null() {
            return Err(Error::Open(format!("{name}: null decoder descriptor")));
        }

        // SAFETY: non-null descriptor from the module; validated before use.
        let table = unsafe { &*abi };
        table.validate().map_err(Error::Format)?;
        if table.version > ABI_VERSION {
            return Err(Error::Format(format!(
                "{name}: module requires host version {}, this host is {ABI_VERSION}",
                table.version
            )));
        }

        Ok(Self {
            _library: library,
            abi,
            name,
            message: String::new(),
            opened: false,
        })
    }

    fn table(&self) -> &TileDecoderAbi {
        // SAFETY: abi was validated non-null at load and the library is
        // still loaded.
        unsafe { &*self.abi }
    }

    fn pull_message(&mut self) {
        // SAFETY: msg is decoder-owned and NUL-terminated per the ABI.
        let msg = unsafe { self.table().message() };
        if !msg.is_empty() {
            self.message = msg;
        }
    }

    fn check(&mut self, raw: i32, what: &str) -> Result<()> {
        self.pull_message();
        let status = Status::from_raw(raw);
        if status.is_ok() {
            Ok(())
        } else {
            Err(status.into_error(&format!("{}: {what}: {}", self.name, self.message)))
        }
    }
}

impl Decoder for NativeDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, source: &str) -> Result<()> {
        let open = self.table().open.ok_or_else(|| {
            Error::Callback(format!("{}: missing open entry point", self.name))
        })?;
        let name = CString::new(source).unwrap_or_default();
        let mut context = self.table().context;
        // SAFETY: entry point validated at load; context out-pointer is
        // local and the name string outlives the call.
        let raw = unsafe { open(name.as_ptr(), &mut context) };
        // SAFETY: the module owns context between open and close.
        unsafe { (*self.abi).context = context };
        self.check(raw, "open")?;
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        let close = self.table().close.ok_or_else(|| {
            Error::Callback(format!("{}: missing close entry point", self.name))
        })?;
        // SAFETY: entry point validated at load; context is the one the
        // module handed out at open.
        let raw = unsafe { close(self.table().context) };
        self.check(raw, "close")
    }

    fn capabilities(&self) -> Capabilities {
        let t = self.table();
        Capabilities {
            bulk: t.decode_all.is_some(),
            pre: t.pre.is_some(),
            post: t.post.is_some(),
            send_ui: t.send_ui.is_some(),
            recv_ui: t.recv_ui.is_some(),
        }
    }

    fn decode_one(
        &mut self,
        data: &[u8],
        pos: &TilePosition,
        fmt: &TileFormat,
        remain_index: bool,
    ) -> Result<Pixel> {
        let decode = self.table().decode_one.ok_or_else(|| {
            Error::Callback(format!("{}: missing decode_one entry point", self.name))
        })?;
        let mut pixel = Pixel::default();
        // SAFETY: all pointers are derived from live references for the
        // duration of the call.
        let raw = unsafe {
            decode(
                self.table().context,
                data.as_ptr(),
                data.len(),
                pos,
                fmt,
                &mut pixel,
                remain_index,
            )
        };
        self.check(raw, "decode_one")?;
        Ok(pixel)
    }

    fn decode_all(&mut self, data: &[u8], fmt: &TileFormat, remain_index: bool) -> Result<Vec<Pixel>> {
        let decode = self.table().decode_all.ok_or_else(|| {
            Error::Callback(format!("{}: no bulk decode entry point", self.name))
        })?;
        let mut pixels: *const Pixel = std::ptr::null();
        let mut npixel: usize = 0;
        // SAFETY: out-pointers are local; the module owns the returned
        // buffer, which stays valid until the next module call.
        let raw = unsafe {
            decode(
                self.table().context,
                data.as_ptr(),
                data.len(),
                fmt,
                &mut pixels,
                &mut npixel,
                remain_index,
            )
        };
        self.check(raw, "decode_all")?;
        if pixels.is_null() || npixel == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: the module reported npixel valid pixels at this pointer;
        // copy them out so the host owns its buffer.
        Ok(unsafe { std::slice::from_raw_parts(pixels, npixel) }.to_vec())
    }

    fn pre(&mut self, raw_data: &RawBuffer, cfg: &mut TileConfig) -> Result<()> {
        let pre = self.table().pre.ok_or_else(|| {
            Error::Callback(format!("{}: no pre entry point", self.name))
        })?;
        // SAFETY: cfg is a live exclusive reference for the call.
        let raw = unsafe { pre(self.table().context, raw_data.as_ptr(), raw_data.len(), cfg) };
        self.check(raw, "pre")
    }

    fn post(&mut self, raw_data: &RawBuffer, cfg: &mut TileConfig) -> Result<()> {
        let post = self.table().post.ok_or_else(|| {
            Error::Callback(format!("{}: no post entry point", self.name))
        })?;
        // SAFETY: cfg is a live exclusive reference for the call.
        let raw = unsafe { post(self.table().context, raw_data.as_ptr(), raw_data.len(), cfg) };
        self.check(raw, "post")
    }

    fn send_ui_schema(&mut self) -> Result<String> {
        let send = self.table().send_ui.ok_or_else(|| {
            Error::Callback(format!("{}: no send_ui entry point", self.name))
        })?;
        let mut buf: *const std::ffi::c_char = std::ptr::null();
        let mut bufsize: usize = 0;
        // SAFETY: out-pointers are local; the module owns the buffer.
        let raw = unsafe { send(self.table().context, &mut buf, &mut bufsize) };
        self.check(raw, "send_ui")?;
        if buf.is_null() || bufsize == 0 {
            return Ok(String::new());
        }
        // SAFETY: the module reported bufsize valid bytes at this pointer.
        let bytes = unsafe { std::slice::from_raw_parts(buf as *const u8, bufsize) };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn receive_ui_values(&mut self, text: &str) -> Result<()> {
        let recv = self.table().recv_ui.ok_or_else(|| {
            Error::Callback(format!("{}: no recv_ui entry point", self.name))
        })?;
        // SAFETY: the text buffer outlives the call; length is passed
        // explicitly so no NUL terminator is required.
        let raw = unsafe {
            recv(
                self.table().context,
                text.as_ptr() as *const std::ffi::c_char,
                text.len(),
            )
        };
        self.check(raw, "recv_ui")
    }

    fn take_message(&mut self) -> String {
        std::mem::take(&mut self.message)
    }
}

impl Drop for NativeDecoder {
    fn drop(&mut self) {
        // Backstop only; the registry closes before dropping.
        let _ = self.close();
    }
}

impl std::fmt::Debug for NativeDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDecoder")
            .field("name", &self.name)
            .field("opened", &self.opened)
            .finish()
    }
}
