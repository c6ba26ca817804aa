//! The C-compatible capability table native decoder modules export.
//!
//! A module exposes either a `decoder` static of this struct or a
//! `get_decoder` factory returning a pointer to one. The design prioritizes
//! fail-closed validation: version and struct size are negotiated before any
//! entry point runs.

use crate::tile::{Pixel, TileConfig, TileFormat, TilePosition};
use std::ffi::{c_char, c_void, CStr};

/// Host ABI version, packed release number (v0.3.4 = 340).
pub const ABI_VERSION: u32 = 340;

/// Raw status code crossing the ABI boundary.
pub type RawStatus = i32;

/// Open the decoder. `name` is a display name (built-in/native) and the
/// returned context is owned by the decoder until `close`.
pub type OpenFn = unsafe extern "C" fn(name: *const c_char, context: *mut *mut c_void) -> RawStatus;

/// Close the decoder and release its context.
pub type CloseFn = unsafe extern "C" fn(context: *mut c_void) -> RawStatus;

/// Decode one pixel into `pixel`.
pub type DecodeOneFn = unsafe extern "C" fn(
    context: *mut c_void,
    data: *const u8,
    datasize: usize,
    pos: *const TilePosition,
    fmt: *const TileFormat,
    pixel: *mut Pixel,
    remain_index: bool,
) -> RawStatus;

/// Decode all pixels; the module owns the returned buffer until the next
/// call or `close`.
pub type DecodeAllFn = unsafe extern "C" fn(
    context: *mut c_void,
    data: *const u8,
    datasize: usize,
    fmt: *const TileFormat,
    pixels: *mut *const Pixel,
    npixel: *mut usize,
    remain_index: bool,
) -> RawStatus;

/// Pre/post hook; may mutate the tile configuration.
pub type ParseFn = unsafe extern "C" fn(
    context: *mut c_void,
    rawdata: *const u8,
    rawsize: usize,
    cfg: *mut TileConfig,
) -> RawStatus;

/// Publish the config exchange document; the module owns the buffer.
pub type SendUiFn = unsafe extern "C" fn(
    context: *mut c_void,
    buf: *mut *const c_char,
    bufsize: *mut usize,
) -> RawStatus;

/// Receive an edited config exchange document.
pub type RecvUiFn =
    unsafe extern "C" fn(context: *mut c_void, buf: *const c_char, bufsize: usize) -> RawStatus;

/// Factory entry point modules may export instead of a `decoder` static.
pub type GetDecoderFn = unsafe extern "C" fn() -> *mut TileDecoderAbi;

/// Fixed-layout decoder capability table.
///
/// `context` is exclusively owned by the decoder between `open` and `close`;
/// the host passes it back unmodified and never inspects it. `msg` is a
/// decoder-owned diagnostic string, reset on each call.
#[repr(C)]
pub struct TileDecoderAbi {
    /// Required host version, packed (see [`ABI_VERSION`]).
    pub version: u32,
    /// `size_of` this struct as the module compiled it.
    pub size: u32,
    /// Opaque decoder context.
    pub context: *mut c_void,
    /// Diagnostic message, NUL-terminated; may be null.
    pub msg: *const c_char,
    /// Required.
    pub open: Option<OpenFn>,
    /// Required.
    pub close: Option<CloseFn>,
    /// Required.
    pub decode_one: Option<DecodeOneFn>,
    /// Optional bulk decode.
    pub decode_all: Option<DecodeAllFn>,
    /// Optional pre-decode hook.
    pub pre: Option<ParseFn>,
    /// Optional post-decode hook.
    pub post: Option<ParseFn>,
    /// Optional config publication.
    pub send_ui: Option<SendUiFn>,
    /// Optional config reception.
    pub recv_ui: Option<RecvUiFn>,
}

impl TileDecoderAbi {
    /// Validate the table before first use.
    ///
    /// A struct-size mismatch means the module was compiled against a
    /// different table layout; the host must fail closed rather than guess
    /// at field offsets.
    pub fn validate(&self) -> Result<(), String> {
        let expected = std::mem::size_of::<TileDecoderAbi>() as u32;
        if self.size != expected {
            return Err(format!(
                "descriptor size {} does not match expected {expected}",
                self.size
            ));
        }
        if self.open.is_none() {
            return Err("missing required open entry point".into());
        }
        if self.close.is_none() {
            return Err("missing required close entry point".into());
        }
        if self.decode_one.is_none() {
            return Err("missing required decode_one entry point".into());
        }
        Ok(())
    }

    /// Read the diagnostic message buffer.
    ///
    /// # Safety
    ///
    /// `msg`, when non-null, must point to a valid NUL-terminated string.
    pub unsafe fn message(&self) -> String {
        if self.msg.is_null() {
            return String::new();
        }
        // SAFETY: caller guarantees msg is valid and NUL-terminated.
        unsafe { CStr::from_ptr(self.msg) }
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_table() -> TileDecoderAbi {
        TileDecoderAbi {
            version: ABI_VERSION,
            size: std::mem::size_of::<TileDecoderAbi>() as u32,
            context: std::ptr::null_mut(),
            msg: std::ptr::null(),
            open: None,
            close: None,
            decode_one: None,
            decode_all: None,
            pre: None,
            post: None,
            send_ui: None,
            recv_ui: None,
        }
    }

    #[test]
    fn test_size_mismatch_fails_closed() {
        let mut table = empty_table();
        table.size -= 4;
        assert!(table.validate().unwrap_err().contains("size"));
        let mut table = empty_table();
        table.size += 8;
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_missing_required_entry_points() {
        let table = empty_table();
        assert!(table.validate().unwrap_err().contains("open"));
    }

    #[test]
    fn test_null_message_reads_empty() {
        let table = empty_table();
        // SAFETY: msg is null, which message() handles.
        assert_eq!(unsafe { table.message() }, "");
    }

    #[test]
    fn test_abi_types_cross_boundary_unchanged() {
        // the data model structs are #[repr(C)] and pointer-free
        assert_eq!(std::mem::size_of::<Pixel>(), 4);
        assert_eq!(std::mem::size_of::<TilePosition>(), 12);
    }
}
