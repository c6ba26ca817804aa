//! Error types for tilescope.

use thiserror::Error;

/// Result type alias using tilescope's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for decode operations.
///
/// The variants mirror the plugin ABI status codes (see [`Status`]) plus the
/// host-side failures that never cross the ABI boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Plugin file missing, unreadable, or exposing no decoder symbol.
    #[error("open error: {0}")]
    Open(String),

    /// Script failed to parse or execute at load time.
    #[error("script error: {0}")]
    Script(String),

    /// A decode entry point is absent or refused the call.
    #[error("callback error: {0}")]
    Callback(String),

    /// ABI or struct-size mismatch with a native module.
    #[error("format error: {0}")]
    Format(String),

    /// Computed byte offset exceeds the data bounds.
    #[error("range error: offset {offset} + {needed} exceeds data size {size}")]
    Range {
        /// Byte offset that was computed for the pixel.
        offset: usize,
        /// Bytes the decode would have read at that offset.
        needed: usize,
        /// Total size of the data buffer.
        size: usize,
    },

    /// Generic decoder-reported failure (e.g. "not a recognized file").
    #[error("decoder failure: {0}")]
    Fail(String),

    /// A status code the host does not recognize.
    #[error("unknown decoder status {0}")]
    Unknown(i32),

    /// The rendered image would exceed platform limits.
    #[error("render error: {0}")]
    Render(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config exchange (de)serialization error.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Output image encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Status codes shared with the native plugin ABI.
///
/// Raw values outside the table map to [`Status::Unknown`] rather than
/// failing the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Success.
    Ok,
    /// Generic failure.
    Fail,
    /// Opening the decoder failed.
    OpenError,
    /// Parsing the decoder script failed.
    ScriptError,
    /// A decode callback was not found.
    CallbackError,
    /// Target format error (ABI mismatch).
    FormatError,
    /// Pixel or index out of range.
    RangeError,
    /// Unmapped status value.
    Unknown,
}

impl Status {
    /// Convert a raw ABI status code, mapping unknown values to `Unknown`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Status::Ok,
            1 => Status::Fail,
            2 => Status::OpenError,
            3 => Status::ScriptError,
            4 => Status::CallbackError,
            5 => Status::FormatError,
            6 => Status::RangeError,
            _ => Status::Unknown,
        }
    }

    /// The raw ABI value of this status.
    pub fn as_raw(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Fail => 1,
            Status::OpenError => 2,
            Status::ScriptError => 3,
            Status::CallbackError => 4,
            Status::FormatError => 5,
            Status::RangeError => 6,
            Status::Unknown => 7,
        }
    }

    /// True when the status reports success.
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Turn a non-success status into an [`Error`], attaching the decoder's
    /// message buffer as context.
    pub fn into_error(self, context: &str) -> Error {
        match self {
            Status::Ok | Status::Fail => Error::Fail(context.to_string()),
            Status::OpenError => Error::Open(context.to_string()),
            Status::ScriptError => Error::Script(context.to_string()),
            Status::CallbackError => Error::Callback(context.to_string()),
            Status::FormatError => Error::Format(context.to_string()),
            Status::RangeError => Error::Range {
                offset: 0,
                needed: 0,
                size: 0,
            },
            Status::Unknown => Error::Unknown(self.as_raw()),
        }
    }
}

impl Error {
    /// The ABI status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Error::Open(_) | Error::Io(_) => Status::OpenError,
            Error::Script(_) => Status::ScriptError,
            Error::Callback(_) => Status::CallbackError,
            Error::Format(_) => Status::FormatError,
            Error::Range { .. } => Status::RangeError,
            Error::Fail(_) | Error::Render(_) | Error::Config(_) | Error::Image(_) => Status::Fail,
            Error::Unknown(_) => Status::Unknown,
        }
    }
}
