//! Built-in codec plugins.
//!
//! TARGA and serial are implemented here from scratch; JPEG and PNG adapt
//! the `jpeg-decoder` and `png` crates to the incremental contract.

pub mod serial;

#[cfg(feature = "targa")]
pub mod targa;

#[cfg(feature = "jpeg")]
pub mod jpeg;

#[cfg(feature = "png")]
pub mod png;

pub use serial::SerialCodec;

#[cfg(feature = "targa")]
pub use targa::TargaCodec;

#[cfg(feature = "jpeg")]
pub use jpeg::JpegCodec;

#[cfg(feature = "png")]
pub use self::png::PngCodec;
