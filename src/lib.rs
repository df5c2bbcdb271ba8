//! # surfcodecs
//!
//! Incremental image codecs decoding into packed 32-bit pixel surfaces.
//!
//! Every codec speaks one contract ([`Codec`]): a one-shot `load`/`save` and
//! an incremental `load_start` / `load_increment` / `load_finish` triple that
//! accepts bytes in pieces of any size and never blocks. The TARGA and raw
//! "serial" codecs are implemented here; JPEG and PNG adapt `jpeg-decoder`
//! and `png`. Each optional codec is feature-gated:
//!
//! ```toml
//! [dependencies]
//! surfcodecs = { version = "0.1", default-features = false, features = ["targa", "png"] }
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use surfcodecs::{DecodeRequest, EncodeRequest, ImageFormat};
//!
//! let file = std::fs::File::open("input.tga")?;
//! let decoded = DecodeRequest::new(file)
//!     .with_filename("input.tga")
//!     .decode()?;
//!
//! let png = EncodeRequest::new(ImageFormat::Png).encode_to_vec(&decoded.surface)?;
//! std::fs::write("output.png", png)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Bytes can also be pushed as they arrive, e.g. from a socket:
//!
//! ```rust
//! use surfcodecs::codecs::SerialCodec;
//! use surfcodecs::loader::Loader;
//! use surfcodecs::{CodecRegistry, Surface, SurfaceFormat};
//!
//! let bytes = SerialCodec::encode_to_vec(&Surface::new(SurfaceFormat::A8, 8, 8)?)?;
//!
//! let mut registry = CodecRegistry::all();
//! let codec = registry.decoder_for_mime("application/octet-stream")?;
//! let mut loader = Loader::new(codec);
//! loader.start()?;
//! for packet in bytes.chunks(13) {
//!     loader.push(packet)?;
//! }
//! let surface = loader.finish()?;
//! assert_eq!(surface.width(), 8);
//! # Ok::<(), surfcodecs::CodecError>(())
//! ```

#![forbid(unsafe_code)]

mod error;
mod format;

pub mod codec;
pub mod codecs;
pub mod config;
pub mod decode;
pub mod encode;
pub mod limits;
pub mod loader;
pub mod pixel;
pub mod probe;
pub mod registry;
pub mod surface;

pub use codec::{Codec, CodecContext, CodecCore, DecodePhase};
pub use config::CodecConfig;
pub use decode::{DecodeOutput, DecodeRequest, load_file};
pub use encode::{EncodeRequest, save_file};
pub use error::{CodecError, ErrorKind};
pub use format::ImageFormat;
pub use limits::{CancelToken, Limits, Stop, Unstoppable};
pub use loader::{Loader, LoaderState, PassEvent};
pub use probe::{ProbeResult, guess_format, guess_mime};
pub use registry::{BuiltinCodecFactory, CodecFactory, CodecRegistry};
pub use surface::{Content, ImageSurfaceFactory, Surface, SurfaceFactory, SurfaceFormat};
