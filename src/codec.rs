//! The codec plugin contract and the decode state every codec shares.
//!
//! A codec decodes either in one shot ([`Codec::load`]) or through the
//! incremental triple [`Codec::load_start`] / [`Codec::load_increment`] /
//! [`Codec::load_finish`]. The incremental path never blocks on I/O: every
//! byte arrives through `load_increment`, which may consume only part of the
//! buffer it is given. The caller then passes the remainder of the same
//! buffer again before supplying new bytes (see [`crate::loader`]).

use std::io::{Read, Write};
use std::sync::Arc;

use crate::config::CodecConfig;
use crate::error::CodecError;
use crate::format::ImageFormat;
use crate::limits::{Limits, Stop};
use crate::surface::{ImageSurfaceFactory, Surface, SurfaceFactory, SurfaceFormat};

/// Progress of one decode operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodePhase {
    /// No decode started.
    Idle,
    /// Waiting for header bytes; no surface yet.
    HeaderPending,
    /// Surface allocated, pixel data arriving.
    DecodingLines,
    /// A multi-pass stream has produced at least one full pass and keeps
    /// refining the same surface.
    ProgressiveRefining,
    /// All pixel data decoded; `load_finish` hands the surface out.
    Finished,
    /// Decoding aborted; any partial surface has been dropped.
    Failed,
}

/// Everything a codec needs from its environment.
#[derive(Clone)]
pub struct CodecContext {
    pub factory: Arc<dyn SurfaceFactory>,
    pub limits: Limits,
    pub config: CodecConfig,
}

impl Default for CodecContext {
    fn default() -> Self {
        Self {
            factory: Arc::new(ImageSurfaceFactory),
            limits: Limits::default(),
            config: CodecConfig::default(),
        }
    }
}

impl core::fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CodecContext")
            .field("limits", &self.limits)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CodecContext {
    /// Allocate output surfaces through a custom factory.
    pub fn with_factory(mut self, factory: Arc<dyn SurfaceFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Set resource limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set format-specific codec configuration.
    pub fn with_config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }
}

/// Per-instance decode state shared by all built-in codecs.
///
/// Owns the in-flight surface until [`CodecCore::finish`] hands it out.
pub struct CodecCore {
    format: ImageFormat,
    factory: Arc<dyn SurfaceFactory>,
    limits: Limits,
    phase: DecodePhase,
    consumed: u64,
    surface: Option<Surface>,
    passes: u32,
    pending_passes: u32,
}

impl CodecCore {
    pub fn new(format: ImageFormat, context: &CodecContext) -> Self {
        Self {
            format,
            factory: Arc::clone(&context.factory),
            limits: context.limits.clone(),
            phase: DecodePhase::Idle,
            consumed: 0,
            surface: None,
            passes: 0,
            pending_passes: 0,
        }
    }

    pub fn phase(&self) -> DecodePhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: DecodePhase) {
        if self.phase != phase {
            log::debug!("{}: {:?} -> {:?}", self.format.name(), self.phase, phase);
            self.phase = phase;
        }
    }

    /// Bytes consumed since the last reset.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Drop any previous decode and wait for a header.
    pub fn reset(&mut self) {
        self.surface = None;
        self.consumed = 0;
        self.passes = 0;
        self.pending_passes = 0;
        self.phase = DecodePhase::Idle;
        self.set_phase(DecodePhase::HeaderPending);
    }

    /// Fail unless a decode is in progress.
    pub fn begin_increment(&self) -> Result<(), CodecError> {
        match self.phase {
            DecodePhase::Idle => Err(CodecError::failure(
                self.format,
                "load_increment called before load_start",
            )),
            DecodePhase::Failed => Err(CodecError::failure(
                self.format,
                "load_increment called after a failed decode",
            )),
            _ => Ok(()),
        }
    }

    /// Account for a finished increment, or tear the decode down on error.
    pub fn end_increment(
        &mut self,
        result: Result<usize, CodecError>,
    ) -> Result<usize, CodecError> {
        match result {
            Ok(n) => {
                self.consumed += n as u64;
                log::trace!(
                    "{}: consumed {n} bytes ({} total)",
                    self.format.name(),
                    self.consumed
                );
                Ok(n)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Enter the failed phase, dropping any partial surface.
    pub fn fail(&mut self, error: CodecError) -> CodecError {
        log::debug!("{}: decode failed: {error}", self.format.name());
        self.surface = None;
        self.set_phase(DecodePhase::Failed);
        error
    }

    /// Ask the factory for the output surface and keep it.
    ///
    /// The factory must return exactly the requested layout and size.
    pub fn create_surface(
        &mut self,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> Result<&mut Surface, CodecError> {
        self.limits.check(format, width, height)?;
        let surface = self.factory.create(format, width, height)?;
        if surface.format() != format || surface.width() != width || surface.height() != height {
            return Err(CodecError::failure(
                self.format,
                "surface factory returned a mismatched surface",
            ));
        }
        log::debug!(
            "{}: allocated {width}x{height} {format:?} surface, stride {}",
            self.format.name(),
            surface.stride()
        );
        self.set_phase(DecodePhase::DecodingLines);
        Ok(self.surface.insert(surface))
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut Surface> {
        self.surface.as_mut()
    }

    /// Record a completed pass over the surface.
    pub fn complete_pass(&mut self) {
        self.passes += 1;
        self.pending_passes += 1;
        log::debug!("{}: pass {} complete", self.format.name(), self.passes);
    }

    /// Number of the oldest pass not yet reported, if any.
    pub fn take_pass(&mut self) -> Option<u32> {
        if self.pending_passes == 0 {
            return None;
        }
        let pass = self.passes - self.pending_passes + 1;
        self.pending_passes -= 1;
        Some(pass)
    }

    /// Hand out the finished surface.
    ///
    /// Any phase other than `Finished` is an error and leaves the codec failed.
    pub fn finish(&mut self) -> Result<Surface, CodecError> {
        match self.phase {
            DecodePhase::Finished => {}
            DecodePhase::Idle => {
                return Err(CodecError::failure(
                    self.format,
                    "load_finish called before load_start",
                ));
            }
            DecodePhase::Failed => {
                return Err(CodecError::failure(self.format, "decode failed earlier"));
            }
            _ => return Err(self.fail(CodecError::truncated(self.format))),
        }
        let surface = self
            .surface
            .take()
            .ok_or_else(|| self.fail(CodecError::truncated(self.format)))?;
        self.phase = DecodePhase::Idle;
        log::debug!(
            "{}: finished {}x{} after {} bytes",
            self.format.name(),
            surface.width(),
            surface.height(),
            self.consumed
        );
        Ok(surface)
    }
}

/// Image codec plugin.
///
/// Every operation has a default that fails with
/// [`CodecError::UnsupportedOperation`], so a codec implements only what it
/// supports. A codec instance decodes or encodes one image at a time; use
/// separate instances for concurrent work.
pub trait Codec: Send {
    /// Format this codec handles.
    fn format(&self) -> ImageFormat;

    /// MIME types this codec declares.
    fn mime_types(&self) -> &'static [&'static str] {
        self.format().mime_types()
    }

    /// Exact-match membership test against [`Codec::mime_types`].
    fn supports(&self, mime: &str) -> bool {
        self.mime_types().contains(&mime)
    }

    /// Whether the incremental load triple is implemented.
    fn can_load(&self) -> bool {
        false
    }

    /// Whether the save triple is implemented.
    fn can_save(&self) -> bool {
        false
    }

    /// Reset decode state and prepare for a new image.
    fn load_start(&mut self) -> Result<(), CodecError> {
        Err(self.unsupported("load"))
    }

    /// Feed bytes; returns how many were consumed.
    ///
    /// A count below `buf.len()` asks the caller to pass the remainder again.
    /// On error the partial surface is dropped.
    fn load_increment(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        let _ = buf;
        Err(self.unsupported("load"))
    }

    /// Complete the decode and transfer the surface to the caller.
    fn load_finish(&mut self) -> Result<Surface, CodecError> {
        Err(self.unsupported("load"))
    }

    /// Current decode phase.
    fn phase(&self) -> DecodePhase {
        DecodePhase::Idle
    }

    /// Oldest completed pass not yet reported.
    fn take_pass(&mut self) -> Option<u32> {
        None
    }

    /// Partially decoded surface, when one exists.
    fn preview(&self) -> Option<&Surface> {
        None
    }

    /// Decode a whole stream in one call.
    ///
    /// The default pumps the stream through the incremental triple.
    fn load(&mut self, reader: &mut dyn Read, stop: &dyn Stop) -> Result<Surface, CodecError> {
        if !self.can_load() {
            return Err(self.unsupported("load"));
        }
        crate::loader::load_from_reader(self, reader, stop, None)
    }

    /// Reset encode state.
    fn save_start(&mut self) -> Result<(), CodecError> {
        Err(self.unsupported("save"))
    }

    /// Encode a surface.
    fn save(
        &mut self,
        surface: &Surface,
        writer: &mut dyn Write,
        stop: &dyn Stop,
    ) -> Result<(), CodecError> {
        let _ = (surface, writer, stop);
        Err(self.unsupported("save"))
    }

    /// Flush anything buffered by [`Codec::save`].
    fn save_finish(&mut self, writer: &mut dyn Write) -> Result<(), CodecError> {
        writer.flush()?;
        Ok(())
    }

    /// Run the whole save triple.
    fn save_to(
        &mut self,
        surface: &Surface,
        writer: &mut dyn Write,
        stop: &dyn Stop,
    ) -> Result<(), CodecError> {
        self.save_start()?;
        self.save(surface, writer, stop)?;
        self.save_finish(writer)
    }

    #[doc(hidden)]
    fn unsupported(&self, operation: &'static str) -> CodecError {
        CodecError::UnsupportedOperation {
            format: self.format(),
            operation,
        }
    }
}

/// Incremental reader of a fixed number of bytes.
///
/// Codecs use it for headers and other fixed-size records that may arrive
/// split across several increments.
#[derive(Clone, Debug, Default)]
pub(crate) struct Collector {
    buf: Vec<u8>,
    want: usize,
}

impl Collector {
    pub(crate) fn new(want: usize) -> Self {
        Self {
            buf: Vec::with_capacity(want.min(1 << 16)),
            want,
        }
    }

    /// Take bytes from `input` until `want` are gathered; returns the count taken.
    pub(crate) fn feed(&mut self, input: &[u8]) -> usize {
        let take = (self.want - self.buf.len()).min(input.len());
        self.buf.extend_from_slice(&input[..take]);
        take
    }

    pub(crate) fn is_full(&self) -> bool {
        self.buf.len() == self.want
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopCodec;

    impl Codec for NoopCodec {
        fn format(&self) -> ImageFormat {
            ImageFormat::Jpeg
        }
    }

    #[test]
    fn defaults_are_unsupported() {
        let mut codec = NoopCodec;
        assert!(codec.supports("image/jpeg"));
        assert!(!codec.supports("image/png"));
        assert!(matches!(
            codec.load_start(),
            Err(CodecError::UnsupportedOperation { operation: "load", .. })
        ));
        let mut src: &[u8] = &[1, 2, 3];
        assert!(matches!(
            codec.load(&mut src, &crate::Unstoppable),
            Err(CodecError::UnsupportedOperation { operation: "load", .. })
        ));
        let surface = Surface::new(SurfaceFormat::A8, 1, 1).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            codec.save_to(&surface, &mut out, &crate::Unstoppable),
            Err(CodecError::UnsupportedOperation { operation: "save", .. })
        ));
    }

    #[test]
    fn core_lifecycle() {
        let mut core = CodecCore::new(ImageFormat::Serial, &CodecContext::default());
        assert!(core.begin_increment().is_err());
        core.reset();
        assert_eq!(core.phase(), DecodePhase::HeaderPending);
        core.create_surface(SurfaceFormat::Rgb24, 2, 2).unwrap();
        assert_eq!(core.phase(), DecodePhase::DecodingLines);
        assert_eq!(core.end_increment(Ok(7)).unwrap(), 7);
        assert_eq!(core.consumed(), 7);

        // Finishing early is a truncation and drops the surface.
        let err = core.finish().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CorruptData);
        assert_eq!(core.phase(), DecodePhase::Failed);
        assert!(core.surface().is_none());
    }

    #[test]
    fn core_passes_reported_in_order() {
        let mut core = CodecCore::new(ImageFormat::Jpeg, &CodecContext::default());
        core.reset();
        core.complete_pass();
        core.complete_pass();
        assert_eq!(core.take_pass(), Some(1));
        assert_eq!(core.take_pass(), Some(2));
        assert_eq!(core.take_pass(), None);
    }

    #[test]
    fn limits_checked_before_allocation() {
        let context = CodecContext::default().with_limits(Limits {
            max_width: Some(10),
            ..Default::default()
        });
        let mut core = CodecCore::new(ImageFormat::Targa, &context);
        core.reset();
        assert!(matches!(
            core.create_surface(SurfaceFormat::Argb32, 11, 1),
            Err(CodecError::LimitExceeded(_))
        ));
    }

    #[test]
    fn collector_gathers_across_calls() {
        let mut c = Collector::new(4);
        assert_eq!(c.feed(&[1, 2]), 2);
        assert!(!c.is_full());
        assert_eq!(c.feed(&[3, 4, 5]), 2);
        assert!(c.is_full());
        assert_eq!(c.bytes(), &[1, 2, 3, 4]);
    }
}
