//! Streaming loader: drives a codec's incremental triple from pushed buffers
//! or from a blocking reader.

use std::io::{ErrorKind as IoErrorKind, Read};

use crate::codec::Codec;
use crate::error::CodecError;
use crate::limits::{Stop, check_stop};
use crate::surface::Surface;

/// Bytes read from a source per increment.
pub const CHUNK_SIZE: usize = 4096;

/// State of a [`Loader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoaderState {
    Idle,
    Started,
    Consuming,
    Finished,
    Failed,
}

/// A completed decode pass over the in-progress surface.
#[derive(Clone, Copy, Debug)]
pub struct PassEvent<'a> {
    /// 1-based pass number.
    pub pass: u32,
    /// The surface as of the end of the pass.
    pub surface: &'a Surface,
}

/// Boxed pass observer; see [`Loader::with_pass_callback`].
pub type PassCallback<'c> = Box<dyn FnMut(&PassEvent<'_>) + 'c>;

/// Push-style driver over one codec.
///
/// ```
/// use surfcodecs::codecs::SerialCodec;
/// use surfcodecs::loader::Loader;
/// use surfcodecs::{CodecContext, Content, Surface, SurfaceFormat};
///
/// let surface = Surface::new(SurfaceFormat::Rgb24, 3, 2)?;
/// let bytes = SerialCodec::encode_to_vec(&surface)?;
///
/// let mut codec = SerialCodec::new(&CodecContext::default());
/// let mut loader = Loader::new(&mut codec);
/// loader.start()?;
/// for chunk in bytes.chunks(5) {
///     loader.push(chunk)?;
/// }
/// let decoded = loader.finish()?;
/// assert_eq!(decoded.content(), Content::Color);
/// # Ok::<(), surfcodecs::CodecError>(())
/// ```
pub struct Loader<'c, C: Codec + ?Sized> {
    codec: &'c mut C,
    state: LoaderState,
    consumed: u64,
    on_pass: Option<PassCallback<'c>>,
}

impl<'c, C: Codec + ?Sized> Loader<'c, C> {
    pub fn new(codec: &'c mut C) -> Self {
        Self {
            codec,
            state: LoaderState::Idle,
            consumed: 0,
            on_pass: None,
        }
    }

    /// Call `callback` after every completed decode pass.
    pub fn with_pass_callback(mut self, callback: impl FnMut(&PassEvent<'_>) + 'c) -> Self {
        self.on_pass = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Bytes the codec has consumed since [`Loader::start`].
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Reset the codec for a new image.
    pub fn start(&mut self) -> Result<(), CodecError> {
        self.consumed = 0;
        match self.codec.load_start() {
            Ok(()) => {
                self.state = LoaderState::Started;
                Ok(())
            }
            Err(e) => {
                self.state = LoaderState::Failed;
                Err(e)
            }
        }
    }

    /// Feed a whole buffer, re-invoking the codec with the remainder until
    /// every byte is consumed.
    pub fn push(&mut self, buf: &[u8]) -> Result<(), CodecError> {
        match self.state {
            LoaderState::Started | LoaderState::Consuming => {}
            state => {
                return Err(CodecError::Failure(format!(
                    "push in loader state {state:?}"
                )));
            }
        }
        self.state = LoaderState::Consuming;

        let mut rest = buf;
        while !rest.is_empty() {
            let n = match self.codec.load_increment(rest) {
                Ok(n) => n,
                Err(e) => {
                    self.state = LoaderState::Failed;
                    return Err(e);
                }
            };
            self.report_passes();
            if n == 0 || n > rest.len() {
                self.state = LoaderState::Failed;
                return Err(CodecError::Failure(format!(
                    "{}: codec consumed {n} of {} bytes",
                    self.codec.format().name(),
                    rest.len()
                )));
            }
            self.consumed += n as u64;
            rest = &rest[n..];
            if !rest.is_empty() {
                log::trace!("suspended with {} bytes left in buffer", rest.len());
            }
        }
        Ok(())
    }

    /// Complete the decode and take the surface.
    pub fn finish(&mut self) -> Result<Surface, CodecError> {
        match self.state {
            LoaderState::Started | LoaderState::Consuming => {}
            state => {
                return Err(CodecError::Failure(format!(
                    "finish in loader state {state:?}"
                )));
            }
        }
        let result = self.codec.load_finish();
        self.report_passes();
        self.state = match result {
            Ok(_) => LoaderState::Finished,
            Err(_) => LoaderState::Failed,
        };
        result
    }

    fn report_passes(&mut self) {
        while let Some(pass) = self.codec.take_pass() {
            let (Some(callback), Some(surface)) = (self.on_pass.as_mut(), self.codec.preview())
            else {
                continue;
            };
            callback(&PassEvent { pass, surface });
        }
    }
}

/// Decode everything `reader` yields, in [`CHUNK_SIZE`] pieces.
///
/// `stop` is checked before every read. A source that yields no bytes at all
/// fails with [`CodecError::EmptyInput`].
pub fn load_from_reader<'c, C: Codec + ?Sized>(
    codec: &'c mut C,
    reader: &mut dyn Read,
    stop: &dyn Stop,
    on_pass: Option<PassCallback<'c>>,
) -> Result<Surface, CodecError> {
    let mut loader = Loader::new(codec);
    loader.on_pass = on_pass;
    loader.start()?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        check_stop(stop)?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        total += n as u64;
        loader.push(&buf[..n])?;
    }

    if total == 0 {
        return Err(CodecError::EmptyInput);
    }
    loader.finish()
}
