//! Image decoding: resolve a stream to a codec and drive it to a surface.

use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind as IoErrorKind, Read};
use std::path::Path;

use crate::codec::CodecContext;
use crate::config::CodecConfig;
use crate::limits::{Limits, Stop, Unstoppable, check_stop};
use crate::loader::{CHUNK_SIZE, PassCallback, PassEvent, load_from_reader};
use crate::probe::guess_mime;
use crate::surface::Surface;
use crate::{CodecError, CodecRegistry, ImageFormat};

/// Decoded image output.
#[derive(Debug)]
pub struct DecodeOutput {
    /// The finished surface.
    pub surface: Surface,
    /// Format of the codec that produced it.
    pub format: ImageFormat,
}

impl DecodeOutput {
    /// Image width in pixels (convenience accessor).
    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    /// Image height in pixels (convenience accessor).
    pub fn height(&self) -> u32 {
        self.surface.height()
    }
}

/// Image decode request builder.
///
/// The content type comes from [`with_mime`](Self::with_mime) when given,
/// otherwise from the first [`CHUNK_SIZE`] bytes of the stream and the
/// optional file name. Those bytes are then replayed to the codec, so the
/// source is read exactly once.
///
/// # Example
///
/// ```
/// use surfcodecs::codecs::SerialCodec;
/// use surfcodecs::{DecodeRequest, ImageFormat, Surface, SurfaceFormat};
///
/// let bytes = SerialCodec::encode_to_vec(&Surface::new(SurfaceFormat::Argb32, 4, 3)?)?;
/// let output = DecodeRequest::new(bytes.as_slice()).decode()?;
/// assert_eq!(output.format, ImageFormat::Serial);
/// println!("{}x{}", output.width(), output.height());
/// # Ok::<(), surfcodecs::CodecError>(())
/// ```
pub struct DecodeRequest<'a> {
    reader: Box<dyn Read + 'a>,
    filename: Option<&'a str>,
    mime: Option<&'a str>,
    limits: Option<&'a Limits>,
    stop: Option<&'a dyn Stop>,
    registry: Option<&'a mut CodecRegistry>,
    codec_config: Option<&'a CodecConfig>,
    on_pass: Option<PassCallback<'a>>,
}

impl<'a> DecodeRequest<'a> {
    /// Create a new decode request reading from `reader`.
    pub fn new(reader: impl Read + 'a) -> Self {
        Self {
            reader: Box::new(reader),
            filename: None,
            mime: None,
            limits: None,
            stop: None,
            registry: None,
            codec_config: None,
            on_pass: None,
        }
    }

    /// File name used as a hint for formats without a signature.
    pub fn with_filename(mut self, filename: &'a str) -> Self {
        self.filename = Some(filename);
        self
    }

    /// Skip content sniffing and use this MIME type.
    pub fn with_mime(mut self, mime: &'a str) -> Self {
        self.mime = Some(mime);
        self
    }

    /// Set resource limits.
    ///
    /// Applies to the request's own registry; a registry passed with
    /// [`with_registry`](Self::with_registry) carries its own context.
    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set a cancellation token.
    pub fn with_stop(mut self, stop: &'a dyn Stop) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Use a codec registry, reusing its codec instances and enable flags.
    pub fn with_registry(mut self, registry: &'a mut CodecRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set format-specific codec configuration (see [`with_limits`](Self::with_limits)).
    pub fn with_codec_config(mut self, config: &'a CodecConfig) -> Self {
        self.codec_config = Some(config);
        self
    }

    /// Call `callback` after every completed decode pass.
    pub fn with_pass_callback(mut self, callback: impl FnMut(&PassEvent<'_>) + 'a) -> Self {
        self.on_pass = Some(Box::new(callback));
        self
    }

    /// Decode the image to a surface.
    pub fn decode(self) -> Result<DecodeOutput, CodecError> {
        let stop = self.stop.unwrap_or(&Unstoppable);
        let mut reader = self.reader;
        let head = read_head(&mut reader, stop)?;
        if head.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        let mime = match self.mime {
            Some(mime) => mime,
            None => guess_mime(&head, self.filename).ok_or(CodecError::UnrecognizedFormat)?,
        };
        log::debug!("decoding {} as {mime}", self.filename.unwrap_or("stream"));

        let mut default_registry;
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let mut context = CodecContext::default();
                if let Some(limits) = self.limits {
                    context.limits = limits.clone();
                }
                if let Some(config) = self.codec_config {
                    context.config = config.clone();
                }
                default_registry = CodecRegistry::all().with_context(context);
                &mut default_registry
            }
        };

        let codec = registry.decoder_for_mime(mime)?;
        let format = codec.format();
        let on_pass = match self.on_pass {
            Some(callback) => Some(callback as PassCallback<'_>),
            None => None,
        };
        let mut source = Cursor::new(head).chain(reader);
        let surface = load_from_reader(codec, &mut source, stop, on_pass)?;
        Ok(DecodeOutput { surface, format })
    }
}

/// Read up to [`CHUNK_SIZE`] bytes for sniffing.
fn read_head(reader: &mut dyn Read, stop: &dyn Stop) -> Result<Vec<u8>, CodecError> {
    let mut head = vec![0u8; CHUNK_SIZE];
    let mut filled = 0;
    while filled < head.len() {
        check_stop(stop)?;
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    head.truncate(filled);
    Ok(head)
}

/// Decode the file at `path`, guessing its format from name and content.
pub fn load_file(path: impl AsRef<Path>) -> Result<Surface, CodecError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut request = DecodeRequest::new(BufReader::new(file));
    if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
        request = request.with_filename(name);
    }
    Ok(request.decode()?.surface)
}
