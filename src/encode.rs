//! Image encoding.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::codec::CodecContext;
use crate::config::CodecConfig;
use crate::limits::{Stop, Unstoppable};
use crate::surface::Surface;
use crate::{CodecError, CodecRegistry, ImageFormat};

/// Image encode request builder.
///
/// # Example
///
/// ```
/// use surfcodecs::config::{CodecConfig, TargaConfig};
/// use surfcodecs::{EncodeRequest, ImageFormat, Surface, SurfaceFormat};
///
/// let surface = Surface::new(SurfaceFormat::Rgb24, 16, 16)?;
/// let config = CodecConfig::default().with_targa(TargaConfig { rle: true });
/// let bytes = EncodeRequest::new(ImageFormat::Targa)
///     .with_codec_config(&config)
///     .encode_to_vec(&surface)?;
/// assert_eq!(bytes[2], 10);
/// # Ok::<(), surfcodecs::CodecError>(())
/// ```
pub struct EncodeRequest<'a> {
    mime: &'a str,
    stop: Option<&'a dyn Stop>,
    registry: Option<&'a mut CodecRegistry>,
    codec_config: Option<&'a CodecConfig>,
}

impl<'a> EncodeRequest<'a> {
    /// Encode to a specific format.
    pub fn new(format: ImageFormat) -> Self {
        Self::for_mime(format.mime_type())
    }

    /// Encode with whatever codec serves `mime`.
    pub fn for_mime(mime: &'a str) -> Self {
        Self {
            mime,
            stop: None,
            registry: None,
            codec_config: None,
        }
    }

    /// Set a cancellation token, checked between encoded rows.
    pub fn with_stop(mut self, stop: &'a dyn Stop) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Use a codec registry, reusing its codec instances and enable flags.
    pub fn with_registry(mut self, registry: &'a mut CodecRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set format-specific codec configuration.
    ///
    /// Applies to the request's own registry; a registry passed with
    /// [`with_registry`](Self::with_registry) carries its own context.
    pub fn with_codec_config(mut self, config: &'a CodecConfig) -> Self {
        self.codec_config = Some(config);
        self
    }

    /// Encode `surface` into `writer`.
    pub fn encode(self, surface: &Surface, writer: &mut dyn Write) -> Result<(), CodecError> {
        let stop = self.stop.unwrap_or(&Unstoppable);
        let mut default_registry;
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let mut context = CodecContext::default();
                if let Some(config) = self.codec_config {
                    context.config = config.clone();
                }
                default_registry = CodecRegistry::all().with_context(context);
                &mut default_registry
            }
        };
        let codec = registry.encoder_for_mime(self.mime)?;
        log::debug!(
            "encoding {}x{} {:?} surface as {}",
            surface.width(),
            surface.height(),
            surface.content(),
            self.mime
        );
        codec.save_to(surface, writer, stop)
    }

    /// Encode `surface` into a new buffer.
    pub fn encode_to_vec(self, surface: &Surface) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode(surface, &mut out)?;
        Ok(out)
    }
}

/// Encode `surface` to `path`, choosing the format from the file extension.
pub fn save_file(surface: &Surface, path: impl AsRef<Path>) -> Result<(), CodecError> {
    let path = path.as_ref();
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormat::from_extension)
        .ok_or(CodecError::UnrecognizedFormat)?;
    let mut writer = BufWriter::new(File::create(path)?);
    EncodeRequest::new(format).encode(surface, &mut writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecodeRequest;
    use crate::surface::SurfaceFormat;

    fn sample() -> Surface {
        let mut surface = Surface::new(SurfaceFormat::Argb32, 3, 2).unwrap();
        surface.set_pixel(2, 1, 0x8040_2010);
        surface
    }

    #[test]
    fn serial_round_trip() {
        let surface = sample();
        let bytes = EncodeRequest::new(ImageFormat::Serial)
            .encode_to_vec(&surface)
            .unwrap();
        let output = DecodeRequest::new(bytes.as_slice()).decode().unwrap();
        assert_eq!(output.surface, surface);
    }

    #[cfg(feature = "targa")]
    #[test]
    fn targa_round_trip() {
        let surface = sample();
        let bytes = EncodeRequest::for_mime("image/x-targa")
            .encode_to_vec(&surface)
            .unwrap();
        let output = DecodeRequest::new(bytes.as_slice()).decode().unwrap();
        assert_eq!(output.format, ImageFormat::Targa);
        assert_eq!(output.surface, surface);
    }

    #[test]
    fn jpeg_cannot_encode() {
        let result = EncodeRequest::new(ImageFormat::Jpeg).encode_to_vec(&sample());
        assert!(matches!(
            result,
            Err(CodecError::UnsupportedOperation {
                operation: "save",
                ..
            })
        ));
    }

    #[test]
    fn disabled_encoder() {
        let mut registry = CodecRegistry::all().with_encode(ImageFormat::Serial, false);
        let result = EncodeRequest::new(ImageFormat::Serial)
            .with_registry(&mut registry)
            .encode_to_vec(&sample());
        assert!(matches!(result, Err(CodecError::DisabledFormat(ImageFormat::Serial))));
    }

    #[test]
    fn save_file_needs_known_extension() {
        let path = std::env::temp_dir().join("surfcodecs-encode-test.unknown");
        let result = save_file(&sample(), &path);
        assert!(matches!(result, Err(CodecError::UnrecognizedFormat)));
        assert!(!path.exists());
    }
}
