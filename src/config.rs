//! Format-specific codec configuration.
//!
//! The [`CodecConfig`] struct bundles all format-specific settings into a
//! single value handed to codecs when the registry creates them, or to
//! encode/decode requests.

/// TARGA encoder settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TargaConfig {
    /// Write run-length encoded images (types 10/11) instead of raw (2/3).
    pub rle: bool,
}

/// PNG compression preset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PngCompression {
    /// Fastest deflate setting.
    Fast,
    /// The encoder's balanced default.
    #[default]
    Default,
}

/// PNG encoder settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PngConfig {
    pub compression: PngCompression,
}

/// JPEG decoder settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JpegConfig {
    /// Re-render the surface after every completed scan of a progressive
    /// stream, firing a pass event each time.
    pub progressive_preview: bool,
}

impl Default for JpegConfig {
    fn default() -> Self {
        Self {
            progressive_preview: true,
        }
    }
}

/// Format-specific configuration overrides.
///
/// # Example
///
/// ```
/// use surfcodecs::config::{CodecConfig, PngCompression, TargaConfig};
///
/// let config = CodecConfig::default()
///     .with_targa(TargaConfig { rle: true })
///     .with_png_compression(PngCompression::Fast);
/// assert!(config.targa.rle);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct CodecConfig {
    pub targa: TargaConfig,
    pub png: PngConfig,
    pub jpeg: JpegConfig,
}

impl CodecConfig {
    /// Set TARGA encoder configuration.
    pub fn with_targa(mut self, config: TargaConfig) -> Self {
        self.targa = config;
        self
    }

    /// Set PNG encoder configuration.
    pub fn with_png(mut self, config: PngConfig) -> Self {
        self.png = config;
        self
    }

    /// Set PNG compression preset.
    pub fn with_png_compression(mut self, compression: PngCompression) -> Self {
        self.png.compression = compression;
        self
    }

    /// Set JPEG decoder configuration.
    pub fn with_jpeg(mut self, config: JpegConfig) -> Self {
        self.jpeg = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CodecConfig::default();
        assert!(!config.targa.rle);
        assert_eq!(config.png.compression, PngCompression::Default);
        assert!(config.jpeg.progressive_preview);
    }

    #[test]
    fn builders_override() {
        let config = CodecConfig::default()
            .with_jpeg(JpegConfig {
                progressive_preview: false,
            })
            .with_png(PngConfig {
                compression: PngCompression::Fast,
            });
        assert!(!config.jpeg.progressive_preview);
        assert_eq!(config.png.compression, PngCompression::Fast);
    }
}
