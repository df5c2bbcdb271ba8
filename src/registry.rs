//! Runtime codec registry: which formats are enabled, and which codec
//! instance serves a MIME type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{Codec, CodecContext};
use crate::codecs::SerialCodec;
use crate::error::CodecError;
use crate::format::ImageFormat;

/// Set of image formats represented as bitflags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FormatSet(u8);

impl FormatSet {
    const EMPTY: Self = FormatSet(0);
    const JPEG: u8 = 1 << 0;
    const PNG: u8 = 1 << 1;
    const TARGA: u8 = 1 << 2;
    const SERIAL: u8 = 1 << 3;

    #[allow(unused_mut)]
    fn all_compiled() -> Self {
        let mut bits = Self::SERIAL;

        #[cfg(feature = "jpeg")]
        {
            bits |= Self::JPEG;
        }
        #[cfg(feature = "png")]
        {
            bits |= Self::PNG;
        }
        #[cfg(feature = "targa")]
        {
            bits |= Self::TARGA;
        }

        FormatSet(bits)
    }

    fn bit(format: ImageFormat) -> u8 {
        match format {
            ImageFormat::Jpeg => Self::JPEG,
            ImageFormat::Png => Self::PNG,
            ImageFormat::Targa => Self::TARGA,
            ImageFormat::Serial => Self::SERIAL,
        }
    }

    fn contains(self, format: ImageFormat) -> bool {
        (self.0 & Self::bit(format)) != 0
    }

    fn insert(&mut self, format: ImageFormat) {
        self.0 |= Self::bit(format);
    }

    fn remove(&mut self, format: ImageFormat) {
        self.0 &= !Self::bit(format);
    }

    fn iter(self) -> impl Iterator<Item = ImageFormat> {
        ImageFormat::ALL.into_iter().filter(move |&f| self.contains(f))
    }
}

/// Whether the codec for `format` is compiled in.
fn compiled(format: ImageFormat) -> bool {
    FormatSet::all_compiled().contains(format)
}

/// Creates codec instances for MIME types the registry has not seen yet.
pub trait CodecFactory: Send + Sync {
    /// A fresh codec for `mime`, or `None` if this factory does not know it.
    fn create(&self, mime: &str, context: &CodecContext) -> Option<Box<dyn Codec>>;
}

/// Factory for the codecs compiled into this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinCodecFactory;

impl CodecFactory for BuiltinCodecFactory {
    fn create(&self, mime: &str, context: &CodecContext) -> Option<Box<dyn Codec>> {
        builtin_codec(ImageFormat::from_mime_type(mime)?, context)
    }
}

/// A new instance of the built-in codec for `format`, if compiled in.
pub fn builtin_codec(format: ImageFormat, context: &CodecContext) -> Option<Box<dyn Codec>> {
    match format {
        #[cfg(feature = "jpeg")]
        ImageFormat::Jpeg => Some(Box::new(crate::codecs::JpegCodec::new(context))),
        #[cfg(feature = "png")]
        ImageFormat::Png => Some(Box::new(crate::codecs::PngCodec::new(context))),
        #[cfg(feature = "targa")]
        ImageFormat::Targa => Some(Box::new(crate::codecs::TargaCodec::new(context))),
        ImageFormat::Serial => Some(Box::new(SerialCodec::new(context))),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Runtime codec registry.
///
/// Compile-time features determine which codecs are *available*; the registry
/// controls which are *enabled* and owns the codec instances. Each MIME type
/// resolves to one instance the first time it is looked up and to the same
/// instance afterwards: existing instances are asked first (an instance may
/// declare several MIME types), then the factory.
pub struct CodecRegistry {
    decode_enabled: FormatSet,
    encode_enabled: FormatSet,
    context: CodecContext,
    factory: Arc<dyn CodecFactory>,
    codecs: Vec<Box<dyn Codec>>,
    by_mime: HashMap<String, usize>,
}

impl core::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("decode_enabled", &self.decode_enabled)
            .field("encode_enabled", &self.encode_enabled)
            .field("context", &self.context)
            .field("loaded", &self.codecs.len())
            .finish_non_exhaustive()
    }
}

impl CodecRegistry {
    fn with_sets(decode_enabled: FormatSet, encode_enabled: FormatSet) -> Self {
        Self {
            decode_enabled,
            encode_enabled,
            context: CodecContext::default(),
            factory: Arc::new(BuiltinCodecFactory),
            codecs: Vec::new(),
            by_mime: HashMap::new(),
        }
    }

    /// All compiled-in codecs enabled.
    pub fn all() -> Self {
        Self::with_sets(FormatSet::all_compiled(), FormatSet::all_compiled())
    }

    /// Nothing enabled; caller must opt in.
    pub fn none() -> Self {
        Self::with_sets(FormatSet::EMPTY, FormatSet::EMPTY)
    }

    /// Enable or disable decoding for a format.
    pub fn with_decode(mut self, format: ImageFormat, enabled: bool) -> Self {
        if enabled {
            self.decode_enabled.insert(format);
        } else {
            self.decode_enabled.remove(format);
        }
        self
    }

    /// Enable or disable encoding for a format.
    pub fn with_encode(mut self, format: ImageFormat, enabled: bool) -> Self {
        if enabled {
            self.encode_enabled.insert(format);
        } else {
            self.encode_enabled.remove(format);
        }
        self
    }

    /// Context handed to codecs created from now on.
    pub fn with_context(mut self, context: CodecContext) -> Self {
        self.context = context;
        self
    }

    /// Factory consulted for MIME types no loaded codec supports.
    pub fn with_factory(mut self, factory: Arc<dyn CodecFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn context(&self) -> &CodecContext {
        &self.context
    }

    /// Is this format compiled in AND enabled for decoding?
    pub fn can_decode(&self, format: ImageFormat) -> bool {
        self.decode_enabled.contains(format) && compiled(format) && format.supports_decode()
    }

    /// Is this format compiled in AND enabled for encoding?
    pub fn can_encode(&self, format: ImageFormat) -> bool {
        self.encode_enabled.contains(format) && compiled(format) && format.supports_encode()
    }

    /// Formats that are both compiled in and enabled for decoding.
    pub fn decodable_formats(&self) -> impl Iterator<Item = ImageFormat> + '_ {
        self.decode_enabled.iter().filter(|&f| self.can_decode(f))
    }

    /// Formats that are both compiled in and enabled for encoding.
    pub fn encodable_formats(&self) -> impl Iterator<Item = ImageFormat> + '_ {
        self.encode_enabled.iter().filter(|&f| self.can_encode(f))
    }

    /// Number of codec instances created so far.
    pub fn loaded(&self) -> usize {
        self.codecs.len()
    }

    /// The codec instance serving `mime`, creating it on first use.
    pub fn codec_for_mime(&mut self, mime: &str) -> Result<&mut dyn Codec, CodecError> {
        if let Some(&index) = self.by_mime.get(mime) {
            return Ok(self.codecs[index].as_mut());
        }
        let index = match self.codecs.iter().position(|c| c.supports(mime)) {
            Some(index) => index,
            None => {
                let codec = self
                    .factory
                    .create(mime, &self.context)
                    .ok_or_else(|| CodecError::UnknownMimeType(mime.to_owned()))?;
                log::debug!("registry: created {} codec for {mime}", codec.format().name());
                self.codecs.push(codec);
                self.codecs.len() - 1
            }
        };
        self.by_mime.insert(mime.to_owned(), index);
        Ok(self.codecs[index].as_mut())
    }

    /// A codec able to load `mime`.
    pub fn decoder_for_mime(&mut self, mime: &str) -> Result<&mut dyn Codec, CodecError> {
        match ImageFormat::from_mime_type(mime) {
            Some(format) if !self.can_decode(format) => return Err(self.disabled(format, "load")),
            _ => {}
        }
        let codec = self.codec_for_mime(mime)?;
        if !codec.can_load() {
            return Err(codec.unsupported("load"));
        }
        Ok(codec)
    }

    /// A codec able to save `mime`.
    pub fn encoder_for_mime(&mut self, mime: &str) -> Result<&mut dyn Codec, CodecError> {
        match ImageFormat::from_mime_type(mime) {
            Some(format) if !self.can_encode(format) => return Err(self.disabled(format, "save")),
            _ => {}
        }
        let codec = self.codec_for_mime(mime)?;
        if !codec.can_save() {
            return Err(codec.unsupported("save"));
        }
        Ok(codec)
    }

    fn disabled(&self, format: ImageFormat, operation: &'static str) -> CodecError {
        let supported = match operation {
            "load" => format.supports_decode(),
            _ => format.supports_encode(),
        };
        if supported {
            CodecError::DisabledFormat(format)
        } else {
            CodecError::UnsupportedOperation { format, operation }
        }
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_registry() {
        let registry = CodecRegistry::all();
        assert!(registry.can_decode(ImageFormat::Serial));
        assert!(registry.can_encode(ImageFormat::Serial));
        #[cfg(feature = "jpeg")]
        assert!(registry.can_decode(ImageFormat::Jpeg));
        assert!(!registry.can_encode(ImageFormat::Jpeg));
        #[cfg(feature = "targa")]
        assert!(registry.can_encode(ImageFormat::Targa));
    }

    #[test]
    fn none_registry() {
        let registry = CodecRegistry::none();
        assert!(!registry.can_decode(ImageFormat::Serial));
        assert!(!registry.can_encode(ImageFormat::Png));
        assert_eq!(registry.decodable_formats().count(), 0);
    }

    #[test]
    fn selective_enable() {
        let registry = CodecRegistry::none()
            .with_decode(ImageFormat::Serial, true)
            .with_encode(ImageFormat::Serial, true);
        assert_eq!(
            registry.decodable_formats().collect::<Vec<_>>(),
            vec![ImageFormat::Serial]
        );
        assert!(!registry.can_decode(ImageFormat::Png));
    }

    #[test]
    fn lookups_reuse_one_instance() {
        let mut registry = CodecRegistry::all();
        let first: *const () =
            std::ptr::from_mut(registry.codec_for_mime("application/octet-stream").unwrap()).cast::<()>();
        let second: *const () =
            std::ptr::from_mut(registry.codec_for_mime("application/octet-stream").unwrap()).cast::<()>();
        assert!(std::ptr::addr_eq(first, second));
        assert_eq!(registry.loaded(), 1);
    }

    #[cfg(feature = "targa")]
    #[test]
    fn aliases_share_an_instance() {
        let mut registry = CodecRegistry::all();
        registry.decoder_for_mime("image/x-tga").unwrap();
        let codec = registry.decoder_for_mime("image/x-targa").unwrap();
        assert_eq!(codec.format(), ImageFormat::Targa);
        assert_eq!(registry.loaded(), 1);
    }

    #[test]
    fn unknown_mime() {
        let mut registry = CodecRegistry::all();
        let err = registry.decoder_for_mime("image/x-nonesuch").err().unwrap();
        assert_eq!(err.to_string(), "unsupported mime type `image/x-nonesuch'");
    }

    #[test]
    fn disabled_format() {
        let mut registry = CodecRegistry::all().with_decode(ImageFormat::Serial, false);
        assert!(matches!(
            registry.decoder_for_mime("application/octet-stream"),
            Err(CodecError::DisabledFormat(ImageFormat::Serial))
        ));
        assert!(registry.encoder_for_mime("application/octet-stream").is_ok());
    }

    #[test]
    fn jpeg_has_no_encoder() {
        let mut registry = CodecRegistry::all();
        assert!(matches!(
            registry.encoder_for_mime("image/jpeg"),
            Err(CodecError::UnsupportedOperation {
                format: ImageFormat::Jpeg,
                operation: "save"
            })
        ));
    }

    struct Custom;

    impl Codec for Custom {
        fn format(&self) -> ImageFormat {
            ImageFormat::Serial
        }

        fn mime_types(&self) -> &'static [&'static str] {
            &["image/x-custom"]
        }
    }

    struct CustomFactory;

    impl CodecFactory for CustomFactory {
        fn create(&self, mime: &str, context: &CodecContext) -> Option<Box<dyn Codec>> {
            if mime == "image/x-custom" {
                return Some(Box::new(Custom));
            }
            BuiltinCodecFactory.create(mime, context)
        }
    }

    #[test]
    fn custom_factory() {
        let mut registry = CodecRegistry::all().with_factory(Arc::new(CustomFactory));
        let codec = registry.codec_for_mime("image/x-custom").unwrap();
        assert!(codec.supports("image/x-custom"));
        // Found, but it cannot load.
        assert!(matches!(
            registry.decoder_for_mime("image/x-custom"),
            Err(CodecError::UnsupportedOperation { operation: "load", .. })
        ));
        registry.codec_for_mime("application/octet-stream").unwrap();
        assert_eq!(registry.loaded(), 2);
    }
}
