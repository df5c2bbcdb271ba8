//! Image format detection and metadata.

/// Supported image formats.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Targa,
    /// Raw, uncompressed surface dump (native byte order header + pixels).
    Serial,
}

impl ImageFormat {
    /// Every format this crate knows about, compiled in or not.
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Targa,
        ImageFormat::Serial,
    ];

    /// Short lowercase name, used as the prefix of error messages.
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Targa => "targa",
            ImageFormat::Serial => "serial",
        }
    }

    /// Detect format from magic bytes. Returns None if unrecognized.
    ///
    /// Only JPEG and PNG carry a signature. TARGA and serial dumps are
    /// recognized by [`probe::guess_format`](crate::probe::guess_format),
    /// which also looks at the file name and validates headers.
    pub fn detect(data: &[u8]) -> Option<Self> {
        // JPEG: FF D8 FF
        if data.len() >= 3 && data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF {
            return Some(ImageFormat::Jpeg);
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.len() >= 8 && data[..8] == PNG_SIGNATURE {
            return Some(ImageFormat::Png);
        }

        None
    }

    /// Detect format from file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        ImageFormat::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&ext.as_str()))
    }

    /// Look up the format a MIME type string names (exact match).
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        ImageFormat::ALL
            .into_iter()
            .find(|format| format.mime_types().contains(&mime))
    }

    /// Primary MIME type string.
    pub fn mime_type(self) -> &'static str {
        self.mime_types()[0]
    }

    /// All MIME type strings a codec for this format declares.
    pub fn mime_types(self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jpeg => &["image/jpeg"],
            ImageFormat::Png => &["image/png"],
            ImageFormat::Targa => &["image/x-tga", "image/x-targa"],
            ImageFormat::Serial => &["application/octet-stream"],
        }
    }

    /// Common file extensions.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jpeg => &["jpg", "jpeg", "jpe", "jfif"],
            ImageFormat::Png => &["png"],
            ImageFormat::Targa => &["tga", "targa", "icb", "vda", "vst"],
            ImageFormat::Serial => &["surface", "bin"],
        }
    }

    /// Whether a codec for this format can decode.
    pub fn supports_decode(self) -> bool {
        true
    }

    /// Whether a codec for this format can encode.
    pub fn supports_encode(self) -> bool {
        match self {
            ImageFormat::Jpeg => false,
            ImageFormat::Png => true,
            ImageFormat::Targa => true,
            ImageFormat::Serial => true,
        }
    }
}

pub(crate) const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_jpeg() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert_eq!(ImageFormat::detect(&data), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn detect_png() {
        let data = [
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
        ];
        assert_eq!(ImageFormat::detect(&data), Some(ImageFormat::Png));
    }

    #[test]
    fn detect_too_short() {
        let data = [0xFF, 0xD8];
        assert_eq!(ImageFormat::detect(&data), None);
    }

    #[test]
    fn targa_has_no_magic() {
        let header = [0u8, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 2, 0, 24, 0];
        assert_eq!(ImageFormat::detect(&header), None);
    }

    #[test]
    fn from_extension_case_insensitive() {
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("Tga"), Some(ImageFormat::Targa));
        assert_eq!(ImageFormat::from_extension("unknown"), None);
    }

    #[test]
    fn every_listed_extension_maps_back() {
        for format in ImageFormat::ALL {
            for ext in format.extensions() {
                assert_eq!(ImageFormat::from_extension(ext), Some(format), "{ext}");
            }
        }
        assert_eq!(ImageFormat::from_extension("BIN"), Some(ImageFormat::Serial));
        assert_eq!(ImageFormat::from_extension("vda"), Some(ImageFormat::Targa));
    }

    #[test]
    fn mime_lookup_is_exact() {
        assert_eq!(
            ImageFormat::from_mime_type("image/x-targa"),
            Some(ImageFormat::Targa)
        );
        assert_eq!(
            ImageFormat::from_mime_type("application/octet-stream"),
            Some(ImageFormat::Serial)
        );
        assert_eq!(ImageFormat::from_mime_type("IMAGE/PNG"), None);
        assert_eq!(ImageFormat::Targa.mime_type(), "image/x-tga");
    }
}
