//! Partial-data image probing and content-type guessing.
//!
//! Extracts format, dimensions, alpha and bit depth from a leading slice of
//! an image file without requiring the full file. All parsers are pure byte
//! parsing, so probing works even if a codec feature isn't compiled in.
//!
//! TARGA and serial dumps have no signature. They are recognized by the file
//! name, or failing that by a header whose fields are all plausible.

use std::path::Path;

use crate::codecs::serial::{self, SerialHeader};
use crate::format::ImageFormat;
use crate::surface::SurfaceFormat;

/// Result of probing partial image data.
///
/// All fields except `format` are `Option`, since partial data may not contain
/// enough bytes for dimensions or other metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct ProbeResult {
    /// Detected image format.
    pub format: ImageFormat,
    /// Image width in pixels.
    pub width: Option<u32>,
    /// Image height in pixels.
    pub height: Option<u32>,
    /// Whether decoding yields a surface with alpha.
    pub has_alpha: Option<bool>,
    /// Bits per stored sample or pixel, as the header declares it.
    pub bit_depth: Option<u8>,
    /// Number of bytes examined from the input.
    pub bytes_examined: usize,
}

impl ProbeResult {
    fn empty(format: ImageFormat) -> Self {
        Self {
            format,
            width: None,
            height: None,
            has_alpha: None,
            bit_depth: None,
            bytes_examined: 0,
        }
    }

    /// Probe data for a specific format.
    ///
    /// Does not verify magic bytes; the caller is responsible for format
    /// detection.
    pub fn for_format(data: &[u8], format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png => probe_png(data),
            ImageFormat::Jpeg => probe_jpeg(data),
            ImageFormat::Targa => probe_targa(data),
            ImageFormat::Serial => probe_serial(data),
        }
    }
}

/// Detect the format of `data` from its content and probe its header.
pub fn probe(data: &[u8]) -> Option<ProbeResult> {
    let format = sniff(data)?;
    Some(ProbeResult::for_format(data, format))
}

/// Guess the format of a stream from its first bytes and an optional name.
///
/// Signatures win over the name; the name wins over header plausibility.
pub fn guess_format(head: &[u8], filename: Option<&str>) -> Option<ImageFormat> {
    if let Some(format) = ImageFormat::detect(head) {
        return Some(format);
    }
    let by_name = filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormat::from_extension);
    if by_name.is_some() {
        return by_name;
    }
    sniff(head)
}

/// [`guess_format`] as a MIME type.
pub fn guess_mime(head: &[u8], filename: Option<&str>) -> Option<&'static str> {
    guess_format(head, filename).map(ImageFormat::mime_type)
}

fn sniff(data: &[u8]) -> Option<ImageFormat> {
    if let Some(format) = ImageFormat::detect(data) {
        return Some(format);
    }
    if plausible_serial(data) {
        return Some(ImageFormat::Serial);
    }
    if plausible_targa(data) {
        return Some(ImageFormat::Targa);
    }
    None
}

// ---------------------------------------------------------------------------
// PNG: 8-byte signature + 25-byte IHDR (4 len + 4 type + 13 data + 4 CRC)
// ---------------------------------------------------------------------------

fn probe_png(data: &[u8]) -> ProbeResult {
    let mut result = ProbeResult::empty(ImageFormat::Png);
    result.bytes_examined = data.len().min(33);

    if data.len() < 33 || &data[12..16] != b"IHDR" {
        return result;
    }

    result.width = Some(u32::from_be_bytes([data[16], data[17], data[18], data[19]]));
    result.height = Some(u32::from_be_bytes([data[20], data[21], data[22], data[23]]));
    result.bit_depth = Some(data[24]);
    // Color type 4 = grayscale+alpha, 6 = RGBA. A tRNS chunk may add alpha
    // later; it is not looked for here.
    result.has_alpha = Some(matches!(data[25], 4 | 6));
    result
}

// ---------------------------------------------------------------------------
// JPEG: walk marker segments until a SOFn
// ---------------------------------------------------------------------------

fn probe_jpeg(data: &[u8]) -> ProbeResult {
    let mut result = ProbeResult::empty(ImageFormat::Jpeg);
    result.has_alpha = Some(false);

    // Skip SOI marker (FF D8)
    let mut pos = 2;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            // Lost sync
            break;
        }

        // Skip fill bytes
        while pos + 1 < data.len() && data[pos + 1] == 0xFF {
            pos += 1;
        }
        if pos + 1 >= data.len() {
            break;
        }

        let marker = data[pos + 1];
        pos += 2;

        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }
        // SOS or EOI before any frame header
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        if pos + 2 > data.len() {
            break;
        }
        let seg_len = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));

        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            // length (2) + precision (1) + height (2) + width (2)
            if pos + 7 <= data.len() {
                result.bit_depth = Some(data[pos + 2]);
                result.height = Some(u32::from(u16::from_be_bytes([data[pos + 3], data[pos + 4]])));
                result.width = Some(u32::from(u16::from_be_bytes([data[pos + 5], data[pos + 6]])));
                result.bytes_examined = pos + 7;
                return result;
            }
            break;
        }

        if seg_len < 2 {
            break;
        }
        pos += seg_len;
    }

    result.bytes_examined = pos.min(data.len());
    result
}

// ---------------------------------------------------------------------------
// TARGA: 18-byte little-endian header
// ---------------------------------------------------------------------------

const TGA_HEADER_LEN: usize = 18;

fn plausible_targa(data: &[u8]) -> bool {
    if data.len() < TGA_HEADER_LEN {
        return false;
    }
    let (colormap_type, image_type, depth) = (data[1], data[2], data[16]);
    let map_entry_bits = data[7];
    let width = u16::from_le_bytes([data[12], data[13]]);
    let height = u16::from_le_bytes([data[14], data[15]]);
    let descriptor = data[17];

    let type_ok = match image_type {
        1 | 9 => colormap_type == 1 && depth == 8 && matches!(map_entry_bits, 15 | 16 | 24 | 32),
        2 | 10 => colormap_type == 0 && matches!(depth, 15 | 16 | 24 | 32),
        3 | 11 => colormap_type == 0 && depth == 8,
        _ => false,
    };
    // Bits 6-7 of the descriptor (interleaving) are unused in practice.
    type_ok && width > 0 && height > 0 && descriptor & 0xC0 == 0
}

fn probe_targa(data: &[u8]) -> ProbeResult {
    let mut result = ProbeResult::empty(ImageFormat::Targa);
    result.bytes_examined = data.len().min(TGA_HEADER_LEN);
    if data.len() < TGA_HEADER_LEN {
        return result;
    }
    let image_type = data[2];
    let depth = data[16];
    let alpha_bits = data[17] & 0x0F;
    result.width = Some(u32::from(u16::from_le_bytes([data[12], data[13]])));
    result.height = Some(u32::from(u16::from_le_bytes([data[14], data[15]])));
    result.bit_depth = Some(depth);
    result.has_alpha = Some(match image_type {
        1 | 9 => data[7] == 32,
        _ => alpha_bits > 0,
    });
    result
}

// ---------------------------------------------------------------------------
// Serial: 16-byte native-endian header
// ---------------------------------------------------------------------------

fn plausible_serial(data: &[u8]) -> bool {
    let Ok(header) = SerialHeader::parse(data) else {
        return false;
    };
    let format = SurfaceFormat::for_content(header.content);
    format.stride_for_width(header.width) == Some(header.stride)
}

fn probe_serial(data: &[u8]) -> ProbeResult {
    let mut result = ProbeResult::empty(ImageFormat::Serial);
    result.bytes_examined = data.len().min(serial::HEADER_LEN);
    if let Ok(header) = SerialHeader::parse(data) {
        let format = SurfaceFormat::for_content(header.content);
        result.width = Some(header.width);
        result.height = Some(header.height);
        result.has_alpha = Some(header.content.has_alpha());
        result.bit_depth = Some((format.bytes_per_pixel() * 8) as u8);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::SerialCodec;
    use crate::surface::Surface;

    fn png_header(width: u32, height: u32, color_type: u8) -> Vec<u8> {
        let mut data = vec![0u8; 33];
        data[..8].copy_from_slice(&crate::format::PNG_SIGNATURE);
        data[8..12].copy_from_slice(&13u32.to_be_bytes());
        data[12..16].copy_from_slice(b"IHDR");
        data[16..20].copy_from_slice(&width.to_be_bytes());
        data[20..24].copy_from_slice(&height.to_be_bytes());
        data[24] = 8;
        data[25] = color_type;
        data
    }

    fn tga_header(image_type: u8, depth: u8, descriptor: u8) -> Vec<u8> {
        let mut data = vec![0u8; 18];
        data[2] = image_type;
        data[12..14].copy_from_slice(&640u16.to_le_bytes());
        data[14..16].copy_from_slice(&480u16.to_le_bytes());
        data[16] = depth;
        data[17] = descriptor;
        data
    }

    // ---- PNG ----

    #[test]
    fn png_rgba_header() {
        let result = probe(&png_header(100, 50, 6)).unwrap();
        assert_eq!(result.format, ImageFormat::Png);
        assert_eq!((result.width, result.height), (Some(100), Some(50)));
        assert_eq!(result.has_alpha, Some(true));
        assert_eq!(result.bit_depth, Some(8));
    }

    #[test]
    fn png_too_short() {
        let data = png_header(1, 1, 2);
        let result = probe(&data[..20]).unwrap();
        assert_eq!(result.format, ImageFormat::Png);
        assert_eq!(result.width, None);
    }

    // ---- JPEG ----

    #[test]
    fn jpeg_skips_app_segments() {
        let mut data = vec![0xFF, 0xD8];
        // APP0 with 4 payload bytes
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x06, b'J', b'F', b'I', b'F']);
        // SOF2: precision 8, 300 high, 400 wide
        data.extend_from_slice(&[0xFF, 0xC2, 0x00, 0x11, 8, 0x01, 0x2C, 0x01, 0x90, 3]);
        let result = probe(&data).unwrap();
        assert_eq!(result.format, ImageFormat::Jpeg);
        assert_eq!((result.width, result.height), (Some(400), Some(300)));
        assert_eq!(result.has_alpha, Some(false));
        assert_eq!(result.bytes_examined, 19);
    }

    #[test]
    fn jpeg_without_frame() {
        let data = [0xFF, 0xD8, 0xFF, 0xD9];
        let result = probe(&data).unwrap();
        assert_eq!(result.width, None);
    }

    // ---- TARGA ----

    #[test]
    fn targa_by_header() {
        let result = probe(&tga_header(10, 32, 0x28)).unwrap();
        assert_eq!(result.format, ImageFormat::Targa);
        assert_eq!((result.width, result.height), (Some(640), Some(480)));
        assert_eq!(result.has_alpha, Some(true));
        assert_eq!(result.bit_depth, Some(32));
    }

    #[test]
    fn implausible_targa_is_not_guessed() {
        assert_eq!(probe(&tga_header(2, 8, 0)), None);
        assert_eq!(probe(&tga_header(7, 24, 0)), None);
        assert_eq!(probe(&[0u8; 18]), None);
    }

    // ---- Serial ----

    #[test]
    fn serial_by_header() {
        let surface = Surface::new(SurfaceFormat::A8, 5, 2).unwrap();
        let bytes = SerialCodec::encode_to_vec(&surface).unwrap();
        let result = probe(&bytes).unwrap();
        assert_eq!(result.format, ImageFormat::Serial);
        assert_eq!((result.width, result.height), (Some(5), Some(2)));
        assert_eq!(result.has_alpha, Some(true));
        assert_eq!(result.bit_depth, Some(8));
    }

    // ---- Guessing ----

    #[test]
    fn signature_beats_name() {
        let data = png_header(1, 1, 2);
        assert_eq!(guess_mime(&data, Some("photo.jpg")), Some("image/png"));
    }

    #[test]
    fn name_beats_plausibility() {
        let data = tga_header(2, 24, 0);
        assert_eq!(guess_format(&data, Some("dump.surface")), Some(ImageFormat::Serial));
        assert_eq!(guess_format(&data, None), Some(ImageFormat::Targa));
        assert_eq!(guess_mime(&data, Some("x.TGA")), Some("image/x-tga"));
    }

    #[test]
    fn nothing_matches() {
        assert_eq!(guess_format(b"hello, world", Some("notes.txt")), None);
        assert_eq!(guess_format(&[], None), None);
    }
}
