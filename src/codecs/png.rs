//! PNG codec adapter using the png crate.
//!
//! Loading walks the chunk structure as bytes arrive: IHDR fixes the surface
//! size, the first IDAT allocates the surface and IEND triggers the decode.
//! Pixels are normalized to 8 bits per channel; images with an alpha channel
//! or a tRNS chunk land in a premultiplied `Argb32` surface, the rest in
//! `Rgb24`.

use std::io::{Cursor, Write};

use crate::codec::{Codec, CodecContext, CodecCore, Collector, DecodePhase};
use crate::config::{PngCompression, PngConfig};
use crate::error::CodecError;
use crate::format::{ImageFormat, PNG_SIGNATURE};
use crate::limits::{Stop, check_stop};
use crate::pixel;
use crate::surface::{Content, Surface, SurfaceFormat};

const FORMAT: ImageFormat = ImageFormat::Png;

/// Chunks longer than this are rejected (2^31 - 1).
const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

/// Fields of the IHDR chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ihdr {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlaced: bool,
}

impl Ihdr {
    fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != 13 {
            return Err(CodecError::corrupt(FORMAT, "invalid IHDR length"));
        }
        let ihdr = Self {
            width: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            height: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            bit_depth: bytes[8],
            color_type: bytes[9],
            interlaced: bytes[12] != 0,
        };
        if ihdr.width == 0 || ihdr.height == 0 {
            return Err(CodecError::corrupt(FORMAT, "zero image dimension"));
        }
        if !matches!(ihdr.color_type, 0 | 2 | 3 | 4 | 6) {
            return Err(CodecError::corrupt(
                FORMAT,
                format!("invalid color type: {}", ihdr.color_type),
            ));
        }
        Ok(ihdr)
    }

    /// Whether the color type itself carries alpha.
    pub fn has_alpha_channel(&self) -> bool {
        matches!(self.color_type, 4 | 6)
    }
}

enum Stage {
    Signature(Collector),
    ChunkHeader(Collector),
    Body { kind: [u8; 4], left: usize },
    Crc { kind: [u8; 4], left: usize },
    Done,
}

/// Incremental PNG loader and encoder.
pub struct PngCodec {
    core: CodecCore,
    config: PngConfig,
    stage: Stage,
    data: Vec<u8>,
    chunk: Vec<u8>,
    ihdr: Option<Ihdr>,
    transparency: bool,
}

impl PngCodec {
    pub fn new(context: &CodecContext) -> Self {
        Self {
            core: CodecCore::new(FORMAT, context),
            config: context.config.png,
            stage: Stage::Done,
            data: Vec::new(),
            chunk: Vec::new(),
            ihdr: None,
            transparency: false,
        }
    }

    /// IHDR of the stream being decoded, once seen.
    pub fn header(&self) -> Option<&Ihdr> {
        self.ihdr.as_ref()
    }

    /// Encode a surface into a new buffer.
    pub fn encode_to_vec(surface: &Surface, config: PngConfig) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        encode(surface, config, &mut out, &crate::Unstoppable)?;
        Ok(out)
    }

    fn step(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        let mut i = 0;
        while i < buf.len() {
            let rest = &buf[i..];
            match &mut self.stage {
                Stage::Signature(collector) => {
                    let n = collector.feed(rest);
                    i += n;
                    if collector.is_full() {
                        if collector.bytes() != PNG_SIGNATURE {
                            return Err(CodecError::corrupt(FORMAT, "invalid signature"));
                        }
                        self.stage = Stage::ChunkHeader(Collector::new(8));
                    }
                }
                Stage::ChunkHeader(collector) => {
                    let n = collector.feed(rest);
                    i += n;
                    if collector.is_full() {
                        let b = collector.bytes();
                        let len = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
                        let kind = [b[4], b[5], b[6], b[7]];
                        self.begin_chunk(len, kind)?;
                    }
                }
                Stage::Body { kind, left } => {
                    let (kind, take) = (*kind, (*left).min(rest.len()));
                    *left -= take;
                    let done = *left == 0;
                    if &kind == b"IHDR" {
                        self.chunk.extend_from_slice(&rest[..take]);
                    }
                    i += take;
                    if done {
                        self.end_chunk(kind)?;
                    }
                }
                Stage::Crc { kind, left } => {
                    let take = (*left).min(rest.len());
                    *left -= take;
                    i += take;
                    if *left == 0 {
                        let kind = *kind;
                        self.stage = Stage::ChunkHeader(Collector::new(8));
                        if &kind == b"IEND" {
                            self.data.extend_from_slice(&buf[..i]);
                            self.decode()?;
                            self.stage = Stage::Done;
                            return Ok(i);
                        }
                    }
                }
                Stage::Done => {
                    log::warn!("png: ignoring {} bytes after IEND", rest.len());
                    return Ok(buf.len());
                }
            }
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn begin_chunk(&mut self, len: u32, kind: [u8; 4]) -> Result<(), CodecError> {
        if len > MAX_CHUNK_LEN {
            return Err(CodecError::corrupt(FORMAT, "chunk length out of range"));
        }
        log::trace!("png: chunk {} ({len} bytes)", String::from_utf8_lossy(&kind));
        match &kind {
            b"IHDR" if self.ihdr.is_some() => {
                return Err(CodecError::corrupt(FORMAT, "duplicate IHDR"));
            }
            b"IHDR" => {}
            _ if self.ihdr.is_none() => {
                return Err(CodecError::corrupt(FORMAT, "first chunk is not IHDR"));
            }
            b"tRNS" => self.transparency = true,
            b"IDAT" if self.core.surface().is_none() => self.allocate()?,
            _ => {}
        }
        self.chunk.clear();
        self.stage = Stage::Body {
            kind,
            left: len as usize,
        };
        if len == 0 {
            self.end_chunk(kind)?;
        }
        Ok(())
    }

    fn end_chunk(&mut self, kind: [u8; 4]) -> Result<(), CodecError> {
        if &kind == b"IHDR" {
            let ihdr = Ihdr::parse(&self.chunk)?;
            log::debug!("png: header {ihdr:?}");
            self.ihdr = Some(ihdr);
        }
        self.stage = Stage::Crc { kind, left: 4 };
        Ok(())
    }

    fn allocate(&mut self) -> Result<(), CodecError> {
        let Some(ihdr) = self.ihdr else {
            return Err(CodecError::corrupt(FORMAT, "image data before IHDR"));
        };
        let format = if ihdr.has_alpha_channel() || self.transparency {
            SurfaceFormat::Argb32
        } else {
            SurfaceFormat::Rgb24
        };
        self.core.create_surface(format, ihdr.width, ihdr.height)?;
        Ok(())
    }

    fn decode(&mut self) -> Result<(), CodecError> {
        let Some(format) = self.core.surface().map(Surface::format) else {
            return Err(CodecError::corrupt(FORMAT, "no image data before IEND"));
        };
        let mut decoder = png::Decoder::new(Cursor::new(&self.data[..]));
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let mut reader = decoder.read_info()?;
        let size = reader
            .output_buffer_size()
            .ok_or_else(|| CodecError::LimitExceeded("png: output buffer size overflows".into()))?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(size).map_err(|_| CodecError::NoMemory)?;
        pixels.resize(size, 0);
        let frame = reader.next_frame(&mut pixels)?;
        let (color, _) = reader.output_color_type();

        let convert: fn(&[u8], &mut [u8]) = match (color, format) {
            (png::ColorType::Rgba, SurfaceFormat::Argb32) => pixel::rgba_row_to_premultiplied,
            (png::ColorType::GrayscaleAlpha, SurfaceFormat::Argb32) => gray_alpha_row,
            (png::ColorType::Rgb, SurfaceFormat::Rgb24) => pixel::rgb_row_to_packed,
            (png::ColorType::Grayscale, SurfaceFormat::Rgb24) => pixel::gray_row_to_packed,
            (color, format) => {
                return Err(CodecError::corrupt(
                    FORMAT,
                    format!("decoded {color:?} does not fit a {format:?} surface"),
                ));
            }
        };
        let Some(surface) = self.core.surface_mut() else {
            return Err(CodecError::failure(FORMAT, "surface data is missing"));
        };
        let height = surface.height() as usize;
        for (y, src) in pixels.chunks(frame.line_size).take(height).enumerate() {
            convert(src, surface.row_mut(y as u32));
        }
        self.core.complete_pass();
        self.core.set_phase(DecodePhase::Finished);
        Ok(())
    }
}

fn gray_alpha_row(src: &[u8], dst: &mut [u8]) {
    for (ga, out) in src.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
        let px = rgb::RGBA8::new(ga[0], ga[0], ga[0], ga[1]);
        pixel::write_packed(out, pixel::pack(pixel::premultiply_rgba(px)));
    }
}

impl Codec for PngCodec {
    fn format(&self) -> ImageFormat {
        FORMAT
    }

    fn can_load(&self) -> bool {
        true
    }

    fn can_save(&self) -> bool {
        true
    }

    fn load_start(&mut self) -> Result<(), CodecError> {
        self.core.reset();
        self.stage = Stage::Signature(Collector::new(PNG_SIGNATURE.len()));
        self.data = Vec::new();
        self.chunk.clear();
        self.ihdr = None;
        self.transparency = false;
        Ok(())
    }

    fn load_increment(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        self.core.begin_increment()?;
        let result = self.step(buf);
        self.core.end_increment(result)
    }

    fn load_finish(&mut self) -> Result<Surface, CodecError> {
        self.stage = Stage::Done;
        self.data = Vec::new();
        self.core.finish()
    }

    fn phase(&self) -> DecodePhase {
        self.core.phase()
    }

    fn take_pass(&mut self) -> Option<u32> {
        self.core.take_pass()
    }

    fn preview(&self) -> Option<&Surface> {
        self.core.surface()
    }

    fn save_start(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn save(
        &mut self,
        surface: &Surface,
        writer: &mut dyn Write,
        stop: &dyn Stop,
    ) -> Result<(), CodecError> {
        encode(surface, self.config, writer, stop)
    }
}

fn encode(
    surface: &Surface,
    config: PngConfig,
    writer: &mut dyn Write,
    stop: &dyn Stop,
) -> Result<(), CodecError> {
    if surface.width() == 0 || surface.height() == 0 {
        return Err(CodecError::unsupported(FORMAT, "cannot encode an empty surface"));
    }
    let (color, channels) = match surface.content() {
        Content::Color => (png::ColorType::Rgb, 3),
        Content::ColorAlpha => (png::ColorType::Rgba, 4),
        Content::Alpha => (png::ColorType::Grayscale, 1),
    };
    let row_len = surface.width() as usize * channels;
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(row_len * surface.height() as usize)
        .map_err(|_| CodecError::NoMemory)?;
    for y in 0..surface.height() {
        check_stop(stop)?;
        let start = bytes.len();
        bytes.resize(start + row_len, 0);
        let dst = &mut bytes[start..];
        let src = surface.row(y);
        match surface.content() {
            Content::Color => pixel::packed_row_to_rgb(src, dst),
            Content::ColorAlpha => pixel::packed_row_to_rgba(src, dst),
            Content::Alpha => dst.copy_from_slice(&src[..row_len]),
        }
    }

    let mut encoder = png::Encoder::new(writer, surface.width(), surface.height());
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(match config.compression {
        PngCompression::Fast => png::Compression::Fast,
        PngCompression::Default => png::Compression::Balanced,
    });
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&bytes)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::loader::Loader;

    fn png_bytes(width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(data).unwrap();
        writer.finish().unwrap();
        out
    }

    fn decode_chunked(bytes: &[u8], chunk: usize) -> Result<Surface, CodecError> {
        let mut codec = PngCodec::new(&CodecContext::default());
        let mut loader = Loader::new(&mut codec);
        loader.start()?;
        for piece in bytes.chunks(chunk) {
            loader.push(piece)?;
        }
        loader.finish()
    }

    #[test]
    fn rgb_decodes_opaque() {
        let bytes = png_bytes(2, 1, png::ColorType::Rgb, &[255, 0, 0, 0, 0, 255]);
        let surface = decode_chunked(&bytes, 4096).unwrap();
        assert_eq!(surface.format(), SurfaceFormat::Rgb24);
        assert_eq!(surface.pixel(0, 0), 0xFFFF_0000);
        assert_eq!(surface.pixel(1, 0), 0xFF00_00FF);
    }

    #[test]
    fn rgba_is_premultiplied() {
        let bytes = png_bytes(1, 1, png::ColorType::Rgba, &[200, 100, 0, 128]);
        let surface = decode_chunked(&bytes, 4096).unwrap();
        assert_eq!(surface.format(), SurfaceFormat::Argb32);
        let px = pixel::unpack(surface.pixel(0, 0));
        assert_eq!(px.a, 128);
        assert_eq!(px.r, pixel::premultiply(128, 200));
        assert_eq!(px.g, pixel::premultiply(128, 100));
        assert_eq!(px.b, 0);
    }

    #[test]
    fn gray_alpha_expands() {
        let bytes = png_bytes(1, 1, png::ColorType::GrayscaleAlpha, &[90, 255]);
        let surface = decode_chunked(&bytes, 4096).unwrap();
        assert_eq!(surface.pixel(0, 0), 0xFF5A_5A5A);
    }

    #[test]
    fn byte_at_a_time_matches_single_call() {
        let data: Vec<u8> = (0..48).map(|i| (i * 5) as u8).collect();
        let bytes = png_bytes(4, 4, png::ColorType::Rgb, &data);
        let whole = decode_chunked(&bytes, bytes.len()).unwrap();
        let single = decode_chunked(&bytes, 1).unwrap();
        assert_eq!(whole, single);
        assert_eq!(whole.pixel(1, 0), 0xFF0F_1419);
    }

    #[test]
    fn header_read_before_pixels() {
        let bytes = png_bytes(3, 2, png::ColorType::Rgb, &[0; 18]);
        let mut codec = PngCodec::new(&CodecContext::default());
        codec.load_start().unwrap();
        // Signature plus the whole IHDR chunk.
        codec.load_increment(&bytes[..33]).unwrap();
        let ihdr = codec.header().copied().unwrap();
        assert_eq!((ihdr.width, ihdr.height, ihdr.color_type), (3, 2, 2));
        assert!(codec.preview().is_none());
        assert_eq!(codec.phase(), DecodePhase::HeaderPending);
    }

    #[test]
    fn bad_signature() {
        let err = decode_chunked(b"GIF89a\0\0\0\0", 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn truncated_stream() {
        let bytes = png_bytes(2, 2, png::ColorType::Rgb, &[7; 12]);
        let err = decode_chunked(&bytes[..bytes.len() - 6], 9).unwrap_err();
        assert_eq!(err.to_string(), "corrupt image: png: truncated image");
    }

    #[test]
    fn round_trip_every_content() {
        for format in [SurfaceFormat::Rgb24, SurfaceFormat::Argb32, SurfaceFormat::A8] {
            let mut surface = Surface::new(format, 3, 2).unwrap();
            for y in 0..2 {
                for x in 0..3 {
                    let v = (x * 60 + y * 20) as u8;
                    let px = match format {
                        SurfaceFormat::Rgb24 => pixel::opaque(rgb::RGB8::new(v, 255 - v, 7)),
                        SurfaceFormat::Argb32 => {
                            pixel::pack(pixel::premultiply_rgba(rgb::RGBA8::new(v, 9, 200, 255)))
                        }
                        SurfaceFormat::A8 => u32::from(v) << 24,
                    };
                    surface.set_pixel(x, y, px);
                }
            }
            let bytes = PngCodec::encode_to_vec(&surface, PngConfig::default()).unwrap();
            let decoded = decode_chunked(&bytes, 7).unwrap();
            match format {
                SurfaceFormat::A8 => {
                    // Alpha-only surfaces are stored as gray and read back opaque.
                    assert_eq!(decoded.format(), SurfaceFormat::Rgb24);
                    let v = pixel::unpack(decoded.pixel(2, 1)).r;
                    assert_eq!(v, 140);
                }
                _ => assert_eq!(decoded, surface),
            }
        }
    }

    #[test]
    fn fast_compression_still_decodes() {
        let surface = Surface::new(SurfaceFormat::Rgb24, 5, 5).unwrap();
        let config = PngConfig {
            compression: PngCompression::Fast,
        };
        let bytes = PngCodec::encode_to_vec(&surface, config).unwrap();
        assert_eq!(&bytes[..8], &PNG_SIGNATURE);
        assert_eq!(decode_chunked(&bytes, 64).unwrap().pixel(4, 4), 0xFF00_0000);
    }

    #[test]
    fn cancelled_save() {
        let token = crate::CancelToken::new();
        token.cancel();
        let surface = Surface::new(SurfaceFormat::Rgb24, 2, 2).unwrap();
        let mut codec = PngCodec::new(&CodecContext::default());
        let err = codec.save_to(&surface, &mut Vec::new(), &token).unwrap_err();
        assert!(matches!(err, CodecError::Cancelled));
    }
}
