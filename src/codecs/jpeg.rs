//! JPEG loader over `jpeg-decoder`.
//!
//! Bytes are scanned at marker level as they arrive: the frame header gives
//! the surface size, the first scan allocates the surface, and the end-of-image
//! marker triggers the full decode. For progressive streams every completed
//! scan re-renders the surface from the data seen so far and reports a pass;
//! the increment returns early at that point so the driver can show it.
//!
//! Saving is not supported.

use std::io::Cursor;

use crate::codec::{Codec, CodecContext, CodecCore, DecodePhase};
use crate::config::JpegConfig;
use crate::error::CodecError;
use crate::format::ImageFormat;
use crate::pixel;
use crate::surface::{Surface, SurfaceFormat};

use jpeg_decoder::PixelFormat;

const FORMAT: ImageFormat = ImageFormat::Jpeg;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP14: u8 = 0xEE;

/// Frame parameters from a SOFn segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub precision: u8,
    pub width: u16,
    pub height: u16,
    pub components: u8,
    pub progressive: bool,
}

impl FrameHeader {
    fn parse(code: u8, payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() < 6 {
            return Err(CodecError::corrupt(FORMAT, "short frame header"));
        }
        let frame = Self {
            precision: payload[0],
            height: u16::from_be_bytes([payload[1], payload[2]]),
            width: u16::from_be_bytes([payload[3], payload[4]]),
            components: payload[5],
            progressive: matches!(code, 0xC2 | 0xC6 | 0xCA | 0xCE),
        };
        if frame.precision != 8 {
            return Err(CodecError::unsupported(
                FORMAT,
                format!("unsupported sample precision: {}", frame.precision),
            ));
        }
        if frame.width == 0 {
            return Err(CodecError::corrupt(FORMAT, "zero width"));
        }
        if frame.height == 0 {
            return Err(CodecError::unsupported(FORMAT, "height defined by DNL marker"));
        }
        if !matches!(frame.components, 1 | 3 | 4) {
            return Err(CodecError::unsupported(
                FORMAT,
                format!("unsupported component count: {}", frame.components),
            ));
        }
        Ok(frame)
    }
}

fn is_sof(code: u8) -> bool {
    matches!(code, 0xC0..=0xCF) && !matches!(code, 0xC4 | 0xC8 | 0xCC)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scan {
    /// Expecting `FF D8`; holds how many of those bytes were seen.
    Soi(u8),
    /// Expecting `FF`.
    Marker,
    /// After `FF`, expecting a marker code.
    MarkerCode,
    /// Reading the two length bytes of a segment.
    Length { code: u8, high: Option<u8> },
    /// Inside a segment payload.
    Segment { code: u8, left: usize },
    /// Inside entropy-coded data.
    Entropy { after_ff: bool },
    Done,
}

/// Incremental JPEG loader.
pub struct JpegCodec {
    core: CodecCore,
    config: JpegConfig,
    scan: Scan,
    data: Vec<u8>,
    payload: Vec<u8>,
    frame: Option<FrameHeader>,
    adobe: bool,
    scans: u32,
}

impl JpegCodec {
    pub fn new(context: &CodecContext) -> Self {
        Self {
            core: CodecCore::new(FORMAT, context),
            config: context.config.jpeg,
            scan: Scan::Done,
            data: Vec::new(),
            payload: Vec::new(),
            frame: None,
            adobe: false,
            scans: 0,
        }
    }

    /// Frame header of the stream being decoded, once seen.
    pub fn frame(&self) -> Option<&FrameHeader> {
        self.frame.as_ref()
    }

    /// Whether the stream carries an Adobe APP14 segment.
    pub fn is_adobe(&self) -> bool {
        self.adobe
    }

    fn step(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        let mut i = 0;
        while i < buf.len() {
            match self.scan {
                Scan::Soi(seen) => {
                    let expected = if seen == 0 { 0xFF } else { SOI };
                    if buf[i] != expected {
                        return Err(CodecError::corrupt(FORMAT, "missing start of image"));
                    }
                    self.data.push(buf[i]);
                    i += 1;
                    self.scan = if seen == 0 { Scan::Soi(1) } else { Scan::Marker };
                }
                Scan::Marker => {
                    if buf[i] != 0xFF {
                        return Err(CodecError::corrupt(
                            FORMAT,
                            format!("expected marker, found 0x{:02X}", buf[i]),
                        ));
                    }
                    self.data.push(buf[i]);
                    i += 1;
                    self.scan = Scan::MarkerCode;
                }
                Scan::MarkerCode => {
                    let code = buf[i];
                    self.data.push(code);
                    i += 1;
                    self.on_marker(code)?;
                }
                Scan::Length { code, high } => {
                    let byte = buf[i];
                    self.data.push(byte);
                    i += 1;
                    let Some(high) = high else {
                        self.scan = Scan::Length {
                            code,
                            high: Some(byte),
                        };
                        continue;
                    };
                    let len = usize::from(u16::from_be_bytes([high, byte]));
                    if len < 2 {
                        return Err(CodecError::corrupt(FORMAT, "invalid segment length"));
                    }
                    self.payload.clear();
                    self.scan = Scan::Segment { code, left: len - 2 };
                    if len == 2 {
                        self.on_segment(code)?;
                    }
                }
                Scan::Segment { code, left } => {
                    let take = left.min(buf.len() - i);
                    let bytes = &buf[i..i + take];
                    self.data.extend_from_slice(bytes);
                    if is_sof(code) || code == APP14 {
                        self.payload.extend_from_slice(bytes);
                    }
                    i += take;
                    self.scan = Scan::Segment {
                        code,
                        left: left - take,
                    };
                    if left == take {
                        self.on_segment(code)?;
                    }
                }
                Scan::Entropy { after_ff: false } => {
                    let rest = &buf[i..];
                    let (n, after_ff) = match rest.iter().position(|&b| b == 0xFF) {
                        Some(p) => (p + 1, true),
                        None => (rest.len(), false),
                    };
                    self.data.extend_from_slice(&rest[..n]);
                    i += n;
                    self.scan = Scan::Entropy { after_ff };
                }
                Scan::Entropy { after_ff: true } => {
                    let code = buf[i];
                    self.data.push(code);
                    i += 1;
                    match code {
                        // Stuffed zero and restart markers belong to the scan.
                        0x00 | 0xD0..=0xD7 => self.scan = Scan::Entropy { after_ff: false },
                        0xFF => {}
                        _ => {
                            self.scans += 1;
                            log::debug!("jpeg: scan {} complete", self.scans);
                            let refined = code != EOI && self.refine_preview();
                            self.on_marker(code)?;
                            if refined {
                                return Ok(i);
                            }
                        }
                    }
                }
                Scan::Done => {
                    log::warn!("jpeg: ignoring {} bytes after end of image", buf.len() - i);
                    return Ok(buf.len());
                }
            }
        }
        Ok(i)
    }

    fn on_marker(&mut self, code: u8) -> Result<(), CodecError> {
        self.scan = match code {
            0xFF => Scan::MarkerCode,
            EOI => {
                self.decode_final()?;
                Scan::Done
            }
            SOI | 0x01 | 0xD0..=0xD7 => Scan::Marker,
            _ => Scan::Length { code, high: None },
        };
        Ok(())
    }

    fn on_segment(&mut self, code: u8) -> Result<(), CodecError> {
        self.scan = Scan::Marker;
        if is_sof(code) {
            if self.frame.is_some() {
                return Err(CodecError::corrupt(FORMAT, "multiple frame headers"));
            }
            let frame = FrameHeader::parse(code, &self.payload)?;
            log::debug!("jpeg: frame {frame:?}");
            self.frame = Some(frame);
        } else if code == APP14 {
            if self.payload.starts_with(b"Adobe") {
                self.adobe = true;
            }
        } else if code == SOS {
            let Some(frame) = self.frame else {
                return Err(CodecError::corrupt(FORMAT, "scan before frame header"));
            };
            if self.core.surface().is_none() {
                self.core.create_surface(
                    SurfaceFormat::Rgb24,
                    u32::from(frame.width),
                    u32::from(frame.height),
                )?;
            }
            self.scan = Scan::Entropy { after_ff: false };
        }
        Ok(())
    }

    /// Re-render the surface from the scans seen so far.
    ///
    /// Only progressive streams are refined. Returns whether a pass completed.
    fn refine_preview(&mut self) -> bool {
        let progressive = self.frame.is_some_and(|f| f.progressive);
        if !progressive || !self.config.progressive_preview || self.core.surface().is_none() {
            return false;
        }
        // Everything before the marker that ended the scan, then EOI.
        let mut prefix = Vec::with_capacity(self.data.len());
        prefix.extend_from_slice(&self.data[..self.data.len() - 2]);
        prefix.extend_from_slice(&[0xFF, EOI]);
        match self.decode_into_surface(&prefix) {
            Ok(()) => {
                self.core.set_phase(DecodePhase::ProgressiveRefining);
                self.core.complete_pass();
                true
            }
            Err(e) => {
                log::warn!("jpeg: preview after scan {} failed: {e}", self.scans);
                false
            }
        }
    }

    fn decode_final(&mut self) -> Result<(), CodecError> {
        if self.core.surface().is_none() {
            return Err(CodecError::corrupt(FORMAT, "no image data before end of image"));
        }
        let data = std::mem::take(&mut self.data);
        let result = self.decode_into_surface(&data);
        self.data = data;
        result?;
        self.core.complete_pass();
        self.core.set_phase(DecodePhase::Finished);
        Ok(())
    }

    fn decode_into_surface(&mut self, stream: &[u8]) -> Result<(), CodecError> {
        let Some(frame) = self.frame else {
            return Err(CodecError::corrupt(FORMAT, "missing frame header"));
        };
        let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(stream));
        let pixels = decoder.decode()?;
        let info = decoder
            .info()
            .ok_or_else(|| CodecError::corrupt(FORMAT, "missing frame header"))?;
        if info.width != frame.width || info.height != frame.height {
            return Err(CodecError::corrupt(FORMAT, "frame size changed while decoding"));
        }
        let channels = match info.pixel_format {
            PixelFormat::L8 => 1,
            PixelFormat::RGB24 => 3,
            PixelFormat::CMYK32 => 4,
            #[allow(unreachable_patterns)]
            other => {
                return Err(CodecError::unsupported(
                    FORMAT,
                    format!("unsupported pixel format: {other:?}"),
                ));
            }
        };
        let row_len = usize::from(frame.width) * channels;
        if pixels.len() < row_len * usize::from(frame.height) {
            return Err(CodecError::corrupt(FORMAT, "decoder returned too few pixels"));
        }
        let adobe = self.adobe;
        let Some(surface) = self.core.surface_mut() else {
            return Err(CodecError::failure(FORMAT, "surface data is missing"));
        };
        for (y, src) in pixels.chunks_exact(row_len).take(usize::from(frame.height)).enumerate() {
            let dst = surface.row_mut(y as u32);
            match channels {
                1 => pixel::gray_row_to_packed(src, dst),
                3 => pixel::rgb_row_to_packed(src, dst),
                _ => cmyk_row_to_packed(src, dst, adobe),
            }
        }
        Ok(())
    }
}

/// Four-channel rows from `jpeg-decoder` to opaque packed words.
///
/// The decoder hands back `255 - stored` for every channel of both CMYK and
/// YCCK streams, so the stored samples are restored before the ink policy
/// is applied.
fn cmyk_row_to_packed(src: &[u8], dst: &mut [u8], adobe: bool) {
    for (px, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let stored = [255 - px[0], 255 - px[1], 255 - px[2], 255 - px[3]];
        pixel::write_packed(out, pixel::opaque(pixel::cmyk_to_rgb(stored, adobe)));
    }
}

impl Codec for JpegCodec {
    fn format(&self) -> ImageFormat {
        FORMAT
    }

    fn can_load(&self) -> bool {
        true
    }

    fn load_start(&mut self) -> Result<(), CodecError> {
        self.core.reset();
        self.scan = Scan::Soi(0);
        self.data = Vec::new();
        self.payload.clear();
        self.frame = None;
        self.adobe = false;
        self.scans = 0;
        Ok(())
    }

    fn load_increment(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        self.core.begin_increment()?;
        let result = self.step(buf);
        self.core.end_increment(result)
    }

    fn load_finish(&mut self) -> Result<Surface, CodecError> {
        self.scan = Scan::Done;
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
}
