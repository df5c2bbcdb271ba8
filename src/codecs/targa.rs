//! TARGA (TGA) codec.
//!
//! Decodes uncompressed and run-length encoded truecolor, grayscale and
//! colormapped images at 8, 15, 16, 24 and 32 bits per pixel. Pixel bytes are
//! stored R, G, B(, A); 15- and 16-bit pixels are words with the first byte
//! most significant. Output rows are always top-down, left-to-right: the
//! orientation bits of the descriptor are applied while rows are written.
//!
//! The encoder writes 24-bit truecolor, 32-bit truecolor with 8 alpha bits, or
//! 8-bit grayscale holding alpha, raw or run-length encoded.

use std::io::Write;

use crate::codec::{Codec, CodecContext, CodecCore, Collector, DecodePhase};
use crate::config::TargaConfig;
use crate::error::CodecError;
use crate::format::ImageFormat;
use crate::limits::{Stop, check_stop};
use crate::pixel::{self, opaque, scale_channel};
use crate::surface::{Content, Surface, SurfaceFormat};

use rgb::{RGB8, RGBA8};

const FORMAT: ImageFormat = ImageFormat::Targa;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 18;

const DESC_RIGHT_TO_LEFT: u8 = 0x10;
const DESC_TOP_TO_BOTTOM: u8 = 0x20;
const DESC_ALPHA_MASK: u8 = 0x0F;

/// Parsed 18-byte TARGA header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargaHeader {
    pub id_len: u8,
    pub colormap_type: u8,
    pub image_type: u8,
    pub map_first: u16,
    pub map_len: u16,
    pub map_entry_bits: u8,
    pub x_origin: u16,
    pub y_origin: u16,
    pub width: u16,
    pub height: u16,
    pub depth: u8,
    pub alpha_bits: u8,
    pub right_to_left: bool,
    pub top_to_bottom: bool,
}

impl TargaHeader {
    /// Parse without validating; see [`TargaHeader::validate`].
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::truncated(FORMAT));
        }
        let word = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let descriptor = bytes[17];
        Ok(Self {
            id_len: bytes[0],
            colormap_type: bytes[1],
            image_type: bytes[2],
            map_first: word(3),
            map_len: word(5),
            map_entry_bits: bytes[7],
            x_origin: word(8),
            y_origin: word(10),
            width: word(12),
            height: word(14),
            depth: bytes[16],
            alpha_bits: descriptor & DESC_ALPHA_MASK,
            right_to_left: descriptor & DESC_RIGHT_TO_LEFT != 0,
            top_to_bottom: descriptor & DESC_TOP_TO_BOTTOM != 0,
        })
    }

    /// Reject depths and image types this decoder cannot handle.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.colormap_type != 0 && self.depth != 8 {
            return Err(CodecError::unsupported(
                FORMAT,
                format!("wrong bit depth for colormap: {}", self.depth),
            ));
        }
        match self.depth {
            8 | 15 | 16 | 24 | 32 => {}
            depth => {
                return Err(CodecError::unsupported(
                    FORMAT,
                    format!("unsupported bit depth: {depth}"),
                ));
            }
        }
        match self.image_type {
            1 | 9 => {
                if self.colormap_type == 0 {
                    return Err(CodecError::corrupt(FORMAT, "colormapped image without colormap"));
                }
                if !matches!(self.map_entry_bits, 15 | 16 | 24 | 32) {
                    return Err(CodecError::unsupported(
                        FORMAT,
                        format!("unsupported colormap entry depth: {}", self.map_entry_bits),
                    ));
                }
            }
            2 | 10 if self.depth == 8 => {
                return Err(CodecError::unsupported(FORMAT, "8-bit truecolor"));
            }
            2 | 10 => {}
            3 | 11 if self.depth != 8 => {
                return Err(CodecError::unsupported(
                    FORMAT,
                    format!("unsupported grayscale bit depth: {}", self.depth),
                ));
            }
            3 | 11 => {}
            other => {
                return Err(CodecError::unsupported(
                    FORMAT,
                    format!("unsupported image type: {other}"),
                ));
            }
        }
        Ok(())
    }

    pub fn is_rle(&self) -> bool {
        (9..=11).contains(&self.image_type)
    }

    pub fn is_colormapped(&self) -> bool {
        matches!(self.image_type, 1 | 9)
    }

    pub fn is_grayscale(&self) -> bool {
        matches!(self.image_type, 3 | 11)
    }

    /// Bytes per stored pixel.
    pub fn pixel_bytes(&self) -> usize {
        usize::from(self.depth).div_ceil(8)
    }

    /// Bytes of colormap data following the image ID.
    pub fn colormap_bytes(&self) -> usize {
        if self.colormap_type == 0 {
            return 0;
        }
        usize::from(self.map_len) * usize::from(self.map_entry_bits).div_ceil(8)
    }

    /// Layout of the surface this image decodes into.
    pub fn surface_format(&self) -> SurfaceFormat {
        match self.depth {
            8 if self.is_colormapped() => {
                if self.map_entry_bits == 32 {
                    SurfaceFormat::Argb32
                } else {
                    SurfaceFormat::Rgb24
                }
            }
            8 if self.alpha_bits == 8 => SurfaceFormat::A8,
            8 => SurfaceFormat::Rgb24,
            15 | 16 if self.alpha_bits > 0 => SurfaceFormat::Argb32,
            15 | 16 | 24 => SurfaceFormat::Rgb24,
            // RGBX: the fourth byte is padding.
            _ if self.alpha_bits == 0 => SurfaceFormat::Rgb24,
            _ => SurfaceFormat::Argb32,
        }
    }

    fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.id_len;
        out[1] = self.colormap_type;
        out[2] = self.image_type;
        out[3..5].copy_from_slice(&self.map_first.to_le_bytes());
        out[5..7].copy_from_slice(&self.map_len.to_le_bytes());
        out[7] = self.map_entry_bits;
        out[8..10].copy_from_slice(&self.x_origin.to_le_bytes());
        out[10..12].copy_from_slice(&self.y_origin.to_le_bytes());
        out[12..14].copy_from_slice(&self.width.to_le_bytes());
        out[14..16].copy_from_slice(&self.height.to_le_bytes());
        out[16] = self.depth;
        out[17] = (self.alpha_bits & DESC_ALPHA_MASK)
            | if self.right_to_left { DESC_RIGHT_TO_LEFT } else { 0 }
            | if self.top_to_bottom { DESC_TOP_TO_BOTTOM } else { 0 };
        out
    }
}

/// Packed word of a stored pixel of `depth` bits.
fn decode_pixel(px: &[u8], depth: u8, alpha_bits: u8) -> u32 {
    match depth {
        15 | 16 => {
            let word = u32::from(u16::from_be_bytes([px[0], px[1]]));
            if depth == 16 && alpha_bits == 0 {
                // RGB565
                return opaque(RGB8::new(
                    scale_channel((word >> 11) & 0x1F, 31),
                    scale_channel((word >> 5) & 0x3F, 63),
                    scale_channel(word & 0x1F, 31),
                ));
            }
            let color = RGB8::new(
                scale_channel((word >> 10) & 0x1F, 31),
                scale_channel((word >> 5) & 0x1F, 31),
                scale_channel(word & 0x1F, 31),
            );
            if alpha_bits == 0 {
                opaque(color)
            } else {
                let alpha = if word & 0x8000 != 0 { 255 } else { 0 };
                pixel::pack(pixel::premultiply_rgba(RGBA8::new(
                    color.r, color.g, color.b, alpha,
                )))
            }
        }
        24 => opaque(RGB8::new(px[0], px[1], px[2])),
        _ if alpha_bits == 0 => opaque(RGB8::new(px[0], px[1], px[2])),
        _ => pixel::pack(pixel::premultiply_rgba(RGBA8::new(px[0], px[1], px[2], px[3]))),
    }
}

/// Colormap entries as packed words.
fn build_colormap(bytes: &[u8], entry_bits: u8) -> Vec<u32> {
    let entry_len = usize::from(entry_bits).div_ceil(8);
    // 16-bit entries carry an attribute bit that is not alpha.
    let alpha_bits = if entry_bits == 32 { 8 } else { 0 };
    let depth = if entry_bits == 16 { 15 } else { entry_bits };
    bytes
        .chunks_exact(entry_len)
        .map(|entry| decode_pixel(entry, depth, alpha_bits))
        .collect()
}

#[derive(Clone, Copy, Debug)]
enum Packet {
    /// Next byte is a packet header.
    Control,
    /// Collecting the pixel of a repeat packet.
    Repeat { count: u32, pixel: [u8; 4], have: usize },
    /// Literal pixel bytes still to copy.
    Direct { left: usize },
}

enum Stage {
    Header(Collector),
    ImageId { left: usize },
    Colormap(Collector),
    Pixels,
    Done,
}

/// TARGA codec.
pub struct TargaCodec {
    core: CodecCore,
    config: TargaConfig,
    stage: Stage,
    header: Option<TargaHeader>,
    colormap: Vec<u32>,
    row: Vec<u8>,
    fill: usize,
    rows_done: u32,
    packet: Packet,
}

impl TargaCodec {
    pub fn new(context: &CodecContext) -> Self {
        Self {
            core: CodecCore::new(FORMAT, context),
            config: context.config.targa,
            stage: Stage::Done,
            header: None,
            colormap: Vec::new(),
            row: Vec::new(),
            fill: 0,
            rows_done: 0,
            packet: Packet::Control,
        }
    }

    /// Header of the image being decoded, once parsed.
    pub fn header(&self) -> Option<&TargaHeader> {
        self.header.as_ref()
    }

    fn step(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        match &mut self.stage {
            Stage::Header(collector) => {
                let n = collector.feed(buf);
                if collector.is_full() {
                    let header = TargaHeader::parse(collector.bytes())?;
                    header.validate()?;
                    log::debug!("targa: header {header:?}");
                    self.header = Some(header);
                    self.stage = Stage::ImageId {
                        left: usize::from(header.id_len),
                    };
                    self.advance(header)?;
                }
                Ok(n)
            }
            Stage::ImageId { left } => {
                let take = (*left).min(buf.len());
                *left -= take;
                if let Some(header) = self.header {
                    self.advance(header)?;
                }
                Ok(take)
            }
            Stage::Colormap(collector) => {
                let n = collector.feed(buf);
                if collector.is_full() {
                    if let Some(header) = self.header {
                        if header.is_colormapped() {
                            self.colormap = build_colormap(collector.bytes(), header.map_entry_bits);
                        }
                        self.begin_pixels(header)?;
                    }
                }
                Ok(n)
            }
            Stage::Pixels => self.decode_pixels(buf),
            Stage::Done => {
                log::warn!("targa: ignoring {} trailing bytes", buf.len());
                Ok(buf.len())
            }
        }
    }

    /// Move past stages that have nothing left to read.
    fn advance(&mut self, header: TargaHeader) -> Result<(), CodecError> {
        if let Stage::ImageId { left: 0 } = self.stage {
            let colormap = header.colormap_bytes();
            if colormap > 0 {
                self.stage = Stage::Colormap(Collector::new(colormap));
            } else {
                self.begin_pixels(header)?;
            }
        }
        Ok(())
    }

    fn begin_pixels(&mut self, header: TargaHeader) -> Result<(), CodecError> {
        if header.is_colormapped() && self.colormap.is_empty() {
            return Err(CodecError::corrupt(FORMAT, "colormapped image without colormap"));
        }
        let format = header.surface_format();
        self.core
            .create_surface(format, u32::from(header.width), u32::from(header.height))?;
        let row_len = usize::from(header.width) * header.pixel_bytes();
        self.row.clear();
        self.row.try_reserve_exact(row_len).map_err(|_| CodecError::NoMemory)?;
        self.row.resize(row_len, 0);
        self.fill = 0;
        self.rows_done = 0;
        self.packet = Packet::Control;
        if header.width == 0 || header.height == 0 {
            self.finish_pixels();
        } else {
            self.stage = Stage::Pixels;
        }
        Ok(())
    }

    fn finish_pixels(&mut self) {
        self.stage = Stage::Done;
        self.core.complete_pass();
        self.core.set_phase(DecodePhase::Finished);
    }

    fn decode_pixels(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        let Some(header) = self.header else {
            return Err(CodecError::failure(FORMAT, "pixel data before header"));
        };
        if !header.is_rle() {
            let mut pos = 0;
            while pos < buf.len() && matches!(self.stage, Stage::Pixels) {
                let take = (self.row.len() - self.fill).min(buf.len() - pos);
                self.write_bytes(&header, &buf[pos..pos + take])?;
                pos += take;
            }
            return Ok(pos);
        }

        let bpp = header.pixel_bytes();
        let mut pos = 0;
        while pos < buf.len() && matches!(self.stage, Stage::Pixels) {
            match &mut self.packet {
                Packet::Control => {
                    let control = buf[pos];
                    pos += 1;
                    let count = usize::from(control & 0x7F) + 1;
                    self.packet = if control & 0x80 != 0 {
                        Packet::Repeat {
                            count: count as u32,
                            pixel: [0; 4],
                            have: 0,
                        }
                    } else {
                        Packet::Direct { left: count * bpp }
                    };
                }
                Packet::Repeat { count, pixel, have } => {
                    let take = (bpp - *have).min(buf.len() - pos);
                    pixel[*have..*have + take].copy_from_slice(&buf[pos..pos + take]);
                    *have += take;
                    pos += take;
                    if *have == bpp {
                        let (count, pixel) = (*count, *pixel);
                        self.packet = Packet::Control;
                        for _ in 0..count {
                            self.write_bytes(&header, &pixel[..bpp])?;
                        }
                    }
                }
                Packet::Direct { left } => {
                    let take = (*left).min(buf.len() - pos);
                    *left -= take;
                    if *left == 0 {
                        self.packet = Packet::Control;
                    }
                    self.write_bytes(&header, &buf[pos..pos + take])?;
                    pos += take;
                }
            }
        }
        Ok(pos)
    }

    /// Append stored pixel bytes to the current row, emitting full rows.
    /// Bytes past the last row are dropped.
    fn write_bytes(&mut self, header: &TargaHeader, mut bytes: &[u8]) -> Result<(), CodecError> {
        while !bytes.is_empty() && self.rows_done < u32::from(header.height) {
            let take = (self.row.len() - self.fill).min(bytes.len());
            self.row[self.fill..self.fill + take].copy_from_slice(&bytes[..take]);
            self.fill += take;
            bytes = &bytes[take..];
            if self.fill == self.row.len() {
                self.emit_row(header)?;
                self.fill = 0;
            }
        }
        if !bytes.is_empty() {
            log::warn!("targa: run-length packet overruns the image by {} bytes", bytes.len());
        }
        Ok(())
    }

    fn emit_row(&mut self, header: &TargaHeader) -> Result<(), CodecError> {
        let width = u32::from(header.width);
        let height = u32::from(header.height);
        let y = if header.top_to_bottom {
            self.rows_done
        } else {
            height - 1 - self.rows_done
        };
        let bpp = header.pixel_bytes();
        let Some(surface) = self.core.surface_mut() else {
            return Err(CodecError::failure(FORMAT, "data is NULL"));
        };
        for (i, px) in self.row.chunks_exact(bpp).enumerate() {
            let value = if header.is_colormapped() {
                let index = usize::from(px[0]);
                let entry = index
                    .checked_sub(usize::from(header.map_first))
                    .and_then(|i| self.colormap.get(i));
                match entry {
                    Some(&entry) => entry,
                    None => {
                        return Err(CodecError::corrupt(
                            FORMAT,
                            format!("colormap index out of range: {index}"),
                        ));
                    }
                }
            } else if header.depth == 8 {
                match surface.format() {
                    SurfaceFormat::A8 => u32::from(px[0]) << 24,
                    _ => opaque(pixel::gray_to_rgb(px[0])),
                }
            } else {
                decode_pixel(px, header.depth, header.alpha_bits)
            };
            let x = i as u32;
            let x = if header.right_to_left { width - 1 - x } else { x };
            surface.set_pixel(x, y, value);
        }
        self.rows_done += 1;
        if self.rows_done == height {
            self.finish_pixels();
        }
        Ok(())
    }

    /// Encode a surface into a new buffer.
    pub fn encode_to_vec(surface: &Surface, config: TargaConfig) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        encode(surface, config, &mut out, &crate::Unstoppable)?;
        Ok(out)
    }
}

impl Codec for TargaCodec {
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
        self.header = None;
        self.colormap.clear();
        self.row.clear();
        self.fill = 0;
        self.rows_done = 0;
        self.packet = Packet::Control;
        self.stage = Stage::Header(Collector::new(HEADER_LEN));
        Ok(())
    }

    fn load_increment(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        self.core.begin_increment()?;
        let result = self.step(buf);
        self.core.end_increment(result)
    }

    fn load_finish(&mut self) -> Result<Surface, CodecError> {
        self.stage = Stage::Done;
        self.colormap = Vec::new();
        self.row = Vec::new();
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
    config: TargaConfig,
    writer: &mut dyn Write,
    stop: &dyn Stop,
) -> Result<(), CodecError> {
    let too_large = || CodecError::unsupported(FORMAT, "image too large");
    let width = u16::try_from(surface.width()).map_err(|_| too_large())?;
    let height = u16::try_from(surface.height()).map_err(|_| too_large())?;
    let content = surface.content();
    let (image_type, depth, alpha_bits) = match content {
        Content::Color => (2, 24, 0),
        Content::ColorAlpha => (2, 32, 8),
        Content::Alpha => (3, 8, 8),
    };
    let header = TargaHeader {
        id_len: 0,
        colormap_type: 0,
        image_type: if config.rle { image_type + 8 } else { image_type },
        map_first: 0,
        map_len: 0,
        map_entry_bits: 0,
        x_origin: 0,
        y_origin: 0,
        width,
        height,
        depth,
        alpha_bits,
        right_to_left: false,
        top_to_bottom: true,
    };
    log::debug!("targa: encoding {header:?}");
    writer.write_all(&header.to_bytes())?;

    let bpp = header.pixel_bytes();
    let mut row = vec![0u8; usize::from(width) * bpp];
    let mut packed = Vec::new();
    for y in 0..surface.height() {
        check_stop(stop)?;
        let src = surface.row(y);
        match content {
            Content::Color => pixel::packed_row_to_rgb(src, &mut row),
            Content::ColorAlpha => pixel::packed_row_to_rgba(src, &mut row),
            Content::Alpha => {
                let n = row.len();
                row.copy_from_slice(&src[..n]);
            }
        }
        if config.rle {
            packed.clear();
            encode_rle_row(&row, bpp, &mut packed);
            writer.write_all(&packed)?;
        } else {
            writer.write_all(&row)?;
        }
    }
    Ok(())
}

/// Run-length encode one row of `bpp`-byte pixels. Packets never span rows.
fn encode_rle_row(row: &[u8], bpp: usize, out: &mut Vec<u8>) {
    let n = row.len() / bpp;
    let px = |i: usize| &row[i * bpp..(i + 1) * bpp];
    let mut i = 0;
    while i < n {
        let mut run = 1;
        while i + run < n && run < 128 && px(i + run) == px(i) {
            run += 1;
        }
        if run >= 2 {
            out.push(0x80 | (run - 1) as u8);
            out.extend_from_slice(px(i));
            i += run;
            continue;
        }
        let start = i;
        while i < n && i - start < 128 {
            if i + 1 < n && px(i) == px(i + 1) {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&row[start * bpp..i * bpp]);
    }
}
