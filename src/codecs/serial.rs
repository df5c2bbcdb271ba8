//! Raw surface dumps.
//!
//! A 16-byte header of four native-endian `i32` values (content kind, width,
//! height, stride) followed by `height * stride` bytes copied verbatim from
//! the surface. Not portable across byte orders; meant for lossless
//! round-tripping of a surface through a byte stream.

use std::io::Write;

use crate::codec::{Codec, CodecContext, CodecCore, Collector, DecodePhase};
use crate::error::CodecError;
use crate::format::ImageFormat;
use crate::limits::{Stop, check_stop};
use crate::surface::{Content, Surface, SurfaceFormat};

const FORMAT: ImageFormat = ImageFormat::Serial;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 16;

/// Fixed preamble of a serial dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialHeader {
    pub content: Content,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

impl SerialHeader {
    /// Header describing `surface`.
    pub fn for_surface(surface: &Surface) -> Self {
        Self {
            content: surface.content(),
            width: surface.width(),
            height: surface.height(),
            stride: surface.stride(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::truncated(FORMAT));
        }
        let field = |i: usize| {
            let at = i * 4;
            i32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let content = Content::from_raw(field(0))
            .ok_or_else(|| CodecError::unsupported(FORMAT, "unsupported content type"))?;
        let dimension = |value: i32, what: &str| {
            u32::try_from(value)
                .map_err(|_| CodecError::corrupt(FORMAT, format!("negative {what}: {value}")))
        };
        let width = dimension(field(1), "width")?;
        let height = dimension(field(2), "height")?;
        let stride = dimension(field(3), "stride")? as usize;
        Ok(Self {
            content,
            width,
            height,
            stride,
        })
    }

    pub fn to_bytes(&self) -> Result<[u8; HEADER_LEN], CodecError> {
        let field = |value: usize| {
            i32::try_from(value).map_err(|_| CodecError::failure(FORMAT, "dimension out of range"))
        };
        let values = [
            self.content.to_raw(),
            field(self.width as usize)?,
            field(self.height as usize)?,
            field(self.stride)?,
        ];
        let mut out = [0u8; HEADER_LEN];
        for (chunk, value) in out.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        Ok(out)
    }

    /// Bytes of pixel data following the header.
    pub fn data_len(&self) -> usize {
        self.stride.saturating_mul(self.height as usize)
    }
}

/// Number of bytes [`SerialCodec`] writes for `surface`.
pub fn encoded_size(surface: &Surface) -> usize {
    HEADER_LEN + surface.stride() * surface.height() as usize
}

enum State {
    Header(Collector),
    Data { offset: usize },
    Done,
}

/// Codec for raw surface dumps.
pub struct SerialCodec {
    core: CodecCore,
    state: State,
}

impl SerialCodec {
    pub fn new(context: &CodecContext) -> Self {
        Self {
            core: CodecCore::new(FORMAT, context),
            state: State::Done,
        }
    }

    /// Dump a surface into a new buffer.
    pub fn encode_to_vec(surface: &Surface) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(encoded_size(surface));
        write_surface(surface, &mut out, &crate::Unstoppable)?;
        Ok(out)
    }

    fn step(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        match &mut self.state {
            State::Header(collector) => {
                let n = collector.feed(buf);
                if collector.is_full() {
                    let header = SerialHeader::parse(collector.bytes())?;
                    self.begin_data(header)?;
                }
                Ok(n)
            }
            State::Data { offset } => {
                let Some(surface) = self.core.surface_mut() else {
                    return Err(CodecError::failure(FORMAT, "surface data is missing"));
                };
                let data = surface.data_mut();
                let take = (data.len() - *offset).min(buf.len());
                data[*offset..*offset + take].copy_from_slice(&buf[..take]);
                *offset += take;
                if *offset == data.len() {
                    self.state = State::Done;
                    self.core.complete_pass();
                    self.core.set_phase(DecodePhase::Finished);
                }
                Ok(take)
            }
            State::Done => {
                log::warn!("serial: ignoring {} bytes of trailing data", buf.len());
                Ok(buf.len())
            }
        }
    }

    fn begin_data(&mut self, header: SerialHeader) -> Result<(), CodecError> {
        log::debug!("serial: header {header:?}");
        let format = SurfaceFormat::for_content(header.content);
        let surface = self.core.create_surface(format, header.width, header.height)?;
        if surface.stride() != header.stride {
            return Err(CodecError::failure(FORMAT, "invalid stride"));
        }
        if header.data_len() == 0 {
            self.state = State::Done;
            self.core.set_phase(DecodePhase::Finished);
        } else {
            self.state = State::Data { offset: 0 };
        }
        Ok(())
    }
}

impl Codec for SerialCodec {
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
        self.state = State::Header(Collector::new(HEADER_LEN));
        Ok(())
    }

    fn load_increment(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        self.core.begin_increment()?;
        let result = self.step(buf);
        self.core.end_increment(result)
    }

    fn load_finish(&mut self) -> Result<Surface, CodecError> {
        self.state = State::Done;
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
        write_surface(surface, writer, stop)
    }
}

fn write_surface(surface: &Surface, writer: &mut dyn Write, stop: &dyn Stop) -> Result<(), CodecError> {
    let header = SerialHeader::for_surface(surface);
    writer.write_all(&header.to_bytes()?)?;
    for y in 0..surface.height() {
        check_stop(stop)?;
        writer.write_all(surface.row(y))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::loader::Loader;

    fn sample(format: SurfaceFormat, width: u32, height: u32) -> Surface {
        let mut surface = Surface::new(format, width, height).unwrap();
        for (i, byte) in surface.data_mut().iter_mut().enumerate() {
            *byte = (i * 7 + 3) as u8;
        }
        surface
    }

    fn decode_chunked(bytes: &[u8], chunk: usize) -> Result<Surface, CodecError> {
        let mut codec = SerialCodec::new(&CodecContext::default());
        let mut loader = Loader::new(&mut codec);
        loader.start()?;
        for piece in bytes.chunks(chunk) {
            loader.push(piece)?;
        }
        loader.finish()
    }

    #[test]
    fn round_trip_is_byte_identical() {
        for format in [SurfaceFormat::Argb32, SurfaceFormat::Rgb24, SurfaceFormat::A8] {
            let surface = sample(format, 5, 3);
            let bytes = SerialCodec::encode_to_vec(&surface).unwrap();
            assert_eq!(bytes.len(), encoded_size(&surface));
            let decoded = decode_chunked(&bytes, bytes.len()).unwrap();
            assert_eq!(decoded, surface);
        }
    }

    #[test]
    fn byte_at_a_time_matches() {
        let surface = sample(SurfaceFormat::Argb32, 3, 4);
        let bytes = SerialCodec::encode_to_vec(&surface).unwrap();
        let whole = decode_chunked(&bytes, bytes.len()).unwrap();
        let single = decode_chunked(&bytes, 1).unwrap();
        assert_eq!(whole, single);
    }

    #[test]
    fn stride_mismatch_is_failure() {
        let surface = sample(SurfaceFormat::A8, 3, 2);
        let mut bytes = SerialCodec::encode_to_vec(&surface).unwrap();
        bytes[12..16].copy_from_slice(&8i32.to_ne_bytes());
        let err = decode_chunked(&bytes, 64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failure);
        assert_eq!(err.to_string(), "serial: invalid stride");
    }

    #[test]
    fn unknown_content_is_unsupported() {
        let mut bytes = SerialCodec::encode_to_vec(&sample(SurfaceFormat::A8, 1, 1)).unwrap();
        bytes[0..4].copy_from_slice(&0x4000i32.to_ne_bytes());
        let err = decode_chunked(&bytes, 64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn negative_height_is_corrupt() {
        let mut bytes = SerialCodec::encode_to_vec(&sample(SurfaceFormat::A8, 1, 1)).unwrap();
        bytes[8..12].copy_from_slice(&(-1i32).to_ne_bytes());
        let err = decode_chunked(&bytes, 64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn truncation_is_corrupt() {
        let bytes = SerialCodec::encode_to_vec(&sample(SurfaceFormat::Rgb24, 4, 4)).unwrap();
        let err = decode_chunked(&bytes[..bytes.len() - 1], 16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        let err = decode_chunked(&bytes[..10], 16).unwrap_err();
        assert_eq!(err.to_string(), "corrupt image: serial: truncated image");
    }

    #[test]
    fn empty_surface_round_trips() {
        let surface = Surface::new(SurfaceFormat::Argb32, 0, 0).unwrap();
        let bytes = SerialCodec::encode_to_vec(&surface).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(decode_chunked(&bytes, 3).unwrap(), surface);
    }

    #[test]
    fn codec_is_reusable() {
        let mut codec = SerialCodec::new(&CodecContext::default());
        let a = sample(SurfaceFormat::A8, 2, 2);
        let b = sample(SurfaceFormat::Rgb24, 1, 3);
        for surface in [&a, &b] {
            let mut out = Vec::new();
            codec.save_to(surface, &mut out, &crate::Unstoppable).unwrap();
            let decoded = codec.load(&mut out.as_slice(), &crate::Unstoppable).unwrap();
            assert_eq!(&decoded, surface);
        }
    }
}
