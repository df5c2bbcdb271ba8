//! In-memory pixel surfaces and the factory codecs allocate them through.
//!
//! A [`Surface`] holds packed pixels: 32-bit native-endian `0xAARRGGBB` words
//! for [`SurfaceFormat::Argb32`] and [`SurfaceFormat::Rgb24`] (the top byte is
//! `0xFF` for the latter), one alpha byte per pixel for [`SurfaceFormat::A8`].
//! Color channels of `Argb32` surfaces are premultiplied by alpha.

use imgref::ImgVec;
use rgb::RGBA8;

use crate::error::CodecError;
use crate::pixel;

/// What a surface carries.
///
/// The discriminants are the values written into serial dump headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Content {
    /// Opaque color.
    Color,
    /// Alpha coverage only.
    Alpha,
    /// Color plus alpha.
    ColorAlpha,
}

impl Content {
    /// Raw header value.
    pub fn to_raw(self) -> i32 {
        match self {
            Content::Color => 0x1000,
            Content::Alpha => 0x2000,
            Content::ColorAlpha => 0x3000,
        }
    }

    /// Parse a raw header value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0x1000 => Some(Content::Color),
            0x2000 => Some(Content::Alpha),
            0x3000 => Some(Content::ColorAlpha),
            _ => None,
        }
    }

    pub fn has_color(self) -> bool {
        !matches!(self, Content::Alpha)
    }

    pub fn has_alpha(self) -> bool {
        !matches!(self, Content::Color)
    }
}

/// Realized memory layout of a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// Premultiplied ARGB, one native-endian `u32` per pixel.
    Argb32,
    /// Opaque RGB stored in a `u32` per pixel, alpha byte fixed to `0xFF`.
    Rgb24,
    /// One alpha byte per pixel.
    A8,
}

impl SurfaceFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            SurfaceFormat::Argb32 | SurfaceFormat::Rgb24 => 4,
            SurfaceFormat::A8 => 1,
        }
    }

    pub fn content(self) -> Content {
        match self {
            SurfaceFormat::Argb32 => Content::ColorAlpha,
            SurfaceFormat::Rgb24 => Content::Color,
            SurfaceFormat::A8 => Content::Alpha,
        }
    }

    /// The layout an [`ImageSurfaceFactory`] picks for a content kind.
    pub fn for_content(content: Content) -> Self {
        match content {
            Content::Color => SurfaceFormat::Rgb24,
            Content::Alpha => SurfaceFormat::A8,
            Content::ColorAlpha => SurfaceFormat::Argb32,
        }
    }

    /// Smallest 4-byte aligned stride holding `width` pixels.
    pub fn stride_for_width(self, width: u32) -> Option<usize> {
        let row = (width as usize).checked_mul(self.bytes_per_pixel())?;
        row.checked_add(3).map(|n| n & !3)
    }
}

/// A width × height pixel buffer with a row stride.
#[derive(Clone, PartialEq, Eq)]
pub struct Surface {
    format: SurfaceFormat,
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl core::fmt::Debug for Surface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Surface")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

impl Surface {
    /// Allocate a zeroed surface with an explicit stride.
    ///
    /// Fails with `Failure` if `stride` cannot hold a row and with `NoMemory`
    /// if the buffer cannot be allocated.
    pub fn with_stride(
        format: SurfaceFormat,
        width: u32,
        height: u32,
        stride: usize,
    ) -> Result<Self, CodecError> {
        let row = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or(CodecError::NoMemory)?;
        if stride < row {
            return Err(CodecError::Failure(format!(
                "stride {stride} too small for {width} pixels"
            )));
        }
        let len = stride
            .checked_mul(height as usize)
            .ok_or(CodecError::NoMemory)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| CodecError::NoMemory)?;
        data.resize(len, 0);
        Ok(Self {
            format,
            width,
            height,
            stride,
            data,
        })
    }

    /// Allocate a zeroed surface with the default 4-byte aligned stride.
    pub fn new(format: SurfaceFormat, width: u32, height: u32) -> Result<Self, CodecError> {
        let stride = format
            .stride_for_width(width)
            .ok_or(CodecError::NoMemory)?;
        Self::with_stride(format, width, height, stride)
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    pub fn content(&self) -> Content {
        self.format.content()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Byte distance between the starts of consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// All `height * stride` bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Row `y`, including any padding past the last pixel.
    ///
    /// # Panics
    ///
    /// If `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    /// Mutable row `y`, including padding.
    ///
    /// # Panics
    ///
    /// If `y >= height`.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.stride]
    }

    /// Packed `0xAARRGGBB` value of a pixel. `A8` pixels read as alpha-only words.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let row = self.row(y);
        match self.format {
            SurfaceFormat::A8 => u32::from(row[x as usize]) << 24,
            SurfaceFormat::Argb32 | SurfaceFormat::Rgb24 => pixel::read_packed(&row[x as usize * 4..]),
        }
    }

    /// Store a packed `0xAARRGGBB` value. `A8` surfaces keep the alpha byte,
    /// `Rgb24` surfaces force it to `0xFF`.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: u32) {
        let format = self.format;
        let row = self.row_mut(y);
        match format {
            SurfaceFormat::A8 => row[x as usize] = (value >> 24) as u8,
            SurfaceFormat::Rgb24 => pixel::write_packed(&mut row[x as usize * 4..], value | 0xFF00_0000),
            SurfaceFormat::Argb32 => pixel::write_packed(&mut row[x as usize * 4..], value),
        }
    }

    /// Copy out as straight (unpremultiplied) RGBA.
    pub fn to_rgba8(&self) -> ImgVec<RGBA8> {
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let value = self.pixel(x, y);
                let px = match self.format {
                    SurfaceFormat::A8 => RGBA8::new(0, 0, 0, (value >> 24) as u8),
                    SurfaceFormat::Rgb24 => pixel::unpack(value | 0xFF00_0000),
                    SurfaceFormat::Argb32 => pixel::unpremultiply_rgba(pixel::unpack(value)),
                };
                pixels.push(px);
            }
        }
        ImgVec::new(pixels, self.width as usize, self.height as usize)
    }

    /// Build a surface from straight RGBA pixels.
    ///
    /// `Color` drops alpha, `Alpha` keeps only alpha, `ColorAlpha` premultiplies.
    pub fn from_rgba8(img: imgref::ImgRef<'_, RGBA8>, content: Content) -> Result<Self, CodecError> {
        let width = u32::try_from(img.width()).map_err(|_| CodecError::NoMemory)?;
        let height = u32::try_from(img.height()).map_err(|_| CodecError::NoMemory)?;
        let mut surface = Surface::new(SurfaceFormat::for_content(content), width, height)?;
        for (y, row) in img.rows().enumerate() {
            for (x, px) in row.iter().enumerate() {
                let value = match content {
                    Content::ColorAlpha => pixel::pack(pixel::premultiply_rgba(*px)),
                    Content::Color | Content::Alpha => pixel::pack(*px),
                };
                surface.set_pixel(x as u32, y as u32, value);
            }
        }
        Ok(surface)
    }
}

/// Allocator capability codecs materialize their output through.
pub trait SurfaceFactory: Send + Sync {
    /// Allocate a zeroed surface in a specific layout.
    fn create(&self, format: SurfaceFormat, width: u32, height: u32) -> Result<Surface, CodecError>;
}

/// Default factory: heap buffers with 4-byte aligned rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageSurfaceFactory;

impl SurfaceFactory for ImageSurfaceFactory {
    fn create(&self, format: SurfaceFormat, width: u32, height: u32) -> Result<Surface, CodecError> {
        Surface::new(format, width, height)
    }
}
