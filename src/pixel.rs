//! Pixel conversion between codec sample layouts and packed surface words.
//!
//! Packed words are `0xAARRGGBB` stored in native byte order, so on a
//! little-endian host the bytes in memory read B, G, R, A.

use rgb::{FromSlice, RGB8, RGBA8};

/// Multiply a color channel by alpha, rounding to nearest.
#[inline]
pub fn premultiply(alpha: u8, color: u8) -> u8 {
    let t = u32::from(alpha) * u32::from(color) + 0x80;
    (((t >> 8) + t) >> 8) as u8
}

/// Undo [`premultiply`]. Zero alpha yields zero.
#[inline]
pub fn unpremultiply(alpha: u8, color: u8) -> u8 {
    if alpha == 0 {
        return 0;
    }
    let a = u32::from(alpha);
    let c = (u32::from(color) * 255 + a / 2) / a;
    c.min(255) as u8
}

pub fn premultiply_rgba(px: RGBA8) -> RGBA8 {
    RGBA8::new(
        premultiply(px.a, px.r),
        premultiply(px.a, px.g),
        premultiply(px.a, px.b),
        px.a,
    )
}

pub fn unpremultiply_rgba(px: RGBA8) -> RGBA8 {
    RGBA8::new(
        unpremultiply(px.a, px.r),
        unpremultiply(px.a, px.g),
        unpremultiply(px.a, px.b),
        px.a,
    )
}

/// Pack channels into a `0xAARRGGBB` word.
#[inline]
pub fn pack(px: RGBA8) -> u32 {
    (u32::from(px.a) << 24) | (u32::from(px.r) << 16) | (u32::from(px.g) << 8) | u32::from(px.b)
}

#[inline]
pub fn unpack(value: u32) -> RGBA8 {
    RGBA8::new((value >> 16) as u8, (value >> 8) as u8, value as u8, (value >> 24) as u8)
}

/// Read a packed word from the first four bytes of `src`.
#[inline]
pub fn read_packed(src: &[u8]) -> u32 {
    u32::from_ne_bytes([src[0], src[1], src[2], src[3]])
}

/// Write a packed word into the first four bytes of `dst`.
#[inline]
pub fn write_packed(dst: &mut [u8], value: u32) {
    dst[..4].copy_from_slice(&value.to_ne_bytes());
}

#[inline]
pub fn gray_to_rgb(gray: u8) -> RGB8 {
    RGB8::new(gray, gray, gray)
}

/// Convert a CMYK sample to RGB.
///
/// Adobe-marked streams store inverted ink values; the others store ink
/// amounts directly.
#[inline]
pub fn cmyk_to_rgb(cmyk: [u8; 4], adobe: bool) -> RGB8 {
    let [c, m, y, k] = cmyk.map(u32::from);
    if adobe {
        RGB8::new((k * c / 255) as u8, (k * m / 255) as u8, (k * y / 255) as u8)
    } else {
        RGB8::new(
            ((255 - k) * (255 - c) / 255) as u8,
            ((255 - k) * (255 - m) / 255) as u8,
            ((255 - k) * (255 - y) / 255) as u8,
        )
    }
}

/// Scale a channel of `max + 1` levels to 0..=255.
#[inline]
pub fn scale_channel(value: u32, max: u32) -> u8 {
    debug_assert!(max > 0 && value <= max);
    (value * 255 / max) as u8
}

/// Packed word of an opaque RGB pixel.
#[inline]
pub fn opaque(rgb: RGB8) -> u32 {
    pack(RGBA8::new(rgb.r, rgb.g, rgb.b, 255))
}

// --- Row converters ---
//
// Destination rows are packed 4-byte words; only the first `width` slots are
// written, padding past them is left untouched.

/// Gray bytes to opaque packed words.
pub fn gray_row_to_packed(src: &[u8], dst: &mut [u8]) {
    for (&g, out) in src.iter().zip(dst.chunks_exact_mut(4)) {
        write_packed(out, opaque(gray_to_rgb(g)));
    }
}

/// R, G, B triplets to opaque packed words.
pub fn rgb_row_to_packed(src: &[u8], dst: &mut [u8]) {
    for (px, out) in src.as_rgb().iter().zip(dst.chunks_exact_mut(4)) {
        write_packed(out, opaque(*px));
    }
}

/// Straight R, G, B, A quads to premultiplied packed words.
pub fn rgba_row_to_premultiplied(src: &[u8], dst: &mut [u8]) {
    for (px, out) in src.as_rgba().iter().zip(dst.chunks_exact_mut(4)) {
        write_packed(out, pack(premultiply_rgba(*px)));
    }
}

/// Packed words to R, G, B triplets (alpha dropped).
pub fn packed_row_to_rgb(src: &[u8], dst: &mut [u8]) {
    for (word, out) in src.chunks_exact(4).zip(dst.as_rgb_mut().iter_mut()) {
        let px = unpack(read_packed(word));
        *out = RGB8::new(px.r, px.g, px.b);
    }
}

/// Premultiplied packed words to straight R, G, B, A quads.
pub fn packed_row_to_rgba(src: &[u8], dst: &mut [u8]) {
    for (word, out) in src.chunks_exact(4).zip(dst.as_rgba_mut().iter_mut()) {
        *out = unpremultiply_rgba(unpack(read_packed(word)));
    }
}
