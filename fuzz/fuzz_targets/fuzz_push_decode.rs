#![no_main]

//! Feeds the same bytes whole and in fuzzer-chosen pieces; both must agree.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use surfcodecs::registry::builtin_codec;
use surfcodecs::{CodecContext, ImageFormat, Limits, Loader, Surface};

#[derive(Arbitrary, Debug)]
struct Input {
    format: u8,
    chunk: u16,
    data: Vec<u8>,
}

fn decode(format: ImageFormat, data: &[u8], chunk: usize) -> Option<Surface> {
    let limits = Limits {
        max_pixels: Some(2048 * 2048),
        ..Limits::default()
    };
    let context = CodecContext::default().with_limits(limits);
    let mut codec = builtin_codec(format, &context)?;
    let mut loader = Loader::new(codec.as_mut());
    loader.start().ok()?;
    for piece in data.chunks(chunk) {
        loader.push(piece).ok()?;
    }
    loader.finish().ok()
}

fuzz_target!(|input: Input| {
    let format = ImageFormat::ALL[usize::from(input.format) % ImageFormat::ALL.len()];
    let chunk = usize::from(input.chunk).max(1);
    let whole = decode(format, &input.data, input.data.len().max(1));
    let pieces = decode(format, &input.data, chunk);
    assert_eq!(whole, pieces);
});
