//! End-to-end tests through the public request and loader API.

#![cfg(all(feature = "png", feature = "targa"))]

use std::path::PathBuf;

use surfcodecs::codecs::TargaCodec;
use surfcodecs::config::{CodecConfig, TargaConfig};
use surfcodecs::loader::Loader;
use surfcodecs::{
    CodecContext, CodecRegistry, Content, DecodeRequest, EncodeRequest, ImageFormat, Surface,
    SurfaceFormat, guess_format, load_file, save_file,
};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("surfcodecs-{}-{name}", std::process::id()))
}

fn gradient(width: u32, height: u32) -> Surface {
    let mut surface = Surface::new(SurfaceFormat::Rgb24, width, height).unwrap();
    for y in 0..height {
        for x in 0..width {
            let value = 0xFF00_0000 | (x * 7 % 256) << 16 | (y * 11 % 256) << 8 | ((x + y) % 256);
            surface.set_pixel(x, y, value);
        }
    }
    surface
}

fn assert_same_pixels(a: &Surface, b: &Surface) {
    assert_eq!((a.width(), a.height()), (b.width(), b.height()));
    for y in 0..a.height() {
        for x in 0..a.width() {
            assert_eq!(a.pixel(x, y), b.pixel(x, y), "pixel ({x}, {y})");
        }
    }
}

fn png_fixture() -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 2, 2);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer
            .write_image_data(&[
                0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00, //
                0x00, 0x00, 0xFF, 0x10, 0x20, 0x30,
            ])
            .unwrap();
        writer.finish().unwrap();
    }
    out
}

#[test]
fn png_from_foreign_encoder() {
    let bytes = png_fixture();
    assert_eq!(guess_format(&bytes, None), Some(ImageFormat::Png));

    let output = DecodeRequest::new(bytes.as_slice()).decode().unwrap();
    assert_eq!(output.format, ImageFormat::Png);
    assert_eq!(output.surface.format(), SurfaceFormat::Rgb24);
    assert_eq!(output.surface.pixel(0, 0), 0xFFFF_0000);
    assert_eq!(output.surface.pixel(1, 0), 0xFF00_FF00);
    assert_eq!(output.surface.pixel(0, 1), 0xFF00_00FF);
    assert_eq!(output.surface.pixel(1, 1), 0xFF10_2030);
}

#[test]
fn file_round_trips() {
    let surface = gradient(37, 21);
    for ext in ["tga", "png", "surface"] {
        let path = temp_path(&format!("round-trip.{ext}"));
        save_file(&surface, &path).unwrap();
        let decoded = load_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(decoded.content(), Content::Color, "{ext}");
        assert_same_pixels(&decoded, &surface);
    }
}

#[test]
fn missing_file_is_io_error() {
    let result = load_file(temp_path("does-not-exist.tga"));
    assert!(matches!(result, Err(surfcodecs::CodecError::Io(_))));
}

#[test]
fn byte_at_a_time_matches_one_shot() {
    let surface = gradient(19, 5);
    let config = CodecConfig::default().with_targa(TargaConfig { rle: true });
    let bytes = EncodeRequest::new(ImageFormat::Targa)
        .with_codec_config(&config)
        .encode_to_vec(&surface)
        .unwrap();

    let one_shot = DecodeRequest::new(bytes.as_slice())
        .with_filename("gradient.tga")
        .decode()
        .unwrap();

    let mut codec = TargaCodec::new(&CodecContext::default());
    let mut passes = 0;
    let mut loader = Loader::new(&mut codec).with_pass_callback(|_| passes += 1);
    loader.start().unwrap();
    for byte in &bytes {
        loader.push(std::slice::from_ref(byte)).unwrap();
    }
    let pushed = loader.finish().unwrap();
    drop(loader);

    assert_eq!(passes, 1);
    assert_same_pixels(&pushed, &one_shot.surface);
    assert_same_pixels(&pushed, &surface);
}

#[test]
fn registry_reuses_codecs_across_requests() {
    let surface = gradient(4, 4);
    let first = EncodeRequest::new(ImageFormat::Serial)
        .encode_to_vec(&surface)
        .unwrap();
    let second = EncodeRequest::new(ImageFormat::Serial)
        .encode_to_vec(&gradient(6, 2))
        .unwrap();

    let mut registry = CodecRegistry::all();
    let a = DecodeRequest::new(first.as_slice())
        .with_registry(&mut registry)
        .decode()
        .unwrap();
    let b = DecodeRequest::new(second.as_slice())
        .with_registry(&mut registry)
        .decode()
        .unwrap();

    assert_eq!(registry.loaded(), 1);
    assert_same_pixels(&a.surface, &surface);
    assert_eq!((b.width(), b.height()), (6, 2));
}
