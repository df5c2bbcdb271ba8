#![no_main]

use libfuzzer_sys::fuzz_target;
use surfcodecs::{DecodeRequest, Limits};

fuzz_target!(|data: &[u8]| {
    let limits = Limits {
        max_pixels: Some(4096 * 4096),
        max_memory_bytes: Some(256 * 1024 * 1024),
        ..Limits::default()
    };
    if let Ok(output) = DecodeRequest::new(data).with_limits(&limits).decode() {
        let surface = output.surface;
        assert!(surface.stride() >= surface.width() as usize * surface.format().bytes_per_pixel());
        assert_eq!(surface.data().len(), surface.stride() * surface.height() as usize);
    }
});
