#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(result) = surfcodecs::probe::probe(data) {
        assert!(result.bytes_examined <= data.len());
    }
    let _ = surfcodecs::guess_mime(data, Some("fuzz.tga"));
});
