//! Decode one image and write it out in another format.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::time::Instant;

use anyhow::Context;
use surfcodecs::config::{CodecConfig, JpegConfig, PngCompression, TargaConfig};
use surfcodecs::{CodecContext, CodecRegistry, DecodeRequest, EncodeRequest, Limits};

use crate::ConvertArgs;

/// Run the `convert` subcommand.
pub fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let format = args.resolve_format()?;
    if args.output.exists() && !args.force {
        anyhow::bail!("{} already exists (use --force)", args.output.display());
    }

    let config = codec_config(&args);
    let limits = Limits {
        max_pixels: args.max_pixels,
        ..Limits::default()
    };
    // One registry for both directions, so the codecs see the same config.
    let mut registry = CodecRegistry::all()
        .with_context(CodecContext::default().with_limits(limits).with_config(config));

    let start = Instant::now();
    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let mut request = DecodeRequest::new(BufReader::new(file))
        .with_registry(&mut registry)
        .with_pass_callback(|event| {
            log::debug!(
                "pass {}: {}x{}",
                event.pass,
                event.surface.width(),
                event.surface.height()
            );
        });
    let name = args.input.file_name().and_then(|name| name.to_str());
    if let Some(name) = name {
        request = request.with_filename(name);
    }
    let decoded = request
        .decode()
        .with_context(|| format!("failed to decode {}", args.input.display()))?;
    log::info!(
        "decoded {} {}x{} {:?} in {:.1?}",
        decoded.format.name(),
        decoded.width(),
        decoded.height(),
        decoded.surface.content(),
        start.elapsed()
    );

    let out = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::new(out);
    EncodeRequest::new(format)
        .with_registry(&mut registry)
        .encode(&decoded.surface, &mut writer)
        .with_context(|| format!("failed to encode {} as {}", args.output.display(), format.name()))?;
    writer.flush()?;

    log::info!(
        "wrote {} ({})",
        args.output.display(),
        crate::format_size(std::fs::metadata(&args.output)?.len())
    );
    Ok(())
}

fn codec_config(args: &ConvertArgs) -> CodecConfig {
    let compression = if args.fast {
        PngCompression::Fast
    } else {
        PngCompression::Default
    };
    CodecConfig::default()
        .with_targa(TargaConfig { rle: args.rle })
        .with_png_compression(compression)
        .with_jpeg(JpegConfig {
            progressive_preview: !args.no_preview,
        })
}
