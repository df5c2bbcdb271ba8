//! Image inspection: header probe plus an optional full decode.

use std::path::Path;

use serde::Serialize;
use surfcodecs::probe::{ProbeResult, probe};
use surfcodecs::{DecodeRequest, guess_format};

use crate::InfoArgs;

/// Run the `info` subcommand.
pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let multi = args.files.len() > 1;
    let mut failures = 0usize;

    for (i, path) in args.files.iter().enumerate() {
        if multi && !args.json {
            if i > 0 {
                println!();
            }
            println!("{}:", path.display());
        }

        match inspect_file(path, args.decode) {
            Ok(info) => {
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    print_info(&info);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("  error: {e:#}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} files could not be inspected", args.files.len());
    }
    Ok(())
}

fn inspect_file(path: &Path, decode: bool) -> anyhow::Result<ImageInfoDisplay> {
    let data = std::fs::read(path)?;
    let name = path.file_name().and_then(|name| name.to_str());

    // Signature formats probe directly; TARGA and dumps need the name hint.
    let probed = match probe(&data) {
        Some(result) => result,
        None => {
            let format = guess_format(&data, name)
                .ok_or_else(|| anyhow::anyhow!("unrecognized image format"))?;
            ProbeResult::for_format(&data, format)
        }
    };

    let mut info = ImageInfoDisplay {
        path: path.display().to_string(),
        format: probed.format.name().to_string(),
        mime_type: probed.format.mime_type().to_string(),
        width: probed.width,
        height: probed.height,
        has_alpha: probed.has_alpha,
        bit_depth: probed.bit_depth,
        file_size: data.len() as u64,
        decoded: None,
    };

    if decode {
        let mut passes = 0u32;
        let mut request = DecodeRequest::new(data.as_slice())
            .with_mime(probed.format.mime_type())
            .with_pass_callback(|_| passes += 1);
        if let Some(name) = name {
            request = request.with_filename(name);
        }
        let output = request.decode()?;
        info.decoded = Some(DecodedDisplay {
            width: output.width(),
            height: output.height(),
            surface_format: format!("{:?}", output.surface.format()),
            content: format!("{:?}", output.surface.content()),
            passes,
        });
    }

    Ok(info)
}

#[derive(Debug, Serialize)]
struct ImageInfoDisplay {
    path: String,
    format: String,
    mime_type: String,
    width: Option<u32>,
    height: Option<u32>,
    has_alpha: Option<bool>,
    bit_depth: Option<u8>,
    file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    decoded: Option<DecodedDisplay>,
}

#[derive(Debug, Serialize)]
struct DecodedDisplay {
    width: u32,
    height: u32,
    surface_format: String,
    content: String,
    passes: u32,
}

fn print_info(info: &ImageInfoDisplay) {
    println!("  Format:       {} ({})", info.format, info.mime_type);
    match (info.width, info.height) {
        (Some(w), Some(h)) => println!("  Dimensions:   {w}x{h}"),
        _ => println!("  Dimensions:   unknown"),
    }
    if let Some(depth) = info.bit_depth {
        println!("  Bit depth:    {depth}");
    }
    if let Some(alpha) = info.has_alpha {
        println!("  Alpha:        {}", if alpha { "yes" } else { "no" });
    }
    if let Some(ref decoded) = info.decoded {
        println!(
            "  Decoded:      {}x{} {} ({}), {} pass{}",
            decoded.width,
            decoded.height,
            decoded.surface_format,
            decoded.content,
            decoded.passes,
            if decoded.passes == 1 { "" } else { "es" }
        );
    }
    println!("  File size:    {}", crate::format_size(info.file_size));
}
