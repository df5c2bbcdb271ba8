//! surfconv: inspect and convert images through the surfcodecs codecs.
//!
//! Every decode goes through the incremental loader, so `-v` shows the
//! progressive passes of a JPEG as they complete.

mod convert;
mod info;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use surfcodecs::ImageFormat;

#[derive(Parser, Debug)]
#[command(name = "surfconv", version, about = "Inspect and convert JPEG, PNG, TARGA and surface dumps")]
struct Cli {
    /// Log codec activity (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe images and print what the header says.
    Info(InfoArgs),

    /// Decode an image and re-encode it in another format.
    Convert(ConvertArgs),
}

/// Arguments for the `info` subcommand.
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Input files.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Fully decode each file and report the resulting surface.
    #[arg(long)]
    pub decode: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `convert` subcommand.
#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Input file.
    pub input: PathBuf,

    /// Output file.
    pub output: PathBuf,

    /// Output format (default: from the output extension).
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Write run-length encoded TARGA.
    #[arg(long)]
    pub rle: bool,

    /// Use the fastest PNG compression.
    #[arg(long)]
    pub fast: bool,

    /// Refuse images with more pixels than this.
    #[arg(long, env = "SURFCONV_MAX_PIXELS")]
    pub max_pixels: Option<u64>,

    /// Only decode the final JPEG scan, skipping progressive previews.
    #[arg(long)]
    pub no_preview: bool,

    /// Allow overwriting an existing output file.
    #[arg(long)]
    pub force: bool,
}

/// Output format names accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FormatArg {
    Png,
    #[value(alias = "tga")]
    Targa,
    /// Raw surface dump.
    Surface,
}

impl FormatArg {
    pub fn to_image_format(self) -> ImageFormat {
        match self {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Targa => ImageFormat::Targa,
            FormatArg::Surface => ImageFormat::Serial,
        }
    }
}

impl ConvertArgs {
    /// Resolve the target format from --format or the output extension.
    pub fn resolve_format(&self) -> anyhow::Result<ImageFormat> {
        if let Some(format) = self.format {
            return Ok(format.to_image_format());
        }
        self.output
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "cannot tell the output format from {}; pass --format",
                    self.output.display()
                )
            })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    match cli.command {
        Command::Info(args) => info::run(args),
        Command::Convert(args) => convert::run(args),
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn format_from_extension() {
        let cli = Cli::parse_from(["surfconv", "convert", "in.jpg", "out.tga", "--rle"]);
        let Command::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert!(args.rle);
        assert_eq!(args.resolve_format().unwrap(), ImageFormat::Targa);
    }

    #[test]
    fn explicit_format_wins() {
        let cli = Cli::parse_from(["surfconv", "convert", "in.tga", "out.png", "-f", "surface"]);
        let Command::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.resolve_format().unwrap(), ImageFormat::Serial);
    }

    #[test]
    fn unknown_extension_needs_format() {
        let cli = Cli::parse_from(["surfconv", "convert", "in.png", "out.xyz"]);
        let Command::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert!(args.resolve_format().is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
