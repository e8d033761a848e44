use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use memjpeg::{Decoder, DecoderOptions, MessageLevel};

mod ppm;

use ppm::PPMEncoder;

#[derive(Parser)]
#[command(
    name = "memjpeg",
    about = "Decode a baseline JPEG to a binary PPM",
    version
)]
struct Cli {
    /// JPEG file to decode
    input: PathBuf,

    /// Output PPM path, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Refuse images with more pixels than this
    #[arg(long)]
    max_pixels: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let buffer = fs::read(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    let mut options = DecoderOptions::default();
    if let Some(max_pixels) = cli.max_pixels {
        options = options.with_max_pixels(max_pixels);
    }

    let mut report = |level: MessageLevel, message: &str| match level {
        MessageLevel::Warning => warn!("{}: {}", cli.input.display(), message),
        MessageLevel::Error => error!("{}: {}", cli.input.display(), message),
    };
    let image = Decoder::with_options(options)
        .with_message_sink(&mut report)
        .decode(&buffer)
        .with_context(|| format!("Failed to decode {}", cli.input.display()))?;
    info!(
        "decoded {} ({}x{})",
        cli.input.display(),
        image.width(),
        image.height()
    );

    let encoder = PPMEncoder::new(&image);
    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            encoder
                .encode(&mut BufWriter::new(file))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            encoder
                .encode(&mut stdout.lock())
                .context("Failed to write PPM to stdout")?;
        }
    }
    Ok(())
}
