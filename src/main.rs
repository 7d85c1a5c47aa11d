use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use pseudodis::decoder::X86Decoder;
use pseudodis::format::{OutputFormat, View};
use pseudodis::parser::GoblinParser;
use pseudodis::sweep::{self, SessionConfig, DEFAULT_MAX_BYTES};
use pseudodis::{Address, BinaryParser};

/// pseudodis - decode a 16-bit x86 subset and show it as assembly and pseudo-code
#[derive(Debug, Parser)]
#[command(name = "pseudodis", version, about, long_about = None)]
struct Cli {
    /// Binary file to decode.
    #[arg(value_name = "FILE")]
    path: PathBuf,

    /// Start offset in hex (e.g. 7c or 0x7c). Repeat to decode several sessions.
    #[arg(short, long = "offset", value_name = "HEX")]
    offsets: Vec<String>,

    /// Address of file offset 0, in hex.
    #[arg(short, long, value_name = "HEX", default_value = "0")]
    base: String,

    /// Maximum number of bytes decoded per session.
    #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_BYTES)]
    max_bytes: usize,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Views shown by the text format.
    #[arg(long, value_enum, default_value_t = View::Both)]
    view: View,

    /// Treat offsets as relative to the first executable section of an ELF, PE or Mach-O file.
    #[arg(long)]
    locate_code: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("pseudodis", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let image = pseudodis::load_image(&cli.path)
        .with_context(|| format!("failed to read {}", cli.path.display()))?;

    let base_address = sweep::parse_hex_offset(&cli.base)? as Address;

    // Window of the image the offsets are relative to
    let (window_start, window_end) = if cli.locate_code {
        let info = GoblinParser::new().parse(&image)?;
        match info.code_region(image.len()) {
            Some(region) => {
                log::info!(
                    "Using {} section '{}' at file offset 0x{:X} ({} bytes)",
                    info.format,
                    region.name,
                    region.offset,
                    region.size
                );
                (region.offset, region.end_offset().min(image.len()))
            }
            None => {
                log::info!("No executable section found in {} image, using whole file", info.format);
                (0, image.len())
            }
        }
    } else {
        (0, image.len())
    };

    let offsets = if cli.offsets.is_empty() {
        vec!["0".to_string()]
    } else {
        cli.offsets.clone()
    };

    let configs = offsets
        .iter()
        .map(|text| -> anyhow::Result<SessionConfig> {
            let start_offset = window_start.saturating_add(sweep::parse_hex_offset(text)?);
            Ok(SessionConfig {
                start_offset,
                base_address,
                max_bytes: cli.max_bytes.min(window_end.saturating_sub(start_offset)),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let formatter = cli.format.get_formatter(cli.view);
    let results = sweep::run_many(&image, &X86Decoder::new(), &configs);

    for (i, (config, result)) in configs.iter().zip(results).enumerate() {
        let listing = result.with_context(|| {
            format!("failed to decode session at offset 0x{:X}", config.start_offset)
        })?;

        if i > 0 && cli.format == OutputFormat::Text {
            println!();
        }
        print!("{}", formatter.format(&listing)?);
    }

    Ok(())
}
