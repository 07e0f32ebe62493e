use clap::{Args, Parser, Subcommand};
use custom_opus::page::{split_pages, verify_checksum, PageHeader};
use custom_opus::stream::{count_samples, encoder_delay_at};
use custom_opus::{open_buffered, StreamConfig, Variant, VirtualStream};
use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "copus", about = "Inspect custom Opus packet streams as Ogg Opus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StreamArgs {
    /// Source file holding the packet stream
    input: PathBuf,
    /// JSON stream descriptor; replaces the flags below
    #[arg(long)]
    config: Option<PathBuf>,
    /// Packet layout: switch, ue4, ea, x
    #[arg(short, long, default_value = "ue4")]
    variant: String,
    /// Physical offset of the first packet
    #[arg(short, long, default_value = "0", value_parser = parse_offset)]
    offset: u64,
    /// Bytes of packet data (default: rest of the file)
    #[arg(short, long, value_parser = parse_offset)]
    size: Option<u64>,
    #[arg(short, long, default_value = "2")]
    channels: u8,
    #[arg(short = 'r', long, default_value = "48000")]
    sample_rate: u32,
    /// Pre-skip in samples (default: estimated from the first packet)
    #[arg(long)]
    skip: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show logical size, packet count and sample totals
    Info(StreamArgs),
    /// Write the virtual Ogg Opus stream to a file
    Dump {
        #[command(flatten)]
        stream: StreamArgs,
        #[arg(short = 'O', long)]
        output: PathBuf,
    },
    /// List every page of the virtual stream
    Pages(StreamArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info(args) => {
            let (mut file, config) = open_source(&args)?;
            let samples = count_samples(&mut file, &config)?;
            let delay   = encoder_delay_at(&mut file, &config)?;
            let vs = VirtualStream::new(file, config)?;
            let cfg = vs.config();

            println!("── Custom Opus stream ───────────────────────────────────");
            println!("  Path           {}", args.input.display());
            println!("  Layout         {}", cfg.variant);
            println!("  Physical       {:#x} + {:#x}", cfg.stream_offset, cfg.stream_size);
            println!("  Channels       {}", cfg.channels);
            println!("  Sample rate    {}", cfg.sample_rate);
            println!("  Pre-skip       {}", cfg.skip);
            println!("  Header pages   {} B", vs.header().len());
            println!("  Logical size   {} B", vs.size());
            println!("  Samples        {}", samples);
            println!("  Est. delay     {}", delay);
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { stream, output } => {
            let (file, config) = open_source(&stream)?;
            let mut reader = open_buffered(file, config)?;
            let mut writer = BufWriter::new(File::create(&output)?);
            let n = io::copy(&mut reader, &mut writer)?;
            let expected = reader.get_ref().size();
            if n != expected {
                eprintln!("Short stream: wrote {n} of {expected} bytes");
            }
            println!("Wrote {} B → {}", n, output.display());
        }

        // ── Pages ────────────────────────────────────────────────────────────
        Commands::Pages(args) => {
            let (file, config) = open_source(&args)?;
            let mut data = Vec::new();
            open_buffered(file, config)?.read_to_end(&mut data)?;

            println!("{:>6} {:>12} {:>6} {:>10} {:>4}  Payload",
                     "Seq", "Granule", "Size", "CRC", "OK");
            for page in split_pages(&data)? {
                let h = PageHeader::read(page)?;
                let body = &page[h.header_len()..];
                println!("{:>6} {:>12} {:>6} {:>10} {:>4}  {}",
                    h.sequence, h.granule, page.len(),
                    format!("{:08x}", h.checksum),
                    if verify_checksum(page) { "yes" } else { "NO" },
                    hex::encode(&body[..body.len().min(8)]));
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open_source(args: &StreamArgs) -> Result<(File, StreamConfig), Box<dyn std::error::Error>> {
    let mut file = File::open(&args.input)?;
    if let Some(path) = &args.config {
        return Ok((file, StreamConfig::load(path)?));
    }

    let variant: Variant = args.variant.parse()?;
    let len  = file.metadata()?.len();
    let size = args.size.unwrap_or_else(|| len.saturating_sub(args.offset));
    let mut config = StreamConfig::new(variant, args.offset, size)
        .with_channels(args.channels)
        .with_sample_rate(args.sample_rate);
    config.skip = match args.skip {
        Some(skip) => skip,
        None => encoder_delay_at(&mut file, &config)?.try_into().unwrap_or(u16::MAX),
    };
    Ok((file, config))
}

fn parse_offset(s: &str) -> Result<u64, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None      => s.parse(),
    }
    .map_err(|e| format!("invalid offset '{s}': {e}"))
}
