use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use colblock_codecs::{default_registry, registry_with_zstd_level, ZstdCodec};
use colblock_core::format::{
    ChunkHeaders, BLOCK_HEADER_SIZE, DEFAULT_CHUNK_LEN, FLAG_CHUNK_CHECKSUM,
};
use colblock_core::{
    BlockInfo, BlockWriter, EncodedBlock, EncodingRegistry, FlexValue, RangeStatus,
    WriterConfig,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "colblock",
    about = "Encode, inspect, and lazily decode compressed column blocks",
    version
)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides this.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode JSON-lines values into a block file
    Encode {
        /// Source file with one JSON value per line ("-" reads stdin)
        input: PathBuf,
        /// Destination block file
        output: PathBuf,
        /// Encoding: plain | fixed-int | rle | float64
        #[arg(short, long, default_value = "plain")]
        encoding: String,
        /// Codec: passthrough | zstd | lz4
        #[arg(short, long, default_value = "zstd")]
        codec: String,
        /// Zstd compression level (1–22, only used with --codec zstd)
        #[arg(long, default_value_t = ZstdCodec::default().level)]
        zstd_level: i32,
        /// Values per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_LEN)]
        chunk_len: usize,
        /// Byte width for fixed-int (1, 2, 4 or 8)
        #[arg(short, long)]
        width: Option<u8>,
        /// Do not store per-chunk checksums
        #[arg(long)]
        no_checksum: bool,
    },
    /// Decode a block file to JSON-lines on stdout
    Decode {
        /// Block file
        file: PathBuf,
        /// Values to skip before printing
        #[arg(short, long, default_value_t = 0)]
        skip: u64,
        /// Stop after this many values
        #[arg(short, long)]
        limit: Option<u64>,
        /// Values decoded per call
        #[arg(short, long, default_value_t = 256)]
        batch: usize,
    },
    /// Print block metadata and chunk statistics
    Inspect {
        /// Block file to inspect
        file: PathBuf,
        /// Print per-chunk details
        #[arg(long)]
        chunks: bool,
    },
    /// Decode the whole block from several independent ranges at once
    Bench {
        /// Block file
        file: PathBuf,
        /// Concurrent readers, each with its own range
        #[arg(short, long, default_value_t = 4)]
        readers: usize,
        /// Values decoded per call
        #[arg(short, long, default_value_t = 1024)]
        batch: usize,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn codec_from_name(registry: &EncodingRegistry, name: &str) -> anyhow::Result<u16> {
    let canonical = match name {
        "pass" | "none" => "passthrough",
        "z" => "zstd",
        "l" => "lz4",
        other => other,
    };
    match registry.codec_by_name(canonical) {
        Some(codec) => Ok(codec.id()),
        None => anyhow::bail!(
            "unknown codec '{}'. Valid options: {}",
            name,
            registry.codecs().map(|c| c.name()).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn encoding_from_name(registry: &EncodingRegistry, name: &str) -> anyhow::Result<u16> {
    let canonical = match name {
        "int" | "fixed" => "fixed-int",
        "float" | "f64" => "float64",
        other => other,
    };
    match registry.encoding_by_name(canonical) {
        Some(encoding) => Ok(encoding.tag()),
        None => anyhow::bail!(
            "unknown encoding '{}'. Valid options: {}",
            name,
            registry
                .encodings()
                .map(|e| e.name())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// A block file is the block metadata header followed by the block bytes.
fn read_block_file(path: &Path) -> anyhow::Result<(BlockInfo, Vec<u8>)> {
    let mut bytes =
        std::fs::read(path).with_context(|| format!("reading block file {:?}", path))?;
    if bytes.len() < BLOCK_HEADER_SIZE {
        anyhow::bail!(
            "{:?} is {} bytes, too short for a block header",
            path,
            bytes.len()
        );
    }
    let info = BlockInfo::from_bytes(&bytes[..BLOCK_HEADER_SIZE])
        .with_context(|| format!("parsing block header of {:?}", path))?;
    let data = bytes.split_off(BLOCK_HEADER_SIZE);
    debug!(
        encoding = info.encoding,
        num_elem = info.num_elem,
        block_size = info.block_size,
        "loaded block file"
    );
    Ok((info, data))
}

fn load_block(path: &Path) -> anyhow::Result<EncodedBlock> {
    let (info, data) = read_block_file(path)?;
    Ok(EncodedBlock::from_vec(default_registry(), info, data))
}

// ── Subcommand implementations ─────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_encode(
    input: PathBuf,
    output: PathBuf,
    encoding: &str,
    codec: &str,
    zstd_level: i32,
    chunk_len: usize,
    width: Option<u8>,
    no_checksum: bool,
) -> anyhow::Result<()> {
    let registry = Arc::new(registry_with_zstd_level(zstd_level));
    let config = WriterConfig::default()
        .with_encoding(encoding_from_name(&registry, encoding)?)
        .with_codec(codec_from_name(&registry, codec)?)
        .with_chunk_len(chunk_len)
        .with_element_width(width)
        .with_checksum(!no_checksum);
    let mut writer = BlockWriter::new(registry, config)?;

    let src: Box<dyn BufRead> = if input.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let file =
            File::open(&input).with_context(|| format!("opening input file {:?}", input))?;
        Box::new(BufReader::new(file))
    };

    let t0 = Instant::now();
    let mut json_bytes = 0u64;
    for (line_no, line) in src.lines().enumerate() {
        let line = line?;
        json_bytes += line.len() as u64 + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: FlexValue = serde_json::from_str(line)
            .with_context(|| format!("line {}: not a block value", line_no + 1))?;
        writer.push(value)?;
    }

    let (info, data) = writer.finish()?;
    let mut dst = BufWriter::new(
        File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
    );
    dst.write_all(&info.to_bytes())?;
    dst.write_all(&data)?;
    dst.flush()?;
    let elapsed = t0.elapsed();
    info!(num_elem = info.num_elem, block_size = info.block_size, "encoded block");

    let chunks = ChunkHeaders::new(&data).count();
    eprintln!("  encoding    : {}", encoding);
    eprintln!("  codec       : {}", codec);
    eprintln!("  values      : {}", info.num_elem);
    eprintln!("  chunks      : {}", chunks);
    eprintln!("  json input  : {}", human_bytes(json_bytes));
    eprintln!("  block size  : {}", human_bytes(info.block_size));
    eprintln!(
        "  ratio       : {:.2}x",
        json_bytes as f64 / info.block_size.max(1) as f64
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decode(file: PathBuf, skip: u64, limit: Option<u64>, batch: usize) -> anyhow::Result<()> {
    if batch == 0 {
        anyhow::bail!("--batch must be at least 1");
    }
    let block = load_block(&file)?;
    let mut range = block.get_range();

    let skipped = range.skip(skip)?;
    if skipped < skip && range.status() == RangeStatus::Exhausted {
        eprintln!("  block holds only {} values", skipped);
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut buf = vec![FlexValue::Null; batch];
    let mut left = limit.unwrap_or(u64::MAX);
    while left > 0 {
        let want = (batch as u64).min(left) as usize;
        let n = range.decode_to(&mut buf[..want])?;
        for value in &buf[..n] {
            serde_json::to_writer(&mut out, value)?;
            out.write_all(b"\n")?;
        }
        left -= n as u64;
        // a short batch may be followed by a pending decode error
        if n == 0 {
            break;
        }
    }
    out.flush()?;
    range.release();
    Ok(())
}

fn run_inspect(file: PathBuf, show_chunks: bool) -> anyhow::Result<()> {
    let (info, data) = read_block_file(&file)?;
    let registry = default_registry();
    let encoding = registry
        .encoding(info.encoding)
        .map(|e| e.name().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut raw_total = 0u64;
    let mut chunk_rows = Vec::new();
    let mut framing_error = None;
    for header in ChunkHeaders::new(&data) {
        match header {
            Ok((offset, header)) => {
                raw_total += u64::from(header.raw_len);
                chunk_rows.push((offset, header));
            }
            Err(e) => {
                framing_error = Some(e);
                break;
            }
        }
    }
    let chunk_elems: u64 = chunk_rows.iter().map(|(_, h)| u64::from(h.num_elem)).sum();

    println!("=== Block file: {:?} ===", file);
    println!();
    println!("  encoding       : {} (tag={})", encoding, info.encoding);
    println!("  values         : {}", info.num_elem);
    println!("  element width  : {:?}", info.element_width);
    println!("  block size     : {}", human_bytes(info.block_size));
    println!("  bytes on disk  : {}", human_bytes(data.len() as u64));
    println!("  chunks         : {}", chunk_rows.len());
    println!("  raw payloads   : {}", human_bytes(raw_total));
    println!(
        "  checksums      : {}",
        if info.has_flag(FLAG_CHUNK_CHECKSUM) {
            "xxh3-64"
        } else {
            "off"
        }
    );
    println!("  flags          : 0x{:016x}", info.flags);
    if chunk_elems != info.num_elem {
        println!(
            "  WARNING        : chunks hold {} values, metadata declares {}",
            chunk_elems, info.num_elem
        );
    }
    if let Some(e) = &framing_error {
        println!("  WARNING        : {}", e);
    }

    if show_chunks {
        println!();
        println!(
            "  {:>6}  {:>10}  {:>8}  {:>12}  {:>12}  {:>11}  {:>16}",
            "chunk", "offset", "values", "compressed", "raw", "codec", "checksum"
        );
        println!("  {}", "-".repeat(86));
        for (i, (offset, h)) in chunk_rows.iter().enumerate() {
            let codec = registry
                .codec(h.codec_id)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|_| format!("id={}", h.codec_id));
            println!(
                "  {:>6}  {:>10}  {:>8}  {:>12}  {:>12}  {:>11}  {:016x}",
                i,
                offset,
                h.num_elem,
                human_bytes(u64::from(h.compressed_len)),
                human_bytes(u64::from(h.raw_len)),
                codec,
                h.checksum
            );
        }
    }

    Ok(())
}

fn run_bench(file: PathBuf, readers: usize, batch: usize) -> anyhow::Result<()> {
    if readers == 0 || batch == 0 {
        anyhow::bail!("--readers and --batch must be at least 1");
    }
    let block = load_block(&file)?;
    let total = block.size();
    eprintln!(
        "benchmarking {} concurrent readers over {} values...",
        readers, total
    );

    let t0 = Instant::now();
    let results: Vec<anyhow::Result<(u64, f64)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let block = &block;
                scope.spawn(move || -> anyhow::Result<(u64, f64)> {
                    let t = Instant::now();
                    let mut range = block.get_range();
                    let mut buf = vec![FlexValue::Null; batch];
                    let mut decoded = 0u64;
                    loop {
                        let n = range.decode_to(&mut buf)?;
                        decoded += n as u64;
                        if n == 0 {
                            break;
                        }
                    }
                    Ok((decoded, t.elapsed().as_secs_f64()))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("reader thread panicked")))
            })
            .collect()
    });
    let elapsed = t0.elapsed().as_secs_f64();

    let mut decoded_total = 0u64;
    let mut slowest = 0f64;
    for (i, result) in results.into_iter().enumerate() {
        let (decoded, secs) = result.with_context(|| format!("reader {}", i))?;
        if decoded != total {
            anyhow::bail!("reader {} decoded {} of {} values", i, decoded, total);
        }
        decoded_total += decoded;
        slowest = slowest.max(secs);
    }

    println!();
    println!("=== Concurrent Range Decode Benchmark ===");
    println!("  readers     : {}", readers);
    println!("  batch       : {}", batch);
    println!("  values      : {}", decoded_total);
    println!("  elapsed     : {:.3}s", elapsed);
    println!("  slowest     : {:.3}s", slowest);
    println!(
        "  throughput  : {:.0} values/s",
        decoded_total as f64 / elapsed.max(f64::EPSILON)
    );
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Encode {
            input,
            output,
            encoding,
            codec,
            zstd_level,
            chunk_len,
            width,
            no_checksum,
        } => run_encode(
            input,
            output,
            &encoding,
            &codec,
            zstd_level,
            chunk_len,
            width,
            no_checksum,
        ),
        Commands::Decode {
            file,
            skip,
            limit,
            batch,
        } => run_decode(file, skip, limit, batch),
        Commands::Inspect { file, chunks } => run_inspect(file, chunks),
        Commands::Bench {
            file,
            readers,
            batch,
        } => run_bench(file, readers, batch),
    }
}
