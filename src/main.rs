use clap::{ArgAction, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use topspeed::crypto::Key;
use topspeed::file::TpsFile;
use topspeed::record::RecordHeader;
use topspeed::recovery::{read_candidates, write_candidates, CandidateRange, KeyRecoveryEngine, KnownBlock};
use topspeed::block::{Block, BLOCK_SIZE};

#[derive(Parser)]
#[command(name = "tps", about = "Clarion TopSpeed (.tps) file reader")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the file header
    Info {
        input: PathBuf,
        /// 64-byte key as 128 hex digits, for encrypted files
        #[arg(short, long)]
        key: Option<String>,
    },
    /// List page headers
    Pages {
        input: PathBuf,
        #[arg(short, long)]
        key: Option<String>,
    },
    /// List records
    Records {
        input: PathBuf,
        #[arg(short, long)]
        key: Option<String>,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Recover the key of an encrypted file from known plaintext
    Recover {
        /// Known block pair as ENCRYPTED_HEX:PLAINTEXT_HEX (64 bytes each)
        #[arg(short, long)]
        pair: Vec<String>,
        /// Encrypted file to take blocks from (see --block)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Known block of --file as INDEX:PLAINTEXT_HEX
        #[arg(short, long)]
        block: Vec<String>,
        /// First key word to try (default 0)
        #[arg(long, value_parser = parse_number)]
        start: Option<u64>,
        /// One past the last key word to try (default 2^32)
        #[arg(long, value_parser = parse_number)]
        end: Option<u64>,
        /// Continue from candidates saved with --save
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Save the candidate set when done
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, key } => {
            let file = open_file(&input, &key)?;
            let h = file.header();
            println!("── TopSpeed file ────────────────────────────────────────");
            println!("  Path             {}", input.display());
            println!("  Header size      {:#x}", h.header_size);
            println!("  File length      {} / {}", h.file_length_1, h.file_length_2);
            println!("  Last issued row  {}", h.last_issued_row);
            println!("  Changes          {}", h.changes);
            println!("  Management page  {:#x}", h.management_page_ref);
            println!("  Page ranges      {}", h.page_ranges().len());
            println!("  Pages            {}", file.pages().len());
        }

        // ── Pages ────────────────────────────────────────────────────────────
        Commands::Pages { input, key } => {
            let file = open_file(&input, &key)?;
            println!("{:>10} {:>6} {:>8} {:>8} {:>7} {:>5}",
                     "Address", "Size", "Unpacked", "Body", "Records", "Flags");
            for page in file.pages() {
                println!("{:#10x} {:>6} {:>8} {:>8} {:>7} {:#5x}",
                    page.address(), page.page_size(), page.page_size_uncompressed(),
                    page.page_size_uncompressed_without_header(), page.record_count(), page.flags());
            }
        }

        // ── Records ──────────────────────────────────────────────────────────
        Commands::Records { input, key, json } => {
            let mut file = open_file(&input, &key)?;
            for page in file.pages_mut() {
                let address = page.address();
                for record in page.records()? {
                    if json {
                        let view = RecordView {
                            page:          address,
                            record_length: record.record_length(),
                            header_length: record.header_length(),
                            header:        record.header(),
                            payload:       hex::encode(record.payload()),
                        };
                        println!("{}", serde_json::to_string(&view)?);
                    } else {
                        println!("{:#010x}  {:>5}  {}", address, record.record_length(), describe(record.header()));
                    }
                }
            }
        }

        // ── Recover ──────────────────────────────────────────────────────────
        Commands::Recover { pair, file, block, start, end, resume, save } => {
            let known = known_blocks(&pair, file.as_ref(), &block)?;
            let range = CandidateRange::new(start.unwrap_or(0), end.unwrap_or(topspeed::recovery::KEY_SPACE))?;

            let mut engine = match &resume {
                Some(path) => {
                    let saved = read_candidates(File::open(path)?)?;
                    info!("resuming from {} candidate(s)", saved.len());
                    KeyRecoveryEngine::resume(known, &saved)?
                }
                None => KeyRecoveryEngine::new(known)?,
            }
            .with_range(range);

            let keys = engine.recover()?;
            if let Some(path) = &save {
                write_candidates(BufWriter::new(File::create(path)?), engine.candidates())?;
                println!("Saved {} candidate(s) to {}", engine.candidate_count(), path.display());
            }

            if keys.is_empty() {
                println!("No key found; {} partial candidate(s) remain:", engine.candidate_count());
                for candidate in engine.candidates() {
                    println!("  {candidate}");
                }
            }
            for key in keys {
                println!("{}", key.to_hex());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn open_file(path: &PathBuf, key: &Option<String>) -> Result<TpsFile, Box<dyn std::error::Error>> {
    Ok(match key {
        Some(hex) => TpsFile::open_encrypted(path, &Key::from_hex(hex)?)?,
        None      => TpsFile::open(path)?,
    })
}

fn known_blocks(
    pairs:  &[String],
    file:   Option<&PathBuf>,
    blocks: &[String],
) -> Result<Vec<KnownBlock>, Box<dyn std::error::Error>> {
    let mut known = Vec::new();
    for p in pairs {
        let (enc, plain) = p.split_once(':').ok_or_else(|| format!("expected ENCRYPTED:PLAINTEXT, got '{p}'"))?;
        known.push(KnownBlock::from_hex(enc, plain)?);
    }

    if !blocks.is_empty() {
        let path = file.ok_or("--block needs --file")?;
        let data = std::fs::read(path)?;
        for b in blocks {
            let (index, plain) = b.split_once(':').ok_or_else(|| format!("expected INDEX:PLAINTEXT, got '{b}'"))?;
            let index = parse_number(index)?;
            let bytes = block_at(&data, index)
                .ok_or_else(|| format!("block {index} is past the end of {}", path.display()))?;
            let plaintext = Block::from_bytes(&hex::decode(plain.trim())?)?;
            known.push(KnownBlock::new(Block::from_bytes(bytes)?, plaintext));
        }
    }
    Ok(known)
}

/// The 64-byte block at `index`, or `None` when it lies past the end.
fn block_at(data: &[u8], index: u64) -> Option<&[u8]> {
    let at = usize::try_from(index).ok()?.checked_mul(BLOCK_SIZE)?;
    data.get(at..at.checked_add(BLOCK_SIZE)?)
}

fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None      => s.parse(),
    };
    parsed.map_err(|e| format!("bad number '{s}': {e}"))
}

fn describe(header: &RecordHeader) -> String {
    match header {
        RecordHeader::TableName { name } => format!("table name  {name}"),
        RecordHeader::Data { table_number, record_number } => match record_number {
            Some(n) => format!("data        table {table_number} record {n}"),
            None    => format!("data        table {table_number}"),
        },
        RecordHeader::Metadata { table_number } => format!("metadata    table {table_number}"),
        RecordHeader::TableDefinition { table_number, .. } => format!("definition  table {table_number}"),
        RecordHeader::Memo { table_number, .. } => format!("memo        table {table_number}"),
        RecordHeader::Index { table_number, index_number } => format!("index       table {table_number} #{index_number}"),
        RecordHeader::Unknown => "unknown".into(),
    }
}

#[derive(Serialize)]
struct RecordView<'a> {
    page:          u32,
    record_length: usize,
    header_length: usize,
    header:        &'a RecordHeader,
    payload:       String,
}
