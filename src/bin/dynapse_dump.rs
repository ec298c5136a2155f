//! dynapse_dump - generate, inspect and validate packet stream files
//!
//! Usage:
//!   dynapse_dump generate [-f config.toml] [-o out.dyn] [-n packets] [--seed N]
//!   dynapse_dump dump <file> [--format text|json] [--valid-only] [--reverse] [--chip N]
//!   dynapse_dump validate <file>

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dynapse_events::common::cli::{CommonArgs, DumpCli, DumpCommand, OutputFormat};
use dynapse_events::config::Config;
use dynapse_events::emulator::Emulator;
use dynapse_events::packet::{EventSummary, DYNAPSE_CONFIG_EVENT_TYPE};
use dynapse_events::recorder::{PacketStreamReader, PacketStreamWriter};
use dynapse_events::{Direction, Filter};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("dynapse_events=info".parse()?),
        )
        .init();

    let cli = DumpCli::parse();

    match cli.command {
        DumpCommand::Generate {
            common,
            output,
            packets,
            seed,
        } => generate(&common, output, packets, seed),
        DumpCommand::Dump {
            file,
            format,
            valid_only,
            reverse,
            chip,
        } => {
            let direction = if reverse {
                Direction::Reverse
            } else {
                Direction::Forward
            };
            let filter = if valid_only {
                Filter::ValidOnly
            } else {
                Filter::All
            };
            dump(&file, format, direction, filter, chip)
        }
        DumpCommand::Validate { file } => validate(&file),
    }
}

fn generate(
    common: &CommonArgs,
    output: Option<PathBuf>,
    packets: Option<u32>,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = match &common.config_file {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path))?,
        None => Config::default(),
    };

    if let Some(n) = packets {
        config.emulator.num_packets = n;
    }
    if seed.is_some() {
        config.emulator.seed = seed;
    }
    config.validate()?;

    let output = output.unwrap_or_else(|| PathBuf::from(&config.recorder.output_path));
    let mut writer = PacketStreamWriter::create(&output, config.emulator.source_id)
        .with_context(|| format!("creating {}", output.display()))?;

    let mut emulator = Emulator::new(config.emulator.clone())?;
    emulator.run(|packet| {
        writer.write_packet(&packet)?;
        Ok(())
    })?;

    let (_, footer) = writer.finish()?;
    info!(
        path = %output.display(),
        packets = footer.total_packets,
        valid = footer.valid_events,
        "Generated packet stream"
    );
    Ok(())
}

fn open_reader(file: &Path) -> Result<PacketStreamReader<BufReader<File>>> {
    let handle = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    PacketStreamReader::new(BufReader::new(handle))
        .with_context(|| format!("reading header of {}", file.display()))
}

fn dump(
    file: &Path,
    format: OutputFormat,
    direction: Direction,
    filter: Filter,
    chip: Option<u8>,
) -> Result<()> {
    let mut reader = open_reader(file)?;
    let finished = reader.read_footer().is_ok();
    if !finished {
        eprintln!("Warning: {} has no footer, reading to end of file", file.display());
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for (packet_index, packet) in reader.packets(finished).enumerate() {
        let packet = packet.with_context(|| format!("decoding packet {}", packet_index))?;
        let header = packet.header();

        if format == OutputFormat::Text {
            writeln!(
                out,
                "=== Packet {} (type {}, source {}, overflow {}, {}/{} valid, capacity {}) ===",
                packet_index,
                DYNAPSE_CONFIG_EVENT_TYPE,
                header.event_source(),
                header.event_ts_overflow(),
                packet.event_valid(),
                packet.event_number(),
                packet.capacity()
            )?;
        }

        let summaries: Vec<EventSummary> = match chip {
            Some(chip_id) => packet
                .find_by_chip_id(chip_id, filter)
                .map(|(index, event)| EventSummary::new(index, event, header))
                .into_iter()
                .collect(),
            None => packet.summaries(direction, filter),
        };

        for summary in &summaries {
            match format {
                OutputFormat::Text => writeln!(out, "  {}", summary)?,
                OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(summary)?)?,
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn validate(file: &Path) -> Result<()> {
    let mut reader = open_reader(file)?;
    let result = reader.validate();

    println!("File: {}", file.display());
    println!("Source ID: {}", result.header.source_id);
    match &result.footer {
        Some(footer) => {
            println!("Packets: {}", footer.total_packets);
            println!("Events: {} ({} valid)", footer.total_events, footer.valid_events);
            println!("Checksum: {:016x}", footer.data_checksum);
        }
        None => println!("Footer: missing"),
    }
    println!("Readable packets: {}", result.readable_packets);

    if result.is_valid {
        println!("Status: VALID");
        return Ok(());
    }

    for error in &result.errors {
        println!("  - {}", error);
    }
    if result.needs_recovery() {
        println!("Status: INCOMPLETE (packets can be read with `dump`)");
    }
    bail!("{} failed validation", file.display())
}
