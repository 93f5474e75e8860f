mod cli;

use movdemux::config::{self, Config};
use movdemux::report::{collect_packets, InfoReport};
use movdemux_media::Demuxer;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config_or_default(cli.config.as_deref())?;

    // RUST_LOG wins, then the config file, then the verbosity default
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "movdemux=trace,movdemux_media=trace".to_string()
        } else if let Some(filter) = &config.logging.filter {
            filter.clone()
        } else {
            "movdemux=info,movdemux_media=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { file, json } => info_file(&file, json || config.output.json),
        Commands::Packets {
            file,
            limit,
            seek_ms,
            json,
        } => list_packets(&file, &config, limit, seek_ms, json),
        Commands::Version => {
            println!("movdemux {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_demuxer(file: &Path) -> Result<Demuxer> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let mut demuxer = Demuxer::create(&file.to_string_lossy())
        .with_context(|| format!("Failed to open {:?}", file))?;
    demuxer
        .init()
        .with_context(|| format!("Failed to read movie header: {:?}", file))?;
    tracing::info!("Opened {:?} ({} tracks)", file, demuxer.tracks().len());
    Ok(demuxer)
}

fn info_file(file: &Path, json: bool) -> Result<()> {
    let mut demuxer = open_demuxer(file)?;
    let report = InfoReport::collect(&mut demuxer)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("File: {}", file.display());
        print!("{}", report);
    }
    Ok(())
}

fn list_packets(
    file: &Path,
    config: &Config,
    limit: Option<usize>,
    seek_ms: Option<i64>,
    json: bool,
) -> Result<()> {
    let mut demuxer = open_demuxer(file)?;

    if let Some(ms) = seek_ms {
        let outcome = demuxer.seek(ms.saturating_mul(1000))?;
        tracing::debug!("Seek to {} ms: {:?}", ms, outcome);
    }

    let limit = limit.or(config.output.max_packets);
    let report = collect_packets(&mut demuxer, limit)?;

    if json || config.output.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}
