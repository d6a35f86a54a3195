//! `cbk` - CLI for cbtrack
//!
//! This binary provides the command-line interface for running the checkout
//! kiosk and managing its roster, queue, and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::error;

use cbtrack::cli::{Cli, Command, ConfigCommand, DevicesCommand, RosterCommand};
use cbtrack::flush::{FlushOutcome, Flusher};
use cbtrack::inventory::Inventory;
use cbtrack::kiosk::Kiosk;
use cbtrack::ledger::Ledger;
use cbtrack::roster::Roster;
use cbtrack::sheets::{HttpSheetStore, SheetCredentials, SheetStore, SheetTarget};
use cbtrack::{init_logging, logging, Config, Error, Result};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    let result = match cli.command {
        Command::Run => handle_run(&config).await,
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Flush => handle_flush(&config).await,
        Command::Devices(devices_cmd) => handle_devices(&config, &devices_cmd).await,
        Command::Roster(roster_cmd) => handle_roster(&config, roster_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    };

    if let Err(err) = result {
        // Leave something for the operator to look at after the exit
        match logging::write_crash_log(&config.log_dir(), &err) {
            Ok(path) => error!("{err} (crash log: {})", path.display()),
            Err(log_err) => error!("{err} (could not write crash log: {log_err})"),
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Build the sheet store from configuration.
fn build_store(config: &Config) -> Result<Arc<dyn SheetStore>> {
    if config.sheet.endpoint.is_empty() {
        return Err(Error::ConfigValidation {
            message: "sheet.endpoint must be configured".to_string(),
        });
    }

    let credentials = SheetCredentials::load(config.credentials_path())?;
    let store = HttpSheetStore::new(
        &config.sheet.endpoint,
        SheetTarget {
            spreadsheet: config.sheet.spreadsheet.clone(),
            worksheet: config.sheet.worksheet.clone(),
        },
        &credentials,
        config.sheet_timeout(),
    )?;

    Ok(Arc::new(store))
}

async fn handle_run(config: &Config) -> Result<()> {
    let store = build_store(config)?;
    let kiosk = Kiosk::new(config.clone(), store)?;
    kiosk.run().await
}

async fn handle_flush(config: &Config) -> Result<()> {
    let ledger = Ledger::load(config.batch_path());
    if ledger.is_empty() {
        println!("Nothing queued.");
        return Ok(());
    }

    let store = build_store(config)?;
    let inventory = Inventory::load(config.status_path())?;

    let mut flusher = Flusher::new(
        store,
        Arc::new(Mutex::new(ledger)),
        Arc::new(Mutex::new(inventory)),
        config.batch_path(),
        config.cooldown(),
    );

    match flusher.flush_once().await? {
        FlushOutcome::Flushed(count) => println!("Flushed {count} entries."),
        FlushOutcome::Empty => println!("Nothing queued."),
        FlushOutcome::RateLimited | FlushOutcome::CoolingDown => {
            println!("Remote is rate limiting; entries stay queued.");
        }
    }

    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let roster_entries = Roster::load(config.roster_path()).map(|r| r.len()).ok();
    let inventory = Inventory::load(config.status_path())?;
    let ledger = Ledger::load(config.batch_path());

    let checked_out = inventory
        .sorted()
        .iter()
        .filter(|(_, status)| *status == cbtrack::DeviceStatus::Out)
        .count();

    if json {
        let status = serde_json::json!({
            "roster_path": config.roster_path(),
            "roster_entries": roster_entries,
            "devices": inventory.len(),
            "checked_out": checked_out,
            "queued_entries": ledger.len(),
            "endpoint_configured": !config.sheet.endpoint.is_empty(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("cbk status");
        println!("----------");
        match roster_entries {
            Some(count) => println!("Roster:        {count} students"),
            None => println!(
                "Roster:        missing ({})",
                config.roster_path().display()
            ),
        }
        println!("Devices:       {} ({} checked out)", inventory.len(), checked_out);
        println!("Queued:        {} entries", ledger.len());
        if config.sheet.endpoint.is_empty() {
            println!("Remote:        not configured");
        } else {
            println!("Remote:        {}", config.sheet.endpoint);
        }
    }

    Ok(())
}

async fn handle_devices(config: &Config, cmd: &DevicesCommand) -> Result<()> {
    let devices = if cmd.remote {
        let store = build_store(config)?;
        let statuses = store.pull_statuses().await?;
        let mut devices: Vec<_> = statuses.into_iter().collect();
        devices.sort_by(|a, b| a.0.cmp(&b.0));
        devices
    } else {
        Inventory::load(config.status_path())?.sorted()
    };

    if cmd.json {
        let map: BTreeMap<_, _> = devices.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else if devices.is_empty() {
        println!("No devices known.");
    } else {
        for (device, status) in devices {
            println!("{device:<16} {status}");
        }
    }

    Ok(())
}

fn handle_roster(config: &Config, cmd: RosterCommand) -> Result<()> {
    match cmd {
        RosterCommand::Build { names, fuzz, out } => {
            let raw = std::fs::read_to_string(&names).map_err(|source| Error::FileRead {
                path: names.clone(),
                source,
            })?;

            let roster = Roster::build(raw.lines(), &fuzz)?;
            let out = out.unwrap_or_else(|| config.roster_path());
            roster.save(&out)?;
            println!("Wrote {} entries to {}", roster.len(), out.display());
        }
        RosterCommand::Join { inputs, out } => {
            let mut merged = Roster::new();
            for input in &inputs {
                merged.merge(Roster::load(input)?);
            }
            let out = out.unwrap_or_else(|| config.roster_path());
            merged.save(&out)?;
            println!(
                "Merged {} files into {} ({} entries)",
                inputs.len(),
                out.display(),
                merged.len()
            );
        }
        RosterCommand::Show { json } => {
            let roster = Roster::load(config.roster_path())?;
            if json {
                let map: BTreeMap<_, _> = roster.iter().collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                let mut names: Vec<_> = roster.iter().map(|(_, name)| name).collect();
                names.sort_unstable();
                for name in names {
                    println!("{name}");
                }
            }
        }
    }

    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Data]");
                println!("  Roster path:        {}", config.roster_path().display());
                println!("  Status path:        {}", config.status_path().display());
                println!("  Batch path:         {}", config.batch_path().display());
                println!();
                println!("[Scanner]");
                println!("  Source:             {}", config.scanner.source);
                println!("  Min scan gap (ms):  {}", config.scanner.min_scan_gap_ms);
                println!();
                println!("[Sheet]");
                if config.sheet.endpoint.is_empty() {
                    println!("  Endpoint:           (not configured)");
                } else {
                    println!("  Endpoint:           {}", config.sheet.endpoint);
                }
                println!("  Spreadsheet:        {}", config.sheet.spreadsheet);
                println!("  Worksheet:          {}", config.sheet.worksheet);
                println!(
                    "  Refresh (s):        {}",
                    config.sheet.refresh_interval_secs
                );
                println!();
                println!("[Flush]");
                println!("  Interval (s):       {}", config.flush.interval_secs);
                println!("  Max batch:          {}", config.flush.max_batch);
                println!("  Cooldown (s):       {}", config.flush.cooldown_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }

    Ok(())
}
