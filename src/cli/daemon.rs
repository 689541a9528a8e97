use anyhow::{anyhow, Result};
use clap::ArgMatches;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::config::PlcConfig;
use crate::{
    api::{ControlMessage, Controller, ForwardMode, ForwardOptions, ValueForwarder},
    core::PlcEvent,
    protocol::simulated::SimulatedClient,
    Plc,
};

/// Run the daemon until Ctrl-C or end of stdin.
///
/// Forwarded values are printed to stdout as one JSON object per line.
/// stdin accepts control lines such as `trigger` or `cycletime 2000`.
pub async fn run(matches: &ArgMatches) -> Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .ok_or_else(|| anyhow!("--config is required"))?;
    let config = PlcConfig::from_file(config_path)?;
    log::info!(
        "Loaded {config_path}: port {:?}, cycle {} ms, {} variable(s)",
        config.serial_port,
        config.cycle_time_ms,
        config.variables.len()
    );

    let mode = ForwardMode::from_parts(
        matches
            .get_one::<String>("mode")
            .map(String::as_str)
            .unwrap_or("all"),
        matches.get_one::<String>("variable").map(String::as_str),
    )?;
    let options = ForwardOptions {
        mode,
        diff: matches.get_flag("diff"),
    };

    let plc = config.start(Arc::new(SimulatedClient::new()));
    log_status_changes(&plc);

    let output = ValueForwarder::new(options).attach(&plc);
    let printer = tokio::spawn(async move {
        while let Ok(message) = output.recv_async().await {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{line}"),
                Err(err) => log::warn!("Failed to serialize output message: {err}"),
            }
        }
    });

    read_control_lines(&plc).await;

    plc.close().await?;
    if let Err(err) = printer.await {
        log::warn!("Output printer ended abnormally: {err}");
    }
    log::info!("Daemon stopped");
    Ok(())
}

fn log_status_changes(plc: &Plc) {
    let events = plc.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            if let PlcEvent::StatusChanged(status) = event {
                log::info!("PLC status: {status}");
            }
        }
    });
}

async fn read_control_lines(plc: &Plc) {
    let controller = Controller::new(plc, None);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(err) = result {
                    log::error!("Failed to listen for Ctrl-C: {err}");
                }
                log::info!("Interrupted, shutting down");
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let Some(message) = ControlMessage::from_line(&line) else {
                        continue;
                    };
                    match controller.handle(message).await {
                        Ok(Some(_)) => log::info!("Applied control command {:?}", line.trim()),
                        Ok(None) => log::warn!("Control command {:?} was rejected", line.trim()),
                        Err(err) => log::warn!("Control command {:?} failed: {err}", line.trim()),
                    }
                }
                Ok(None) => {
                    log::info!("stdin closed, shutting down");
                    return;
                }
                Err(err) => {
                    log::error!("Failed to read stdin: {err}");
                    return;
                }
            }
        }
    }
}
