//! `gridstage copy`: one copy with event logging and a progress display.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gridstage_core::{ChecksumMode, Context, EngineFault, Event, Marker, TransferParams};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info};

use crate::app_config::Settings;
use crate::cli::CopyArgs;
use crate::exit_handler::ProcessExit;

#[derive(Debug, Serialize)]
struct CopyReport<'a> {
    source: &'a str,
    destination: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a EngineFault>,
}

/// Builds the transfer configuration from flags and settings.
pub(crate) fn build_params(args: &CopyArgs, settings: &Settings) -> TransferParams {
    let mut params = TransferParams::new();
    params.set_overwrite(args.overwrite);
    params.set_create_parent(args.create_parent);
    params.set_nbstreams(args.nbstreams.unwrap_or(settings.nbstreams));
    if let Some(timeout) = args.timeout {
        params.set_timeout(Duration::from_secs(timeout));
    }
    if args.checksum {
        let algorithm = args
            .checksum_algo
            .clone()
            .unwrap_or_else(|| settings.checksum_algorithm.clone());
        params.set_checksum(
            ChecksumMode::Both,
            algorithm,
            args.checksum_value.clone().unwrap_or_default(),
        );
    }
    params
}

fn marker_message(marker: &Marker) -> String {
    format!(
        "{} transferred, {}/s, {}s elapsed",
        HumanBytes(marker.bytes_transferred),
        HumanBytes(marker.average_throughput),
        marker.elapsed_time.as_secs()
    )
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub(crate) async fn run_copy_command(
    context: &Context,
    args: &CopyArgs,
    settings: &Settings,
    show_progress: bool,
    json: bool,
) -> Result<ProcessExit> {
    let mut session = context.new_transfer_session();
    session.set_params(build_params(args, settings));

    session.add_event_callback(Arc::new(|event: &Event| {
        info!(
            side = %event.side,
            stage = %event.stage,
            domain = %event.domain,
            "EVENT {}",
            event.description
        );
    }));

    let bar = show_progress.then(progress_bar);
    let monitor_bar = bar.clone();
    session.add_monitor_callback(Arc::new(move |marker: &Marker| {
        debug!(
            bytes = marker.bytes_transferred,
            avg_throughput = marker.average_throughput,
            "MARKER"
        );
        if let Some(bar) = &monitor_bar {
            bar.set_message(marker_message(marker));
        }
    }));

    let result = session.copy_file(&args.source, &args.destination).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    session.close();

    let report = CopyReport {
        source: &args.source,
        destination: &args.destination,
        status: if result.is_ok() { "ok" } else { "failed" },
        error: result.as_ref().err(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    match result {
        Ok(()) => {
            if !json {
                println!("OK     {} => {}", args.source, args.destination);
            }
            Ok(ProcessExit::Success)
        }
        Err(fault) => {
            if !json {
                eprintln!("Failed to copy the file: {fault}");
            }
            Ok(ProcessExit::Failure)
        }
    }
}
