//! `gridstage bringonline`: submit, then optionally poll until settled.

use std::time::Duration;

use anyhow::{Context as _, Result};
use gridstage_core::{Context, Outcome, OutcomeSummary, PollBackoff, StagingToken};
use serde::Serialize;
use tracing::info;

use crate::app_config::Settings;
use crate::cli::BringOnlineArgs;
use crate::exit_handler::{ProcessExit, determine_exit_outcome};

#[derive(Debug, Serialize)]
struct UrlReport<'a> {
    url: &'a str,
    #[serde(flatten)]
    outcome: &'a Outcome,
}

#[derive(Debug, Serialize)]
struct BringOnlineReport<'a> {
    token: &'a StagingToken,
    results: Vec<UrlReport<'a>>,
    summary: OutcomeSummary,
}

/// One status line per URL, as printed in text mode.
pub(crate) fn format_outcome_line(url: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Ready => format!("OK     {url}"),
        Outcome::Pending => format!("QUEUED {url}"),
        Outcome::Failed(fault) => format!("FAILED {url}\n\t{fault}"),
    }
}

pub(crate) async fn run_bringonline_command(
    context: &Context,
    args: &BringOnlineArgs,
    settings: &Settings,
    json: bool,
) -> Result<ProcessExit> {
    let pin_lifetime = args
        .pin_lifetime
        .map_or(settings.pin_lifetime, Duration::from_secs);
    let timeout = args.timeout.map_or(settings.timeout, Duration::from_secs);
    let staging = context.staging();

    let (token, outcomes) = staging
        .bring_online(&args.urls, pin_lifetime, timeout, true)
        .await
        .context("Bring-online request was rejected")?;
    if !json {
        println!("Token: {token}");
    }

    let mut results = outcomes;
    let mut round: Vec<usize> = (0..args.urls.len()).collect();
    let mut backoff = PollBackoff::new(settings.poll_initial_delay, settings.poll_max_delay);

    loop {
        let mut remaining = Vec::with_capacity(round.len());
        for &index in &round {
            if !json {
                println!("{}", format_outcome_line(&args.urls[index], &results[index]));
            }
            if results[index] == Outcome::Pending {
                remaining.push(index);
            }
        }
        round = remaining;

        if !args.poll || round.is_empty() {
            break;
        }
        let delay = backoff.next_delay();
        info!(delay_secs = delay.as_secs_f64(), pending = round.len(), "Next attempt");
        tokio::time::sleep(delay).await;

        let pending_urls: Vec<String> = round.iter().map(|&i| args.urls[i].clone()).collect();
        let polled = staging
            .poll_online(&pending_urls, &token)
            .await
            .context("Poll request was rejected")?;
        for (&index, outcome) in round.iter().zip(polled) {
            results[index] = outcome;
        }
    }

    let summary = OutcomeSummary::of(&results);
    if json {
        let report = BringOnlineReport {
            token: &token,
            results: args
                .urls
                .iter()
                .zip(&results)
                .map(|(url, outcome)| UrlReport { url, outcome })
                .collect(),
            summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(determine_exit_outcome(
        summary.ready + summary.pending,
        summary.failed,
    ))
}
