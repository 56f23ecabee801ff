//! `gridstage version`: library version and loaded engine plugins.

use anyhow::Result;
use gridstage_core::Context;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct VersionReport<'a> {
    version: &'a str,
    plugins: &'a [String],
}

pub(crate) fn run_version_command(context: &Context, json: bool) -> Result<()> {
    let report = VersionReport {
        version: Context::version(),
        plugins: context.plugin_names(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("gridstage {}", report.version);
    for plugin in report.plugins {
        println!("  {plugin}");
    }
    Ok(())
}
