use anyhow::{Context, Result};
use pgcluster_converge::operations::{self, ReplicationReport, ServerStatus};

use crate::config::Config;

pub async fn run_status(config: &Config, domain: Option<&str>, output: &str) -> Result<()> {
    let cluster = config.load_cluster()?;
    let hosts = config.hosts(&cluster);

    let report = operations::collect_status(&cluster, &hosts, domain).await?;
    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_status(&report));
    }
    Ok(())
}

pub async fn run_list_roles(config: &Config) -> Result<()> {
    let cluster = config.load_cluster()?;
    let hosts = config.hosts(&cluster);
    let roles = operations::list_roles(&cluster, &hosts)
        .await
        .context("Failed to list roles")?;
    print!("{}", roles);
    Ok(())
}

pub async fn run_list_databases(config: &Config) -> Result<()> {
    let cluster = config.load_cluster()?;
    let hosts = config.hosts(&cluster);
    let databases = operations::list_databases(&cluster, &hosts)
        .await
        .context("Failed to list databases")?;
    print!("{}", databases);
    Ok(())
}

pub async fn run_streaming_status(config: &Config) -> Result<()> {
    let cluster = config.load_cluster()?;
    let hosts = config.hosts(&cluster);
    let reports = operations::streaming_status(&cluster, &hosts).await?;
    print!("{}", format_streaming(&reports));
    Ok(())
}

fn format_status(report: &[ServerStatus]) -> String {
    report
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_streaming(reports: &[ReplicationReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let role = if report.master { "master" } else { "replica" };
        out.push_str(&format!("{}:{} ({})\n", report.domain, report.port, role));
        match &report.status {
            Ok(status) => {
                for line in status.lines() {
                    out.push_str(&format!("  {}\n", line));
                }
            }
            Err(err) => out.push_str(&format!("  unknown: {}\n", err)),
        }
    }
    out
}
