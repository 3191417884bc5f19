use std::time::Duration;

use anyhow::{Context, Result};
use pgcluster_converge::{preview, ConfigChangePolicy, ServerPlan, SetupOptions, SetupReport};
use serde_json::json;

use crate::config::Config;
use crate::prompt::StdinPrompt;

pub async fn run_setup(config: &Config, settle_seconds: u64, on_config_change: ConfigChangePolicy) -> Result<()> {
    let cluster = config.load_cluster()?;
    let templates = config.load_templates(&cluster)?;
    let hosts = config.hosts(&cluster);
    let options = SetupOptions {
        settle_delay: Duration::from_secs(settle_seconds),
        on_config_change,
    };

    tracing::info!(
        "Setting up cluster: master {}, {} replica(s)",
        cluster.master(),
        cluster.replicas().count()
    );
    let report = pgcluster_converge::run_setup(&cluster, &hosts, &templates, &StdinPrompt, &options)
        .await
        .context("Setup failed")?;

    print!("{}", format_report(&report));
    Ok(())
}

pub async fn run_plan(config: &Config, output: &str) -> Result<()> {
    let cluster = config.load_cluster()?;
    let templates = config.load_templates(&cluster)?;
    let hosts = config.hosts(&cluster);

    let plans = preview(&cluster, &hosts, &templates)
        .await
        .context("Failed to plan setup")?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&plans_json(&plans))?);
    } else {
        print!("{}", format_plans(&plans));
    }
    Ok(())
}

fn format_report(report: &SetupReport) -> String {
    let mut out = String::new();
    for server in &report.servers {
        out.push_str(&format!("{}:{} ({})\n", server.domain, server.port, server.container_name));
        if server.actions.is_empty() {
            out.push_str("  already converged\n");
        }
        for action in &server.actions {
            out.push_str(&format!("  ✓ {}\n", action));
        }
    }
    out
}

fn format_plans(plans: &[ServerPlan]) -> String {
    let mut out = String::new();
    for plan in plans {
        out.push_str(&format!("{}:{} ({})\n", plan.domain, plan.port, plan.container_name));
        match &plan.actions {
            Ok(actions) if actions.is_empty() => out.push_str("  nothing to do\n"),
            Ok(actions) => {
                for (step, action) in actions.iter().enumerate() {
                    out.push_str(&format!("  {}. {}\n", step + 1, action));
                }
            }
            Err(err) => out.push_str(&format!("  ✗ {}\n", err)),
        }
    }
    out
}

fn plans_json(plans: &[ServerPlan]) -> serde_json::Value {
    let servers: Vec<serde_json::Value> = plans
        .iter()
        .map(|plan| {
            let (actions, error) = match &plan.actions {
                Ok(actions) => (actions.iter().map(ToString::to_string).collect::<Vec<_>>(), None),
                Err(err) => (Vec::new(), Some(err.to_string())),
            };
            json!({
                "domain": plan.domain,
                "port": plan.port,
                "container_name": plan.container_name,
                "actions": actions,
                "error": error,
            })
        })
        .collect();
    json!({ "servers": servers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgcluster_converge::error::{DataSafetyViolation, Error};
    use pgcluster_converge::{Action, ServerReport};

    fn plans() -> Vec<ServerPlan> {
        vec![
            ServerPlan {
                domain: "db1.example.com".to_string(),
                port: 5432,
                container_name: "db1-postgres-master_5432".to_string(),
                actions: Ok(vec![
                    Action::InstallConfig {
                        file: "pg_hba.conf".to_string(),
                    },
                    Action::RestartContainer,
                ]),
            },
            ServerPlan {
                domain: "db2.example.com".to_string(),
                port: 5433,
                container_name: "db1-postgres-replica_5433".to_string(),
                actions: Err(Error::DataSafety(DataSafetyViolation::DataPathNotEmpty {
                    host: "db2.example.com".to_string(),
                    path: "/srv/pgcluster/db1-postgres-replica_5433/data".to_string(),
                })),
            },
        ]
    }

    #[test]
    fn test_plan_table_numbers_steps_and_shows_errors() {
        let text = format_plans(&plans());
        assert!(text.contains("  1. InstallConfig(pg_hba.conf)\n  2. RestartContainer\n"));
        assert!(text.contains("✗ db2.example.com: container is missing but data path"));
    }

    #[test]
    fn test_plan_json() {
        let value = plans_json(&plans());
        assert_eq!(value["servers"][0]["actions"][1], "RestartContainer");
        assert!(value["servers"][0]["error"].is_null());
        assert!(value["servers"][1]["error"].as_str().unwrap().contains("not empty"));
    }

    #[test]
    fn test_report_marks_converged_servers() {
        let report = SetupReport {
            servers: vec![ServerReport {
                domain: "db1.example.com".to_string(),
                port: 5432,
                container_name: "db1-postgres-master_5432".to_string(),
                actions: Vec::new(),
            }],
        };
        assert_eq!(
            format_report(&report),
            "db1.example.com:5432 (db1-postgres-master_5432)\n  already converged\n"
        );
    }
}
