use anyhow::{Context, Result};
use pgcluster_converge::operations;

use crate::config::Config;
use crate::prompt::StdinPrompt;

pub async fn run_dump(config: &Config, file: &str, database: &str) -> Result<()> {
    let cluster = config.load_cluster()?;
    let hosts = config.hosts(&cluster);

    let path = operations::dump(&cluster, &hosts, &StdinPrompt, file, database)
        .await
        .with_context(|| format!("Failed to dump {}", database))?;
    println!("{}:{}", cluster.master().domain, path);
    Ok(())
}

pub async fn run_restore(config: &Config, file: &str, database: &str) -> Result<()> {
    let cluster = config.load_cluster()?;
    let hosts = config.hosts(&cluster);

    operations::restore(&cluster, &hosts, &StdinPrompt, file, database)
        .await
        .with_context(|| format!("Failed to restore {} into {}", file, database))?;
    println!("Restored {} into {}", file, database);
    Ok(())
}
