use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pgcluster_converge::templates::defaults;
use pgcluster_models::Cluster;

use crate::config::Config;

const EXAMPLE_SUFFIX: &str = "_example";

pub fn run_check(config: &Config) -> Result<()> {
    let cluster = config.load_cluster()?;
    config.load_templates(&cluster)?;
    print!("{}", format_cluster(&cluster));
    println!();
    println!("✓ {} is valid", config.config_path.display());
    Ok(())
}

pub fn run_init(config: &Config, in_place: bool) -> Result<()> {
    for path in write_init_files(&config.config_path, &config.templates_dir, in_place)? {
        println!("  created {}", path.display());
    }
    if !in_place {
        println!();
        println!("Review the {} files, then drop the suffix.", EXAMPLE_SUFFIX);
    }
    Ok(())
}

/// Write the example declaration and default templates. Existing files are
/// left alone. Returns the files written.
fn write_init_files(config_path: &Path, templates_dir: &Path, in_place: bool) -> Result<Vec<PathBuf>> {
    let target = |path: PathBuf| {
        if in_place {
            path
        } else {
            let mut name = path.into_os_string();
            name.push(EXAMPLE_SUFFIX);
            PathBuf::from(name)
        }
    };

    std::fs::create_dir_all(templates_dir)
        .with_context(|| format!("Failed to create {}", templates_dir.display()))?;

    let mut files = vec![(target(config_path.to_path_buf()), defaults::CLUSTER_FILE)];
    for (name, contents) in defaults::templates() {
        files.push((target(templates_dir.join(name)), contents));
    }

    let mut written = Vec::new();
    for (path, contents) in files {
        if path.exists() {
            tracing::warn!("{} already exists, leaving it alone", path.display());
            continue;
        }
        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn format_cluster(cluster: &Cluster) -> String {
    let mut out = String::new();
    out.push_str(&format!("Image:        {}\n", cluster.image.name));
    out.push_str(&format!("Storage root: {}\n", cluster.storage_root));
    out.push_str(&format!("Config files: {}\n", cluster.image.config_files.join(", ")));
    let id = |value: Option<u32>| value.map(|id| id.to_string()).unwrap_or_else(|| "from image".to_string());
    out.push_str(&format!(
        "Owner:        uid {}, gid {}\n",
        id(cluster.image.uid),
        id(cluster.image.gid)
    ));
    out.push('\n');
    out.push_str("Servers:\n");
    for server in cluster.servers() {
        out.push_str(&format!("  {} ({})\n", server, server.role));
        out.push_str(&format!("    container: {}\n", server.container_name));
        out.push_str(&format!("    data:      {}\n", server.data_path));
        out.push_str(&format!("    conf:      {}\n", server.conf_path));
        out.push_str(&format!("    socket:    {}\n", server.socket_path));
    }
    out.push('\n');
    out.push_str("Databases:\n");
    for database in &cluster.databases {
        out.push_str(&format!("  {} (owner {})\n", database.name, database.role));
    }
    out
}
