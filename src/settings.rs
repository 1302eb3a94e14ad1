use std::fs;
use std::path::Path;

use anyhow::Context;
use ballot::{config::NodeConfig, PeerId};

use crate::cli::Cli;

pub fn from_toml(raw: &str) -> anyhow::Result<NodeConfig> {
    toml::from_str(raw).context("invalid node configuration")
}

pub fn read_file(path: &Path) -> anyhow::Result<NodeConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    from_toml(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// Command line and environment win over the file.
pub fn apply_overrides(config: &mut NodeConfig, cli: &Cli) {
    if let Some(id) = &cli.node_id {
        config.node_id = PeerId::new(id.clone());
    }
    if let Some(url) = &cli.url {
        config.advertised_url.clone_from(url);
    }
    if let Some(mode) = cli.mode {
        config.election_mode = mode;
    }
    if let Some(log_server) = &cli.log_server {
        config.log_server_url = Some(log_server.clone());
    }
}

pub fn load(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => read_file(path)?,
        None => NodeConfig::default(),
    };
    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot::ElectionMode;
    use clap::Parser;

    const SAMPLE: &str = r#"
node_id = "20"
advertised_url = "http://10.0.0.2:8000/"
election_mode = "valentao"
lease_ttl_secs = 3.0

[service]
name = "ballot-b"
version = 1.2

[[peers]]
id = "10"
nome = "ballot-a"
url = "http://10.0.0.1:8000/"

[[peers]]
id = "30"
nome = "ballot-c"
url = "http://10.0.0.3:8000/"
"#;

    #[test]
    fn test_from_toml() {
        let config = from_toml(SAMPLE).unwrap();
        assert_eq!(config.node_id, PeerId::from("20"));
        assert_eq!(config.election_mode, ElectionMode::Bully);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[1].name, "ballot-c");
        assert_eq!(config.service.name, "ballot-b");
        assert_eq!(config.jitter_max_secs, 10.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_win() {
        let mut config = from_toml(SAMPLE).unwrap();
        let cli = Cli::parse_from([
            "ballotd",
            "--node-id",
            "99",
            "--mode",
            "anel",
            "--url",
            "http://elsewhere/",
            "-vv",
        ]);
        apply_overrides(&mut config, &cli);
        assert_eq!(config.node_id, PeerId::from("99"));
        assert_eq!(config.election_mode, ElectionMode::Ring);
        assert_eq!(config.advertised_url, "http://elsewhere/");
        assert_eq!(cli.log_directive(), "debug");
    }

    #[test]
    fn test_bad_toml_is_rejected() {
        assert!(from_toml("node_id = [").is_err());
        assert!(from_toml("peers = [{ id = \"1\" }]").is_err());
    }
}
