// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use config::{Config, File};
use std::path::{Path, PathBuf};

use crate::ImaAgentConfig;

/// A helper function that will search for all config files in the given
/// directory and return them as a vec of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> ima_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory
    // and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(ima_utils::Error::from))
        .collect()
}

/// Try to parse the [`ImaAgentConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> ima_utils::Result<ImaAgentConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of IMA).
    let builder = builder
        .add_source(config::Environment::with_prefix("IMA").separator("_"));
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        ImaAgentConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files from `path`.
///
/// It is the same as using the [`search_config_files`] and
/// [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(path: P) -> ima_utils::Result<ImaAgentConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and
/// standardize its values.
pub fn postloading_process(
    mut config: ImaAgentConfig,
) -> ima_utils::Result<ImaAgentConfig> {
    tracing::trace!("Checking configration sanity ...");
    if config.transfer.transactions_per_batch == 0 {
        tracing::warn!(
            "transactions-per-batch must be at least 1, clamping to 1"
        );
        config.transfer.transactions_per_batch = 1;
    }
    if config.pwa.enabled
        && config.pwa.peers.len() < config.pwa.nodes_count
    {
        tracing::warn!(
            "pwa peers list is shorter than nodes-count ({} < {}), \
             missing peers will never be notified",
            config.pwa.peers.len(),
            config.pwa.nodes_count,
        );
    }
    config.verify()?;
    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    const MAIN_NET_TOML: &str = r#"
        [main-net]
        chain-name = "Mainnet"
        http-endpoint = "http://localhost:8545"
        chain-id = 1
        message-proxy = "0x0000000000000000000000000000000000000001"
        [main-net.account]
        address = "0x000000000000000000000000000000000000dEaD"
        [main-net.account.credential]
        kind = "direct"
        private-key = "0x0000000000000000000000000000000000000000000000000000000000000001"
    "#;

    const S_CHAIN_TOML: &str = r#"
        [s-chain]
        chain-name = "Bob"
        http-endpoint = "http://localhost:15000"
        chain-id = 1234567
        message-proxy = "0x0000000000000000000000000000000000000002"
        [s-chain.account]
        address = "0x000000000000000000000000000000000000bEEF"
        [s-chain.account.credential]
        kind = "transaction-manager"
        url = "http://localhost:3008"
    "#;

    #[test]
    fn merges_split_config_files_from_one_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "main-net.toml", MAIN_NET_TOML);
        write_config(dir.path(), "s-chain.toml", S_CHAIN_TOML);
        let config = load(dir.path()).unwrap();
        assert_eq!(config.main_net.chain_name, "Mainnet");
        assert_eq!(config.s_chain.chain_name, "Bob");
    }

    #[test]
    fn zero_batch_size_is_clamped_to_one() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "main-net.toml", MAIN_NET_TOML);
        write_config(dir.path(), "s-chain.toml", S_CHAIN_TOML);
        write_config(
            dir.path(),
            "transfer.toml",
            "[transfer]\ntransactions-per-batch = 0\n",
        );
        let config = load(dir.path()).unwrap();
        assert_eq!(config.transfer.transactions_per_batch, 1);
    }

    #[test]
    fn missing_required_section_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "main-net.toml", MAIN_NET_TOML);
        assert!(load(dir.path()).is_err());
    }
}
