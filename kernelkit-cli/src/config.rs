//! Chain configuration read from `<root>/chains.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use eyre::WrapErr;
use kernelkit_core::{Chain, ChainConfig, Transport};
use serde::Deserialize;

/// File name of the chain configuration inside the root directory.
pub const CHAINS_FILE: &str = "chains.json";

/// On-disk shape of the chain configuration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainsFile {
    chains: Vec<Chain>,
    #[serde(default)]
    project_ids: BTreeMap<u64, String>,
    #[serde(default)]
    transports: BTreeMap<u64, Transport>,
}

impl ChainsFile {
    fn into_config(self) -> eyre::Result<ChainConfig> {
        let mut config = ChainConfig::new(self.chains, self.project_ids)?;
        for (chain_id, transport) in self.transports {
            config = config.with_transport(chain_id, transport)?;
        }
        Ok(config)
    }
}

/// Mainnet over a public endpoint, used when no configuration file exists.
fn fallback() -> eyre::Result<ChainConfig> {
    Ok(ChainConfig::new(
        vec![Chain::new(1, "Ethereum").with_rpc_url("https://cloudflare-eth.com")],
        [],
    )?)
}

/// Loads the chain configuration under `root`.
pub fn load(root: &Path) -> eyre::Result<ChainConfig> {
    let path = root.join(CHAINS_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no chain configuration, using mainnet");
            return fallback();
        }
        Err(err) => return Err(err).wrap_err_with(|| format!("reading {}", path.display())),
    };
    serde_json::from_slice::<ChainsFile>(&bytes)
        .wrap_err_with(|| format!("parsing {}", path.display()))?
        .into_config()
}
