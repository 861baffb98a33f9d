//! Engine configuration.

use std::time::Duration;

use bsv_script::Network;
use serde::{Deserialize, Serialize};

use crate::error::ActionError;

/// How auto-funding picks change outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSelection {
    /// Store order, oldest first, until the target is met.
    #[default]
    OldestFirst,
    /// The smallest single output that covers what is still missing; when
    /// none does, the largest one and try again.
    SmallestSufficient,
}

/// Tunables for a [`WalletEngine`](crate::WalletEngine). Missing JSON
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fee_rate_sat_per_kb: u64,
    /// Smallest change output worth creating.
    pub change_dust_limit: u64,
    pub input_selection: InputSelection,
    /// How long a signable transaction waits for its signatures.
    pub signable_ttl_secs: u64,
    pub change_basket: String,
    pub randomize_outputs: bool,
    pub accept_delayed_broadcast: bool,
    pub network: Network,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            fee_rate_sat_per_kb: 100,
            change_dust_limit: 1,
            input_selection: InputSelection::OldestFirst,
            signable_ttl_secs: 600,
            change_basket: "default".to_string(),
            randomize_outputs: true,
            accept_delayed_broadcast: true,
            network: Network::Mainnet,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ActionError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn signable_ttl(&self) -> Duration {
        Duration::from_secs(self.signable_ttl_secs)
    }

    /// `ceil(size * rate / 1000)`
    pub fn fee_for_size(&self, size_bytes: usize) -> u64 {
        (size_bytes as u64 * self.fee_rate_sat_per_kb).div_ceil(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fee_rate_sat_per_kb, 100);
        assert_eq!(config.change_dust_limit, 1);
        assert_eq!(config.input_selection, InputSelection::OldestFirst);
        assert_eq!(config.signable_ttl(), Duration::from_secs(600));
        assert_eq!(config.change_basket, "default");
        assert!(config.randomize_outputs);
        assert!(config.accept_delayed_broadcast);
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(
            r#"{"fee_rate_sat_per_kb": 50, "input_selection": "smallest_sufficient", "network": "testnet"}"#,
        )
        .unwrap();
        assert_eq!(config.fee_rate_sat_per_kb, 50);
        assert_eq!(config.input_selection, InputSelection::SmallestSufficient);
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.signable_ttl_secs, 600);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"input_selection": "random"}"#),
            Err(ActionError::Config(_))
        ));
    }

    #[test]
    fn test_fee_rounds_up() {
        let config = EngineConfig::default();
        assert_eq!(config.fee_for_size(0), 0);
        assert_eq!(config.fee_for_size(1), 1);
        assert_eq!(config.fee_for_size(10), 1);
        assert_eq!(config.fee_for_size(11), 2);
        assert_eq!(config.fee_for_size(226), 23);
    }
}
