//! Token configuration, advisory metadata, and the deployment record

use crate::amount::{raw_amount, MAX_DECIMALS};
use crate::errors::{FieldError, ValidationError};
use crate::network::Network;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_NAME_LEN: usize = 32;
pub const MAX_SYMBOL_LEN: usize = 10;
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Largest supply accepted by the configuration form (2^53 - 1)
pub const MAX_INITIAL_SUPPLY: u64 = 9_007_199_254_740_991;

/// Transaction id recorded for a step that did not complete
pub const UNKNOWN_TX: &str = "unknown";

/// Parameters of the token to deploy, saved as `tokenConfig`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub initial_supply: u64,
    pub decimals: u8,
}

impl TokenConfig {
    /// Check every field, reporting all failures at once
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Token name is required"));
        } else if self.name.chars().count() > MAX_NAME_LEN {
            errors.push(FieldError::new(
                "name",
                format!("Token name must be {} characters or less", MAX_NAME_LEN),
            ));
        }

        if self.symbol.trim().is_empty() {
            errors.push(FieldError::new("symbol", "Token symbol is required"));
        } else if self.symbol.chars().count() > MAX_SYMBOL_LEN {
            errors.push(FieldError::new(
                "symbol",
                format!("Token symbol must be {} characters or less", MAX_SYMBOL_LEN),
            ));
        }

        if self.initial_supply == 0 {
            errors.push(FieldError::new(
                "initialSupply",
                "Initial supply must be a positive number",
            ));
        } else if self.initial_supply > MAX_INITIAL_SUPPLY {
            errors.push(FieldError::new("initialSupply", "Initial supply is too large"));
        }

        if self.decimals > MAX_DECIMALS {
            errors.push(FieldError::new(
                "decimals",
                "Decimals must be an integer between 0 and 9",
            ));
        } else if self.initial_supply > 0 && raw_amount(self.initial_supply, self.decimals).is_err() {
            errors.push(FieldError::new(
                "initialSupply",
                format!(
                    "Initial supply exceeds the largest amount representable with {} decimals",
                    self.decimals
                ),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }

    /// `initial_supply × 10^decimals` in base units
    pub fn raw_initial_supply(&self) -> Result<u64, ValidationError> {
        raw_amount(self.initial_supply, self.decimals).map_err(|e| ValidationError {
            errors: vec![FieldError::new("initialSupply", e.to_string())],
        })
    }
}

/// One descriptive `(trait_type, value)` pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: String,
}

/// Descriptive token metadata, saved as `tokenMetadata`
///
/// Reference data only: nothing here is written on-chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadataDraft {
    pub description: String,
    #[serde(default)]
    pub external_url: String,
    #[serde(default)]
    pub attributes: Vec<MetadataAttribute>,
}

impl TokenMetadataDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.description.trim().is_empty() {
            errors.push(FieldError::new("description", "Description is required"));
        } else if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            errors.push(FieldError::new(
                "description",
                format!("Description must be {} characters or less", MAX_DESCRIPTION_LEN),
            ));
        }

        if !self.external_url.is_empty() && url::Url::parse(&self.external_url).is_err() {
            errors.push(FieldError::new("externalUrl", "Please enter a valid URL"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }

    /// Append an empty attribute, returning its index
    pub fn add_attribute(&mut self) -> usize {
        self.attributes.push(MetadataAttribute::default());
        self.attributes.len() - 1
    }

    /// Replace the attribute at `index`; `false` if out of range
    pub fn update_attribute(&mut self, index: usize, attribute: MetadataAttribute) -> bool {
        match self.attributes.get_mut(index) {
            Some(slot) => {
                *slot = attribute;
                true
            }
            None => false,
        }
    }

    pub fn remove_attribute(&mut self, index: usize) -> Option<MetadataAttribute> {
        (index < self.attributes.len()).then(|| self.attributes.remove(index))
    }
}

/// Outcome of a deployment, saved as `deploymentResult`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub token_name: String,
    pub token_symbol: String,
    #[serde(rename = "tokenMintAddress")]
    pub mint_address: String,
    pub initial_supply: u64,
    pub decimals: u8,
    pub owner: String,
    pub network: Network,
    pub deploy_time: DateTime<Utc>,
    /// Mint-creation transaction
    #[serde(rename = "transactionId")]
    pub create_tx_id: String,
    /// Initial-supply transaction, `"unknown"` when supply was not minted
    #[serde(rename = "mintTransactionId")]
    pub mint_tx_id: String,
}

impl DeploymentResult {
    pub fn explorer_url(&self) -> String {
        format!(
            "https://explorer.solana.com/address/{}?cluster={}",
            self.mint_address,
            self.network.explorer_cluster()
        )
    }

    pub fn is_fully_minted(&self) -> bool {
        self.mint_tx_id != UNKNOWN_TX
    }
}
