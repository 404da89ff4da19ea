//! Structured logging and operation context

use crate::errors::DeployPhase;
use crate::network::Network;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Structured logger for deployment and transfer lifecycle events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_deploy_started(&self, name: &str, symbol: &str, network: Network, owner: &str) {
        tracing::info!(
            context_id = %self.context_id,
            token_name = %name,
            token_symbol = %symbol,
            network = %network,
            owner = %owner,
            "Starting token deployment"
        );
    }

    pub fn log_phase_attempt(&self, phase: DeployPhase, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            context_id = %self.context_id,
            phase = %phase,
            attempt = attempt,
            max_attempts = max_attempts,
            "Deployment phase attempt"
        );
    }

    pub fn log_mint_created(&self, mint: &str, signature: &str, attempts: u32) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            signature = %signature,
            attempts = attempts,
            "Mint account created"
        );
    }

    pub fn log_supply_minted(&self, mint: &str, holder: &str, raw_amount: u64, signature: &str) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            holder = %holder,
            raw_amount = raw_amount,
            signature = %signature,
            "Initial supply minted"
        );
    }

    /// The mint exists but its initial supply was not minted
    pub fn log_partial_success(&self, mint: &str, reason: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            mint = %mint,
            reason = %reason,
            "Deployment completed without initial supply"
        );
    }

    pub fn log_deploy_failure(&self, phase: DeployPhase, attempts: u32, error: &str) {
        tracing::error!(
            context_id = %self.context_id,
            phase = %phase,
            attempts = attempts,
            error = %error,
            "Token deployment failed"
        );
    }

    pub fn log_transfer_attempt(&self, mint: &str, recipient: &str, raw_amount: u64) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            recipient = %recipient,
            raw_amount = raw_amount,
            "Attempting token transfer"
        );
    }

    pub fn log_transfer_success(&self, mint: &str, signature: &str, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            signature = %signature,
            latency_ms = latency_ms,
            "Token transfer confirmed"
        );
    }

    pub fn log_transfer_failure(&self, mint: &str, error: &str, latency_ms: u64) {
        tracing::warn!(
            context_id = %self.context_id,
            mint = %mint,
            error = %error,
            latency_ms = latency_ms,
            "Token transfer failed"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            message = %message,
            "Warning"
        );
    }
}

/// Correlation context for one user-initiated operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub request_id: String,
    pub operation: String,
    pub network: Network,
    pub started_at: DateTime<Utc>,
    pub logger: StructuredLogger,
}

impl OperationContext {
    pub fn new(operation: &str, network: Network) -> Self {
        let request_id = Uuid::new_v4().to_string();
        Self {
            logger: StructuredLogger::new(request_id.clone()),
            request_id,
            operation: operation.to_string(),
            network,
            started_at: Utc::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }
}
