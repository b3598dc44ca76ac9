//! Credential check

use clap::Args;
use serde_json::json;
use tracing::info;

use super::{print_output, Cli, CliError};
use crate::shutdown::SharedShutdown;
use crate::transport::CredentialStatus;

/// Verify command arguments
#[derive(Debug, Args)]
pub struct VerifyArgs {}

impl VerifyArgs {
    /// Execute the credential check
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = cli.sync_config()?;
        let client = cli.connect(&config, shutdown)?;

        match client.verify_credentials().await {
            CredentialStatus::Valid => {
                info!(seller_id = %client.seller_id(), "Credentials accepted");
                print_output(
                    cli.output_format,
                    &json!({ "seller_id": client.seller_id(), "valid": true }),
                    |_| format!("Credentials for seller {} are valid", client.seller_id()),
                )
            }
            CredentialStatus::Rejected(status) => Err(CliError::CredentialsRejected(status)),
            CredentialStatus::Unreachable(kind) => Err(CliError::Unreachable(format!(
                "{} ({})",
                kind.description(),
                kind.suggestion()
            ))),
            CredentialStatus::Interrupted => Err(CliError::Interrupted),
        }
    }
}
