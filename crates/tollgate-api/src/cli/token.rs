//! `tollgate issue-token`: sign an access token for a user.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;

use tollgate_infra::config::{load_gateway_config, signing_secret_from_env};
use tollgate_infra::token::issue_token_at;
use tollgate_types::config::GatewayConfig;
use tollgate_types::token::TokenIdentity;

#[derive(Debug, Args)]
pub struct IssueTokenArgs {
    /// Numeric user id.
    #[arg(long)]
    pub user_id: u64,

    /// GitHub login of the user.
    #[arg(long)]
    pub login: String,

    /// Analytics id. A random one is generated when omitted.
    #[arg(long)]
    pub metrics_id: Option<String>,

    /// Grant staff privileges.
    #[arg(long)]
    pub staff: bool,

    /// Mark the user as having an LLM subscription.
    #[arg(long)]
    pub subscribed: bool,

    /// Monthly spend ceiling above the allowance, in cents. Defaults to the
    /// config's `default_max_monthly_spend_cents`.
    #[arg(long)]
    pub max_monthly_spend_cents: Option<u32>,

    /// Per-user override of the free monthly allowance, in cents.
    #[arg(long)]
    pub custom_allowance_cents: Option<u32>,

    /// Account creation time (RFC 3339). Defaults to now.
    #[arg(long)]
    pub account_created_at: Option<DateTime<Utc>>,

    /// Path to the gateway config file.
    #[arg(long, env = "TOLLGATE_CONFIG", default_value = "tollgate.toml")]
    pub config: PathBuf,
}

impl IssueTokenArgs {
    fn identity(&self, config: &GatewayConfig, now: DateTime<Utc>) -> TokenIdentity {
        TokenIdentity {
            user_id: self.user_id,
            github_user_login: self.login.clone(),
            metrics_id: self
                .metrics_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            account_created_at: self.account_created_at.unwrap_or(now),
            is_staff: self.staff,
            has_llm_subscription: self.subscribed,
            max_monthly_spend_in_cents: self
                .max_monthly_spend_cents
                .unwrap_or(config.default_max_monthly_spend_cents),
            custom_llm_monthly_allowance_in_cents: self.custom_allowance_cents,
        }
    }
}

pub async fn issue_token(args: IssueTokenArgs) -> anyhow::Result<()> {
    let config = load_gateway_config(&args.config).await?;
    let secret = signing_secret_from_env()?;
    let now = Utc::now();

    let identity = args.identity(&config, now);
    let token = issue_token_at(&identity, &secret, now, config.token_lifetime())?;
    tracing::info!(user_id = identity.user_id, is_staff = identity.is_staff, "issued access token");

    println!("{token}");
    Ok(())
}
