//! Connection flags shared by every command that talks to ERPNext.

use anyhow::Context;
use clap::Args;
use erpnext_client::ErpClient;
use fieldmark_core::auth::{AuthProvider, Credentials, StaticAuth};
use fieldmark_core::config::Config;
use std::path::Path;

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// ERPNext site URL (overrides the config file)
    #[arg(long, global = true, env = "FIELDMARK_BASE_URL")]
    pub base_url: Option<String>,

    /// API key for token authentication
    #[arg(long, global = true, env = "FIELDMARK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API secret for token authentication
    #[arg(long, global = true, env = "FIELDMARK_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Login name for password authentication
    #[arg(long, global = true, env = "FIELDMARK_USER")]
    pub user: Option<String>,

    /// Password for password authentication
    #[arg(long, global = true, env = "FIELDMARK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl ConnectArgs {
    fn credentials(&self) -> anyhow::Result<Credentials> {
        match (&self.api_key, &self.api_secret, &self.user, &self.password) {
            (Some(key), Some(secret), _, _) => Ok(Credentials::token(key, secret)),
            (Some(_), None, _, _) | (None, Some(_), _, _) => {
                anyhow::bail!("--api-key and --api-secret must be given together")
            }
            (None, None, Some(_), Some(_)) => Ok(Credentials::Session),
            _ => anyhow::bail!(
                "no credentials: set FIELDMARK_API_KEY and FIELDMARK_API_SECRET, \
                 or FIELDMARK_USER and FIELDMARK_PASSWORD"
            ),
        }
    }
}

/// Load config, apply overrides, and return an authenticated client.
pub async fn connect(root: &Path, args: &ConnectArgs) -> anyhow::Result<(Config, ErpClient)> {
    let mut config = Config::load(root).context("failed to load config")?;
    if let Some(url) = &args.base_url {
        config.erp.base_url = url.clone();
    }

    let auth = StaticAuth::new(args.user.clone(), args.credentials()?);
    let client = ErpClient::from_auth(&config.erp, &auth)
        .with_context(|| format!("cannot use ERPNext at '{}'", config.erp.base_url))?;

    if auth.credentials() == Credentials::Session {
        if let (Some(user), Some(password)) = (&args.user, &args.password) {
            client.login(user, password).await.context("login failed")?;
            tracing::debug!(user = %user, "signed in with password");
        }
    }
    Ok((config, client))
}

/// Login name of whoever the server sees behind the client's credentials.
pub async fn signed_in_user(client: &ErpClient) -> anyhow::Result<String> {
    client
        .identify()
        .await
        .context("cannot identify user")?
        .current_user()
        .context("server did not report a signed-in user")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_pair_wins_over_password() {
        let args = ConnectArgs {
            api_key: Some("k".into()),
            api_secret: Some("s".into()),
            user: Some("u".into()),
            password: Some("p".into()),
            ..Default::default()
        };
        assert_eq!(args.credentials().unwrap(), Credentials::token("k", "s"));
    }

    #[test]
    fn half_a_token_pair_is_rejected() {
        let args = ConnectArgs {
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(args.credentials().is_err());
    }

    #[test]
    fn password_pair_means_session() {
        let args = ConnectArgs {
            user: Some("u".into()),
            password: Some("p".into()),
            ..Default::default()
        };
        assert_eq!(args.credentials().unwrap(), Credentials::Session);
    }

    #[test]
    fn nothing_is_an_error() {
        assert!(ConnectArgs::default().credentials().is_err());
    }
}
