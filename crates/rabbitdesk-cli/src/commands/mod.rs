pub mod auth;
pub mod resources;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rabbitdesk_client::{
    ClientSession, CredentialStatus, CredentialStore, ExpiryNotice, FileCredentialStore,
};
use rabbitdesk_config::loader::DEFAULT_CONFIG_FILE;

use crate::cli::{Cli, OutputFormat};
use crate::config;
use crate::observability::apply_logging_level;
use crate::output::print_warning;

/// What every networked command runs against: one client session bound to
/// the profile's credential file.
pub struct CommandContext {
    pub profile: String,
    pub format: OutputFormat,
    pub session: ClientSession,
    pub store: Arc<FileCredentialStore>,
}

impl CommandContext {
    pub fn open(cli: &Cli) -> Result<Self> {
        let profile_cfg = config::load_profile(&cli.profile)?;
        let format = cli
            .format
            .or_else(|| profile_cfg.output_format())
            .unwrap_or_default();

        let mut client_config = rabbitdesk_config::load_config(cli.config.as_deref())
            .context("Failed to load client configuration")?;
        if let Some(server) = config::resolve_server(&cli.server, &cli.profile)? {
            client_config.api.base_url = server;
            client_config
                .validate()
                .context("Invalid server URL")?;
        }
        if cli.log_level.is_none()
            && (cli.config.is_some() || Path::new(DEFAULT_CONFIG_FILE).exists())
        {
            apply_logging_level(&client_config.logging.level);
        }

        let store = Arc::new(FileCredentialStore::for_profile(&cli.profile)?);
        let profile = cli.profile.clone();
        let relogin = profile.clone();
        let session = ClientSession::builder(client_config)
            .store(store.clone())
            .expiry_handler(Arc::new(move |notice: &ExpiryNotice| {
                print_warning(&format!(
                    "Session ended ({}). Run: rabbitdesk --profile {relogin} login",
                    notice.reason
                ));
            }))
            .build();

        Ok(Self {
            profile,
            format,
            session,
            store,
        })
    }

    pub fn server(&self) -> &str {
        &self.session.config().api.base_url
    }

    /// Brings the stored credential up to date before a command talks to
    /// the server: refreshes it if it is about to lapse and waits for the
    /// refresh, so a rotated refresh token is persisted before exit.
    pub async fn ensure_logged_in(&self) -> Result<CredentialStatus> {
        if self.store.load()?.is_none() {
            anyhow::bail!(
                "Not logged in (profile: \"{}\"). Run: rabbitdesk login",
                self.profile
            );
        }
        let monitor = self.session.monitor();
        let status = monitor.tick();
        if !status.is_valid {
            anyhow::bail!("Stored credential has expired");
        }
        if monitor.is_refreshing() {
            monitor
                .force_refresh()
                .await
                .context("Could not refresh the credential")?;
            return Ok(monitor.status());
        }
        Ok(status)
    }
}
