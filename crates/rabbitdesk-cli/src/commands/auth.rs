use anyhow::{Context, Result};
use colored::Colorize;
use rabbitdesk_client::credential::{TokenClaims, decode_expiry};
use rabbitdesk_client::{CredentialStatus, CredentialStore, OAuthTokenRefresher, StoredCredentials};
use serde_json::json;
use time::format_description::well_known::Rfc3339;

use super::CommandContext;
use crate::cli::{LoginArgs, OutputFormat};
use crate::output::{print_error, print_json, print_success};

pub async fn login(ctx: &CommandContext, args: &LoginArgs) -> Result<()> {
    let server = ctx.server().to_string();

    let credentials = match &args.token {
        Some(token) => {
            if decode_expiry(token).is_none() {
                anyhow::bail!("--token must be a JWT carrying an exp claim");
            }
            let mut credentials = StoredCredentials::new(&server, token);
            credentials.refresh_token = args.refresh_token.clone();
            credentials
        }
        None => {
            let username = args
                .username
                .as_deref()
                .context("--username is required (or pass --token)")?;
            let password = args
                .password
                .as_deref()
                .context("--password is required")?;

            let mut refresher = OAuthTokenRefresher::from_config(&ctx.session.config().api);
            if let Some(client_id) = &args.client_id {
                refresher = refresher.with_client_id(client_id);
            }
            println!("Logging in as {username}...");
            let token = refresher
                .password_grant(username, password)
                .await
                .context("Login failed")?;

            let mut credentials = StoredCredentials::new(&server, token.access_token);
            credentials.refresh_token = token.refresh_token;
            credentials
        }
    };

    ctx.session.login(&credentials)?;
    ctx.session.monitor().stop_monitoring();

    let user = TokenClaims::decode(&credentials.access_token)
        .and_then(|claims| claims.display_name().map(str::to_string))
        .unwrap_or_else(|| "unknown user".to_string());
    print_success(&format!("Logged in to {} as {}", server.cyan(), user.cyan()));
    if credentials.refresh_token.is_none() {
        println!("  No refresh token issued; you will need to log in again when it expires.");
    }
    Ok(())
}

pub fn logout(ctx: &CommandContext) -> Result<()> {
    if ctx.session.logout()? {
        print_success("Logged out (credentials removed)");
    } else {
        println!("No credentials found for profile \"{}\"", ctx.profile);
    }
    Ok(())
}

pub fn whoami(ctx: &CommandContext) -> Result<()> {
    let Some(credentials) = ctx.store.load()? else {
        print_error(&format!("Not logged in (profile: \"{}\")", ctx.profile));
        return Ok(());
    };
    let claims = TokenClaims::decode(&credentials.access_token).unwrap_or_default();
    let status = ctx.session.monitor().status();

    match ctx.format {
        OutputFormat::Json => print_json(&json!({
            "profile": ctx.profile,
            "server": credentials.server,
            "user": claims.display_name(),
            "refreshable": credentials.refresh_token.is_some(),
            "status": status,
        })),
        OutputFormat::Table => {
            println!("{}: {}", "Profile".cyan(), ctx.profile);
            println!("{}: {}", "Server".cyan(), credentials.server.cyan());
            println!("{}: {}", "User".cyan(), claims.display_name().unwrap_or("-"));
            println!("{}: {}", "Credential".cyan(), describe(&status));
            println!(
                "{}: {}",
                "Refreshable".cyan(),
                if credentials.refresh_token.is_some() { "yes" } else { "no" }
            );
        }
    }
    Ok(())
}

fn describe(status: &CredentialStatus) -> String {
    let expires = status
        .expires_at
        .and_then(|at| at.format(&Rfc3339).ok())
        .unwrap_or_else(|| "unknown".to_string());
    match status.remaining_minutes {
        _ if !status.is_valid => format!("{} (expired {expires})", "invalid".red()),
        Some(minutes) if status.needs_warning || status.needs_refresh => {
            format!("{} ({minutes} min left, expires {expires})", "expiring".yellow())
        }
        Some(minutes) => format!("{} ({minutes} min left, expires {expires})", "valid".green()),
        None => "valid".green().to_string(),
    }
}
