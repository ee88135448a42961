mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands, ConfigCommands, OutputFormat};
use commands::CommandContext;
use output::{print_error, print_json, print_success};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    observability::init_tracing_with_level(cli.log_level.as_deref().unwrap_or("warn"));

    if let Err(e) = run(&cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Config(args) => config_command(cli, &args.command),
        Commands::Login(args) => commands::auth::login(&CommandContext::open(cli)?, args).await,
        Commands::Logout => commands::auth::logout(&CommandContext::open(cli)?),
        Commands::Whoami => commands::auth::whoami(&CommandContext::open(cli)?),
        Commands::Status(args) => {
            commands::status::status(&CommandContext::open(cli)?, args).await
        }
        Commands::List(args) => commands::resources::list(&CommandContext::open(cli)?, args).await,
        Commands::Create(args) => {
            commands::resources::create(&CommandContext::open(cli)?, args).await
        }
        Commands::Delete(args) => {
            commands::resources::delete(&CommandContext::open(cli)?, args).await
        }
    }
}

fn config_command(cli: &Cli, command: &ConfigCommands) -> Result<()> {
    let profile = &cli.profile;
    match command {
        ConfigCommands::Show => {
            let cfg = config::load_profile(profile)?;
            let format = cli.format.or_else(|| cfg.output_format()).unwrap_or_default();
            if matches!(format, OutputFormat::Json) {
                print_json(&cfg);
            } else {
                println!("{}: {}", "Profile".cyan(), profile);
                println!(
                    "{}: {}",
                    "Server".cyan(),
                    cfg.server.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "{}: {}",
                    "Format".cyan(),
                    cfg.format.as_deref().unwrap_or("json")
                );
            }
        }
        ConfigCommands::Set(set_args) => {
            let mut cfg = config::load_profile(profile)?;
            cfg.set(&set_args.key, &set_args.value)?;
            config::save_profile(profile, &cfg)?;
            print_success(&format!("Set {} = {}", set_args.key, set_args.value));
        }
    }
    Ok(())
}
