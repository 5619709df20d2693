use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::time::Duration;

use crate::app::{default_config_path, save_config, AppContext, GatewayConfig};
use crate::server::serve;

use super::{Cli, Commands};

/// Run the selected subcommand
pub async fn handle_command(cli: &Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    match cli.command.clone().unwrap_or_default() {
        Commands::Init { force } => init_config(&config_path, force),
        Commands::Serve { listen } => {
            let context = load_context(&config_path)?;
            serve(&context, &listen)
                .await
                .with_context(|| format!("server on {} stopped with an error", listen))
        }
        Commands::Warm { used_within } => {
            let context = load_context(&config_path)?;
            let report = context
                .gateway
                .warm(Duration::from_secs(used_within))
                .await
                .context("cache warming failed")?;
            println!(
                "Warmed {} of {} reports ({} failed, {} expired entries swept)",
                report.refreshed.to_string().green(),
                report.attempted,
                if report.failed > 0 {
                    report.failed.to_string().red()
                } else {
                    report.failed.to_string().normal()
                },
                report.swept
            );
            Ok(())
        }
        Commands::Sweep => {
            let context = load_context(&config_path)?;
            let removed = context.gateway.sweep().context("cache sweep failed")?;
            println!("Removed {} expired cache entries", removed.to_string().green());
            Ok(())
        }
    }
}

fn load_context(config_path: &Path) -> Result<AppContext> {
    AppContext::initialize(config_path)
        .with_context(|| format!("could not start with {}", config_path.display()))
}

/// Write the template config, leaving an existing file alone unless forced
fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            "[WARNING]".yellow(),
            config_path.display()
        );
        return Ok(());
    }

    save_config(&GatewayConfig::template(), config_path)?;
    println!(
        "{} Configuration template written to {}",
        "[OK]".green(),
        config_path.display()
    );
    println!("   Fill in master_password, cognos_url and [cognos_users] before serving.");
    Ok(())
}
