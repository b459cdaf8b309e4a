// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::ffi::OsString;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use reqwest::Url;

use symctl::error::format_error;
use symctl::{
    install_dir, list_plugins, logging, Config, Executor, GithubReleaseHost, Installer,
    SymctlError, UpgradeOutcome, Upgrader,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes. Plugin failures pass the plugin's own code through instead.
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - any failed top-level operation
    pub const ERROR: i32 = 1;
}

use exit_codes::*;

/// symctl - install, upgrade and run symctl plugins.
#[derive(Parser)]
#[command(name = "symctl")]
#[command(version = VERSION)]
#[command(about = "Install, upgrade and run symctl plugins.")]
#[command(long_about = "symctl - plugin dispatcher\n\n\
    Install plugins:     symctl install https://example.com/catalog.json\n\
    Run a plugin:        symctl <plugin> [args...]\n\
    List plugins:        symctl plugins\n\
    Upgrade symctl:      symctl upgrade (or: symctl upgrade --dry-run)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Talkative mode: detailed diagnostics on stderr
    #[arg(short = 't', long, global = true)]
    talkative: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the newest release listed in a plugin catalog
    Install {
        /// Catalog URL (JSON list of releases)
        #[arg(value_parser = parse_url)]
        url: Url,
    },

    /// Upgrade symctl itself to the latest release
    Upgrade {
        /// Only check what would be installed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// List installed plugins
    Plugins,

    #[command(external_subcommand)]
    Plugin(Vec<OsString>),
}

fn parse_url(value: &str) -> std::result::Result<Url, String> {
    Url::parse(value).map_err(|_| format!("invalid URL: {}", value))
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            match err.downcast_ref::<SymctlError>() {
                Some(e) => e.exit_code(),
                None => ERROR,
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    // Help and version must work even with a broken config file, so errors
    // from loading and discovery are only reported after parsing.
    let loaded = Config::load();
    let discovered = install_dir().and_then(|dir| list_plugins(&dir));
    let plugins = discovered.as_ref().cloned().unwrap_or_default();

    let command = Cli::command().after_help(plugins_help(&plugins));
    let cli = Cli::from_arg_matches(&command.get_matches()).unwrap_or_else(|e| e.exit());

    let config = effective_config(loaded, cli.talkative)?;
    logging::init(&config);
    tracing::debug!("Whole command-line: {:?}", std::env::args_os().collect::<Vec<_>>());
    if let Err(e) = &discovered {
        // a fresh install has no bin directory yet
        tracing::debug!("No plugins discovered: {}", e);
    }

    match cli.command {
        Commands::Install { url } => handle_install(&config, url.as_str())?,
        Commands::Upgrade { dry_run } => handle_upgrade(&config, dry_run)?,
        Commands::Plugins => handle_plugins(&plugins),
        Commands::Plugin(args) => handle_plugin(&plugins, args)?,
    }

    Ok(SUCCESS)
}

/// Apply command-line flags on top of the loaded settings.
fn effective_config(loaded: Result<Config>, talkative: bool) -> Result<Config> {
    let mut config = loaded?;
    if talkative {
        config.verbose = true;
    }
    Ok(config)
}

fn plugins_help(plugins: &[String]) -> String {
    if plugins.is_empty() {
        return "No plugins installed. Use `symctl install <url>` to add some.".to_string();
    }
    let mut help = String::from("Plugins:\n");
    for plugin in plugins {
        help.push_str(&format!("  {:<18}{} plugin subcommands\n", plugin, plugin));
    }
    help
}

fn handle_install(config: &Config, url: &str) -> Result<()> {
    println!("{} Installing from {}", "[↻]".cyan(), url);

    let installer = Installer::new(config)?;
    let report = installer.install(url)?;

    println!(
        "{} Installed {} ({} file(s)) into {}",
        "[✓]".green(),
        report.url,
        report.files,
        report.install_dir.display()
    );
    if !report.plugins.is_empty() {
        println!("    Plugins: {}", report.plugins.join(", ").bold());
    }
    Ok(())
}

fn handle_upgrade(config: &Config, dry_run: bool) -> Result<()> {
    let host = GithubReleaseHost::new(config)?;
    let outcome = Upgrader::new(host).upgrade(VERSION, dry_run)?;

    match outcome {
        UpgradeOutcome::UpToDate { .. } => {
            println!("{} symctl is already up to date", "[✓]".green());
        }
        UpgradeOutcome::NoAsset { current, latest, expected } => {
            println!("symctl {} -> {}", current, latest);
            println!("{} No asset found for {}", "[!]".yellow(), expected);
        }
        UpgradeOutcome::DryRun { current, latest, asset } => {
            println!("symctl {} -> {}", current, latest);
            println!("{} Dry run: would install {}", "[i]".cyan(), asset);
        }
        UpgradeOutcome::Upgraded { current, latest, path } => {
            println!("symctl {} -> {}", current, latest);
            println!("{} Upgraded {}", "[✓]".green(), path.display());
        }
    }
    Ok(())
}

fn handle_plugins(plugins: &[String]) {
    if plugins.is_empty() {
        println!("{} No plugins installed", "[!]".yellow());
        return;
    }
    for plugin in plugins {
        println!("{}", plugin);
    }
}

fn handle_plugin(plugins: &[String], mut args: Vec<OsString>) -> Result<()> {
    if args.is_empty() {
        bail!("no plugin given");
    }
    let name = args.remove(0);
    let name = name
        .into_string()
        .map_err(|raw| anyhow::anyhow!("invalid plugin name: {:?}", raw))?;

    if !plugins.iter().any(|p| *p == name) {
        bail!(
            "unknown command '{}'. Installed plugins: {}",
            name,
            if plugins.is_empty() { "none".to_string() } else { plugins.join(", ") }
        );
    }

    tracing::debug!("plugin Run called for {}", name);
    Executor::new()
        .execute(&name, &args)
        .with_context(|| format!("running plugin {}", name))
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<SymctlError>() {
        // the plugin already spoke for itself
        Some(e @ SymctlError::Process { code: Some(_), .. }) => {
            eprintln!("{} {}", "[✗]".red(), e);
        }
        Some(e) => eprintln!("{}", e.diagnostic()),
        None => eprintln!("{}", format_error(&format!("{:#}", err), &[], &[])),
    }
}
