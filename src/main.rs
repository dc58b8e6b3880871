use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use prefab::collector::TeeSink;
use prefab::config::Config;
use prefab::engines::Engines;
use prefab::install::{
    ArtifactSource, CacheStatus, CommandLogger, InstallOptions, Installer, Prefix, manifest,
    verify,
};
use prefab::platform::Platform;

/// Prefab main parser
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mirror subprocess output and record command logs
    #[arg(short, long, global = true)]
    debug: bool,

    /// Installation prefix (defaults to the configured prefix)
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download, verify and unpack an artifact into the prefix
    Install {
        /// Artifact URL or local path
        source: String,
        /// Expected SHA-256 digest of the artifact
        #[arg(long)]
        sha256: String,
        /// Replace conflicting files and reinstall over a previous install
        #[arg(short, long)]
        force: bool,
        /// Skip the platform compatibility check
        #[arg(long)]
        ignore_platform: bool,
    },

    /// Remove an installed artifact and its manifest
    Uninstall {
        /// Artifact filename or manifest path
        artifact: String,
    },

    /// Verify a local file against an expected SHA-256 digest
    Verify {
        path: PathBuf,
        #[arg(long)]
        sha256: String,
    },

    /// List the member files of an artifact archive without extracting
    List { archive: PathBuf },

    /// Check whether an artifact is fully installed
    Status {
        source: String,
        #[arg(long)]
        sha256: String,
    },

    /// Print the host triplet, or parse the given triplets
    Platform { triplets: Vec<String> },

    /// Show recorded external command logs
    Logs {
        /// Show at most this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("{} {error:#}", "Error:".red());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let debug = cli.debug || config.verbose;
    let prefix_root = cli
        .prefix
        .clone()
        .unwrap_or_else(|| config.prefix_root());

    match cli.command {
        Commands::Install {
            source,
            sha256,
            force,
            ignore_platform,
        } => {
            let prefix = open_prefix(&prefix_root)?;
            let installer = build_installer(&config, &prefix, debug)?;
            let source = ArtifactSource::parse(&source);
            let options = InstallOptions {
                force,
                ignore_platform,
            };
            installer.install(&source, &sha256, &prefix, &options)?;
            println!("Installed {source} into {}", prefix.root().display());
        }
        Commands::Uninstall { artifact } => {
            let prefix = open_prefix(&prefix_root)?;
            let installer = build_installer(&config, &prefix, debug)?;
            let manifest_path = resolve_manifest(&artifact, &prefix);
            installer.uninstall(&manifest_path, &prefix)?;
            println!("Uninstalled {artifact}");
        }
        Commands::Verify { path, sha256 } => {
            let status = verify(&path, &sha256)?;
            let label = match status {
                CacheStatus::Missing => "verified (cache written)",
                CacheStatus::Consistent => "verified (cache hit)",
                CacheStatus::FileModified => "verified (file had changed, rehashed)",
                CacheStatus::Mismatch => "verified (cache was stale, rehashed)",
            };
            println!("{}: {label}", path.display());
        }
        Commands::List { archive } => {
            let prefix = open_prefix(&prefix_root)?;
            let installer = build_installer(&config, &prefix, debug)?;
            for file in installer.list_archive(&archive)? {
                println!("{file}");
            }
        }
        Commands::Status { source, sha256 } => {
            let prefix = open_prefix(&prefix_root)?;
            let installer = build_installer(&config, &prefix, debug)?;
            let source = ArtifactSource::parse(&source);
            if installer.is_installed(&source, &sha256, &prefix) {
                println!("{} {source} is installed", "ok:".green());
            } else {
                println!("{} {source} is not installed", "missing:".yellow());
                std::process::exit(1);
            }
        }
        Commands::Platform { triplets } => {
            if triplets.is_empty() {
                println!("{}", Platform::current().triplet());
            } else {
                print_triplets(&triplets);
            }
        }
        Commands::Logs { limit } => {
            let prefix = open_prefix(&prefix_root)?;
            print_logs(&prefix, limit)?;
        }
    }
    Ok(())
}

fn open_prefix(root: &std::path::Path) -> Result<Prefix> {
    Prefix::create(root)
        .with_context(|| format!("preparing prefix at {}", root.display()))
}

fn build_installer(config: &Config, prefix: &Prefix, debug: bool) -> Result<Installer> {
    let engines = Engines::detect(
        config.download_engine.as_deref(),
        config.unpack_engine.as_deref(),
    )?;
    let mut installer = Installer::new(engines)
        .with_logger(CommandLogger::new(prefix, debug))
        .with_copy_symlinks(config.copy_symlinks);
    if debug {
        let sink: TeeSink = Arc::new(Mutex::new(io::stderr()));
        installer = installer.with_tee(sink, true);
    }
    Ok(installer)
}

/// Accept either a manifest path or an artifact filename.
fn resolve_manifest(artifact: &str, prefix: &Prefix) -> PathBuf {
    let as_path = PathBuf::from(artifact);
    if artifact.ends_with(".list") && as_path.exists() {
        return as_path;
    }
    manifest::manifest_path(prefix, artifact)
}

fn print_triplets(triplets: &[String]) {
    let host = Platform::current();
    for triplet in triplets {
        let platform = Platform::parse(triplet);
        if platform == Platform::Unknown {
            println!("{triplet}: {}", "unrecognized".red());
        } else if platform.matches(&host) {
            println!("{triplet}: {}", "compatible".green());
        } else {
            println!("{triplet}: {}", "incompatible with host".yellow());
        }
    }
}

fn print_logs(prefix: &Prefix, limit: Option<usize>) -> Result<()> {
    let logger = CommandLogger::new(prefix, true);
    let entries = logger.entries().context("reading command logs")?;
    let limit = limit.unwrap_or(10);
    let skip = entries.len().saturating_sub(limit);
    if entries.is_empty() {
        println!("No command logs recorded.");
        return Ok(());
    }
    for entry in entries.iter().skip(skip) {
        let marker = if entry.success {
            "ok".green()
        } else {
            "failed".red()
        };
        println!(
            "[{}] {} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            marker,
            entry.command
        );
        if !entry.success && !entry.output_tail.trim().is_empty() {
            for line in entry.output_tail.lines() {
                println!("    {line}");
            }
        }
    }
    Ok(())
}
