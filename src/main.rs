// src/main.rs

use anyhow::{Context as _, Result};
use archive_man::config::Config;
use archive_man::reconcile::{
    self, CheckOptions, DepCheckOptions, DiffMethod, DiffOptions, KeyMode, MergeOptions,
    MergePolicy,
};
use archive_man::repository::Location;
use archive_man::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use serde::Serialize;
use std::fmt::Display;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archive-man")]
#[command(author, version, about = "Metadata consistency tools for Debian-style archives", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/archive-man.toml, then /etc/archive-man.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at info instead of the configured level
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Source,
    Binary,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    First,
    Last,
    Version,
}

#[derive(Args)]
struct PoolArgs {
    /// Archive root (the directory holding dists/ and pool/)
    topdir: PathBuf,

    /// Also prune index records whose files are missing
    #[arg(short, long)]
    index: bool,

    /// Never remove or prune pool paths matching this regex
    #[arg(short, long)]
    exclude: Option<String>,

    /// Verify md5 sums of indexed files
    #[arg(long)]
    md5: bool,

    /// Verify sizes of indexed files
    #[arg(long)]
    size: bool,
}

impl PoolArgs {
    fn options(&self) -> Result<CheckOptions> {
        let exclude = match &self.exclude {
            Some(pattern) => Some(Regex::new(pattern).map_err(archive_man::Error::from)?),
            None => None,
        };
        Ok(CheckOptions {
            index: self.index,
            exclude,
            verify_md5: self.md5,
            verify_size: self.size,
            ..Default::default()
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the newest packages of two suites
    Diff {
        /// First suite (directory, Release file or URL)
        source1: String,
        /// Second suite
        source2: String,
        /// Compare source or binary packages
        #[arg(short = 't', long = "type", value_enum, default_value = "source")]
        method: MethodArg,
        /// Print pool paths instead of versions
        #[arg(short = 'f', long)]
        files: bool,
        /// Report every common package with <, = or >
        #[arg(short, long)]
        compare: bool,
    },
    /// Compare indexed md5 sums of pool files shared by two archives
    DiffMd5 {
        archive1: PathBuf,
        archive2: PathBuf,
    },
    /// Merge several suites into a new one
    Merge {
        /// Directory holding the suites (usually <archive>/dists)
        #[arg(short, long)]
        dists: PathBuf,
        /// Name of the suite to create
        #[arg(short, long)]
        target: String,
        /// Suites to merge, in priority order
        #[arg(required = true)]
        sources: Vec<String>,
        /// How to pick among suites
        #[arg(short, long, value_enum, default_value = "version")]
        policy: PolicyArg,
        /// Key packages by binary name and architecture instead of source
        #[arg(short, long)]
        binary: bool,
        /// Carry Contents files forward
        #[arg(short, long)]
        contents: bool,
        /// Overwrite an existing target suite
        #[arg(short, long)]
        force: bool,
    },
    /// Report pool files and index entries that disagree
    Check {
        #[command(flatten)]
        pool: PoolArgs,
    },
    /// Remove pool files no index references
    Strip {
        #[command(flatten)]
        pool: PoolArgs,
        /// Move removed files under this directory instead of deleting them
        #[arg(short, long)]
        backup: Option<PathBuf>,
        /// Report only
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Report dependency groups nothing satisfies
    Checkdep {
        /// Suite to check
        suite: String,
        /// Additional suites that may satisfy dependencies
        #[arg(short, long = "extra")]
        extra: Vec<String>,
        /// Skip groups none of whose packages exist anywhere
        #[arg(long)]
        ignore_noexist: bool,
        /// Only report groups containing a >= relation
        #[arg(long)]
        ge_only: bool,
    },
    /// Rewrite pool paths recorded in Packages indices
    Rename {
        /// Archive root
        topdir: PathBuf,
        /// Old pool path
        #[arg(required_unless_present = "list")]
        old: Option<String>,
        /// New pool path
        #[arg(required_unless_present = "list")]
        new: Option<String>,
        /// File of old,new lines
        #[arg(short, long, conflicts_with_all = ["old", "new"])]
        list: Option<PathBuf>,
        /// Also move the pool files
        #[arg(short = 'f', long = "move")]
        move_files: bool,
    },
    /// Rewrite a Packages or Sources file keeping one record per name
    Dedup {
        /// Packages or Sources file (optionally .gz)
        index: String,
    },
}

fn emit<T: Serialize + Display>(report: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_default()?,
    };
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let level = if cli.quiet { "info" } else { config.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let ctx = Context::new(config);

    match cli.command {
        Commands::Diff {
            source1,
            source2,
            method,
            files,
            compare,
        } => {
            let method = match method {
                MethodArg::Source => DiffMethod::Source,
                MethodArg::Binary => DiffMethod::Binary,
            };
            let options = DiffOptions {
                list_files: files,
                compare,
            };
            let report = reconcile::diff(
                &Location::parse(&source1),
                &Location::parse(&source2),
                method,
                options,
                &ctx,
            )?;
            emit(&report, cli.json)
        }
        Commands::DiffMd5 { archive1, archive2 } => {
            let report = reconcile::diff_md5(&archive1, &archive2, &ctx)?;
            emit(&report, cli.json)
        }
        Commands::Merge {
            dists,
            target,
            sources,
            policy,
            binary,
            contents,
            force,
        } => {
            let options = MergeOptions {
                policy: match policy {
                    PolicyArg::First => MergePolicy::First,
                    PolicyArg::Last => MergePolicy::Last,
                    PolicyArg::Version => MergePolicy::Version,
                },
                key_mode: if binary { KeyMode::Binary } else { KeyMode::Source },
                with_contents: contents,
                force,
            };
            info!("Merging {} into {}", sources.join(", "), target);
            let report = reconcile::merge(&dists, &sources, &target, &options, &ctx)?;
            emit(&report, cli.json)
        }
        Commands::Check { pool } => {
            let report = reconcile::check(&pool.topdir, &pool.options()?, &ctx)?;
            emit(&report, cli.json)
        }
        Commands::Strip {
            pool,
            backup,
            dry_run,
        } => {
            let options = CheckOptions {
                backup,
                dry_run,
                ..pool.options()?
            };
            let report = reconcile::strip(&pool.topdir, &options, &ctx)?;
            emit(&report, cli.json)?;
            if !report.failures.is_empty() {
                anyhow::bail!("{} files could not be removed", report.failures.len());
            }
            Ok(())
        }
        Commands::Checkdep {
            suite,
            extra,
            ignore_noexist,
            ge_only,
        } => {
            let extra: Vec<Location> = extra.iter().map(|s| Location::parse(s)).collect();
            let options = DepCheckOptions {
                ignore_noexist,
                ge_only,
            };
            let report = reconcile::checkdep(&Location::parse(&suite), &extra, options, &ctx)?;
            emit(&report, cli.json)
        }
        Commands::Rename {
            topdir,
            old,
            new,
            list,
            move_files,
        } => {
            let pairs = match (list, old, new) {
                (Some(list), _, _) => {
                    let text = fs::read_to_string(&list)
                        .with_context(|| format!("Failed to read {}", list.display()))?;
                    reconcile::parse_rename_list(&text)
                }
                (None, Some(old), Some(new)) => [(old, new)].into_iter().collect(),
                _ => anyhow::bail!("either OLD NEW or --list is required"),
            };
            let report = reconcile::rename(&topdir, &pairs, move_files, &ctx)?;
            emit(&report, cli.json)?;
            if !report.failures.is_empty() {
                anyhow::bail!("{} files could not be moved", report.failures.len());
            }
            Ok(())
        }
        Commands::Dedup { index } => {
            let report = reconcile::dedup(&Location::parse(&index), &ctx)?;
            emit(&report, cli.json)
        }
    }
}
