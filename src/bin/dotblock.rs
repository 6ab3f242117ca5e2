// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotblock::{
    block::{
        backup::{list_backups, BackupKind},
        ensure_managed_block, replace_section, Action,
    },
    install::Homebrew,
    path::{default_manifest_path, home_dir},
    setup::Setup,
    Markers,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use inquire::Confirm;
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotblock [options] <dotblock-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Apply(opts) => run_apply(opts),
            Command::Merge(opts) => run_merge(opts),
            Command::Section(opts) => run_section(opts),
            Command::Status(opts) => run_status(opts),
            Command::Backups(opts) => run_backups(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install packages and merge every managed block of a setup manifest.
    #[command(override_usage = "dotblock apply [options]")]
    Apply(ApplyOptions),

    /// Merge source-of-truth file into managed block of target file.
    #[command(override_usage = "dotblock merge [options] <target> <source>")]
    Merge(MergeOptions),

    /// Replace section at end of a shell profile.
    #[command(override_usage = "dotblock section [options] <body>")]
    Section(SectionOptions),

    /// Show detected managed block format of each manifest target.
    #[command(override_usage = "dotblock status [options]")]
    Status(StatusOptions),

    /// List backups of a target file, oldest first.
    #[command(override_usage = "dotblock backups [options] <target>")]
    Backups(BackupsOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ApplyOptions {
    /// Path to setup manifest.
    #[arg(short, long, value_name = "path")]
    pub manifest: Option<PathBuf>,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Skip package installation.
    #[arg(long)]
    pub no_install: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MergeOptions {
    /// Configuration file receiving the managed block.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,

    /// Source-of-truth file holding block content.
    #[arg(required = true, value_name = "source")]
    pub source: PathBuf,

    /// Tool name written into markers.
    #[arg(short, long, value_name = "tool", default_value = "dotblock")]
    pub tool: String,

    /// Subsection label written into markers.
    #[arg(short, long, value_name = "subsection")]
    pub subsection: Option<String>,

    /// Leave legacy "# MANAGED BY <tool>" marker alone instead of migrating it.
    #[arg(long)]
    pub no_legacy: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SectionOptions {
    /// Body placed between markers.
    #[arg(required = true, value_name = "body")]
    pub body: String,

    /// File holding the section, defaults to ~/.zprofile.
    #[arg(short, long, value_name = "path")]
    pub file: Option<PathBuf>,

    /// Tool name written into markers.
    #[arg(short, long, value_name = "tool", default_value = "dotblock")]
    pub tool: String,

    /// Subsection label written into markers.
    #[arg(short, long, value_name = "subsection")]
    pub subsection: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StatusOptions {
    /// Path to setup manifest.
    #[arg(short, long, value_name = "path")]
    pub manifest: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BackupsOptions {
    /// Target file whose backups to list.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,

    /// List section replacement backups instead of managed block backups.
    #[arg(long)]
    pub section: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn manifest_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Ok(default_manifest_path()?),
    }
}

fn run_apply(opts: ApplyOptions) -> Result<()> {
    let path = manifest_path(opts.manifest)?;
    let setup = Setup::load(&path)?;
    let manifest = setup.manifest();

    if !opts.yes {
        let proceed = Confirm::new(
            format!(
                "apply {} package(s), {} block(s), {} section(s) from {}?",
                if opts.no_install { 0 } else { manifest.packages.len() },
                manifest.blocks.len(),
                manifest.sections.len(),
                path.display()
            )
            .as_str(),
        )
        .with_default(true)
        .prompt()?;

        if !proceed {
            warn!("aborted by user");
            return Ok(());
        }
    }

    let report = setup.run(&Homebrew::new(), !opts.no_install);
    info!(
        "{} created, {} updated, {} migrated, {} unchanged, {} skipped",
        report.count(Action::Created),
        report.count(Action::Updated),
        report.count(Action::Migrated),
        report.count(Action::Unchanged),
        report.count(Action::Skipped),
    );

    if report.has_failures() {
        bail!("setup finished with failures");
    }

    Ok(())
}

fn run_merge(opts: MergeOptions) -> Result<()> {
    let mut markers = Markers::new(&opts.tool, opts.subsection.as_deref())?;
    if opts.no_legacy {
        markers = markers.without_legacy();
    }

    let action = ensure_managed_block(&opts.target, &opts.source, &markers)?;
    println!("{action}");

    Ok(())
}

fn run_section(opts: SectionOptions) -> Result<()> {
    let file = match opts.file {
        Some(file) => file,
        None => home_dir()?.join(".zprofile"),
    };
    let markers = Markers::new(&opts.tool, opts.subsection.as_deref())?;

    let action = replace_section(&file, &markers, &opts.body)?;
    println!("{action}");

    Ok(())
}

fn run_status(opts: StatusOptions) -> Result<()> {
    let setup = Setup::load(manifest_path(opts.manifest)?)?;
    for (path, tag) in setup.status()? {
        match tag {
            Some(tag) => println!("{tag:<22} {}", path.display()),
            None => println!("{:<22} {}", "missing", path.display()),
        }
    }

    Ok(())
}

fn run_backups(opts: BackupsOptions) -> Result<()> {
    let kind = if opts.section {
        BackupKind::Backup
    } else {
        BackupKind::Bak
    };

    for backup in list_backups(&opts.target, kind)? {
        println!("{}", backup.display());
    }

    Ok(())
}
