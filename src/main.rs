//! # repofetch
//!
//! **repofetch** clones Git repositories and reports on the result.
//!
//! - `repofetch clone <URL> [DEST]` clones one repository with a progress bar
//! - `repofetch clone-all <URL>...` clones several in parallel into `./<name>`
//! - `repofetch is-bare <PATH>` inspects an existing repository
//! - `repofetch log <PATH>` lists its branches and commits reachable from HEAD
//! - `repofetch name <URL>` prints the default destination for a URL
//!
//! Defaults come from `$(repofetch config-home)/config.toml`.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use repofetch::{
    CloneFlags, cmd_clone, cmd_clone_all, cmd_is_bare, cmd_log, cmd_name, config_home,
};
use std::path::PathBuf;

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "repofetch",
    version,
    about = "repofetch - clone git repositories without leaving partial copies behind",
    arg_required_else_help = true
)]
struct Cli {
    /// Increase log verbosity (-v, -vv, ...)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Debug)]
struct CloneArgs {
    /// Clone without a working tree
    #[arg(long)]
    bare: bool,
    /// Branch, tag or commit to check out instead of the remote HEAD
    #[arg(long)]
    rev: Option<String>,
    /// Abort the transfer after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Username for HTTP(S) or ssh
    #[arg(long)]
    username: Option<String>,
    /// Password for HTTP(S) basic auth
    #[arg(long)]
    password: Option<String>,
    /// Authenticate ssh remotes with keys from the ssh-agent
    #[arg(long)]
    ssh_agent: bool,
}

impl From<CloneArgs> for CloneFlags {
    fn from(a: CloneArgs) -> Self {
        CloneFlags {
            bare: a.bare,
            rev: a.rev,
            timeout_secs: a.timeout,
            username: a.username,
            password: a.password,
            ssh_agent: a.ssh_agent,
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// Clone a repository into DEST, or ./<name> when omitted
    Clone {
        url: String,
        dest: Option<PathBuf>,
        #[command(flatten)]
        opts: CloneArgs,
    },
    /// Clone several repositories in parallel into ./<name> each
    CloneAll {
        #[arg(required = true)]
        urls: Vec<String>,
        #[command(flatten)]
        opts: CloneArgs,
    },
    /// Report whether the repository at PATH is bare
    IsBare { path: PathBuf },
    /// List the branches and history of the repository at PATH
    Log {
        path: PathBuf,
        /// Show at most this many commits
        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },
    /// Print the default destination for URL
    Name { url: String },
    /// Print the directory config.toml is read from
    ConfigHome,
}

/// CLI entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    stderrlog::new()
        .module("repofetch")
        .verbosity(cli.verbose as usize + 1)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    match cli.cmd {
        Cmd::Clone { url, dest, opts } => cmd_clone(&url, dest.as_deref(), &opts.into()),
        Cmd::CloneAll { urls, opts } => cmd_clone_all(&urls, &opts.into()),
        Cmd::IsBare { path } => cmd_is_bare(&path),
        Cmd::Log { path, max_count } => cmd_log(&path, max_count),
        Cmd::Name { url } => cmd_name(&url).map(|_| ()),
        Cmd::ConfigHome => {
            println!("{}", config_home().display());
            Ok(())
        }
    }
}
