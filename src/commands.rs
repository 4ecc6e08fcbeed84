//! The `repofetch` subcommands, kept in the library so `main.rs` stays a
//! thin argument parser.

use anyhow::{Context, Result, anyhow, bail};
use indicatif::{HumanBytes, MultiProgress, ProgressBar};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::acquire::{CloneOptions, Credentials, RepositoryAcquirer, default_destination};
use crate::config::{Settings, load_settings};
use crate::handle::RepositoryHandle;
use crate::progress::{err_style, ok_style, spinner_style, transfer_style};

/// Flags shared by `clone` and `clone-all`. Unset flags fall back to
/// [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct CloneFlags {
    pub bare: bool,
    pub rev: Option<String>,
    pub timeout_secs: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_agent: bool,
}

/// Merge command-line flags over config-file settings.
///
/// # Errors
/// Returns an error if a password is given with no username from either source.
pub fn clone_options(flags: &CloneFlags, settings: &Settings) -> Result<CloneOptions> {
    let username = flags.username.clone().or_else(|| settings.username.clone());
    let credentials = match (&flags.password, flags.ssh_agent || settings.ssh_agent) {
        (Some(password), _) => {
            let username = username.ok_or_else(|| anyhow!("--password requires a username"))?;
            Some(Credentials::UserPassword {
                username,
                password: password.clone(),
            })
        }
        (None, true) => Some(Credentials::SshAgent { username }),
        (None, false) => None,
    };

    Ok(CloneOptions {
        bare: flags.bare || settings.bare,
        reference: flags.rev.clone(),
        credentials,
        timeout: flags
            .timeout_secs
            .map(Duration::from_secs)
            .or_else(|| settings.timeout()),
    })
}

/// Clone one repository, showing a transfer bar, then report where it
/// landed and whether it is bare.
pub fn cmd_clone(url: &str, dest: Option<&Path>, flags: &CloneFlags) -> Result<()> {
    let settings = load_settings()?;
    let acquirer = RepositoryAcquirer::with_options(clone_options(flags, &settings)?);

    let pb = ProgressBar::new(0);
    pb.set_style(transfer_style());
    pb.set_message(format!("cloning {}", url));
    pb.enable_steady_tick(Duration::from_millis(80));

    let res = acquirer.clone_with_progress(url, dest, |p| {
        pb.set_length(p.total_objects as u64);
        pb.set_position(p.received_objects as u64);
        if p.is_complete() {
            pb.set_message(format!("checking out {}", url));
        } else {
            pb.set_message(format!("cloning {} ({})", url, HumanBytes(p.received_bytes as u64)));
        }
    });

    let handle = match res {
        Ok(handle) => handle,
        Err(e) => {
            pb.set_style(err_style());
            pb.finish_with_message(format!("cloning {} (error: {})", url, e));
            return Err(anyhow::Error::new(e).context(format!("git clone {}", url)));
        }
    };

    pb.set_style(ok_style());
    pb.finish_with_message(format!("cloned {}", url));
    print_handle("Repository cloned at", &handle)
}

/// Clone several repositories in parallel into their default destinations.
///
/// Each URL gets its own spinner; failures are shown on the job's line and
/// the remaining clones continue.
pub fn cmd_clone_all(urls: &[String], flags: &CloneFlags) -> Result<()> {
    if urls.is_empty() {
        bail!("no urls given");
    }
    let settings = load_settings()?;
    let acquirer = RepositoryAcquirer::with_options(clone_options(flags, &settings)?);

    let mp = MultiProgress::new();
    let bars: Vec<ProgressBar> = urls
        .iter()
        .map(|url| {
            let pb = mp.add(ProgressBar::new_spinner());
            pb.set_style(spinner_style());
            pb.set_message(format!("cloning {}", url));
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        })
        .collect();

    let failed = urls
        .par_iter()
        .zip(bars.par_iter())
        .filter(|(url, pb)| match acquirer.clone(url, None) {
            Ok(handle) => {
                pb.set_style(ok_style());
                pb.finish_with_message(format!(
                    "cloned {} into {}",
                    url,
                    handle.local_path().display()
                ));
                false
            }
            Err(e) => {
                pb.set_style(err_style());
                pb.finish_with_message(format!("cloning {} (error: {})", url, e));
                true
            }
        })
        .count();

    if failed > 0 {
        bail!("{} of {} clones failed", failed, urls.len());
    }
    Ok(())
}

/// Report whether the repository at `path` is bare.
pub fn cmd_is_bare(path: &Path) -> Result<()> {
    let handle = RepositoryHandle::open(path)
        .with_context(|| format!("not a repository: {}", path.display()))?;
    print_handle("Repository at", &handle)
}

/// Print the branches of the repository at `path`, then its history from
/// HEAD as `<short hash> <summary>` lines.
pub fn cmd_log(path: &Path, max_count: Option<usize>) -> Result<()> {
    let handle = RepositoryHandle::open(path)
        .with_context(|| format!("not a repository: {}", path.display()))?;
    for branch in handle.branches()? {
        let kind = if branch.is_remote { "remote" } else { "local" };
        println!("{:<6} {}", kind, branch.name);
    }
    let history = handle.commit_history()?;
    for commit in history.iter().take(max_count.unwrap_or(usize::MAX)) {
        println!("{:.7} {}", commit.hash, commit.summary());
    }
    Ok(())
}

/// Print the directory `url` would be cloned into by default.
pub fn cmd_name(url: &str) -> Result<PathBuf> {
    let dest = default_destination(url)?;
    println!("{}", dest.display());
    Ok(dest)
}

fn print_handle(label: &str, handle: &RepositoryHandle) -> Result<()> {
    println!("{} {}", label, handle.local_path().display());
    println!("Is bare repository: {}", handle.is_bare()?);
    if let Some(branch) = handle.head_branch()? {
        println!("HEAD: {}", branch);
    }
    Ok(())
}
