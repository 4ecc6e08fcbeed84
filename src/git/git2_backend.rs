use git2::{
    BranchType, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, ObjectType, Reference,
    RemoteCallbacks, Repository,
    build::{CheckoutBuilder, RepoBuilder},
};
use log::{debug, warn};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{BranchInfo, CommitInfo, TransferProgress};
use crate::acquire::{CloneOptions, Credentials};
use crate::error::AcquireError;
use crate::source::Transport;

/// Everything the backend needs for one clone.
///
/// `staging` is where libgit2 writes; `destination` is only used to name the
/// path in errors, since the caller never sees the staging directory.
pub(crate) struct CloneRequest<'a> {
    pub url: &'a str,
    pub transport: Transport,
    pub staging: &'a Path,
    pub destination: &'a Path,
    pub options: &'a CloneOptions,
}

/// Where in the clone we are, used to attribute OS-level errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Transfer,
    Checkout,
    Reference,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
        }
    }

    fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Per-clone state shared by the libgit2 callbacks.
struct Session {
    phase: Cell<Phase>,
    deadline: Deadline,
    timed_out: Cell<bool>,
    auth_refused: Cell<bool>,
}

impl Session {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            phase: Cell::new(Phase::Connecting),
            deadline: Deadline::after(timeout),
            timed_out: Cell::new(false),
            auth_refused: Cell::new(false),
        }
    }

    /// Returns `false` (abort) once the deadline has passed.
    fn keep_going(&self) -> bool {
        if self.deadline.expired() {
            self.timed_out.set(true);
            return false;
        }
        true
    }
}

/// Budgets of the network clones currently running.
///
/// libgit2 copies its socket timeouts from process-wide options whenever a
/// connection opens. The installed value is the loosest budget in flight, or
/// no socket timeout at all while an unbounded clone is running, so one clone
/// never cuts another one short.
#[derive(Debug, Default)]
struct SocketBudgets {
    unbounded: usize,
    bounded: BTreeMap<Duration, usize>,
}

static SOCKET_BUDGETS: LazyLock<Mutex<SocketBudgets>> = LazyLock::new(Default::default);

impl SocketBudgets {
    fn add(&mut self, budget: Option<Duration>) {
        match budget {
            None => self.unbounded += 1,
            Some(d) => *self.bounded.entry(d).or_default() += 1,
        }
    }

    fn remove(&mut self, budget: Option<Duration>) {
        match budget {
            None => self.unbounded = self.unbounded.saturating_sub(1),
            Some(d) => {
                if let Some(n) = self.bounded.get_mut(&d) {
                    *n -= 1;
                    if *n == 0 {
                        self.bounded.remove(&d);
                    }
                }
            }
        }
    }

    /// Milliseconds to hand libgit2; `0` disables the socket timeout.
    fn millis(&self) -> i32 {
        if self.unbounded > 0 {
            return 0;
        }
        self.bounded.last_key_value().map_or(0, |(d, _)| {
            i32::try_from(d.as_millis()).unwrap_or(i32::MAX).max(1)
        })
    }
}

fn install_socket_timeouts(ms: i32) {
    // SAFETY: the options are plain ints read when a socket stream is
    // created; writers are serialized by the SOCKET_BUDGETS lock.
    let res = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(ms)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(ms))
    };
    if let Err(e) = res {
        warn!("could not set libgit2 socket timeouts to {}ms: {}", ms, e);
    }
}

/// Registers a clone's budget with libgit2's socket timeouts until dropped.
struct SocketTimeout {
    budget: Option<Duration>,
}

impl SocketTimeout {
    fn register(budget: Option<Duration>) -> Self {
        let mut budgets = SOCKET_BUDGETS.lock().unwrap_or_else(PoisonError::into_inner);
        budgets.add(budget);
        install_socket_timeouts(budgets.millis());
        Self { budget }
    }
}

impl Drop for SocketTimeout {
    fn drop(&mut self) {
        let mut budgets = SOCKET_BUDGETS.lock().unwrap_or_else(PoisonError::into_inner);
        budgets.remove(self.budget);
        install_socket_timeouts(budgets.millis());
    }
}

/// Answer a credential request from the supplied credentials only.
///
/// Username-only requests (ssh asking who to log in as) are always answered.
/// A second request for a secret means the first one was rejected, which
/// fails closed like a missing credential.
fn answer_credentials(
    creds: Option<&Credentials>,
    secrets_sent: &mut u32,
    username_from_url: Option<&str>,
    allowed: CredentialType,
) -> Result<Cred, git2::Error> {
    if allowed.contains(CredentialType::USERNAME) {
        let user = match creds {
            Some(Credentials::UserPassword { username, .. }) => Some(username.as_str()),
            Some(Credentials::SshAgent { username }) => username.as_deref(),
            None => None,
        };
        return Cred::username(user.or(username_from_url).unwrap_or("git"));
    }

    if *secrets_sent > 0 {
        return Err(git2::Error::from_str("supplied credentials were rejected"));
    }

    let cred = match creds {
        Some(Credentials::UserPassword { username, password })
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) =>
        {
            Cred::userpass_plaintext(username, password)
        }
        Some(Credentials::SshAgent { username }) if allowed.contains(CredentialType::SSH_KEY) => {
            Cred::ssh_key_from_agent(
                username
                    .as_deref()
                    .or(username_from_url)
                    .unwrap_or("git"),
            )
        }
        _ => Err(git2::Error::from_str(
            "remote requested credentials and none suitable were supplied",
        )),
    }?;
    *secrets_sent += 1;
    Ok(cred)
}

/// Build `FetchOptions` wired to the session: credentials pass-through,
/// deadline checks, phase tracking and progress reporting.
fn fetch_opts<'a, 'o: 'a>(
    session: &'a Session,
    creds: Option<&'a Credentials>,
    observer: &'a mut (dyn FnMut(&TransferProgress) + 'o),
) -> FetchOptions<'a> {
    let mut cb = RemoteCallbacks::new();

    let mut secrets_sent = 0;
    cb.credentials(move |_url, username_from_url, allowed| {
        if !session.keep_going() {
            return Err(git2::Error::from_str("clone timed out"));
        }
        answer_credentials(creds, &mut secrets_sent, username_from_url, allowed)
            .inspect_err(|_| session.auth_refused.set(true))
    });

    cb.transfer_progress(move |progress| {
        session.phase.set(Phase::Transfer);
        observer(&TransferProgress::from_git(&progress));
        session.keep_going()
    });

    cb.sideband_progress(move |_data| session.keep_going());

    let mut fo = FetchOptions::new();
    fo.remote_callbacks(cb);
    fo
}

/// Clone `req.url` into `req.staging`.
///
/// The remote's default reference is checked out unless
/// `req.options.reference` names another one.
///
/// # Errors
/// libgit2 failures are mapped onto [`AcquireError`] by cause; see
/// [`classify`].
pub(crate) fn clone_into(
    req: &CloneRequest<'_>,
    observer: &mut dyn FnMut(&TransferProgress),
) -> Result<(), AcquireError> {
    let session = Session::new(req.options.timeout);
    let _sockets = (req.transport != Transport::File)
        .then(|| SocketTimeout::register(req.options.timeout));

    let result: Result<(), git2::Error> = (|| {
        let mut checkout = CheckoutBuilder::new();
        checkout.progress(|_path, _done, _total| session.phase.set(Phase::Checkout));

        let mut builder = RepoBuilder::new();
        builder
            .bare(req.options.bare)
            .fetch_options(fetch_opts(
                &session,
                req.options.credentials.as_ref(),
                observer,
            ))
            .with_checkout(checkout);

        debug!("cloning {} into staging {:?}", req.url, req.staging);
        let repo = builder.clone(req.url, req.staging)?;

        if let Some(rev) = req.options.reference.as_deref() {
            session.phase.set(Phase::Reference);
            checkout_rev(&repo, rev)?;
        }
        Ok(())
    })();

    result.map_err(|e| classify(e, req, &session))
}

/// Map a libgit2 error onto the cause-level error the caller sees.
fn classify(err: git2::Error, req: &CloneRequest<'_>, session: &Session) -> AcquireError {
    let phase = session.phase.get();
    debug!(
        "clone of {} failed during {:?}: {} ({:?}/{:?})",
        req.url,
        phase,
        err.message(),
        err.class(),
        err.code()
    );

    let network = |timed_out: bool, message: String| AcquireError::NetworkFailure {
        url: req.url.to_string(),
        timed_out,
        message,
    };
    let filesystem = |message: &str| {
        AcquireError::filesystem(req.destination, io::Error::other(message.to_string()))
    };

    // A stalled socket gives up on its own, without a callback noticing.
    let deadline_hit = matches!(phase, Phase::Connecting | Phase::Transfer)
        && (session.deadline.expired() || err.code() == ErrorCode::Timeout);
    if session.timed_out.get() || deadline_hit {
        let message = req.options.timeout.map_or_else(
            || err.message().to_string(),
            |budget| format!("timed out after {:?}", budget),
        );
        return network(true, message);
    }
    if session.auth_refused.get() || err.code() == ErrorCode::Auth {
        return AcquireError::AuthenticationRequired {
            url: req.url.to_string(),
        };
    }
    if phase == Phase::Reference {
        return match err.code() {
            ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous => {
                AcquireError::invalid_source(req.url, format!("reference: {}", err.message()))
            }
            _ => filesystem(err.message()),
        };
    }
    if err.code() == ErrorCode::Certificate {
        return network(false, err.message().to_string());
    }
    if req.transport == Transport::File && phase == Phase::Connecting {
        return AcquireError::invalid_source(req.url, err.message());
    }

    match err.class() {
        ErrorClass::Http if is_missing_repository(&err) => {
            AcquireError::invalid_source(req.url, "repository not found")
        }
        ErrorClass::Net | ErrorClass::Ssl | ErrorClass::Http | ErrorClass::Ssh => {
            network(false, err.message().to_string())
        }
        ErrorClass::Filesystem
        | ErrorClass::Index
        | ErrorClass::Checkout
        | ErrorClass::Odb
        | ErrorClass::Indexer => filesystem(err.message()),
        ErrorClass::Os if is_socket_error(&err) => network(false, err.message().to_string()),
        ErrorClass::Os => filesystem(err.message()),
        _ if phase == Phase::Checkout => filesystem(err.message()),
        _ => network(false, err.message().to_string()),
    }
}

/// The host answered, but has no repository at that path.
fn is_missing_repository(err: &git2::Error) -> bool {
    err.message().ends_with("status code: 404")
}

/// `Os`-class errors libgit2 raises from its socket and TLS streams. Every
/// other `Os` error comes from local I/O (writing the pack, the index or the
/// working tree into staging).
fn is_socket_error(err: &git2::Error) -> bool {
    let msg = err.message();
    msg.starts_with("failed to connect to") || msg.starts_with("SSL error")
}

/// Attach HEAD to the given branch reference and update the working tree.
///
/// Bare repositories only move HEAD.
fn checkout_attach_to_reference(
    repo: &Repository,
    reference: &Reference,
) -> Result<(), git2::Error> {
    let name = reference
        .name()
        .ok_or_else(|| git2::Error::from_str("invalid reference name"))?;
    repo.set_head(name)?;
    if !repo.is_bare() {
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
    }
    Ok(())
}

fn checkout_detached(repo: &Repository, commit: &git2::Commit) -> Result<(), git2::Error> {
    if !repo.is_bare() {
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
    }
    repo.set_head_detached(commit.id())
}

/// Checkout a specific revision (branch, tag, or commit).
///
/// Resolution order:
/// 1. Local branch (`refs/heads/<rev>`) → attach HEAD to the branch
/// 2. Remote branch (`refs/remotes/origin/<rev>`) → create/attach a local tracking branch
/// 3. Tag (`refs/tags/<rev>`) → peel to the commit and detach HEAD
/// 4. Commit SHA or revspec → peel to the commit and detach HEAD
///
/// # Errors
/// `ErrorCode::NotFound` if the revision cannot be resolved; other libgit2
/// errors if checkout fails.
fn checkout_rev(repo: &Repository, rev: &str) -> Result<(), git2::Error> {
    if let Ok(reference) = repo.find_reference(&format!("refs/heads/{}", rev)) {
        return checkout_attach_to_reference(repo, &reference);
    }

    if let Ok(remote_ref) = repo.find_reference(&format!("refs/remotes/origin/{}", rev)) {
        let target_commit = remote_ref.peel_to_commit()?;

        let reference = match repo.find_branch(rev, BranchType::Local) {
            Ok(b) => b.into_reference(),
            Err(_) => {
                let mut b = repo.branch(rev, &target_commit, true)?;
                b.set_upstream(Some(&format!("origin/{}", rev)))?;
                b.into_reference()
            }
        };

        return checkout_attach_to_reference(repo, &reference);
    }

    if let Ok(tag_obj) = repo.revparse_single(&format!("refs/tags/{}", rev)) {
        let commit = tag_obj
            .peel(ObjectType::Commit)?
            .into_commit()
            .map_err(|_| git2::Error::from_str("tag didn't peel to a commit"))?;
        return checkout_detached(repo, &commit);
    }

    let commit = repo
        .revparse_single(rev)?
        .peel(ObjectType::Commit)?
        .into_commit()
        .map_err(|_| git2::Error::from_str("rev didn't peel to a commit"))?;
    checkout_detached(repo, &commit)
}

/// Open exactly the repository at `path`, without searching parent directories.
pub(crate) fn open_repository(path: &Path) -> Result<Repository, git2::Error> {
    Repository::open(path)
}

/// Create an empty repository with a working tree at `path`.
pub(crate) fn init_repository(path: &Path) -> Result<Repository, git2::Error> {
    Repository::init(path)
}

/// Commits reachable from HEAD, newest first. An unborn HEAD has none.
pub(crate) fn commit_history(repo: &Repository) -> Result<Vec<CommitInfo>, git2::Error> {
    if repo.head().is_err_and(|e| e.code() == ErrorCode::UnbornBranch) {
        return Ok(Vec::new());
    }
    let mut revwalk = repo.revwalk()?;
    revwalk.push_head()?;
    revwalk
        .map(|oid| repo.find_commit(oid?).map(|c| CommitInfo::from_git(&c)))
        .collect()
}

/// Local branches followed by remote-tracking ones, each sorted by name.
pub(crate) fn branches(repo: &Repository) -> Result<Vec<BranchInfo>, git2::Error> {
    let mut out = Vec::new();
    for (kind, is_remote) in [(BranchType::Local, false), (BranchType::Remote, true)] {
        let mut names = Vec::new();
        for branch in repo.branches(Some(kind))? {
            let (branch, _) = branch?;
            // The symbolic `origin/HEAD` is not a branch of its own.
            if branch.get().symbolic_target().is_some() {
                continue;
            }
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        names.sort();
        out.extend(names.into_iter().map(|name| BranchInfo { name, is_remote }));
    }
    Ok(out)
}

/// URL of the `origin` remote, if the repository has one.
pub(crate) fn origin_url(repo: &Repository) -> Option<String> {
    repo.find_remote("origin")
        .ok()
        .and_then(|r| r.url().map(str::to_string))
}

/// Shorthand name of the branch HEAD points at; `None` when detached.
pub(crate) fn head_branch(repo: &Repository) -> Result<Option<String>, git2::Error> {
    if repo.head_detached()? {
        return Ok(None);
    }
    match repo.head() {
        Ok(head) => Ok(head.shorthand().map(str::to_string)),
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .and_then(|t| t.strip_prefix("refs/heads/"))
                .map(str::to_string))
        }
        Err(e) => Err(e),
    }
}
