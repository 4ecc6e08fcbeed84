use std::fmt;
use std::time::Duration;

/// Credentials handed through to the transport when the remote asks.
///
/// These are never stored or looked up; when a remote requests credentials
/// and none of these fit, the clone fails with `AuthenticationRequired`.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Plain username/password, used for HTTP(S) basic auth.
    UserPassword { username: String, password: String },
    /// Keys from the running ssh-agent. `username` defaults to the one in the
    /// URL, then `git`.
    SshAgent { username: Option<String> },
}

// Keep passwords out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::SshAgent { username } => f
                .debug_struct("SshAgent")
                .field("username", username)
                .finish(),
        }
    }
}

/// Knobs for a single clone. `CloneOptions::default()` clones the remote's
/// default reference into a non-bare working copy with no timeout.
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub bare: bool,
    /// Branch, tag or commit to check out instead of the remote HEAD.
    pub reference: Option<String>,
    pub credentials: Option<Credentials>,
    pub timeout: Option<Duration>,
}

impl CloneOptions {
    pub fn bare(mut self, bare: bool) -> Self {
        self.bare = bare;
        self
    }

    pub fn reference(mut self, rev: impl Into<String>) -> Self {
        self.reference = Some(rev.into());
        self
    }

    pub fn credentials(mut self, creds: Credentials) -> Self {
        self.credentials = Some(creds);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
