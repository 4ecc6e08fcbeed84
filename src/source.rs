use regex::Regex;
use std::sync::LazyLock;

use crate::error::{AcquireError, Result};

static SCHEME_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://(.*)$").unwrap());

/// `user@host:path` shorthand understood by git as ssh.
static SCP_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[^@/\s]+@)?([^:/\s]+):(.+)$").unwrap());

/// Transport a source URL will be fetched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Https,
    Http,
    Ssh,
    Git,
    File,
}

impl Transport {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "https" => Some(Self::Https),
            "http" => Some(Self::Http),
            "ssh" | "git+ssh" | "ssh+git" => Some(Self::Ssh),
            "git" => Some(Self::Git),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// Check that `url` names a repository over a supported transport.
///
/// Accepted forms are `https://`, `http://`, `ssh://`, `git://` and
/// `file://` URLs, plus the scp-like `user@host:path` shorthand.
///
/// # Errors
/// `InvalidSource` when the URL is empty, contains whitespace, uses an
/// unknown scheme, or lacks a host or path.
pub fn validate_source(url: &str) -> Result<Transport> {
    if url.trim().is_empty() {
        return Err(AcquireError::invalid_source(url, "url is empty"));
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AcquireError::invalid_source(
            url,
            "url contains whitespace or control characters",
        ));
    }

    if let Some(caps) = SCHEME_URL.captures(url) {
        let scheme = &caps[1];
        let rest = &caps[2];
        let transport = Transport::from_scheme(scheme).ok_or_else(|| {
            AcquireError::invalid_source(url, format!("unsupported transport `{}`", scheme))
        })?;

        if transport == Transport::File {
            if rest.trim_matches('/').is_empty() {
                return Err(AcquireError::invalid_source(url, "missing repository path"));
            }
            return Ok(transport);
        }

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
        if host.is_empty() || host.starts_with(':') {
            return Err(AcquireError::invalid_source(url, "missing host"));
        }
        if path.trim_matches('/').is_empty() {
            return Err(AcquireError::invalid_source(url, "missing repository path"));
        }
        return Ok(transport);
    }

    if SCP_LIKE.is_match(url) {
        return Ok(Transport::Ssh);
    }

    Err(AcquireError::invalid_source(
        url,
        "not a recognised repository url",
    ))
}

/// Name of the directory `url` is cloned into when no destination is given.
///
/// The last segment of the URL's path, with a trailing `.git` removed.
/// Trailing slashes are ignored; the host never counts as a segment.
///
/// # Errors
/// `InvalidSource` if no usable name remains (for example `https://host/`).
pub fn derive_default_name(url: &str) -> Result<String> {
    let trimmed = url.trim();
    let path = if let Some(caps) = SCHEME_URL.captures(trimmed) {
        let rest = caps.get(2).map_or("", |m| m.as_str());
        if caps[1].eq_ignore_ascii_case("file") {
            rest
        } else {
            rest.split_once('/').map_or("", |(_, path)| path)
        }
    } else if let Some(caps) = SCP_LIKE.captures(trimmed) {
        caps.get(2).map_or("", |m| m.as_str())
    } else {
        trimmed
    };

    let path = path.trim_end_matches('/');
    let last = path.rsplit_once('/').map_or(path, |(_, after)| after);
    let name = last.strip_suffix(".git").unwrap_or(last);

    if name.is_empty() || name == "." || name == ".." || name.contains(':') {
        return Err(AcquireError::invalid_source(
            url,
            "cannot derive a directory name from url",
        ));
    }
    Ok(name.to_string())
}
