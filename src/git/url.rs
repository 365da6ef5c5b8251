// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository string handling.
//!
//! Users may write the configuration repository as `owner/name`, as any of
//! the usual GitHub URL spellings, or as an arbitrary git URL for other hosts.
//! GitHub spellings are normalized to `owner/name` when settings are loaded,
//! and turned back into a concrete clone URL once credentials are known.

use std::{borrow::Cow, path::Path};

const GITHUB_PREFIXES: [&str; 6] = [
    "https://github.com/",
    "http://github.com/",
    "ssh://git@github.com/",
    "git@github.com:",
    "www.github.com/",
    "github.com/",
];

/// Normalize repository string.
///
/// Strips surrounding whitespace and quotes. GitHub URLs collapse to their
/// `owner/name` short form. Everything else is returned as-is.
pub fn normalize_repo(repo: &str) -> String {
    let trimmed = repo.trim().trim_matches(|c| c == '"' || c == '\'').trim();

    for prefix in GITHUB_PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            let mut segments = rest.split('/').filter(|segment| !segment.is_empty());
            if let (Some(owner), Some(name)) = (segments.next(), segments.next()) {
                let name = name.strip_suffix(".git").unwrap_or(name);
                return format!("{owner}/{name}");
            }
        }
    }

    trimmed.to_string()
}

/// Split short form repository into owner and name.
///
/// Returns `None` for anything that is not exactly `owner/name`, including
/// relative paths that exist on disk.
pub fn owner_and_name(repo: &str) -> Option<(&str, &str)> {
    if repo.contains(':') || repo.starts_with('.') || Path::new(repo).exists() {
        return None;
    }

    let (owner, name) = repo.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }

    Some((owner, name))
}

/// Repository is hosted on GitHub.
pub fn is_github(repo: &str) -> bool {
    owner_and_name(&normalize_repo(repo)).is_some()
}

/// Determine URL to clone repository through.
///
/// 1. Token and `owner/name` become `https://<token>@github.com/owner/name.git`.
/// 2. Token and an `https://` URL get the token injected as userinfo.
/// 3. An existing SSH key turns GitHub repositories into
///    `git@github.com:owner/name.git`.
/// 4. Otherwise `owner/name` becomes plain HTTPS and any other URL is kept.
pub fn clone_url(repo: &str, token: Option<&str>, ssh_key: Option<&Path>) -> String {
    let repo = normalize_repo(repo);
    let token = token.filter(|token| !token.is_empty());
    let short = owner_and_name(&repo);

    match (token, short) {
        (Some(token), Some((owner, name))) => {
            return format!("https://{token}@github.com/{owner}/{name}.git");
        }
        (Some(token), None) => {
            if let Some(rest) = repo.strip_prefix("https://") {
                return format!("https://{token}@{rest}");
            }
        }
        _ => {}
    }

    if let Some((owner, name)) = short {
        if ssh_key.is_some_and(|key| key.is_file()) {
            return format!("git@github.com:{owner}/{name}.git");
        }

        return format!("https://github.com/{owner}/{name}.git");
    }

    repo
}

/// Determine browsable HTTPS address of repository.
///
/// Works for `owner/name`, `http(s)://`, `ssh://`, `git://` and SCP-style
/// `user@host:path` remotes. Credentials and SSH ports are dropped. Local
/// remotes and anything unrecognized have no web address.
pub fn web_url(repo: &str) -> Option<String> {
    let repo = normalize_repo(repo);
    if let Some((owner, name)) = owner_and_name(&repo) {
        return Some(format!("https://github.com/{owner}/{name}"));
    }

    let (host, path) = match repo.split_once("://") {
        Some(("https" | "http", rest)) => {
            let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
            (without_userinfo(authority), path)
        }
        Some(("ssh" | "git" | "git+ssh" | "ssh+git", rest)) => {
            let (authority, path) = rest.split_once('/')?;
            let host = without_userinfo(authority);
            (host.split_once(':').map_or(host, |(host, _)| host), path)
        }
        Some(_) => return None,
        None => scp_parts(&repo)?,
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    if host.is_empty() || path.is_empty() {
        return None;
    }

    Some(format!("https://{host}/{path}"))
}

/// Repository lives on this machine.
///
/// True for `file://` URLs and anything git would read as a filesystem
/// path. Remotes on other hosts, including GitHub short forms, are not local.
pub fn is_local(repo: &str) -> bool {
    let repo = normalize_repo(repo);
    if repo.starts_with("file://") {
        return true;
    }

    !repo.contains("://") && scp_parts(&repo).is_none() && owner_and_name(&repo).is_none()
}

/// Split SCP-style `[user@]host:path` remote into host and path.
fn scp_parts(repo: &str) -> Option<(&str, &str)> {
    if repo.contains("://") {
        return None;
    }

    let (authority, path) = repo.split_once(':')?;
    let host = without_userinfo(authority);

    // INVARIANT: Single letter hosts are drive letters, not remotes.
    if host.len() < 2 || authority.contains('/') || path.is_empty() {
        return None;
    }

    Some((host, path))
}

fn without_userinfo(authority: &str) -> &str {
    authority.rsplit_once('@').map_or(authority, |(_, host)| host)
}

/// Hide credentials embedded in URLs.
///
/// Rewrites `scheme://userinfo@host` to `scheme://***@host` anywhere in the
/// given text.
pub fn redact(text: &str) -> Cow<'_, str> {
    if !text.contains("://") || !text.contains('@') {
        return Cow::Borrowed(text);
    }

    let mut redacted = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(index) = rest.find("://") {
        let (head, tail) = rest.split_at(index + 3);
        redacted.push_str(head);

        let authority_end = tail
            .find(|c: char| c == '/' || c.is_whitespace())
            .unwrap_or(tail.len());
        let authority = &tail[..authority_end];
        match authority.rfind('@') {
            Some(at) => {
                redacted.push_str("***");
                redacted.push_str(&authority[at..]);
            }
            None => redacted.push_str(authority),
        }
        rest = &tail[authority_end..];
    }
    redacted.push_str(rest);

    Cow::Owned(redacted)
}
