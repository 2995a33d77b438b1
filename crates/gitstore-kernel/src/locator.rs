//! Compound repository locators and relative resource resolution.
//!
//! A locator names a repository, a branch, and a path inside that repository:
//!
//! ```text
//! git:git@example.com:/org/site.git#gh-pages/docs/index.html
//! ─┬─ ──────────────┬────────────── ───┬──── ───────┬───────
//! scheme    repository address      branch    resource path
//! ```
//!
//! Resolution is pure segment manipulation. A `..` taken at the repository
//! root walks out of the repository and into the address itself, so
//! `…/site.git` plus `../assets.git/logo.png` names `logo.png` inside the
//! sibling repository `…/assets.git`. Nothing here touches the filesystem or
//! the network.

use std::fmt;

use thiserror::Error;

/// Branch used when a locator does not name one.
pub const DEFAULT_BRANCH: &str = "master";

/// A locator or resource name that cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve {input:?}: {reason}")]
pub struct ResolveError {
    /// The text that failed to resolve.
    pub input: String,
    /// What went wrong.
    pub reason: String,
}

impl ResolveError {
    pub(crate) fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// A repository address split into a fixed root and poppable path segments.
///
/// The root is the part `..` can never walk above:
///
/// | address                        | root              | segments           |
/// |--------------------------------|-------------------|--------------------|
/// | `https://host/org/site.git`    | `https://host/`   | `org`, `site.git`  |
/// | `git@host:/org/site.git`       | `git@host:/`      | `org`, `site.git`  |
/// | `git@host:org/site.git`        | `git@host:`       | `org`, `site.git`  |
/// | `/srv/git/site.git`            | `/`               | `srv`, `git`, `site.git` |
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryAddress {
    root: String,
    segments: Vec<String>,
}

impl RepositoryAddress {
    /// Parse an address string.
    pub fn parse(address: &str) -> Result<Self, ResolveError> {
        if address.is_empty() {
            return Err(ResolveError::new(address, "empty repository address"));
        }

        let (root, rest) = split_root(address);
        let segments: Vec<String> = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        if segments.is_empty() && root.chars().all(|c| c == '/') {
            return Err(ResolveError::new(address, "repository address has no path"));
        }

        Ok(Self {
            root: root.to_string(),
            segments,
        })
    }

    /// Number of segments that `..` may still pop.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    fn pop(&mut self) -> bool {
        self.segments.pop().is_some()
    }

    fn push(&mut self, segment: &str) {
        self.segments.push(segment.to_string());
    }
}

impl fmt::Display for RepositoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.segments.join("/"))
    }
}

/// Split an address into its non-poppable root and the remaining path.
fn split_root(address: &str) -> (&str, &str) {
    // scheme://authority/path
    if let Some(idx) = address.find("://") {
        let after = idx + 3;
        let end = address[after..]
            .find('/')
            .map(|i| after + i + 1)
            .unwrap_or(address.len());
        return address.split_at(end);
    }

    // scp-like user@host:path, the colon comes before any slash
    if let Some(colon) = address.find(':') {
        if address.find('/').is_none_or(|slash| colon < slash) {
            let mut end = colon + 1;
            if address[end..].starts_with('/') {
                end += 1;
            }
            return address.split_at(end);
        }
    }

    if address.starts_with('/') {
        return address.split_at(1);
    }

    ("", address)
}

/// Normalize a slash-separated path into segments, applying `.` and `..`.
fn normalize_path(input: &str, path: &str) -> Result<Vec<String>, ResolveError> {
    let mut segments: Vec<String> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(ResolveError::new(
                        input,
                        "locator path climbs above the repository root",
                    ));
                }
            }
            other => segments.push(other.to_string()),
        }
    }
    Ok(segments)
}

/// A parsed base locator: scheme, repository address, branch, and resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    scheme: String,
    address: RepositoryAddress,
    branch: String,
    resource_path: Vec<String>,
}

impl Locator {
    /// Parse a locator, defaulting the branch to [`DEFAULT_BRANCH`].
    pub fn parse(target: &str) -> Result<Self, ResolveError> {
        Self::parse_with_default_branch(target, DEFAULT_BRANCH)
    }

    /// Parse a locator of the form `<scheme>:<address>[#<branch>]/<path>`.
    ///
    /// With `#branch` the address is everything before the `#`. Without it,
    /// the address runs through the first segment ending in `.git`; when no
    /// segment does, the whole text is the address.
    pub fn parse_with_default_branch(
        target: &str,
        default_branch: &str,
    ) -> Result<Self, ResolveError> {
        let (scheme, rest) = target
            .split_once(':')
            .ok_or_else(|| ResolveError::new(target, "missing scheme"))?;

        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(ResolveError::new(target, "invalid scheme"));
        }

        let (address, branch, path) = match rest.split_once('#') {
            Some((address, tail)) => {
                let (branch, path) = tail.split_once('/').unwrap_or((tail, ""));
                if branch.is_empty() {
                    return Err(ResolveError::new(target, "empty branch after '#'"));
                }
                (address, branch, path)
            }
            None => {
                let (address, path) = split_at_repository(rest);
                (address, default_branch, path)
            }
        };

        if default_branch.is_empty() {
            return Err(ResolveError::new(target, "empty default branch"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            address: RepositoryAddress::parse(address)
                .map_err(|e| ResolveError::new(target, e.reason))?,
            branch: branch.to_string(),
            resource_path: normalize_path(target, path)?,
        })
    }

    /// The locator scheme (e.g. `git`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The canonical repository address.
    pub fn repository_address(&self) -> String {
        self.address.to_string()
    }

    /// The branch this locator addresses.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The in-repository resource path, empty for the repository root.
    pub fn resource_path(&self) -> String {
        self.resource_path.join("/")
    }

    /// Resolve a relative resource name against this locator.
    ///
    /// `..` pops the in-repository cursor; at the repository root it pops a
    /// segment off the repository address instead, and the next ordinary
    /// segment names the sibling repository. The branch carries over
    /// unchanged when the repository switches.
    pub fn resolve(&self, resource_name: &str) -> Result<ResolvedLocation, ResolveError> {
        let mut address = self.address.clone();
        let mut cursor = self.resource_path.clone();
        // Address segments popped but not yet replaced.
        let mut pending = 0usize;

        for segment in resource_name.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if pending == 0 && cursor.pop().is_some() {
                        continue;
                    }
                    if !address.pop() {
                        return Err(ResolveError::new(
                            resource_name,
                            format!("climbs above repository address {}", self.address),
                        ));
                    }
                    pending += 1;
                }
                name if pending > 0 => {
                    address.push(name);
                    pending -= 1;
                }
                name => cursor.push(name.to_string()),
            }
        }

        if pending > 0 {
            return Err(ResolveError::new(
                resource_name,
                format!("leaves {} without naming a sibling repository", self.address),
            ));
        }

        Ok(ResolvedLocation {
            repository_address: address.to_string(),
            branch: self.branch.clone(),
            in_repo_path: cursor.join("/"),
        })
    }
}

/// Split `address/path` at the end of the first segment ending in `.git`.
fn split_at_repository(rest: &str) -> (&str, &str) {
    let mut offset = 0;
    for segment in rest.split('/') {
        let end = offset + segment.len();
        if segment.len() > ".git".len() && segment.ends_with(".git") {
            let (address, path) = rest.split_at(end);
            return (address, path.trim_start_matches('/'));
        }
        offset = end + 1;
    }
    (rest, "")
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.scheme, self.address, self.branch)?;
        if !self.resource_path.is_empty() {
            write!(f, "/{}", self.resource_path.join("/"))?;
        }
        Ok(())
    }
}

/// Where a resource name lands: a repository, a branch, and a path inside it.
///
/// `in_repo_path` never contains `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    repository_address: String,
    branch: String,
    in_repo_path: String,
}

impl ResolvedLocation {
    pub fn repository_address(&self) -> &str {
        &self.repository_address
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Slash-separated path inside the repository, empty for the root.
    pub fn in_repo_path(&self) -> &str {
        &self.in_repo_path
    }

    /// True when the location is the repository root.
    pub fn is_root(&self) -> bool {
        self.in_repo_path.is_empty()
    }

    /// True when the path points into the repository's own `.git` metadata.
    pub fn is_repository_metadata(&self) -> bool {
        self.in_repo_path
            .split('/')
            .next()
            .is_some_and(|first| first.eq_ignore_ascii_case(".git"))
    }
}

impl fmt::Display for ResolvedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}/{}",
            self.repository_address, self.branch, self.in_repo_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn locator(target: &str) -> Locator {
        Locator::parse(target).unwrap()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Parsing
    // ═══════════════════════════════════════════════════════════════════════

    #[rstest]
    #[case::scp_with_branch("git:git@h:/a/foo.git#main/x/y.txt", "git@h:/a/foo.git", "main", "x/y.txt")]
    #[case::scp_relative("git:git@github.com:org/site.git#gh-pages", "git@github.com:org/site.git", "gh-pages", "")]
    #[case::https_no_branch("git:https://host/org/site.git/docs", "https://host/org/site.git", "master", "docs")]
    #[case::ssh_url("git:ssh://git@host/org/site.git#dev/", "ssh://git@host/org/site.git", "dev", "")]
    #[case::file_url("git:file:///srv/git/site.git#main/a", "file:///srv/git/site.git", "main", "a")]
    #[case::local_path("git:/srv/git/site.git/a/b", "/srv/git/site.git", "master", "a/b")]
    #[case::no_dot_git("git:https://host/org/site", "https://host/org/site", "master", "")]
    #[case::dot_segments("git:/srv/site.git#main/a/./b/../c", "/srv/site.git", "main", "a/c")]
    fn parse_locators(
        #[case] target: &str,
        #[case] address: &str,
        #[case] branch: &str,
        #[case] path: &str,
    ) {
        let loc = locator(target);
        assert_eq!(loc.scheme(), "git");
        assert_eq!(loc.repository_address(), address);
        assert_eq!(loc.branch(), branch);
        assert_eq!(loc.resource_path(), path);
    }

    #[rstest]
    #[case::missing_scheme("no-scheme-here")]
    #[case::empty_scheme(":/srv/site.git")]
    #[case::bad_scheme("g t:/srv/site.git")]
    #[case::empty_address("git:")]
    #[case::empty_address_with_branch("git:#main/x")]
    #[case::empty_branch("git:/srv/site.git#/x")]
    #[case::path_escapes("git:/srv/site.git#main/../x")]
    fn parse_rejects(#[case] target: &str) {
        assert!(Locator::parse(target).is_err(), "{target} should not parse");
    }

    #[test]
    fn custom_default_branch() {
        let loc = Locator::parse_with_default_branch("git:/srv/site.git", "gh-pages").unwrap();
        assert_eq!(loc.branch(), "gh-pages");

        let explicit =
            Locator::parse_with_default_branch("git:/srv/site.git#main", "gh-pages").unwrap();
        assert_eq!(explicit.branch(), "main");
    }

    #[test]
    fn display_round_trips() {
        let loc = locator("git:git@h:/a/foo.git#main/x/y.txt");
        assert_eq!(loc.to_string(), "git:git@h:/a/foo.git#main/x/y.txt");
        assert_eq!(Locator::parse(&loc.to_string()).unwrap(), loc);
    }

    #[rstest]
    #[case("https://host/org/site.git", 2)]
    #[case("git@host:/org/site.git", 2)]
    #[case("git@host:site.git", 1)]
    #[case("/srv/git/site.git", 3)]
    #[case("relative/site.git", 2)]
    fn address_depth(#[case] address: &str, #[case] depth: usize) {
        assert_eq!(RepositoryAddress::parse(address).unwrap().depth(), depth);
    }

    #[test]
    fn address_without_path_rejected() {
        assert!(RepositoryAddress::parse("/").is_err());
        assert!(RepositoryAddress::parse("").is_err());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Resolution
    // ═══════════════════════════════════════════════════════════════════════

    #[rstest]
    #[case::empty_name("", "git@h:/a/foo.git", "x")]
    #[case::plain_child("y.txt", "git@h:/a/foo.git", "x/y.txt")]
    #[case::dot_ignored("./y/./z", "git@h:/a/foo.git", "x/y/z")]
    #[case::leading_slash("/y.txt", "git@h:/a/foo.git", "x/y.txt")]
    #[case::pop_in_repo("..", "git@h:/a/foo.git", "")]
    #[case::pop_and_push("../b/c.txt", "git@h:/a/foo.git", "b/c.txt")]
    #[case::sibling("../../bar.git/c.txt", "git@h:/a/bar.git", "c.txt")]
    #[case::sibling_root("../../bar.git", "git@h:/a/bar.git", "")]
    #[case::cousin("../../../b/bar.git/c", "git@h:/b/bar.git", "c")]
    #[case::sibling_then_pop("../../bar.git/c/../d", "git@h:/a/bar.git", "d")]
    fn resolve_from_subdirectory(
        #[case] name: &str,
        #[case] address: &str,
        #[case] path: &str,
    ) {
        let base = locator("git:git@h:/a/foo.git#main/x");
        let resolved = base.resolve(name).unwrap();
        assert_eq!(resolved.repository_address(), address);
        assert_eq!(resolved.in_repo_path(), path);
        assert_eq!(resolved.branch(), "main");
    }

    #[test]
    fn scenario_sibling_from_root() {
        let base = locator("git:git@h:/a/foo.git#main");
        let resolved = base.resolve("../bar.git/c.txt").unwrap();
        assert_eq!(resolved.repository_address(), "git@h:/a/bar.git");
        assert_eq!(resolved.in_repo_path(), "c.txt");
        assert_eq!(resolved.branch(), "main");
    }

    #[test]
    fn scenario_pop_stays_in_repository() {
        let base = locator("git:git@h:/a/foo.git#main/x/y.txt");
        let resolved = base.resolve("../../b/c.txt").unwrap();
        assert_eq!(resolved.repository_address(), "git@h:/a/foo.git");
        assert_eq!(resolved.in_repo_path(), "b/c.txt");
    }

    #[test]
    fn https_sibling() {
        let base = locator("git:https://host/org/site.git#gh-pages");
        let resolved = base.resolve("../assets.git/logo.png").unwrap();
        assert_eq!(resolved.repository_address(), "https://host/org/assets.git");
        assert_eq!(resolved.in_repo_path(), "logo.png");
        assert_eq!(resolved.branch(), "gh-pages");
    }

    #[test]
    fn over_traversal_is_an_error() {
        let base = locator("git:https://host/org/site.git#main");
        let err = base.resolve("../../../x.git/a").unwrap_err();
        assert!(err.reason.contains("climbs above"), "{err}");
    }

    #[test]
    fn leaving_without_sibling_is_an_error() {
        let base = locator("git:git@h:/a/foo.git#main");
        let err = base.resolve("..").unwrap_err();
        assert!(err.reason.contains("without naming"), "{err}");
    }

    #[test]
    fn repository_metadata_detected() {
        let base = locator("git:/srv/site.git#main");
        assert!(base.resolve(".git/config").unwrap().is_repository_metadata());
        assert!(base.resolve(".GIT").unwrap().is_repository_metadata());
        assert!(!base.resolve("docs/.git-notes").unwrap().is_repository_metadata());
        assert!(!base.resolve(".gitignore").unwrap().is_repository_metadata());
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,7}"
    }

    proptest! {
        #[test]
        fn names_without_parent_segments_join(
            base in prop::collection::vec(segment(), 0..4),
            name in prop::collection::vec(segment(), 0..4),
        ) {
            let target = format!("git:/srv/site.git#main/{}", base.join("/"));
            let loc = Locator::parse(&target).unwrap();
            let resolved = loc.resolve(&name.join("/")).unwrap();

            let expected: Vec<String> = base.iter().chain(name.iter()).cloned().collect();
            prop_assert_eq!(resolved.repository_address(), "/srv/site.git");
            prop_assert_eq!(resolved.in_repo_path(), expected.join("/"));
        }

        #[test]
        fn single_parent_pops_one_segment(
            base in prop::collection::vec(segment(), 1..5),
        ) {
            let target = format!("git:/srv/site.git#main/{}", base.join("/"));
            let loc = Locator::parse(&target).unwrap();
            let resolved = loc.resolve("..").unwrap();

            prop_assert_eq!(resolved.repository_address(), "/srv/site.git");
            prop_assert_eq!(resolved.in_repo_path(), base[..base.len() - 1].join("/"));
        }

        #[test]
        fn sibling_replaces_last_address_segment(name in segment()) {
            let loc = Locator::parse("git:git@h:/a/foo.git#main").unwrap();
            let sibling = format!("{name}.git");
            let resolved = loc.resolve(&format!("../{sibling}")).unwrap();

            prop_assert_eq!(resolved.repository_address(), format!("git@h:/a/{sibling}"));
            prop_assert!(resolved.is_root());
            prop_assert_eq!(resolved.branch(), "main");
        }
    }
}
