//! Clone and push capability.
//!
//! The working-copy cache and the session finalizer never talk to a remote
//! directly; they go through a [`Transport`]. [`Git2Transport`] is the
//! libgit2-backed implementation used in production.

use std::path::Path;

use git2::build::RepoBuilder;
use git2::{Cred, CredentialType, FetchOptions, PushOptions, RemoteCallbacks, Repository};

use crate::config::Credentials;
use crate::error::GitError;

/// Remote every working copy is cloned from and pushed back to.
pub const ORIGIN: &str = "origin";

/// Credential prompts libgit2 may issue before we give up.
///
/// libgit2 calls the credentials callback again after every rejected
/// attempt, so an unconditional answer would loop forever on bad passwords.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Blocking clone/push operations against a remote repository.
pub trait Transport: Send + Sync {
    /// Clone `address` into the empty `directory`.
    fn clone_repository(
        &self,
        address: &str,
        directory: &Path,
        credentials: &Credentials,
    ) -> Result<Repository, git2::Error>;

    /// Push the local `branch` to the same branch on `origin`.
    ///
    /// The push is never forced; a remote that has moved on reports
    /// [`GitError::Rejected`].
    fn push_branch(
        &self,
        repo: &Repository,
        branch: &str,
        credentials: &Credentials,
    ) -> Result<(), GitError>;
}

/// Transport backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Transport;

impl Transport for Git2Transport {
    fn clone_repository(
        &self,
        address: &str,
        directory: &Path,
        credentials: &Credentials,
    ) -> Result<Repository, git2::Error> {
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(remote_callbacks(credentials));

        RepoBuilder::new()
            .fetch_options(fetch)
            .clone(address, directory)
    }

    fn push_branch(
        &self,
        repo: &Repository,
        branch: &str,
        credentials: &Credentials,
    ) -> Result<(), GitError> {
        let mut remote = repo.find_remote(ORIGIN)?;
        let reference = format!("refs/heads/{branch}");
        let refspec = format!("{reference}:{reference}");

        let mut rejection: Option<(String, String)> = None;
        {
            let mut callbacks = remote_callbacks(credentials);
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejection = Some((refname.to_string(), message.to_string()));
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&[refspec.as_str()], Some(&mut options))?;
        }

        match rejection {
            Some((reference, message)) => Err(GitError::Rejected { reference, message }),
            None => Ok(()),
        }
    }
}

/// Build callbacks that answer credential requests from the session.
///
/// Explicit username/password wins when the remote accepts plaintext.
/// Otherwise we try the ssh agent, then the git credential helper, then
/// libgit2's default credentials.
fn remote_callbacks(credentials: &Credentials) -> RemoteCallbacks<'_> {
    let mut attempts = 0;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }

        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(user) = &credentials.username {
                let password = credentials.password.as_deref().unwrap_or("");
                return Cred::userpass_plaintext(user, password);
            }
        }

        if allowed.contains(CredentialType::SSH_KEY) {
            let user = username_from_url
                .or(credentials.username.as_deref())
                .unwrap_or("git");
            return Cred::ssh_key_from_agent(user);
        }

        if allowed.contains(CredentialType::USERNAME) {
            let user = credentials
                .username
                .as_deref()
                .or(username_from_url)
                .unwrap_or("git");
            return Cred::username(user);
        }

        if let Ok(config) = git2::Config::open_default() {
            if let Ok(cred) = Cred::credential_helper(&config, url, username_from_url) {
                return Ok(cred);
            }
        }

        Cred::default()
    });
    callbacks
}
