//! Jenkins lockable-resources client.
//!
//! A board is leased from Jenkins before its console is opened and
//! released on teardown. Acquisition retries up to 3 times on transient
//! HTTP failures. Composite resources name several boards in one lease
//! (`wifi-enclosure [CH7465LG-1-1, F3896LG-1-2]`); [`disambiguate`]
//! picks the member matching the requested board type and refuses the
//! lease with `ResourceMismatch` when none does.

use log::info;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::retry::retry;

const ACQUIRE_ATTEMPTS: usize = 3;

/// A successfully acquired lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredLock {
    /// The concrete board picked out of the resource.
    pub board: String,
    /// The full resource name, needed for release.
    pub resource: String,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    resources: Vec<ResourceEntry>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    name: String,
    #[serde(default)]
    locked: bool,
    #[serde(default, rename = "reservedBy")]
    reserved_by: Option<String>,
}

impl ResourceEntry {
    fn is_free(&self) -> bool {
        !self.locked && self.reserved_by.is_none()
    }
}

/// Client for the Jenkins lockable-resources plugin.
pub struct LockClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    token: SecretString,
}

impl LockClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            username: username.into(),
            token: SecretString::from(token.into()),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(self.token.expose_secret()))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post(&self, path: &str) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        self.client
            .post(&url)
            .basic_auth(&self.username, Some(self.token.expose_secret()))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// List all lockable resources.
    pub async fn list(&self) -> Result<Vec<String>> {
        let list: ResourceList = self
            .get_json("/lockable-resources/api/json?tree=resources[name,locked,reservedBy]")
            .await?;
        Ok(list.resources.into_iter().map(|r| r.name).collect())
    }

    /// Lease a free resource matching `board_type`.
    ///
    /// Scans the resource list for a free entry whose name (or composite
    /// member) starts with the board type, reserves it and returns both
    /// the picked board and the full resource name.
    pub async fn acquire(&self, board_type: &str) -> Result<AcquiredLock> {
        // Only the HTTP exchanges retry; a mismatch against the listing
        // is deterministic and reported straight away.
        let list: ResourceList = retry(ACQUIRE_ATTEMPTS, "lock listing", |_| async move {
            self.get_json("/lockable-resources/api/json?tree=resources[name,locked,reservedBy]")
                .await
        })
        .await?;

        for entry in list.resources.iter().filter(|e| e.is_free()) {
            if let Ok(lock) = disambiguate(&entry.name, board_type) {
                let name = entry.name.as_str();
                retry(ACQUIRE_ATTEMPTS, "lock reservation", |_| async move {
                    self.reserve(name).await
                })
                .await?;
                info!("acquired lock '{}' for {board_type}", entry.name);
                return Ok(lock);
            }
        }
        Err(Error::ResourceMismatch {
            resource: "<no free resource>".to_string(),
            board_type: board_type.to_string(),
        })
    }

    /// Lease a specific named resource, verifying it matches the board
    /// type before keeping it.
    pub async fn acquire_named(&self, resource: &str, board_type: &str) -> Result<AcquiredLock> {
        let lock = disambiguate(resource, board_type)?;
        retry(ACQUIRE_ATTEMPTS, "lock acquisition", |_| async move {
            self.reserve(resource).await
        })
        .await?;
        info!("acquired lock '{resource}' for {board_type}");
        Ok(lock)
    }

    async fn reserve(&self, resource: &str) -> Result<()> {
        self.post(&format!(
            "/lockable-resources/reserve?resource={}",
            urlencode(resource)
        ))
        .await
    }

    /// Release a previously acquired lease. Idempotent on the server.
    pub async fn release(&self, resource: &str) -> Result<()> {
        self.post(&format!(
            "/lockable-resources/unreserve?resource={}",
            urlencode(resource)
        ))
        .await
    }
}

/// Pick the board matching `board_type` out of a resource name.
///
/// Plain resources match on name prefix. Composite resources list their
/// members in brackets; the first member with the board-type prefix
/// wins. No match is a `ResourceMismatch`.
pub fn disambiguate(resource: &str, board_type: &str) -> Result<AcquiredLock> {
    let mismatch = || Error::ResourceMismatch {
        resource: resource.to_string(),
        board_type: board_type.to_string(),
    };

    if let Some((_, bracketed)) = resource.split_once('[') {
        let inner = bracketed.split(']').next().unwrap_or("");
        let board = inner
            .split(',')
            .map(str::trim)
            .find(|member| member.starts_with(board_type))
            .ok_or_else(mismatch)?;
        return Ok(AcquiredLock {
            board: board.to_string(),
            resource: resource.to_string(),
        });
    }

    if resource.starts_with(board_type) {
        Ok(AcquiredLock {
            board: resource.to_string(),
            resource: resource.to_string(),
        })
    } else {
        Err(mismatch())
    }
}

/// Minimal percent-encoding for resource names in query strings.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
