// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cache of downloaded component archives.
//!
//! Archives are keyed by source URL and shared by every job of a pool. One
//! mutex guards the whole cache and is held while a missing archive is
//! downloaded, so concurrent jobs never fetch the same URL twice. When the
//! cache is full the least recently used archive is evicted.
//!
//! Component actions reach the pool's cache through
//! [`ActionContext::archives`](crate::action::ActionContext::archives) and can
//! use [`chart_version_from_url`] to tell which chart version an archive holds.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use regex::Regex;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Timeout of one archive download.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors from archive downloads.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchiveError {
    /// The request could not be sent or the body not read.
    #[error("failed to download archive from {url}: {source}")]
    Http {
        /// Archive URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with something other than 200.
    #[error("downloading archive from {url} returned HTTP {status}")]
    Status {
        /// Archive URL.
        url: String,
        /// Returned status code.
        status: u16,
    },
}

#[derive(Default)]
struct Entries {
    archives: HashMap<String, Bytes>,
    // Front is least recently used.
    order: VecDeque<String>,
}

impl Entries {
    fn touch(&mut self, url: &str) {
        if let Some(pos) = self.order.iter().position(|u| u == url)
            && let Some(key) = self.order.remove(pos)
        {
            self.order.push_back(key);
        }
    }

    fn insert(&mut self, url: String, archive: Bytes, capacity: usize) {
        while self.archives.len() >= capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            debug!(url = %oldest, "Evicting cached archive");
            self.archives.remove(&oldest);
        }
        self.order.push_back(url.clone());
        self.archives.insert(url, archive);
    }
}

/// Bounded, URL-keyed archive cache.
pub struct ArchiveCache {
    http: reqwest::Client,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl ArchiveCache {
    /// Create a cache holding at most `capacity` archives. A capacity of zero
    /// disables caching.
    pub fn new(capacity: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(http, capacity)
    }

    /// Create a cache using the given HTTP client.
    pub fn with_client(http: reqwest::Client, capacity: usize) -> Self {
        Self {
            http,
            capacity,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Maximum number of cached archives.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached archives.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.archives.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether `url` is cached.
    pub async fn contains(&self, url: &str) -> bool {
        self.entries.lock().await.archives.contains_key(url)
    }

    /// Return the archive at `url`, downloading it on a miss.
    pub async fn get(&self, url: &str) -> Result<Bytes, ArchiveError> {
        let mut entries = self.entries.lock().await;

        if let Some(archive) = entries.archives.get(url).cloned() {
            entries.touch(url);
            debug!(url, "Archive cache hit");
            return Ok(archive);
        }

        let archive = self.download(url).await?;
        info!(url, bytes = archive.len(), "Downloaded archive");
        if self.capacity > 0 {
            entries.insert(url.to_string(), archive.clone(), self.capacity);
        }
        Ok(archive)
    }

    async fn download(&self, url: &str) -> Result<Bytes, ArchiveError> {
        let http_err = |source| ArchiveError::Http {
            url: url.to_string(),
            source,
        };

        let response = self.http.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ArchiveError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(http_err)
    }
}

/// Extract the chart version from an archive URL named
/// `<chart>-<version>.tgz`.
pub fn chart_version_from_url(chart: &str, url: &str) -> Option<String> {
    let pattern = format!(r"{}-([a-zA-Z0-9-.]+)\.tgz$", regex::escape(chart));
    let re = Regex::new(&pattern).ok()?;
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
