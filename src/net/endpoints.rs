//! Endpoint registry.
//!
//! # Responsibilities
//! - Hold the ordered candidate base URLs (primary first)
//! - Track the "current" endpoint shared by every outstanding request
//! - Produce the failover order for one request
//!
//! # Design Decisions
//! - The current index is an atomic behind a narrow accessor; nothing else
//!   mutates it
//! - Index survives stop/start so a known-good endpoint is not re-probed

use std::sync::atomic::{AtomicUsize, Ordering};

use url::Url;

use crate::net::types::ClientError;

/// Ordered endpoint list with a sticky current pointer.
#[derive(Debug)]
pub struct EndpointSet {
    urls: Vec<Url>,
    current: AtomicUsize,
}

impl EndpointSet {
    /// Parse and normalize the base URLs. Each base gets a trailing slash so
    /// relative status paths join underneath it.
    pub fn new<I, S>(raw: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut urls = Vec::new();
        for item in raw {
            let item = item.as_ref();
            let mut url = Url::parse(item).map_err(|e| ClientError::InvalidEndpoint {
                url: item.to_string(),
                reason: e.to_string(),
            })?;
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
            urls.push(url);
        }
        if urls.is_empty() {
            return Err(ClientError::NoEndpoints);
        }
        Ok(Self {
            urls,
            current: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn get(&self, index: usize) -> Option<&Url> {
        self.urls.get(index)
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire) % self.urls.len()
    }

    pub fn current(&self) -> &Url {
        &self.urls[self.current_index()]
    }

    /// Make `index` the current endpoint.
    pub fn promote(&self, index: usize) {
        if index >= self.urls.len() {
            return;
        }
        let previous = self.current.swap(index, Ordering::AcqRel);
        if previous != index {
            tracing::info!(
                from = %self.urls[previous % self.urls.len()],
                to = %self.urls[index],
                "Current endpoint changed"
            );
        }
    }

    /// Move past an exhausted endpoint, but only if no other request already
    /// moved the pointer. Returns the resulting current index.
    pub fn advance_from(&self, exhausted: usize) -> usize {
        let next = (exhausted + 1) % self.urls.len();
        match self
            .current
            .compare_exchange(exhausted, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => next,
            Err(actual) => actual % self.urls.len(),
        }
    }

    /// Indices to try for one request: current first, then the rest in list
    /// order, wrapping around.
    pub fn failover_order(&self) -> Vec<usize> {
        let start = self.current_index();
        (0..self.urls.len())
            .map(|offset| (start + offset) % self.urls.len())
            .collect()
    }
}
