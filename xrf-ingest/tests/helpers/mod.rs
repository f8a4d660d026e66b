//! Shared helpers for xrf-ingest integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use xrf_common::events::NormalizationDomain;
use xrf_ingest::models::RawReading;
use xrf_ingest::services::name_normalizer::system_instructions;
use xrf_ingest::services::{GroupingError, GroupingTransport, RetryPolicy, SemanticGroupingClient};

/// Policy with near-zero delays so retries don't slow the suite
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base: Duration::from_millis(1),
        min_interval: Duration::ZERO,
    }
}

/// In-memory SQLite pool with the crate's tables
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    xrf_ingest::db::init_tables(&pool).await.unwrap();
    pool
}

type Script = Mutex<VecDeque<Result<String, GroupingError>>>;

/// Transport replaying canned replies, one queue per domain
///
/// The domain is recognised from the system instructions of each request.
/// An exhausted queue answers with a permanent API error.
#[derive(Default)]
pub struct ScriptedTransport {
    component: Script,
    substrate: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<(NormalizationDomain, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, domain: NormalizationDomain, reply: Result<String, GroupingError>) -> Self {
        self.queue(domain).lock().unwrap().push_back(reply);
        self
    }

    pub fn reply_json(self, domain: NormalizationDomain, json: serde_json::Value) -> Self {
        self.reply(domain, Ok(json.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User messages sent so far, with the domain they were sent for
    pub fn requests(&self) -> Vec<(NormalizationDomain, String)> {
        self.requests.lock().unwrap().clone()
    }

    fn queue(&self, domain: NormalizationDomain) -> &Script {
        match domain {
            NormalizationDomain::Component => &self.component,
            NormalizationDomain::Substrate => &self.substrate,
        }
    }
}

#[async_trait]
impl GroupingTransport for ScriptedTransport {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GroupingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let domain = NormalizationDomain::all()
            .into_iter()
            .find(|d| system_instructions(*d) == system)
            .unwrap_or(NormalizationDomain::Component);
        self.requests
            .lock()
            .unwrap()
            .push((domain, user.to_string()));

        self.queue(domain)
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GroupingError::Api(500, "script exhausted".to_string())))
    }
}

/// Client over `transport` using [`fast_policy`]
pub fn client(transport: Arc<ScriptedTransport>) -> SemanticGroupingClient {
    SemanticGroupingClient::new(transport, fast_policy())
}

pub fn reading(id: &str, component: &str, substrate: Option<&str>, lead: f64) -> RawReading {
    RawReading::new(id, component, substrate, lead)
}
