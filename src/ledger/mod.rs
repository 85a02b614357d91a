//! Request ledger - lifecycle tracking for triggered cycles
//!
//! Every accepted trigger gets exactly one entry that moves from `Pending`
//! to a single terminal state, `Fulfilled` or `Errored`, and never back.
//! The ledger is bounded: past capacity the oldest entry is evicted on the
//! next create, and a poller still holding that id sees it as unknown.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::Utc;

use crate::error::SentinelError;

/// Lifecycle state of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Fulfilled,
    Errored,
}

/// One caller-initiated decision cycle accepted by the ledger
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub request_id: String,
    pub state: RequestState,
    /// Set exactly when the request fulfilled
    pub response: Option<String>,
    /// Set exactly when the request errored
    pub error: Option<String>,
    /// Creation time in milliseconds
    pub created_at: i64,
    pub requester: String,
}

impl OracleRequest {
    pub fn is_terminal(&self) -> bool {
        self.state != RequestState::Pending
    }
}

struct LedgerInner {
    requests: HashMap<String, OracleRequest>,
    order: VecDeque<String>,
}

pub struct RequestLedger {
    inner: RwLock<LedgerInner>,
    capacity: usize,
}

impl RequestLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                requests: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Register a new pending request, evicting the oldest past capacity.
    pub fn create(&self, request_id: &str, requester: &str) -> Result<(), SentinelError> {
        let mut inner = self.inner.write().expect("request ledger lock poisoned");
        if inner.requests.contains_key(request_id) {
            return Err(SentinelError::DuplicateRequest(request_id.to_string()));
        }

        inner.requests.insert(
            request_id.to_string(),
            OracleRequest {
                request_id: request_id.to_string(),
                state: RequestState::Pending,
                response: None,
                error: None,
                created_at: Utc::now().timestamp_millis(),
                requester: requester.to_string(),
            },
        );
        inner.order.push_back(request_id.to_string());

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.requests.remove(&oldest);
            }
        }
        Ok(())
    }

    /// Move a pending request to `Fulfilled` with its response payload.
    pub fn fulfill(&self, request_id: &str, response: String) -> Result<(), SentinelError> {
        self.finish(request_id, Some(response), None)
    }

    /// Move a pending request to `Errored` with the failure message.
    pub fn fail(&self, request_id: &str, error: String) -> Result<(), SentinelError> {
        self.finish(request_id, None, Some(error))
    }

    fn finish(
        &self,
        request_id: &str,
        response: Option<String>,
        error: Option<String>,
    ) -> Result<(), SentinelError> {
        let mut inner = self.inner.write().expect("request ledger lock poisoned");
        let request = inner
            .requests
            .get_mut(request_id)
            .ok_or_else(|| SentinelError::RequestNotFound(request_id.to_string()))?;

        if request.state != RequestState::Pending {
            return Err(SentinelError::AlreadyFulfilled(request_id.to_string()));
        }

        if response.is_some() {
            request.state = RequestState::Fulfilled;
            request.response = response;
        } else {
            request.state = RequestState::Errored;
            request.error = error;
        }
        Ok(())
    }

    pub fn status(&self, request_id: &str) -> Result<OracleRequest, SentinelError> {
        self.inner
            .read()
            .expect("request ledger lock poisoned")
            .requests
            .get(request_id)
            .cloned()
            .ok_or_else(|| SentinelError::RequestNotFound(request_id.to_string()))
    }

    /// Most recent request ids, newest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        self.inner
            .read()
            .expect("request ledger lock poisoned")
            .order
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("request ledger lock poisoned")
            .requests
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
