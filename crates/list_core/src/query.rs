//! Search/filter/sort/page state and the fetch lifecycle that keeps it in sync
//! with the server.
//!
//! The coordinator never sleeps and never performs I/O. Every operation hands
//! back either a [`DebounceTicket`] (the caller waits, then reports
//! [`QueryCoordinator::debounce_elapsed`]) or a [`FetchRequest`] (the caller
//! fetches, then reports [`QueryCoordinator::complete`]). Responses are matched
//! against the most recently issued [`RequestToken`]; anything older is stale
//! and dropped without touching state.

use std::time::Duration;

use shared::{
    domain::{FilterSignature, SortKey},
    protocol::{PageOfRows, QueryParams},
};
use tracing::debug;

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLifecycle {
    Idle,
    Debouncing { generation: u64 },
    InFlight { token: RequestToken },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTicket {
    pub generation: u64,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub token: RequestToken,
    pub params: QueryParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommittedPage {
    pub token: RequestToken,
    pub params: QueryParams,
    pub page: PageOfRows,
    pub signature: FilterSignature,
    pub signature_changed: bool,
}

/// Last page for `total` rows, never below 1.
pub fn last_page(total: u64, page_size: u32) -> u32 {
    let pages = total.div_ceil(u64::from(page_size.max(1))).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[derive(Debug)]
pub enum Completion<E> {
    Committed(CommittedPage),
    Stale {
        token: RequestToken,
    },
    /// The requested page came back empty although rows match (rows were
    /// removed since the page number was chosen). Nothing was committed.
    /// `retry` asks for the last existing page; it is `None` when newer
    /// search input is already waiting to be fetched.
    PastEnd {
        token: RequestToken,
        requested: u32,
        retry: Option<FetchRequest>,
    },
    Failed {
        token: RequestToken,
        error: E,
        restored: QueryParams,
    },
}

#[derive(Debug, Clone)]
pub struct QueryCoordinator {
    pending: QueryParams,
    committed: QueryParams,
    search_debounce: Duration,
    debounce_generation: u64,
    pending_debounce: Option<u64>,
    next_token: u64,
    latest: Option<(RequestToken, QueryParams)>,
    in_flight: Option<RequestToken>,
}

impl QueryCoordinator {
    pub fn new(initial: QueryParams) -> Self {
        Self::with_search_debounce(initial, DEFAULT_SEARCH_DEBOUNCE)
    }

    pub fn with_search_debounce(initial: QueryParams, search_debounce: Duration) -> Self {
        Self {
            pending: initial.clone(),
            committed: initial,
            search_debounce,
            debounce_generation: 0,
            pending_debounce: None,
            next_token: 0,
            latest: None,
            in_flight: None,
        }
    }

    pub fn lifecycle(&self) -> FetchLifecycle {
        if let Some(generation) = self.pending_debounce {
            FetchLifecycle::Debouncing { generation }
        } else if let Some(token) = self.in_flight {
            FetchLifecycle::InFlight { token }
        } else {
            FetchLifecycle::Idle
        }
    }

    /// The query the user has asked for, possibly not fetched yet.
    pub fn pending(&self) -> &QueryParams {
        &self.pending
    }

    /// The query behind the rows currently on screen.
    pub fn committed(&self) -> &QueryParams {
        &self.committed
    }

    pub fn current_signature(&self) -> FilterSignature {
        self.pending.signature()
    }

    pub fn committed_signature(&self) -> FilterSignature {
        self.committed.signature()
    }

    pub fn latest_token(&self) -> Option<RequestToken> {
        self.latest.as_ref().map(|(token, _)| *token)
    }

    /// Free-text input. Supersedes any debounce still pending.
    pub fn set_search(&mut self, value: impl Into<String>) -> DebounceTicket {
        self.pending.search = value.into();
        self.pending.page = 1;
        self.debounce_generation += 1;
        self.pending_debounce = Some(self.debounce_generation);
        DebounceTicket {
            generation: self.debounce_generation,
            delay: self.search_debounce,
        }
    }

    pub fn debounce_elapsed(&mut self, generation: u64) -> Option<FetchRequest> {
        if self.pending_debounce != Some(generation) {
            debug!(generation, "ignoring superseded debounce");
            return None;
        }
        Some(self.issue())
    }

    /// Fires a pending search debounce right away (the user pressed enter).
    pub fn flush_debounce(&mut self) -> Option<FetchRequest> {
        let generation = self.pending_debounce?;
        self.debounce_elapsed(generation)
    }

    pub fn set_structured_filter(
        &mut self,
        key: impl Into<String>,
        value: Option<String>,
    ) -> FetchRequest {
        self.pending.filters.insert(key.into(), value);
        self.pending.page = 1;
        self.issue()
    }

    pub fn set_page(&mut self, page: u32) -> FetchRequest {
        self.pending.page = page.max(1);
        self.issue()
    }

    pub fn set_sort(&mut self, sort: Option<SortKey>) -> FetchRequest {
        self.pending.sort = sort;
        self.pending.page = 1;
        self.issue()
    }

    pub fn set_page_size(&mut self, page_size: u32) -> FetchRequest {
        self.pending.page_size = page_size.max(1);
        self.pending.page = 1;
        self.issue()
    }

    /// Re-issues the pending query as is: explicit retry, reload after a
    /// bulk action, or the first load of a screen.
    pub fn refresh(&mut self) -> FetchRequest {
        self.issue()
    }

    pub fn complete<E>(
        &mut self,
        token: RequestToken,
        result: Result<PageOfRows, E>,
    ) -> Completion<E> {
        let params = match self.latest.take() {
            Some((latest, params)) if latest == token => params,
            other => {
                self.latest = other;
                debug!(token = token.0, "discarding stale response");
                return Completion::Stale { token };
            }
        };
        self.in_flight = None;

        match result {
            Ok(page) if page.rows.is_empty() && page.total > 0 => {
                let last = last_page(page.total, params.page_size);
                // Only ever step towards page 1, so a backend whose count and
                // rows disagree still ends with an empty commit.
                if last >= params.page {
                    return self.commit(token, params, page);
                }
                let retry = if self.pending_debounce.is_some() {
                    None
                } else {
                    self.pending.page = last;
                    Some(self.issue())
                };
                debug!(
                    token = token.0,
                    requested = params.page,
                    last_page = last,
                    "requested page no longer exists"
                );
                Completion::PastEnd {
                    token,
                    requested: params.page,
                    retry,
                }
            }
            Ok(page) => self.commit(token, params, page),
            Err(error) => {
                // Input typed after this fetch was issued still gets its turn.
                if self.pending_debounce.is_none() {
                    self.pending = self.committed.clone();
                }
                Completion::Failed {
                    token,
                    error,
                    restored: self.committed.clone(),
                }
            }
        }
    }

    fn commit<E>(
        &mut self,
        token: RequestToken,
        params: QueryParams,
        page: PageOfRows,
    ) -> Completion<E> {
        let previous = self.committed.signature();
        let signature = params.signature();
        let signature_changed = signature != previous;
        self.committed = params.clone();
        Completion::Committed(CommittedPage {
            token,
            params,
            page,
            signature,
            signature_changed,
        })
    }

    fn issue(&mut self) -> FetchRequest {
        self.pending_debounce = None;
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.latest = Some((token, self.pending.clone()));
        self.in_flight = Some(token);
        debug!(token = token.0, page = self.pending.page, "issuing fetch");
        FetchRequest {
            token,
            params: self.pending.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
