//! Async runtime for one list screen: owns the query coordinator and the
//! selection controller, runs debounce timers and fetches, and applies
//! completed fetches to both in a single critical section.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{BulkAction, RowId, SortKey},
    protocol::{BulkRequest, Directive, QueryParams, Row},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::{ErrorContext, SessionError},
    query::{Completion, FetchLifecycle, FetchRequest, QueryCoordinator, DEFAULT_SEARCH_DEBOUNCE},
    selection::{SelectionController, SelectionState},
    BulkActionClient, MissingBulkActionClient, NoopQueryCommitSink, PageFetcher, QueryCommitSink,
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub initial: QueryParams,
    pub search_debounce: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            initial: QueryParams::default(),
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    PageCommitted {
        params: QueryParams,
        total: u64,
        selected: u64,
    },
    FetchFailed {
        error: SessionError,
        restored: QueryParams,
    },
    BulkActionCompleted {
        action: BulkAction,
        affected: u64,
    },
    BulkActionFailed(SessionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Committed,
    /// A newer fetch was issued before this one returned.
    Stale,
    /// Newer search input replaced the query before this call could commit.
    Superseded,
    Failed(SessionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkActionOutcome {
    NothingSelected,
    Applied { affected: u64, reload: FetchOutcome },
    Failed(SessionError),
}

/// Point-in-time view of the selection, everything a header checkbox, a
/// "select all N" banner and a bulk toolbar need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub state: SelectionState,
    pub effective_count: u64,
    pub page_fully_selected: bool,
    pub page_partially_selected: bool,
    pub can_select_all_matching: bool,
    pub directive: Directive,
}

struct SessionState {
    query: QueryCoordinator,
    selection: SelectionController,
    rows: Vec<Row>,
    debounce_timer: Option<JoinHandle<()>>,
}

pub struct ListSession {
    fetcher: Arc<dyn PageFetcher>,
    bulk: Arc<dyn BulkActionClient>,
    sink: Arc<dyn QueryCommitSink>,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ListSession {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Arc<Self> {
        Self::new_with_dependencies(
            SessionOptions::default(),
            fetcher,
            Arc::new(MissingBulkActionClient),
            Arc::new(NoopQueryCommitSink),
        )
    }

    pub fn new_with_dependencies(
        options: SessionOptions,
        fetcher: Arc<dyn PageFetcher>,
        bulk: Arc<dyn BulkActionClient>,
        sink: Arc<dyn QueryCommitSink>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let selection = SelectionController::new(options.initial.signature());
        Arc::new(Self {
            fetcher,
            bulk,
            sink,
            inner: Mutex::new(SessionState {
                query: QueryCoordinator::with_search_debounce(
                    options.initial,
                    options.search_debounce,
                ),
                selection,
                rows: Vec::new(),
                debounce_timer: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Debounced. Replacing the timer and recording the new search happen
    /// under one lock, so two timers for the search box never coexist.
    pub async fn set_search(self: &Arc<Self>, value: impl Into<String>) {
        let mut state = self.inner.lock().await;
        let ticket = state.query.set_search(value);
        if let Some(previous) = state.debounce_timer.take() {
            previous.abort();
        }

        let session = Arc::clone(self);
        state.debounce_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ticket.delay).await;
            let request = session
                .inner
                .lock()
                .await
                .query
                .debounce_elapsed(ticket.generation);
            // The fetch runs detached so a later keystroke cancels only the
            // timer; a response that lost the race is dropped on arrival.
            if let Some(request) = request {
                let fetcher = Arc::clone(&session);
                tokio::spawn(async move {
                    fetcher.execute(request).await;
                });
            }
        }));
    }

    /// Skips the remaining debounce delay, if any.
    pub async fn flush_search(&self) -> FetchOutcome {
        let request = {
            let mut state = self.inner.lock().await;
            if let Some(timer) = state.debounce_timer.take() {
                timer.abort();
            }
            state.query.flush_debounce()
        };
        match request {
            Some(request) => self.execute(request).await,
            None => FetchOutcome::Superseded,
        }
    }

    pub async fn set_structured_filter(
        &self,
        key: impl Into<String>,
        value: Option<String>,
    ) -> FetchOutcome {
        let request = self
            .inner
            .lock()
            .await
            .query
            .set_structured_filter(key, value);
        self.execute(request).await
    }

    pub async fn set_page(&self, page: u32) -> FetchOutcome {
        let request = self.inner.lock().await.query.set_page(page);
        self.execute(request).await
    }

    pub async fn set_sort(&self, sort: Option<SortKey>) -> FetchOutcome {
        let request = self.inner.lock().await.query.set_sort(sort);
        self.execute(request).await
    }

    pub async fn set_page_size(&self, page_size: u32) -> FetchOutcome {
        let request = self.inner.lock().await.query.set_page_size(page_size);
        self.execute(request).await
    }

    /// First load, explicit retry after a failure, or reload after a mutation.
    pub async fn refresh(&self) -> FetchOutcome {
        let request = self.inner.lock().await.query.refresh();
        self.execute(request).await
    }

    pub async fn toggle_row(&self, id: RowId) {
        self.inner.lock().await.selection.toggle_row(id);
    }

    pub async fn toggle_current_page(&self) {
        self.inner.lock().await.selection.toggle_current_page();
    }

    pub async fn select_all_matching_filter(&self) {
        self.inner.lock().await.selection.select_all_matching_filter();
    }

    pub async fn clear_selection(&self) {
        self.inner.lock().await.selection.clear_all_matching_filter();
    }

    pub async fn selection_snapshot(&self) -> SelectionSnapshot {
        let state = self.inner.lock().await;
        let selection = &state.selection;
        SelectionSnapshot {
            state: selection.state().clone(),
            effective_count: selection.effective_count(),
            page_fully_selected: selection.is_current_page_fully_selected(),
            page_partially_selected: selection.is_current_page_partially_selected(),
            can_select_all_matching: selection.can_select_all_matching_filter(),
            directive: selection.effective_directive(),
        }
    }

    pub async fn rows(&self) -> Vec<Row> {
        self.inner.lock().await.rows.clone()
    }

    pub async fn pending_query(&self) -> QueryParams {
        self.inner.lock().await.query.pending().clone()
    }

    pub async fn committed_query(&self) -> QueryParams {
        self.inner.lock().await.query.committed().clone()
    }

    pub async fn lifecycle(&self) -> FetchLifecycle {
        self.inner.lock().await.query.lifecycle()
    }

    /// Sends the current directive to the bulk endpoint. Success clears the
    /// selection (unless it was edited while the request was in flight) and
    /// reloads the page; failure keeps the selection so the user can retry.
    pub async fn run_bulk_action(&self, action: BulkAction) -> BulkActionOutcome {
        let request = {
            let state = self.inner.lock().await;
            if !state.selection.has_selection() {
                return BulkActionOutcome::NothingSelected;
            }
            BulkRequest {
                action: action.clone(),
                directive: state.selection.effective_directive(),
                filter_signature: state.selection.signature().clone(),
            }
        };

        match self.bulk.bulk_apply(&request).await {
            Ok(outcome) => {
                info!(
                    action = action.name(),
                    affected = outcome.affected,
                    "bulk action applied"
                );
                let reload = {
                    let mut state = self.inner.lock().await;
                    let unchanged = state.selection.effective_directive() == request.directive
                        && *state.selection.signature() == request.filter_signature;
                    if unchanged {
                        state.selection.reset();
                    } else {
                        info!(
                            action = action.name(),
                            "selection changed while the bulk action was in flight; keeping it"
                        );
                    }
                    state.query.refresh()
                };
                let _ = self.events.send(SessionEvent::BulkActionCompleted {
                    action,
                    affected: outcome.affected,
                });
                let reload = self.execute(reload).await;
                BulkActionOutcome::Applied {
                    affected: outcome.affected,
                    reload,
                }
            }
            Err(err) => {
                let error = SessionError::from_anyhow(ErrorContext::BulkAction, &err);
                warn!(action = action.name(), error = %error, "bulk action failed");
                let _ = self.events.send(SessionEvent::BulkActionFailed(error.clone()));
                BulkActionOutcome::Failed(error)
            }
        }
    }

    async fn execute(&self, request: FetchRequest) -> FetchOutcome {
        let mut request = request;
        loop {
            let result = self.fetcher.fetch_page(&request.params).await;

            let mut state = self.inner.lock().await;
            match state.query.complete(request.token, result) {
                Completion::Stale { token } => {
                    debug!(token = token.0, "dropped stale page");
                    return FetchOutcome::Stale;
                }
                Completion::PastEnd {
                    token,
                    requested,
                    retry,
                } => match retry {
                    Some(retry) => {
                        debug!(
                            token = token.0,
                            requested,
                            page = retry.params.page,
                            "stepping back to the last page"
                        );
                        request = retry;
                        continue;
                    }
                    None => return FetchOutcome::Superseded,
                },
                Completion::Failed {
                    token,
                    error,
                    restored,
                } => {
                    drop(state);
                    let error = SessionError::from_anyhow(ErrorContext::FetchPage, &error);
                    warn!(token = token.0, error = %error, "page fetch failed");
                    let _ = self.events.send(SessionEvent::FetchFailed {
                        error: error.clone(),
                        restored,
                    });
                    return FetchOutcome::Failed(error);
                }
                Completion::Committed(committed) => {
                    // Reset before the new page lands so no reader observes the
                    // old selection against the new filter.
                    state
                        .selection
                        .on_filter_signature_changed(committed.signature.clone());
                    state
                        .selection
                        .on_page_changed(committed.page.ids(), committed.page.total);
                    state.rows = committed.page.rows;
                    let selected = state.selection.effective_count();
                    drop(state);

                    info!(
                        token = committed.token.0,
                        page = committed.params.page,
                        total = committed.page.total,
                        "committed page"
                    );
                    self.sink.on_query_committed(&committed.params);
                    let _ = self.events.send(SessionEvent::PageCommitted {
                        params: committed.params,
                        total: committed.page.total,
                        selected,
                    });
                    return FetchOutcome::Committed;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
