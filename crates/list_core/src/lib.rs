use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::{BulkOutcome, BulkRequest, PageOfRows, QueryParams};

pub mod error;
pub mod http;
pub mod query;
pub mod selection;
pub mod session;

pub use error::{ErrorCategory, ErrorContext, SessionError};
pub use http::HttpListApi;
pub use query::{
    Completion, CommittedPage, DebounceTicket, FetchLifecycle, FetchRequest, QueryCoordinator,
    RequestToken, DEFAULT_SEARCH_DEBOUNCE,
};
pub use selection::{SelectionController, SelectionState};
pub use session::{
    BulkActionOutcome, FetchOutcome, ListSession, SelectionSnapshot, SessionEvent,
    SessionOptions,
};

/// Loads one page of a filtered collection.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, params: &QueryParams) -> Result<PageOfRows>;
}

/// Applies a bulk action to the rows described by a directive. Implementations
/// must accept both the enumerated and the all-except form.
#[async_trait]
pub trait BulkActionClient: Send + Sync {
    async fn bulk_apply(&self, request: &BulkRequest) -> Result<BulkOutcome>;
}

/// Receives the parameters of every committed page so the host can mirror
/// them into a bookmarkable location.
pub trait QueryCommitSink: Send + Sync {
    fn on_query_committed(&self, params: &QueryParams);
}

pub struct MissingPageFetcher;

#[async_trait]
impl PageFetcher for MissingPageFetcher {
    async fn fetch_page(&self, params: &QueryParams) -> Result<PageOfRows> {
        Err(anyhow!(
            "list backend unavailable for page {} of '{}'",
            params.page,
            params.search
        ))
    }
}

pub struct MissingBulkActionClient;

#[async_trait]
impl BulkActionClient for MissingBulkActionClient {
    async fn bulk_apply(&self, request: &BulkRequest) -> Result<BulkOutcome> {
        Err(anyhow!(
            "bulk endpoint unavailable for action {}",
            request.action.name()
        ))
    }
}

pub struct NoopQueryCommitSink;

impl QueryCommitSink for NoopQueryCommitSink {
    fn on_query_committed(&self, _params: &QueryParams) {}
}
