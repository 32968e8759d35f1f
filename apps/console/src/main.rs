use std::{collections::HashSet, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use list_core::{
    query::last_page, BulkActionOutcome, FetchOutcome, HttpListApi, ListSession, QueryCommitSink,
    SessionOptions,
};
use shared::{
    domain::{BulkAction, RowId, SortKey},
    error::QueryParseError,
    protocol::QueryParams,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "console", about = "Browse and bulk-edit an admin collection")]
struct Cli {
    /// Collection to operate on, overriding the configured one.
    #[arg(long, global = true)]
    resource: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one page of the collection.
    List(QueryArgs),
    /// Apply an action to selected rows of the collection.
    Bulk(BulkArgs),
}

#[derive(Args, Debug, Default)]
struct QueryArgs {
    /// Deep-link query string to start from, e.g. `search=golf&page=2`.
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    search: Option<String>,
    /// Structured filter; an empty value clears the key.
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,
    /// `column`, `column:desc` or `-column`.
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    per_page: Option<u32>,
}

#[derive(Args, Debug)]
struct BulkArgs {
    action: ActionKind,
    /// New status for `set-status`.
    #[arg(long, required_if_eq("action", "set-status"))]
    status: Option<String>,
    #[arg(long, value_delimiter = ',', conflicts_with = "all")]
    ids: Vec<String>,
    /// Select every row matching the filter instead of listing ids.
    #[arg(long)]
    all: bool,
    /// Rows on the displayed page to leave out of `--all`.
    #[arg(long, value_delimiter = ',', requires = "all")]
    except: Vec<String>,
    #[command(flatten)]
    query: QueryArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActionKind {
    Delete,
    SetStatus,
}

impl BulkArgs {
    fn bulk_action(&self) -> Result<BulkAction> {
        match (self.action, &self.status) {
            (ActionKind::Delete, _) => Ok(BulkAction::Delete),
            (ActionKind::SetStatus, Some(status)) => Ok(BulkAction::SetStatus {
                status: status.clone(),
            }),
            (ActionKind::SetStatus, None) => bail!("set-status needs --status"),
        }
    }
}

impl QueryArgs {
    fn to_params(&self, default_page_size: u32) -> Result<QueryParams> {
        let mut params = match &self.query {
            Some(raw) => QueryParams::from_query_string(raw)
                .with_context(|| format!("invalid --query '{raw}'"))?,
            None => QueryParams {
                page_size: default_page_size,
                ..QueryParams::default()
            },
        };

        if let Some(search) = &self.search {
            params.search = search.clone();
        }
        for raw in &self.filters {
            let (key, value) = parse_filter(raw)?;
            params.filters.insert(key, value);
        }
        if let Some(raw) = &self.sort {
            let sort =
                SortKey::parse(raw).ok_or_else(|| QueryParseError::InvalidSort(raw.clone()))?;
            params.sort = Some(sort);
        }
        if let Some(page) = self.page {
            if page == 0 {
                return Err(QueryParseError::InvalidPage(page.to_string()).into());
            }
            params.page = page;
        }
        if let Some(per_page) = self.per_page {
            if per_page == 0 {
                return Err(QueryParseError::InvalidPageSize(per_page.to_string()).into());
            }
            params.page_size = per_page;
        }
        Ok(params)
    }
}

fn parse_filter(raw: &str) -> Result<(String, Option<String>)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("filter '{raw}' must look like KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("filter '{raw}' has an empty key");
    }
    let value = value.trim();
    Ok((key.to_string(), (!value.is_empty()).then(|| value.to_string())))
}

/// Prints the bookmarkable form of every committed query.
struct DeepLinkPrinter;

impl QueryCommitSink for DeepLinkPrinter {
    fn on_query_committed(&self, params: &QueryParams) {
        println!("link: ?{}", params.to_query_string());
    }
}

fn open_session(settings: &Settings, initial: QueryParams) -> Arc<ListSession> {
    let api = Arc::new(HttpListApi::new(
        settings.api_base_url.clone(),
        settings.resource.clone(),
    ));
    ListSession::new_with_dependencies(
        SessionOptions {
            initial,
            search_debounce: settings.search_debounce(),
        },
        api.clone(),
        api,
        Arc::new(DeepLinkPrinter),
    )
}

fn ensure_committed(outcome: FetchOutcome) -> Result<()> {
    match outcome {
        FetchOutcome::Committed => Ok(()),
        FetchOutcome::Failed(error) if error.requires_reauth() => {
            bail!("{error}; sign in again and retry")
        }
        FetchOutcome::Failed(error) => Err(error.into()),
        other => bail!("page load did not finish: {other:?}"),
    }
}

async fn print_page(session: &ListSession) -> Result<()> {
    for row in session.rows().await {
        println!("{}", serde_json::to_string(&row)?);
    }

    let committed = session.committed_query().await;
    let total = session.selection_snapshot().await.state.total_matching_filter;
    let last_page = last_page(total, committed.page_size);
    println!("page {} of {last_page}, {total} matching", committed.page);
    Ok(())
}

async fn run_list(settings: &Settings, args: &QueryArgs) -> Result<()> {
    let session = open_session(settings, args.to_params(settings.page_size)?);
    ensure_committed(session.refresh().await)?;
    print_page(&session).await
}

async fn run_bulk(settings: &Settings, args: &BulkArgs) -> Result<()> {
    let action = args.bulk_action()?;
    let session = open_session(settings, args.query.to_params(settings.page_size)?);
    ensure_committed(session.refresh().await)?;

    if args.all {
        session.toggle_current_page().await;
        if session.selection_snapshot().await.can_select_all_matching {
            session.select_all_matching_filter().await;
        }

        let shown: HashSet<RowId> = session.rows().await.into_iter().map(|row| row.id).collect();
        for raw in &args.except {
            let id = RowId::parse(raw);
            if !shown.contains(&id) {
                bail!("row {id} is not on the displayed page, only displayed rows can be excluded");
            }
            session.toggle_row(id).await;
        }
    } else {
        if args.ids.is_empty() {
            bail!("pass --ids or --all");
        }
        for raw in &args.ids {
            session.toggle_row(RowId::parse(raw)).await;
        }
    }

    let snapshot = session.selection_snapshot().await;
    info!(
        action = action.name(),
        selected = snapshot.effective_count,
        "sending bulk action"
    );

    match session.run_bulk_action(action).await {
        BulkActionOutcome::NothingSelected => {
            println!("nothing selected");
            Ok(())
        }
        BulkActionOutcome::Applied { affected, reload } => {
            println!("{affected} rows affected");
            ensure_committed(reload)?;
            print_page(&session).await
        }
        BulkActionOutcome::Failed(error) => Err(error.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(resource) = cli.resource {
        settings.resource = resource;
    }
    info!(
        base_url = %settings.api_base_url,
        resource = %settings.resource,
        "console starting"
    );

    match &cli.command {
        Command::List(args) => run_list(&settings, args).await,
        Command::Bulk(args) => run_bulk(&settings, args).await,
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
