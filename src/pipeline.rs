//! C5: Pipeline Coordinator. Drives fetch→parse concurrency: as each
//! transfer completes, a parse task is dispatched on a worker pool sized to
//! hardware parallelism; results land in `results[i]` keyed by input index,
//! never by completion order (§4.5, §5).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bumpalo::Bump;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::ErrorKind;
use crate::fetcher::{self, FetchOutcome};
use crate::identity;
use crate::model::{Feed, Item};
use crate::parser;

#[derive(Debug, Clone)]
pub enum FeedResult {
    Items(Vec<Item>, Option<String>, Option<String>),
    NotModified { etag: Option<String>, last_modified: Option<String> },
    Failed { kind: ErrorKind, message: String },
}

impl Default for FeedResult {
    fn default() -> Self {
        FeedResult::Failed { kind: ErrorKind::NetworkError, message: "not attempted".to_string() }
    }
}

pub struct RunContext {
    pub feed_name: Option<String>,
    pub group_name: Option<String>,
    pub group_display_name: Option<String>,
    pub seen: Arc<HashSet<u64>>,
    pub dedup_enabled: bool,
    pub max_items_per_feed: u32,
}

/// Fetch then parse `feeds`, returning one [`FeedResult`] per input index.
/// Parse work runs on a `JoinSet` bounded by a semaphore sized to
/// `num_cpus::get()`; `JoinSet::join_next`'s happens-before guarantee is the
/// release/acquire boundary the §5 resource model calls for — every parse
/// worker's write into its `results[i]` slot is visible to this function's
/// caller once its join completes.
pub async fn run(
    client: &reqwest::Client,
    feeds: &[Feed],
    max_body_bytes: usize,
    contexts: Vec<RunContext>,
) -> Vec<FeedResult> {
    debug_assert_eq!(feeds.len(), contexts.len());

    let results: Arc<Mutex<Vec<FeedResult>>> =
        Arc::new(Mutex::new((0..feeds.len()).map(|_| FeedResult::default()).collect()));
    let contexts: Arc<Vec<RunContext>> = Arc::new(contexts);
    let parse_semaphore = Arc::new(Semaphore::new(num_cpus::get().max(1)));
    let mut parse_tasks: JoinSet<()> = JoinSet::new();

    {
        let on_complete = |index: usize, outcome: FetchOutcome| match outcome {
            FetchOutcome::NotModified { etag, last_modified } => {
                results.lock().unwrap()[index] = FeedResult::NotModified { etag, last_modified };
            }
            FetchOutcome::Failed(err) => {
                results.lock().unwrap()[index] = FeedResult::Failed { kind: err.kind, message: err.message };
            }
            FetchOutcome::Success { body, etag, last_modified, .. } => {
                let permit = Arc::clone(&parse_semaphore);
                let results = Arc::clone(&results);
                let contexts = Arc::clone(&contexts);
                let url = feeds[index].url.clone();
                // Dispatched the moment this transfer completes, not after
                // the whole batch finishes — other transfers keep streaming
                // in while this parse runs (§4.5 step 3).
                parse_tasks.spawn(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                    let outcome = parse_and_tag(&body, &url, &contexts[index]);
                    results.lock().unwrap()[index] = match outcome {
                        Ok(items) => FeedResult::Items(items, etag, last_modified),
                        Err((kind, message)) => FeedResult::Failed { kind, message },
                    };
                });
            }
        };
        fetcher::fetch_all(client, feeds, max_body_bytes, on_complete).await;
    }

    // Drain the parse pool: every `join_next()` return happens-after that
    // worker's write into `results[i]` (§5, §9).
    while parse_tasks.join_next().await.is_some() {}

    Arc::try_unwrap(results).unwrap().into_inner().unwrap()
}

fn parse_and_tag(body: &[u8], url: &str, ctx: &RunContext) -> Result<Vec<Item>, (ErrorKind, String)> {
    let bump = Bump::new();
    let mut collected: Vec<Item> = Vec::new();
    let mut abort_cb = |parsed: &crate::model::ParsedItem<'_>| {
        if !ctx.dedup_enabled {
            return false;
        }
        let raw = parsed.guid.or(parsed.link);
        match raw {
            Some(raw) => ctx.seen.contains(&identity::identity_hash(raw)),
            None => false,
        }
    };

    let parsed = parser::parse(&bump, body, url, Some(&mut abort_cb)).map_err(|e| (e.kind(), e.to_string()))?;

    for item in parsed.items {
        if ctx.max_items_per_feed != 0 && collected.len() as u32 >= ctx.max_items_per_feed {
            break;
        }
        let pub_date = item.pub_date;
        let timestamp = pub_date.map(crate::parser::date::parse_timestamp).unwrap_or(0);
        collected.push(item.into_owned(
            timestamp,
            ctx.feed_name.clone(),
            ctx.group_name.clone(),
            ctx.group_display_name.clone(),
        ));
    }

    Ok(collected)
}
