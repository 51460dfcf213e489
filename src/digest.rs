//! C6: Digest Engine. Orchestrates one `read` invocation: partitions groups
//! into cached/fresh, fetches and parses the fresh ones via the pipeline
//! coordinator, merges with cached snapshots, sorts, and persists the day's
//! state (§4.6).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::CoreConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::group_state::{self, GroupHistory};
use crate::identity;
use crate::model::{Feed, Group, Item, Snapshot};
use crate::pipeline::{self, FeedResult, RunContext};
use crate::seen_store::{self, SeenStore};

const AD_HOC_GROUP: &str = "main";

#[derive(Debug, Clone, Default)]
pub struct DigestRequest {
    pub groups: Vec<String>,
    pub ad_hoc_urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FailedFeed {
    pub url: String,
    pub group_name: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct DigestResult {
    pub items: Vec<Item>,
    pub failed_feeds: Vec<FailedFeed>,
}

pub struct DigestEngine<'c> {
    client: &'c reqwest::Client,
    state_dir: PathBuf,
    config: CoreConfig,
}

impl<'c> DigestEngine<'c> {
    pub fn new(client: &'c reqwest::Client, state_dir: impl Into<PathBuf>, config: CoreConfig) -> Self {
        Self { client, state_dir: state_dir.into(), config }
    }

    fn feeds_dir(&self) -> PathBuf {
        self.state_dir.join("feeds")
    }

    fn history_dir(&self) -> PathBuf {
        group_state::history_dir(&self.state_dir)
    }

    fn seen_store(&self) -> SeenStore {
        SeenStore::new(seen_store::default_path(&self.state_dir))
    }

    fn group_history(&self, group: &str) -> GroupHistory {
        GroupHistory::new(self.history_dir(), group)
    }

    /// Directory-creation failure is the one fatal I/O condition in this
    /// module (§7): everything downstream assumes these exist.
    fn ensure_state_dirs(&self) -> Result<()> {
        for dir in [self.state_dir.clone(), self.feeds_dir(), self.history_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| Error::Io { path: dir.display().to_string(), source: e })?;
        }
        Ok(())
    }

    /// Missing group file loads as an empty group, a local-recovery case
    /// (§7: "missing group file (treated as empty group)").
    fn load_group(&self, name: &str) -> Result<Group> {
        let path = self.feeds_dir().join(format!("{name}.json"));
        match std::fs::read_to_string(&path) {
            Ok(json) => {
                Group::parse_document(name, &json).map_err(|e| Error::Json { path: path.display().to_string(), source: e })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Group::new(name)),
            Err(e) => Err(Error::Io { path: path.display().to_string(), source: e }),
        }
    }

    fn save_group(&self, group: &Group) -> Result<()> {
        let path = self.feeds_dir().join(format!("{}.json", group.name));
        let json = group
            .to_document_json()
            .map_err(|e| Error::Json { path: path.display().to_string(), source: e })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::Io { path: tmp.display().to_string(), source: e })?;
        std::fs::rename(&tmp, &path).map_err(|e| Error::Io { path: path.display().to_string(), source: e })
    }

    pub async fn read(&self, request: &DigestRequest) -> Result<DigestResult> {
        self.ensure_state_dirs()?;
        let today = group_state::logical_today(self.config.day_start_hour);

        if !request.ad_hoc_urls.is_empty() {
            return self.read_ad_hoc(request).await;
        }

        let (cached_items, fresh_groups, loaded_groups) = self.partition(&request.groups, &today);

        let mut feeds: Vec<Feed> = Vec::new();
        let mut feed_group: Vec<(String, Option<String>)> = Vec::new();
        for name in &fresh_groups {
            let group = &loaded_groups[name];
            for feed in group.enabled_feeds() {
                feeds.push(feed.clone());
                feed_group.push((name.clone(), group.display_name.clone()));
            }
        }

        let seen: Arc<HashSet<u64>> = Arc::new(self.seen_store().load().unwrap_or_default());

        let contexts: Vec<RunContext> = feeds
            .iter()
            .zip(&feed_group)
            .map(|(feed, (gname, gdisp))| RunContext {
                feed_name: Some(feed.display_name().to_string()),
                group_name: Some(gname.clone()),
                group_display_name: gdisp.clone(),
                seen: Arc::clone(&seen),
                dedup_enabled: true,
                max_items_per_feed: self.config.max_items_per_feed,
            })
            .collect();

        let results = pipeline::run(self.client, &feeds, self.config.max_feed_size_bytes(), contexts).await;

        let mut fresh_items: Vec<Item> = Vec::new();
        let mut failed_feeds: Vec<FailedFeed> = Vec::new();
        let mut new_hashes: Vec<u64> = Vec::new();
        let mut feed_updates: HashMap<String, Vec<(String, Option<String>, Option<String>)>> = HashMap::new();

        for (i, result) in results.into_iter().enumerate() {
            let (gname, _) = &feed_group[i];
            let url = feeds[i].url.clone();
            match result {
                FeedResult::Items(items, etag, last_modified) => {
                    feed_updates.entry(gname.clone()).or_default().push((url, etag, last_modified));
                    for item in items {
                        if let Some(id) = item.identity() {
                            let hash = identity::identity_hash(id);
                            if seen.contains(&hash) {
                                continue;
                            }
                            new_hashes.push(hash);
                        }
                        fresh_items.push(item);
                    }
                }
                FeedResult::NotModified { etag, last_modified } => {
                    feed_updates.entry(gname.clone()).or_default().push((url, etag, last_modified));
                }
                FeedResult::Failed { kind, message } => {
                    failed_feeds.push(FailedFeed { url, group_name: Some(gname.clone()), kind, message });
                }
            }
        }

        self.persist(&fresh_groups, &loaded_groups, &feed_updates, &fresh_items, &new_hashes, &today);

        let mut items = cached_items;
        items.extend(fresh_items);
        sort_items(&mut items, &request.groups);

        Ok(DigestResult { items, failed_feeds })
    }

    /// Step 1: split requested groups into cached (interval gate satisfied
    /// and a latest snapshot is loadable) and fresh.
    fn partition(&self, groups: &[String], today: &str) -> (Vec<Item>, Vec<String>, HashMap<String, Group>) {
        let mut cached_items = Vec::new();
        let mut fresh_groups = Vec::new();
        let mut loaded = HashMap::new();

        for name in groups {
            let group = match self.load_group(name) {
                Ok(g) => g,
                Err(e) => {
                    tracing::warn!(group = %name, error = %e, "failed to load group, treating as empty");
                    Group::new(name)
                }
            };

            let history = self.group_history(name);
            let latest_date = history.latest_date().ok().flatten();
            let within_interval = latest_date
                .as_deref()
                .and_then(|d| group_state::days_between(d, today))
                .map(|age| age < i64::from(self.config.fetch_interval_days))
                .unwrap_or(false);

            let cached_snapshot = if within_interval {
                latest_date.as_deref().and_then(|d| history.load_date(d).ok().flatten())
            } else {
                None
            };

            match cached_snapshot {
                Some(snapshot) => {
                    for mut item in snapshot.items {
                        item.group_name = Some(name.clone());
                        item.group_display_name = group.display_name.clone();
                        cached_items.push(item);
                    }
                    loaded.insert(name.clone(), group);
                }
                None => {
                    fresh_groups.push(name.clone());
                    loaded.insert(name.clone(), group);
                }
            }
        }

        (cached_items, fresh_groups, loaded)
    }

    /// Step 7: feed save-back, snapshot save, seen-hash append, retention
    /// pruning. Every sub-step here is best-effort: a failure is logged and
    /// the rest of the read still completes (§7 propagation policy). The
    /// seen-hash store is shared across every group (§6), so it is appended
    /// and pruned once per read rather than per group.
    fn persist(
        &self,
        fresh_groups: &[String],
        loaded_groups: &HashMap<String, Group>,
        feed_updates: &HashMap<String, Vec<(String, Option<String>, Option<String>)>>,
        fresh_items: &[Item],
        new_hashes: &[u64],
        today: &str,
    ) {
        let seen_store = self.seen_store();
        seen_store.append(new_hashes);
        if let Err(e) = seen_store.prune(self.config.retention_days) {
            tracing::warn!(error = %e, "failed to prune seen-store");
        }

        for name in fresh_groups {
            let mut group = loaded_groups[name].clone();
            if let Some(updates) = feed_updates.get(name) {
                for (url, etag, last_modified) in updates {
                    if let Some(feed) = group.feeds.iter_mut().find(|f| &f.url == url) {
                        feed.etag = etag.clone();
                        feed.last_modified = last_modified.clone();
                    }
                }
            }
            if let Err(e) = self.save_group(&group) {
                tracing::warn!(group = %name, error = %e, "failed to save group back");
            }

            let group_items: Vec<Item> =
                fresh_items.iter().filter(|i| i.group_name.as_deref() == Some(name.as_str())).cloned().collect();
            let snapshot = Snapshot { timestamp: now_epoch(), items: group_items };
            let history = self.group_history(name);
            if let Err(e) = history.save_today(today, &snapshot) {
                tracing::warn!(group = %name, error = %e, "failed to save snapshot");
            }

            if let Err(e) = history.prune(today, self.config.retention_days) {
                tracing::warn!(group = %name, error = %e, "failed to prune history");
            }
        }
    }

    /// Ad-hoc mode (§4.6 Step 2): `cmd_line_feeds` bypasses groups entirely.
    /// Dedup is disabled and nothing is persisted.
    async fn read_ad_hoc(&self, request: &DigestRequest) -> Result<DigestResult> {
        let feeds: Vec<Feed> = request.ad_hoc_urls.iter().map(|u| Feed::new(u.clone())).collect();
        let contexts: Vec<RunContext> = feeds
            .iter()
            .map(|_| RunContext {
                feed_name: None,
                group_name: Some(AD_HOC_GROUP.to_string()),
                group_display_name: None,
                seen: Arc::new(HashSet::new()),
                dedup_enabled: false,
                max_items_per_feed: self.config.max_items_per_feed,
            })
            .collect();

        let results = pipeline::run(self.client, &feeds, self.config.max_feed_size_bytes(), contexts).await;

        let mut items = Vec::new();
        let mut failed_feeds = Vec::new();
        for (feed, result) in feeds.iter().zip(results) {
            match result {
                FeedResult::Items(found, _, _) => items.extend(found),
                FeedResult::NotModified { .. } => {}
                FeedResult::Failed { kind, message } => {
                    failed_feeds.push(FailedFeed {
                        url: feed.url.clone(),
                        group_name: Some(AD_HOC_GROUP.to_string()),
                        kind,
                        message,
                    });
                }
            }
        }

        sort_items(&mut items, &[]);
        Ok(DigestResult { items, failed_feeds })
    }
}

/// Step 6: group order (command-line order when the caller named more than
/// one group, else alphabetical), then feed name, then timestamp descending.
fn sort_items(items: &mut [Item], requested_order: &[String]) {
    let explicit = requested_order.len() > 1;
    items.sort_by(|a, b| {
        let ga = a.group_name.as_deref().unwrap_or("");
        let gb = b.group_name.as_deref().unwrap_or("");
        let group_cmp = if explicit {
            let ia = requested_order.iter().position(|g| g == ga).unwrap_or(usize::MAX);
            let ib = requested_order.iter().position(|g| g == gb).unwrap_or(usize::MAX);
            ia.cmp(&ib)
        } else {
            ga.cmp(gb)
        };
        group_cmp
            .then_with(|| a.feed_name.as_deref().unwrap_or("").cmp(b.feed_name.as_deref().unwrap_or("")))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
}

fn now_epoch() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
