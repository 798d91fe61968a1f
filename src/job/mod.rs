//! Job Pipeline (C6): a bounded-concurrency scheduler over the scraper
//! strategies, serializing same-(library,version) jobs and reconciling
//! state on startup (spec.md §4.6).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ScrapeDefaults;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{JobProgress, ScrapeOptions, VersionStatus};
use crate::store::{SetStatusFields, SqliteStore};
use crate::strategy::{GitHubScraperStrategy, LocalFileScraperStrategy, Strategy, WebScraperStrategy};

const PROGRESS_THROTTLE: Duration = Duration::from_secs(1);

/// A lightweight, cloneable view of a running job for `getJob`/`getJobs`
/// (spec.md §3 "Job (runtime)").
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: Uuid,
    pub library: String,
    pub version: Option<String>,
    pub status: VersionStatus,
    pub progress: JobProgress,
    pub error: Option<String>,
}

struct JobEntry {
    library: String,
    version: Option<String>,
    status: RwLock<VersionStatus>,
    progress: RwLock<JobProgress>,
    error: RwLock<Option<String>>,
    cancel: CancellationToken,
    done: Notify,
}

/// Bounded-concurrency dispatcher owning the job queue (spec.md §4.6
/// "Scheduling model"). Grounded on the teacher's download-manager runner
/// loop: a `Notify`-woken dispatcher, a lease-like active map, and a
/// per-key lock preventing two jobs from racing the same version.
pub struct JobPipeline {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    strategies: Vec<Arc<dyn Strategy>>,
    jobs: Mutex<HashMap<Uuid, Arc<JobEntry>>>,
    queue: Mutex<VecDeque<Uuid>>,
    queue_notify: Notify,
    semaphore: Arc<Semaphore>,
    key_locks: Mutex<HashMap<(String, String), Arc<Notify>>>,
    in_flight_keys: Mutex<HashSet<(String, String)>>,
    pending_options: Mutex<HashMap<Uuid, ScrapeOptions>>,
    running: AtomicBool,
    #[allow(dead_code)]
    defaults: ScrapeDefaults,
}

impl JobPipeline {
    pub fn new(store: Arc<SqliteStore>, embedder: Arc<dyn Embedder>, defaults: ScrapeDefaults) -> Self {
        Self {
            store,
            embedder,
            strategies: vec![
                Arc::new(WebScraperStrategy::new()),
                Arc::new(GitHubScraperStrategy::new()),
                Arc::new(LocalFileScraperStrategy::new()),
            ],
            jobs: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
            semaphore: Arc::new(Semaphore::new(defaults.max_job_concurrency)),
            key_locks: Mutex::new(HashMap::new()),
            in_flight_keys: Mutex::new(HashSet::new()),
            pending_options: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            defaults,
        }
    }

    fn select_strategy(&self, url: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.iter().find(|s| s.can_handle(url)).cloned()
    }

    /// Queue a new crawl. Returns the job id immediately (spec.md §4.6
    /// "enqueueJob").
    pub async fn enqueue_job(&self, options: ScrapeOptions) -> Result<Uuid> {
        if self.select_strategy(&options.url).is_none() {
            return Err(Error::Tool(format!("no strategy can handle URL: {}", options.url)));
        }

        let id = Uuid::new_v4();
        let entry = Arc::new(JobEntry {
            library: options.library.clone(),
            version: if options.version.is_empty() {
                None
            } else {
                Some(options.version.clone())
            },
            status: RwLock::new(VersionStatus::Queued),
            progress: RwLock::new(JobProgress::default()),
            error: RwLock::new(None),
            cancel: CancellationToken::new(),
            done: Notify::new(),
        });

        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(id, entry);
        }
        {
            let mut queue = self.queue.lock().await;
            queue.push_back(id);
        }

        self.store_options(id, options).await;
        self.queue_notify.notify_one();
        Ok(id)
    }

    async fn store_options(&self, id: Uuid, options: ScrapeOptions) {
        let mut pending = self.pending_options.lock().await;
        pending.insert(id, options);
    }

    pub async fn get_job(&self, id: Uuid) -> Option<JobView> {
        let jobs = self.jobs.lock().await;
        let entry = jobs.get(&id)?;
        Some(Self::view_of(&id, entry).await)
    }

    pub async fn get_jobs(&self) -> Vec<JobView> {
        let jobs = self.jobs.lock().await;
        let mut out = Vec::with_capacity(jobs.len());
        for (id, entry) in jobs.iter() {
            out.push(Self::view_of(id, entry).await);
        }
        out
    }

    async fn view_of(id: &Uuid, entry: &Arc<JobEntry>) -> JobView {
        JobView {
            id: *id,
            library: entry.library.clone(),
            version: entry.version.clone(),
            status: *entry.status.read().await,
            progress: *entry.progress.read().await,
            error: entry.error.read().await.clone(),
        }
    }

    /// Block until the job reaches a terminal state (spec.md §4.6
    /// "waitForJobCompletion").
    pub async fn wait_for_job_completion(&self, id: Uuid) -> Result<VersionStatus> {
        loop {
            let entry = {
                let jobs = self.jobs.lock().await;
                jobs.get(&id).cloned()
            };
            let Some(entry) = entry else {
                return Err(Error::Tool(format!("unknown job: {id}")));
            };
            let status = *entry.status.read().await;
            if status.is_terminal() {
                return Ok(status);
            }
            entry.done.notified().await;
        }
    }

    /// Signal cancellation; never transitions a job to `FAILED` (spec.md
    /// §4.6 "cancellation never yields FAILED").
    pub async fn cancel_job(&self, id: Uuid) -> Result<()> {
        let jobs = self.jobs.lock().await;
        let entry = jobs.get(&id).ok_or_else(|| Error::Tool(format!("unknown job: {id}")))?;
        entry.cancel.cancel();
        Ok(())
    }

    pub async fn clear_completed_jobs(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let mut removed = 0;
        let mut remove_ids = Vec::new();
        for (id, entry) in jobs.iter() {
            if entry.status.read().await.is_terminal() {
                remove_ids.push(*id);
            }
        }
        for id in remove_ids {
            jobs.remove(&id);
            removed += 1;
        }
        removed
    }

    /// Start the dispatcher loop. Idempotent: subsequent calls are no-ops
    /// while already running.
    pub fn start(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.dispatch_loop().await;
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue_notify.notify_one();
    }

    async fn dispatch_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let next_id = {
                let mut queue = self.queue.lock().await;
                queue.pop_front()
            };
            let Some(id) = next_id else {
                self.queue_notify.notified().await;
                continue;
            };

            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };

            let pipeline = Arc::clone(&self);
            tokio::spawn(async move {
                pipeline.run_one(id).await;
                drop(permit);
                pipeline.queue_notify.notify_one();
            });
        }
    }

    async fn key_lock(&self, key: (String, String)) -> Arc<Notify> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(key).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    async fn run_one(self: Arc<Self>, id: Uuid) {
        let options = {
            let mut pending = self.pending_options.lock().await;
            pending.remove(&id)
        };
        let Some(options) = options else { return };

        let key = (options.library.clone(), options.version.clone());
        // Serialize jobs targeting the same (library, version): acquire the
        // notify, spin if another job currently owns this key.
        loop {
            let mut in_flight = self.in_flight_keys.lock().await;
            if in_flight.contains(&key) {
                let notify = self.key_lock(key.clone()).await;
                drop(in_flight);
                notify.notified().await;
                continue;
            }
            in_flight.insert(key.clone());
            break;
        }

        let entry = {
            let jobs = self.jobs.lock().await;
            jobs.get(&id).cloned()
        };
        let Some(entry) = entry else { return };

        let result = self.execute(&entry, options).await;

        {
            let mut status = entry.status.write().await;
            *status = match &result {
                Ok(()) => VersionStatus::Completed,
                Err(e) if e.is_cancellation() => VersionStatus::Cancelled,
                Err(_) => VersionStatus::Failed,
            };
        }
        if let Err(e) = &result {
            if !e.is_cancellation() {
                *entry.error.write().await = Some(e.to_string());
            }
        }
        entry.done.notify_waiters();

        {
            let mut in_flight = self.in_flight_keys.lock().await;
            in_flight.remove(&key);
        }
        let notify = self.key_lock(key).await;
        notify.notify_one();
    }

    async fn execute(&self, entry: &Arc<JobEntry>, options: ScrapeOptions) -> Result<()> {
        let strategy = self
            .select_strategy(&options.url)
            .ok_or_else(|| Error::Tool(format!("no strategy can handle URL: {}", options.url)))?;

        let library_id = self.store.resolve_or_create_library(&options.library).await?;
        let had_completed = self
            .store
            .get_version(&options.library, &options.version)
            .await?
            .map(|v| v.status == VersionStatus::Completed)
            .unwrap_or(false);
        let version_id = self
            .store
            .resolve_or_create_version(library_id, &options.version)
            .await?;

        let running_status = if had_completed {
            VersionStatus::Updating
        } else {
            VersionStatus::Running
        };
        *entry.status.write().await = running_status;
        self.store
            .set_version_status(
                version_id,
                running_status,
                SetStatusFields {
                    started_at: Some(true),
                    source_url: Some(Some(options.url.clone())),
                    ..Default::default()
                },
            )
            .await?;

        let max_pages = options.max_pages;
        let entry_for_progress = Arc::clone(entry);
        let store_for_progress = Arc::clone(&self.store);
        let last_write = Arc::new(std::sync::Mutex::new(Instant::now() - PROGRESS_THROTTLE));
        let progress_cb = move |pages: u32, total: u32| {
            let entry = Arc::clone(&entry_for_progress);
            let store = Arc::clone(&store_for_progress);
            let last_write = Arc::clone(&last_write);
            let should_write = {
                let mut guard = last_write.lock().unwrap();
                let now = Instant::now();
                let due = now.duration_since(*guard) >= PROGRESS_THROTTLE || pages == total || pages % 20 == 0;
                if due {
                    *guard = now;
                }
                due
            };
            tokio::spawn(async move {
                *entry.progress.write().await = JobProgress { pages, max_pages: total };
                if should_write {
                    let _ = store
                        .set_version_status(
                            version_id,
                            running_status,
                            SetStatusFields {
                                progress_pages: Some(pages as i64),
                                progress_max_pages: Some(total as i64),
                                ..Default::default()
                            },
                        )
                        .await;
                }
            });
        };

        let documents = strategy
            .scrape(&options, &progress_cb, &entry.cancel)
            .await?;

        let _ = max_pages;
        let embedder: Option<&dyn Embedder> = if self.embedder.dimensions() > 0 {
            Some(self.embedder.as_ref())
        } else {
            None
        };
        self.store
            .upsert_documents_for_version(library_id, version_id, documents, embedder)
            .await?;

        self.store
            .set_version_status(version_id, VersionStatus::Completed, SetStatusFields::default())
            .await?;
        Ok(())
    }

    /// Reconcile any jobs left `RUNNING`/`QUEUED` by a prior process
    /// (spec.md §4.6 "reconciliation on startup").
    pub async fn reconcile_on_startup(&self) -> Result<u64> {
        self.store.reconcile_on_startup().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScrapeDefaults;
    use crate::embedding::DisabledEmbedder;
    use crate::models::{Scope, ScrapeMode};

    fn opts(url: &str, library: &str) -> ScrapeOptions {
        ScrapeOptions {
            url: url.to_string(),
            library: library.to_string(),
            version: String::new(),
            scope: Scope::Subpages,
            max_pages: 10,
            max_depth: 3,
            max_concurrency: 3,
            follow_redirects: true,
            ignore_errors: true,
            scrape_mode: ScrapeMode::Fetch,
            include_patterns: vec![],
            exclude_patterns: None,
            headers: vec![],
        }
    }

    #[tokio::test]
    async fn enqueue_rejects_unknown_scheme() {
        let store = SqliteStore::open(&std::env::temp_dir().join("dh_job_test_unknown.sqlite"), 8)
            .await
            .unwrap();
        let pipeline = JobPipeline::new(
            Arc::new(store),
            Arc::new(DisabledEmbedder),
            ScrapeDefaults::default(),
        );
        let result = pipeline.enqueue_job(opts("ftp://example.com", "lib")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn enqueue_accepts_known_scheme_and_is_queued() {
        let path = std::env::temp_dir().join("dh_job_test_queue.sqlite");
        let _ = std::fs::remove_file(&path);
        let store = SqliteStore::open(&path, 8).await.unwrap();
        let pipeline = JobPipeline::new(
            Arc::new(store),
            Arc::new(DisabledEmbedder),
            ScrapeDefaults::default(),
        );
        let id = pipeline.enqueue_job(opts("https://example.com", "lib")).await.unwrap();
        let job = pipeline.get_job(id).await.unwrap();
        assert_eq!(job.status, VersionStatus::Queued);
    }
}
