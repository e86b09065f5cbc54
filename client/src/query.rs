//! Query orchestration: master enumeration, then per-server attribute
//! fetches fanned out over tokio tasks.
//!
//! In parallel mode every target runs as its own task and every requested
//! attribute of a target runs as a sub-task; the target task joins its
//! sub-tasks and then sends one [`ServerRecord`] down the result channel.
//! Serial mode walks the same steps one at a time on a single task. Both
//! modes route every fetch through the same timeout wrapper, so a given set
//! of server responses produces the same records either way; only arrival
//! order differs, and the collator restores that.
//!
//! There is no cap on in-flight fetches and no cancellation: each fetch ends
//! by itself or by its timeout.

use crate::error::{DirectoryError, FetchError};
use crate::record::{Attribute, AttributeResult, Selection, ServerRecord, Target};
use futures::future::join_all;
use log::{debug, info, warn};
use shared::{Player, Region, Rules, ServerInfo};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What to ask the master server for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    pub region: Region,
    /// Address to resume enumeration after (`0.0.0.0:0` for the start).
    pub start: String,
    /// Raw master filter string, e.g. `\gamedir\tf`.
    pub filter: String,
    pub timeout: Duration,
}

/// The query-protocol collaborator.
///
/// Implementations own all wire details; the orchestrator only sees
/// addresses and decoded attributes. Each call should honour `timeout`, but
/// the orchestrator enforces it regardless.
pub trait QueryBackend: Send + Sync + 'static {
    fn enumerate(
        &self,
        query: &DirectoryQuery,
    ) -> impl Future<Output = Result<Vec<String>, DirectoryError>> + Send;

    fn info(
        &self,
        address: &str,
        timeout: Duration,
    ) -> impl Future<Output = AttributeResult<ServerInfo>> + Send;

    fn rules(
        &self,
        address: &str,
        timeout: Duration,
    ) -> impl Future<Output = AttributeResult<Rules>> + Send;

    fn players(
        &self,
        address: &str,
        timeout: Duration,
    ) -> impl Future<Output = AttributeResult<Vec<Player>>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Serial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub mode: ExecutionMode,
    pub selection: Selection,
    /// Applied to every attribute fetch individually.
    pub timeout: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            selection: Selection::INFO_ONLY,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Multiset of fetch errors seen during a batch.
///
/// Cloning yields another handle onto the same tally, so concurrent fetch
/// tasks can record into it.
#[derive(Debug, Clone, Default)]
pub struct ErrorSummary {
    counts: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl ErrorSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, attribute: Attribute, error: &FetchError) {
        let key = format!("{}: {}", attribute, error);
        *self.counts().entry(key).or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.counts().values().sum()
    }

    /// Distinct errors with their counts, most frequent first.
    pub fn distinct(&self) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> = self
            .counts()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    // A fetch task that panicked mid-update leaves the counts usable.
    fn counts(&self) -> MutexGuard<'_, BTreeMap<String, usize>> {
        self.counts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct Orchestrator<B> {
    backend: Arc<B>,
    options: QueryOptions,
    errors: ErrorSummary,
}

impl<B: QueryBackend> Orchestrator<B> {
    pub fn new(backend: Arc<B>, options: QueryOptions, errors: ErrorSummary) -> Self {
        Self {
            backend,
            options,
            errors,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Asks the master server for the target list. Failure here is fatal for
    /// the invocation.
    pub async fn enumerate(&self, query: &DirectoryQuery) -> Result<Vec<Target>, DirectoryError> {
        info!(
            "Querying master server for region {} starting at {}",
            query.region, query.start
        );
        let addresses = self.backend.enumerate(query).await?;
        info!("Master server returned {} servers", addresses.len());

        Ok(addresses
            .into_iter()
            .enumerate()
            .map(|(index, address)| Target::from_directory(index, address))
            .collect())
    }

    /// Starts querying every target and returns the channel records arrive
    /// on. Exactly one record is sent per target; the channel closes after
    /// the last one.
    pub fn dispatch(&self, targets: Vec<Target>) -> mpsc::UnboundedReceiver<ServerRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Arc::clone(&self.backend);
        let options = self.options;
        let errors = self.errors.clone();

        debug!(
            "Dispatching {} targets ({:?} mode)",
            targets.len(),
            options.mode
        );

        tokio::spawn(async move {
            match options.mode {
                ExecutionMode::Serial => {
                    for target in targets {
                        let record = query_serial(&*backend, &target, &options, &errors).await;
                        if tx.send(record).is_err() {
                            warn!("Result receiver dropped, stopping serial queries");
                            break;
                        }
                    }
                }
                ExecutionMode::Parallel => {
                    let handles: Vec<(Target, JoinHandle<()>)> = targets
                        .into_iter()
                        .map(|target| {
                            let handle = {
                                let backend = Arc::clone(&backend);
                                let errors = errors.clone();
                                let tx = tx.clone();
                                let target = target.clone();
                                tokio::spawn(async move {
                                    let record =
                                        query_parallel(backend, &target, &options, &errors).await;
                                    let _ = tx.send(record);
                                })
                            };
                            (target, handle)
                        })
                        .collect();

                    let (targets, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
                    for (target, joined) in targets.iter().zip(join_all(handles).await) {
                        if let Err(e) = joined {
                            warn!("Query task for {} failed: {}", target.address, e);
                            let record = ServerRecord::failed(
                                target,
                                options.selection,
                                FetchError::Aborted(e.to_string()),
                            );
                            for (attribute, err) in record.errors() {
                                errors.record(attribute, err);
                            }
                            let _ = tx.send(record);
                        }
                    }
                }
            }
        });

        rx
    }

    /// Queries every target and returns the records in dispatch order.
    pub async fn query_all(&self, targets: Vec<Target>) -> Vec<ServerRecord> {
        let mut rx = self.dispatch(targets);
        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        records.sort_by_key(|r| r.index);
        records
    }
}

/// Runs one fetch under `timeout` and records its failure.
async fn fetch<T, F>(
    attribute: Attribute,
    address: &str,
    timeout: Duration,
    errors: &ErrorSummary,
    request: F,
) -> AttributeResult<T>
where
    F: Future<Output = AttributeResult<T>>,
{
    let result = match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout),
    };

    if let Err(e) = &result {
        debug!("{} {} failed: {}", address, attribute, e);
        errors.record(attribute, e);
    }
    result
}

/// Spawns one attribute fetch as its own task.
fn spawn_fetch<T, F>(
    attribute: Attribute,
    address: String,
    timeout: Duration,
    errors: ErrorSummary,
    request: F,
) -> JoinHandle<AttributeResult<T>>
where
    T: Send + 'static,
    F: Future<Output = AttributeResult<T>> + Send + 'static,
{
    tokio::spawn(async move { fetch(attribute, &address, timeout, &errors, request).await })
}

/// Waits for a sub-task; a task that died still produces a result.
async fn join_fetch<T>(
    attribute: Attribute,
    handle: Option<JoinHandle<AttributeResult<T>>>,
    errors: &ErrorSummary,
) -> Option<AttributeResult<T>> {
    let handle = handle?;
    Some(match handle.await {
        Ok(result) => result,
        Err(e) => {
            let error = FetchError::Aborted(e.to_string());
            errors.record(attribute, &error);
            Err(error)
        }
    })
}

async fn query_parallel<B: QueryBackend>(
    backend: Arc<B>,
    target: &Target,
    options: &QueryOptions,
    errors: &ErrorSummary,
) -> ServerRecord {
    let timeout = options.timeout;
    let selection = options.selection;

    let info = selection.info.then(|| {
        let backend = Arc::clone(&backend);
        let address = target.address.clone();
        spawn_fetch(
            Attribute::Info,
            address.clone(),
            timeout,
            errors.clone(),
            async move { backend.info(&address, timeout).await },
        )
    });
    let rules = selection.rules.then(|| {
        let backend = Arc::clone(&backend);
        let address = target.address.clone();
        spawn_fetch(
            Attribute::Rules,
            address.clone(),
            timeout,
            errors.clone(),
            async move { backend.rules(&address, timeout).await },
        )
    });
    let players = selection.players.then(|| {
        let backend = Arc::clone(&backend);
        let address = target.address.clone();
        spawn_fetch(
            Attribute::Players,
            address.clone(),
            timeout,
            errors.clone(),
            async move { backend.players(&address, timeout).await },
        )
    });

    let mut record = ServerRecord::new(target);
    record.info = join_fetch(Attribute::Info, info, errors).await;
    record.rules = join_fetch(Attribute::Rules, rules, errors).await;
    record.players = join_fetch(Attribute::Players, players, errors).await;

    debug!("{} done ({} errors)", target.address, record.errors().len());
    record
}

async fn query_serial<B: QueryBackend>(
    backend: &B,
    target: &Target,
    options: &QueryOptions,
    errors: &ErrorSummary,
) -> ServerRecord {
    let timeout = options.timeout;
    let address = target.address.as_str();
    let mut record = ServerRecord::new(target);

    if options.selection.info {
        record.info = Some(
            fetch(
                Attribute::Info,
                address,
                timeout,
                errors,
                backend.info(address, timeout),
            )
            .await,
        );
    }
    if options.selection.rules {
        record.rules = Some(
            fetch(
                Attribute::Rules,
                address,
                timeout,
                errors,
                backend.rules(address, timeout),
            )
            .await,
        );
    }
    if options.selection.players {
        record.players = Some(
            fetch(
                Attribute::Players,
                address,
                timeout,
                errors,
                backend.players(address, timeout),
            )
            .await,
        );
    }

    debug!("{} done ({} errors)", target.address, record.errors().len());
    record
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Instant};

    /// Scripted response for one address.
    #[derive(Debug, Clone, Default)]
    pub struct Script {
        pub delay: Duration,
        pub info: Option<FetchError>,
        pub rules: Option<FetchError>,
        pub players: Option<FetchError>,
        /// Never answers: every fetch sleeps far past any test timeout.
        pub hang: bool,
    }

    /// In-memory backend with per-address delays and outcomes.
    #[derive(Default)]
    pub struct MockBackend {
        pub scripts: HashMap<String, Script>,
        pub directory: Option<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl MockBackend {
        pub fn with(scripts: impl IntoIterator<Item = (String, Script)>) -> Self {
            Self {
                scripts: scripts.into_iter().collect(),
                ..Self::default()
            }
        }

        fn script(&self, address: &str) -> Script {
            self.scripts.get(address).cloned().unwrap_or_default()
        }

        async fn wait(&self, script: &Script) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if script.hang {
                sleep(Duration::from_secs(3600)).await;
            }
            sleep(script.delay).await;
        }
    }

    pub fn info_for(address: &str) -> ServerInfo {
        ServerInfo {
            name: format!("server {}", address),
            map: "de_dust2".to_string(),
            players: 3,
            max_players: 16,
            ..ServerInfo::default()
        }
    }

    impl QueryBackend for MockBackend {
        async fn enumerate(&self, query: &DirectoryQuery) -> Result<Vec<String>, DirectoryError> {
            match &self.directory {
                Some(list) => Ok(list.clone()),
                None => Err(DirectoryError::Timeout(query.timeout)),
            }
        }

        async fn info(&self, address: &str, _timeout: Duration) -> AttributeResult<ServerInfo> {
            let script = self.script(address);
            self.wait(&script).await;
            match script.info {
                Some(e) => Err(e),
                None => Ok(info_for(address)),
            }
        }

        async fn rules(&self, address: &str, _timeout: Duration) -> AttributeResult<Rules> {
            let script = self.script(address);
            self.wait(&script).await;
            match script.rules {
                Some(e) => Err(e),
                None => {
                    let mut rules = Rules::new();
                    rules.insert("sv_tags".to_string(), address.to_string());
                    Ok(rules)
                }
            }
        }

        async fn players(&self, address: &str, _timeout: Duration) -> AttributeResult<Vec<Player>> {
            let script = self.script(address);
            self.wait(&script).await;
            match script.players {
                Some(e) => Err(e),
                None => Ok(vec![Player::new(0, "alice", 5, 60.0)]),
            }
        }
    }

    fn options(mode: ExecutionMode, selection: Selection, timeout_ms: u64) -> QueryOptions {
        QueryOptions {
            mode,
            selection,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn test_one_record_per_target() {
        let backend = Arc::new(MockBackend::default());
        let orchestrator = Orchestrator::new(backend, QueryOptions::default(), ErrorSummary::new());
        let targets = Target::explicit_list((0..25).map(|i| format!("10.0.0.{}:27015", i)));

        let records = orchestrator.query_all(targets).await;
        assert_eq!(records.len(), 25);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.index, i);
            assert!(matches!(record.info, Some(Ok(_))));
            assert!(record.rules.is_none());
        }
    }

    #[tokio::test]
    async fn test_attribute_failures_are_isolated() {
        let backend = Arc::new(MockBackend::with([(
            "b".to_string(),
            Script {
                players: Some(FetchError::Unreachable("refused".into())),
                ..Script::default()
            },
        )]));
        let errors = ErrorSummary::new();
        let orchestrator = Orchestrator::new(
            backend,
            options(ExecutionMode::Parallel, Selection::ALL, 500),
            errors.clone(),
        );

        let records = orchestrator
            .query_all(Target::explicit_list(["a", "b", "c"]))
            .await;

        let b = &records[1];
        assert!(matches!(b.info, Some(Ok(_))));
        assert!(matches!(b.rules, Some(Ok(_))));
        assert!(matches!(b.players, Some(Err(FetchError::Unreachable(_)))));
        assert!(!b.is_unreachable());
        assert!(matches!(records[0].players, Some(Ok(_))));
        assert_eq!(errors.total(), 1);
        assert_eq!(
            errors.distinct(),
            vec![("players: unreachable: refused".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_hung_fetch_times_out() {
        let backend = Arc::new(MockBackend::with([(
            "slow".to_string(),
            Script {
                hang: true,
                ..Script::default()
            },
        )]));
        let errors = ErrorSummary::new();
        let orchestrator = Orchestrator::new(
            backend,
            options(ExecutionMode::Parallel, Selection::ALL, 50),
            errors.clone(),
        );

        let started = Instant::now();
        let records = orchestrator
            .query_all(Target::explicit_list(["fast", "slow"]))
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));

        assert!(matches!(records[0].info, Some(Ok(_))));
        assert_eq!(records[1].info, Some(Err(FetchError::Timeout)));
        assert_eq!(records[1].rules, Some(Err(FetchError::Timeout)));
        assert_eq!(records[1].players, Some(Err(FetchError::Timeout)));
        assert_eq!(errors.total(), 3);
    }

    #[tokio::test]
    async fn test_parallel_attributes_overlap() {
        let scripts = (0..4).map(|i| {
            (
                format!("s{}", i),
                Script {
                    delay: Duration::from_millis(100),
                    ..Script::default()
                },
            )
        });
        let backend = Arc::new(MockBackend::with(scripts));
        let orchestrator = Orchestrator::new(
            Arc::clone(&backend),
            options(ExecutionMode::Parallel, Selection::ALL, 2000),
            ErrorSummary::new(),
        );

        let started = Instant::now();
        let records = orchestrator
            .query_all(Target::explicit_list((0..4).map(|i| format!("s{}", i))))
            .await;
        // Twelve 100ms fetches; run one after another they would take 1.2s.
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(records.len(), 4);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn test_serial_matches_parallel() {
        let scripts = vec![
            (
                "a".to_string(),
                Script {
                    delay: Duration::from_millis(30),
                    ..Script::default()
                },
            ),
            (
                "b".to_string(),
                Script {
                    info: Some(FetchError::Malformed("bad header".into())),
                    ..Script::default()
                },
            ),
            (
                "c".to_string(),
                Script {
                    rules: Some(FetchError::Timeout),
                    ..Script::default()
                },
            ),
        ];
        let targets = Target::explicit_list(["a", "b", "c"]);

        let mut results = Vec::new();
        for mode in [ExecutionMode::Serial, ExecutionMode::Parallel] {
            let orchestrator = Orchestrator::new(
                Arc::new(MockBackend::with(scripts.clone())),
                options(mode, Selection::ALL, 1000),
                ErrorSummary::new(),
            );
            results.push(orchestrator.query_all(targets.clone()).await);
        }
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn test_selection_skips_attributes() {
        let backend = Arc::new(MockBackend::default());
        let orchestrator = Orchestrator::new(
            Arc::clone(&backend),
            options(
                ExecutionMode::Serial,
                Selection {
                    info: false,
                    rules: true,
                    players: false,
                },
                500,
            ),
            ErrorSummary::new(),
        );
        let records = orchestrator.query_all(Target::explicit_list(["x"])).await;
        assert!(records[0].info.is_none());
        assert!(records[0].players.is_none());
        assert!(matches!(records[0].rules, Some(Ok(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enumerate_numbers_targets() {
        let backend = MockBackend {
            directory: Some(vec!["10.0.0.1:27015".into(), "10.0.0.2:27015".into()]),
            ..MockBackend::default()
        };
        let orchestrator =
            Orchestrator::new(Arc::new(backend), QueryOptions::default(), ErrorSummary::new());
        let query = DirectoryQuery {
            region: Region::Europe,
            start: "0.0.0.0:0".into(),
            filter: String::new(),
            timeout: Duration::from_secs(1),
        };
        let targets = tokio_test::assert_ok!(orchestrator.enumerate(&query).await);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1], Target::from_directory(1, "10.0.0.2:27015"));
    }

    #[tokio::test]
    async fn test_enumerate_failure_propagates() {
        let orchestrator = Orchestrator::new(
            Arc::new(MockBackend::default()),
            QueryOptions::default(),
            ErrorSummary::new(),
        );
        let query = DirectoryQuery {
            region: Region::UsWest,
            start: "0.0.0.0:0".into(),
            filter: String::new(),
            timeout: Duration::from_millis(10),
        };
        let err = tokio_test::assert_err!(orchestrator.enumerate(&query).await);
        assert!(matches!(err, DirectoryError::Timeout(_)));
    }

    #[test]
    fn test_error_summary_is_shared_between_handles() {
        let summary = ErrorSummary::new();
        let other = summary.clone();
        summary.record(Attribute::Info, &FetchError::Timeout);
        other.record(Attribute::Info, &FetchError::Timeout);
        other.record(Attribute::Rules, &FetchError::Malformed("x".into()));

        assert_eq!(summary.total(), 3);
        assert_eq!(
            summary.distinct(),
            vec![
                ("info: timed out".to_string(), 2),
                ("rules: malformed response: x".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_error_summary_survives_poisoned_lock() {
        let summary = ErrorSummary::new();
        summary.record(Attribute::Info, &FetchError::Timeout);

        let handle = summary.clone();
        let panicked = std::thread::spawn(move || {
            let _guard = handle.counts.lock().unwrap();
            panic!("fetch task died holding the summary");
        })
        .join();
        assert!(panicked.is_err());
        assert!(summary.counts.is_poisoned());

        summary.record(Attribute::Players, &FetchError::Timeout);
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.distinct().len(), 2);
    }

    #[tokio::test]
    async fn test_serial_dispatch_streams_in_order() {
        let backend = Arc::new(MockBackend::default());
        let orchestrator = Orchestrator::new(
            Arc::clone(&backend),
            options(ExecutionMode::Serial, Selection::INFO_ONLY, 500),
            ErrorSummary::new(),
        );
        let mut rx = orchestrator.dispatch(Target::explicit_list(["a", "b", "c"]));

        let mut seen = Vec::new();
        while let Some(record) = rx.recv().await {
            seen.push((record.index, record.address));
        }
        assert_eq!(
            seen,
            vec![(0, "a".to_string()), (1, "b".to_string()), (2, "c".to_string())]
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }
}
