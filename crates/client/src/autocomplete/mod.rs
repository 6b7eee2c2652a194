// Autocompletion Index Builder.
//
// Discovers the property names reachable from the root scope by sending
// batched introspection commands through the dispatcher, collects the
// sentinel-tagged answers handed over by the router, and persists the
// finished index. Round advancement and ingestion both mutate `Discovery`
// under one lock; ingestion wakes the waiting round through `wake`.

pub mod cache;
pub mod frontier;
pub mod index;
pub mod sentinel;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::output::OutputSink;
use frontier::Frontier;
pub use index::{Completer, CompletionIndex, PATH_SEPARATOR, ROOT_SCOPE};
use sentinel::Sentinel;

/// Names per introspection command.
pub const CHUNK_SIZE: usize = 20;
/// A round ends early once fewer names than this are awaiting a response.
pub const EARLY_EXIT_BELOW: usize = 20;

const ROUND_TIMEOUT: Duration = Duration::from_secs(60);
const ROUND_GRACE: Duration = Duration::from_secs(5);

/// Where introspection commands go.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn submit(&self, command: String);
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub path: PathBuf,
    pub max_age: TimeDelta,
}

#[derive(Debug, Default)]
struct Discovery {
    index: CompletionIndex,
    frontier: Frontier,
    sentinel: Option<Sentinel>,
}

pub struct IndexBuilder {
    commands: Arc<dyn CommandSink>,
    output: Arc<dyn OutputSink>,
    cache: CacheSettings,
    discovery: Mutex<Discovery>,
    wake: Notify,
    completer: RwLock<Option<Arc<Completer>>>,
}

impl IndexBuilder {
    pub fn new(
        commands: Arc<dyn CommandSink>,
        output: Arc<dyn OutputSink>,
        cache: CacheSettings,
    ) -> Self {
        Self {
            commands,
            output,
            cache,
            discovery: Mutex::new(Discovery::default()),
            wake: Notify::new(),
            completer: RwLock::new(None),
        }
    }

    /// Adopt a fresh cache or run discovery, then publish the index.
    pub async fn run(self: Arc<Self>) {
        if !self.load_cache() {
            self.rebuild().await;
        }
    }

    /// Publish the persisted index if it is fresh. Needs no connection.
    pub fn load_cache(&self) -> bool {
        match cache::read(&self.cache.path) {
            Ok(Some(snapshot)) if snapshot.is_fresh(Utc::now(), self.cache.max_age) => {
                info!(scopes = snapshot.index.len(), "loaded autocomplete cache");
                self.publish(snapshot.index);
                return true;
            }
            Ok(Some(_)) => info!("autocomplete cache is stale, rebuilding"),
            Ok(None) => debug!(path = %self.cache.path.display(), "no autocomplete cache"),
            Err(error) => warn!(%error, "ignoring unreadable autocomplete cache"),
        }
        false
    }

    /// Run discovery against the live session and persist the result.
    pub async fn rebuild(&self) {
        self.output.status("Creating autocompletion data.");
        let index = self.discover().await;
        self.output.status("Finished loading autocompletion data.");

        match cache::write(&self.cache.path, &index, Utc::now()) {
            Ok(()) => {
                info!(scopes = index.len(), path = %self.cache.path.display(), "saved autocomplete cache");
            }
            Err(error) => {
                warn!(%error, "failed to save autocomplete cache");
                self.output.failure(&format!("Failed to save autocompletion data: {error}"));
            }
        }
        self.publish(index);
    }

    async fn discover(&self) -> CompletionIndex {
        let sentinel = self.begin_discovery();
        let mut round = 0_u32;
        loop {
            let names = {
                let mut guard = self.lock_discovery();
                let discovery = &mut *guard;
                discovery.frontier.advance(&discovery.index)
            };
            if names.is_empty() {
                break;
            }
            round += 1;
            debug!(round, names = names.len(), "discovery round");

            let sends = names
                .chunks(CHUNK_SIZE)
                .map(|chunk| {
                    let command = sentinel.introspection_command(chunk);
                    let commands = self.commands.clone();
                    tokio::spawn(async move { commands.submit(command).await })
                })
                .collect();
            self.await_round(sends).await;
        }

        let mut discovery = self.lock_discovery();
        discovery.sentinel = None;
        discovery.frontier = Frontier::default();
        info!(rounds = round, scopes = discovery.index.len(), "discovery finished");
        std::mem::take(&mut discovery.index)
    }

    fn begin_discovery(&self) -> Sentinel {
        let sentinel = Sentinel::generate();
        *self.lock_discovery() = Discovery {
            index: CompletionIndex::default(),
            frontier: Frontier::seeded(ROOT_SCOPE),
            sentinel: Some(sentinel.clone()),
        };
        sentinel
    }

    /// Wait until the round's sends are done and the timeout has elapsed, or
    /// until fewer than [`EARLY_EXIT_BELOW`] names remain in flight; then give
    /// stragglers a short grace period.
    async fn await_round(&self, sends: Vec<JoinHandle<()>>) {
        let deadline = async move {
            for send in sends {
                let _ = send.await;
            }
            tokio::time::sleep(ROUND_TIMEOUT).await;
        };
        tokio::pin!(deadline);

        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() < EARLY_EXIT_BELOW {
                break;
            }
            tokio::select! {
                () = &mut deadline => {
                    debug!(in_flight = self.in_flight(), "discovery round timed out");
                    break;
                }
                () = &mut notified => {}
            }
        }

        if self.in_flight() > 0 {
            tokio::time::sleep(ROUND_GRACE).await;
        }
    }

    fn in_flight(&self) -> usize {
        self.lock_discovery().frontier.in_flight_len()
    }

    /// Whether `line` carries the current run's sentinel.
    pub fn is_definition(&self, line: &str) -> bool {
        self.lock_discovery().sentinel.as_ref().is_some_and(|sentinel| sentinel.matches(line))
    }

    /// Ingest introspection lines. Lines with another run's keyword, or
    /// arriving outside discovery, are ignored.
    pub fn load_definition(&self, text: &str) {
        let mut failures = Vec::new();
        {
            let mut guard = self.lock_discovery();
            let discovery = &mut *guard;
            let Some(sentinel) = discovery.sentinel.as_ref() else {
                debug!("ignoring definition outside discovery");
                return;
            };

            for line in text.split('\n') {
                match sentinel.parse(line) {
                    None => debug!(line, "ignoring line without current sentinel"),
                    Some(Err(error)) => failures.push(error),
                    Some(Ok(definition)) => {
                        let children = frontier::children(&definition.name, &definition.properties);
                        discovery.index.insert(definition.name.clone(), definition.properties);
                        discovery.frontier.complete(&definition.name);
                        discovery.frontier.expand(children, &discovery.index);
                    }
                }
            }
        }
        self.wake.notify_waiters();

        for error in failures {
            warn!(%error, "dropping autocomplete definition");
            self.output.failure(&error.to_string());
        }
    }

    /// Completions from the published index, or from the partial index while
    /// discovery is still running.
    pub fn completions_for(&self, text: &str) -> Vec<String> {
        if let Some(completer) = self.completer() {
            return completer.completions_for(text);
        }
        self.lock_discovery().index.completions_for(text)
    }

    pub fn completer(&self) -> Option<Arc<Completer>> {
        self.completer.read().ok().and_then(|slot| slot.clone())
    }

    fn publish(&self, index: CompletionIndex) {
        let completer = Arc::new(Completer::new(index));
        match self.completer.write() {
            Ok(mut slot) => *slot = Some(completer),
            Err(poisoned) => *poisoned.into_inner() = Some(completer),
        }
    }

    fn lock_discovery(&self) -> MutexGuard<'_, Discovery> {
        self.discovery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{OnceLock, Weak};

    use tempfile::TempDir;

    use super::*;
    use crate::output::{LineKind, MemorySink};
    use crate::testing::wait_until;

    /// Records commands; when a graph is set, answers them like the remote
    /// console would.
    #[derive(Default)]
    struct ScriptedConsole {
        commands: Mutex<Vec<String>>,
        graph: HashMap<String, Vec<String>>,
        answer_only: Option<Vec<String>>,
        builder: OnceLock<Weak<IndexBuilder>>,
    }

    impl ScriptedConsole {
        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    fn requested_names(command: &str) -> Vec<String> {
        let end = command.find("].map(").expect("introspection command");
        serde_json::from_str(&command[..=end]).expect("name list")
    }

    #[async_trait]
    impl CommandSink for ScriptedConsole {
        async fn submit(&self, command: String) {
            self.commands.lock().unwrap().push(command.clone());
            let Some(builder) = self.builder.get().and_then(Weak::upgrade) else {
                return;
            };
            let Some(sentinel) = builder.lock_discovery().sentinel.clone() else {
                return;
            };
            let lines: Vec<String> = requested_names(&command)
                .into_iter()
                .filter(|name| self.answer_only.as_ref().map_or(true, |only| only.contains(name)))
                .map(|name| {
                    let properties = self.graph.get(&name).cloned().unwrap_or_default();
                    format!("{}{name}={}", sentinel.as_str(), serde_json::json!(properties))
                })
                .collect();
            if !lines.is_empty() {
                builder.load_definition(&lines.join("\n"));
            }
        }
    }

    fn builder_with(
        console: ScriptedConsole,
        dir: &TempDir,
    ) -> (Arc<IndexBuilder>, Arc<ScriptedConsole>, Arc<MemorySink>) {
        let console = Arc::new(console);
        let output = Arc::new(MemorySink::new());
        let builder = Arc::new(IndexBuilder::new(
            console.clone(),
            output.clone(),
            CacheSettings {
                path: dir.path().join(".autocomplete_data.json"),
                max_age: TimeDelta::days(5),
            },
        ));
        console.builder.set(Arc::downgrade(&builder)).unwrap();
        (builder, console, output)
    }

    fn graph(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(name, props)| (name.to_string(), props.iter().map(|p| p.to_string()).collect()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn discovers_two_levels_and_persists() {
        let dir = TempDir::new().unwrap();
        let console = ScriptedConsole {
            graph: graph(&[
                ("global", &["Game", "Memory"]),
                ("Game", &["creeps", "time"]),
                ("Game.creeps", &["Alice"]),
            ]),
            ..ScriptedConsole::default()
        };
        let (builder, console, output) = builder_with(console, &dir);

        builder.clone().run().await;

        let completer = builder.completer().expect("index should be published");
        let index = completer.index();
        assert_eq!(index.get("global").unwrap(), ["Game", "Memory"]);
        assert_eq!(index.get("Game").unwrap(), ["creeps", "time"]);
        assert!(index.get("Memory").unwrap().is_empty());
        // One level below top-level scopes, never deeper.
        assert_eq!(index.get("Game.creeps").unwrap(), ["Alice"]);
        assert!(!index.contains("Game.creeps.Alice"));

        assert_eq!(builder.completions_for("Game.c"), vec!["Game.creeps"]);
        assert_eq!(
            output.texts(LineKind::Status),
            vec!["Creating autocompletion data.", "Finished loading autocompletion data."]
        );
        assert!(console.commands().iter().all(|c| c.contains("Object.getOwnPropertyNames")));

        let saved = cache::read(&dir.path().join(".autocomplete_data.json")).unwrap().unwrap();
        assert_eq!(&saved.index, index);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cache_is_adopted_without_discovery() {
        let dir = TempDir::new().unwrap();
        let mut cached = CompletionIndex::default();
        cached.insert(ROOT_SCOPE, vec!["Game".into()]);
        cache::write(&dir.path().join(".autocomplete_data.json"), &cached, Utc::now()).unwrap();
        let (builder, console, output) = builder_with(ScriptedConsole::default(), &dir);

        builder.clone().run().await;

        assert!(console.commands().is_empty());
        assert!(output.lines().is_empty());
        assert_eq!(builder.completions_for("Ga"), vec!["Game"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cache_triggers_rebuild() {
        let dir = TempDir::new().unwrap();
        let mut cached = CompletionIndex::default();
        cached.insert(ROOT_SCOPE, vec!["Old".into()]);
        let long_ago = Utc::now() - TimeDelta::days(6);
        cache::write(&dir.path().join(".autocomplete_data.json"), &cached, long_ago).unwrap();
        let console =
            ScriptedConsole { graph: graph(&[("global", &["New"])]), ..ScriptedConsole::default() };
        let (builder, console, _output) = builder_with(console, &dir);

        builder.clone().run().await;

        assert!(!console.commands().is_empty());
        assert_eq!(builder.completions_for(""), vec!["New"]);
    }

    #[tokio::test(start_paused = true)]
    async fn save_failure_is_reported_and_index_still_published() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join(".autocomplete_data.json");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("occupied"), "x").unwrap();
        let console =
            ScriptedConsole { graph: graph(&[("global", &["Game"])]), ..ScriptedConsole::default() };
        let (builder, _console, output) = builder_with(console, &dir);

        builder.clone().run().await;

        let failures = output.texts(LineKind::Failure);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("Failed to save autocompletion data"));
        assert!(builder.completer().is_some());
        assert_eq!(builder.completions_for("Ga"), vec!["Game"]);
    }

    #[test]
    fn load_cache_reports_whether_a_fresh_index_was_adopted() {
        let dir = TempDir::new().unwrap();
        let (builder, _console, _output) = builder_with(ScriptedConsole::default(), &dir);
        assert!(!builder.load_cache());
        assert!(builder.completer().is_none());

        let mut cached = CompletionIndex::default();
        cached.insert(ROOT_SCOPE, vec!["Game".into()]);
        cache::write(&dir.path().join(".autocomplete_data.json"), &cached, Utc::now()).unwrap();

        assert!(builder.load_cache());
        assert_eq!(builder.completions_for("g"), vec!["Game"]);
    }

    #[tokio::test(start_paused = true)]
    async fn root_definition_schedules_children() {
        let dir = TempDir::new().unwrap();
        let (builder, _console, _output) = builder_with(ScriptedConsole::default(), &dir);
        let sentinel = builder.begin_discovery();
        {
            let mut guard = builder.lock_discovery();
            let discovery = &mut *guard;
            discovery.frontier.advance(&discovery.index);
        }

        assert!(builder.is_definition(&format!("{}global={{\"bar\":{{}}}}", sentinel.as_str())));
        builder.load_definition(&format!("{}global={{\"bar\":{{}}}}", sentinel.as_str()));

        let discovery = builder.lock_discovery();
        assert_eq!(discovery.index.get(ROOT_SCOPE).unwrap(), ["bar"]);
        assert!(discovery.frontier.next().contains("bar"));
        assert_eq!(discovery.frontier.in_flight_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_sentinel_lines_are_ignored() {
        let dir = TempDir::new().unwrap();
        let (builder, _console, output) = builder_with(ScriptedConsole::default(), &dir);
        builder.begin_discovery();

        assert!(!builder.is_definition("__ld_OLD00:global=[\"x\"]"));
        builder.load_definition("__ld_OLD00:global=[\"x\"]");

        assert!(builder.lock_discovery().index.is_empty());
        assert!(output.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_definition_is_reported_and_dropped() {
        let dir = TempDir::new().unwrap();
        let (builder, _console, output) = builder_with(ScriptedConsole::default(), &dir);
        let sentinel = builder.begin_discovery();

        builder.load_definition(&format!("{}global=[broken", sentinel.as_str()));

        assert!(builder.lock_discovery().index.is_empty());
        let failures = output.texts(LineKind::Failure);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("failed to decode autocomplete data"));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_names_are_requested_next_round() {
        let dir = TempDir::new().unwrap();
        let console =
            ScriptedConsole { answer_only: Some(Vec::new()), ..ScriptedConsole::default() };
        let (builder, console, _output) = builder_with(console, &dir);

        let task = tokio::spawn(builder.clone().run());
        wait_until(|| console.commands().len() == 1).await;
        tokio::time::sleep(ROUND_GRACE + Duration::from_millis(10)).await;

        assert_eq!(console.commands().len(), 2);
        assert_eq!(requested_names(&console.commands()[1]), vec![ROOT_SCOPE]);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn busy_round_waits_for_timeout_before_reissuing() {
        let dir = TempDir::new().unwrap();
        let children: Vec<String> = (0..30).map(|n| format!("c{n:02}")).collect();
        let mut graph = HashMap::new();
        graph.insert(ROOT_SCOPE.to_string(), children);
        let console = ScriptedConsole {
            graph,
            answer_only: Some(vec![ROOT_SCOPE.to_string()]),
            ..ScriptedConsole::default()
        };
        let (builder, console, _output) = builder_with(console, &dir);

        let task = tokio::spawn(builder.clone().run());
        // Root round, then 30 names in two chunks.
        wait_until(|| console.commands().len() == 3).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(console.commands().len(), 3, "round must not end before the timeout");

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(console.commands().len(), 5, "unanswered names are re-requested");
        task.abort();
    }
}
