use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portal_core::ScriptResource;
use portal_settings::ResourceSettings;
use sha2::{Digest, Sha256};

use crate::descriptor::{ScriptDescriptor, ScriptSource};
use crate::error::ResourceError;
use crate::host::{Backpressure, ScriptHost};
use crate::resolver::{PendingScript, Resolver};

/// Loader configuration.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Give up on a script load after this long. `None` waits forever.
    pub script_load_timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from(&ResourceSettings::default())
    }
}

impl From<&ResourceSettings> for LoaderConfig {
    fn from(settings: &ResourceSettings) -> Self {
        Self {
            script_load_timeout: settings.script_load_timeout(),
        }
    }
}

/// Applies page resources and loads scripts in dependency order.
///
/// While at least one script URI is loading the loader holds exactly one
/// lock on its [`Backpressure`], taken before `submit` returns and released
/// when the last load completes.
#[derive(Clone)]
pub struct ResourceLoader {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<dyn ScriptHost>,
    backpressure: Arc<dyn Backpressure>,
    config: LoaderConfig,
    state: Mutex<LoaderState>,
}

#[derive(Default)]
struct LoaderState {
    resolver: Resolver,
    /// URI → capabilities to merge once it has loaded.
    loading: HashMap<String, BTreeSet<String>>,
    loaded: HashSet<String>,
    stylesheets: HashSet<String>,
    inline_styles: HashSet<[u8; 32]>,
    holding: bool,
}

/// What to do with a descriptor that has no unmet requirements.
enum Step {
    Execute(String, BTreeSet<String>),
    Fetch(String),
    /// Capabilities available without further work.
    Provide(BTreeSet<String>),
    Nothing,
}

impl ResourceLoader {
    pub fn new(
        host: Arc<dyn ScriptHost>,
        backpressure: Arc<dyn Backpressure>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                backpressure,
                config,
                state: Mutex::new(LoaderState::default()),
            }),
        }
    }

    /// Apply styles and schedule scripts. Returns without waiting for any
    /// script to load. Must be called within a tokio runtime when `scripts`
    /// contains URIs.
    pub fn submit(
        &self,
        css_uris: &[String],
        css_source: Option<&str>,
        scripts: Vec<ScriptResource>,
    ) {
        self.apply_styles(css_uris, css_source);

        let mut ready = VecDeque::new();
        for resource in scripts {
            let descriptor = match ScriptDescriptor::try_from(resource) {
                Ok(descriptor) => descriptor,
                Err(error) => {
                    tracing::warn!(error = %error, "skipping script descriptor");
                    continue;
                }
            };
            if let Some(descriptor) = self.inner.state.lock().resolver.admit(descriptor) {
                ready.push_back(descriptor);
            }
        }

        self.inner.run(ready);
        self.inner.settle();
    }

    fn apply_styles(&self, css_uris: &[String], css_source: Option<&str>) {
        for uri in css_uris {
            let fresh = self.inner.state.lock().stylesheets.insert(uri.clone());
            if fresh {
                tracing::debug!(uri = %uri, "applying stylesheet");
                self.inner.host.apply_stylesheet(uri);
            }
        }

        if let Some(css) = css_source.filter(|css| !css.trim().is_empty()) {
            let digest: [u8; 32] = Sha256::digest(css.as_bytes()).into();
            let fresh = self.inner.state.lock().inline_styles.insert(digest);
            if fresh {
                self.inner.host.apply_inline_style(css);
            }
        }
    }

    pub fn provided(&self) -> BTreeSet<String> {
        self.inner.state.lock().resolver.provided().clone()
    }

    pub fn is_provided(&self, name: &str) -> bool {
        self.inner.state.lock().resolver.is_provided(name)
    }

    /// Scripts waiting for capabilities, with what each still lacks.
    pub fn pending(&self) -> Vec<PendingScript> {
        self.inner.state.lock().resolver.pending().to_vec()
    }

    /// Number of script URIs currently loading.
    pub fn loading(&self) -> usize {
        self.inner.state.lock().loading.len()
    }
}

impl Inner {
    /// Work through ready descriptors until nothing more becomes ready.
    /// Inline scripts run here; their capabilities can release further
    /// scripts in the same pass.
    fn run(self: &Arc<Self>, mut ready: VecDeque<ScriptDescriptor>) {
        while let Some(descriptor) = ready.pop_front() {
            let step = self.plan(&descriptor);
            let provides = match step {
                Step::Nothing => continue,
                Step::Provide(provides) => provides,
                Step::Fetch(uri) => {
                    self.start_load(uri);
                    continue;
                }
                Step::Execute(source, provides) => match self.host.execute_inline(&source) {
                    Ok(()) => provides,
                    Err(error) => {
                        tracing::error!(
                            script = %descriptor,
                            error = %error,
                            error_kind = error.error_kind(),
                            "inline script failed, its capabilities stay unprovided"
                        );
                        continue;
                    }
                },
            };
            let released = self.state.lock().resolver.provide(&provides);
            ready.extend(released);
        }
    }

    fn plan(&self, descriptor: &ScriptDescriptor) -> Step {
        let mut state = self.state.lock();
        match &descriptor.source {
            ScriptSource::Inline(source) => {
                Step::Execute(source.clone(), descriptor.provides.clone())
            }
            ScriptSource::Uri(uri) => {
                if let Some(provides) = state.loading.get_mut(uri) {
                    provides.extend(descriptor.provides.iter().cloned());
                    Step::Nothing
                } else if state.loaded.contains(uri) {
                    Step::Provide(descriptor.provides.clone())
                } else {
                    let _ = state
                        .loading
                        .insert(uri.clone(), descriptor.provides.clone());
                    Step::Fetch(uri.clone())
                }
            }
        }
    }

    fn start_load(self: &Arc<Self>, uri: String) {
        let take_lock = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.holding, true)
        };
        if take_lock {
            self.backpressure.lock();
        }

        tracing::debug!(uri = %uri, "loading script");
        let inner = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let result = inner.load(&uri).await;
            inner.complete(&uri, result);
        });
    }

    async fn load(&self, uri: &str) -> Result<(), ResourceError> {
        let Some(after) = self.config.script_load_timeout else {
            return self.host.load_script(uri).await;
        };
        match tokio::time::timeout(after, self.host.load_script(uri)).await {
            Ok(result) => result,
            Err(_) => Err(ResourceError::Timeout {
                uri: uri.to_owned(),
                after,
            }),
        }
    }

    fn complete(self: &Arc<Self>, uri: &str, result: Result<(), ResourceError>) {
        let provides = {
            let mut state = self.state.lock();
            let provides = state.loading.remove(uri).unwrap_or_default();
            if result.is_ok() {
                let _ = state.loaded.insert(uri.to_owned());
            }
            provides
        };

        match result {
            Ok(()) => {
                tracing::debug!(uri = %uri, "script loaded");
                let released = self.state.lock().resolver.provide(&provides);
                self.run(released.into());
            }
            Err(error) => {
                tracing::error!(
                    uri = %uri,
                    error = %error,
                    error_kind = error.error_kind(),
                    "script load failed, its capabilities stay unprovided"
                );
            }
        }
        self.settle();
    }

    /// Release the backpressure lock once nothing is loading, and report
    /// scripts that can no longer make progress.
    fn settle(&self) {
        let (release, stalled) = {
            let mut state = self.state.lock();
            if !state.loading.is_empty() {
                return;
            }
            let release = std::mem::replace(&mut state.holding, false);
            let stalled = state.resolver.unmet();
            (release, stalled)
        };

        if !stalled.is_empty() {
            tracing::warn!(
                unmet = ?stalled,
                "scripts stalled on capabilities nobody provides"
            );
        }
        if release {
            self.backpressure.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct TestHost {
        log: Mutex<Vec<String>>,
        waiting: Mutex<HashMap<String, oneshot::Sender<Result<(), ResourceError>>>>,
    }

    impl TestHost {
        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }

        fn finish(&self, uri: &str, result: Result<(), ResourceError>) {
            let tx = self.waiting.lock().remove(uri).expect("load not started");
            let _ = tx.send(result);
        }
    }

    #[async_trait]
    impl ScriptHost for TestHost {
        fn apply_stylesheet(&self, uri: &str) {
            self.log.lock().push(format!("css:{uri}"));
        }

        fn apply_inline_style(&self, css: &str) {
            self.log.lock().push(format!("style:{css}"));
        }

        fn execute_inline(&self, source: &str) -> Result<(), ResourceError> {
            self.log.lock().push(format!("exec:{source}"));
            if source.contains("throw") {
                return Err(ResourceError::Execute(source.to_owned()));
            }
            Ok(())
        }

        async fn load_script(&self, uri: &str) -> Result<(), ResourceError> {
            self.log.lock().push(format!("load:{uri}"));
            let (tx, rx) = oneshot::channel();
            let _ = self.waiting.lock().insert(uri.to_owned(), tx);
            rx.await.unwrap_or_else(|_| {
                Err(ResourceError::Load {
                    uri: uri.to_owned(),
                    reason: "abandoned".into(),
                })
            })
        }
    }

    #[derive(Default)]
    struct Counter {
        count: AtomicI64,
        locks: AtomicUsize,
    }

    impl Counter {
        fn count(&self) -> i64 {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl Backpressure for Counter {
        fn lock(&self) {
            let _ = self.locks.fetch_add(1, Ordering::SeqCst);
            let _ = self.count.fetch_add(1, Ordering::SeqCst);
        }

        fn unlock(&self) {
            let before = self.count.fetch_sub(1, Ordering::SeqCst);
            assert!(before > 0, "unlock below zero");
        }
    }

    fn loader_with(config: LoaderConfig) -> (ResourceLoader, Arc<TestHost>, Arc<Counter>) {
        let host = Arc::new(TestHost::default());
        let counter = Arc::new(Counter::default());
        let loader = ResourceLoader::new(host.clone(), counter.clone(), config);
        (loader, host, counter)
    }

    fn loader() -> (ResourceLoader, Arc<TestHost>, Arc<Counter>) {
        loader_with(LoaderConfig::default())
    }

    fn script(uri: &str, provides: &[&str], requires: &[&str]) -> ScriptResource {
        ScriptResource {
            uri: Some(uri.into()),
            source: None,
            provides: provides.iter().map(|s| (*s).to_owned()).collect(),
            requires: requires.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    fn inline(source: &str, provides: &[&str], requires: &[&str]) -> ScriptResource {
        ScriptResource {
            uri: None,
            source: Some(source.into()),
            ..script("", provides, requires)
        }
    }

    /// Let spawned load tasks run until they block.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // ── Styles ──

    #[tokio::test]
    async fn styles_apply_once() {
        let (loader, host, counter) = loader();
        let uris = vec!["a.css".to_owned(), "b.css".to_owned(), "a.css".to_owned()];
        loader.submit(&uris, Some(".x{}"), Vec::new());
        loader.submit(&uris[..1], Some(".x{}"), Vec::new());
        loader.submit(&[], Some("   "), Vec::new());

        assert_eq!(host.log(), vec!["css:a.css", "css:b.css", "style:.x{}"]);
        assert_eq!(counter.locks.load(Ordering::SeqCst), 0);
    }

    // ── Ordering ──

    #[tokio::test(start_paused = true)]
    async fn loads_follow_declared_requirements() {
        let (loader, host, counter) = loader();
        loader.submit(
            &[],
            None,
            vec![
                script("c.js", &["z"], &["x", "y"]),
                script("b.js", &["y"], &["x"]),
                script("a.js", &["x"], &[]),
            ],
        );
        assert_eq!(counter.count(), 1);
        assert_eq!(loader.pending().len(), 2);
        settle().await;
        assert_eq!(host.log(), vec!["load:a.js"]);

        host.finish("a.js", Ok(()));
        settle().await;
        assert_eq!(host.log(), vec!["load:a.js", "load:b.js"]);
        assert!(loader.is_provided("x"));
        assert_eq!(counter.count(), 1);

        host.finish("b.js", Ok(()));
        settle().await;
        host.finish("c.js", Ok(()));
        settle().await;

        assert_eq!(host.log(), vec!["load:a.js", "load:b.js", "load:c.js"]);
        assert_eq!(loader.provided(), BTreeSet::from(["x", "y", "z"].map(String::from)));
        assert!(loader.pending().is_empty());
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.locks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inline_scripts_release_transitively_in_one_pass() {
        let (loader, host, counter) = loader();
        loader.submit(
            &[],
            None,
            vec![
                inline("second", &["y"], &["x"]),
                inline("third", &["z"], &["y"]),
                inline("first", &["x"], &[]),
            ],
        );

        assert_eq!(host.log(), vec!["exec:first", "exec:second", "exec:third"]);
        assert!(loader.is_provided("z"));
        assert_eq!(counter.locks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn inline_script_waits_for_loaded_uri() {
        let (loader, host, counter) = loader();
        loader.submit(
            &[],
            None,
            vec![inline("init()", &[], &["lib"]), script("lib.js", &["lib"], &[])],
        );
        settle().await;
        assert_eq!(host.log(), vec!["load:lib.js"]);

        host.finish("lib.js", Ok(()));
        settle().await;
        assert_eq!(host.log(), vec!["load:lib.js", "exec:init()"]);
        assert_eq!(counter.count(), 0);
    }

    // ── Duplicates ──

    #[tokio::test(start_paused = true)]
    async fn loaded_uri_is_not_fetched_again() {
        let (loader, host, _) = loader();
        loader.submit(&[], None, vec![script("a.js", &["x"], &[])]);
        settle().await;
        host.finish("a.js", Ok(()));
        settle().await;

        loader.submit(&[], None, vec![script("a.js", &["w"], &[])]);
        assert!(loader.is_provided("w"));
        assert_eq!(host.log(), vec!["load:a.js"]);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_uri_collects_extra_capabilities() {
        let (loader, host, counter) = loader();
        loader.submit(&[], None, vec![script("a.js", &["x"], &[])]);
        loader.submit(&[], None, vec![script("a.js", &["y"], &[])]);
        settle().await;
        assert_eq!(loader.loading(), 1);

        host.finish("a.js", Ok(()));
        settle().await;
        assert!(loader.is_provided("x"));
        assert!(loader.is_provided("y"));
        assert_eq!(host.log(), vec!["load:a.js"]);
        assert_eq!(counter.count(), 0);
    }

    // ── Backpressure ──

    #[tokio::test(start_paused = true)]
    async fn one_lock_across_concurrent_batches() {
        let (loader, host, counter) = loader();
        loader.submit(&[], None, vec![script("a.js", &["x"], &[])]);
        loader.submit(&[], None, vec![script("b.js", &["y"], &[])]);
        settle().await;
        assert_eq!(counter.count(), 1);

        host.finish("a.js", Ok(()));
        settle().await;
        assert_eq!(counter.count(), 1);

        host.finish("b.js", Ok(()));
        settle().await;
        assert_eq!(counter.count(), 0);

        loader.submit(&[], None, vec![script("c.js", &[], &[])]);
        assert_eq!(counter.count(), 1);
        settle().await;
        host.finish("c.js", Ok(()));
        settle().await;
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.locks.load(Ordering::SeqCst), 2);
    }

    // ── Failures ──

    #[tokio::test(start_paused = true)]
    async fn failed_load_releases_lock_and_stalls_dependents() {
        let (loader, host, counter) = loader();
        loader.submit(
            &[],
            None,
            vec![script("a.js", &["x"], &[]), script("b.js", &["y"], &["x"])],
        );
        settle().await;
        host.finish(
            "a.js",
            Err(ResourceError::Load {
                uri: "a.js".into(),
                reason: "404".into(),
            }),
        );
        settle().await;

        assert_eq!(counter.count(), 0);
        assert!(!loader.is_provided("x"));
        let pending = loader.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].unmet, BTreeSet::from(["x".to_owned()]));

        // A failed URI may be retried.
        loader.submit(&[], None, vec![script("a.js", &["x"], &[])]);
        settle().await;
        host.finish("a.js", Ok(()));
        settle().await;
        settle().await;
        host.finish("b.js", Ok(()));
        settle().await;
        assert!(loader.is_provided("y"));
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_load_times_out() {
        let (loader, host, counter) = loader_with(LoaderConfig {
            script_load_timeout: Some(Duration::from_secs(30)),
        });
        loader.submit(&[], None, vec![script("slow.js", &["x"], &[])]);
        assert_eq!(counter.count(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counter.count(), 0);
        assert_eq!(loader.loading(), 0);
        assert!(!loader.is_provided("x"));
        assert_eq!(host.log(), vec!["load:slow.js"]);
    }

    #[tokio::test]
    async fn failing_inline_script_provides_nothing() {
        let (loader, host, _) = loader();
        loader.submit(
            &[],
            None,
            vec![inline("throw 1", &["x"], &[]), inline("after()", &[], &["x"])],
        );
        assert_eq!(host.log(), vec!["exec:throw 1"]);
        assert_eq!(loader.pending().len(), 1);
    }

    #[tokio::test]
    async fn invalid_descriptor_is_skipped() {
        let (loader, host, _) = loader();
        let both = ScriptResource {
            uri: Some("a.js".into()),
            source: Some("run()".into()),
            ..ScriptResource::default()
        };
        loader.submit(&[], None, vec![both, inline("ok()", &["k"], &[])]);
        assert_eq!(host.log(), vec!["exec:ok()"]);
        assert!(loader.is_provided("k"));
    }

    #[tokio::test]
    async fn unknown_requirement_stays_pending() {
        let (loader, _, counter) = loader();
        loader.submit(&[], None, vec![script("a.js", &[], &["typo"])]);
        let pending = loader.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].descriptor, ScriptDescriptor::uri("a.js").requiring(["typo"]));
        assert_eq!(counter.count(), 0);
    }
}
