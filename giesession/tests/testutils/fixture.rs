//! Shared fixture for session integration tests
//!
//! Every fixture owns its own object store, so tests can run in parallel.
//! `FlakyCluster` wraps the in-process cluster and fails selected calls on
//! demand.

#![allow(dead_code)]

use giesession::local::{Edge, LocalCluster, ObjectStore, PropertyGraph, StoreConfig, Vertex};
use giesession::{
    Cluster, GraphMeta, GremlinClient, LoadRequest, NameSource, OidType, ProvisionRequest,
    RemoteError, RequestOptions, Session, SessionConfig, StoreError, Value,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const CITATION_GRAPH: &str = "citation";

/// Script whose edges make up the expected subgraph
pub const YEAR_WINDOW_SCRIPT: &str = "g.V().has('year', inside(2014, 2020)).outE('cites')";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Ten papers; exactly five `cites` edges leave a paper published strictly
/// between 2014 and 2020
pub fn citation_graph() -> PropertyGraph {
    let years = [2010, 2012, 2015, 2016, 2017, 2018, 2019, 2020, 2021, 2014];
    let mut graph = PropertyGraph::new();
    for (id, year) in years.iter().enumerate() {
        graph
            .add_vertex(
                Vertex::new(id.to_string(), "paper")
                    .with_property("year", *year as i64)
                    .with_property("title", format!("paper {}", id)),
            )
            .unwrap();
    }

    let edges = [
        // matching
        ("cites", "2", "0"),
        ("cites", "3", "1"),
        ("cites", "4", "2"),
        ("cites", "5", "7"),
        ("cites", "6", "8"),
        // source outside the window, or the wrong label
        ("cites", "0", "1"),
        ("cites", "7", "9"),
        ("cites", "9", "3"),
        ("cites", "8", "0"),
        ("related", "2", "9"),
    ];
    for (i, (label, src, dst)) in edges.iter().enumerate() {
        graph
            .add_edge(Edge::new(format!("e{}", i), *label, *src, *dst))
            .unwrap();
    }
    graph
}

/// Faults a [`FlakyCluster`] injects until they are switched off
#[derive(Default)]
pub struct Faults {
    pub fail_provision: AtomicBool,
    pub fail_close: AtomicBool,
    pub fail_load: AtomicBool,
    pub provision_delay_ms: AtomicU64,
    pub load_delay_ms: AtomicU64,
    /// Scripts containing this text are rejected
    pub fail_scripts_containing: Mutex<Option<String>>,
}

pub struct FlakyCluster {
    inner: LocalCluster,
    pub faults: Arc<Faults>,
    pub provisions: AtomicUsize,
    pub scripts: Arc<Mutex<Vec<String>>>,
}

impl FlakyCluster {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self {
            inner: LocalCluster::new(store),
            faults: Arc::new(Faults::default()),
            provisions: AtomicUsize::new(0),
            scripts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn local(&self) -> &LocalCluster {
        &self.inner
    }

    pub fn provision_count(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    /// Scripts submitted so far that contain `needle`
    pub fn submitted(&self, needle: &str) -> usize {
        self.scripts
            .lock()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    pub fn fail_scripts_containing(&self, needle: Option<&str>) {
        *self.faults.fail_scripts_containing.lock() = needle.map(str::to_string);
    }
}

impl Cluster for FlakyCluster {
    fn create_interactive_query(
        &self,
        graph: &GraphMeta,
        request: &ProvisionRequest,
    ) -> Result<String, RemoteError> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        let delay = self.faults.provision_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if self.faults.fail_provision.load(Ordering::SeqCst) {
            return Err(RemoteError::Failed("no resources for engine".into()));
        }
        self.inner.create_interactive_query(graph, request)
    }

    fn close_interactive_query(&self, endpoint: &str) -> Result<(), RemoteError> {
        if self.faults.fail_close.load(Ordering::SeqCst) {
            // the engine still goes away; only the acknowledgement is lost
            let _ = self.inner.close_interactive_query(endpoint);
            return Err(RemoteError::Failed("teardown not acknowledged".into()));
        }
        self.inner.close_interactive_query(endpoint)
    }

    fn gremlin_client(&self, endpoint: &str) -> Result<Arc<dyn GremlinClient>, RemoteError> {
        let inner = self.inner.gremlin_client(endpoint)?;
        Ok(Arc::new(FlakyClient {
            inner,
            faults: self.faults.clone(),
            scripts: self.scripts.clone(),
        }))
    }

    fn graph(&self, key: &str) -> Result<GraphMeta, RemoteError> {
        self.inner.graph(key)
    }

    fn load_from(&self, request: &LoadRequest) -> Result<GraphMeta, StoreError> {
        let delay = self.faults.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if self.faults.fail_load.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidData("injected load failure".into()));
        }
        self.inner.load_from(request)
    }
}

struct FlakyClient {
    inner: Arc<dyn GremlinClient>,
    faults: Arc<Faults>,
    scripts: Arc<Mutex<Vec<String>>>,
}

impl GremlinClient for FlakyClient {
    fn submit(&self, script: &str, options: &RequestOptions) -> Result<Vec<Value>, RemoteError> {
        self.scripts.lock().push(script.to_string());
        let rejected = self
            .faults
            .fail_scripts_containing
            .lock()
            .as_deref()
            .map(|needle| script.contains(needle))
            .unwrap_or(false);
        if rejected {
            return Err(RemoteError::Failed(format!("script rejected: {}", script)));
        }
        self.inner.submit(script, options)
    }
}

/// Always hands out the same name
pub struct FixedNames(pub String);

impl NameSource for FixedNames {
    fn next_name(&self) -> String {
        self.0.clone()
    }
}

pub struct Fixture {
    pub store: Arc<ObjectStore>,
    pub cluster: Arc<FlakyCluster>,
    pub graph: GraphMeta,
}

impl Fixture {
    pub fn new() -> Self {
        init_logging();
        let store = Arc::new(ObjectStore::new(StoreConfig {
            stream_wait: Duration::from_secs(5),
        }));
        let cluster = Arc::new(FlakyCluster::new(store.clone()));
        let graph = cluster
            .local()
            .load_graph(CITATION_GRAPH, citation_graph(), OidType::Int64)
            .expect("Failed to load citation graph");
        Self {
            store,
            cluster,
            graph,
        }
    }

    pub fn config() -> SessionConfig {
        SessionConfig::default()
            .with_loader_threads(2)
            .with_remote_timeout(Duration::from_secs(10))
    }

    pub fn session(&self) -> Session {
        self.session_with(Self::config())
    }

    pub fn session_with(&self, config: SessionConfig) -> Session {
        Session::new(config, self.cluster.clone()).expect("Failed to create session")
    }

    pub fn session_with_names(&self, names: Arc<dyn NameSource>) -> Session {
        Session::with_name_source(Self::config(), self.cluster.clone(), names)
            .expect("Failed to create session")
    }
}
