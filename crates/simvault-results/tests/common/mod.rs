#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use simvault_results::{
    FieldReader, ResultClient, ResultsResult, ShallowFields, ShallowValue, Tokenizable,
    TokenizableClass, TokenizableRegistry,
};
use simvault_store::{Backend, MemoryStorage, ResultServer, StorageConfig, StoreResult};
use simvault_store::backend::BackendStream;
use simvault_types::{Location, Metadata};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// ---------------------------------------------------------------------------
// Domain model
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub struct Extension {
    pub steps: u64,
    pub timestep_fs: f64,
}

impl Tokenizable for Extension {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn to_shallow(&self) -> ShallowFields {
        BTreeMap::from([
            ("steps".to_string(), json!(self.steps).into()),
            ("timestep_fs".to_string(), json!(self.timestep_fs).into()),
        ])
    }
}

impl TokenizableClass for Extension {
    const CLASS_NAME: &'static str = "Extension";

    fn from_shallow(fields: &mut FieldReader) -> ResultsResult<Self> {
        Ok(Self {
            steps: fields.value("steps")?,
            timestep_fs: fields.value("timestep_fs")?,
        })
    }
}

#[derive(Debug)]
pub struct Replica {
    pub seed: u64,
    pub extension: Arc<Extension>,
}

impl Tokenizable for Replica {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn to_shallow(&self) -> ShallowFields {
        BTreeMap::from([
            ("seed".to_string(), json!(self.seed).into()),
            ("extension".to_string(), ShallowValue::object(&self.extension)),
        ])
    }
}

impl TokenizableClass for Replica {
    const CLASS_NAME: &'static str = "Replica";

    fn from_shallow(fields: &mut FieldReader) -> ResultsResult<Self> {
        Ok(Self {
            seed: fields.value("seed")?,
            extension: fields.object("extension")?,
        })
    }
}

#[derive(Debug)]
pub struct Transformation {
    pub name: String,
    pub clones: Vec<Arc<Replica>>,
    pub settings: BTreeMap<String, f64>,
}

impl Tokenizable for Transformation {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn to_shallow(&self) -> ShallowFields {
        BTreeMap::from([
            ("name".to_string(), json!(self.name).into()),
            ("clones".to_string(), ShallowValue::objects(&self.clones)),
            ("settings".to_string(), json!(self.settings).into()),
        ])
    }
}

impl TokenizableClass for Transformation {
    const CLASS_NAME: &'static str = "Transformation";

    fn from_shallow(fields: &mut FieldReader) -> ResultsResult<Self> {
        Ok(Self {
            name: fields.value("name")?,
            clones: fields.objects("clones")?,
            settings: fields.value("settings")?,
        })
    }
}

#[derive(Debug)]
pub struct Network {
    pub edges: Vec<Arc<Transformation>>,
    pub labelled: BTreeMap<String, Arc<Transformation>>,
    pub note: Option<String>,
}

impl Tokenizable for Network {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn to_shallow(&self) -> ShallowFields {
        BTreeMap::from([
            ("edges".to_string(), ShallowValue::objects(&self.edges)),
            (
                "labelled".to_string(),
                ShallowValue::Map(
                    self.labelled
                        .iter()
                        .map(|(k, v)| (k.clone(), ShallowValue::object(v)))
                        .collect(),
                ),
            ),
            ("note".to_string(), json!(self.note).into()),
        ])
    }
}

impl TokenizableClass for Network {
    const CLASS_NAME: &'static str = "Network";

    fn from_shallow(fields: &mut FieldReader) -> ResultsResult<Self> {
        Ok(Self {
            edges: fields.objects("edges")?,
            labelled: fields.object_map("labelled")?,
            note: fields.optional("note")?,
        })
    }
}

pub fn registry() -> TokenizableRegistry {
    TokenizableRegistry::new()
        .with::<Extension>()
        .with::<Replica>()
        .with::<Transformation>()
        .with::<Network>()
}

/// Transformation with two clones sharing one extension.
pub fn scenario() -> Arc<Transformation> {
    let extension = Arc::new(Extension {
        steps: 5000,
        timestep_fs: 4.0,
    });
    let clones = (1..=2)
        .map(|seed| {
            Arc::new(Replica {
                seed,
                extension: Arc::clone(&extension),
            })
        })
        .collect();
    Arc::new(Transformation {
        name: "benzene-to-toluene".to_string(),
        clones,
        settings: BTreeMap::from([("temperature_k".to_string(), 298.15)]),
    })
}

// ---------------------------------------------------------------------------
// Write-counting backend
// ---------------------------------------------------------------------------

/// Memory backend that counts physical writes per location.
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryStorage,
    writes: Mutex<HashMap<Location, usize>>,
}

impl CountingBackend {
    pub fn writes_to(&self, location: &Location) -> usize {
        self.writes.lock().unwrap().get(location).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.writes.lock().unwrap().values().sum()
    }
}

impl Backend for CountingBackend {
    fn name(&self) -> &'static str {
        "CountingBackend"
    }

    fn store(&self, location: &Location, data: &[u8]) -> StoreResult<Metadata> {
        *self.writes.lock().unwrap().entry(location.clone()).or_default() += 1;
        self.inner.store(location, data)
    }

    fn load(&self, location: &Location) -> StoreResult<BackendStream> {
        self.inner.load(location)
    }

    fn delete(&self, location: &Location) -> StoreResult<()> {
        self.inner.delete(location)
    }

    fn exists(&self, location: &Location) -> StoreResult<bool> {
        self.inner.exists(location)
    }
}

/// Client over a counting backend with in-memory metadata.
pub fn counting_client() -> (Arc<CountingBackend>, ResultClient) {
    let backend = Arc::new(CountingBackend::default());
    let server = ResultServer::in_memory(backend.clone(), StorageConfig::default());
    (backend, ResultClient::new(server, registry()))
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// Counts WARN events seen while installed.
#[derive(Clone, Default)]
pub struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` on this thread with warnings counted.
pub fn count_warnings<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, counter.0.load(Ordering::SeqCst))
}
