//! Runtime construction and the public core API.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{info, warn};

use atomize::Provenance;
use embed::{Embedder, HashEmbedder};
use ingest::{spawn_queue, IngestPipeline, IngestQueue, IngestReport, IngestRequest, IngestWorker};
use search::{
    plan, QueryPhase, SearchContext, SearchError, SearchExecutor, SearchRequest, SearchResponse,
};
use store::Store;
use vector::VectorIndex;

use crate::config::AnchorConfig;
use crate::resource::ResourceMonitor;
use crate::AnchorError;

/// The assembled core: store, vector index, embedder, pipeline, monitor.
///
/// Constructed once at startup and passed explicitly — this is the single
/// replacement for what would otherwise be a pile of global singletons.
pub struct Runtime {
    store: Arc<Store>,
    vectors: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    pipeline: Arc<IngestPipeline>,
    search_cfg: search::SearchConfig,
    monitor: ResourceMonitor,
    config: AnchorConfig,
}

impl Runtime {
    /// Open (or create) the database directory and assemble the runtime.
    ///
    /// Startup reconciles the vector index with the store: any molecule
    /// holding a `vector_id` the index does not know — the residue of an
    /// unclean shutdown between commit and insert — is replayed into the
    /// index.
    pub fn open<P: AsRef<Path>>(data_dir: P, config: AnchorConfig) -> Result<Self, AnchorError> {
        config.validate()?;
        std::fs::create_dir_all(&data_dir).map_err(|e| AnchorError::Io(e.to_string()))?;

        let store = Arc::new(Store::open(data_dir.as_ref().join("anchor.redb"))?);
        let vectors = Arc::new(VectorIndex::new(config.vector_config()));
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(config.embed_config())?);

        let mut rebuilt = 0usize;
        for (vector_id, molecule_id, embedding) in store.molecules_with_vectors()? {
            if vectors.contains(vector_id) {
                continue;
            }
            if embedding.len() != vectors.dim() {
                warn!(
                    %molecule_id,
                    stored_dim = embedding.len(),
                    index_dim = vectors.dim(),
                    "vector_rebuild_dimension_mismatch"
                );
                continue;
            }
            vectors.add(vector_id, &embedding)?;
            rebuilt += 1;
        }
        info!(
            compounds = store.count_compounds()?,
            vectors = vectors.len(),
            rebuilt,
            "runtime_opened"
        );

        let pipeline = Arc::new(IngestPipeline::new(
            store.clone(),
            vectors.clone(),
            embedder.clone(),
            config.ingest_config(),
        ));
        let monitor = ResourceMonitor::start(config.resource_config());
        let search_cfg = config.search_config();

        Ok(Self {
            store,
            vectors,
            embedder,
            pipeline,
            search_cfg,
            monitor,
            config,
        })
    }

    /// Ingest one document synchronously.
    pub fn ingest(
        &self,
        content: &[u8],
        source: &str,
        provenance: Provenance,
        buckets: Vec<String>,
        tags: Vec<String>,
    ) -> Result<IngestReport, AnchorError> {
        let report = self.pipeline.ingest(IngestRequest {
            content: content.to_vec(),
            source: source.to_string(),
            provenance,
            buckets,
            user_tags: tags,
        })?;
        Ok(report)
    }

    /// Answer a query. Always returns a well-formed response; a stopword-only
    /// query yields an empty context with `strategy = "empty"` rather than
    /// an error.
    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse, AnchorError> {
        let plan = match plan(&request, &self.search_cfg) {
            Ok(plan) => plan,
            Err(SearchError::EmptyQuery) => {
                return Ok(SearchResponse::empty("empty", QueryPhase::Parsed, None));
            }
            Err(err) => return Err(err.into()),
        };
        let ctx = SearchContext::from_request(&request);
        // One snapshot pins the query's view for all phases.
        let snapshot = self.store.snapshot()?;
        let response = SearchExecutor::new(&snapshot, &self.search_cfg)
            .with_vectors(&self.vectors, self.embedder.as_ref())
            .search(&plan, &ctx);
        Ok(response)
    }

    /// Bounded ingestion queue for the file-watcher collaborator.
    pub fn ingest_queue(&self, capacity: usize) -> (IngestQueue, IngestWorker) {
        spawn_queue(self.pipeline.clone(), capacity)
    }

    /// Signal graceful shutdown: streaming ingests stop between windows and
    /// the resource monitor joins.
    pub fn shutdown(&self) {
        self.pipeline.shutdown_flag().store(true, Ordering::Relaxed);
        self.monitor.stop();
        info!("runtime_shutdown");
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn vectors(&self) -> &Arc<VectorIndex> {
        &self.vectors
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }
}
