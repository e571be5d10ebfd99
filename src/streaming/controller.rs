//! Viewpoint-driven chunk streaming
//!
//! [`TerrainStreamer`] keeps materialized exactly the chunks under
//! `center + offset` for every offset of the render mask. Whenever the
//! viewpoint crosses into a new grid cell the worker session is replaced,
//! chunks that left the mask are evicted immediately, and the missing ones
//! are requested from the new session. Results are applied as they arrive
//! on [`TerrainStreamer::poll`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::{IVec3, UVec3, Vec3};

use super::chunk::{Chunk, ChunkKey, RenderMask};
use super::config::{FieldMode, TerrainConfig};
use super::dispatcher::{
    ChunkDispatcher, ChunkRequest, FieldSource, SessionState, WorkerEvent, WorkerSession,
};
use super::scene::SceneSink;
use crate::core::Result;
use crate::mesh::{ChunkMesher, MarchingCubes};
use crate::terrain::{LayeredNoise, NoiseBlueprint, NoiseComposer};

/// Outcome of one reconciliation pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub requested: usize,
    pub preserved: usize,
    pub evicted: usize,
    /// Mask cells skipped because they fall off the edge of the world grid
    pub out_of_range: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Running counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamingStats {
    pub reconciliations: u64,
    pub sessions_started: u64,
    pub chunks_requested: u64,
    pub chunks_materialized: u64,
    pub chunks_evicted: u64,
    /// Results dropped because their session was already replaced
    pub stale_results: u64,
    /// Results of the live session that were not applied: never requested,
    /// no longer desired, or already cached
    pub dropped_results: u64,
    pub empty_chunks: u64,
}

/// Chunk cache plus the scheduling around it
pub struct TerrainStreamer {
    config: TerrainConfig,
    mask: RenderMask,
    composer: NoiseComposer,
    field: Arc<LayeredNoise>,
    dispatcher: ChunkDispatcher,
    session: Option<WorkerSession>,
    /// `None` until the first reconciliation
    center: Option<ChunkKey>,
    desired: HashSet<ChunkKey>,
    chunks: HashMap<ChunkKey, Chunk>,
    stats: StreamingStats,
}

impl TerrainStreamer {
    /// Validate the config and buffer every octave up front
    pub fn new(config: TerrainConfig, mesher: Arc<dyn ChunkMesher>) -> Result<Self> {
        config.validate()?;

        let mut composer = NoiseComposer::new();
        composer.buffer_all(&config.blueprints)?;
        let field = Arc::new(composer.compose_layered(&config.blueprints, config.vertical_bias)?);

        log::info!(
            "Terrain streamer ready: {} octaves, chunk size {}, {} mask offsets, {:?} field",
            config.blueprints.len(),
            config.chunk_size,
            config.render_mask.len(),
            config.field_mode
        );

        Ok(Self {
            mask: config.mask(),
            config,
            composer,
            field,
            dispatcher: ChunkDispatcher::new(mesher),
            session: None,
            center: None,
            desired: HashSet::new(),
            chunks: HashMap::new(),
            stats: StreamingStats::default(),
        })
    }

    pub fn with_marching_cubes(config: TerrainConfig) -> Result<Self> {
        Self::new(config, Arc::new(MarchingCubes::default()))
    }

    pub fn center(&self) -> Option<ChunkKey> {
        self.center
    }

    /// Grid cell of a viewpoint
    pub fn center_for(&self, viewpoint: Vec3) -> ChunkKey {
        ChunkKey::from_world_pos(viewpoint, self.config.chunk_size)
    }

    /// Reconcile against the viewpoint, then apply whatever results arrived
    ///
    /// Returns the number of chunks materialized by this call.
    pub fn update(&mut self, viewpoint: Vec3, scene: &mut dyn SceneSink) -> Result<usize> {
        let center = self.center_for(viewpoint);
        self.reconcile(center, scene)?;
        Ok(self.poll(scene))
    }

    /// Bring the cache in line with the mask around `center`
    ///
    /// A no-op when `center` is unchanged. Otherwise the current session is
    /// replaced even if nothing is missing.
    ///
    /// Mask cells whose key or world extent does not fit in `i32` are skipped
    /// and reported in [`ReconcileReport::out_of_range`].
    pub fn reconcile(
        &mut self,
        center: ChunkKey,
        scene: &mut dyn SceneSink,
    ) -> Result<ReconcileReport> {
        if self.center == Some(center) {
            return Ok(ReconcileReport::default());
        }

        let mut session = self.dispatcher.start_session(self.field_source())?;
        self.stats.sessions_started += 1;
        if let Some(mut old) = self.session.take() {
            self.dispatcher.terminate(&mut old);
        }

        let chunk_size = self.config.chunk_size;
        let desired_keys: Vec<(ChunkKey, IVec3)> = self
            .mask
            .desired_keys(center)
            .into_iter()
            .filter_map(|key| {
                let origin = key.checked_world_origin(chunk_size);
                if origin.is_none() {
                    log::warn!("Chunk {:?} lies outside the world grid; skipping", key);
                }
                origin.map(|origin| (key, origin))
            })
            .collect();
        self.desired = desired_keys.iter().map(|&(key, _)| key).collect();

        let mut report = ReconcileReport {
            out_of_range: self.mask.len() - desired_keys.len(),
            ..Default::default()
        };

        let evicted: Vec<ChunkKey> = self
            .chunks
            .keys()
            .filter(|key| !self.desired.contains(*key))
            .copied()
            .collect();
        for key in evicted {
            if let Some(chunk) = self.chunks.remove(&key) {
                if let Some(handle) = chunk.handle {
                    scene.remove_mesh(handle);
                }
                log::trace!("Evicted chunk {:?} (label {})", key, key.weighted_sum());
                report.evicted += 1;
            }
        }

        let dims = UVec3::splat(chunk_size as u32);
        for (key, world_offset) in desired_keys {
            if self.chunks.contains_key(&key) {
                report.preserved += 1;
                continue;
            }
            let request = ChunkRequest { key, dims, world_offset };
            if self.dispatcher.request_chunk(&mut session, request) {
                report.requested += 1;
            }
        }

        self.session = Some(session);
        self.center = Some(center);

        self.stats.reconciliations += 1;
        self.stats.chunks_requested += report.requested as u64;
        self.stats.chunks_evicted += report.evicted as u64;

        log::info!(
            "Center {:?}: {} requested, {} preserved, {} evicted",
            center,
            report.requested,
            report.preserved,
            report.evicted
        );
        Ok(report)
    }

    /// Apply every result that has arrived; never blocks
    ///
    /// Returns the number of chunks materialized.
    pub fn poll(&mut self, scene: &mut dyn SceneSink) -> usize {
        let mut materialized = 0;

        for event in self.dispatcher.poll() {
            let Some(session) = self.session.as_mut().filter(|s| s.epoch() == event.epoch()) else {
                log::trace!("Dropping result from stale session {}", event.epoch());
                self.stats.stale_results += 1;
                continue;
            };

            match event {
                WorkerEvent::FieldReady { .. } => {
                    session.mark_ready();
                    log::debug!("Worker session {} ready", session.epoch());
                }
                WorkerEvent::ChunkDone { key, world_offset, triangles, .. } => {
                    let applies = session.complete(key)
                        && self.desired.contains(&key)
                        && !self.chunks.contains_key(&key);
                    if !applies {
                        log::trace!("Dropping unexpected result for chunk {:?}", key);
                        self.stats.dropped_results += 1;
                        continue;
                    }

                    let handle = if triangles.is_empty() {
                        self.stats.empty_chunks += 1;
                        None
                    } else {
                        Some(scene.add_mesh(world_offset.as_vec3(), &triangles))
                    };
                    let chunk = Chunk { key, world_origin: world_offset, triangles, handle };
                    log::trace!(
                        "Materialized chunk {:?} with {} triangles",
                        key,
                        chunk.triangle_count()
                    );
                    self.chunks.insert(key, chunk);

                    self.stats.chunks_materialized += 1;
                    materialized += 1;
                }
            }
        }

        materialized
    }

    pub fn chunk(&self, key: ChunkKey) -> Option<&Chunk> {
        self.chunks.get(&key)
    }

    /// Chunk under the current center, once it has arrived
    pub fn chunk_at_center(&self) -> Option<&Chunk> {
        self.center.and_then(|center| self.chunks.get(&center))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn loaded_keys(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.chunks.keys().copied()
    }

    /// Whether `key` is in the most recent desired set
    pub fn is_desired(&self, key: ChunkKey) -> bool {
        self.desired.contains(&key)
    }

    /// Requests of the current session not yet delivered
    pub fn pending(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.outstanding())
    }

    pub fn stats(&self) -> StreamingStats {
        self.stats
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(|s| s.state())
    }

    pub fn field(&self) -> &Arc<LayeredNoise> {
        &self.field
    }

    pub fn composer(&self) -> &NoiseComposer {
        &self.composer
    }

    pub fn blueprints(&self) -> &[NoiseBlueprint] {
        &self.config.blueprints
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Cancel the session and remove every mesh from the scene
    pub fn shutdown(&mut self, scene: &mut dyn SceneSink) {
        if let Some(mut session) = self.session.take() {
            self.dispatcher.terminate(&mut session);
        }
        for (_, chunk) in self.chunks.drain() {
            if let Some(handle) = chunk.handle {
                scene.remove_mesh(handle);
            }
        }
        self.desired.clear();
        self.center = None;
        log::info!("Terrain streamer shut down");
    }

    fn field_source(&self) -> FieldSource {
        match self.config.field_mode {
            FieldMode::Shared => FieldSource::Shared(Arc::clone(&self.field)),
            FieldMode::PerSession => FieldSource::Blueprints {
                blueprints: self.config.blueprints.clone(),
                vertical_bias: self.config.vertical_bias,
            },
        }
    }
}
