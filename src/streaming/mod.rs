//! Viewpoint-driven chunk streaming

pub mod chunk;
pub mod scene;
pub mod config;
pub mod dispatcher;
pub mod controller;

pub use chunk::{Chunk, ChunkKey, RenderMask, CHUNK_SIZE, DEFAULT_RENDER_MASK};
pub use scene::{LiveMesh, MeshHandle, MeshRegistry, SceneSink};
pub use config::{FieldMode, TerrainConfig};
pub use dispatcher::{
    ChunkDispatcher, ChunkRequest, Epoch, FieldSource, SessionState,
    WorkerCommand, WorkerEvent, WorkerSession,
};
pub use controller::{ReconcileReport, StreamingStats, TerrainStreamer};
