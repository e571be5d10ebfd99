//! Off-thread chunk triangulation
//!
//! Each [`WorkerSession`] owns one worker thread bound to one noise field.
//! Commands go out on the session's own channel and are handled strictly in
//! order; events from every session come back on a single channel owned by
//! the dispatcher, tagged with the session's [`Epoch`]. Cancelling a session
//! is cooperative: the worker stops at the next request boundary and never
//! reports a result after its cancel flag is set, and the controller drops
//! any event whose epoch is not current.

use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use glam::{IVec3, UVec3};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::chunk::ChunkKey;
use crate::core::{Error, Result};
use crate::mesh::ChunkMesher;
use crate::terrain::{LayeredNoise, NoiseBlueprint, NoiseComposer};

/// Monotonic generation number of a worker session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(pub u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Noise field handed to a new session
#[derive(Clone, Debug)]
pub enum FieldSource {
    /// Read-only share of an already buffered field
    Shared(Arc<LayeredNoise>),
    /// Blueprints the worker buffers itself
    Blueprints {
        blueprints: Vec<NoiseBlueprint>,
        vertical_bias: f32,
    },
}

impl FieldSource {
    fn into_field(self) -> Result<Arc<LayeredNoise>> {
        match self {
            FieldSource::Shared(field) => Ok(field),
            FieldSource::Blueprints { blueprints, vertical_bias } => {
                let mut composer = NoiseComposer::new();
                composer.buffer_all(&blueprints)?;
                Ok(Arc::new(composer.compose_layered(&blueprints, vertical_bias)?))
            }
        }
    }
}

/// One chunk to triangulate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRequest {
    pub key: ChunkKey,
    pub dims: UVec3,
    pub world_offset: IVec3,
}

/// Controller -> worker
#[derive(Debug)]
pub enum WorkerCommand {
    LoadField(FieldSource),
    MarchChunk(ChunkRequest),
}

/// Worker -> controller
#[derive(Debug)]
pub enum WorkerEvent {
    FieldReady {
        epoch: Epoch,
    },
    ChunkDone {
        epoch: Epoch,
        key: ChunkKey,
        world_offset: IVec3,
        triangles: Vec<f32>,
    },
}

impl WorkerEvent {
    pub fn epoch(&self) -> Epoch {
        match self {
            WorkerEvent::FieldReady { epoch } | WorkerEvent::ChunkDone { epoch, .. } => *epoch,
        }
    }
}

/// Lifecycle of a session; nothing leaves `Terminated`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    FieldLoading,
    Ready,
    Terminated,
}

/// Handle to one worker lifetime
///
/// Dropping the handle cancels the worker.
pub struct WorkerSession {
    epoch: Epoch,
    state: SessionState,
    commands: Option<UnboundedSender<WorkerCommand>>,
    cancelled: Arc<AtomicBool>,
    /// Requested and not yet reported back
    outstanding: HashSet<ChunkKey>,
}

impl WorkerSession {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_outstanding(&self, key: ChunkKey) -> bool {
        self.outstanding.contains(&key)
    }

    /// Record the worker's field acknowledgement
    pub fn mark_ready(&mut self) {
        if self.state == SessionState::FieldLoading {
            self.state = SessionState::Ready;
        }
    }

    /// Record a delivered chunk; false if it was never outstanding
    pub fn complete(&mut self, key: ChunkKey) -> bool {
        self.outstanding.remove(&key)
    }

    fn send(&mut self, command: WorkerCommand) -> bool {
        let Some(commands) = self.commands.as_ref() else {
            return false;
        };
        if commands.send(command).is_err() {
            // Worker is gone (field load failed); nothing more will arrive
            log::warn!("Worker session {} stopped accepting commands", self.epoch);
            self.commands = None;
            return false;
        }
        true
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.commands = None;
        self.outstanding.clear();
        self.state = SessionState::Terminated;
    }
}

impl Drop for WorkerSession {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Starts worker sessions and collects their results
pub struct ChunkDispatcher {
    mesher: Arc<dyn ChunkMesher>,
    events_tx: UnboundedSender<WorkerEvent>,
    events_rx: UnboundedReceiver<WorkerEvent>,
    next_epoch: u64,
}

impl ChunkDispatcher {
    pub fn new(mesher: Arc<dyn ChunkMesher>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            mesher,
            events_tx,
            events_rx,
            next_epoch: 0,
        }
    }

    /// Spawn a worker and send it its field
    ///
    /// The session reports `FieldReady` once the worker holds the field.
    /// Requests made before that are queued behind the field load.
    pub fn start_session(&mut self, source: FieldSource) -> Result<WorkerSession> {
        let epoch = Epoch(self.next_epoch);
        self.next_epoch += 1;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            epoch,
            mesher: Arc::clone(&self.mesher),
            events: self.events_tx.clone(),
            cancelled: Arc::clone(&cancelled),
        };
        thread::Builder::new()
            .name(format!("terrain-worker-{}", epoch))
            .spawn(move || worker.run(commands_rx))
            .map_err(|e| Error::Streaming(format!("failed to spawn worker {}: {}", epoch, e)))?;

        let mut session = WorkerSession {
            epoch,
            state: SessionState::Created,
            commands: Some(commands_tx),
            cancelled,
            outstanding: HashSet::new(),
        };
        if session.send(WorkerCommand::LoadField(source)) {
            session.state = SessionState::FieldLoading;
        }
        log::debug!("Started worker session {}", epoch);
        Ok(session)
    }

    /// Queue a chunk on a session; fire-and-forget
    ///
    /// Returns false if the session can no longer take work.
    pub fn request_chunk(&self, session: &mut WorkerSession, request: ChunkRequest) -> bool {
        if session.state == SessionState::Terminated {
            return false;
        }
        if !session.send(WorkerCommand::MarchChunk(request)) {
            return false;
        }
        session.outstanding.insert(request.key);
        true
    }

    /// Cancel a session; none of its pending results will be applied
    pub fn terminate(&self, session: &mut WorkerSession) {
        if session.state == SessionState::Terminated {
            return;
        }
        log::debug!(
            "Terminating worker session {} with {} chunks outstanding",
            session.epoch,
            session.outstanding.len()
        );
        session.cancel();
    }

    /// Drain every event that has arrived, without blocking
    pub fn poll(&mut self) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[cfg(test)]
    pub(crate) fn event_sender(&self) -> UnboundedSender<WorkerEvent> {
        self.events_tx.clone()
    }
}

/// State moved onto a worker thread
struct Worker {
    epoch: Epoch,
    mesher: Arc<dyn ChunkMesher>,
    events: UnboundedSender<WorkerEvent>,
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn run(self, mut commands: UnboundedReceiver<WorkerCommand>) {
        let mut field: Option<Arc<LayeredNoise>> = None;

        while let Some(command) = commands.blocking_recv() {
            if self.is_cancelled() {
                break;
            }
            match command {
                WorkerCommand::LoadField(source) => match source.into_field() {
                    Ok(loaded) => {
                        field = Some(loaded);
                        let ready = WorkerEvent::FieldReady { epoch: self.epoch };
                        if self.is_cancelled() || self.events.send(ready).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Worker {} could not load its noise field: {}", self.epoch, e);
                        break;
                    }
                },
                WorkerCommand::MarchChunk(request) => {
                    let Some(field) = field.as_deref() else {
                        log::warn!(
                            "Worker {} asked to march {:?} before any field load",
                            self.epoch,
                            request.key
                        );
                        continue;
                    };
                    let marched = catch_unwind(AssertUnwindSafe(|| {
                        self.mesher.march(field, request.world_offset, request.dims)
                    }));
                    let triangles = match marched {
                        Ok(triangles) => triangles,
                        Err(_) => {
                            log::warn!(
                                "Worker {}: mesher panicked on chunk {:?}; not delivered",
                                self.epoch,
                                request.key
                            );
                            continue;
                        }
                    };
                    if self.is_cancelled() {
                        break;
                    }
                    let done = WorkerEvent::ChunkDone {
                        epoch: self.epoch,
                        key: request.key,
                        world_offset: request.world_offset,
                        triangles,
                    };
                    if self.events.send(done).is_err() {
                        break;
                    }
                }
            }
        }

        log::trace!("Worker {} exiting", self.epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MarchingCubes;
    use crate::terrain::{ScalarField, default_blueprints};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    /// One triangle per chunk, tagged with the chunk's x offset
    struct TagMesher;

    impl ChunkMesher for TagMesher {
        fn march(&self, _field: &dyn ScalarField, origin: IVec3, _dims: UVec3) -> Vec<f32> {
            vec![origin.x as f32; 9]
        }
    }

    /// Blocks inside `march` until opened
    #[derive(Default)]
    struct GateMesher {
        open: Mutex<bool>,
        opened: Condvar,
        entered: AtomicUsize,
    }

    impl GateMesher {
        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.opened.notify_all();
        }
    }

    impl ChunkMesher for GateMesher {
        fn march(&self, _field: &dyn ScalarField, _origin: IVec3, _dims: UVec3) -> Vec<f32> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
            vec![0.0; 9]
        }
    }

    /// Panics on negative x, otherwise one triangle
    struct FlakyMesher;

    impl ChunkMesher for FlakyMesher {
        fn march(&self, _field: &dyn ScalarField, origin: IVec3, _dims: UVec3) -> Vec<f32> {
            assert!(origin.x >= 0, "flaky mesher refused chunk");
            vec![1.0; 9]
        }
    }

    fn shared_flat_field() -> FieldSource {
        let composer = NoiseComposer::new();
        FieldSource::Shared(Arc::new(composer.compose_layered(&[], 8.0).unwrap()))
    }

    fn request(x: i32) -> ChunkRequest {
        ChunkRequest {
            key: ChunkKey::new(x, 0, 0),
            dims: UVec3::splat(4),
            world_offset: IVec3::new(x * 4, 0, 0),
        }
    }

    /// Collect events until `done` holds or five seconds pass
    fn collect_until(
        dispatcher: &mut ChunkDispatcher,
        done: impl Fn(&[WorkerEvent]) -> bool,
    ) -> Vec<WorkerEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            events.extend(dispatcher.poll());
            if done(&events) {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        events
    }

    fn chunk_keys(events: &[WorkerEvent]) -> Vec<ChunkKey> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::ChunkDone { key, .. } => Some(*key),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_session_lifecycle() {
        let mut dispatcher = ChunkDispatcher::new(Arc::new(TagMesher));
        let mut session = dispatcher.start_session(shared_flat_field()).unwrap();
        assert_eq!(session.state(), SessionState::FieldLoading);

        assert!(dispatcher.request_chunk(&mut session, request(3)));
        assert_eq!(session.outstanding(), 1);

        let events = collect_until(&mut dispatcher, |ev| chunk_keys(ev).len() == 1);
        assert!(matches!(events[0], WorkerEvent::FieldReady { epoch } if epoch == session.epoch()));
        match &events[1] {
            WorkerEvent::ChunkDone { epoch, key, world_offset, triangles } => {
                assert_eq!(*epoch, session.epoch());
                assert_eq!(*key, ChunkKey::new(3, 0, 0));
                assert_eq!(*world_offset, IVec3::new(12, 0, 0));
                assert_eq!(triangles, &vec![12.0; 9]);
            }
            other => panic!("unexpected event {:?}", other),
        }

        session.mark_ready();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.complete(ChunkKey::new(3, 0, 0)));
        assert_eq!(session.outstanding(), 0);
    }

    #[test]
    fn test_requests_processed_in_order() {
        let mut dispatcher = ChunkDispatcher::new(Arc::new(TagMesher));
        let mut session = dispatcher.start_session(shared_flat_field()).unwrap();
        for x in 0..6 {
            dispatcher.request_chunk(&mut session, request(x));
        }

        let events = collect_until(&mut dispatcher, |ev| chunk_keys(ev).len() == 6);
        let keys = chunk_keys(&events);
        let expected: Vec<_> = (0..6).map(|x| ChunkKey::new(x, 0, 0)).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_epochs_increase() {
        let mut dispatcher = ChunkDispatcher::new(Arc::new(TagMesher));
        let a = dispatcher.start_session(shared_flat_field()).unwrap();
        let b = dispatcher.start_session(shared_flat_field()).unwrap();
        assert!(b.epoch() > a.epoch());
    }

    #[test]
    fn test_terminated_session_rejects_requests() {
        let mut dispatcher = ChunkDispatcher::new(Arc::new(TagMesher));
        let mut session = dispatcher.start_session(shared_flat_field()).unwrap();
        dispatcher.terminate(&mut session);

        assert_eq!(session.state(), SessionState::Terminated);
        assert!(!dispatcher.request_chunk(&mut session, request(0)));
        session.mark_ready();
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn test_terminated_session_never_delivers() {
        let gate = Arc::new(GateMesher::default());
        let mut dispatcher = ChunkDispatcher::new(gate.clone());
        let mut session = dispatcher.start_session(shared_flat_field()).unwrap();
        dispatcher.request_chunk(&mut session, request(0));
        dispatcher.request_chunk(&mut session, request(1));

        let deadline = Instant::now() + Duration::from_secs(5);
        while gate.entered.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(gate.entered.load(Ordering::SeqCst), 1);

        dispatcher.terminate(&mut session);
        gate.open();
        thread::sleep(Duration::from_millis(50));

        let events = dispatcher.poll();
        assert!(chunk_keys(&events).is_empty());
        // The queued second request was never started
        assert_eq!(gate.entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mesher_panic_skips_only_that_chunk() {
        let mut dispatcher = ChunkDispatcher::new(Arc::new(FlakyMesher));
        let mut session = dispatcher.start_session(shared_flat_field()).unwrap();
        dispatcher.request_chunk(&mut session, request(-1));
        dispatcher.request_chunk(&mut session, request(2));

        let events = collect_until(&mut dispatcher, |ev| !chunk_keys(ev).is_empty());
        assert_eq!(chunk_keys(&events), vec![ChunkKey::new(2, 0, 0)]);
        assert!(session.is_outstanding(ChunkKey::new(-1, 0, 0)));
    }

    #[test]
    fn test_per_session_field_matches_shared() {
        let blueprints = default_blueprints();
        let mut composer = NoiseComposer::new();
        composer.buffer_all(&blueprints).unwrap();
        let shared = Arc::new(composer.compose_layered(&blueprints, 8.0).unwrap());

        let req = ChunkRequest {
            key: ChunkKey::new(0, 0, 0),
            dims: UVec3::splat(16),
            world_offset: IVec3::ZERO,
        };
        let mut dispatcher = ChunkDispatcher::new(Arc::new(MarchingCubes::default()));

        let mut a = dispatcher.start_session(FieldSource::Shared(shared)).unwrap();
        dispatcher.request_chunk(&mut a, req);
        let mut b = dispatcher
            .start_session(FieldSource::Blueprints { blueprints, vertical_bias: 8.0 })
            .unwrap();
        dispatcher.request_chunk(&mut b, req);

        let events = collect_until(&mut dispatcher, |ev| chunk_keys(ev).len() == 2);
        let buffers: Vec<(Epoch, &Vec<f32>)> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::ChunkDone { epoch, triangles, .. } => Some((*epoch, triangles)),
                _ => None,
            })
            .collect();
        assert_eq!(buffers.len(), 2);
        assert_ne!(buffers[0].0, buffers[1].0);
        assert!(!buffers[0].1.is_empty());
        assert_eq!(buffers[0].1, buffers[1].1);
    }

    #[test]
    fn test_bad_blueprints_never_ready() {
        let mut dispatcher = ChunkDispatcher::new(Arc::new(TagMesher));
        let bad = vec![NoiseBlueprint::new(0, glam::Mat4::ZERO, glam::Mat4::IDENTITY, 1.0)];
        let mut session = dispatcher
            .start_session(FieldSource::Blueprints { blueprints: bad, vertical_bias: 8.0 })
            .unwrap();
        dispatcher.request_chunk(&mut session, request(0));

        thread::sleep(Duration::from_millis(50));
        assert!(dispatcher.poll().is_empty());
    }
}
