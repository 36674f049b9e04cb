use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cgmath::{Deg, Point3};
use voxel_session::config::{GenerationMethod, GenerationOptions, SessionOptions};
use voxel_session::error::{PersistenceError, SessionError};
use voxel_session::session_state::camera_state::camera::Camera;
use voxel_session::session_state::rendering::backend::{HeadlessBackend, RenderBackend};
use voxel_session::session_state::voxels::block::{block_type::BlockType, Voxel};
use voxel_session::session_state::voxels::chunk::ChunkData;
use voxel_session::session_state::voxels::persistence::{ChunkPersistence, MemoryPersistence};
use voxel_session::session_state::voxels::ChunkCoord;
use voxel_session::session_state::SessionState;

const FRAME: Duration = Duration::from_millis(16);
const ORIGIN: ChunkCoord = Point3 { x: 0, y: 0, z: 0 };

/// Persistence that remembers which chunks were saved.
#[derive(Clone, Default)]
struct RecordingPersistence {
    records: Arc<Mutex<HashMap<ChunkCoord, ChunkData>>>,
    saved: Arc<Mutex<Vec<ChunkCoord>>>,
}

impl ChunkPersistence for RecordingPersistence {
    fn load_chunk(&mut self, coord: ChunkCoord) -> Result<Option<ChunkData>, PersistenceError> {
        Ok(self.records.lock().unwrap().get(&coord).cloned())
    }

    fn save_chunk(&mut self, coord: ChunkCoord, data: &ChunkData) -> Result<(), PersistenceError> {
        self.records.lock().unwrap().insert(coord, data.clone());
        self.saved.lock().unwrap().push(coord);
        Ok(())
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Flat terrain whose surface is the top of chunk layer y = 0.
fn options() -> SessionOptions {
    SessionOptions {
        render_distance: 1,
        mesh_workers: 2,
        generation: GenerationOptions {
            method: GenerationMethod::Flat,
            surface_height: 8,
            seed: 0,
        },
        ..SessionOptions::default()
    }
}

fn camera_at(x: f32, y: f32, z: f32) -> Camera {
    Camera::new(Point3::new(x, y, z), Deg(0.0), Deg(-30.0))
}

fn session(options: SessionOptions) -> SessionState<HeadlessBackend> {
    init_logging();
    SessionState::new(options, HeadlessBackend::new(), Box::new(MemoryPersistence::new())).unwrap()
}

fn run_until_idle<B: RenderBackend>(session: &mut SessionState<B>, camera: &Camera) {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        session.tick(FRAME, camera).unwrap();
        if session.is_idle() {
            return;
        }
        assert!(Instant::now() < deadline, "session never settled: {:?}", session.stats());
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn streams_meshes_and_draws_the_camera_chunk() {
    let mut session = session(options());
    let camera = camera_at(8.0, 12.0, 8.0);
    run_until_idle(&mut session, &camera);

    assert_eq!(session.store().len(), 27);
    let center = session.store().get(ORIGIN).unwrap();
    assert_eq!(center.mesh_quad_count(), 256);
    // Only the centre chunk has all six neighbours loaded.
    assert_eq!(session.backend().live_buffer_count(), 1);

    let visible = session.render().unwrap();
    assert_eq!(visible.coords().collect::<Vec<_>>(), vec![ORIGIN]);
    let draws = session.backend_mut().take_draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].region.index_count, 256 * 6);

    let stats = session.stats();
    assert_eq!(stats.visible_chunk_count, 1);
    assert_eq!(stats.total_quads, 256);
    assert_eq!(stats.pending_uploads, 0);
    assert!(stats.chunk_update_counter >= 1);
}

#[test]
fn repeated_edits_leave_only_the_latest_generation_uploaded() {
    let mut session = session(options());
    let camera = camera_at(8.0, 12.0, 8.0);
    run_until_idle(&mut session, &camera);

    assert!(session.set_block(Point3::new(4, 7, 4), Voxel::AIR));
    session.tick(FRAME, &camera).unwrap();
    assert!(session.set_block(Point3::new(10, 7, 10), Voxel::AIR));
    session.tick(FRAME, &camera).unwrap();
    assert!(session.set_block(Point3::new(10, 7, 10), Voxel::AIR));
    run_until_idle(&mut session, &camera);

    let center = session.store().get(ORIGIN).unwrap();
    let mesh = center.gpu_mesh().unwrap();
    assert_eq!(mesh.generation, center.generation());
    // Each hole swaps one top face for a lower one and exposes four walls.
    assert_eq!(mesh.quad_count, 256 + 4 + 4);
    assert_eq!(session.voxel_at(Point3::new(4, 7, 4)), Some(Voxel::AIR));
}

#[test]
fn edits_outside_loaded_chunks_are_refused() {
    let mut session = session(options());
    let camera = camera_at(8.0, 12.0, 8.0);
    session.tick(FRAME, &camera).unwrap();
    assert!(!session.set_block(Point3::new(500, 0, 0), Voxel::new(BlockType::STONE)));
}

#[test]
fn visibility_is_stable_across_frames() {
    let mut session = session(SessionOptions {
        render_distance: 2,
        ..options()
    });
    let camera = camera_at(8.0, 20.0, 8.0);
    run_until_idle(&mut session, &camera);

    let first = session.render().unwrap();
    let second = session.render().unwrap();
    assert_eq!(first, second);
    assert!(first.len() > 1);
    assert!(first
        .chunks()
        .windows(2)
        .all(|pair| pair[0].distance_squared <= pair[1].distance_squared));
    assert_eq!(first.chunks()[0].coord, ORIGIN);
}

#[test]
fn chunks_left_behind_release_their_buffers() {
    let mut session = session(SessionOptions {
        chunk_retention_margin: 0,
        ..options()
    });
    run_until_idle(&mut session, &camera_at(8.0, 12.0, 8.0));
    assert_eq!(session.backend().live_buffer_count(), 1);

    let far = camera_at(16.0 * 50.0 + 8.0, 12.0, 8.0);
    run_until_idle(&mut session, &far);

    assert!(session.store().get(ORIGIN).is_none());
    assert_eq!(session.store().len(), 27);
    assert_eq!(session.backend().live_buffer_count(), 1);
    assert!(session.store().get(Point3::new(50, 0, 0)).unwrap().gpu_mesh().is_some());
}

#[test]
fn unloading_during_a_build_discards_the_late_mesh() {
    let mut session = session(SessionOptions {
        max_loads_per_tick: 1,
        chunk_retention_margin: 0,
        ..options()
    });
    let camera = camera_at(8.0, 12.0, 8.0);

    // The centre chunk loads first; its build is dispatched once all six neighbours follow.
    session.tick(FRAME, &camera).unwrap();
    let center = session.store().get(ORIGIN).unwrap().data().clone();
    let writer = center.get_mut();
    let deadline = Instant::now() + Duration::from_secs(30);
    while session.stats().chunk_update_counter == 0 {
        assert!(Instant::now() < deadline, "build never dispatched");
        session.tick(FRAME, &camera).unwrap();
    }
    assert_eq!(session.stats().builds_in_flight, 1);

    // Fly into open sky so nothing near the new camera chunk has faces.
    let sky = camera_at(8.0, 16.0 * 50.0 + 8.0, 8.0);
    let mut discarded = session.tick(FRAME, &sky).unwrap().discarded;
    assert!(session.store().get(ORIGIN).is_none());
    drop(writer);

    let deadline = Instant::now() + Duration::from_secs(30);
    while !session.is_idle() {
        assert!(Instant::now() < deadline, "session never settled: {:?}", session.stats());
        discarded += session.tick(FRAME, &sky).unwrap().discarded;
        std::thread::sleep(Duration::from_millis(1));
    }

    assert!(discarded >= 1);
    assert_eq!(session.stats().builds_in_flight, 0);
    assert_eq!(session.backend().live_buffer_count(), 0);
    assert!(session.store().get(ORIGIN).is_none());
}

#[test]
fn allocation_failure_is_fatal() {
    init_logging();
    let mut session = SessionState::new(
        options(),
        HeadlessBackend::with_memory_budget(1024),
        Box::new(MemoryPersistence::new()),
    )
    .unwrap();
    let camera = camera_at(8.0, 12.0, 8.0);

    let deadline = Instant::now() + Duration::from_secs(30);
    let err = loop {
        match session.tick(FRAME, &camera) {
            Ok(_) => assert!(Instant::now() < deadline, "allocation never attempted"),
            Err(err) => break err,
        }
        std::thread::sleep(Duration::from_millis(1));
    };
    assert!(matches!(err, SessionError::Resource { coord: Some(c), .. } if c == ORIGIN));
}

#[test]
fn frames_ahead_are_bounded() {
    let mut session = session(SessionOptions {
        max_frames_ahead: 2,
        ..options()
    });
    let camera = camera_at(8.0, 12.0, 8.0);
    session.tick(FRAME, &camera).unwrap();

    for _ in 0..5 {
        session.render().unwrap();
        assert!(session.stats().fences_in_flight <= 2);
    }
    assert_eq!(session.stats().fences_in_flight, 2);
    assert_eq!(session.backend().waited_fences().len(), 3);
}

#[test]
fn eager_sync_retires_every_frame() {
    let mut session = session(SessionOptions {
        eager_sync: true,
        ..options()
    });
    let camera = camera_at(8.0, 12.0, 8.0);
    session.tick(FRAME, &camera).unwrap();

    session.render().unwrap();
    session.render().unwrap();
    assert_eq!(session.stats().fences_in_flight, 0);
    assert_eq!(session.backend().waited_fences().len(), 2);
}

#[test]
fn shutdown_releases_gpu_state_and_saves_edits() {
    init_logging();
    let persistence = RecordingPersistence::default();
    let mut session = SessionState::new(
        options(),
        HeadlessBackend::new(),
        Box::new(persistence.clone()),
    )
    .unwrap();
    let camera = camera_at(8.0, 12.0, 8.0);
    run_until_idle(&mut session, &camera);
    for _ in 0..3 {
        session.render().unwrap();
    }
    assert!(session.set_block(Point3::new(1, 1, 1), Voxel::new(BlockType::GLASS)));

    session.shutdown().unwrap();
    session.shutdown().unwrap();

    assert_eq!(session.backend().live_buffer_count(), 0);
    assert_eq!(session.backend().live_fence_count(), 0);
    assert_eq!(session.stats().fences_in_flight, 0);
    assert_eq!(*persistence.saved.lock().unwrap(), vec![ORIGIN]);
    let saved = persistence.records.lock().unwrap()[&ORIGIN].get(1, 1, 1);
    assert_eq!(saved.block_type(), BlockType::GLASS);
}

#[test]
fn saved_edits_survive_a_new_session() {
    init_logging();
    let persistence = RecordingPersistence::default();
    let camera = camera_at(8.0, 12.0, 8.0);
    {
        let mut session =
            SessionState::new(options(), HeadlessBackend::new(), Box::new(persistence.clone()))
                .unwrap();
        run_until_idle(&mut session, &camera);
        assert!(session.set_block(Point3::new(4, 7, 4), Voxel::AIR));
    }

    let mut session =
        SessionState::new(options(), HeadlessBackend::new(), Box::new(persistence)).unwrap();
    run_until_idle(&mut session, &camera);
    assert_eq!(session.voxel_at(Point3::new(4, 7, 4)), Some(Voxel::AIR));
    assert_eq!(session.store().get(ORIGIN).unwrap().mesh_quad_count(), 256 + 4);
}
