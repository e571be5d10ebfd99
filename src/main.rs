//! Headless terrain streaming demo
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Terrain config JSON (default: built-in octaves)
//!   --frames <N>      Frames to simulate (default: 600)
//!   --speed <UNITS>   Distance travelled along -z per frame (default: 0.5)
//!   --print-shader    Print the WGSL layered-noise function and exit

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;

use terrastream::core::{Result, logging};
use terrastream::gpu;
use terrastream::streaming::{MeshRegistry, TerrainConfig, TerrainStreamer};
use terrastream::terrain::find_starting_location;

const FRAME_TIME: Duration = Duration::from_millis(16);
const STATS_INTERVAL: u64 = 60;
/// Where the walk toward the surface starts
const SPAWN_SEARCH_START: Vec3 = Vec3::new(16.0, 18.0, 8.0);

fn main() {
    logging::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = parse_path_arg(&args, "--config");
    let frames = parse_u64_arg(&args, "--frames").unwrap_or(600);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(0.5);

    let config = match config_path {
        Some(path) => TerrainConfig::from_json_file(path)?,
        None => TerrainConfig::default(),
    };

    if args.iter().any(|a| a == "--print-shader") {
        println!(
            "{}",
            gpu::layered_noise_wgsl(&config.blueprints, "sample_terrain", config.vertical_bias, 0)
        );
        return Ok(());
    }

    let mut streamer = TerrainStreamer::with_marching_cubes(config)?;
    let mut scene = MeshRegistry::new();

    let mut viewpoint = find_starting_location(streamer.field().as_ref(), SPAWN_SEARCH_START);
    log::info!("Starting at {:?}", viewpoint);

    let started = Instant::now();
    for frame in 0..frames {
        streamer.update(viewpoint, &mut scene)?;

        if frame % STATS_INTERVAL == 0 {
            let stats = streamer.stats();
            log::info!(
                "frame {}: center {:?}, {} chunks ({} pending), {} meshes / {} tris, {} stale",
                frame,
                streamer.center(),
                streamer.len(),
                streamer.pending(),
                scene.live_count(),
                scene.total_triangles(),
                stats.stale_results
            );
        }

        viewpoint.z -= speed;
        thread::sleep(FRAME_TIME);
    }

    let stats = streamer.stats();
    log::info!(
        "Done after {:.1}s: {} sessions, {} requested, {} materialized ({} empty), {} evicted",
        started.elapsed().as_secs_f32(),
        stats.sessions_started,
        stats.chunks_requested,
        stats.chunks_materialized,
        stats.empty_chunks,
        stats.chunks_evicted
    );

    streamer.shutdown(&mut scene);
    Ok(())
}

fn parse_path_arg(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
