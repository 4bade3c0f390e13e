//! Headless flythrough
//!
//! Builds a small terrain on the default adapter, flies the camera in a
//! slow arc and logs what each frame recomputed. Pass a TOML config path
//! as the first argument to override the built-in one.
//!
//! Run with `RUST_LOG=info cargo run --example headless_flythrough`.

use anyhow::{Context, Result};
use hearth_terrain::camera::{CameraConfig, FlightInput};
use hearth_terrain::edits::TerrainEdit;
use hearth_terrain::{
    FlyCamera, RenderMode, ShadingSettings, SkyLighting, TerrainConfig, TerrainSystem, WgpuBackend,
};

const FRAMES: u32 = 120;
const FRAME_TIME: f32 = 1.0 / 60.0;

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => TerrainConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => TerrainConfig {
            subdivisions: 31,
            lod_levels: 4,
            height_resolution: 512,
            shadow_resolution: 256,
            material_resolution: 256,
            material_layers: 2,
            ..TerrainConfig::default()
        },
    };

    let mut backend = WgpuBackend::new_headless((640, 360)).context("creating headless device")?;
    let mut terrain = TerrainSystem::new(&mut backend, config).context("building terrain")?;

    let mut camera = FlyCamera::new(&CameraConfig::default());
    let sky = SkyLighting::default();

    let shading = ShadingSettings {
        fog: false,
        ..*terrain.renderer().shading()
    };
    terrain.renderer_mut().set_shading(shading);

    let startup = terrain.update(&mut backend, &camera)?;
    log::info!(
        "[headless_flythrough] startup ran {} dispatches",
        startup.total_dispatches()
    );

    let turn = FlightInput {
        forward: 1.0,
        turn: 0.004,
        ..FlightInput::default()
    };

    let mut total_dispatches = 0;
    for frame in 0..FRAMES {
        camera.advance(&turn, FRAME_TIME);

        if frame == FRAMES / 2 {
            terrain
                .apply_edits(&[TerrainEdit::RequestFullUpdate])
                .context("requesting full update")?;
        }

        let report = terrain.update(&mut backend, &camera)?;
        total_dispatches += report.total_dispatches();

        let draws = terrain.render(&mut backend, &camera, RenderMode::Shaded, &sky)?;
        if report.displacement.dispatches > 0 {
            log::info!(
                "[headless_flythrough] frame {}: {} displacement dispatches{}, {} draws, culled {:?}",
                frame,
                report.displacement.dispatches,
                if report.displacement.full { " (full)" } else { "" },
                draws.items.len(),
                draws.culled_grids
            );
        }
    }
    log::info!(
        "[headless_flythrough] {} frames, {} dispatches after startup",
        FRAMES,
        total_dispatches
    );

    let finest = terrain
        .renderer()
        .clipmap()
        .height_buffer(0)
        .context("finest level has no height buffer")?;
    let heights = backend.read_buffer_f32(finest)?;
    let (low, high) = heights
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)));
    println!(
        "finest ring: {} vertices, heights {:.2} to {:.2}",
        heights.len(),
        low,
        high
    );

    Ok(())
}
