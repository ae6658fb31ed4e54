use anyhow::Result;
use glam::DVec3;
use log::info;

use sfsim_physics::{
    EngineRuntime, PhysicsWorld, RuntimeSettings, WorldSettings, FIXED_TIMESTEP,
};

/// Collision substeps per frame
const SUBSTEPS: u32 = 4;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Starting physics demo...");

    let runtime = EngineRuntime::init(RuntimeSettings::default())?;
    let mut world = PhysicsWorld::new(&runtime, WorldSettings::default());

    let ball = world.create_sphere(1.0, DVec3::ZERO)?;
    world.optimize_broad_phase();

    // One second of free fall
    for frame in 1..=60 {
        world.step(FIXED_TIMESTEP, SUBSTEPS);
        if frame % 15 == 0 {
            info!("t = {:.2}s, height = {:.3}", frame as f32 * FIXED_TIMESTEP, world.translation(ball)?.y);
        }
    }

    info!("final velocity: {:?}", world.linear_velocity(ball)?);

    world.destroy_body(ball)?;
    drop(world);
    runtime.shutdown();

    info!("Demo finished");
    Ok(())
}
