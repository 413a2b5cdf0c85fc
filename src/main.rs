pub mod config;
pub mod device;
pub mod host;
pub mod interaction;
pub mod profile;
pub mod scene;
pub mod session;

use color_eyre::{eyre::eyre, Result};
use glam::{Quat, Vec3};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{default_config_path, BackendKind, ProfileSource, Settings};
use crate::device::{GamepadSnapshot, Handedness, InputSourceDescriptor, Pose};
use crate::host::{GamepadBackend, HostSignal, ScriptHandle, ScriptedBackend};
use crate::interaction::InputEdge;
use crate::profile::{HttpProfileService, ProfileService, StaticProfileService};
use crate::scene::{NodeId, Scene};
use crate::session::SessionHandle;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = match default_config_path() {
        Ok(path) => Settings::load_or_init(&path)
            .map_err(|e| eyre!("Failed to load configuration: {}", e))?,
        Err(e) => {
            warn!("{}, using default configuration", e);
            Settings::default()
        }
    };

    let (scene, volume) = build_demo_scene()?;

    let service: Arc<dyn ProfileService> = match settings.profiles.source {
        ProfileSource::Bundled => Arc::new(
            StaticProfileService::bundled()
                .map_err(|e| eyre!("Failed to load bundled profiles: {}", e))?,
        ),
        ProfileSource::Remote => Arc::new(HttpProfileService::new(
            &settings.profiles.base_url,
            &settings.profiles.default_profile_id,
        )),
    };

    match settings.host.backend {
        BackendKind::Gamepad => run_gamepad_session(scene, volume, service, &settings).await,
        BackendKind::Scripted => run_scripted_session(scene, volume, service, &settings).await,
    }
}

/// A small room: one interaction volume with three grabbable cubes in front
/// of the spawn point.
fn build_demo_scene() -> Result<(Scene, NodeId)> {
    let mut scene = Scene::new();
    let volume = scene.add_node(scene.root(), "volume")?;

    let positions = [
        Vec3::new(-0.6, 1.2, -2.0),
        Vec3::new(0.0, 1.6, -2.0),
        Vec3::new(0.6, 2.0, -2.0),
    ];
    for (i, position) in positions.iter().enumerate() {
        let cube = scene.add_node(volume, &format!("cube-{i}"))?;
        scene.set_translation(cube, *position)?;
        scene.set_bounding_radius(cube, 0.25)?;
    }
    Ok((scene, volume))
}

/// Interactive mode: a desktop gamepad drives the simulated controller.
async fn run_gamepad_session(
    scene: Scene,
    volume: NodeId,
    service: Arc<dyn ProfileService>,
    settings: &Settings,
) -> Result<()> {
    info!("Starting gamepad-driven session");
    let backend = GamepadBackend::new(settings.gamepad_settings())
        .map_err(|e| eyre!("Failed to start gamepad backend: {}", e))?;

    let handle = SessionHandle::spawn(
        scene,
        volume,
        Box::new(backend),
        service,
        settings.interaction_settings(),
        settings.session_settings(),
    )
    .map_err(|e| eyre!("Failed to spawn session: {}", e))?;

    let mut status = handle.subscribe();
    info!("Session running, press Ctrl-C to exit");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    warn!("Session ended on its own");
                    return Ok(());
                }
                let board = *status.borrow_and_update();
                info!("Device status: {:?}", board);
            }
        }
    }
}

/// Offline mode: a canned connect / select / grab / release choreography.
async fn run_scripted_session(
    scene: Scene,
    volume: NodeId,
    service: Arc<dyn ProfileService>,
    settings: &Settings,
) -> Result<()> {
    info!("Starting scripted session");
    let (backend, script) = ScriptedBackend::new();

    let handle = SessionHandle::spawn(
        scene,
        volume,
        Box::new(backend),
        service,
        settings.interaction_settings(),
        settings.session_settings(),
    )
    .map_err(|e| eyre!("Failed to spawn session: {}", e))?;
    let status = handle.subscribe();

    run_choreography(&script).await;
    info!("Choreography finished, final status: {:?}", *status.borrow());
    Ok(())
}

/// Connects the right-hand controller, points it at the middle cube, grabs it
/// and lets it go again, then disconnects.
async fn run_choreography(script: &ScriptHandle) {
    script.set_pose(
        0,
        Pose {
            position: Vec3::new(0.0, 1.6, 0.0),
            orientation: Quat::IDENTITY,
        },
    );
    script.feed(HostSignal::Connected {
        index: 0,
        descriptor: InputSourceDescriptor::new(Handedness::Right, &[]),
    });
    sleep(Duration::from_millis(500)).await;

    // Hold the trigger: the laser is live and the middle cube gets picked.
    script.set_snapshot(
        0,
        GamepadSnapshot {
            buttons: vec![1.0, 0.0, 0.0, 0.0],
            axes: vec![0.0, 0.0, 0.0, 0.0],
        },
    );
    script.feed(HostSignal::Input {
        index: 0,
        edge: InputEdge::SelectStart,
    });
    sleep(Duration::from_millis(800)).await;

    // Squeeze to grab, drag the hand sideways, release.
    script.feed(HostSignal::Input {
        index: 0,
        edge: InputEdge::SqueezeStart,
    });
    sleep(Duration::from_millis(400)).await;
    script.set_pose(
        0,
        Pose {
            position: Vec3::new(0.4, 1.6, 0.0),
            orientation: Quat::IDENTITY,
        },
    );
    sleep(Duration::from_millis(400)).await;
    script.feed(HostSignal::Input {
        index: 0,
        edge: InputEdge::SqueezeEnd,
    });
    script.feed(HostSignal::Input {
        index: 0,
        edge: InputEdge::SelectEnd,
    });
    sleep(Duration::from_millis(500)).await;

    script.feed(HostSignal::Disconnected { index: 0 });
    sleep(Duration::from_millis(300)).await;
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
