use clap::Parser;
use client::game::{ClientSession, SpawnKind};
use client::input::InputManager;
use client::network::NetworkHandle;
use client::rendering::{Hud, MacroquadScene, Renderer};
use log::{error, info};
use macroquad::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Room id to join; a new room is created when omitted
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// Window width
    #[arg(short = 'w', long, default_value = "1024")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "768")]
    height: i32,

    /// Start with the collision wireframe overlay visible
    #[arg(short = 'd', long)]
    debug: bool,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Physics Rooms".to_string(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("Connecting to: {}", args.server);
    info!("Controls: 1/2 spawn sphere/box, R reset, N new room, L leave, G debug overlay");

    let network = match NetworkHandle::spawn(args.server.clone()) {
        Ok(network) => network,
        Err(e) => {
            error!("Failed to start network thread: {}", e);
            return;
        }
    };

    let mut session = ClientSession::new(MacroquadScene::new(), args.room.clone());
    let mut renderer = Renderer::new(args.debug);
    let mut input = InputManager::new();

    while !is_key_pressed(KeyCode::Escape) {
        // Packets are only applied here, between frames.
        for event in network.poll() {
            for packet in session.handle_event(event) {
                network.send(packet);
            }
        }

        let dt = get_frame_time();
        let actions = input.update(dt);
        let gizmo = input.gizmo();
        let spawn_at = shared::Vec3::new(gizmo.x, gizmo.y, gizmo.z);

        if actions.spawn_sphere {
            if let Some(packet) = session.spawn(SpawnKind::Sphere, spawn_at) {
                network.send(packet);
            }
        }
        if actions.spawn_box {
            if let Some(packet) = session.spawn(SpawnKind::Box, spawn_at) {
                network.send(packet);
            }
        }
        if actions.reset {
            if let Some(packet) = session.reset() {
                network.send(packet);
            }
        }
        if actions.leave {
            if let Some(packet) = session.leave_room() {
                network.send(packet);
            }
        }
        if actions.new_room {
            for packet in session.request_new_room() {
                network.send(packet);
            }
        }
        if actions.toggle_debug {
            info!("Debug overlay: {}", renderer.toggle_debug());
        }

        session.interpolate(dt);

        let hud = Hud {
            connected: session.is_connected(),
            room: session.room().room_id().map(str::to_string),
            object_count: session.reconciler().len(),
            last_tick: session.last_tick(),
        };
        let camera = Renderer::camera(input.camera_yaw(), input.camera_pitch());
        renderer.render(
            session.reconciler().scene(),
            session.reconciler().shadow(),
            &camera,
            gizmo,
            &hud,
        );

        next_frame().await;
    }

    if let Some(packet) = session.leave_room() {
        network.send(packet);
    }
    network.send(shared::Packet::Disconnect);
}
