//! Headless client binary.
//!
//! Usage:
//!   cargo run -p sync_client -- [--addr 127.0.0.1:40000] [--name Player]
//!
//! Connects, logs in, joins, then runs the foreground tick loop: draining
//! inbound sync, publishing reconciled poses, and uploading the (static)
//! local pose. Useful for soaking a server without a rendering frontend.

use std::env;
use std::time::{Duration, Instant};

use anyhow::Context;
use sync_client::client::{GameClient, GameEvent};
use sync_client::movement::{PoseFrame, PoseSink};
use sync_client::upload::LocalPose;
use sync_shared::config::ClientConfig;
use tracing::{debug, info};

fn parse_args() -> ClientConfig {
    let mut cfg = ClientConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.username = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

/// Logs published poses instead of driving a scene.
struct LogSink {
    frames: u64,
}

impl PoseSink for LogSink {
    fn apply(&mut self, eid: i32, frame: &PoseFrame) {
        self.frames += 1;
        if self.frames % 64 == 0 {
            debug!(eid, position = ?frame.position, speed = frame.animation_speed, "pose");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(server = %cfg.server_addr, name = %cfg.username, "Starting client");

    let tick_interval = Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);
    let mut client = GameClient::connect(cfg).await.context("connect")?;
    client.login()?;

    let mut sink = LogSink { frames: 0 };
    let start = Instant::now();
    let mut last = 0.0f32;
    let mut local_pose: Option<LocalPose> = None;

    loop {
        let now = start.elapsed().as_secs_f32();
        let dt = now - last;
        last = now;

        client.tick(now, dt, &mut sink)?;

        for event in client.take_events() {
            match event {
                GameEvent::PlayerJoined { eid, position } => {
                    info!(eid, ?position, "player joined, starting upload");
                    local_pose = Some(LocalPose {
                        position,
                        ..Default::default()
                    });
                }
                GameEvent::ConnectionLost => {
                    info!("Disconnected from server.");
                    return Ok(());
                }
                other => debug!(event = ?other, "event"),
            }
        }

        // A real frontend would feed the character controller's pose
        // here; standing still is enough to exercise the upload path.
        if let Some(pose) = &local_pose {
            client.drive_local(now, dt, pose)?;
        }

        tokio::time::sleep(tick_interval).await;
    }
}
