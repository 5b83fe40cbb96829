//! Client implementation.
//!
//! `GameClient` owns the connection, the handler table, and the world —
//! the connection-scoped entity table, clock state, and pending events.
//! Collaborators (rendering, animation, input) never see the wire: they
//! consume pose frames through a [`PoseSink`], drain [`GameEvent`]s, and
//! feed the local character's pose back in for upload.
//!
//! Everything here runs on the single foreground logical thread; the
//! socket loops in [`crate::connection`] only ever hand over raw bytes.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tracing::{debug, info, warn};

use sync_shared::clock::ClockSync;
use sync_shared::config::ClientConfig;
use sync_shared::math::{Quat, Vec3};
use sync_shared::messages::{
    decode_payload, encode_payload, AnimationData, AoiUpdates, EntitiesEnterSight,
    EntitiesLeaveSight, JoinReply, LoginReply, LoginRequest, NormalAttack, PlayerAnimation,
    PlayerDeltaInfo, PlayerInfo, Pong, QueryPath, QueryPathResult, SkillAttack, TakeDamage,
    MSG_ENTITIES_ENTER_SIGHT, MSG_ENTITIES_LEAVE_SIGHT, MSG_JOIN, MSG_JOIN_REPLY, MSG_LOGIN,
    MSG_LOGIN_REPLY, MSG_NORMAL_ATTACK, MSG_PING, MSG_PONG, MSG_QUERY_PATH,
    MSG_QUERY_PATH_RESULT, MSG_SKILL_ATTACK, MSG_SYNC_ANIMATION, MSG_SYNC_AOI_UPDATE,
    MSG_SYNC_DELTA_INFO, MSG_SYNC_FULL_INFO, MSG_TAKE_DAMAGE, MSG_UPLOAD_MOVEMENT,
};
use crate::connection::{ConnEvent, Connection};
use crate::entity::{Eid, EntityKind, GameEntity, NetRole};
use crate::movement::{FreeIntegrator, MotionIntegrator, PoseSink};
use crate::router::MessageRouter;
use crate::upload::{LocalPose, MovementUploader};

/// Things collaborators react to, drained once per tick.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    LoginOk { eid: Eid },
    LoginFailed { result: i32 },
    PlayerJoined { eid: Eid, position: Vec3 },
    JoinFailed { result: i32 },
    EntityEntered { eid: Eid },
    EntityLeft { eid: Eid },
    /// A locally-predicted cast started; play its animation now.
    SkillCastStarted { eid: Eid, skill_id: i32, animator_state: String },
    SwingStarted { eid: Eid, clip: String, play_rate: f32 },
    Damaged { eid: Eid, damage: i32 },
    Animation { eid: Eid, data: AnimationData },
    PathFound { paths: Vec<Vec3> },
    ConnectionLost,
}

/// Connection-scoped game state. Owned by [`GameClient`], mutated only on
/// the foreground tick.
pub struct ClientWorld {
    pub cfg: ClientConfig,
    pub clock: ClockSync,
    pub entities: HashMap<Eid, GameEntity>,
    pub player_eid: Option<Eid>,
    pub integrator: Box<dyn MotionIntegrator + Send>,

    now: f32,
    events: Vec<GameEvent>,
    outbox: Vec<(&'static str, Bytes)>,
}

impl ClientWorld {
    fn new(cfg: ClientConfig, integrator: Box<dyn MotionIntegrator + Send>) -> Self {
        let clock = ClockSync::new(cfg.ping_interval);
        Self {
            cfg,
            clock,
            entities: HashMap::new(),
            player_eid: None,
            integrator,
            now: 0.0,
            events: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn player(&self) -> Option<&GameEntity> {
        self.entities.get(&self.player_eid?)
    }

    pub fn player_mut(&mut self) -> Option<&mut GameEntity> {
        let eid = self.player_eid?;
        self.entities.get_mut(&eid)
    }

    /// Estimated server time at the current tick, in integer ticks.
    pub fn server_time(&self) -> i32 {
        self.clock.server_time(self.now)
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Defers a bodyless message to the end of the current tick; handlers
    /// cannot reach the connection directly.
    fn queue_send_empty(&mut self, name: &'static str) {
        self.outbox.push((name, Bytes::new()));
    }
}

// ─── Inbound handlers ───

fn on_login_reply(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let reply: LoginReply = decode_payload(payload)?;
    if reply.result != 0 {
        warn!(result = reply.result, "login failed");
        world.emit(GameEvent::LoginFailed {
            result: reply.result,
        });
        return Ok(());
    }

    info!(eid = reply.eid, "login succeeded");
    world.player_eid = Some(reply.eid);
    world.emit(GameEvent::LoginOk { eid: reply.eid });
    // Scene loading is the embedder's concern; join right away.
    world.queue_send_empty(MSG_JOIN);
    Ok(())
}

fn on_join_reply(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let reply: JoinReply = decode_payload(payload)?;
    if reply.result != 0 {
        warn!(result = reply.result, "join failed");
        world.emit(GameEvent::JoinFailed {
            result: reply.result,
        });
        return Ok(());
    }

    let eid = world.player_eid.context("join_reply before login_reply")?;
    info!(eid, position = ?reply.position, "joined space");

    let mut entity = GameEntity::new(EntityKind::Player, NetRole::Autonomous, &world.cfg.movement);
    entity.eid = eid;
    entity.name = world.cfg.username.clone();
    entity.movement.set_pose(reply.position, Quat::IDENTITY);
    world.entities.insert(eid, entity);

    world.emit(GameEvent::PlayerJoined {
        eid,
        position: reply.position,
    });
    Ok(())
}

fn on_entities_enter_sight(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let sight: EntitiesEnterSight = decode_payload(payload)?;
    let rtt = world.clock.rtt();

    for aoi in sight.entities {
        let Some(kind) = EntityKind::from_type_name(&aoi.entity_type) else {
            warn!(entity_type = %aoi.entity_type, "unknown entity type, skipping");
            continue;
        };

        let mut entity = GameEntity::new(kind, NetRole::Simulate, &world.cfg.movement);
        entity
            .movement
            .set_pose(aoi.position, Quat::from_euler_deg(aoi.rotation));
        entity.read_full(&aoi.data, rtt, world.integrator.as_mut())?;

        let eid = entity.eid;
        debug!(eid, kind = ?kind, "entity entered sight");
        world.entities.insert(eid, entity);
        world.emit(GameEvent::EntityEntered { eid });
    }
    Ok(())
}

fn on_entities_leave_sight(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let sight: EntitiesLeaveSight = decode_payload(payload)?;
    for eid in sight.entities {
        if world.entities.remove(&eid).is_some() {
            debug!(eid, "entity left sight");
            world.emit(GameEvent::EntityLeft { eid });
        }
    }
    Ok(())
}

fn on_pong(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let pong: Pong = decode_payload(payload)?;
    let now = world.now;
    world.clock.on_pong(&pong, now);
    Ok(())
}

fn on_sync_animation(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let msg: PlayerAnimation = decode_payload(payload)?;
    if world.entities.contains_key(&msg.eid) {
        world.emit(GameEvent::Animation {
            eid: msg.eid,
            data: msg.data,
        });
    }
    Ok(())
}

fn on_take_damage(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let msg: TakeDamage = decode_payload(payload)?;
    if world.entities.contains_key(&msg.eid) {
        world.emit(GameEvent::Damaged {
            eid: msg.eid,
            damage: msg.damage,
        });
    }
    Ok(())
}

fn on_sync_full_info(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let info: PlayerInfo = decode_payload(payload)?;
    let rtt = world.clock.rtt();
    let ClientWorld {
        entities,
        player_eid,
        integrator,
        ..
    } = world;
    let Some(player) = player_eid.and_then(|eid| entities.get_mut(&eid)) else {
        warn!("sync_full_info but player entity not spawned");
        return Ok(());
    };
    player.read_full(&info.data, rtt, integrator.as_mut())?;
    Ok(())
}

fn on_sync_delta_info(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let info: PlayerDeltaInfo = decode_payload(payload)?;
    let rtt = world.clock.rtt();
    let ClientWorld {
        entities,
        player_eid,
        integrator,
        ..
    } = world;
    let Some(player) = player_eid.and_then(|eid| entities.get_mut(&eid)) else {
        warn!("sync_delta_info but player entity not spawned");
        return Ok(());
    };
    player.read_delta(&info.data, rtt, integrator.as_mut())?;
    Ok(())
}

fn on_sync_aoi_update(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let updates: AoiUpdates = decode_payload(payload)?;
    let rtt = world.clock.rtt();
    let ClientWorld {
        entities,
        integrator,
        ..
    } = world;

    for update in updates.datas {
        let Some(entity) = entities.get_mut(&update.eid) else {
            debug!(eid = update.eid, "aoi update for unknown entity");
            continue;
        };
        if let Some(data) = update.data {
            entity.read_delta(&data, rtt, integrator.as_mut())?;
        }
    }
    Ok(())
}

fn on_query_path_result(world: &mut ClientWorld, payload: &[u8]) -> anyhow::Result<()> {
    let result: QueryPathResult = decode_payload(payload)?;
    debug!(points = result.paths.len(), "path query result");
    world.emit(GameEvent::PathFound {
        paths: result.paths,
    });
    Ok(())
}

/// Builds the handler table for every inbound message.
pub fn default_router() -> MessageRouter {
    let mut router = MessageRouter::new();
    router.register(MSG_LOGIN_REPLY, on_login_reply);
    router.register(MSG_JOIN_REPLY, on_join_reply);
    router.register(MSG_ENTITIES_ENTER_SIGHT, on_entities_enter_sight);
    router.register(MSG_ENTITIES_LEAVE_SIGHT, on_entities_leave_sight);
    router.register(MSG_PONG, on_pong);
    router.register(MSG_SYNC_ANIMATION, on_sync_animation);
    router.register(MSG_TAKE_DAMAGE, on_take_damage);
    router.register(MSG_SYNC_FULL_INFO, on_sync_full_info);
    router.register(MSG_SYNC_DELTA_INFO, on_sync_delta_info);
    router.register(MSG_SYNC_AOI_UPDATE, on_sync_aoi_update);
    router.register(MSG_QUERY_PATH_RESULT, on_query_path_result);
    router
}

/// High-level game client.
pub struct GameClient {
    conn: Connection,
    router: MessageRouter,
    uploader: MovementUploader,
    pub world: ClientWorld,
}

impl GameClient {
    /// Connects to the server. No automatic login.
    pub async fn connect(cfg: ClientConfig) -> anyhow::Result<Self> {
        Self::connect_with_integrator(cfg, Box::new(FreeIntegrator)).await
    }

    /// Connects with a custom collision integrator.
    pub async fn connect_with_integrator(
        cfg: ClientConfig,
        integrator: Box<dyn MotionIntegrator + Send>,
    ) -> anyhow::Result<Self> {
        let conn = Connection::connect(
            &cfg.server_addr,
            Duration::from_millis(cfg.connect_timeout_ms),
            cfg.send_buffer_size,
        )
        .await
        .context("connect")?;

        let uploader = MovementUploader::new(cfg.upload_interval);
        let world = ClientWorld::new(cfg, integrator);
        Ok(Self {
            conn,
            router: default_router(),
            uploader,
            world,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn close(&self) {
        self.conn.close();
    }

    fn send<T: serde::Serialize>(&self, name: &str, msg: &T) -> anyhow::Result<()> {
        let payload = encode_payload(msg)?;
        self.conn.send(name, &payload)?;
        Ok(())
    }

    /// Sends the login request with the configured account name.
    pub fn login(&mut self) -> anyhow::Result<()> {
        let username = self.world.cfg.username.clone();
        info!(username = %username, "logging in");
        self.send(MSG_LOGIN, &LoginRequest { username })
    }

    /// Foreground driver, once per tick.
    ///
    /// Drains inbound frames and dispatches them, runs the ping cadence,
    /// advances every simulated entity's reconciliation and publishes the
    /// resulting poses, and flushes handler-queued outbound messages.
    pub fn tick(&mut self, now: f32, dt: f32, sink: &mut dyn PoseSink) -> anyhow::Result<()> {
        self.world.now = now;

        while let Some(event) = self.conn.poll() {
            match event {
                ConnEvent::Frame(frame) => self.router.dispatch(&mut self.world, &frame)?,
                ConnEvent::Lost => {
                    warn!("connection to server lost");
                    self.world.emit(GameEvent::ConnectionLost);
                }
            }
        }

        // Ping only once the autonomous entity exists.
        if self.world.player().is_some() {
            if let Some(ping) = self.world.clock.ping_due(now) {
                self.send(MSG_PING, &ping)?;
            }
        }

        let ClientWorld {
            entities,
            integrator,
            ..
        } = &mut self.world;
        for (eid, entity) in entities.iter_mut() {
            if entity.is_simulate() {
                let frame = entity.movement.update(dt, integrator.as_mut());
                sink.apply(*eid, &frame);
            }
        }

        for (name, payload) in std::mem::take(&mut self.world.outbox) {
            self.conn.send(name, &payload)?;
        }

        Ok(())
    }

    /// Events accumulated since the last drain.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        self.world.take_events()
    }

    /// Feeds the locally-simulated character pose in; uploads on cadence.
    pub fn drive_local(&mut self, now: f32, dt: f32, pose: &LocalPose) -> anyhow::Result<()> {
        if let Some(sample) = self.uploader.sample(now, dt, pose) {
            self.send(MSG_UPLOAD_MOVEMENT, &sample)?;
        }
        Ok(())
    }

    /// Casts the skill at `index` in the player's skill list.
    ///
    /// Predicted skills apply cost and cooldown before the request is
    /// even sent; the server's follow-up delta overwrites both either
    /// way. A gated cast (cooldown, mana) is a silent no-op.
    pub fn cast_skill(&mut self, index: usize) -> anyhow::Result<()> {
        let server_time = self.world.server_time();
        let Some(eid) = self.world.player_eid else {
            return Ok(());
        };
        let Some(cast) = self
            .world
            .entities
            .get_mut(&eid)
            .and_then(|player| player.combat.cast(index, server_time))
        else {
            return Ok(());
        };

        if cast.predicted {
            self.world.emit(GameEvent::SkillCastStarted {
                eid,
                skill_id: cast.skill_id,
                animator_state: cast.animator_state,
            });
        }
        self.send(
            MSG_SKILL_ATTACK,
            &SkillAttack {
                skill_id: cast.skill_id,
            },
        )
    }

    /// Swings a normal attack; always locally predicted, never rolled back.
    pub fn normal_attack(&mut self, now: f32) -> anyhow::Result<()> {
        let Some(eid) = self.world.player_eid else {
            return Ok(());
        };
        let Some(swing) = self
            .world
            .entities
            .get_mut(&eid)
            .and_then(|player| player.combat.normal_attack(now))
        else {
            return Ok(());
        };

        let combo = swing.combo;
        self.world.emit(GameEvent::SwingStarted {
            eid,
            clip: swing.clip,
            play_rate: swing.play_rate,
        });
        self.send(MSG_NORMAL_ATTACK, &NormalAttack { combo })
    }

    /// Asks the server for a navigation path.
    pub fn query_path(&mut self, start: Vec3, end: Vec3) -> anyhow::Result<()> {
        self.send(MSG_QUERY_PATH, &QueryPath { start, end })
    }
}
