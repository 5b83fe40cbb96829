//! Message schemas.
//!
//! Named messages travel as `varint(len(name)) || name || payload` inside
//! a frame. Payloads are schema-encoded structs; the binary entity codec
//! only ever sees them as the opaque `data` blobs carried inside. Keep
//! serialization explicit and versionable.

use anyhow::Context;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::math::Vec3;
use crate::movement::MovementSample;

// ─── Inbound (server → client) ───
pub const MSG_LOGIN_REPLY: &str = "login_reply";
pub const MSG_JOIN_REPLY: &str = "join_reply";
pub const MSG_ENTITIES_ENTER_SIGHT: &str = "entities_enter_sight";
pub const MSG_ENTITIES_LEAVE_SIGHT: &str = "entities_leave_sight";
pub const MSG_PONG: &str = "pong";
pub const MSG_SYNC_ANIMATION: &str = "sync_animation";
pub const MSG_TAKE_DAMAGE: &str = "take_damage";
pub const MSG_SYNC_FULL_INFO: &str = "sync_full_info";
pub const MSG_SYNC_DELTA_INFO: &str = "sync_delta_info";
pub const MSG_SYNC_AOI_UPDATE: &str = "sync_aoi_update";
pub const MSG_QUERY_PATH_RESULT: &str = "query_path_result";

// ─── Outbound (client → server) ───
pub const MSG_LOGIN: &str = "login";
pub const MSG_JOIN: &str = "join";
pub const MSG_PING: &str = "ping";
pub const MSG_QUERY_PATH: &str = "query_path";
pub const MSG_SKILL_ATTACK: &str = "skill_attack";
pub const MSG_NORMAL_ATTACK: &str = "normal_attack";
pub const MSG_UPLOAD_MOVEMENT: &str = "upload_movement";

/// Encodes a message payload with the external schema codec.
pub fn encode_payload<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize payload")?;
    Ok(Bytes::from(payload))
}

/// Decodes a message payload.
pub fn decode_payload<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize payload")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginReply {
    /// 0 on success; anything else is a server-defined failure code.
    pub result: i32,
    pub eid: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinReply {
    pub result: i32,
    pub position: Vec3,
}

/// One entity entering the area of interest. `data` is the entity's
/// binary full-serialize blob (id, own state, components).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AoiEntity {
    pub entity_type: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitiesEnterSight {
    pub entities: Vec<AoiEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitiesLeaveSight {
    pub entities: Vec<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Ping {
    /// Local send time in seconds; echoed back by the server.
    pub t: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pong {
    /// Echo of the ping send time.
    pub t: f32,
    /// Server clock at reply time, in seconds.
    pub server_t: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationOp {
    Start,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimationData {
    pub name: String,
    pub op: AnimationOp,
    pub speed: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerAnimation {
    pub eid: i32,
    pub data: AnimationData,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TakeDamage {
    pub eid: i32,
    pub damage: i32,
}

/// Full entity snapshot for the player's own entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerInfo {
    pub data: Vec<u8>,
}

/// Incremental entity snapshot for the player's own entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerDeltaInfo {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AoiUpdate {
    pub eid: i32,
    /// Delta-serialize blob; absent when the entity had no visible change.
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AoiUpdates {
    pub datas: Vec<AoiUpdate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QueryPath {
    pub start: Vec3,
    pub end: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryPathResult {
    pub paths: Vec<Vec3>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SkillAttack {
    pub skill_id: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NormalAttack {
    /// Combo sequence index of this swing.
    pub combo: i32,
}

/// `upload_movement` carries a plain movement sample.
pub type UploadMovement = MovementSample;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_roundtrip() {
        let msg = JoinReply {
            result: 0,
            position: Vec3::new(15.0, 0.0, 3.0),
        };
        let bytes = encode_payload(&msg).unwrap();
        let back: JoinReply = decode_payload(&bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn aoi_update_data_is_optional() {
        let msg = AoiUpdates {
            datas: vec![
                AoiUpdate {
                    eid: 3,
                    data: Some(vec![1, 2]),
                },
                AoiUpdate { eid: 4, data: None },
            ],
        };
        let back: AoiUpdates = decode_payload(&encode_payload(&msg).unwrap()).unwrap();
        assert_eq!(back, msg);
    }
}
