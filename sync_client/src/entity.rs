//! Entities and the entity-level codec.
//!
//! An entity is a server-assigned id plus a fixed set of typed component
//! slots, decided by its kind. The component set is known to both ends
//! before any delta arrives; the wire only names components so a reader
//! can skip ones it does not know and keep parsing (forward
//! compatibility). The outer payload length is the sole end-of-message
//! signal, so every component must consume exactly its declared bytes.

use tracing::{debug, warn};

use sync_shared::config::MovementConfig;
use sync_shared::movement::MovementSample;
use sync_shared::serial::{NetReader, NetState, SerialError};

use crate::combat::CombatState;
use crate::movement::{MotionIntegrator, MovementSync};

/// Server-assigned entity id.
pub type Eid = i32;

pub const COMPONENT_MOVEMENT: &str = "MovementComponent";
pub const COMPONENT_COMBAT: &str = "CombatComponent";

/// Dirty bit for the entity-own `name` field.
pub const OWN_NAME: u32 = 1;

/// Which side drives this entity's motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetRole {
    /// Locally player-controlled; input drives prediction and movement
    /// is uploaded, not reconciled.
    Autonomous,
    /// Remote entity; motion is purely server-driven.
    Simulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Monster,
}

impl EntityKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Player" => Some(Self::Player),
            "Monster" => Some(Self::Monster),
            _ => None,
        }
    }
}

/// One replicated entity with its fixed component slots.
#[derive(Debug)]
pub struct GameEntity {
    pub eid: Eid,
    pub kind: EntityKind,
    pub role: NetRole,
    pub name: String,
    pub movement: MovementSync,
    pub combat: CombatState,
}

impl GameEntity {
    pub fn new(kind: EntityKind, role: NetRole, movement_cfg: &MovementConfig) -> Self {
        Self {
            eid: 0,
            kind,
            role,
            name: String::new(),
            movement: MovementSync::new(movement_cfg.clone()),
            combat: CombatState::default(),
        }
    }

    pub fn is_simulate(&self) -> bool {
        self.role == NetRole::Simulate
    }

    /// Parses an entity full-serialize blob: id, own state, components.
    pub fn read_full(
        &mut self,
        data: &[u8],
        rtt: f32,
        integ: &mut dyn MotionIntegrator,
    ) -> Result<(), SerialError> {
        let mut r = NetReader::new(data);
        self.eid = r.read_i32()?;
        self.name = r.read_string()?;
        self.read_components(&mut r, true, rtt, integ)
    }

    /// Parses an entity delta-serialize blob: own delta, components.
    pub fn read_delta(
        &mut self,
        data: &[u8],
        rtt: f32,
        integ: &mut dyn MotionIntegrator,
    ) -> Result<(), SerialError> {
        let mut r = NetReader::new(data);
        let dirty = r.read_u32()?;
        if dirty & OWN_NAME != 0 {
            self.name = r.read_string()?;
        }
        self.read_components(&mut r, false, rtt, integ)
    }

    /// Consumes `(name, payload)` component pairs until the payload runs
    /// out. Unknown names are skipped; known components must account for
    /// every byte of their declared length.
    fn read_components(
        &mut self,
        r: &mut NetReader<'_>,
        full: bool,
        rtt: f32,
        integ: &mut dyn MotionIntegrator,
    ) -> Result<(), SerialError> {
        while !r.is_empty() {
            let name = r.read_string()?;
            let payload = r.read_blob()?;
            let mut cr = NetReader::new(payload);

            match name.as_str() {
                COMPONENT_MOVEMENT => {
                    if self.role == NetRole::Autonomous {
                        // Own movement is driven locally and uploaded;
                        // the server's echo is not applied.
                        debug!(eid = self.eid, "ignoring movement echo for autonomous entity");
                        continue;
                    }
                    let sample = MovementSample::read_full(&mut cr)?;
                    if full {
                        self.movement.apply_full(&sample, rtt, integ);
                    } else {
                        self.movement.apply_sync(&sample, rtt, integ);
                    }
                }
                COMPONENT_COMBAT => {
                    let simulate = self.is_simulate();
                    if full {
                        self.combat.read_full(&mut cr, simulate)?;
                    } else {
                        self.combat.read_delta(&mut cr, simulate)?;
                    }
                }
                other => {
                    warn!(eid = self.eid, component = %other, "skipping unknown component");
                    continue;
                }
            }

            if !cr.is_empty() {
                return Err(SerialError::ComponentLength {
                    name,
                    leftover: cr.remaining(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{AttrSet, SkillInfo, ATTR_HEALTH};
    use crate::movement::FreeIntegrator;
    use sync_shared::math::Vec3;
    use sync_shared::movement::SyncMode;
    use sync_shared::serial::{write_seq, NetWriter};

    fn full_blob(
        eid: Eid,
        name: &str,
        health: i32,
        sample: &MovementSample,
        with_skills: bool,
    ) -> Vec<u8> {
        let mut w = NetWriter::new();
        w.write_i32(eid);
        w.write_string(name);

        w.write_string(COMPONENT_COMBAT);
        let mut cw = NetWriter::new();
        AttrSet {
            max_health: 100,
            health,
            ..Default::default()
        }
        .write_full(&mut cw);
        if with_skills {
            write_seq::<SkillInfo>(&mut cw, &[]);
        }
        w.write_blob(&cw.into_vec());

        w.write_string(COMPONENT_MOVEMENT);
        let mut mw = NetWriter::new();
        sample.write_full(&mut mw);
        w.write_blob(&mw.into_vec());

        w.into_vec()
    }

    #[test]
    fn full_blob_populates_all_components() {
        let mut integ = FreeIntegrator;
        let mut entity = GameEntity::new(
            EntityKind::Player,
            NetRole::Simulate,
            &MovementConfig {
                mode: SyncMode::Direct,
                ..Default::default()
            },
        );

        let sample = MovementSample {
            position: Vec3::new(3.0, 0.0, 1.0),
            ..Default::default()
        };
        let blob = full_blob(42, "Miri", 80, &sample, false);
        entity.read_full(&blob, 0.1, &mut integ).unwrap();

        assert_eq!(entity.eid, 42);
        assert_eq!(entity.name, "Miri");
        assert_eq!(entity.combat.attrs.health, 80);
        // Simulated entities carry no skill list.
        assert_eq!(entity.movement.position(), Vec3::new(3.0, 0.0, 1.0));
    }

    #[test]
    fn unknown_component_is_skipped_and_parsing_continues() {
        let mut integ = FreeIntegrator;
        let mut entity = GameEntity::new(
            EntityKind::Monster,
            NetRole::Simulate,
            &MovementConfig::default(),
        );

        let mut w = NetWriter::new();
        w.write_u32(OWN_NAME);
        w.write_string("Grub");
        w.write_string("PetComponent");
        w.write_blob(&[0xde, 0xad, 0xbe, 0xef]);
        w.write_string(COMPONENT_COMBAT);
        let mut cw = NetWriter::new();
        AttrSet {
            health: 5,
            ..Default::default()
        }
        .write_delta(&mut cw, ATTR_HEALTH);
        w.write_blob(&cw.into_vec());

        entity.read_delta(&w.into_vec(), 0.1, &mut integ).unwrap();
        assert_eq!(entity.name, "Grub");
        assert_eq!(entity.combat.attrs.health, 5);
    }

    #[test]
    fn component_consuming_wrong_length_is_a_protocol_fault() {
        let mut integ = FreeIntegrator;
        let mut entity = GameEntity::new(
            EntityKind::Player,
            NetRole::Simulate,
            &MovementConfig::default(),
        );

        // Combat delta with trailing garbage inside the component blob.
        let mut w = NetWriter::new();
        w.write_u32(0);
        w.write_string(COMPONENT_COMBAT);
        let mut cw = NetWriter::new();
        AttrSet::default().write_delta(&mut cw, 0);
        cw.write_u32(0);
        cw.write_u8(0xcc);
        w.write_blob(&cw.into_vec());

        let err = entity.read_delta(&w.into_vec(), 0.1, &mut integ).unwrap_err();
        assert!(matches!(err, SerialError::ComponentLength { .. }));
    }

    #[test]
    fn autonomous_entity_ignores_movement_echo() {
        let mut integ = FreeIntegrator;
        let mut entity = GameEntity::new(
            EntityKind::Player,
            NetRole::Autonomous,
            &MovementConfig::default(),
        );

        let sample = MovementSample {
            position: Vec3::new(9.0, 9.0, 9.0),
            ..Default::default()
        };
        let blob = full_blob(7, "Me", 100, &sample, true);
        entity.read_full(&blob, 0.1, &mut integ).unwrap();

        assert_eq!(entity.eid, 7);
        // Pose untouched by the echoed movement component.
        assert_eq!(entity.movement.position(), Vec3::ZERO);
    }
}
