//! Combat state: attributes, skills, and local prediction.
//!
//! The server owns all combat numbers. For actions flagged as locally
//! predictable the client applies the cooldown and resource cost before
//! the reply arrives; the authoritative values land shortly after through
//! the normal attribute delta path and overwrite whatever was predicted.
//! There is no rollback log — last write from the server wins.

use sync_shared::serial::{NetReader, NetState, NetWriter, SerialError};
use sync_shared::sync_array::SyncArray;

/// Dirty-flag bits for [`AttrSet`], in field declaration order.
pub const ATTR_MAX_HEALTH: u32 = 1;
pub const ATTR_HEALTH: u32 = 2;
pub const ATTR_MAX_MANA: u32 = 4;
pub const ATTR_MANA: u32 = 8;

/// Replicated attribute block.
///
/// The wire carries the four pool fields; attack-speed values are local
/// tuning consumed by the swing pacing below.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSet {
    pub max_health: i32,
    pub health: i32,
    pub max_mana: i32,
    pub mana: i32,

    pub attack_speed: f32,
    pub additional_attack_speed: f32,
}

impl Default for AttrSet {
    fn default() -> Self {
        Self {
            max_health: 0,
            health: 0,
            max_mana: 0,
            mana: 0,
            attack_speed: 1.0,
            additional_attack_speed: 0.0,
        }
    }
}

impl NetState for AttrSet {
    fn read_full(r: &mut NetReader<'_>) -> Result<Self, SerialError> {
        Ok(Self {
            max_health: r.read_i32()?,
            health: r.read_i32()?,
            max_mana: r.read_i32()?,
            mana: r.read_i32()?,
            ..Default::default()
        })
    }

    fn write_full(&self, w: &mut NetWriter) {
        w.write_i32(self.max_health);
        w.write_i32(self.health);
        w.write_i32(self.max_mana);
        w.write_i32(self.mana);
    }

    fn read_delta(&mut self, r: &mut NetReader<'_>) -> Result<(), SerialError> {
        let dirty = r.read_u32()?;
        if dirty & ATTR_MAX_HEALTH != 0 {
            self.max_health = r.read_i32()?;
        }
        if dirty & ATTR_HEALTH != 0 {
            self.health = r.read_i32()?;
        }
        if dirty & ATTR_MAX_MANA != 0 {
            self.max_mana = r.read_i32()?;
        }
        if dirty & ATTR_MANA != 0 {
            self.mana = r.read_i32()?;
        }
        Ok(())
    }

    fn write_delta(&self, w: &mut NetWriter, dirty: u32) {
        w.write_u32(dirty);
        if dirty & ATTR_MAX_HEALTH != 0 {
            w.write_i32(self.max_health);
        }
        if dirty & ATTR_HEALTH != 0 {
            w.write_i32(self.health);
        }
        if dirty & ATTR_MAX_MANA != 0 {
            w.write_i32(self.max_mana);
        }
        if dirty & ATTR_MANA != 0 {
            w.write_i32(self.mana);
        }
    }
}

/// Dirty-flag bits for [`SkillInfo`], in field declaration order.
pub const SKILL_ID: u32 = 1;
pub const SKILL_ANIMATOR_STATE: u32 = 2;
pub const SKILL_COST_MANA: u32 = 4;
pub const SKILL_COOL_DOWN: u32 = 8;
pub const SKILL_NEXT_CAST_TIME: u32 = 16;
pub const SKILL_LOCAL_PREDICTED: u32 = 32;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillInfo {
    pub skill_id: i32,
    pub animator_state: String,
    pub cost_mana: i32,
    pub cool_down: i32,
    pub next_cast_time: i32,
    /// Server grants this skill the optimistic local cast path.
    pub local_predicted: bool,
}

impl NetState for SkillInfo {
    fn read_full(r: &mut NetReader<'_>) -> Result<Self, SerialError> {
        Ok(Self {
            skill_id: r.read_i32()?,
            animator_state: r.read_string()?,
            cost_mana: r.read_i32()?,
            cool_down: r.read_i32()?,
            next_cast_time: r.read_i32()?,
            local_predicted: r.read_bool()?,
        })
    }

    fn write_full(&self, w: &mut NetWriter) {
        w.write_i32(self.skill_id);
        w.write_string(&self.animator_state);
        w.write_i32(self.cost_mana);
        w.write_i32(self.cool_down);
        w.write_i32(self.next_cast_time);
        w.write_bool(self.local_predicted);
    }

    fn read_delta(&mut self, r: &mut NetReader<'_>) -> Result<(), SerialError> {
        let dirty = u32::from(r.read_u8()?);
        if dirty & SKILL_ID != 0 {
            self.skill_id = r.read_i32()?;
        }
        if dirty & SKILL_ANIMATOR_STATE != 0 {
            self.animator_state = r.read_string()?;
        }
        if dirty & SKILL_COST_MANA != 0 {
            self.cost_mana = r.read_i32()?;
        }
        if dirty & SKILL_COOL_DOWN != 0 {
            self.cool_down = r.read_i32()?;
        }
        if dirty & SKILL_NEXT_CAST_TIME != 0 {
            self.next_cast_time = r.read_i32()?;
        }
        if dirty & SKILL_LOCAL_PREDICTED != 0 {
            self.local_predicted = r.read_bool()?;
        }
        Ok(())
    }

    fn write_delta(&self, w: &mut NetWriter, dirty: u32) {
        w.write_u8(dirty as u8);
        if dirty & SKILL_ID != 0 {
            w.write_i32(self.skill_id);
        }
        if dirty & SKILL_ANIMATOR_STATE != 0 {
            w.write_string(&self.animator_state);
        }
        if dirty & SKILL_COST_MANA != 0 {
            w.write_i32(self.cost_mana);
        }
        if dirty & SKILL_COOL_DOWN != 0 {
            w.write_i32(self.cool_down);
        }
        if dirty & SKILL_NEXT_CAST_TIME != 0 {
            w.write_i32(self.next_cast_time);
        }
        if dirty & SKILL_LOCAL_PREDICTED != 0 {
            w.write_bool(self.local_predicted);
        }
    }
}

/// A cast that passed the local gates and went out to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillCast {
    pub skill_id: i32,
    pub animator_state: String,
    /// The cost/cooldown were applied locally before the server reply.
    pub predicted: bool,
}

/// One normal-attack swing.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalSwing {
    pub combo: i32,
    pub clip: String,
    pub play_rate: f32,
}

/// Per-entity combat component.
#[derive(Debug, Clone, Default)]
pub struct CombatState {
    pub attrs: AttrSet,
    pub skills: SyncArray<SkillInfo>,

    combo_seq: i32,
    combo_pressed: bool,
    next_swing_time: f32,
    enable_normal_attack: bool,
    enable_combo_attack: bool,
    /// Combo clip names, cycled per swing. Local configuration.
    pub combo_clips: Vec<String>,
}

impl CombatState {
    pub fn new(combo_clips: Vec<String>) -> Self {
        Self {
            enable_normal_attack: true,
            combo_clips,
            ..Default::default()
        }
    }

    /// Simulated entities only replicate attributes; the skill list is
    /// private to the owning player.
    pub fn read_full(&mut self, r: &mut NetReader<'_>, simulate: bool) -> Result<(), SerialError> {
        self.attrs = AttrSet::read_full(r)?;
        if !simulate {
            self.skills.read_full(r)?;
        }
        Ok(())
    }

    pub fn read_delta(&mut self, r: &mut NetReader<'_>, simulate: bool) -> Result<(), SerialError> {
        self.attrs.read_delta(r)?;
        if !simulate {
            self.skills.read_delta(r)?;
        }
        Ok(())
    }

    pub fn skill(&self, index: usize) -> Option<&SkillInfo> {
        self.skills.get(index)
    }

    pub fn can_cast(&self, index: usize, server_time: i32) -> bool {
        let Some(skill) = self.skills.get(index) else {
            return false;
        };
        if server_time < skill.next_cast_time {
            return false;
        }
        self.attrs.mana >= skill.cost_mana
    }

    /// Attempts a cast; returns `None` when gated by cooldown or mana.
    ///
    /// Predicted skills arm the cooldown and consume mana immediately.
    /// Only these two scalars are speculative, so the server refreshes
    /// both in its reply delta whether the cast succeeded or not.
    pub fn cast(&mut self, index: usize, server_time: i32) -> Option<SkillCast> {
        if !self.can_cast(index, server_time) {
            return None;
        }
        let cost;
        let cast = {
            let skill = self.skills.get_mut(index)?;
            cost = skill.cost_mana;
            if skill.local_predicted {
                skill.next_cast_time = server_time + skill.cool_down;
            }
            SkillCast {
                skill_id: skill.skill_id,
                animator_state: skill.animator_state.clone(),
                predicted: skill.local_predicted,
            }
        };
        if cast.predicted {
            self.attrs.mana -= cost;
        }
        Some(cast)
    }

    /// Attempts a normal-attack swing at local time `now`.
    ///
    /// Swings are always locally predicted and never rolled back: the
    /// interval is short and they cost nothing. While a swing animation
    /// still owns the character, a press with combos enabled is buffered
    /// and replayed at the combo-check point.
    pub fn normal_attack(&mut self, now: f32) -> Option<NormalSwing> {
        if now < self.next_swing_time || self.combo_clips.is_empty() {
            return None;
        }

        if !self.enable_normal_attack {
            if self.enable_combo_attack {
                self.combo_pressed = true;
            }
            return None;
        }

        let total_speed = self.attrs.attack_speed + self.attrs.additional_attack_speed;
        if total_speed <= 0.0 {
            return None;
        }
        self.next_swing_time = now + 1.0 / total_speed;

        let combo = self.combo_seq;
        let clip = self.combo_clips[combo as usize].clone();
        let play_rate = total_speed / self.attrs.attack_speed;

        self.enable_normal_attack = false;
        self.combo_seq = (self.combo_seq + 1) % self.combo_clips.len() as i32;

        Some(NormalSwing {
            combo,
            clip,
            play_rate,
        })
    }

    /// Animation notify: the active swing reached its cancel window.
    pub fn set_enable_normal_attack(&mut self, enable: bool) {
        self.enable_normal_attack = enable;
    }

    /// Animation notify: combo input window opened/closed.
    pub fn set_enable_combo(&mut self, enable: bool) {
        self.enable_combo_attack = enable;
    }

    /// Animation notify: combo-check point. Replays a buffered press.
    pub fn check_combo(&mut self, now: f32) -> Option<NormalSwing> {
        self.enable_normal_attack = true;
        if self.combo_pressed {
            self.combo_pressed = false;
            self.normal_attack(now)
        } else {
            None
        }
    }
}
