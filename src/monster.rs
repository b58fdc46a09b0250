use std::collections::VecDeque;

use crate::config::SpeciesDef;
use crate::rng::Rng;
use crate::types::{
    AttackPhase, AttackSlot, Facing, LodTier, MonsterId, MonsterState, MonsterView, TargetId,
    Vec2,
};

/// Per-archetype state for an attack in flight. Only one can exist at a time.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AttackSession {
    #[default]
    None,
    MultiHit {
        hits_remaining: u32,
        interval_ms: u64,
        /// Charge direction fixed at windup.
        direction: Vec2,
        speed: f32,
    },
    Teleport {
        destination: Vec2,
        angle: f32,
        /// False when the destination failed validation; strike in place.
        valid: bool,
    },
}

impl AttackSession {
    pub fn is_multi_hit(&self) -> bool {
        matches!(self, Self::MultiHit { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathCache {
    pub waypoints: Vec<Vec2>,
    pub cursor: usize,
    /// Where the goal was when the path was found.
    pub target_snapshot: Vec2,
}

impl PathCache {
    pub fn current(&self) -> Option<Vec2> {
        self.waypoints.get(self.cursor).copied()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.waypoints.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StunSnapshot {
    pub state: MonsterState,
    pub target: Option<TargetId>,
}

#[derive(Clone, Debug, Default)]
pub struct StuckTracker {
    samples: VecDeque<Vec2>,
    next_sample_at_ms: u64,
    pub level: u32,
}

impl StuckTracker {
    /// Records a position sample when one is due. Escalates `level` while the
    /// last `count` samples stay within `radius`, and resets it otherwise.
    pub fn sample(&mut self, now_ms: u64, position: Vec2, interval_ms: u64, count: usize, radius: f32) {
        if now_ms < self.next_sample_at_ms {
            return;
        }
        self.next_sample_at_ms = now_ms + interval_ms;
        self.samples.push_back(position);
        while self.samples.len() > count.max(2) {
            self.samples.pop_front();
        }
        if self.samples.len() < count.max(2) {
            return;
        }
        let anchor = self.samples[0];
        let clustered = self.samples.iter().all(|p| p.distance(anchor) <= radius);
        if clustered {
            self.level += 1;
            self.samples.clear();
            self.samples.push_back(position);
        } else {
            self.level = 0;
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.level = 0;
    }
}

#[derive(Clone, Debug)]
pub struct Monster {
    pub id: MonsterId,
    /// Identity derived from species and spawn point; seeds `rng` and orders
    /// buffered hits independently of arena order.
    pub key: u64,
    pub species: String,
    pub position: Vec2,
    pub facing: Facing,
    pub hp: i32,
    pub max_hp: i32,
    pub state: MonsterState,
    pub target: Option<TargetId>,
    pub velocity: Vec2,
    pub collision_radius: f32,
    pub move_speed: f32,
    pub aggro_range: f32,
    pub stun_remaining_ms: u64,
    /// When each slot's full attack sequence last finished.
    pub cooldown_stamps: [Option<u64>; 3],
    pub current_attack: Option<AttackSlot>,
    pub attack_phase: AttackPhase,
    /// Exact aim of the attack in flight; `facing` is its 8-way rounding.
    pub attack_angle: f32,
    pub session: AttackSession,
    pub path: Option<PathCache>,
    pub lod: LodTier,
    pub lod_skip: u32,
    pub lod_pending_ms: u64,
    pub stun_snapshot: Option<StunSnapshot>,
    pub stuck: StuckTracker,
    pub last_target_distance: Option<f32>,
    pub rng: Rng,
}

impl Monster {
    pub fn new(id: MonsterId, species: &SpeciesDef, position: Vec2, seed: u64) -> Self {
        Self {
            id,
            key: seed,
            species: species.name.clone(),
            position,
            facing: Facing::default(),
            hp: species.max_hp,
            max_hp: species.max_hp,
            state: MonsterState::Idle,
            target: None,
            velocity: Vec2::ZERO,
            collision_radius: species.collision_radius,
            move_speed: species.move_speed,
            aggro_range: species.aggro_range,
            stun_remaining_ms: 0,
            cooldown_stamps: [None; 3],
            current_attack: None,
            attack_phase: AttackPhase::None,
            attack_angle: 0.0,
            session: AttackSession::None,
            path: None,
            lod: LodTier::Near,
            lod_skip: 0,
            lod_pending_ms: 0,
            stun_snapshot: None,
            stuck: StuckTracker::default(),
            last_target_distance: None,
            rng: Rng::new(seed),
        }
    }

    pub fn is_dying(&self) -> bool {
        self.state == MonsterState::Dying
    }

    pub fn is_attack_animating(&self) -> bool {
        self.attack_phase != AttackPhase::None
    }

    pub fn cooldown_ready(&self, slot: AttackSlot, cooldown_ms: u64, now_ms: u64) -> bool {
        match self.cooldown_stamps[slot.index()] {
            None => true,
            Some(stamp) => now_ms.saturating_sub(stamp) >= cooldown_ms,
        }
    }

    /// Clears every in-flight attack field so the monster can transition
    /// freely on its next update.
    pub fn reset_attack(&mut self) {
        self.current_attack = None;
        self.attack_phase = AttackPhase::None;
        self.session = AttackSession::None;
    }

    pub fn clear_target(&mut self) {
        self.target = None;
        self.path = None;
        self.last_target_distance = None;
    }

    pub fn view(&self) -> MonsterView {
        MonsterView {
            id: self.id,
            species: self.species.clone(),
            x: self.position.x,
            y: self.position.y,
            facing: self.facing,
            hp: self.hp,
            max_hp: self.max_hp,
            state: self.state,
            attack_phase: self.attack_phase,
            attack_slot: self.current_attack,
            is_attack_animating: self.is_attack_animating(),
            lod: self.lod,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monster() -> Monster {
        Monster::new(
            MonsterId {
                index: 0,
                generation: 0,
            },
            &SpeciesDef::fallback(),
            Vec2::new(10.0, 10.0),
            1,
        )
    }

    #[test]
    fn cooldown_is_ready_until_stamped() {
        let mut m = monster();
        assert!(m.cooldown_ready(AttackSlot::Primary, 1_000, 0));
        m.cooldown_stamps[AttackSlot::Primary.index()] = Some(500);
        assert!(!m.cooldown_ready(AttackSlot::Primary, 1_000, 1_499));
        assert!(m.cooldown_ready(AttackSlot::Primary, 1_000, 1_500));
        assert!(m.cooldown_ready(AttackSlot::Special1, 1_000, 600));
    }

    #[test]
    fn reset_attack_clears_animation_state() {
        let mut m = monster();
        m.current_attack = Some(AttackSlot::Special2);
        m.attack_phase = AttackPhase::Active;
        m.session = AttackSession::MultiHit {
            hits_remaining: 2,
            interval_ms: 200,
            direction: Vec2::new(1.0, 0.0),
            speed: 5.0,
        };
        assert!(m.is_attack_animating());
        m.reset_attack();
        assert!(!m.is_attack_animating());
        assert_eq!(m.session, AttackSession::None);
    }

    #[test]
    fn stuck_tracker_escalates_and_resets() {
        let mut t = StuckTracker::default();
        for i in 0..4 {
            t.sample(i * 500, Vec2::new(1.0, 1.0), 500, 4, 4.0);
        }
        assert_eq!(t.level, 1);
        for i in 4..7 {
            t.sample(i * 500, Vec2::new(1.5, 1.0), 500, 4, 4.0);
        }
        assert_eq!(t.level, 2);
        for i in 7..10 {
            t.sample(i * 500, Vec2::new(i as f32 * 20.0, 1.0), 500, 4, 4.0);
        }
        assert_eq!(t.level, 0);
    }

    #[test]
    fn stuck_tracker_ignores_samples_before_interval() {
        let mut t = StuckTracker::default();
        for ms in 0..40 {
            t.sample(ms, Vec2::ZERO, 500, 4, 4.0);
        }
        assert_eq!(t.level, 0);
    }
}
