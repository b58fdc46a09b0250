//! Deferred effects keyed by (monster, purpose), drained by the tick loop.
//!
//! Scheduling a new effect under a key replaces the previous one, so at most
//! one effect per key is ever outstanding. Replaced and cancelled entries stay
//! in the heap and are skipped when popped.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::types::MonsterId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectPurpose {
    Attack,
    Despawn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Effect {
    /// End of windup, or the next tick of a multi-hit session.
    Activate,
    /// End of recovery; stamps the cooldown.
    Complete,
    Despawn,
}

impl Effect {
    pub fn purpose(self) -> EffectPurpose {
        match self {
            Effect::Activate | Effect::Complete => EffectPurpose::Attack,
            Effect::Despawn => EffectPurpose::Despawn,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledEffect {
    pub fire_at_ms: u64,
    pub monster: MonsterId,
    pub effect: Effect,
}

#[derive(Debug, Default)]
pub struct EffectScheduler {
    heap: BinaryHeap<Reverse<(u64, u64, MonsterId, Effect)>>,
    live: HashMap<(MonsterId, EffectPurpose), u64>,
    next_seq: u64,
}

impl EffectScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, monster: MonsterId, effect: Effect, fire_at_ms: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert((monster, effect.purpose()), seq);
        self.heap.push(Reverse((fire_at_ms, seq, monster, effect)));
    }

    /// Returns whether an effect was outstanding.
    pub fn cancel(&mut self, monster: MonsterId, purpose: EffectPurpose) -> bool {
        self.live.remove(&(monster, purpose)).is_some()
    }

    pub fn cancel_all(&mut self, monster: MonsterId) {
        self.live.retain(|(id, _), _| *id != monster);
    }

    pub fn is_pending(&self, monster: MonsterId, purpose: EffectPurpose) -> bool {
        self.live.contains_key(&(monster, purpose))
    }

    /// Pops the earliest outstanding effect due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<ScheduledEffect> {
        loop {
            let Reverse((fire_at_ms, seq, monster, effect)) = *self.heap.peek()?;
            if fire_at_ms > now_ms {
                return None;
            }
            self.heap.pop();
            let key = (monster, effect.purpose());
            if self.live.get(&key) != Some(&seq) {
                continue;
            }
            self.live.remove(&key);
            return Some(ScheduledEffect {
                fire_at_ms,
                monster,
                effect,
            });
        }
    }
}
