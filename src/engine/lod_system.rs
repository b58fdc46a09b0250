use super::*;

impl CombatEngine {
    /// Buckets every monster by distance to its nearest live target and
    /// returns the ones due for an update this tick, each with the elapsed
    /// time accumulated since its last update.
    pub(super) fn update_lod(&mut self, dt_ms: u64) -> Vec<(MonsterId, u64)> {
        if self.monsters.is_empty() {
            return Vec::new();
        }
        let base = self.config.base_view_distance;
        let near = base * self.config.lod_near_multiplier;
        let medium = base * self.config.lod_medium_multiplier;
        let far = base * self.config.lod_far_multiplier;

        let mut due = Vec::new();
        for id in self.monsters.ids() {
            let Some(monster) = self.monsters.get(id) else {
                continue;
            };
            if monster.is_dying() {
                continue;
            }
            let tier = if monster.session.is_multi_hit() {
                LodTier::Near
            } else {
                match nearest_live_target(&self.target_snapshot, monster.position) {
                    Some((_, d)) if d <= near => LodTier::Near,
                    Some((_, d)) if d <= medium => LodTier::Medium,
                    Some((_, d)) if d <= far => LodTier::Far,
                    _ => LodTier::Dormant,
                }
            };
            if tier == LodTier::Dormant {
                self.put_to_sleep(id);
            } else if let Some(elapsed_ms) = self.advance_lod(id, tier, dt_ms) {
                due.push((id, elapsed_ms));
            }
        }
        due
    }

    fn put_to_sleep(&mut self, id: MonsterId) {
        let already_dormant = self
            .monsters
            .get(id)
            .map(|m| m.state == MonsterState::Dormant)
            .unwrap_or(true);
        if !already_dormant {
            self.interrupt_attack(id);
        }
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        if !already_dormant {
            debug!(monster = %id, "no target within far range; going dormant");
        }
        monster.state = MonsterState::Dormant;
        monster.lod = LodTier::Dormant;
        monster.lod_skip = 0;
        monster.lod_pending_ms = 0;
        monster.velocity = Vec2::ZERO;
        monster.stun_remaining_ms = 0;
        monster.stun_snapshot = None;
        monster.stuck.reset();
        monster.clear_target();
    }

    /// Returns the compensated elapsed time when the monster's tier interval
    /// has come round. A dormant monster wakes to idle and updates at once.
    fn advance_lod(&mut self, id: MonsterId, tier: LodTier, dt_ms: u64) -> Option<u64> {
        let monster = self.monsters.get_mut(id)?;
        let woke = monster.state == MonsterState::Dormant;
        if woke {
            monster.state = MonsterState::Idle;
            monster.lod_skip = 0;
            monster.lod_pending_ms = 0;
        }
        monster.lod = tier;
        monster.lod_pending_ms = monster.lod_pending_ms.saturating_add(dt_ms);
        monster.lod_skip += 1;
        if !woke && monster.lod_skip < tier.update_interval() {
            return None;
        }
        let elapsed_ms = monster.lod_pending_ms;
        monster.lod_skip = 0;
        monster.lod_pending_ms = 0;
        Some(elapsed_ms)
    }
}
