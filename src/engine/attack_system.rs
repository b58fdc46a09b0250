use super::*;

/// Distance gain that counts as the target backing off.
const RETREAT_EPSILON: f32 = 0.5;

impl CombatEngine {
    /// Highest-priority attack that is off cooldown, in range, and whose
    /// condition holds; earlier slots win ties. Also records the distance
    /// for the next retreat check.
    pub(super) fn select_attack(
        &mut self,
        id: MonsterId,
        target: &CombatTarget,
        distance: f32,
        now_ms: u64,
    ) -> Option<AttackSlot> {
        let monster = self.monsters.get_mut(id)?;
        let species = species_of(&self.species, &monster.species);
        let retreating = monster
            .last_target_distance
            .map(|prev| distance > prev + RETREAT_EPSILON)
            .unwrap_or(false);

        let mut best: Option<(i32, AttackSlot)> = None;
        for (slot, def) in species.attacks.iter() {
            if distance > def.range || !monster.cooldown_ready(slot, def.cooldown_ms, now_ms) {
                continue;
            }
            let eligible = match def.condition {
                AttackCondition::Always => true,
                AttackCondition::MinDistance { distance: min } => distance >= min,
                AttackCondition::TargetHpBelow { fraction } => target.hp_fraction() < fraction,
                AttackCondition::TargetRetreating { chance } => {
                    retreating && monster.rng.bool(chance)
                }
            };
            if !eligible {
                continue;
            }
            if best.map(|(priority, _)| def.priority > priority).unwrap_or(true) {
                best = Some((def.priority, slot));
            }
        }
        monster.last_target_distance = Some(distance);
        best.map(|(_, slot)| slot)
    }

    pub(super) fn start_attack(
        &mut self,
        id: MonsterId,
        slot: AttackSlot,
        target: &CombatTarget,
        now_ms: u64,
    ) {
        let Some(def) = self.attack_def(id, slot) else {
            return;
        };
        self.scheduler.cancel(id, EffectPurpose::Attack);
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };

        let toward = target.position - monster.position;
        let angle = if toward.is_zero() {
            monster.facing.angle()
        } else {
            toward.angle()
        };
        let session = match def.kind {
            AttackKind::MultiHit {
                hits,
                interval_ms,
                charge_speed,
                ..
            } => AttackSession::MultiHit {
                hits_remaining: hits.max(1),
                interval_ms: interval_ms.max(MULTI_HIT_MIN_INTERVAL_MS),
                direction: Vec2::from_angle(angle),
                speed: charge_speed,
            },
            AttackKind::TeleportMelee { distance, .. } => {
                let destination = target.position + Vec2::from_angle(angle) * distance;
                let valid = self.terrain.is_walkable(destination.x, destination.y)
                    && self.terrain.can_move(target.position, destination);
                AttackSession::Teleport {
                    destination,
                    angle,
                    valid,
                }
            }
            _ => AttackSession::None,
        };

        monster.reset_attack();
        monster.state = MonsterState::Attacking;
        monster.current_attack = Some(slot);
        monster.attack_phase = AttackPhase::Windup;
        monster.attack_angle = angle;
        monster.facing = Facing::from_angle(angle);
        monster.session = session;
        monster.velocity = Vec2::ZERO;
        monster.path = None;

        self.scheduler
            .schedule(id, Effect::Activate, now_ms + def.windup_ms);
        self.stats.attacks_started += 1;
        self.events.push(RuntimeEvent::AttackStarted {
            monster_id: id,
            slot,
            attack: def.name.clone(),
            windup_ms: def.windup_ms,
        });
    }

    /// Per-tick upkeep while attacking: the multi-hit charge, or standing still.
    pub(super) fn update_attacking(&mut self, id: MonsterId, elapsed_ms: u64) {
        let pending = self.scheduler.is_pending(id, EffectPurpose::Attack);
        let tick_ms = self.config.tick_ms.max(1);
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        if monster.current_attack.is_none() || !pending {
            debug!(monster = %id, "attack state without a pending effect; resetting");
            monster.reset_attack();
            monster.state = MonsterState::Idle;
            monster.velocity = Vec2::ZERO;
            return;
        }
        match monster.session {
            AttackSession::MultiHit {
                direction, speed, ..
            } if monster.attack_phase == AttackPhase::Active => {
                let step = direction * (speed * elapsed_ms as f32 / tick_ms as f32);
                let next = monster.position + step;
                if self.terrain.can_move(monster.position, next) {
                    monster.position = next;
                    monster.velocity = step;
                } else {
                    monster.velocity = Vec2::ZERO;
                }
            }
            _ => monster.velocity = Vec2::ZERO,
        }
    }

    /// Windup has elapsed (or a multi-hit interval): apply the effect.
    pub(super) fn activate_attack(&mut self, id: MonsterId, fire_at_ms: u64) {
        let Some((slot, def)) = self.live_attack(id) else {
            self.note_stale_effect(id);
            return;
        };
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        if monster.attack_phase != AttackPhase::Active {
            monster.attack_phase = AttackPhase::Active;
            self.events.push(RuntimeEvent::AttackPhaseChanged {
                monster_id: id,
                slot,
                phase: AttackPhase::Active,
            });
        }

        match def.kind {
            AttackKind::Projectile { speed } => {
                let aim = self.aim_angle(id);
                self.queue_projectiles(id, slot, &def, &[aim], speed);
            }
            AttackKind::MultiProjectile {
                speed,
                count,
                spread,
            } => {
                let aim = self.aim_angle(id);
                let angles = spread_angles(aim, spread, count);
                self.queue_projectiles(id, slot, &def, &angles, speed);
            }
            AttackKind::MultiHit { .. } => {
                if self.multi_hit_tick(id, slot, &def, fire_at_ms) {
                    return;
                }
            }
            AttackKind::TeleportMelee { .. } => {
                self.blink(id);
                let aim = self.aim_angle(id);
                self.strike_from(id, slot, &def, aim);
            }
            AttackKind::Melee { .. } | AttackKind::Cone { .. } | AttackKind::CircleAoe { .. } => {
                let aim = self.attack_angle(id);
                self.strike_from(id, slot, &def, aim);
            }
        }
        self.enter_recovery(id, slot, &def, fire_at_ms);
    }

    /// Recovery has elapsed: stamp the cooldown and leave the attack.
    pub(super) fn complete_attack(&mut self, id: MonsterId, fire_at_ms: u64) {
        let Some((slot, def)) = self.live_attack(id) else {
            self.note_stale_effect(id);
            return;
        };
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        monster.cooldown_stamps[slot.index()] = Some(fire_at_ms);
        monster.reset_attack();
        monster.velocity = Vec2::ZERO;

        let target = monster
            .target
            .and_then(|t| find_live_target(&self.target_snapshot, t));
        monster.state = match target {
            Some(target) => {
                let distance = monster.position.distance(target.position);
                if distance <= def.range * self.config.attack_range_tolerance {
                    MonsterState::Idle
                } else if distance <= monster.aggro_range * self.config.disengage_multiplier {
                    MonsterState::Chasing
                } else {
                    monster.clear_target();
                    MonsterState::Idle
                }
            }
            None => {
                monster.clear_target();
                MonsterState::Idle
            }
        };
        self.stats.attacks_completed += 1;
        self.events.push(RuntimeEvent::AttackCompleted {
            monster_id: id,
            slot,
        });
    }

    /// Cancels the pending attack effect and clears every attack field.
    /// Returns whether an attack was actually in flight.
    pub(super) fn interrupt_attack(&mut self, id: MonsterId) -> bool {
        let cancelled = self.scheduler.cancel(id, EffectPurpose::Attack);
        let Some(monster) = self.monsters.get_mut(id) else {
            return cancelled;
        };
        let slot = monster.current_attack;
        let was_attacking = cancelled || monster.is_attack_animating();
        monster.reset_attack();
        match slot {
            Some(slot) if was_attacking => {
                self.stats.attacks_interrupted += 1;
                self.events.push(RuntimeEvent::AttackInterrupted {
                    monster_id: id,
                    slot,
                });
                true
            }
            _ => false,
        }
    }

    fn attack_def(&self, id: MonsterId, slot: AttackSlot) -> Option<AttackDef> {
        let monster = self.monsters.get(id)?;
        species_of(&self.species, &monster.species)
            .attack(slot)
            .cloned()
    }

    /// The attack a deferred effect belongs to, provided its owner is still
    /// alive, unstunned, and mid-attack.
    fn live_attack(&self, id: MonsterId) -> Option<(AttackSlot, AttackDef)> {
        let monster = self.monsters.get(id)?;
        if monster.state != MonsterState::Attacking {
            return None;
        }
        let slot = monster.current_attack?;
        Some((slot, self.attack_def(id, slot)?))
    }

    fn attack_angle(&self, id: MonsterId) -> f32 {
        self.monsters
            .get(id)
            .map(|m| m.attack_angle)
            .unwrap_or_default()
    }

    /// Angle toward the live target, or the angle the attack started with.
    fn aim_angle(&self, id: MonsterId) -> f32 {
        let Some(monster) = self.monsters.get(id) else {
            return 0.0;
        };
        monster
            .target
            .and_then(|t| find_live_target(&self.target_snapshot, t))
            .map(|t| t.position - monster.position)
            .filter(|v| !v.is_zero())
            .map(Vec2::angle)
            .unwrap_or(monster.attack_angle)
    }

    fn enter_recovery(&mut self, id: MonsterId, slot: AttackSlot, def: &AttackDef, fire_at_ms: u64) {
        if let Some(monster) = self.monsters.get_mut(id) {
            monster.attack_phase = AttackPhase::Recovery;
        }
        self.events.push(RuntimeEvent::AttackPhaseChanged {
            monster_id: id,
            slot,
            phase: AttackPhase::Recovery,
        });
        self.scheduler
            .schedule(id, Effect::Complete, fire_at_ms + def.recovery_ms);
    }

    /// One AOE tick of a multi-hit session. Returns true while more ticks
    /// remain; the next one is already scheduled.
    fn multi_hit_tick(&mut self, id: MonsterId, slot: AttackSlot, def: &AttackDef, fire_at_ms: u64) -> bool {
        let activation_id = self.next_activation_id();
        let Some(monster) = self.monsters.get(id) else {
            return false;
        };
        let origin = monster.position;
        let aim = monster.attack_angle;
        self.strike(id, slot, def, origin, aim, activation_id);

        let Some(monster) = self.monsters.get_mut(id) else {
            return false;
        };
        let AttackSession::MultiHit {
            hits_remaining,
            interval_ms,
            ..
        } = &mut monster.session
        else {
            return false;
        };
        *hits_remaining = hits_remaining.saturating_sub(1);
        if *hits_remaining == 0 {
            return false;
        }
        let next_at = fire_at_ms + *interval_ms;
        self.scheduler.schedule(id, Effect::Activate, next_at);
        true
    }

    /// Moves a teleporting monster to its validated destination and turns it
    /// back toward the target. Invalid destinations strike in place.
    fn blink(&mut self, id: MonsterId) {
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        let AttackSession::Teleport {
            destination,
            angle,
            valid,
            ..
        } = monster.session
        else {
            return;
        };
        if !valid || !self.terrain.is_walkable(destination.x, destination.y) {
            debug!(monster = %id, "teleport destination blocked; striking in place");
            return;
        }
        monster.position = destination;
        monster.path = None;
        monster.attack_angle = crate::geometry::normalize_angle(angle + std::f32::consts::PI);
        monster.facing = Facing::from_angle(monster.attack_angle);
    }

    fn strike_from(&mut self, id: MonsterId, slot: AttackSlot, def: &AttackDef, aim: f32) {
        let Some(monster) = self.monsters.get(id) else {
            return;
        };
        let origin = match def.kind {
            AttackKind::CircleAoe { offset, .. } => monster.position + Vec2::from_angle(aim) * offset,
            _ => monster.position,
        };
        let activation_id = self.next_activation_id();
        self.strike(id, slot, def, origin, aim, activation_id);
    }

    /// Tests every live target against the attack's hitbox and buffers a hit
    /// for each one inside it. A target is hit at most once per activation.
    fn strike(
        &mut self,
        id: MonsterId,
        slot: AttackSlot,
        def: &AttackDef,
        origin: Vec2,
        aim: f32,
        activation_id: u64,
    ) {
        let Some(hitbox) = def.hitbox() else {
            return;
        };
        let Some(key) = self.monsters.get(id).map(|m| m.key) else {
            return;
        };
        let mut struck = BTreeSet::new();
        for target in self.target_snapshot.iter().filter(|t| t.is_live()) {
            if struck.contains(&target.id)
                || !hitbox.contains(origin, aim, target.position, target.radius)
            {
                continue;
            }
            self.pending_hits.push(PendingHit {
                monster: id,
                key,
                target: target.id,
                slot,
                attack: def.name.clone(),
                amount: def.damage,
                damage_type: def.damage_type,
                activation_id,
                stun_ms: def.stun_ms,
            });
            struck.insert(target.id);
        }
    }

    fn queue_projectiles(
        &mut self,
        id: MonsterId,
        slot: AttackSlot,
        def: &AttackDef,
        angles: &[f32],
        speed: f32,
    ) {
        let Some(monster) = self.monsters.get(id) else {
            return;
        };
        let (origin, key) = (monster.position, monster.key);
        for &angle in angles {
            self.pending_projectiles.push(PendingProjectile {
                monster: id,
                key,
                slot,
                spec: ProjectileSpec {
                    position: origin,
                    angle,
                    speed,
                    damage: def.damage,
                    range: def.range,
                    effect_type: def.damage_type,
                },
            });
        }
        self.events.push(RuntimeEvent::ProjectileFired {
            monster_id: id,
            count: angles.len(),
        });
    }
}
