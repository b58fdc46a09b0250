use crate::collaborators::CombatTarget;
use crate::config::{SpeciesDef, SpeciesTable};
use crate::rng::derive_seed;
use crate::types::{TargetId, Vec2};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable per-monster key from where and what was spawned, so a monster's
/// rng stream does not depend on the order monsters were created in.
pub(super) fn monster_key(seed: u64, species: &str, position: Vec2) -> u64 {
    let mut hash = FNV_OFFSET;
    let bytes = species
        .bytes()
        .chain(position.x.to_bits().to_le_bytes())
        .chain(position.y.to_bits().to_le_bytes());
    for byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    derive_seed(seed, hash)
}

/// Closest live target; ties go to the lower id since `targets` is id-sorted.
pub(super) fn nearest_live_target(
    targets: &[CombatTarget],
    from: Vec2,
) -> Option<(CombatTarget, f32)> {
    let mut best: Option<(CombatTarget, f32)> = None;
    for target in targets.iter().filter(|t| t.is_live()) {
        let d = from.distance(target.position);
        if best.map(|(_, bd)| d < bd).unwrap_or(true) {
            best = Some((*target, d));
        }
    }
    best
}

pub(super) fn find_live_target(targets: &[CombatTarget], id: TargetId) -> Option<CombatTarget> {
    targets
        .binary_search_by_key(&id, |t| t.id)
        .ok()
        .map(|idx| targets[idx])
        .filter(CombatTarget::is_live)
}

pub(super) fn species_of<'a>(table: &'a SpeciesTable, name: &str) -> &'a SpeciesDef {
    table.get(name).unwrap_or_else(|| table.fallback())
}
