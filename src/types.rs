use std::f32::consts::{FRAC_PI_4, PI};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }

    pub fn angle_to(self, other: Vec2) -> f32 {
        (other - self).angle()
    }

    /// Unit vector, or zero when the length is degenerate.
    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len <= f32::EPSILON {
            return Vec2::ZERO;
        }
        Vec2::new(self.x / len, self.y / len)
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn rotated(self, angle: f32) -> Vec2 {
        let (sin, cos) = angle.sin_cos();
        Vec2::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Eight compass directions in screen space (+y points south).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    N,
    Ne,
    #[default]
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl Facing {
    const CLOCKWISE_FROM_EAST: [Facing; 8] = [
        Facing::E,
        Facing::Se,
        Facing::S,
        Facing::Sw,
        Facing::W,
        Facing::Nw,
        Facing::N,
        Facing::Ne,
    ];

    pub fn angle(self) -> f32 {
        let idx = Self::CLOCKWISE_FROM_EAST
            .iter()
            .position(|f| *f == self)
            .unwrap_or(0);
        crate::geometry::normalize_angle(idx as f32 * FRAC_PI_4)
    }

    pub fn from_angle(angle: f32) -> Self {
        let steps = (angle.rem_euclid(2.0 * PI) / FRAC_PI_4).round() as usize % 8;
        Self::CLOCKWISE_FROM_EAST[steps]
    }

    /// Facing for a movement vector; `None` when the vector is zero.
    pub fn from_vector(v: Vec2) -> Option<Self> {
        if v.is_zero() {
            return None;
        }
        Some(Self::from_angle(v.angle()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target_{}", self.0)
    }
}

/// Generation-checked handle into the monster arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MonsterId {
    pub index: u32,
    pub generation: u32,
}

impl fmt::Display for MonsterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monster_{}v{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Combatant {
    Monster(MonsterId),
    Player(TargetId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonsterState {
    Idle,
    Chasing,
    Attacking,
    Stunned,
    Dying,
    Dormant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackPhase {
    #[default]
    None,
    Windup,
    Active,
    Recovery,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackSlot {
    Primary,
    Special1,
    Special2,
}

impl AttackSlot {
    pub const ALL: [AttackSlot; 3] = [Self::Primary, Self::Special1, Self::Special2];

    pub fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Special1 => 1,
            Self::Special2 => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    #[default]
    Physical,
    Magic,
    Fire,
    Poison,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LodTier {
    Near,
    Medium,
    Far,
    Dormant,
}

impl LodTier {
    pub fn update_interval(self) -> u32 {
        match self {
            Self::Near => 1,
            Self::Medium => crate::constants::LOD_MEDIUM_INTERVAL,
            Self::Far => crate::constants::LOD_FAR_INTERVAL,
            Self::Dormant => 0,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MonsterView {
    pub id: MonsterId,
    #[serde(rename = "type")]
    pub species: String,
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub hp: i32,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
    pub state: MonsterState,
    #[serde(rename = "attackPhase")]
    pub attack_phase: AttackPhase,
    #[serde(rename = "attackSlot")]
    pub attack_slot: Option<AttackSlot>,
    #[serde(rename = "isAttackAnimating")]
    pub is_attack_animating: bool,
    pub lod: LodTier,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    MonsterSpawned {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        species: String,
        x: f32,
        y: f32,
    },
    MonsterDamaged {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        amount: i32,
        hp: i32,
        by: Option<Combatant>,
    },
    MonsterStunned {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    MonsterKilled {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        by: Option<Combatant>,
    },
    MonsterDespawned {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
    },
    AttackStarted {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        slot: AttackSlot,
        attack: String,
        #[serde(rename = "windupMs")]
        windup_ms: u64,
    },
    AttackPhaseChanged {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        slot: AttackSlot,
        phase: AttackPhase,
    },
    AttackDamage {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        target: TargetId,
        amount: i32,
        #[serde(rename = "activationId")]
        activation_id: u64,
    },
    ProjectileFired {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        count: usize,
    },
    AttackCompleted {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        slot: AttackSlot,
    },
    AttackInterrupted {
        #[serde(rename = "monsterId")]
        monster_id: MonsterId,
        slot: AttackSlot,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    pub monsters: Vec<MonsterView>,
    pub events: Vec<RuntimeEvent>,
}
