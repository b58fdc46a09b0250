//! Dense monster arena with generation-checked handles.

use crate::monster::Monster;
use crate::types::MonsterId;

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    monster: Option<Monster>,
}

#[derive(Clone, Debug, Default)]
pub struct MonsterRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl MonsterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Id the next insert will receive.
    pub fn peek_next_id(&self) -> MonsterId {
        match self.free.last() {
            Some(&index) => MonsterId {
                index,
                generation: self.slots[index as usize].generation,
            },
            None => MonsterId {
                index: self.slots.len() as u32,
                generation: 0,
            },
        }
    }

    /// Inserts a monster built for the id it is about to occupy.
    pub fn insert_with(&mut self, build: impl FnOnce(MonsterId) -> Monster) -> MonsterId {
        let id = self.peek_next_id();
        let monster = build(id);
        if self.free.pop().is_some() {
            self.slots[id.index as usize].monster = Some(monster);
        } else {
            self.slots.push(Slot {
                generation: 0,
                monster: Some(monster),
            });
        }
        self.len += 1;
        id
    }

    pub fn remove(&mut self, id: MonsterId) -> Option<Monster> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let monster = slot.monster.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(monster)
    }

    pub fn get(&self, id: MonsterId) -> Option<&Monster> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.monster.as_ref()
    }

    pub fn get_mut(&mut self, id: MonsterId) -> Option<&mut Monster> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.monster.as_mut()
    }

    /// Live ids in slot order.
    pub fn ids(&self) -> Vec<MonsterId> {
        self.iter().map(|m| m.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Monster> {
        self.slots.iter().filter_map(|slot| slot.monster.as_ref())
    }
}
