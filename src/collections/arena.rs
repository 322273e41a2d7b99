use crate::types::EntityId;

/// Slot storage with a free list threaded through the vacant slots.
/// Every slot carries a generation so ids of removed values never
/// resolve to whatever was stored in their place afterwards.
#[derive(Debug)]
pub struct Arena<T> {
    head: u32,
    len: usize,
    entries: Vec<Slot<T>>,
}
#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    // Err holds the next vacant slot
    value: Result<T, u32>,
}
impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            head: u32::MAX,
            len: 0,
            entries: vec![],
        }
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    fn slot(&self, id: EntityId) -> Option<&Slot<T>> {
        self.entries.get(id.index as usize).filter(|s| s.generation == id.generation)
    }
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.slot(id).and_then(|s| s.value.as_ref().ok())
    }
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.value.as_mut().ok())
    }
    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }
    pub fn insert(&mut self, value: T) -> EntityId {
        self.len += 1;
        if self.head == u32::MAX {
            let index = self.entries.len() as u32;
            self.entries.push(Slot { generation: 0, value: Ok(value) });
            EntityId { index, generation: 0 }
        } else {
            let index = self.head;
            let slot = &mut self.entries[index as usize];
            self.head = match core::mem::replace(&mut slot.value, Ok(value)) {
                Err(next) => next,
                Ok(_) => unreachable!("free list points at an occupied slot"),
            };
            EntityId { index, generation: slot.generation }
        }
    }
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let head = self.head;
        let slot = self
            .entries
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.value.is_ok())?;
        slot.generation = slot.generation.wrapping_add(1);
        let value = core::mem::replace(&mut slot.value, Err(head)).ok();
        self.head = id.index;
        self.len -= 1;
        value
    }
}
pub struct Iter<'a, T> {
    entries: core::iter::Enumerate<core::slice::Iter<'a, Slot<T>>>,
}
impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (EntityId, &'a T);
    fn next(&mut self) -> Option<Self::Item> {
        for (i, slot) in self.entries.by_ref() {
            if let Ok(v) = &slot.value {
                return Some((EntityId { index: i as u32, generation: slot.generation }, v));
            }
        }
        None
    }
}
impl<T> Arena<T> {
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { entries: self.entries.iter().enumerate() }
    }
    pub fn retain(&mut self, mut f: impl FnMut(EntityId, &mut T) -> bool) {
        for (i, slot) in self.entries.iter_mut().enumerate() {
            if let Ok(item) = &mut slot.value {
                let id = EntityId { index: i as u32, generation: slot.generation };
                if !f(id, item) {
                    slot.generation = slot.generation.wrapping_add(1);
                    slot.value = Err(core::mem::replace(&mut self.head, i as u32));
                    self.len -= 1;
                }
            }
        }
    }
}
