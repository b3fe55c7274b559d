use indexmap::IndexMap;
use rayon::prelude::*;

use crate::component::{Component, ComponentHandle};

/// Entity identifier. Ids are never reused, so an id kept past
/// [`Entities::despawn_all`] resolves to nothing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// An entity's append-only component list.
pub struct Entity {
    id: EntityId,
    components: Vec<ComponentHandle>,
    // first component added under each name; later ones are shadowed
    first: IndexMap<String, usize>,
}

impl Entity {
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            id,
            components: Vec::new(),
            first: IndexMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, handle: ComponentHandle) {
        if !self.first.contains_key(handle.name()) {
            self.first.insert(handle.name().to_owned(), self.components.len());
        }
        self.components.push(handle);
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn get(&self, name: &str) -> Option<&ComponentHandle> {
        self.first.get(name).map(|&i| &self.components[i])
    }

    pub fn has_all<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().all(|name| self.first.contains_key(name.as_ref()))
    }

    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }
}

/// One entity matched by a component query.
#[derive(Clone, Debug)]
pub struct ComponentRecord {
    pub entity: EntityId,
    pub components: IndexMap<String, ComponentHandle>,
}

impl ComponentRecord {
    pub fn get(&self, name: &str) -> Option<&ComponentHandle> {
        self.components.get(name)
    }
}

/// Arena of entities in creation order.
///
/// Slot `i` holds the entity with id `base + i`; `despawn_all` moves `base`
/// past every id handed out so far.
#[derive(Default)]
pub struct Entities {
    entities: Vec<Entity>,
    base: u64,
    next: u64,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self) -> EntityMut<'_> {
        let id = EntityId(self.next);
        self.next += 1;
        let slot = self.entities.len();
        self.entities.push(Entity::new(id));
        EntityMut {
            entities: self,
            slot,
            id,
        }
    }

    fn slot(&self, id: EntityId) -> Option<usize> {
        let offset = id.0.checked_sub(self.base)?;
        usize::try_from(offset)
            .ok()
            .filter(|&slot| slot < self.entities.len())
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        let slot = self.slot(id)?;
        Some(EntityMut {
            entities: self,
            slot,
            id,
        })
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(self.slot(id)?)
    }

    /// Every component on `id` named `name`, in the order they were added.
    pub fn get_components(&self, id: EntityId, name: &str) -> Vec<ComponentHandle> {
        self.get(id)
            .map(|entity| {
                entity
                    .components
                    .iter()
                    .filter(|c| c.name() == name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of every entity carrying all of `names`.
    ///
    /// Each record maps the queried names to the entity's first component with
    /// that name. Records follow entity creation order.
    pub fn query<S: AsRef<str> + Sync>(&self, names: &[S]) -> Vec<ComponentRecord> {
        self.entities
            .par_iter()
            .filter(|entity| entity.has_all(names))
            .map(|entity| ComponentRecord {
                entity: entity.id,
                components: names
                    .iter()
                    .filter_map(|name| {
                        let name = name.as_ref();
                        entity.get(name).map(|c| (name.to_owned(), c.clone()))
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn despawn_all(&mut self) {
        self.entities.clear();
        self.base = self.next;
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Builder handle returned by [`Entities::spawn`].
pub struct EntityMut<'a> {
    entities: &'a mut Entities,
    slot: usize,
    id: EntityId,
}

impl<'a> EntityMut<'a> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn add_component<C: Component>(self, component: C) -> Self {
        self.add_handle(ComponentHandle::new(component))
    }

    pub fn add_handle(self, handle: ComponentHandle) -> Self {
        self.entities.entities[self.slot].insert(handle);
        self
    }
}
