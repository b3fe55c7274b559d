use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Upcasts for trait objects that need to be downcast to their concrete type.
///
/// Implemented for every `Any + Send + Sync` type. When calling through a smart
/// pointer, deref first (`(*arc).as_any()`), otherwise the pointer itself is
/// what gets upcast.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Named data attached to an entity.
///
/// The name is the query key; it is read once, when the component is added.
pub trait Component: AsAny {
    fn name(&self) -> &str;
}

/// Shared handle to a component owned by an entity.
///
/// Systems receive handles in their payloads and mutate the component in
/// place through [`ComponentHandle::write`].
#[derive(Clone)]
pub struct ComponentHandle {
    name: Arc<str>,
    value: Arc<RwLock<dyn Component>>,
}

impl ComponentHandle {
    pub fn new<C: Component>(component: C) -> Self {
        let name: Arc<str> = Arc::from(component.name());
        let value: Arc<RwLock<dyn Component>> = Arc::new(RwLock::new(component));
        Self { name, value }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is<C: Component>(&self) -> bool {
        let value = self.value.read();
        (*value).as_any().is::<C>()
    }

    /// Borrow the component as `C`, or `None` if it has another type.
    pub fn read<C: Component>(&self) -> Option<MappedRwLockReadGuard<'_, C>> {
        RwLockReadGuard::try_map(self.value.read(), |c| c.as_any().downcast_ref::<C>()).ok()
    }

    pub fn write<C: Component>(&self) -> Option<MappedRwLockWriteGuard<'_, C>> {
        RwLockWriteGuard::try_map(self.value.write(), |c| c.as_any_mut().downcast_mut::<C>()).ok()
    }

    /// True when both handles point at the same component instance.
    pub fn same(&self, other: &ComponentHandle) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle").field("name", &self.name).finish()
    }
}
