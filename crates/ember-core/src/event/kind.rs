//! Event kind identity.
//!
//! Each concrete payload type gets a small integer id the first time it is
//! seen. Ids are process-wide, start at 1 and never change for the lifetime
//! of the process.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::Mutex;

/// Stable integer identifying a concrete event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTypeId(u32);

#[derive(Default)]
struct KindRegistry {
    ids: HashMap<TypeId, EventTypeId>,
    names: Vec<&'static str>,
}

fn registry() -> &'static Mutex<KindRegistry> {
    static REGISTRY: OnceLock<Mutex<KindRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(KindRegistry::default()))
}

impl EventTypeId {
    /// Id for `T`, allocating the next free id on first use.
    pub fn of<T: 'static>() -> Self {
        let mut registry = registry().lock();
        if let Some(id) = registry.ids.get(&TypeId::of::<T>()) {
            return *id;
        }

        registry.names.push(type_name::<T>());
        let id = EventTypeId(registry.names.len() as u32);
        registry.ids.insert(TypeId::of::<T>(), id);
        tracing::trace!("Registered event kind {} as {}", type_name::<T>(), id.0);
        id
    }

    /// Raw integer value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Rust type name the id was assigned to.
    pub fn name(self) -> &'static str {
        let registry = registry().lock();
        registry
            .names
            .get(self.0 as usize - 1)
            .copied()
            .unwrap_or("<unknown>")
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name(), self.0)
    }
}

/// A payload type that can travel through the dispatcher.
///
/// Implementations are usually empty:
///
/// ```
/// use ember_core::EventKind;
///
/// #[derive(Default)]
/// struct Ping {
///     seq: u32,
/// }
///
/// impl EventKind for Ping {}
/// ```
pub trait EventKind: Default + 'static {
    /// Id of this kind.
    fn event_type() -> EventTypeId
    where
        Self: Sized,
    {
        EventTypeId::of::<Self>()
    }

    /// Restore the payload to its pristine state before it is pooled.
    fn reset(&mut self)
    where
        Self: Sized,
    {
        *self = Self::default();
    }
}
