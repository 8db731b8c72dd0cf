//! Capability registry.
//!
//! Platform adapters register implementations against typed identifier
//! tokens during bootstrap; the document runtime resolves them when it builds
//! nodes and dispatches events. Single identifiers hold one implementation
//! (last write wins). Pipeline identifiers hold an ordered list of hooks.

use log::{debug, trace};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// How registrations against an identifier compose.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IdentifierKind {
    /// Last registration wins.
    Single,
    /// Registrations compose into a priority-ordered pipeline.
    Pipeline,
}

/// Typed token naming a capability. Declare these as `const`s next to the
/// trait they resolve to.
pub struct Identifier<T: ?Sized> {
    name: &'static str,
    kind: IdentifierKind,
    marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> Identifier<T> {
    #[inline]
    pub const fn single(name: &'static str) -> Self {
        Self {
            name,
            kind: IdentifierKind::Single,
            marker: PhantomData,
        }
    }

    #[inline]
    pub const fn pipeline(name: &'static str) -> Self {
        Self {
            name,
            kind: IdentifierKind::Pipeline,
            marker: PhantomData,
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn kind(&self) -> IdentifierKind {
        self.kind
    }
}

impl<T: ?Sized> Clone for Identifier<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Identifier<T> {}

impl<T: ?Sized> fmt::Debug for Identifier<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Identifier")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Raised when an identifier has neither a registration nor a default.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no implementation registered for capability `{name}`")]
pub struct CapabilityMissingError {
    pub name: &'static str,
}

type Erased = Box<dyn Any + Send + Sync>;

struct Entry {
    priority: i32,
    order: u64,
    value: Erased,
}

#[derive(Default)]
struct Slot {
    entries: Vec<Entry>,
    default: Option<Erased>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.default.is_none()
    }
}

#[derive(Default)]
struct State {
    slots: HashMap<(&'static str, TypeId), Slot>,
    next_order: u64,
}

fn downcast<T: ?Sized + Send + Sync + 'static>(value: &Erased) -> Option<Arc<T>> {
    value.downcast_ref::<Arc<T>>().map(Arc::clone)
}

/// Keyed registry of capability implementations. Internally synchronized so
/// several pages may register and resolve concurrently.
#[derive(Default)]
pub struct Registry {
    state: RwLock<State>,
}

static GLOBAL: Lazy<Arc<Registry>> = Lazy::new(|| Arc::new(Registry::new()));

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    fn key<T: ?Sized + 'static>(id: &Identifier<T>) -> (&'static str, TypeId) {
        (id.name, TypeId::of::<Arc<T>>())
    }

    /// Register an implementation. Single identifiers replace any earlier
    /// registration; pipeline identifiers insert by descending priority, ties
    /// keeping registration order.
    pub fn register<T: ?Sized + Send + Sync + 'static>(
        &self,
        id: &Identifier<T>,
        implementation: Arc<T>,
        priority: Option<i32>,
    ) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let order = state.next_order;
        state.next_order += 1;
        let slot = state.slots.entry(Self::key(id)).or_default();
        let entry = Entry {
            priority: priority.unwrap_or(0),
            order,
            value: Box::new(implementation),
        };
        match id.kind {
            IdentifierKind::Single => {
                if !slot.entries.is_empty() {
                    debug!("capability `{}` re-registered, replacing previous implementation", id.name);
                }
                slot.entries.clear();
                slot.entries.push(entry);
            }
            IdentifierKind::Pipeline => {
                slot.entries.push(entry);
                slot.entries
                    .sort_by(|left, right| right.priority.cmp(&left.priority).then(left.order.cmp(&right.order)));
                trace!("capability `{}` pipeline now has {} hooks", id.name, slot.entries.len());
            }
        }
    }

    /// Install the fallback returned while nothing is registered.
    pub fn set_default<T: ?Sized + Send + Sync + 'static>(&self, id: &Identifier<T>, implementation: Arc<T>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.slots.entry(Self::key(id)).or_default().default = Some(Box::new(implementation));
    }

    /// Resolve one implementation: the latest registration for single
    /// identifiers, the head of the pipeline otherwise, then the default.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
        id: &Identifier<T>,
    ) -> Result<Arc<T>, CapabilityMissingError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .slots
            .get(&Self::key(id))
            .and_then(|slot| {
                slot.entries
                    .first()
                    .map(|entry| &entry.value)
                    .or(slot.default.as_ref())
            })
            .and_then(downcast::<T>)
            .ok_or(CapabilityMissingError { name: id.name })
    }

    /// Resolve every implementation in pipeline order. A single identifier
    /// yields one element. Falls back to the default when nothing is
    /// registered.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(
        &self,
        id: &Identifier<T>,
    ) -> Result<Vec<Arc<T>>, CapabilityMissingError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = state.slots.get(&Self::key(id)) else {
            return Err(CapabilityMissingError { name: id.name });
        };
        let resolved: Vec<Arc<T>> = if slot.entries.is_empty() {
            slot.default.iter().filter_map(downcast::<T>).collect()
        } else {
            slot.entries
                .iter()
                .filter_map(|entry| downcast::<T>(&entry.value))
                .collect()
        };
        if resolved.is_empty() {
            return Err(CapabilityMissingError { name: id.name });
        }
        Ok(resolved)
    }

    /// Like [`Registry::resolve_all`], but an unresolved identifier yields an
    /// empty list. Used for optional hooks.
    pub fn try_resolve_all<T: ?Sized + Send + Sync + 'static>(&self, id: &Identifier<T>) -> Vec<Arc<T>> {
        self.resolve_all(id).unwrap_or_default()
    }

    /// Whether the identifier resolves to anything, default included.
    pub fn contains<T: ?Sized + 'static>(&self, id: &Identifier<T>) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .slots
            .get(&Self::key(id))
            .is_some_and(|slot| !slot.is_empty())
    }

    /// Drop every registration of the identifier, keeping its default.
    /// Returns whether anything was removed.
    pub fn unregister<T: ?Sized + 'static>(&self, id: &Identifier<T>) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.slots.get_mut(&Self::key(id)).is_some_and(|slot| {
            let had = !slot.entries.is_empty();
            slot.entries.clear();
            had
        })
    }

    /// Drop every registration and default.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.slots.clear();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&str> = state.slots.keys().map(|(name, _)| *name).collect();
        names.sort_unstable();
        formatter.debug_struct("Registry").field("capabilities", &names).finish()
    }
}
