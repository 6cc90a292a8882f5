//! Type marshaling accelerator
//!
//! Typed objects are read and written through a per-type [`CompiledType`]
//! that is built once per type identifier and cached for the life of the
//! process.
//!
//! # Cache layout
//!
//! ```text
//!   entries: ArcSwap<HashMap<type name, Arc<TypeSlot>>>   lock-free reads
//!   TypeSlot: ArcSwap<CompiledType>                       fallback, then final
//!   build_locks: DashMap<type name, Mutex<()>>            one builder per name
//! ```
//!
//! On a miss the builder takes the lock for that name, publishes a slot
//! holding a generic fallback, and only then resolves and compiles the type.
//! A type that refers to itself, directly or through other types, finds the
//! published slot instead of re-entering the build. Readers racing with the
//! build see either the fallback or the final entry, never a partial one.

pub mod coerce;
pub mod compiled;
pub mod descriptor;
mod emit;
mod plan;

pub use coerce::{coerce, default_for, is_assignable, TypeLookup};
pub use compiled::{CompiledType, Marshaler, Origin};
pub use descriptor::{MemberDescriptor, MemberKind, TypeDescriptor, TypeRegistry, TypeResolver};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

use crate::amf::{ClassDefinition, Object, Value};
use crate::config::CompilerStrategy;
use crate::error::AmfError;
use crate::stats::{AcceleratorCounters, AcceleratorStats};

/// Published cache entry for one type identifier
///
/// The slot itself never changes once published; its content moves from the
/// fallback to the final compiled type exactly once.
pub struct TypeSlot {
    current: ArcSwap<CompiledType>,
}

impl TypeSlot {
    fn new(compiled: CompiledType) -> Self {
        Self {
            current: ArcSwap::from_pointee(compiled),
        }
    }

    pub fn load(&self) -> Arc<CompiledType> {
        self.current.load_full()
    }

    fn publish(&self, compiled: CompiledType) {
        self.current.store(Arc::new(compiled));
    }
}

/// Process-wide cache of compiled types
pub struct Accelerator {
    resolver: Arc<dyn TypeResolver>,
    strategy: CompilerStrategy,
    entries: ArcSwap<HashMap<Arc<str>, Arc<TypeSlot>>>,
    build_locks: DashMap<Arc<str>, Arc<Mutex<()>>>,
    counters: AcceleratorCounters,
}

impl Accelerator {
    pub fn new(resolver: Arc<dyn TypeResolver>, strategy: CompilerStrategy) -> Self {
        Self {
            resolver,
            strategy,
            entries: ArcSwap::from_pointee(HashMap::new()),
            build_locks: DashMap::new(),
            counters: AcceleratorCounters::default(),
        }
    }

    /// Shared accelerator over [`TypeRegistry::global`], one per strategy
    pub fn global(strategy: CompilerStrategy) -> Arc<Accelerator> {
        static PLAN: OnceLock<Arc<Accelerator>> = OnceLock::new();
        static EMIT: OnceLock<Arc<Accelerator>> = OnceLock::new();
        let cell = match strategy {
            CompilerStrategy::Plan => &PLAN,
            CompilerStrategy::Emit => &EMIT,
        };
        cell.get_or_init(|| Arc::new(Accelerator::new(TypeRegistry::global(), strategy)))
            .clone()
    }

    pub fn strategy(&self) -> CompilerStrategy {
        self.strategy
    }

    /// Current entry for a type identifier, building it on first use
    pub fn compiled(&self, type_name: &str) -> Arc<CompiledType> {
        self.slot(type_name).load()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.load().contains_key(type_name)
    }

    /// Number of published entries
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> AcceleratorStats {
        self.counters.snapshot()
    }

    /// Populate a typed object from decoded wire fields
    pub fn read_object(
        &self,
        class: &Arc<ClassDefinition>,
        sealed: Vec<Value>,
        dynamic: Vec<(Arc<str>, Value)>,
    ) -> Result<Object, AmfError> {
        self.compiled(class.name()).read(class, sealed, dynamic, self)
    }

    /// Shape an object for writing
    ///
    /// Anonymous objects and objects of unresolved types keep the shape of
    /// their own fields. Objects of compiled types are laid out in declared
    /// member order.
    pub fn compiled_for_write<'a>(&self, obj: &'a Object) -> Result<Cow<'a, Object>, AmfError> {
        match obj.type_name() {
            None => Ok(Cow::Borrowed(obj)),
            Some(type_name) => self.compiled(type_name).write(obj, self),
        }
    }

    /// Published slot for a type identifier, building it on a miss
    pub(crate) fn slot(&self, type_name: &str) -> Arc<TypeSlot> {
        if let Some(slot) = self.entries.load().get(type_name) {
            self.counters.hit();
            return slot.clone();
        }

        let lock = self
            .build_locks
            .entry(Arc::from(type_name))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        // Another builder may have finished while we waited
        if let Some(slot) = self.entries.load().get(type_name) {
            self.counters.hit();
            return slot.clone();
        }
        self.counters.miss();

        let name: Arc<str> = Arc::from(type_name);
        let slot = Arc::new(TypeSlot::new(CompiledType::fallback(type_name)));
        self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(name.clone(), slot.clone());
            next
        });
        debug!(type_name, "Published fallback entry");

        let compiled = match self.resolver.resolve(type_name) {
            Some(descriptor) => self.build(&descriptor),
            None => {
                warn!(type_name, "Unknown type, using a named dynamic bag");
                self.counters.dynamic_bag();
                CompiledType::dynamic_bag(type_name)
            }
        };
        slot.publish(compiled);
        self.build_locks.remove(type_name);
        slot
    }

    fn build(&self, descriptor: &TypeDescriptor) -> CompiledType {
        let compiled = match self.strategy {
            CompilerStrategy::Plan => match plan::build(descriptor) {
                Ok(compiled) => compiled,
                Err(e) => {
                    error!(type_name = descriptor.name(), error = %e, "Plan compilation failed");
                    self.counters.dynamic_bag();
                    return CompiledType::dynamic_bag(descriptor.name());
                }
            },
            CompilerStrategy::Emit => emit::build(descriptor, self),
        };
        self.counters.build();
        debug!(
            type_name = descriptor.name(),
            strategy = ?self.strategy,
            members = descriptor.members().len(),
            "Built compiled type"
        );
        compiled
    }
}

impl TypeLookup for Accelerator {
    fn compiled(&self, type_name: &str) -> Arc<CompiledType> {
        Accelerator::compiled(self, type_name)
    }
}

impl fmt::Debug for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accelerator")
            .field("strategy", &self.strategy)
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
