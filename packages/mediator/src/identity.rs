//! Process-wide type identities for requests and notifications.
//!
//! Every concrete request or notification type is assigned a [`TypeIdentity`]
//! the first time it is looked up. The identity is cached for the lifetime of
//! the process and never released.
//!
//! # Guarantees
//!
//! - **Stable**: the same type always resolves to the same identity
//! - **Distinct**: two different types never share an identity, even when
//!   they are structurally identical
//! - **Allocate-once**: concurrent first lookups for one type observe a
//!   single identity

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use dashmap::DashMap;

/// Opaque token identifying one concrete request or notification type.
///
/// Equality and hashing only consider the allocated id. The type name is
/// carried for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeIdentity {
    id: u64,
    name: &'static str,
}

impl TypeIdentity {
    /// Resolve the identity of `T` in the global registry.
    pub fn of<T: 'static>() -> Self {
        TypeRegistry::global().identity_of::<T>()
    }

    /// The numeric id allocated for this type.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The Rust type name this identity was allocated for.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeIdentity {}

impl Hash for TypeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIdentity({}#{})", self.name, self.id)
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Registry mapping Rust types to their [`TypeIdentity`].
///
/// Use [`TypeRegistry::global`] for the process registry. Separate instances
/// allocate from their own counter and are only useful in isolation (tests).
pub struct TypeRegistry {
    identities: DashMap<TypeId, TypeIdentity>,
    next_id: AtomicU64,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            identities: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static TypeRegistry {
        static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TypeRegistry::new)
    }

    /// Resolve (allocating on first use) the identity of `T`.
    pub fn identity_of<T: 'static>(&self) -> TypeIdentity {
        self.identity_of_id(TypeId::of::<T>(), type_name::<T>())
    }

    /// Resolve the identity for a raw `TypeId`.
    ///
    /// `name` is only recorded when the identity is allocated by this call.
    pub fn identity_of_id(&self, type_id: TypeId, name: &'static str) -> TypeIdentity {
        if let Some(identity) = self.identities.get(&type_id) {
            return *identity;
        }

        // The entry holds the shard lock, so only one caller allocates.
        *self.identities.entry(type_id).or_insert_with(|| TypeIdentity {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name,
        })
    }

    /// Number of identities allocated so far.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Returns true if no identity has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("identities", &self.identities.len())
            .finish()
    }
}
