//! Per-entity field indexes, built once and shared for the process lifetime.
//!
//! An index lists every field an entity declares or inherits and maps both
//! the field name and the backend alias onto the field. Indexes are keyed by
//! descriptor identity and backend and are never invalidated, as descriptors
//! are static.

use crate::metadata::{Backend, Entity, EntityDescriptor, FieldDescriptor};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// The resolved fields of one entity for one backend.
#[derive(Debug)]
pub struct FieldIndex {
    entity: &'static str,
    backend: Backend,
    fields: Vec<&'static FieldDescriptor>,
    by_name: HashMap<&'static str, &'static FieldDescriptor>,
}

impl FieldIndex {
    /// Walks the descriptor and its parents, nearest first. The first
    /// declaration of a name wins, both for field names and for aliases.
    pub fn build(descriptor: &'static EntityDescriptor, backend: Backend) -> Self {
        let mut fields = Vec::new();
        let mut by_name = HashMap::new();

        for field in descriptor.all_fields() {
            if by_name.contains_key(field.name) {
                continue;
            }

            by_name.insert(field.name, field);
            fields.push(field);
        }

        for field in &fields {
            if let Some(alias) = field.alias(backend) {
                by_name.entry(alias).or_insert(*field);
            }
        }

        FieldIndex {
            entity: descriptor.name,
            backend,
            fields,
            by_name,
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Looks up a field by its name or its backend alias.
    pub fn get(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.by_name.get(name).copied()
    }

    /// Determines if the candidate names a field directly or via its alias.
    pub fn is_valid_sort_field(&self, candidate: &str) -> bool {
        self.by_name.contains_key(candidate)
    }

    /// All fields, own fields first, shadowed ancestors removed.
    pub fn fields(&self) -> &[&'static FieldDescriptor] {
        &self.fields
    }

    /// The declared names of all fields.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }
}

/// Thread-safe, grow-only cache of [`FieldIndex`] values.
#[derive(Default)]
pub struct FieldMetadataCache {
    indexes: DashMap<(usize, Backend), Arc<FieldIndex>>,
}

static GLOBAL_CACHE: LazyLock<FieldMetadataCache> = LazyLock::new(FieldMetadataCache::default);

impl FieldMetadataCache {
    /// The process-wide cache used by the query tools.
    pub fn global() -> &'static FieldMetadataCache {
        &GLOBAL_CACHE
    }

    /// Returns the index of the descriptor, building it on first access.
    ///
    /// Concurrent first accesses build at most one visible entry, every
    /// caller receives the same `Arc`.
    pub fn index(&self, descriptor: &'static EntityDescriptor, backend: Backend) -> Arc<FieldIndex> {
        let key = (descriptor as *const EntityDescriptor as usize, backend);
        if let Some(index) = self.indexes.get(&key) {
            return Arc::clone(index.value());
        }

        let entry = self.indexes.entry(key).or_insert_with(|| {
            tracing::debug!(
                "Indexing fields of '{}' for the {} backend",
                descriptor.name,
                backend
            );
            Arc::new(FieldIndex::build(descriptor, backend))
        });

        Arc::clone(entry.value())
    }

    /// Shorthand for [`FieldMetadataCache::index`] on an entity type.
    pub fn index_for<E: Entity>(&self, backend: Backend) -> Arc<FieldIndex> {
        self.index(E::descriptor(), backend)
    }

    /// Resolves a dotted path one segment at a time.
    ///
    /// Each segment is looked up (by name or alias) in the index of the
    /// descriptor the previous segment pointed to. Returns `None` if any
    /// segment is unknown or a non-final segment cannot be descended into.
    pub fn resolve_path(
        &self,
        descriptor: &'static EntityDescriptor,
        backend: Backend,
        path: &str,
    ) -> Option<Vec<&'static FieldDescriptor>> {
        let mut current = descriptor;
        let mut resolved = Vec::new();
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let field = self.index(current, backend).get(segment)?;
            resolved.push(field);

            if segments.peek().is_some() {
                current = field.kind.target()?;
            }
        }

        Some(resolved)
    }

    /// Number of cached indexes.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
