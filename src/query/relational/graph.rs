//! Relations to load eagerly alongside the entities of a page.

use crate::metadata::{Backend, EntityDescriptor, FieldMetadataCache};
use std::collections::BTreeMap;

/// A tree of relation fields. Each node names a relation of its parent's
/// entity and holds the relations to load from there on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchGraph {
    nodes: BTreeMap<&'static str, FetchGraph>,
}

impl FetchGraph {
    /// Builds the graph for a projection allow-list.
    ///
    /// Only relation fields become nodes: plain columns are part of the row
    /// anyway. A dotted path descends as long as its segments are relations
    /// and is cut at the first segment which is not.
    pub fn of_fields<S: AsRef<str>>(
        cache: &FieldMetadataCache,
        descriptor: &'static EntityDescriptor,
        fields: &[S],
    ) -> Self {
        let mut graph = FetchGraph::default();

        for path in fields {
            let mut node = &mut graph;
            let mut current = descriptor;

            for segment in path.as_ref().split('.') {
                let index = cache.index(current, Backend::Relational);
                let Some(field) = index.get(segment).filter(|field| field.kind.is_relation())
                else {
                    break;
                };
                let Some(target) = field.kind.target() else {
                    break;
                };

                node = node.nodes.entry(field.name).or_default();
                current = target;
            }
        }

        graph
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The relations loaded directly from this node.
    pub fn attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.nodes.keys().copied()
    }

    pub fn subgraph(&self, attribute: &str) -> Option<&FetchGraph> {
        self.nodes.get(attribute)
    }

    /// All node paths in dotted notation, parents before children.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for (name, child) in &self.nodes {
            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            };
            child.collect_paths(&path, paths);
            paths.push(path);
        }
    }
}
