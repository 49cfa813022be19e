//! Live containers of a factory and who borrows namespaces from whom

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tandem_core::ContainerId;
use tandem_namespace::NamespaceSet;

#[derive(Debug, Default)]
struct Entry {
    /// Namespace handles owned by the container's running init
    exposed: Vec<PathBuf>,
    /// Containers whose namespaces this one joined
    lenders: BTreeSet<ContainerId>,
}

/// Name registry and lender/borrower graph
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: BTreeMap<ContainerId, Entry>,
}

impl Registry {
    pub(crate) fn contains(&self, id: &ContainerId) -> bool {
        self.entries.contains_key(id)
    }

    /// Live containers exposing a path that `namespaces` joins
    pub(crate) fn lenders_for(&self, namespaces: &NamespaceSet) -> BTreeSet<ContainerId> {
        namespaces
            .shared()
            .filter_map(|(_, path)| self.owner_of(path))
            .cloned()
            .collect()
    }

    fn owner_of(&self, path: &Path) -> Option<&ContainerId> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.exposed.iter().any(|p| p == path))
            .map(|(id, _)| id)
    }

    pub(crate) fn register(&mut self, id: ContainerId, lenders: BTreeSet<ContainerId>) {
        self.entries.insert(
            id,
            Entry {
                exposed: Vec::new(),
                lenders,
            },
        );
    }

    /// Record the namespace handles a container's current init exposes
    pub(crate) fn expose(&mut self, id: &ContainerId, paths: Vec<PathBuf>) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.exposed = paths;
        }
    }

    /// Live containers that joined a namespace of `id`
    pub(crate) fn borrowers_of(&self, id: &ContainerId) -> Vec<ContainerId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.lenders.contains(id))
            .map(|(borrower, _)| borrower.clone())
            .collect()
    }

    /// Remove a container, returning borrowers that are still live
    ///
    /// The edges to those borrowers go too, so a later container reusing the
    /// name starts without any.
    pub(crate) fn unregister(&mut self, id: &ContainerId) -> Vec<ContainerId> {
        self.entries.remove(id);
        let borrowers = self.borrowers_of(id);
        for entry in self.entries.values_mut() {
            entry.lenders.remove(id);
        }
        borrowers
    }
}
