//! Ordered teardown of containers that share namespaces

use std::collections::BTreeMap;
use std::sync::Arc;
use tandem_core::{ContainerId, Result};
use tokio::sync::Mutex;

use crate::container::Container;
use crate::registry::Registry;

/// Destroys containers so that borrowers go before the lenders they joined
///
/// The order is advisory: [`Container::destroy`] never refuses, it only warns
/// when a lender is destroyed while a borrower is still live.
#[derive(Debug, Clone)]
pub struct TeardownOrchestrator {
    registry: Arc<Mutex<Registry>>,
}

impl TeardownOrchestrator {
    pub(crate) const fn new(registry: Arc<Mutex<Registry>>) -> Self {
        Self { registry }
    }

    /// Live containers that joined a namespace of `id`
    pub async fn borrowers_of(&self, id: &ContainerId) -> Vec<ContainerId> {
        self.registry.lock().await.borrowers_of(id)
    }

    /// Order `ids` so every container comes after all of its borrowers
    ///
    /// Ties keep the order of `ids`; duplicates are dropped.
    pub async fn teardown_order(&self, ids: &[ContainerId]) -> Vec<ContainerId> {
        let borrowers: BTreeMap<&ContainerId, Vec<ContainerId>> = {
            let registry = self.registry.lock().await;
            ids.iter().map(|id| (id, registry.borrowers_of(id))).collect()
        };

        let mut remaining: Vec<&ContainerId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !remaining.contains(&id) {
                remaining.push(id);
            }
        }

        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let ready = remaining.iter().position(|id| {
                borrowers
                    .get(id)
                    .is_none_or(|list| list.iter().all(|b| !remaining.contains(&b)))
            });

            // A cycle cannot be built through a factory; fall back to input order.
            let next = ready.unwrap_or(0);
            order.push(remaining.remove(next).clone());
        }

        order
    }

    /// Destroy `containers`, borrowers first
    ///
    /// Every container is destroyed even if an earlier one fails.
    ///
    /// # Errors
    /// Returns the first destroy error.
    pub async fn destroy_all(&self, containers: &mut [Container]) -> Result<()> {
        let ids: Vec<ContainerId> = containers.iter().map(|c| c.id().clone()).collect();
        let order = self.teardown_order(&ids).await;

        tracing::info!(order = ?order, "Tearing down containers");

        let mut first_error = None;
        for id in &order {
            let Some(container) = containers.iter_mut().find(|c| c.id() == id) else {
                continue;
            };
            if let Err(e) = container.destroy().await {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
