//! Creating containers

use std::sync::Arc;
use std::time::SystemTime;
use tandem_cgroup::{CgroupPath, DriverKind, DriverProvider};
use tandem_core::{ContainerEvent, ContainerId, Error, Result};
use tokio::sync::{mpsc, Mutex};

use crate::config::ContainerConfig;
use crate::container::Container;
use crate::events::EventSink;
use crate::registry::Registry;
use crate::teardown::TeardownOrchestrator;

/// Creates containers and keeps track of the live ones
///
/// Names are unique among a factory's live containers; destroying a container
/// frees its name. The factory also records which containers joined
/// namespaces exposed by another, for [`TeardownOrchestrator`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tandem_cgroup::MockProvider;
/// use tandem_container::{ContainerConfig, ContainerStatus, Factory};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let factory = Factory::new(Arc::new(MockProvider::new()));
/// let config = ContainerConfig::builder("/").build().unwrap();
///
/// let mut container = factory.create("web", config.clone()).await.unwrap();
/// assert_eq!(container.status(), ContainerStatus::Created);
/// assert!(factory.create("web", config).await.is_err());
///
/// container.destroy().await.unwrap();
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Factory {
    provider: Arc<dyn DriverProvider>,
    registry: Arc<Mutex<Registry>>,
    events: EventSink,
}

impl Factory {
    /// Create a factory handing out cgroup drivers from `provider`
    #[must_use]
    pub fn new(provider: Arc<dyn DriverProvider>) -> Self {
        Self {
            provider,
            registry: Arc::new(Mutex::new(Registry::default())),
            events: EventSink::default(),
        }
    }

    /// Add event channel for lifecycle events
    ///
    /// Applies to containers created afterwards.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<ContainerEvent>) -> Self {
        self.events = EventSink::new(Some(tx));
        self
    }

    /// Create a container named `name`
    ///
    /// Only a cgroup driver is chosen here; nothing is created on the system
    /// until the container runs its first process.
    ///
    /// # Errors
    /// - [`Error::ConfigInvalid`] for an invalid name or configuration
    /// - [`Error::DuplicateName`] if a live container already uses `name`
    pub async fn create(&self, name: &str, config: ContainerConfig) -> Result<Container> {
        config.validate()?;
        let id = ContainerId::new(name)?;

        let cgroup_path = config
            .cgroup_path()
            .cloned()
            .unwrap_or_else(|| CgroupPath::for_container(&id));
        let kind = DriverKind::select(&cgroup_path);

        let mut registry = self.registry.lock().await;
        if registry.contains(&id) {
            return Err(Error::DuplicateName {
                name: name.to_string(),
            });
        }

        let lenders = registry.lenders_for(config.namespaces());
        let driver = self.provider.driver(kind, &cgroup_path);

        tracing::info!(
            container_id = %id,
            driver = %kind,
            cgroup = %cgroup_path,
            lenders = ?lenders,
            "Creating container"
        );

        registry.register(id.clone(), lenders);
        drop(registry);

        self.events.emit(ContainerEvent::Created {
            id: id.clone(),
            timestamp: SystemTime::now(),
        });

        Ok(Container::new(
            id,
            Arc::new(config),
            driver,
            Arc::clone(&self.registry),
            self.events.clone(),
        ))
    }

    /// Create a container with a generated name
    ///
    /// # Errors
    /// Same as [`Factory::create`].
    pub async fn create_generated(&self, config: ContainerConfig) -> Result<Container> {
        let id = ContainerId::generate();
        self.create(id.as_str(), config).await
    }

    /// Whether a live container uses `name`
    pub async fn contains(&self, name: &str) -> bool {
        match ContainerId::new(name) {
            Ok(id) => self.registry.lock().await.contains(&id),
            Err(_) => false,
        }
    }

    /// Orchestrator ordering teardown by this factory's sharing graph
    #[must_use]
    pub fn teardown(&self) -> TeardownOrchestrator {
        TeardownOrchestrator::new(Arc::clone(&self.registry))
    }
}
