//! Explicit build/destroy lifecycle for repositories and other services.
//!
//! The owning application registers its services with a [`LifecycleManager`],
//! signals `build()` once to connect them all, looks them up by name while
//! running, and signals `destroy()` once on shutdown:
//!
//! ```ignore
//! let mut manager = LifecycleManager::new();
//! manager.register(Repository::<_, DataObject>::new(server.clone(), options.clone()));
//! manager.register(Repository::<_, DataFrame>::new(server.clone(), options));
//!
//! manager.build().await?;
//!
//! let frames = manager
//!     .service::<Repository<InMemoryServer, DataFrame>>("DataFrame")
//!     .expect("registered above");
//! frames.find_all(doc! {}, None).await?;
//!
//! manager.destroy().await?;
//! ```

use async_trait::async_trait;
use std::any::Any;

use crate::{
    backend::Connector,
    document::Document,
    error::RepositoryResult,
    repository::Repository,
    serializer::Serializer,
};

/// A service that reacts to the build and destroy signals.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// Name the service is registered and looked up under.
    fn name(&self) -> &str;

    /// Called once when the application is built.
    async fn build(&mut self) -> RepositoryResult<()>;

    /// Called once when the application is destroyed.
    async fn destroy(&mut self) -> RepositoryResult<()>;

    /// Upcast used to look services up by concrete type.
    fn as_any(&self) -> &dyn Any;
    /// Mutable counterpart of [`Lifecycle::as_any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[async_trait]
impl<C, D, S> Lifecycle for Repository<C, D, S>
where
    C: Connector,
    D: Document,
    S: Serializer,
{
    fn name(&self) -> &str {
        D::type_name()
    }

    async fn build(&mut self) -> RepositoryResult<()> {
        self.connect().await
    }

    async fn destroy(&mut self) -> RepositoryResult<()> {
        self.disconnect().await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Which lifecycle signal a [`LifecycleManager`] has emitted last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// No signal emitted yet.
    Created,
    /// `build()` has run.
    Built,
    /// `destroy()` has run.
    Destroyed,
}

/// Owns a set of services and drives their lifecycle.
///
/// Both signals are one-shot: a second `build()` or `destroy()` is a no-op,
/// and `build()` after `destroy()` does nothing.
pub struct LifecycleManager {
    services: Vec<Box<dyn Lifecycle>>,
    stage: Stage,
}

impl LifecycleManager {
    /// Creates a manager with no services.
    pub fn new() -> Self {
        Self { services: Vec::new(), stage: Stage::Created }
    }

    /// Adds a service. Services are built and destroyed in registration order.
    pub fn register<L: Lifecycle>(&mut self, service: L) -> &mut Self {
        self.services.push(Box::new(service));
        self
    }

    /// Returns the current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Names of the registered services, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|service| service.name())
    }

    /// Finds the service registered under `name` with concrete type `L`.
    pub fn service<L: Lifecycle>(&self, name: &str) -> Option<&L> {
        self.services
            .iter()
            .filter(|service| service.name() == name)
            .find_map(|service| service.as_any().downcast_ref::<L>())
    }

    /// Mutable counterpart of [`LifecycleManager::service`].
    pub fn service_mut<L: Lifecycle>(&mut self, name: &str) -> Option<&mut L> {
        self.services
            .iter_mut()
            .filter(|service| service.name() == name)
            .find_map(|service| service.as_any_mut().downcast_mut::<L>())
    }

    /// Emits the build signal.
    ///
    /// Services are built one after the other; the first failure stops the
    /// sequence and is returned. The signal counts as emitted either way.
    pub async fn build(&mut self) -> RepositoryResult<()> {
        if self.stage != Stage::Created {
            return Ok(());
        }
        self.stage = Stage::Built;

        for service in self.services.iter_mut() {
            tracing::debug!(service = service.name(), "building service");

            if let Err(err) = service.build().await {
                tracing::warn!(service = service.name(), error = %err, "service failed to build");
                return Err(err);
            }
        }

        Ok(())
    }

    /// Emits the destroy signal.
    ///
    /// Every service is destroyed even if an earlier one fails; the first
    /// failure is returned.
    pub async fn destroy(&mut self) -> RepositoryResult<()> {
        if self.stage == Stage::Destroyed {
            return Ok(());
        }
        self.stage = Stage::Destroyed;

        let mut first_error = None;

        for service in self.services.iter_mut() {
            tracing::debug!(service = service.name(), "destroying service");

            if let Err(err) = service.destroy().await {
                tracing::warn!(service = service.name(), error = %err, "service failed to destroy");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
