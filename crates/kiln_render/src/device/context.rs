//! Device Context
//!
//! Everything a pass needs from the outside world, passed in explicitly.

use std::fmt;
use std::sync::Arc;

use super::DeviceObjectFactory;
use super::reflection::ShaderReflection;
use crate::pass::scheduler::PassScheduler;
use crate::resources::registry::ResourceRegistry;

#[derive(Clone)]
pub struct DeviceContext {
    factory: Arc<dyn DeviceObjectFactory>,
    reflection: Arc<dyn ShaderReflection>,
    registry: Arc<ResourceRegistry>,
    scheduler: Option<Arc<dyn PassScheduler>>,
}

impl DeviceContext {
    #[must_use]
    pub fn new(
        factory: Arc<dyn DeviceObjectFactory>,
        reflection: Arc<dyn ShaderReflection>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        Self {
            factory,
            reflection,
            registry,
            scheduler: None,
        }
    }

    /// Routes `execute` calls through `scheduler` while it is batching.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn PassScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[inline]
    #[must_use]
    pub fn factory(&self) -> &dyn DeviceObjectFactory {
        self.factory.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn reflection(&self) -> &dyn ShaderReflection {
        self.reflection.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> Option<&Arc<dyn PassScheduler>> {
        self.scheduler.as_ref()
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("resources", &self.registry.len())
            .field("scheduler", &self.scheduler.is_some())
            .finish_non_exhaustive()
    }
}
