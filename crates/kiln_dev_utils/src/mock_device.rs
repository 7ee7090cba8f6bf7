//! Mock Device
//!
//! A deterministic [`DeviceObjectFactory`] with switchable failure modes.
//! Layouts and pipeline states are deduplicated by value through
//! [`DeviceObjectCache`], the same way a real backend shares them between
//! passes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use kiln_core::Tracked;
use kiln_render::device::{
    ComputePipelineKey, ComputePsoDescription, DeviceContext, DeviceObjectCache,
    DeviceObjectFactory, DevicePipelineState, DeviceResourceLayout, DeviceResourceSet, NoReflection,
    PipelineStateHandle, ResourceLayoutHandle, ResourceSetFlags, ResourceSetHandle,
    ShaderReflection,
};
use kiln_render::resources::{
    ResourceBindPoint, ResourceBinding, ResourceLayoutDescription, ResourceRegistry,
    ResourceSetDescription, ResourceSetDirty,
};
use parking_lot::Mutex;

// ─── Resource Set ────────────────────────────────────────────────────────────

/// Snapshot of the bindings realised by the last successful update.
pub type BindingSnapshot = Vec<(ResourceBindPoint, ResourceBinding)>;

pub struct MockResourceSet {
    id: u64,
    flags: ResourceSetFlags,
    registry: Arc<ResourceRegistry>,
    fail_updates: Arc<AtomicBool>,
    bindings: Mutex<BindingSnapshot>,
    update_count: AtomicUsize,
}

impl MockResourceSet {
    #[must_use]
    pub fn flags(&self) -> ResourceSetFlags {
        self.flags
    }

    #[must_use]
    pub fn bindings(&self) -> BindingSnapshot {
        self.bindings.lock().clone()
    }

    /// Number of successful updates.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::Relaxed)
    }
}

impl DeviceResourceSet for MockResourceSet {
    fn id(&self) -> u64 {
        self.id
    }

    fn update(&self, desc: &ResourceSetDescription, filter: ResourceSetDirty) -> bool {
        if self.fail_updates.load(Ordering::Acquire) {
            return false;
        }
        if let Err(err) = desc.validate(&self.registry) {
            log::debug!("Mock resource set {} rejected update ({filter:?}): {err}", self.id);
            return false;
        }
        *self.bindings.lock() = desc.iter().map(|(point, binding)| (*point, *binding)).collect();
        self.update_count.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl fmt::Debug for MockResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockResourceSet")
            .field("id", &self.id)
            .field("bindings", &self.bindings.lock().len())
            .finish_non_exhaustive()
    }
}

// ─── Layout / Pipeline ───────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MockResourceLayout {
    desc: Tracked<ResourceLayoutDescription>,
}

impl MockResourceLayout {
    #[must_use]
    pub fn description(&self) -> &ResourceLayoutDescription {
        &self.desc
    }
}

impl DeviceResourceLayout for MockResourceLayout {
    fn id(&self) -> u64 {
        self.desc.id()
    }
}

#[derive(Debug)]
pub struct MockPipelineState {
    key: Tracked<ComputePipelineKey>,
    valid: AtomicBool,
    update_count: AtomicU64,
}

impl MockPipelineState {
    #[must_use]
    pub fn key(&self) -> &ComputePipelineKey {
        &self.key
    }

    /// Simulates a hot-reload of the pipeline.
    pub fn bump_update_count(&self) {
        self.update_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }
}

impl DevicePipelineState for MockPipelineState {
    fn id(&self) -> u64 {
        self.key.id()
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Acquire)
    }
}

// ─── Factory ─────────────────────────────────────────────────────────────────

pub struct MockDevice {
    registry: Arc<ResourceRegistry>,
    resource_sets: Mutex<Vec<Arc<MockResourceSet>>>,
    layouts: DeviceObjectCache<ResourceLayoutDescription, Arc<MockResourceLayout>>,
    pipelines: DeviceObjectCache<ComputePipelineKey, Arc<MockPipelineState>>,

    fail_resource_set_updates: Arc<AtomicBool>,
    fail_layouts: AtomicBool,
    fail_pipelines: AtomicBool,
    create_invalid_pipelines: AtomicBool,

    layout_requests: AtomicUsize,
    pipeline_requests: AtomicUsize,
}

impl MockDevice {
    #[must_use]
    pub fn new(registry: Arc<ResourceRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            resource_sets: Mutex::new(Vec::new()),
            layouts: DeviceObjectCache::new(),
            pipelines: DeviceObjectCache::new(),
            fail_resource_set_updates: Arc::new(AtomicBool::new(false)),
            fail_layouts: AtomicBool::new(false),
            fail_pipelines: AtomicBool::new(false),
            create_invalid_pipelines: AtomicBool::new(false),
            layout_requests: AtomicUsize::new(0),
            pipeline_requests: AtomicUsize::new(0),
        })
    }

    /// Context without shader reflection.
    #[must_use]
    pub fn context(self: &Arc<Self>) -> DeviceContext {
        self.context_with_reflection(Arc::new(NoReflection))
    }

    #[must_use]
    pub fn context_with_reflection(self: &Arc<Self>, reflection: Arc<dyn ShaderReflection>) -> DeviceContext {
        let factory: Arc<dyn DeviceObjectFactory> = self.clone();
        DeviceContext::new(factory, reflection, self.registry.clone())
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    // ---- Failure switches ----

    pub fn fail_resource_set_updates(&self, fail: bool) {
        self.fail_resource_set_updates.store(fail, Ordering::Release);
    }

    pub fn fail_layouts(&self, fail: bool) {
        self.fail_layouts.store(fail, Ordering::Release);
    }

    pub fn fail_pipelines(&self, fail: bool) {
        self.fail_pipelines.store(fail, Ordering::Release);
    }

    /// Newly created pipelines report `is_valid() == false`, and so do all
    /// cached ones.
    pub fn create_invalid_pipelines(&self, invalid: bool) {
        self.create_invalid_pipelines.store(invalid, Ordering::Release);
        for pipeline in self.pipelines.values() {
            pipeline.set_valid(!invalid);
        }
    }

    /// Bumps the update count of every cached pipeline.
    pub fn reload_pipelines(&self) {
        for pipeline in self.pipelines.values() {
            pipeline.bump_update_count();
        }
    }

    // ---- Inspection ----

    #[must_use]
    pub fn find_resource_set(&self, id: u64) -> Option<Arc<MockResourceSet>> {
        self.resource_sets.lock().iter().find(|set| set.id == id).cloned()
    }

    #[must_use]
    pub fn resource_set_count(&self) -> usize {
        self.resource_sets.lock().len()
    }

    #[must_use]
    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }

    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Calls to `create_resource_layout`, hits included.
    #[must_use]
    pub fn layout_requests(&self) -> usize {
        self.layout_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pipeline_requests(&self) -> usize {
        self.pipeline_requests.load(Ordering::Relaxed)
    }
}

impl DeviceObjectFactory for MockDevice {
    fn create_resource_set(&self, flags: ResourceSetFlags) -> ResourceSetHandle {
        let set = Arc::new(MockResourceSet {
            id: kiln_core::next_object_id(),
            flags,
            registry: self.registry.clone(),
            fail_updates: self.fail_resource_set_updates.clone(),
            bindings: Mutex::new(Vec::new()),
            update_count: AtomicUsize::new(0),
        });
        self.resource_sets.lock().push(set.clone());
        set
    }

    fn create_resource_layout(&self, desc: &ResourceLayoutDescription) -> Option<ResourceLayoutHandle> {
        self.layout_requests.fetch_add(1, Ordering::Relaxed);
        if self.fail_layouts.load(Ordering::Acquire) {
            return None;
        }
        if let Err(err) = desc.validate() {
            log::warn!("Mock device rejected resource layout: {err}");
            return None;
        }
        let layout = self.layouts.get_or_try_insert_with(desc.clone(), || {
            Some(Arc::new(MockResourceLayout {
                desc: Tracked::new(desc.clone()),
            }))
        })?;
        Some(layout)
    }

    fn create_compute_pso(&self, desc: &ComputePsoDescription) -> Option<PipelineStateHandle> {
        self.pipeline_requests.fetch_add(1, Ordering::Relaxed);
        if self.fail_pipelines.load(Ordering::Acquire) {
            return None;
        }
        let key = desc.key();
        let valid = !self.create_invalid_pipelines.load(Ordering::Acquire);
        let pipeline = self.pipelines.get_or_try_insert_with(key, || {
            Some(Arc::new(MockPipelineState {
                key: Tracked::new(key),
                valid: AtomicBool::new(valid),
                update_count: AtomicU64::new(1),
            }))
        })?;
        Some(pipeline)
    }
}

impl fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDevice")
            .field("resource_sets", &self.resource_set_count())
            .field("layouts", &self.layout_count())
            .field("pipelines", &self.pipeline_count())
            .finish_non_exhaustive()
    }
}
