//! Coordinator - Module mounting and lifecycle
//!
//! The coordinator owns the process's mount points: named, typed registry
//! slots holding the live module instances for one run. Module entry
//! points receive the coordinator, register exactly one instance on the
//! appropriate mount point, and may hand back a teardown action. The
//! coordinator guarantees each teardown runs exactly once, in reverse
//! mount order, on shutdown. Startup is all-or-nothing: a failed mount
//! first tears down everything mounted before it.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::hooks::{Hook, HookRegistry};
use crate::orchestrator::Orchestrator;
use crate::profile::{ModuleDescriptor, ResolvedProfile};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use talos_llm::Provider;
use talos_tools::Tool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mount point names
pub mod points {
    /// Language-model providers
    pub const PROVIDERS: &str = "providers";
    /// Tools
    pub const TOOLS: &str = "tools";
    /// Lifecycle hooks
    pub const HOOKS: &str = "hooks";
    /// Context managers
    pub const CONTEXT: &str = "context";
    /// Orchestrators
    pub const ORCHESTRATOR: &str = "orchestrator";
}

/// An asynchronous cleanup action returned by a module entry point
pub type Teardown = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Trait for module initialization entry points.
///
/// `mount` is invoked exactly once per descriptor. It must register one
/// instance on the coordinator and may return a teardown action.
#[async_trait::async_trait]
pub trait ModuleFactory: Send + Sync {
    /// Mount the module described by `descriptor` onto the coordinator
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>>;
}

/// Explicit source-locator → factory registration (no reflection)
#[derive(Default)]
pub struct ModuleCatalog {
    factories: HashMap<String, Arc<dyn ModuleFactory>>,
}

impl ModuleCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a source locator
    pub fn register(&mut self, source: impl Into<String>, factory: Arc<dyn ModuleFactory>) {
        self.factories.insert(source.into(), factory);
    }

    /// Look up a factory
    #[must_use]
    pub fn get(&self, source: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.factories.get(source).cloned()
    }
}

/// A named registry slot for one category of module
pub struct MountPoint<T: ?Sized + Send + Sync> {
    point: &'static str,
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized + Send + Sync> MountPoint<T> {
    fn new(point: &'static str) -> Self {
        Self {
            point,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert an instance; duplicate names on one point are an error
    pub fn insert(&self, name: &str, instance: Arc<T>) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(name) {
            return Err(Error::DuplicateMount {
                point: self.point.to_string(),
                name: name.to_string(),
            });
        }
        debug!(point = self.point, name = %name, "Mounted module instance");
        entries.insert(name.to_string(), instance);
        Ok(())
    }

    /// Get an instance by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Remove an instance by name
    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    /// All names on this point, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// A point-in-time copy of the whole slot
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The instance under the lexicographically first name
    #[must_use]
    pub fn first(&self) -> Option<Arc<T>> {
        let name = self.names().into_iter().next()?;
        self.get(&name)
    }

    /// Number of mounted instances
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Whether the point is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Process-wide registry of mount points with lifecycle guarantees
pub struct ModuleCoordinator {
    catalog: ModuleCatalog,
    providers: MountPoint<dyn Provider>,
    tools: MountPoint<dyn Tool>,
    hooks: MountPoint<dyn Hook>,
    contexts: MountPoint<dyn Context>,
    orchestrators: MountPoint<dyn Orchestrator>,
    /// Teardowns in mount order, keyed by descriptor name; drained LIFO
    teardowns: Mutex<Vec<(String, Teardown)>>,
}

impl ModuleCoordinator {
    /// Create a coordinator over the given module catalog
    #[must_use]
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self {
            catalog,
            providers: MountPoint::new(points::PROVIDERS),
            tools: MountPoint::new(points::TOOLS),
            hooks: MountPoint::new(points::HOOKS),
            contexts: MountPoint::new(points::CONTEXT),
            orchestrators: MountPoint::new(points::ORCHESTRATOR),
            teardowns: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Registration API (called by module entry points)
    // ------------------------------------------------------------------

    /// Register a provider instance
    pub fn register_provider(&self, name: &str, provider: Arc<dyn Provider>) -> Result<()> {
        self.providers.insert(name, provider)
    }

    /// Register a tool instance
    pub fn register_tool(&self, name: &str, tool: Arc<dyn Tool>) -> Result<()> {
        self.tools.insert(name, tool)
    }

    /// Register a hook instance
    pub fn register_hook(&self, name: &str, hook: Arc<dyn Hook>) -> Result<()> {
        self.hooks.insert(name, hook)
    }

    /// Register a context-manager instance
    pub fn register_context(&self, name: &str, context: Arc<dyn Context>) -> Result<()> {
        self.contexts.insert(name, context)
    }

    /// Register an orchestrator instance
    pub fn register_orchestrator(
        &self,
        name: &str,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Result<()> {
        self.orchestrators.insert(name, orchestrator)
    }

    // ------------------------------------------------------------------
    // Lookup API
    // ------------------------------------------------------------------

    /// Get a provider by name
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name)
    }

    /// Get a tool by name
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Snapshot of all mounted providers
    #[must_use]
    pub fn providers(&self) -> HashMap<String, Arc<dyn Provider>> {
        self.providers.snapshot()
    }

    /// Snapshot of all mounted tools
    #[must_use]
    pub fn tools(&self) -> HashMap<String, Arc<dyn Tool>> {
        self.tools.snapshot()
    }

    /// The active context manager (first mounted)
    #[must_use]
    pub fn context(&self) -> Option<Arc<dyn Context>> {
        self.contexts.first()
    }

    /// The active orchestrator (first mounted)
    #[must_use]
    pub fn orchestrator(&self) -> Option<Arc<dyn Orchestrator>> {
        self.orchestrators.first()
    }

    /// Hooks as an emission registry, in deterministic name order
    #[must_use]
    pub fn hook_registry(&self) -> HookRegistry {
        let hooks = self
            .hooks
            .names()
            .into_iter()
            .filter_map(|name| self.hooks.get(&name))
            .collect();
        HookRegistry::new(hooks)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Mount one module by descriptor: resolve its factory, run the entry
    /// point, and record any teardown it returns
    pub async fn mount(&self, descriptor: &ModuleDescriptor) -> Result<()> {
        let factory = self.catalog.get(&descriptor.source).ok_or_else(|| {
            Error::Resolution(format!(
                "no module factory registered for source '{}'",
                descriptor.source
            ))
        })?;

        match factory.mount(self, descriptor).await {
            Ok(Some(teardown)) => {
                self.teardowns
                    .lock()
                    .await
                    .push((descriptor.name.clone(), teardown));
                info!(name = %descriptor.name, source = %descriptor.source, "Mounted module");
                Ok(())
            }
            Ok(None) => {
                info!(name = %descriptor.name, source = %descriptor.source, "Mounted module");
                Ok(())
            }
            Err(source) => Err(Error::MountFailed {
                name: descriptor.name.clone(),
                source,
            }),
        }
    }

    /// Mount every module a resolved profile names, in section order
    /// (context, providers, tools, hooks, orchestrator).
    ///
    /// All-or-nothing: if any mount fails, everything mounted so far is
    /// torn down before the error is returned.
    pub async fn load_profile(&self, profile: &ResolvedProfile) -> Result<()> {
        let mut descriptors: Vec<&ModuleDescriptor> = Vec::new();
        if let Some(context) = &profile.session.context {
            descriptors.push(context);
        }
        descriptors.extend(&profile.providers);
        descriptors.extend(&profile.tools);
        descriptors.extend(&profile.hooks);
        if let Some(orchestrator) = &profile.session.orchestrator {
            descriptors.push(orchestrator);
        }

        info!(profile = %profile.name, modules = descriptors.len(), "Loading profile");

        for descriptor in descriptors {
            if let Err(e) = self.mount(descriptor).await {
                error!(
                    profile = %profile.name,
                    module = %descriptor.name,
                    error = %e,
                    "Mount failed, rolling back profile"
                );
                self.shutdown().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Unmount one instance from a named point and run its teardown (if
    /// the module registered one) immediately
    pub async fn unmount(&self, point: &str, name: &str) -> Result<()> {
        let removed = match point {
            points::PROVIDERS => self.providers.remove(name).is_some(),
            points::TOOLS => self.tools.remove(name).is_some(),
            points::HOOKS => self.hooks.remove(name).is_some(),
            points::CONTEXT => self.contexts.remove(name).is_some(),
            points::ORCHESTRATOR => self.orchestrators.remove(name).is_some(),
            other => return Err(Error::UnknownMountPoint(other.to_string())),
        };
        if !removed {
            warn!(point = %point, name = %name, "Unmount of an instance that was not mounted");
        }

        let teardown = {
            let mut teardowns = self.teardowns.lock().await;
            teardowns
                .iter()
                .position(|(n, _)| n == name)
                .map(|i| teardowns.remove(i).1)
        };
        if let Some(teardown) = teardown {
            teardown.await;
            debug!(name = %name, "Ran module teardown on unmount");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session assembly
    // ------------------------------------------------------------------

    /// Snapshot the mounted modules for one loop run, using the mounted
    /// context manager
    pub fn session_modules(&self) -> Result<crate::orchestrator::SessionModules> {
        let context = self
            .context()
            .ok_or_else(|| Error::Internal("no context module mounted".to_string()))?;
        Ok(self.session_modules_with(context))
    }

    /// Snapshot the mounted modules for one loop run over a caller-supplied
    /// context (recipe stages run against their own context slice)
    #[must_use]
    pub fn session_modules_with(
        &self,
        context: Arc<dyn Context>,
    ) -> crate::orchestrator::SessionModules {
        crate::orchestrator::SessionModules {
            context,
            providers: self.providers.snapshot(),
            tools: self.tools.snapshot(),
            hooks: self.hook_registry(),
        }
    }

    /// Run one prompt through the mounted orchestrator
    pub async fn execute_prompt(
        &self,
        request: crate::orchestrator::LoopRequest,
        cancel: CancellationToken,
    ) -> Result<crate::orchestrator::LoopOutcome> {
        let orchestrator = self
            .orchestrator()
            .ok_or_else(|| Error::Internal("no orchestrator mounted".to_string()))?;
        let modules = self.session_modules()?;
        orchestrator.execute(request, &modules, cancel).await
    }

    /// Run all registered teardowns exactly once, in reverse mount order,
    /// and clear every mount point
    pub async fn shutdown(&self) {
        let mut teardowns = self.teardowns.lock().await;
        let drained: Vec<(String, Teardown)> = teardowns.drain(..).collect();
        drop(teardowns);

        for (name, teardown) in drained.into_iter().rev() {
            debug!(name = %name, "Running module teardown");
            teardown.await;
        }

        self.providers.clear();
        self.tools.clear();
        self.hooks.clear();
        self.contexts.clear();
        self.orchestrators.clear();
        info!("Coordinator shut down");
    }
}
