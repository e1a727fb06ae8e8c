use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{ActorSystem, ActorSystemOptions};
use crate::error::ActorError;
use crate::wire::{MessageIdGenerator, SerializerRegistry};

/// Table of actor systems keyed by name.
///
/// An ordinary value rather than a process-wide static: construct one per application (or
/// per test) and pass it where it is needed. Clones share the table.
#[derive(Clone)]
pub struct SystemRegistry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    systems: RwLock<HashMap<String, Arc<ActorSystem>>>,
    ids: Arc<MessageIdGenerator>,
    serializers: SerializerRegistry,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::with_id_generator(MessageIdGenerator::for_current_process())
    }

    /// Uses `ids` to mint every message id of every system in this registry.
    pub fn with_id_generator(ids: MessageIdGenerator) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                systems: RwLock::new(HashMap::new()),
                ids: Arc::new(ids),
                serializers: SerializerRegistry::new(),
            }),
        }
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.inner.serializers
    }

    /// Returns the system named in `options`, creating it on first use.
    ///
    /// The first caller's options win; later calls with the same name get the existing
    /// instance whatever options they pass.
    pub fn get_or_add(&self, options: ActorSystemOptions) -> Result<Arc<ActorSystem>, ActorError> {
        let name = options.name.trim().to_string();
        if name.is_empty() {
            return Err(ActorError::EmptyName("actor system name"));
        }
        if let Some(existing) = self.inner.systems.read().get(&name) {
            return Ok(existing.clone());
        }

        let mut systems = self.inner.systems.write();
        if let Some(existing) = systems.get(&name) {
            return Ok(existing.clone());
        }
        let options = ActorSystemOptions { name: name.clone(), ..options };
        let system = ActorSystem::create(
            options,
            Arc::downgrade(&self.inner),
            self.inner.ids.clone(),
            self.inner.serializers.clone(),
        )?;
        systems.insert(name.clone(), system.clone());
        info!(system = %name, "Actor system created");
        Ok(system)
    }

    pub fn try_get(&self, name: &str) -> Option<Arc<ActorSystem>> {
        self.inner.systems.read().get(name.trim()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.systems.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Disposes every system in the registry.
    pub async fn dispose_all(&self) {
        let systems: Vec<Arc<ActorSystem>> = self.inner.systems.read().values().cloned().collect();
        for system in systems {
            system.dispose().await;
        }
    }
}

impl RegistryInner {
    /// Removes `name` only if it still maps to `system`.
    pub(crate) fn remove(&self, name: &str, system: &ActorSystem) {
        let mut systems = self.systems.write();
        if systems
            .get(name)
            .is_some_and(|existing| std::ptr::eq(Arc::as_ptr(existing), system))
        {
            systems.remove(name);
        }
    }
}

impl Default for SystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRegistry")
            .field("systems", &self.names())
            .finish()
    }
}
