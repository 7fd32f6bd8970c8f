use std::collections::HashMap;

use storefront_core::domain::capability::Capability;
use tracing::warn;

#[derive(Clone, Debug)]
struct RegistryEntry {
    session_id: String,
    capability: Capability,
}

/// Name-keyed index of which session owns which capability.
///
/// Built from the ready sessions in start order; the first session to
/// advertise a name owns it.
#[derive(Clone, Debug, Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, RegistryEntry>,
    order: Vec<String>,
}

impl CapabilityRegistry {
    pub fn build<'a, I>(sessions: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [Capability])>,
    {
        let mut registry = Self::default();

        for (session_id, capabilities) in sessions {
            for capability in capabilities {
                if let Some(existing) = registry.entries.get(&capability.name) {
                    warn!(
                        event_name = "registry.collision",
                        capability = %capability.name,
                        owner = %existing.session_id,
                        ignored = %session_id,
                        "capability advertised by more than one backend; keeping first"
                    );
                    continue;
                }

                registry.order.push(capability.name.clone());
                registry.entries.insert(
                    capability.name.clone(),
                    RegistryEntry {
                        session_id: session_id.to_string(),
                        capability: capability.clone(),
                    },
                );
            }
        }

        registry
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.session_id.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Every registered capability, in registration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| entry.capability.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
