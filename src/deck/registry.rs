//! Button instance registry.
//!
//! Tracks every visible button by its instance id. Only the message router
//! writes to it; orchestrators read through a [`RegistryHandle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::protocol::ActionKind;
use super::settings::ButtonSettings;

/// Last-known state of one placed button.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonInstance {
    pub action: Option<ActionKind>,
    pub settings: ButtonSettings,
    pub device: Option<String>,
}

/// Instance id → button state.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: HashMap<String, ButtonInstance>,
}

impl InstanceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) an instance.
    pub fn appear(&mut self, context: &str, instance: ButtonInstance) {
        self.instances.insert(context.to_owned(), instance);
    }

    /// Forget an instance. Returns the removed state, if any.
    pub fn disappear(&mut self, context: &str) -> Option<ButtonInstance> {
        self.instances.remove(context)
    }

    /// Replace the settings of a registered instance.
    ///
    /// Returns `false` and changes nothing when `context` is unknown.
    pub fn update_settings(&mut self, context: &str, settings: ButtonSettings) -> bool {
        match self.instances.get_mut(context) {
            Some(instance) => {
                instance.settings = settings;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, context: &str) -> Option<&ButtonInstance> {
        self.instances.get(context)
    }

    #[must_use]
    pub fn contains(&self, context: &str) -> bool {
        self.instances.contains_key(context)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Cloneable handle to the session's registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryHandle {
    inner: Arc<Mutex<InstanceRegistry>>,
}

impl RegistryHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the registry. A poisoned lock is recovered, since every
    /// mutation is a single map operation.
    pub fn lock(&self) -> MutexGuard<'_, InstanceRegistry> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Snapshot of one instance.
    #[must_use]
    pub fn get(&self, context: &str) -> Option<ButtonInstance> {
        self.lock().get(context).cloned()
    }

    #[must_use]
    pub fn contains(&self, context: &str) -> bool {
        self.lock().contains(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(action: ActionKind) -> ButtonInstance {
        ButtonInstance {
            action: Some(action),
            settings: ButtonSettings::new().with("modelName", "Qwen"),
            device: Some("dev".into()),
        }
    }

    #[test]
    fn appear_then_disappear_removes_instance() {
        let mut registry = InstanceRegistry::new();
        registry.appear("ctx", instance(ActionKind::LoadModel));
        assert!(registry.contains("ctx"));

        let removed = registry.disappear("ctx");
        assert_eq!(removed.map(|i| i.action), Some(Some(ActionKind::LoadModel)));
        assert!(!registry.contains("ctx"));
        assert!(registry.is_empty());
    }

    #[test]
    fn update_settings_for_unknown_id_is_noop() {
        let mut registry = InstanceRegistry::new();
        registry.appear("known", instance(ActionKind::QuickChat));

        let updated = registry.update_settings("ghost", ButtonSettings::new().with("x", 1));
        assert!(!updated);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn update_settings_replaces_wholesale() {
        let mut registry = InstanceRegistry::new();
        registry.appear("ctx", instance(ActionKind::LoadModel));

        let fresh = ButtonSettings::new().with("modelPath", "a/b");
        assert!(registry.update_settings("ctx", fresh.clone()));

        let stored = registry.get("ctx").map(|i| i.settings.clone());
        assert_eq!(stored, Some(fresh));
    }

    #[test]
    fn disappear_unknown_returns_none() {
        let mut registry = InstanceRegistry::new();
        assert!(registry.disappear("nope").is_none());
    }

    #[test]
    fn handle_clones_share_state() {
        let handle = RegistryHandle::new();
        let other = handle.clone();
        handle.lock().appear("ctx", instance(ActionKind::ToggleServer));
        assert!(other.contains("ctx"));
        assert_eq!(
            other.get("ctx").and_then(|i| i.device),
            Some("dev".to_owned())
        );
    }
}
