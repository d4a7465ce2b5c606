//! Built-in driver backends.
//!
//! Provides a `DriverRegistry` for registering and instantiating driver
//! factories by name. Constructor-injection rather than global state:
//! the daemon builds one at startup and resolves each configured
//! sensor's `driver` field against it.

pub mod simulation;

use sensmux_common::driver::{DriverFactory, SensorDriver, SensorError};
use sensmux_common::types::SensorKind;
use std::collections::HashMap;

/// Registry of available driver backends.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with all built-in backends registered.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("simulation", simulation::factory);
        reg
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver backend '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a driver instance by backend name.
    ///
    /// # Errors
    /// Returns `SensorError::DriverNotFound` if no backend with the
    /// given name is registered.
    pub fn create(&self, name: &str, kind: SensorKind) -> Result<Box<dyn SensorDriver>, SensorError> {
        let factory = self
            .factories
            .get(name)
            .copied()
            .ok_or_else(|| SensorError::DriverNotFound(name.to_string()))?;
        Ok(factory(kind))
    }

    /// List all registered backend names.
    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builtins() {
        let reg = DriverRegistry::with_builtins();
        assert!(reg.list().contains(&"simulation"));
        let driver = reg.create("simulation", SensorKind::Gyroscope);
        assert!(driver.is_ok());
    }

    #[test]
    fn test_registry_backend_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create("ethercat", SensorKind::Accelerometer);
        assert!(matches!(result, Err(SensorError::DriverNotFound(_))));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_registry_duplicate_panics() {
        let mut reg = DriverRegistry::with_builtins();
        reg.register("simulation", simulation::factory);
    }
}
