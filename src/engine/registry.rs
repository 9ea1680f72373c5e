// SPDX-License-Identifier: Apache-2.0

//! Driver Registry
//!
//! Holds the drivers a run can use. The warehouse and the federated source
//! are looked up by id, so tests can swap either one for a mock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::drivers::redshift::RedshiftDriver;
use crate::engine::drivers::sqlserver::SqlServerDriver;
use crate::engine::traits::DataEngine;

/// Registry that holds all available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DataEngine>>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with the production drivers registered
    pub fn with_default_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RedshiftDriver::new()));
        registry.register(Arc::new(SqlServerDriver::new()));
        registry
    }

    /// Registers a new driver
    ///
    /// The driver's `driver_id()` is used as the key; a later registration
    /// with the same id replaces the earlier one.
    pub fn register(&mut self, driver: Arc<dyn DataEngine>) {
        let id = driver.driver_id().to_string();
        self.drivers.insert(id, driver);
    }

    /// Gets a driver by its ID
    pub fn get(&self, driver_id: &str) -> Option<Arc<dyn DataEngine>> {
        self.drivers.get(driver_id).cloned()
    }

    /// Lists all registered driver IDs, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
