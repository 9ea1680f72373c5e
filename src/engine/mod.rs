// SPDX-License-Identifier: Apache-2.0

// Data Engine Module
// Driver abstraction shared by the warehouse and the federated source

pub mod drivers;
pub mod error;
pub mod registry;
pub mod session_manager;
pub mod sql_generator;
pub mod traits;
pub mod types;

pub use error::EngineError;
pub use registry::DriverRegistry;
pub use session_manager::SessionManager;
pub use traits::DataEngine;
pub use types::*;
