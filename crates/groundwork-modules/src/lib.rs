//! Groundwork Resource Modules
//!
//! Built-in modules implementing the check-then-set contract for concrete
//! resources: a mock module for testing, PostgreSQL connection/role/grant
//! management, and Kubernetes client/ConfigMap/Secret entries.
//!
//! Call [`register_all`] once at startup to make every built-in module
//! available to the engine's registry.

pub mod kubernetes;
pub mod mock;
pub mod postgres;

use std::sync::Once;

use groundwork_engine::registry;

/// Register every built-in module and its path display names.
///
/// Safe to call repeatedly; only the first call registers.
pub fn register_all() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        registry::register_module("mock_module", mock::new_module);
        registry::register_module("postgres_connection", postgres::connection::new_module);
        registry::register_module("postgres_role", postgres::role::new_module);
        registry::register_module("postgres_grant", postgres::grant::new_module);
        registry::register_module("k8s_client", kubernetes::client::new_module);
        registry::register_module("k8s_configmap", kubernetes::configmap::new_module);
        registry::register_module("k8s_secret", kubernetes::secret::new_module);

        registry::register_path_name("mock", "Mock");
        registry::register_path_name("postgres", "PostgreSQL");
        registry::register_path_name("k8s", "Kubernetes");
    });
}
