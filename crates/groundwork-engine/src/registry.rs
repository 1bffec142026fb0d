//! Process-wide module registry
//!
//! Modules register a factory under their id during process initialization;
//! the executor instantiates a fresh module per operation through it. The
//! registry is read-only once workflows start running.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::error::{EngineError, Result};
use crate::module::{Module, ModuleFactory, ModuleInfo};
use crate::operation::Operation;

static MODULE_FACTORIES: Lazy<RwLock<HashMap<&'static str, ModuleFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static PATH_NAMES: Lazy<RwLock<HashMap<&'static str, &'static str>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a module factory under its id.
///
/// Call only from initialization code, before any workflow runs.
///
/// # Panics
///
/// Panics when the id is already registered; duplicate ids are a programming
/// error that must surface at startup.
pub fn register_module(id: &'static str, factory: ModuleFactory) {
    let mut factories = MODULE_FACTORIES.write().expect("module registry poisoned");
    if factories.insert(id, factory).is_some() {
        panic!("module {} is already registered", id);
    }
}

/// Register a friendly display name for a module path segment.
///
/// Used by the module catalog output; has no effect on execution.
pub fn register_path_name(path: &'static str, name: &'static str) {
    let mut names = PATH_NAMES.write().expect("path name registry poisoned");
    names.insert(path, name);
}

/// Create a fresh module instance for the operation's module id.
pub fn new_module(op: &Operation) -> Result<Box<dyn Module>> {
    let factories = MODULE_FACTORIES.read().expect("module registry poisoned");
    match factories.get(op.module.as_str()) {
        Some(factory) => Ok(factory()),
        None => Err(EngineError::UnknownModule(op.module.clone())),
    }
}

/// Ids of all registered modules.
pub fn registered_modules() -> Vec<&'static str> {
    let factories = MODULE_FACTORIES.read().expect("module registry poisoned");
    let mut ids: Vec<&'static str> = factories.keys().copied().collect();
    ids.sort_unstable();
    ids
}

/// Metadata for every registered module, sorted by id.
pub fn module_catalog() -> Vec<ModuleInfo> {
    let factories = MODULE_FACTORIES.read().expect("module registry poisoned");
    let mut infos: Vec<ModuleInfo> = factories.values().map(|factory| factory().info()).collect();
    infos.sort_by(|a, b| a.id.cmp(b.id));
    infos
}

/// Snapshot of the registered path display names.
pub fn path_names() -> HashMap<&'static str, &'static str> {
    PATH_NAMES.read().expect("path name registry poisoned").clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubModule;

    fn stub_factory() -> Box<dyn Module> {
        Box::new(StubModule::default())
    }

    #[test]
    fn test_register_and_instantiate() {
        register_module("registry_test_module", stub_factory);

        let op = Operation {
            module: "registry_test_module".to_string(),
            id: "op-1".to_string(),
            ..Operation::default()
        };
        let module = new_module(&op).unwrap();
        assert_eq!(module.info().id, "stub_module");

        assert!(registered_modules().contains(&"registry_test_module"));
    }

    #[test]
    fn test_unknown_module() {
        let op = Operation {
            module: "no_such_module".to_string(),
            id: "op-1".to_string(),
            ..Operation::default()
        };
        let err = match new_module(&op) {
            Err(e) => e,
            Ok(_) => panic!("expected UnknownModule error"),
        };
        assert!(matches!(err, EngineError::UnknownModule(id) if id == "no_such_module"));
    }

    #[test]
    fn test_path_names() {
        register_path_name("registry_test", "Registry Test");
        assert_eq!(path_names().get("registry_test"), Some(&"Registry Test"));
    }
}
