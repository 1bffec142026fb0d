//! `groundwork modules` prints the registered module catalog

use groundwork_engine::registry;

pub fn run() {
    let path_names = registry::path_names();

    for info in registry::module_catalog() {
        let path = info.id.split('_').next().unwrap_or_default();
        let group = path_names.get(path).copied().unwrap_or(path);

        println!("{} - {} ({})", info.id, info.name, group);
        println!("  {}", info.description);

        if !info.inputs.is_empty() {
            println!("  inputs:");
            let mut names: Vec<_> = info.inputs.keys().collect();
            names.sort_unstable();
            for name in names {
                let spec = &info.inputs[name];
                let required = if spec.required { "required" } else { "optional" };
                match &spec.default {
                    Some(default) => println!(
                        "    {} ({}, {}, default {:?}): {}",
                        name, spec.value_type, required, default, spec.description
                    ),
                    None => println!(
                        "    {} ({}, {}): {}",
                        name, spec.value_type, required, spec.description
                    ),
                }
            }
        }

        if !info.outputs.is_empty() {
            println!("  outputs:");
            let mut names: Vec<_> = info.outputs.keys().collect();
            names.sort_unstable();
            for name in names {
                let spec = &info.outputs[name];
                println!("    {} ({}): {}", name, spec.value_type, spec.description);
            }
        }

        println!();
    }
}
