//! `helmsman tools`: list the registered tools and their parameters.

use helmsman_tools::default_registry;

pub fn run() {
    let registry = default_registry();
    for definition in registry.list() {
        println!("{}", definition.name);
        println!("  {}", definition.description);

        let required: Vec<&str> = definition.parameters["required"]
            .as_array()
            .map(|names| names.iter().filter_map(|n| n.as_str()).collect())
            .unwrap_or_default();
        if let Some(properties) = definition.parameters["properties"].as_object() {
            for (name, spec) in properties {
                let marker = if required.contains(&name.as_str()) { "*" } else { " " };
                println!(
                    "   {marker} {name:<16} {:<8} {}",
                    spec["type"].as_str().unwrap_or("any"),
                    spec["description"].as_str().unwrap_or_default()
                );
            }
        }
        println!();
    }
    println!("(* = required)");
}
