use lodestone_tasks::TaskRegistry;

/// Print every registered task kind, one per line
pub fn list_tasks(registry: &TaskRegistry) {
    let mut kinds: Vec<&str> = registry.kinds().collect();
    kinds.sort_unstable();
    for kind in kinds {
        println!("{}", kind);
    }
}
