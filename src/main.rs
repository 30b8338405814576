use anyhow::Result;
use story_graph::{
    materialize_tree, reify_relation, relink, sync_mentions, ContainmentKind, DisplayNode,
    EngineConfig, HierarchyKind, LinkFields, Registry, RelationKind, RootPolicy, UnitContent,
    ValidatedRegistry,
};
use tracing_subscriber::EnvFilter;

fn print_node(node: &DisplayNode, indent: usize) {
    let edge = node
        .edge
        .as_ref()
        .map(|e| format!("[{}{}] ", e.verb, if e.reified { ", reified" } else { "" }))
        .unwrap_or_default();
    println!("{}{}{} ({})", "  ".repeat(indent), edge, node.title, node.shape);
    for child in &node.children {
        print_node(child, indent + 1);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Story Graph - Core Data Model");
    println!("=============================\n");

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(std::path::Path::new(&path))?,
        None => EngineConfig::default(),
    };

    let mut registry = Registry::new();
    let book = registry.create_container(UnitContent::titled("The Tide Book"), ContainmentKind::Nested);
    let c1 = registry.create_sequence_unit(UnitContent::titled("Landfall"));
    let c2 = registry.create_sequence_unit(
        UnitContent::titled("The Harbor").with_body("Mira meets [[Landfall]]'s survivors."),
    );
    registry.add_child(book, c1)?;
    registry.add_child(book, c2)?;
    for chapter in [c1, c2] {
        registry.create_relation(LinkFields::new(
            book,
            chapter,
            config.labels.contains.clone(),
            "part of",
            RelationKind::Hierarchical(HierarchyKind::ParentOf),
        ))?;
    }

    println!("✓ Created book with two chapters");
    println!("  Units: {}", registry.unit_count());
    println!("  Relations: {}", registry.relation_count());

    let registry = relink(&[c2, c1], &registry, &config)?;
    println!("\n✓ Reordered chapters: The Harbor first");

    let synced = sync_mentions(&registry, c2, &config)?;
    println!(
        "\n✓ Synced mentions: {} created, {} unresolved",
        synced.created.len(),
        synced.unresolved.len()
    );
    let mut registry = synced.registry;

    if let Some(&mention) = synced.created.first() {
        let reified = reify_relation(&registry, mention)?;
        registry = reified.registry;
        println!("\n✓ Reified mention into {}", reified.new_entity_id);
    }

    let validation = registry.validate();
    println!("\n✓ Validation complete");
    println!("  Errors: {}", validation.errors().len());
    println!("  Warnings: {}", validation.warnings().len());
    println!("  Info: {}", validation.info().len());

    let tree = materialize_tree(&registry, RootPolicy::Auto, &config)?;
    println!("\n✓ Materialized tree ({} nodes)\n", tree.node_count());
    print_node(&tree.root, 0);

    Ok(())
}
