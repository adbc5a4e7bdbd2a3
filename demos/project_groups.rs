//! Project groups: coalescing, staged hydration and partial batches.

use entity_kit::{
    error::Result,
    transport::{MemoryTransport, Method, Reply},
    Entity, EntityService, FetchStrategy,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Example entity: ProjectGroup
#[derive(Clone, Serialize, Deserialize, Debug)]
struct ProjectGroup {
    id: String,
    name: String,
    #[serde(default)]
    members: Option<Vec<String>>,
}

impl Entity for ProjectGroup {
    type Key = String;

    fn entity_key(&self) -> Self::Key {
        self.id.clone()
    }

    fn resource() -> &'static str {
        "project-groups"
    }

    fn deep_resources() -> &'static [&'static str] {
        &["members"]
    }
}

/// Mock backend with one slow group and one broken group
fn mock_backend() -> MemoryTransport {
    let transport = MemoryTransport::new();
    transport
        .on_get("project-groups", Reply::json(json!(["g1", "g2", "g3"])))
        .on_get(
            "project-groups/g1",
            Reply::json(json!({"name": "Alpha"})).after(Duration::from_millis(50)),
        )
        .on_get(
            "project-groups/g2",
            Reply::error(500, "internal error").after(Duration::from_millis(10)),
        )
        .on_get("project-groups/g3", Reply::json(json!({"name": "Gamma"})))
        .on_get(
            "project-groups/g1/members",
            Reply::json(json!(["ada", "grace"])),
        );
    transport.route(
        Method::Put,
        "project-groups/g3",
        Reply::json(json!({"name": "Gamma (archived)"})),
    );
    transport
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Entity Kit - Project Groups ===\n");

    // 1. Initialize service
    println!("1. Initializing project group service...");
    let transport = mock_backend();
    let groups: EntityService<ProjectGroup, _> = EntityService::new(transport.clone());
    println!("   ✓ Service ready\n");

    // 2. Two screens list groups at the same time
    println!("2. Two concurrent listings:");
    let (first, second) = tokio::join!(groups.list(), groups.list());
    let (first, second) = (first?, second?);
    for listing in [&first, &second] {
        let names: Vec<_> = listing.items.iter().map(|g| g.name.as_str()).collect();
        println!(
            "   ✓ {:?} ({} unavailable: {:?})",
            names,
            listing.failure_count(),
            listing.failed_ids()
        );
    }
    println!(
        "   ✓ g1 fetched {} time(s)\n",
        transport.calls(Method::Get, "project-groups/g1")
    );

    // 3. Deep hydration
    println!("3. Opening group g1 (deep):");
    let g1 = groups.get_deep(&"g1".to_string()).await?;
    println!("   ✓ {} members: {:?}\n", g1.name, g1.members.unwrap_or_default());

    // 4. Cache only
    println!("4. Cache-only lookup of g2:");
    match groups
        .get_with(&"g2".to_string(), FetchStrategy::CacheOnly)
        .await
    {
        Ok(group) => println!("   ✓ Cached: {}\n", group.name),
        Err(e) => println!("   ✓ Not available: {}\n", e),
    }

    // 5. Update writes through
    println!("5. Archiving g3:");
    groups
        .update(&"g3".to_string(), &json!({"name": "Gamma (archived)"}))
        .await?;
    let g3 = groups.get(&"g3".to_string()).await?;
    println!(
        "   ✓ {} (g3 fetched {} time(s))\n",
        g3.name,
        transport.calls(Method::Get, "project-groups/g3")
    );

    println!("   Store: {:?}", groups.store().stats());

    println!("\n=== Example Complete ===\n");

    Ok(())
}
