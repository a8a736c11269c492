use tb_domain::config::Config;

use crate::bridge::ToolBridge;

/// Connect every server, print the merged catalog, then disconnect.
pub async fn list(config: Config) -> anyhow::Result<()> {
    let mut bridge = ToolBridge::from_config(&config).await?;
    super::run::report_partial_connect(&bridge);

    let catalog = bridge.catalog();
    if catalog.is_empty() {
        println!("No tools available.");
    } else {
        let width = catalog.entries().map(|(owner, _)| owner.len()).max().unwrap_or(0);
        for (owner, def) in catalog.entries() {
            let summary = def.description.lines().next().unwrap_or("");
            println!("{owner:<width$}  {}  {summary}", def.name);
        }
    }
    for collision in catalog.collisions() {
        eprintln!(
            "note: '{}' from '{}' is shadowed by '{}'",
            collision.tool, collision.shadowed, collision.owner
        );
    }

    bridge.cleanup().await;
    Ok(())
}
