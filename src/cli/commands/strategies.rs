//! List strategies command.

use anyhow::Result;
use trading_strategies::StrategyRegistry;

pub fn run() -> Result<()> {
    let registry = StrategyRegistry::new();

    println!("Available Strategies");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    for info in registry.list() {
        println!("  {} ", info.kind);
        println!("  ───────────────────────────────────────────────────────");
        println!("  {}", info.description);
        println!();
        println!("  Default config:");
        println!("{}", indent(&serde_json::to_string_pretty(&info.default_config)?));
        println!("  Default conditions:");
        println!("{}", indent(&serde_json::to_string_pretty(&info.default_conditions)?));
        println!();
    }

    println!("Select one with `strategy = \"MACD\"` or `strategy = \"EMA\"` under [users.params].");

    Ok(())
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {l}")).collect::<Vec<_>>().join("\n")
}
