//! `ctxloom budget`: Print the active budget profile.

use std::sync::Arc;

use ctxloom_config::AppConfig;
use ctxloom_context::{BUDGET_GET_CHANNEL, ContextEngine, ContextRpc};
use ctxloom_core::LayerId;
use serde_json::Value;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ContextEngine::from_config(config);
    let profile = engine.budget_profile();

    println!("ctxloom budget profile v{}", profile.version);
    println!("==========================");
    println!(
        "  Tokenizer:  {} {}",
        profile.tokenizer_id, profile.tokenizer_version
    );
    println!("  Total:      {} tokens", profile.total_budget_tokens);
    for layer in LayerId::ALL {
        let budget = profile.layers.get(layer);
        println!(
            "  {:<10}  ratio {:.2}  min {:>5}  allocation {:>5}",
            layer.as_str(),
            budget.ratio,
            budget.minimum_tokens,
            profile.allocation(layer)
        );
    }

    let rpc = ContextRpc::new(Arc::new(engine));
    let envelope: Value = rpc.dispatch(BUDGET_GET_CHANNEL, Value::Null).await;
    println!();
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
