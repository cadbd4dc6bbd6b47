//! Stub node functions for the demo workflows.
//!
//! These back the `.awsl` templates shipped under `workflows/` and the
//! worker binary's default registry. They fake their work (no network,
//! no models) but exercise every engine feature: dataflow, constants,
//! cycles with accumulation, and a human-in-the-loop interrupt.

use awsl_core::{FunctionRegistry, NodeResult, Result, TaskInput};
use serde_json::{json, Value};

/// First value whose channel key is `suffix` or ends in `.suffix`, so
/// functions stay independent of the node names a workflow chose.
fn find<'a>(input: &'a TaskInput, suffix: &str) -> Option<&'a Value> {
    if let Some(value) = input.get(suffix) {
        return Some(value);
    }
    let dotted = format!(".{suffix}");
    input
        .state()
        .iter()
        .find(|(key, _)| key.ends_with(&dotted))
        .map(|(_, value)| value)
}

fn text(input: &TaskInput, suffix: &str) -> String {
    find(input, suffix)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Registry with every demo function registered.
pub fn registry() -> Result<FunctionRegistry> {
    let mut registry = FunctionRegistry::new();

    registry.register_fn("query_extender", |input, _config| {
        Box::pin(async move {
            let query = text(&input, "query");
            Ok(NodeResult::update([(
                "extended_query",
                json!(format!("{query} (extended)")),
            )]))
        })
    })?;

    registry.register_fn("retrieve_from_web", |input, _config| {
        Box::pin(async move {
            let query = text(&input, "extended_query");
            Ok(NodeResult::update([(
                "chunks",
                json!([format!("chunk for {query}")]),
            )]))
        })
    })?;

    registry.register_fn("retrieve_results_check", |input, _config| {
        Box::pin(async move {
            let count = find(&input, "chunks")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            Ok(NodeResult::update([
                ("is_enough", json!(count >= 2)),
                ("next_query_aspect", json!("another aspect")),
            ]))
        })
    })?;

    registry.register_fn("filter_chunks", |input, config| {
        Box::pin(async move {
            let model = config
                .metadata
                .get("llm_model")
                .and_then(Value::as_str)
                .unwrap_or("default");
            tracing::debug!(model, "filtering chunks");
            let chunks = find(&input, "chunks").cloned().unwrap_or(json!([]));
            Ok(NodeResult::update([("filtered_chunks", chunks)]))
        })
    })?;

    registry.register_fn("ask_clarification", |input, _config| {
        Box::pin(async move {
            let query = text(&input, "query");
            Ok(NodeResult::Interrupt(json!({
                "questions": [format!("What exactly do you mean by \"{query}\"?")]
            })))
        })
    })?;

    registry.register_fn("final_answer_generation", |input, _config| {
        Box::pin(async move {
            let source = find(&input, "filtered_chunks")
                .or_else(|| find(&input, "chunks"))
                .cloned()
                .unwrap_or(Value::Null);
            Ok(NodeResult::update([(
                "final_answer",
                json!(format!("Answer based on {source}")),
            )]))
        })
    })?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_registry_builds() {
        let registry = registry().unwrap();
        for name in [
            "query_extender",
            "retrieve_from_web",
            "retrieve_results_check",
            "filter_chunks",
            "ask_clarification",
            "final_answer_generation",
        ] {
            assert!(registry.contains(name), "missing function {name}");
        }
    }

    #[tokio::test]
    async fn test_suffix_lookup() {
        let registry = registry().unwrap();
        let mut values = Map::new();
        values.insert("QueryExtender.extended_query".into(), json!("hello (extended)"));
        let result = registry
            .get("retrieve_from_web")
            .unwrap()
            .call(TaskInput::new(values), Default::default())
            .await
            .unwrap();
        match result {
            NodeResult::Update(update) => {
                assert_eq!(update["chunks"], json!(["chunk for hello (extended)"]));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
