//! End-to-end worker tests against the in-memory store and checkpointer.

use awsl_checkpoint::InMemoryCheckpointSaver;
use awsl_core::{FunctionRegistry, NodeResult};
use awsl_worker::{
    example_functions, MemoryRunStore, RunState, RunStore, WorkerPool, WorkerPoolConfig,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const RESEARCH: &str = r#"
workflow research {
    inputs { str query }
    outputs { str final_answer = FinalAnswer.final_answer }

    node QueryExtender {
        call query_extender
        inputs { str query = query }
        outputs { str extended_query }
    }

    node Retrieve {
        call retrieve_from_web
        inputs { str extended_query = QueryExtender.extended_query }
        outputs { list chunks }
    }

    node FinalAnswer {
        call final_answer_generation
        inputs {
            str query = query
            list chunks = Retrieve.chunks
        }
        outputs { str final_answer }
    }
}
"#;

const CLARIFYING: &str = r#"
workflow clarifying {
    inputs { str query }
    outputs {
        str clarifications = Clarify.clarifications
        str final_answer = FinalAnswer.final_answer
    }

    node Clarify {
        call ask_clarification
        inputs { str query = query }
        outputs { str clarifications }
        hitl {
            correlation: clarify
            timeout: 24h
        }
    }

    node FinalAnswer {
        call answer_with_clarifications
        inputs {
            str query = query
            str clarifications = Clarify.clarifications
        }
        outputs { str final_answer }
    }
}
"#;

fn write_templates(dir: &Path) {
    fs::write(dir.join("research.awsl"), RESEARCH).unwrap();
    fs::write(dir.join("clarifying.awsl"), CLARIFYING).unwrap();
}

fn test_registry() -> FunctionRegistry {
    let mut registry = example_functions::registry().unwrap();
    registry
        .register_fn("answer_with_clarifications", |input, _config| {
            Box::pin(async move {
                let clarifications = input
                    .get("Clarify.clarifications")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(NodeResult::update([(
                    "final_answer",
                    json!(format!("clarified answer: {clarifications}")),
                )]))
            })
        })
        .unwrap();
    registry
}

fn pool_over(dir: &TempDir, store: Arc<MemoryRunStore>) -> WorkerPool {
    let config = WorkerPoolConfig {
        concurrency: 2,
        poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(10),
        workflows_dir: dir.path().to_path_buf(),
        recursion_limit: 100,
    };
    WorkerPool::new(
        store,
        Arc::new(InMemoryCheckpointSaver::new()),
        Arc::new(test_registry()),
        config,
    )
}

#[tokio::test]
async fn test_run_to_success() {
    let dir = TempDir::new().unwrap();
    write_templates(dir.path());
    let store = Arc::new(MemoryRunStore::new());
    let pool = pool_over(&dir, store.clone());

    let run = store.create_run("research", "hello").await.unwrap();
    let claimed = pool.run_one("w1").await.unwrap();
    assert_eq!(claimed.as_deref(), Some(run.id.as_str()));

    let stored = store.get(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.run_state(), RunState::Succeeded);
    let result = stored.result.unwrap();
    let answer = result["FinalAnswer.final_answer"].as_str().unwrap();
    assert!(answer.contains("chunk for hello"));
    assert!(stored.finished_at.is_some());
}

#[tokio::test]
async fn test_empty_queue_claims_nothing() {
    let dir = TempDir::new().unwrap();
    write_templates(dir.path());
    let pool = pool_over(&dir, Arc::new(MemoryRunStore::new()));
    assert!(pool.run_one("w1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_template_fails_the_run() {
    let dir = TempDir::new().unwrap();
    write_templates(dir.path());
    let store = Arc::new(MemoryRunStore::new());
    let pool = pool_over(&dir, store.clone());

    let run = store.create_run("no_such_template", "hello").await.unwrap();
    pool.run_one("w1").await.unwrap();

    let stored = store.get(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.run_state(), RunState::Failed);
    assert!(stored.error.unwrap().contains("no_such_template"));
}

#[tokio::test]
async fn test_interrupt_then_resume_through_the_queue() {
    let dir = TempDir::new().unwrap();
    write_templates(dir.path());
    let store = Arc::new(MemoryRunStore::new());
    let pool = pool_over(&dir, store.clone());

    // First pass parks the run as needs_input with the questions surfaced.
    let run = store.create_run("clarifying", "rust engines").await.unwrap();
    pool.run_one("w1").await.unwrap();

    let parked = store.get(&run.id).await.unwrap().unwrap();
    assert_eq!(parked.run_state(), RunState::NeedsInput);
    let result = parked.result.clone().unwrap();
    assert!(result.get("__interrupt__").is_some());

    // Resume flips it back to queued with the payload attached...
    store.resume(&run.id, json!("I mean workflow engines")).await.unwrap();

    // ...and the next claim finishes the run with the answer.
    pool.run_one("w2").await.unwrap();
    let finished = store.get(&run.id).await.unwrap().unwrap();
    assert_eq!(finished.run_state(), RunState::Succeeded);
    let result = finished.result.unwrap();
    assert_eq!(
        result["FinalAnswer.final_answer"],
        json!("clarified answer: I mean workflow engines")
    );
    assert_eq!(
        result["Clarify.clarifications"],
        json!("I mean workflow engines")
    );

    // Terminal now: another resume is rejected.
    assert!(store.resume(&run.id, json!("again")).await.is_err());
}

#[tokio::test]
async fn test_two_workers_drain_distinct_runs() {
    let dir = TempDir::new().unwrap();
    write_templates(dir.path());
    let store = Arc::new(MemoryRunStore::new());
    let pool = pool_over(&dir, store.clone());

    for i in 0..3 {
        store
            .create_run("research", &format!("query {i}"))
            .await
            .unwrap();
    }

    let (a, b) = tokio::join!(pool.run_one("w1"), pool.run_one("w2"));
    let first = a.unwrap().unwrap();
    let second = b.unwrap().unwrap();
    assert_ne!(first, second, "workers must claim distinct runs");

    pool.run_one("w1").await.unwrap().unwrap();
    assert!(pool.run_one("w1").await.unwrap().is_none());

    for run in store.list().await.unwrap() {
        assert_eq!(run.run_state(), RunState::Succeeded);
    }
}
