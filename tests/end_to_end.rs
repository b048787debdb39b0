//! Retrieval and agent runs against offline models.

#![allow(clippy::panic)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use wangchain::agent::{AgentExecutor, CalculatorTool, Tool};
use wangchain::config::{EmbeddingProvider, RetrievalConfig, StoreKind, ToolFlags};
use wangchain::error::{DocumentError, Error, ToolError, VectorStoreError};
use wangchain::llm::{ChatResponse, ScriptedChatModel, ToolCall};
use wangchain::retrieval::{HashEmbedder, RagChain, Retriever};
use wangchain::{AgentConfig, ModelConfig};

const FERRIS: &str = "Ferris is a friendly orange crab and the unofficial mascot of Rust.";
const CARGO: &str = "Cargo downloads dependencies, compiles packages, and publishes crates.";

fn write_corpus(dir: &Path) -> Vec<std::path::PathBuf> {
    let ferris = dir.join("ferris.txt");
    let cargo = dir.join("cargo.md");
    std::fs::write(&ferris, FERRIS).unwrap_or_else(|e| panic!("write failed: {e}"));
    std::fs::write(&cargo, format!("# Cargo\n\n{CARGO}"))
        .unwrap_or_else(|e| panic!("write failed: {e}"));
    vec![ferris, cargo]
}

fn retrieval_config(kind: StoreKind, dir: &Path) -> RetrievalConfig {
    RetrievalConfig::builder()
        .store_kind(kind)
        .persist_path(dir.join("store.db"))
        .collection_name("e2e")
        .chunk_size(200)
        .chunk_overlap(20)
        .top_k(1)
        .embedding_provider(EmbeddingProvider::Hash)
        .build()
        .unwrap_or_else(|e| panic!("config failed: {e}"))
}

#[tokio::test]
async fn rag_answers_from_indexed_files() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let paths = write_corpus(dir.path());
    let config = retrieval_config(StoreKind::Memory, dir.path());
    let retriever = Arc::new(Retriever::new(&config, Arc::new(HashEmbedder::default())));

    let summary = retriever
        .load_and_index(&paths)
        .await
        .unwrap_or_else(|e| panic!("indexing failed: {e}"));
    assert_eq!(summary.documents, 2);
    assert_eq!(summary.chunks, 2);

    let model = Arc::new(ScriptedChatModel::with_replies(["Ferris is an orange crab."]));
    let chain = RagChain::with_template(
        Arc::clone(&retriever),
        model.clone(),
        "Context:\n{context}\n\nQ: {question}",
    )
    .unwrap_or_else(|e| panic!("chain failed: {e}"));

    let answer = chain
        .query("friendly orange crab mascot of Rust")
        .await
        .unwrap_or_else(|e| panic!("query failed: {e}"));
    assert_eq!(answer.answer, "Ferris is an orange crab.");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].text, FERRIS);

    let requests = model.requests();
    let prompt = &requests[0].messages[0].content;
    assert!(prompt.contains(FERRIS));
    assert!(!prompt.contains(CARGO));
    assert!(prompt.ends_with("Q: friendly orange crab mascot of Rust"));
}

#[tokio::test]
async fn retrieval_errors_are_typed() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let config = retrieval_config(StoreKind::Memory, dir.path());
    let retriever = Retriever::new(&config, Arc::new(HashEmbedder::default()));

    assert!(matches!(
        retriever.retrieve("anything", None).await,
        Err(VectorStoreError::NotIndexed)
    ));

    let sheet = dir.path().join("table.xlsx");
    std::fs::write(&sheet, "cells").unwrap_or_else(|e| panic!("write failed: {e}"));
    assert!(matches!(
        retriever.load_and_index(&[sheet]).await,
        Err(Error::Document(DocumentError::UnsupportedFormat { .. }))
    ));
    assert!(!retriever.is_indexed());
}

#[tokio::test]
async fn sqlite_index_survives_restart() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let paths = write_corpus(dir.path());
    let config = retrieval_config(StoreKind::Sqlite, dir.path());

    {
        let retriever = Retriever::new(&config, Arc::new(HashEmbedder::default()));
        retriever
            .load_and_index(&paths)
            .await
            .unwrap_or_else(|e| panic!("indexing failed: {e}"));
    }

    let reopened = Retriever::from_persisted(&config, Arc::new(HashEmbedder::default()))
        .unwrap_or_else(|e| panic!("reopen failed: {e}"));
    assert!(reopened.is_indexed());
    let hits = reopened
        .retrieve("Cargo downloads dependencies and compiles packages", None)
        .await
        .unwrap_or_else(|e| panic!("retrieve failed: {e}"));
    assert_eq!(hits.len(), 1);
    assert!(hits[0].document.text.contains(CARGO));
}

/// Exposes a retriever to the agent.
struct KnowledgeBaseTool {
    retriever: Arc<Retriever>,
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        "knowledge_base"
    }

    fn description(&self) -> &str {
        "Searches the indexed notes. Input should be a question."
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        let hits = self
            .retriever
            .retrieve(input, None)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        Ok(hits
            .into_iter()
            .map(|hit| hit.document.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn call(id: &str, name: &str, input: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::json!({ "input": input }).to_string(),
    }
}

#[tokio::test]
async fn agent_combines_custom_and_builtin_tools() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let paths = write_corpus(dir.path());
    let retriever = Arc::new(Retriever::new(
        &retrieval_config(StoreKind::Memory, dir.path()),
        Arc::new(HashEmbedder::default()),
    ));
    retriever
        .load_and_index(&paths)
        .await
        .unwrap_or_else(|e| panic!("indexing failed: {e}"));

    let model = Arc::new(ScriptedChatModel::new(ModelConfig::default()).strict());
    model.push(ChatResponse::tool_calls(vec![call(
        "call_1",
        "knowledge_base",
        "friendly orange crab mascot of Rust",
    )]));
    model.push(ChatResponse::tool_calls(vec![call("call_2", "calculator", "8 * 10")]));
    model.push(ChatResponse::text(
        "Thought: I now know the final answer\nFinal Answer: Ferris, and 8 * 10 = 80.",
    ));

    let config = AgentConfig::builder()
        .enable_search(false)
        .enable_wikipedia(false)
        .build()
        .unwrap_or_else(|e| panic!("config failed: {e}"));
    let mut agent = AgentExecutor::builder()
        .with_model(model.clone())
        .with_config(config)
        .build()
        .unwrap_or_else(|e| panic!("build failed: {e}"));
    agent
        .add_tool(Arc::new(KnowledgeBaseTool {
            retriever: Arc::clone(&retriever),
        }))
        .unwrap_or_else(|e| panic!("add_tool failed: {e}"));

    let run = agent
        .run_detailed("Who is the Rust mascot, and what is 8 times 10?")
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(run.output, "Ferris, and 8 * 10 = 80.");
    assert_eq!(run.iterations, 3);
    assert_eq!(run.steps.len(), 2);
    assert_eq!(run.steps[0].observation, FERRIS);
    assert_eq!(run.steps[1].observation, "80");

    let requests = model.requests();
    let names: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["calculator", "knowledge_base"]);
    assert!(
        requests[0].messages[0]
            .content
            .contains("[calculator, knowledge_base]")
    );
}

#[tokio::test]
async fn agent_answers_without_calling_tools() {
    let model = Arc::new(ScriptedChatModel::with_replies(["Paris."]));
    let config = AgentConfig::builder()
        .tools(ToolFlags::none())
        .build()
        .unwrap_or_else(|e| panic!("config failed: {e}"));
    let agent = AgentExecutor::builder()
        .with_model(model)
        .with_config(config)
        .with_tools(Vec::new())
        .add_tool(Arc::new(CalculatorTool))
        .build()
        .unwrap_or_else(|e| panic!("build failed: {e}"));
    assert_eq!(agent.tools().names(), vec!["calculator"]);

    let answer = agent
        .run("What is the capital of France?")
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));
    assert_eq!(answer, "Paris.");
}
