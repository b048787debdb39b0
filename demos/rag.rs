//! Index documents and answer questions about them.
//!
//! ```text
//! cargo run --example rag -- notes.md manual.pdf "How do I configure X?"
//! ```
//!
//! The last argument is the question; the rest are files to index. Set
//! `WANGCHAIN_EMBEDDING_PROVIDER=hash` to embed locally.

#![allow(clippy::print_stdout)]

use std::sync::Arc;

use wangchain::llm::ChatModelFactory;
use wangchain::logging::{self, LogSettings};
use wangchain::retrieval::{RagChain, Retriever, create_embedder};
use wangchain::error::VectorStoreError;
use wangchain::{ConfigStore, Result};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(&LogSettings::from_env());

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let Some(question) = args.pop() else {
        println!("usage: rag <file>... <question>");
        return Ok(());
    };

    let store = Arc::new(ConfigStore::from_env()?);
    let retrieval = store.retrieval();
    let embedder = create_embedder(&retrieval, &store.model())?;
    let retriever = Arc::new(Retriever::from_persisted(&retrieval, embedder)?);

    if !args.is_empty() {
        let summary = retriever.load_and_index(&args).await?;
        println!("Indexed {} documents into {} chunks", summary.documents, summary.chunks);
    } else if !retriever.is_indexed() {
        return Err(VectorStoreError::NotIndexed.into());
    }

    let model = ChatModelFactory::new(Arc::clone(&store)).create_default()?;
    let chain = RagChain::new(retriever, model)?;
    let answer = chain.query(&question).await?;

    println!("\n{}\n", answer.answer);
    for (i, source) in answer.sources.iter().enumerate() {
        println!("[{}] {}", i + 1, source.source().unwrap_or("(unknown source)"));
    }
    Ok(())
}
