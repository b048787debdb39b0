//! Single prompts, streaming, and batching through the model factory.
//!
//! Requires `OPENAI_API_KEY` (and optionally `OPENAI_API_BASE`).
//!
//! ```text
//! cargo run --example basic_llm
//! ```

#![allow(clippy::print_stdout)]

use std::io::Write;
use std::sync::Arc;

use futures_util::StreamExt;
use wangchain::config::ModelOverrides;
use wangchain::llm::{ChatModel, ChatModelFactory};
use wangchain::logging::{self, LogSettings};
use wangchain::{ConfigStore, Result};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(&LogSettings::from_env());

    let store = Arc::new(ConfigStore::from_env()?);
    let factory = ChatModelFactory::new(Arc::clone(&store));

    let model = factory.create_default()?;
    let reply = model.invoke("In one sentence, what is Rust?").await?;
    println!("{}\n({} tokens)\n", reply.content, reply.usage.total_tokens);

    let precise = factory.create(
        "openai",
        &ModelOverrides {
            temperature: Some(0.0),
            max_tokens: Some(200),
            ..ModelOverrides::default()
        },
    )?;
    let mut stream = precise.stream("List three uses of a hash map.").await?;
    while let Some(delta) = stream.next().await {
        print!("{}", delta?);
        let _ = std::io::stdout().flush();
    }
    println!("\n");

    let creative = factory.builder().temperature(1.2).max_tokens(120).build()?;
    let prompts = vec![
        "Write a haiku about ownership.".to_string(),
        "Write a haiku about borrowing.".to_string(),
    ];
    for response in creative.batch(&prompts).await? {
        println!("{}\n", response.content);
    }
    Ok(())
}
