//! Run the tool-using agent on a task.
//!
//! ```text
//! cargo run --example agent -- "What is 17 * 23, and who designed Rust?"
//! ```
//!
//! With `WANGCHAIN_HUMAN_APPROVAL=true` each tool call is confirmed on the
//! terminal first.

#![allow(clippy::print_stdout)]

use std::io::{BufRead, Write};
use std::sync::Arc;

use wangchain::agent::{AgentExecutor, FnApproval};
use wangchain::llm::ToolCall;
use wangchain::logging::{self, LogSettings};
use wangchain::{ConfigStore, Result};

fn ask(call: &ToolCall) -> bool {
    print!("Run {}({})? [y/N] ", call.name, call.arguments);
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).is_ok()
        && matches!(line.trim(), "y" | "Y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(&LogSettings::from_env());

    let task = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let store = Arc::new(ConfigStore::from_env()?);

    let mut builder = AgentExecutor::builder().with_store(Arc::clone(&store));
    if store.agent().human_approval_required() {
        builder = builder.with_approval_gate(Arc::new(FnApproval(ask)));
    }
    let agent = builder.build()?;

    let run = agent.run_detailed(&task).await?;
    for step in &run.steps {
        println!("> {}({})\n  {}", step.tool, step.arguments, step.observation);
    }
    println!("\n{}", run.output);
    Ok(())
}
