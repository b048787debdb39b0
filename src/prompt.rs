//! Prompt templates for the retrieval chain and the agent.
//!
//! Templates use `{name}` placeholders. Compiled-in defaults can be
//! overridden per file from a prompt directory.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default "stuff" template for retrieval-augmented answers.
pub const RAG_PROMPT: &str = "Use the following context to answer the question. \
If you don't know the answer, just say that you don't know; don't try to make up an answer.

Context:
{context}

Question: {question}

Helpful Answer:";

/// Agent kind using the ReAct template; replies end in `Final Answer:`.
pub const REACT_AGENT_KIND: &str = "zero-shot-react-description";

/// Agent kind using the plain tool-calling template.
pub const TOOL_CALLING_AGENT_KIND: &str = "tool-calling";

/// System template for the `zero-shot-react-description` agent kind.
pub const REACT_AGENT_PROMPT: &str = "Answer the following questions as best you can. \
You have access to the following tools:

{tools}

Work in steps:

Thought: think about what to do next
Action: call one of [{tool_names}] with its input
Observation: read the tool result
... (Thought/Action/Observation can repeat as many times as needed)
Thought: I now know the final answer
Final Answer: the final answer to the original question

When you have the final answer, reply with it as plain text and call no tools.";

/// System template for the `tool-calling` agent kind.
pub const TOOL_CALLING_AGENT_PROMPT: &str = "You are a helpful assistant. \
Use the available tools when they help answer the request.

Available tools:
{tools}

Tool names: {tool_names}

Reply with the final answer as plain text once no more tool calls are needed.";

/// Environment variable naming the prompt directory.
pub const PROMPT_DIR_ENV: &str = "WANGCHAIN_PROMPT_DIR";

/// Default prompt directory under the user's home.
const DEFAULT_PROMPT_DIR: &str = ".config/wangchain/prompts";

const RAG_FILENAME: &str = "rag.md";
const REACT_AGENT_FILENAME: &str = "agent.md";
const TOOL_CALLING_AGENT_FILENAME: &str = "tool_calling_agent.md";

/// The full set of templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// Retrieval chain template (`{context}`, `{question}`).
    pub rag: String,
    /// ReAct agent system template (`{tools}`, `{tool_names}`).
    pub react_agent: String,
    /// Tool-calling agent system template (`{tools}`, `{tool_names}`).
    pub tool_calling_agent: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl PromptSet {
    /// Loads templates, falling back to compiled-in defaults.
    ///
    /// Resolution order for the directory:
    /// 1. `prompt_dir`
    /// 2. `WANGCHAIN_PROMPT_DIR`
    /// 3. `~/.config/wangchain/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var(PROMPT_DIR_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            rag: load_file(RAG_FILENAME, RAG_PROMPT),
            react_agent: load_file(REACT_AGENT_FILENAME, REACT_AGENT_PROMPT),
            tool_calling_agent: load_file(TOOL_CALLING_AGENT_FILENAME, TOOL_CALLING_AGENT_PROMPT),
        }
    }

    /// Compiled-in templates without touching the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            rag: RAG_PROMPT.to_string(),
            react_agent: REACT_AGENT_PROMPT.to_string(),
            tool_calling_agent: TOOL_CALLING_AGENT_PROMPT.to_string(),
        }
    }

    /// Writes the default templates into `dir`, creating it if needed.
    /// Existing files are left alone.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or a file cannot be written.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (RAG_FILENAME, RAG_PROMPT),
            (REACT_AGENT_FILENAME, REACT_AGENT_PROMPT),
            (TOOL_CALLING_AGENT_FILENAME, TOOL_CALLING_AGENT_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }
        Ok(written)
    }

    /// `~/.config/wangchain/prompts`, if the home directory is known.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }

    /// The agent system template for `agent_kind`, if the kind is known.
    #[must_use]
    pub fn agent_template(&self, agent_kind: &str) -> Option<&str> {
        match agent_kind {
            REACT_AGENT_KIND => Some(&self.react_agent),
            TOOL_CALLING_AGENT_KIND => Some(&self.tool_calling_agent),
            _ => None,
        }
    }
}

/// Fails unless every name in `required` occurs as `{name}` in `template`.
pub fn require_placeholders(template: &str, required: &[&str]) -> Result<(), ConfigError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !template.contains(&format!("{{{name}}}")))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: "prompt_template",
            message: format!("missing placeholder(s): {}", missing.join(", ")),
        })
    }
}

/// Substitutes `{name}` placeholders in a single pass.
///
/// Substituted values are not rescanned, and braces that do not form a
/// known placeholder are kept verbatim.
#[must_use]
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        if let Some(end) = after.find('}')
            && let Some((_, value)) = vars.iter().find(|(name, _)| *name == &after[..end])
        {
            out.push_str(value);
            rest = &after[end + 1..];
            continue;
        }
        out.push('{');
        rest = after;
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let out = render(
            "Q: {question}\nC: {context}",
            &[("question", "why?"), ("context", "because")],
        );
        assert_eq!(out, "Q: why?\nC: because");
    }

    #[test]
    fn test_render_keeps_unknown_braces() {
        let out = render("{a} {unknown} {", &[("a", "1")]);
        assert_eq!(out, "1 {unknown} {");
        assert_eq!(render("json: {\"k\": 1}", &[]), "json: {\"k\": 1}");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render("{context}|{question}", &[("context", "{question}"), ("question", "q")]);
        assert_eq!(out, "{question}|q");
    }

    #[test]
    fn test_require_placeholders() {
        assert!(require_placeholders(RAG_PROMPT, &["context", "question"]).is_ok());
        let err = require_placeholders("only {context}", &["context", "question"]);
        assert!(matches!(
            err,
            Err(ConfigError::InvalidValue { ref message, .. }) if message.contains("question")
        ));
    }

    #[test]
    fn test_defaults_carry_placeholders() {
        let set = PromptSet::defaults();
        assert!(require_placeholders(&set.rag, &["context", "question"]).is_ok());
        assert!(require_placeholders(&set.react_agent, &["tools", "tool_names"]).is_ok());
        assert!(require_placeholders(&set.tool_calling_agent, &["tools", "tool_names"]).is_ok());
    }

    #[test]
    fn test_agent_template_by_kind() {
        let set = PromptSet::defaults();
        assert_eq!(set.agent_template("zero-shot-react-description"), Some(REACT_AGENT_PROMPT));
        assert_eq!(set.agent_template("tool-calling"), Some(TOOL_CALLING_AGENT_PROMPT));
        assert_eq!(set.agent_template("self-ask"), None);
    }

    #[test]
    fn test_load_overrides_single_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        std::fs::write(dir.path().join("rag.md"), "Docs: {context} / {question}")
            .unwrap_or_else(|_| unreachable!());
        let set = PromptSet::load(Some(dir.path()));
        assert_eq!(set.rag, "Docs: {context} / {question}");
        assert_eq!(set.react_agent, REACT_AGENT_PROMPT);
    }

    #[test]
    fn test_write_defaults_skips_existing() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        std::fs::write(dir.path().join("agent.md"), "custom {tools} {tool_names}")
            .unwrap_or_else(|_| unreachable!());
        let written = PromptSet::write_defaults(dir.path()).unwrap_or_default();
        assert_eq!(written.len(), 2);
        let set = PromptSet::load(Some(dir.path()));
        assert_eq!(set.react_agent, "custom {tools} {tool_names}");
        assert_eq!(set.rag, RAG_PROMPT);
    }
}
