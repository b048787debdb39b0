//! Retrieval-augmented question answering.

use std::sync::Arc;

use tracing::{debug, info};

use super::loader::Document;
use super::retriever::Retriever;
use crate::error::{ConfigError, Result};
use crate::llm::{ChatModel, TokenUsage};
use crate::prompt::{self, PromptSet};

/// Placeholders a chain template must contain.
const REQUIRED_PLACEHOLDERS: [&str; 2] = ["context", "question"];

/// Separator between retrieved chunks in the prompt.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// An answer with the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    /// Model output.
    pub answer: String,
    /// Retrieved chunks, best first.
    pub sources: Vec<Document>,
    /// Tokens used by the completion.
    pub usage: TokenUsage,
}

/// Stuffs retrieved chunks into a prompt and asks the model.
pub struct RagChain {
    retriever: Arc<Retriever>,
    model: Arc<dyn ChatModel>,
    template: String,
    top_k: Option<usize>,
}

impl std::fmt::Debug for RagChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagChain")
            .field("retriever", &self.retriever)
            .field("model", &self.model.name())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl RagChain {
    /// A chain using the default template from [`PromptSet::load`].
    pub fn new(retriever: Arc<Retriever>, model: Arc<dyn ChatModel>) -> Result<Self, ConfigError> {
        Self::with_template(retriever, model, PromptSet::load(None).rag)
    }

    /// A chain with a custom template. The template must contain
    /// `{context}` and `{question}`.
    pub fn with_template(
        retriever: Arc<Retriever>,
        model: Arc<dyn ChatModel>,
        template: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let template = template.into();
        prompt::require_placeholders(&template, &REQUIRED_PLACEHOLDERS)?;
        Ok(Self {
            retriever,
            model,
            template,
            top_k: None,
        })
    }

    /// Overrides the retriever's configured `top_k` for this chain.
    #[must_use]
    pub const fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// The retriever behind this chain.
    #[must_use]
    pub const fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    /// Retrieves context for `question`, renders the prompt, and returns
    /// the model's answer with its sources.
    pub async fn query(&self, question: &str) -> Result<RagAnswer> {
        let hits = self.retriever.retrieve(question, self.top_k).await?;
        let sources: Vec<Document> = hits.into_iter().map(|hit| hit.document).collect();
        let prompt = self.render(question, &sources);
        debug!(
            sources = sources.len(),
            prompt_chars = prompt.chars().count(),
            "Rendered retrieval prompt"
        );

        let response = self.model.invoke(&prompt).await?;
        info!(
            model = self.model.name(),
            sources = sources.len(),
            total_tokens = response.usage.total_tokens,
            "Answered question"
        );
        Ok(RagAnswer {
            answer: response.content,
            sources,
            usage: response.usage,
        })
    }

    fn render(&self, question: &str, sources: &[Document]) -> String {
        let context = sources
            .iter()
            .map(|doc| doc.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        prompt::render(
            &self.template,
            &[("context", context.as_str()), ("question", question)],
        )
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingProvider, RetrievalConfig, StoreKind};
    use crate::error::{Error, VectorStoreError};
    use crate::llm::ScriptedChatModel;
    use crate::retrieval::embedding::HashEmbedder;

    fn retriever() -> Arc<Retriever> {
        let config = RetrievalConfig::builder()
            .store_kind(StoreKind::Memory)
            .embedding_provider(EmbeddingProvider::Hash)
            .top_k(1)
            .build()
            .unwrap_or_else(|_| unreachable!());
        Arc::new(Retriever::new(&config, Arc::new(HashEmbedder::default())))
    }

    #[test]
    fn test_template_needs_both_placeholders() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedChatModel::with_replies(["x"]));
        let err = RagChain::with_template(retriever(), model.clone(), "Answer {question}");
        assert!(matches!(err, Err(ConfigError::InvalidValue { field: "prompt_template", .. })));
        assert!(RagChain::with_template(retriever(), model, "{context}\n{question}").is_ok());
    }

    #[tokio::test]
    async fn test_query_before_index() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedChatModel::with_replies(["x"]));
        let chain = RagChain::with_template(retriever(), model, "{context}|{question}")
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            chain.query("q").await,
            Err(Error::VectorStore(VectorStoreError::NotIndexed))
        ));
    }

    #[tokio::test]
    async fn test_query_stuffs_context() {
        let retriever = retriever();
        retriever
            .index_documents(&[
                Document::new("The capital of France is Paris.").with_metadata("source", "fr.txt"),
                Document::new("Bananas are rich in potassium.")
                    .with_metadata("source", "fruit.txt"),
            ])
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));

        let scripted = Arc::new(ScriptedChatModel::with_replies(["Paris."]));
        let chain = RagChain::with_template(
            retriever,
            scripted.clone(),
            "Context:\n{context}\nQ: {question}",
        )
        .unwrap_or_else(|_| unreachable!());

        let answer = chain
            .query("What is the capital of France?")
            .await
            .unwrap_or_else(|e| panic!("query failed: {e}"));
        assert_eq!(answer.answer, "Paris.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source(), Some("fr.txt"));

        let requests = scripted.requests();
        assert_eq!(
            requests[0].messages[0].content,
            "Context:\nThe capital of France is Paris.\nQ: What is the capital of France?"
        );
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let retriever = retriever();
        retriever
            .index_documents(&[Document::new("anything")])
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        let scripted = ScriptedChatModel::new(crate::config::ModelConfig::default());
        scripted.push_error(crate::error::LlmError::Stream {
            message: "boom".to_string(),
        });
        let chain = RagChain::with_template(retriever, Arc::new(scripted), "{context}{question}")
            .unwrap_or_else(|_| unreachable!())
            .top_k(3);
        assert!(matches!(chain.query("q").await, Err(Error::Llm(_))));
    }
}
