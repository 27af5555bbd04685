use super::RetrievedChunk;
use crate::config::LlmConfig;

/// Builds the text sent to the generator
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system_prompt: String,
    include_context: bool,
}

impl PromptTemplate {
    pub fn new(system_prompt: impl Into<String>, include_context: bool) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            include_context,
        }
    }

    pub fn from_config(llm: &LlmConfig) -> Self {
        Self::new(llm.system_prompt.clone(), llm.include_context)
    }

    pub fn includes_context(&self) -> bool {
        self.include_context
    }

    pub fn render(&self, question: &str, chunks: &[RetrievedChunk]) -> String {
        let mut prompt = self.system_prompt.trim().to_string();

        if self.include_context && !chunks.is_empty() {
            prompt.push_str("\n\nCONTEXT:\n");
            for (i, chunk) in chunks.iter().enumerate() {
                prompt.push_str(&format!("[{}] ({}) {}\n", i + 1, chunk.id, chunk.text.trim()));
            }
        }

        prompt.push_str("\n\nUSER'S QUESTION:\n");
        prompt.push_str(question.trim());
        prompt
    }
}
