/// Failure inside a question-answering round. Shown to the user as the answer text.
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error(transparent)]
    Retrieval(#[from] repodoc_index::IndexError),

    #[error(transparent)]
    Generation(#[from] repodoc_llm::LlmError),
}
