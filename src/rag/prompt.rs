//! Prompt construction for answer synthesis.

/// Reply the model is told to give when the context does not cover the question.
pub const INSUFFICIENT_CONTEXT_REPLY: &str =
    "I don't have enough information to answer this question.";

/// Instructional prompt used for questions over the whole knowledge base.
pub fn qa_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an AI assistant providing helpful, accurate, and concise answers based on the provided context.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question:\n\
         {question}\n\
         \n\
         Instructions:\n\
         1. Answer the question based ONLY on the provided context.\n\
         2. If the context doesn't contain the answer, say \"{INSUFFICIENT_CONTEXT_REPLY}\"\n\
         3. Keep your answer concise and to the point.\n\
         4. If appropriate, use bullet points or numbered lists for clarity.\n\
         5. Do not make up information or use knowledge outside of the provided context.\n\
         \n\
         Answer:\n"
    )
}

/// Bare prompt used when the question targets a single document.
pub fn filtered_prompt(context: &str, question: &str) -> String {
    format!("Context: {context}\n\nQuestion: {question}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_prompt_embeds_context_and_question() {
        let prompt = qa_prompt("Paris is the capital of France.", "What is the capital?");
        assert!(prompt.contains("Context:\nParis is the capital of France.\n"));
        assert!(prompt.contains("Question:\nWhat is the capital?\n"));
        assert!(prompt.contains(INSUFFICIENT_CONTEXT_REPLY));
        assert!(prompt.ends_with("Answer:\n"));
    }

    #[test]
    fn placeholders_inside_context_are_left_alone() {
        let prompt = qa_prompt("{question}", "real question");
        assert!(prompt.contains("Context:\n{question}\n"));
    }

    #[test]
    fn filtered_prompt_has_no_instructions() {
        assert_eq!(
            filtered_prompt("ctx", "q?"),
            "Context: ctx\n\nQuestion: q?"
        );
    }
}
