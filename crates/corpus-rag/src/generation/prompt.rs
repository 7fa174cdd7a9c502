//! Prompt templates for answer generation and metadata enrichment

use crate::index::SearchHit;

/// Builds prompts for the generation backend
pub struct PromptBuilder;

const SEPARATOR: &str = "---------------------";

impl PromptBuilder {
    /// Join retrieved nodes into a context block, best match first.
    ///
    /// Uses each node's generation view, so embedding-only metadata stays out.
    pub fn build_context(hits: &[SearchHit]) -> String {
        hits.iter()
            .map(|hit| hit.node.llm_input())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Question-answering prompt over retrieved context
    pub fn build_qa_prompt(question: &str, context: &str) -> String {
        format!(
            "Context information is below.\n\
             {sep}\n\
             {context}\n\
             {sep}\n\
             Given the context information and not prior knowledge, answer the query.\n\
             Query: {question}\n\
             Answer: ",
            sep = SEPARATOR,
            context = context,
            question = question
        )
    }

    /// Candidate title for a single node
    pub fn build_title_node_prompt(context: &str) -> String {
        format!(
            "Context: {context}. Give a title that summarizes all of the unique entities, \
             titles or themes found in the context. Title: ",
            context = context
        )
    }

    /// Combine per-node candidate titles into one document title
    pub fn build_title_combine_prompt(candidates: &[String]) -> String {
        format!(
            "{candidates}. Based on the above candidate titles and content, \
             what is the comprehensive title for this document? Title: ",
            candidates = candidates.join(", ")
        )
    }

    /// Questions a node can answer
    pub fn build_questions_prompt(context: &str, num_questions: usize) -> String {
        format!(
            "Here is the context:\n\
             {context}\n\n\
             Given the contextual information, generate {num_questions} questions this context \
             can provide specific answers to which are unlikely to be found elsewhere.\n\n\
             Higher-level summaries of surrounding context may be provided as well. \
             Try using these summaries to generate better questions that this context can answer.\n",
            context = context,
            num_questions = num_questions
        )
    }

    /// Invoice compliance review of a node
    pub fn build_compliance_prompt(context: &str, num_issues: usize) -> String {
        format!(
            "Here is the context:\n\
             {context}\n\n\
             Given the contextual information, verify that the following invoice complies with \
             standard accounting practices and regulatory requirements, noting any missing \
             mandatory information or formatting issues. Report at most {num_issues} issues.\n",
            context = context,
            num_issues = num_issues
        )
    }
}
