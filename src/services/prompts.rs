//! 提示词模板

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::models::{Document, SourceLink};

pub const ANSWER_TEMPLATE: &str = "You are a polite and precise AI assistant. Answer ONLY from the context below, do not make things up.\n\
If the context does not contain the answer, say so plainly.\n\n\
Answer format: a short summary, then structured points, then a conclusion.\n\
Quote phrases from the context where it helps. Do not list the sources, they are added separately.\n\n\
CONTEXT:\n{context}\n\nQUESTION: {question}\n\nANSWER:";

/// Reply used when retrieval finds nothing to answer from.
pub const NO_INFORMATION: &str =
    "Unfortunately, my knowledge base has no information on this question.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(context|question)\}").expect("valid regex"));

/// Fill the answer template. Placeholders are only looked up in the
/// template, never in the inserted text.
pub fn answer_prompt(context: &str, question: &str) -> String {
    PLACEHOLDER
        .replace_all(ANSWER_TEMPLATE, |caps: &Captures<'_>| match &caps[1] {
            "context" => context,
            _ => question,
        })
        .into_owned()
}

/// Context blocks for the prompt and the distinct pages they came from,
/// in retrieval order.
pub fn build_context(documents: &[Document]) -> (String, Vec<SourceLink>) {
    let mut sources: Vec<SourceLink> = Vec::new();
    let mut blocks = Vec::with_capacity(documents.len());

    for document in documents {
        let url = document.metadata.source.as_str();
        if !url.is_empty() && !sources.iter().any(|s| s.url == url) {
            sources.push(SourceLink {
                title: document.metadata.display_title().to_string(),
                url: url.to_string(),
            });
        }
        blocks.push(format!(
            "Source: {}\nURL: {}\n{}",
            document.metadata.title.as_deref().unwrap_or_default(),
            url,
            document.text
        ));
    }

    (blocks.join(CONTEXT_SEPARATOR), sources)
}
