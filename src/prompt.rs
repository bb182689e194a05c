//! Citation-oriented prompt assembly.
//!
//! Selected chunks are grouped by source URL in first-seen order and rendered
//! as numbered entries, so every `[n]` the model can emit maps into the
//! deduplicated sources list returned to the caller.

use serde::{Deserialize, Serialize};

use crate::rag::ScoredChunk;

/// A source the answer may cite, aligned with the 1-based context indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct PromptBundle {
    pub context_block: String,
    pub system: String,
    pub user: String,
    pub sources: Vec<SourceRef>,
}

pub const SYSTEM_PROMPT: &str = "You are a research assistant that answers questions using ONLY the provided numbered sources.

Rules:
1. Cite every factual claim with [1], [2], [3] immediately after the claim, where the number refers to the matching source.
2. Start with a direct answer, then elaborate with supporting details.
3. Synthesize across sources in your own words; never copy large blocks verbatim.
4. If the sources do not cover part of the question, say explicitly what is missing.
5. End your answer with a \"Sources:\" section listing each cited index as \"[n] Title - URL\".

Never make a claim without a citation and never use information outside the provided sources.";

pub fn build_prompt(
    query: &str,
    ranked: &[ScoredChunk],
    max_source_chars: usize,
) -> PromptBundle {
    let grouped = group_by_source(ranked);

    let mut entries = Vec::with_capacity(grouped.len());
    let mut sources = Vec::with_capacity(grouped.len());
    for (idx, group) in grouped.iter().enumerate() {
        let content = truncate_chars(&group.texts.join("\n"), max_source_chars);
        entries.push(format!(
            "[{}] {}\nURL: {}\nContent: {}\n---",
            idx + 1,
            group.title,
            group.url,
            content
        ));
        sources.push(SourceRef {
            url: group.url.clone(),
            title: group.title.clone(),
        });
    }

    let context_block = entries.join("\n\n");
    let user = format!(
        "CONTEXT (retrieved sources):\n{context_block}\n\nQUESTION:\n{query}\n\nProvide a comprehensive, well-cited answer:"
    );

    PromptBundle {
        context_block,
        system: SYSTEM_PROMPT.to_string(),
        user,
        sources,
    }
}

struct SourceGroup {
    url: String,
    title: String,
    texts: Vec<String>,
}

/// Groups chunks by source URL, preserving first-seen (rank) order.
fn group_by_source(ranked: &[ScoredChunk]) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    for scored in ranked {
        let chunk = &scored.chunk;
        match groups.iter_mut().find(|g| g.url == chunk.source_url) {
            Some(group) => group.texts.push(chunk.text.clone()),
            None => groups.push(SourceGroup {
                url: chunk.source_url.clone(),
                title: if chunk.source_title.is_empty() {
                    "Untitled".to_string()
                } else {
                    chunk.source_title.clone()
                },
                texts: vec![chunk.text.clone()],
            }),
        }
    }
    groups
}

/// Truncates at a character boundary and appends an ellipsis marker.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}
