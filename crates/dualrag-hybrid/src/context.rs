//! Renders retrieval results as a context block for the generation step.

use dualrag_core::types::{Document, RetrievalResult, Scalar, Source};

pub const NO_CONTEXT: &str = "No relevant context found from available sources.";

/// Remote items shown to the generation step.
const MAX_EVENTS: usize = 5;

pub fn format_context(results: &[RetrievalResult]) -> String {
    let local: Vec<&Document> = results.iter().filter(|r| r.source == Source::Local).map(|r| &r.document).collect();
    let remote: Vec<&Document> = results.iter().filter(|r| r.source == Source::Remote).map(|r| &r.document).collect();

    let mut sections = Vec::new();
    if !local.is_empty() {
        let mut s = String::from("Knowledge Base:\nRelevant information:\n");
        for (i, doc) in local.iter().enumerate() {
            s.push_str(&format!("{}. {}\n", i + 1, doc.text.trim()));
        }
        sections.push(s.trim_end().to_string());
    }
    if !remote.is_empty() {
        let mut s = format!("Current Events:\nFound {} events:\n", remote.len());
        for (i, doc) in remote.iter().take(MAX_EVENTS).enumerate() {
            s.push_str(&format_event(i + 1, doc));
        }
        sections.push(s.trim_end().to_string());
    }

    if sections.is_empty() {
        return NO_CONTEXT.to_string();
    }
    sections.join(&format!("\n\n{}\n\n", "─".repeat(50)))
}

fn format_event(n: usize, doc: &Document) -> String {
    let meta = |key: &str| doc.metadata.get(key).map(Scalar::to_string);
    let title = meta("title").unwrap_or_else(|| doc.text.lines().next().unwrap_or("Untitled Event").to_string());
    let price = match doc.metadata.get("is_free") {
        Some(Scalar::Bool(true)) => "Free".to_string(),
        _ => meta("price").map(|p| format!("${p}")).unwrap_or_else(|| "TBA".to_string()),
    };
    let mut s = format!("\n{n}. {title}\n");
    s.push_str(&format!("   Location: {}\n", meta("location").unwrap_or_else(|| "Location TBA".to_string())));
    s.push_str(&format!("   Date: {}\n", meta("start_date").unwrap_or_else(|| "Date TBA".to_string())));
    s.push_str(&format!("   Price: {price}\n"));
    s.push_str(&format!("   Category: {}\n", meta("category").unwrap_or_else(|| "Uncategorized".to_string())));
    if let Some(tags) = meta("tags") {
        s.push_str(&format!("   Tags: {tags}\n"));
    }
    s
}
