use anyhow::Result;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::types::SourceRecord;

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Upper bound on chunk length, in characters.
    pub max_chars: usize,
    /// Characters repeated at the start of the next window when a paragraph is split.
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 512, overlap_chars: 50 }
    }
}

/// Splits a directory of guidance `.txt` files into source records.
///
/// Record ids are `<relative-path-without-extension>:<chunk-index>` so the same
/// file yields the same ids on every refresh and same-named files in different
/// sub-directories never collide. Metadata carries `category` (sub-directory relative to
/// the root, `misc` at top level) and `source_path`.
#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<SourceRecord>> {
        let files = self.list_txt_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        let mut all = Vec::new();
        for file_path in &files {
            let content = self.read_file_content(file_path)?;
            let doc_id = self.extract_doc_id(file_path, data_dir);
            let category = self.get_facet_from_path(file_path, data_dir);
            let chunks = self.chunk_text(&content);
            debug!(file = %file_path.display(), chunks = chunks.len(), "chunked guidance file");
            for (i, chunk) in chunks.into_iter().enumerate() {
                all.push(
                    SourceRecord::new(format!("{doc_id}:{i}"), chunk)
                        .with_meta("category", category.as_str())
                        .with_meta("source_path", file_path.to_string_lossy().to_string()),
                );
            }
        }
        info!(files = files.len(), records = all.len(), "processed guidance directory");
        Ok(all)
    }

    /// Paragraph-first chunking: whole paragraphs are packed into a chunk while
    /// they fit; a paragraph longer than `max_chars` is cut into overlapping
    /// windows on word boundaries.
    pub fn chunk_text(&self, content: &str) -> Vec<String> {
        let max = self.chunking_config.max_chars.max(1);
        let mut chunks = Vec::new();
        let mut current = String::new();
        for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let para_len = paragraph.chars().count();
            if para_len > max {
                if !current.is_empty() { chunks.push(std::mem::take(&mut current)); }
                chunks.extend(self.split_with_overlap(paragraph));
                continue;
            }
            let joined_len = current.chars().count() + if current.is_empty() { 0 } else { 2 } + para_len;
            if joined_len > max && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() { current.push_str("\n\n"); }
            current.push_str(paragraph);
        }
        if !current.is_empty() { chunks.push(current); }
        chunks
    }

    fn split_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let max = self.chunking_config.max_chars.max(1);
        let overlap = self.chunking_config.overlap_chars.min(max / 2);
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let mut end = start;
            let mut len = 0usize;
            while end < words.len() {
                let add = words[end].chars().count() + usize::from(end > start);
                if len + add > max && end > start { break; }
                len += add;
                end += 1;
            }
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            // step back over whole words until roughly `overlap` chars are repeated
            let mut back = end;
            let mut carried = 0usize;
            while back > start + 1 && carried < overlap {
                back -= 1;
                carried += words[back].chars().count() + 1;
            }
            start = back;
        }
        chunks
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    /// Path relative to the root, without extension, `/`-separated:
    /// `faq/refunds.txt` becomes `faq/refunds`.
    fn extract_doc_id(&self, file_path: &Path, data_dir: &Path) -> String {
        let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path).with_extension("");
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            file_path.to_string_lossy().to_string()
        } else {
            parts.join("/")
        }
    }

    fn get_facet_from_path(&self, file_path: &Path, data_dir: &Path) -> String {
        let relative_path = file_path.strip_prefix(data_dir).unwrap_or(file_path);
        match relative_path.parent().and_then(Path::to_str) {
            Some(facet) if !facet.is_empty() => facet.to_string(),
            _ => "misc".to_string(),
        }
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
            .collect();
        txt_files.sort();
        txt_files
    }
}
