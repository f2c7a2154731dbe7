/// Topic corpus loading.
///
/// A corpus directory holds either a single `topics.json`
/// (`{"topics": [{"id", "title", "content", "keywords"?}]}`) or one `*.txt` file per
/// topic. For text files the stem becomes the id, and the title is the stem with
/// underscores turned into spaces and each word capitalized.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

pub const TOPICS_FILE: &str = "topics.json";

/// A curated topic the matcher scores papers against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Cached embedding of `embedding_text()`, filled once per run
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl TopicDocument {
    /// Text embedded for this topic: title plus the first 2000 characters of content.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, crate::embedding::truncate_chars(&self.content, 2000))
    }
}

#[derive(Debug, Deserialize)]
struct TopicsFile {
    #[serde(default)]
    topics: Vec<TopicDocument>,
}

/// Load every topic in `dir`.
///
/// `topics.json` wins when present. Text files are read in file-name order so that
/// repeated runs see the same corpus order.
pub fn load_corpus(dir: &Path) -> Result<Vec<TopicDocument>, PipelineError> {
    let topics_file = dir.join(TOPICS_FILE);
    if topics_file.is_file() {
        let raw = std::fs::read_to_string(&topics_file).map_err(|e| {
            PipelineError::Topics(format!("failed to read {}: {}", topics_file.display(), e))
        })?;
        let parsed: TopicsFile = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Topics(format!("failed to parse {}: {}", topics_file.display(), e))
        })?;
        return Ok(parsed.topics);
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::Topics(format!("failed to list {}: {}", dir.display(), e)))?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut topics = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PipelineError::Topics(format!("failed to read {}: {}", path.display(), e)))?;
        topics.push(TopicDocument {
            title: title_from_stem(&stem),
            id: stem,
            content,
            embedding: None,
            keywords: Vec::new(),
        });
    }

    Ok(topics)
}

/// `"kappa_gate_design"` -> `"Kappa Gate Design"`.
///
/// A letter is uppercased when it follows a non-letter and lowercased otherwise, so
/// `"multi-agent_rl"` becomes `"Multi-Agent Rl"`.
pub fn title_from_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut prev_is_letter = false;
    for c in stem.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}
