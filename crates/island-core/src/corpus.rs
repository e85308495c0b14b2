//! Loading a world's corpus from `<corpus_dir>/<world_id>/*.txt`.

use anyhow::{anyhow, Context, Result};
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::types::CorpusDocument;

/// Read every `.txt` file under `dir` in sorted path order.
///
/// `patterns` optionally restricts the file names with shell globs (`*`, `?`,
/// `[..]`). Empty files are skipped.
pub fn load_corpus_dir(dir: &Path, patterns: &[String]) -> Result<Vec<CorpusDocument>> {
    if !dir.is_dir() {
        return Err(anyhow!("corpus directory {} does not exist", dir.display()));
    }
    let patterns = patterns
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("invalid corpus pattern '{p}'")))
        .collect::<Result<Vec<_>>>()?;
    let mut docs = Vec::new();
    for path in list_txt_files(dir) {
        let name = doc_id_for(&path);
        if !patterns.is_empty() && !patterns.iter().any(|p| p.matches(&name)) {
            continue;
        }
        let content = read_file_content(&path)?;
        let content = content.trim();
        if content.is_empty() {
            debug!(path = %path.display(), "skipping empty corpus file");
            continue;
        }
        docs.push(CorpusDocument::new(name, content));
    }
    Ok(docs)
}

/// Sub-directories of `root`, one per world, sorted by name.
pub fn list_worlds(root: &Path) -> Result<Vec<String>> {
    let mut worlds = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            worlds.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    worlds.sort();
    Ok(worlds)
}

fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => {
            warn!(path = %file_path.display(), "corpus file is not valid UTF-8; decoding lossily");
            Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string())
        }
    }
}

fn doc_id_for(file_path: &Path) -> String {
    file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string_lossy().to_string())
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    txt_files.sort();
    txt_files
}
