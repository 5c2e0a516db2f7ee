use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::diff::DiffEntry;
use crate::wire::{PromptMode, PromptRequest};

pub struct SavedPaths {
    pub dir: PathBuf,
    pub request: PathBuf,
    pub response: PathBuf,
    pub diff: Option<PathBuf>,
}

/// Request as recorded on disk; image payloads are summarised, not stored.
#[derive(Serialize)]
struct RequestRecord<'a> {
    tx: Uuid,
    timestamp: DateTime<Utc>,
    mode: PromptMode,
    instruction: &'a str,
    image_count: usize,
    image_bytes: usize,
    current_document: Option<&'a str>,
}

pub fn tx_dir(root: &Path, tx: Uuid) -> PathBuf {
    root.join(".prompt-studio").join("tx").join(tx.to_string())
}

/// Write one AI exchange under `<root>/.prompt-studio/tx/<tx>/`.
pub fn save_exchange(
    root: &Path,
    tx: Uuid,
    req: &PromptRequest,
    response: &str,
    entries: Option<&[DiffEntry]>,
) -> anyhow::Result<SavedPaths> {
    let dir = tx_dir(root, tx);
    fs::create_dir_all(&dir)?;
    let stage = match req.mode {
        PromptMode::Generate => "generate",
        PromptMode::Modify => "modify",
    };

    let record = RequestRecord {
        tx,
        timestamp: Utc::now(),
        mode: req.mode,
        instruction: &req.instruction,
        image_count: req.images.len(),
        image_bytes: req.images.iter().map(String::len).sum(),
        current_document: req.current_document.as_deref(),
    };
    let request = dir.join(format!("{stage}.request.json"));
    fs::write(&request, to_string_pretty(&record)?)?;

    let response_path = dir.join(format!("{stage}.response.txt"));
    fs::write(&response_path, response)?;

    let diff = match entries {
        Some(entries) => {
            let p = dir.join(format!("{stage}.diff.json"));
            fs::write(&p, to_string_pretty(entries)?)?;
            Some(p)
        }
        None => None,
    };

    Ok(SavedPaths { dir, request, response: response_path, diff })
}

pub fn print_saved_paths(saved: &SavedPaths) {
    println!("debug: transcript directory: {}", saved.dir.display());
    println!("debug: request saved at: {}", saved.request.display());
    println!("debug: response saved at: {}", saved.response.display());
    match &saved.diff {
        Some(p) => println!("debug: diff saved at: {}", p.display()),
        None => println!("debug: no diff (response had no document)"),
    }
    std::io::stdout().flush().ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_request_response_and_diff() {
        let dir = tempfile::tempdir().unwrap();
        let tx = Uuid::new_v4();
        let req = PromptRequest {
            mode: PromptMode::Modify,
            instruction: "夜景".into(),
            images: vec!["data:image/png;base64,AAAA".into()],
            current_document: Some("{}".into()),
        };
        let saved = save_exchange(dir.path(), tx, &req, "{\"a\":1}", Some(&[][..])).unwrap();
        assert!(saved.dir.ends_with(tx.to_string()));
        let record: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&saved.request).unwrap()).unwrap();
        assert_eq!(record["mode"], "modify");
        assert_eq!(record["image_count"], 1);
        assert!(record.get("images").is_none());
        assert_eq!(fs::read_to_string(&saved.response).unwrap(), "{\"a\":1}");
        assert!(saved.diff.unwrap().exists());
    }
}
