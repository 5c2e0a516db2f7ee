use colored::Colorize;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::document::join_list;

/// One side of a diff entry. `Absent` means the key does not exist at all,
/// which the patch applier turns into a deletion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Slot {
    Absent,
    Present(Value),
}

impl Slot {
    fn of(value: Option<&Value>) -> Slot {
        match value {
            Some(v) => Slot::Present(v.clone()),
            None => Slot::Absent,
        }
    }

    /// Absent, null and "" are interchangeable for diffing.
    pub fn is_empty_equivalent(&self) -> bool {
        match self {
            Slot::Absent | Slot::Present(Value::Null) => true,
            Slot::Present(Value::String(s)) => s.is_empty(),
            Slot::Present(_) => false,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Slot::Present(v) => Some(v),
            Slot::Absent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub path: Vec<String>,
    pub old: Slot,
    pub new: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

impl DiffEntry {
    pub fn kind(&self) -> ChangeKind {
        match (&self.old, &self.new) {
            (Slot::Absent, _) => ChangeKind::Added,
            (_, Slot::Absent) => ChangeKind::Removed,
            _ => ChangeKind::Changed,
        }
    }

    pub fn path_label(&self) -> String {
        self.path.join(".")
    }
}

/// Path-addressed differences between two documents.
///
/// Keys are visited in first-seen order (old, then keys only in new). Objects
/// present on both sides are recursed into; everything else, arrays
/// included, is compared as a whole leaf.
pub fn diff(old: &Value, new: &Value) -> Vec<DiffEntry> {
    let empty = Map::new();
    let old_map = old.as_object().unwrap_or(&empty);
    let new_map = new.as_object().unwrap_or(&empty);

    let mut out = Vec::new();
    let mut path = Vec::new();
    diff_maps(old_map, new_map, &mut path, &mut out);
    out
}

fn diff_maps(old: &Map<String, Value>, new: &Map<String, Value>, path: &mut Vec<String>, out: &mut Vec<DiffEntry>) {
    let only_new = new.keys().filter(|k| !old.contains_key(k.as_str()));
    for key in old.keys().chain(only_new) {
        path.push(key.clone());
        diff_values(old.get(key), new.get(key), path, out);
        path.pop();
    }
}

fn diff_values(old: Option<&Value>, new: Option<&Value>, path: &mut Vec<String>, out: &mut Vec<DiffEntry>) {
    if let (Some(Value::Object(a)), Some(Value::Object(b))) = (old, new) {
        diff_maps(a, b, path, out);
        return;
    }

    let old = Slot::of(old);
    let new = Slot::of(new);
    if old.is_empty_equivalent() && new.is_empty_equivalent() {
        return;
    }
    // Value equality ignores object key order, so arrays of objects compare
    // by content.
    if old == new {
        return;
    }
    out.push(DiffEntry { path: path.clone(), old, new });
}

fn format_slot(slot: &Slot, max_chars: usize) -> String {
    match slot {
        Slot::Absent => "(absent)".to_string(),
        Slot::Present(Value::String(s)) => truncate(s, max_chars),
        Slot::Present(Value::Array(items)) => truncate(&join_list(items), max_chars),
        Slot::Present(Value::Object(_)) => "{…}".to_string(),
        Slot::Present(v) => v.to_string(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

pub fn colorize_entry(index: usize, entry: &DiffEntry) -> String {
    let label = entry.path_label();
    match entry.kind() {
        ChangeKind::Added => format!(
            "{:>3}. {} {}\n     {}",
            index + 1,
            "[ADDED]".green().bold(),
            label,
            format!("+ {}", format_slot(&entry.new, 50)).green()
        ),
        ChangeKind::Removed => format!(
            "{:>3}. {} {}\n     {}",
            index + 1,
            "[REMOVED]".red().bold(),
            label,
            format!("- {}", format_slot(&entry.old, 50)).red()
        ),
        ChangeKind::Changed => format!(
            "{:>3}. {} {}\n     {}\n     {}",
            index + 1,
            "[CHANGED]".yellow().bold(),
            label,
            format!("- {}", format_slot(&entry.old, 50)).red(),
            format!("+ {}", format_slot(&entry.new, 50)).green()
        ),
    }
}
