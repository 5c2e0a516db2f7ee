use serde_json::{Map, Value};

use crate::diff::{DiffEntry, Slot};
use crate::document::{remove_path, set_path, Document};
use crate::errors::StudioError;

/// Which diff entries the user accepted, by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptMask(Vec<bool>);

impl AcceptMask {
    pub fn all(len: usize) -> Self {
        Self(vec![true; len])
    }

    pub fn none(len: usize) -> Self {
        Self(vec![false; len])
    }

    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    /// Parse `all`, `none`, or a 1-based list such as `1,3-5`.
    pub fn parse(input: &str, len: usize) -> Result<Self, StudioError> {
        let input = input.trim();
        match input.to_lowercase().as_str() {
            "" | "none" | "n" => return Ok(Self::none(len)),
            "all" | "a" | "y" | "yes" => return Ok(Self::all(len)),
            _ => {}
        }

        let mut flags = vec![false; len];
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (start, end) = match part.split_once('-') {
                Some((a, b)) => (parse_index(a, len)?, parse_index(b, len)?),
                None => {
                    let i = parse_index(part, len)?;
                    (i, i)
                }
            };
            if start > end {
                return Err(StudioError::Validation(format!("range {part} is reversed")));
            }
            for flag in &mut flags[start..=end] {
                *flag = true;
            }
        }
        Ok(Self(flags))
    }

    pub fn is_accepted(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn accepted_count(&self) -> usize {
        self.0.iter().filter(|f| **f).count()
    }
}

fn parse_index(raw: &str, len: usize) -> Result<usize, StudioError> {
    let n: usize = raw
        .trim()
        .parse()
        .map_err(|_| StudioError::Validation(format!("'{raw}' is not an entry number")))?;
    if n == 0 || n > len {
        return Err(StudioError::Validation(format!("entry {n} is out of range 1..={len}")));
    }
    Ok(n - 1)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub set: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// Apply the accepted entries, in order, onto a copy of `base`.
pub fn apply(base: &Document, entries: &[DiffEntry], mask: &AcceptMask) -> Document {
    apply_with_summary(base, entries, mask).0
}

pub fn apply_with_summary(base: &Document, entries: &[DiffEntry], mask: &AcceptMask) -> (Document, ApplySummary) {
    let mut doc = if base.is_object() { base.clone() } else { Value::Object(Map::new()) };
    let mut sum = ApplySummary::default();

    for (i, entry) in entries.iter().enumerate() {
        if !mask.is_accepted(i) {
            sum.skipped += 1;
            continue;
        }
        match &entry.new {
            Slot::Present(value) => {
                set_path(&mut doc, entry.path.as_slice(), value.clone());
                sum.set += 1;
            }
            Slot::Absent => {
                remove_path(&mut doc, entry.path.as_slice());
                sum.removed += 1;
            }
        }
    }

    log::debug!(
        "applied {} entries ({} set, {} removed, {} skipped)",
        sum.set + sum.removed,
        sum.set,
        sum.removed,
        sum.skipped
    );
    (doc, sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use serde_json::json;

    fn sample_a() -> Value {
        json!({
            "风格模式": "photo",
            "场景": {"环境": {"光线": "dawn", "天气氛围": "fog"}, "主体": {"配饰": "scarf"}},
            "审美控制": {"材质真实度": ["skin"]},
            "反向提示词": {"禁止元素": ["text"], "禁止风格": []}
        })
    }

    fn sample_b() -> Value {
        json!({
            "风格模式": "illustration",
            "场景": {"环境": {"光线": "noon"}, "背景": {"描述": "city"}},
            "审美控制": {"材质真实度": ["skin", "metal"]},
            "额外要求": "no logos"
        })
    }

    #[test]
    fn applying_everything_reaches_the_target() {
        let (a, b) = (sample_a(), sample_b());
        let entries = diff(&a, &b);
        let out = apply(&a, &entries, &AcceptMask::all(entries.len()));
        assert_eq!(out, b);
    }

    #[test]
    fn self_diff_is_idempotent() {
        let a = sample_a();
        let entries = diff(&a, &a);
        assert_eq!(apply(&a, &entries, &AcceptMask::all(0)), a);
    }

    #[test]
    fn rejected_entries_are_noops() {
        let (a, b) = (sample_a(), sample_b());
        let entries = diff(&a, &b);
        let idx = entries.iter().position(|e| e.path == vec!["风格模式"]).unwrap();
        let mut flags = vec![false; entries.len()];
        flags[idx] = true;
        let (out, sum) = apply_with_summary(&a, &entries, &AcceptMask::from_flags(flags));
        assert_eq!(out["风格模式"], json!("illustration"));
        assert_eq!(out["场景"]["环境"]["光线"], json!("dawn"));
        assert_eq!(sum, ApplySummary { set: 1, removed: 0, skipped: entries.len() - 1 });
    }

    #[test]
    fn missing_intermediates_are_created() {
        let entries = vec![DiffEntry {
            path: vec!["相机".into(), "构图".into()],
            old: Slot::Absent,
            new: Slot::Present(json!("rule of thirds")),
        }];
        let out = apply(&json!("not an object"), &entries, &AcceptMask::all(1));
        assert_eq!(out, json!({"相机": {"构图": "rule of thirds"}}));
    }

    #[test]
    fn last_applied_wins_on_shared_paths() {
        let entries = vec![
            DiffEntry { path: vec!["a".into(), "b".into()], old: Slot::Absent, new: Slot::Present(json!(1)) },
            DiffEntry { path: vec!["a".into()], old: Slot::Absent, new: Slot::Present(json!("flat")) },
        ];
        assert_eq!(apply(&json!({}), &entries, &AcceptMask::all(2)), json!({"a": "flat"}));
    }

    #[test]
    fn mask_parsing() {
        assert_eq!(AcceptMask::parse("all", 3).unwrap(), AcceptMask::all(3));
        assert_eq!(AcceptMask::parse("", 2).unwrap(), AcceptMask::none(2));
        let mask = AcceptMask::parse("1, 3-4", 5).unwrap();
        assert_eq!(mask, AcceptMask::from_flags(vec![true, false, true, true, false]));
        assert_eq!(mask.accepted_count(), 3);
        assert!(AcceptMask::parse("0", 3).is_err());
        assert!(AcceptMask::parse("4", 3).is_err());
        assert!(AcceptMask::parse("3-1", 3).is_err());
        assert!(AcceptMask::parse("x", 3).is_err());
    }
}
