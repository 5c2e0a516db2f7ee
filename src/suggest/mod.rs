//! Autocomplete candidates collected from saved presets.

use std::collections::{BTreeMap, HashSet};

use crate::document::FieldId;
use crate::errors::StudioError;
use crate::form::FormState;
use crate::provider::PresetStore;
use crate::wire::Preset;

#[derive(Debug, Clone, Default)]
pub struct SuggestionIndex {
    by_field: BTreeMap<FieldId, Vec<String>>,
}

impl SuggestionIndex {
    /// Collect distinct non-empty values per field. Presets that failed to
    /// load are skipped.
    pub fn build<I>(presets: I) -> Self
    where
        I: IntoIterator<Item = Result<Preset, StudioError>>,
    {
        let mut by_field: BTreeMap<FieldId, Vec<String>> = BTreeMap::new();
        let mut seen: HashSet<(FieldId, String)> = HashSet::new();

        for preset in presets {
            let preset = match preset {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("skipping preset in suggestion index: {e}");
                    continue;
                }
            };
            let form = FormState::from_document(&preset.data);
            for (field, value) in form.fields() {
                let value = value.trim();
                if value.is_empty() || !seen.insert((field, value.to_string())) {
                    continue;
                }
                by_field.entry(field).or_default().push(value.to_string());
            }
        }

        Self { by_field }
    }

    /// Fetch every preset from the store and rebuild from scratch.
    pub async fn rebuild(store: &dyn PresetStore) -> Result<Self, StudioError> {
        let names = store.list().await?;
        let mut loaded = Vec::with_capacity(names.len());
        for summary in names {
            let result = match store.fetch(&summary.name).await {
                Ok(Some(data)) => Ok(Preset { name: summary.name, data }),
                Ok(None) => Err(StudioError::Storage(format!("preset '{}' disappeared", summary.name))),
                Err(e) => Err(e),
            };
            loaded.push(result);
        }
        let index = Self::build(loaded);
        log::debug!("suggestion index rebuilt: {} fields with candidates", index.by_field.len());
        Ok(index)
    }

    pub fn candidates(&self, field: FieldId) -> &[String] {
        self.by_field.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Candidates containing `query` (case-insensitive), first-seen order.
    pub fn suggest(&self, field: FieldId, query: &str, limit: usize) -> Vec<&str> {
        let needle = query.trim().to_lowercase();
        self.candidates(field)
            .iter()
            .filter(|c| needle.is_empty() || c.to_lowercase().contains(&needle))
            .take(limit)
            .map(String::as_str)
            .collect()
    }
}
