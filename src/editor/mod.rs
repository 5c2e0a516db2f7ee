//! Command handlers tying the form, the collaborators and the AI dialog
//! together. Nothing here knows about terminals.

use crate::apply::{apply_with_summary, AcceptMask, ApplySummary};
use crate::document::{canonicalize, Document, FieldId};
use crate::errors::StudioError;
use crate::form::{FormState, RenderedPrompt};
use crate::provider::Collaborators;
use crate::session::{AiSession, Canceller, Completion};
use crate::suggest::SuggestionIndex;
use crate::upload::ImageSet;
use crate::wire::{
    AspectRatio, GeneratedImage, ImageRequest, ImageSize, OptionsCatalog, Preset, PresetSummary, PromptMode, Settings,
    SettingsUpdate, ThinkingLevel,
};

/// Shortest prompt accepted for image generation.
pub const MIN_IMAGE_PROMPT_CHARS: usize = 5;

/// Outcome of reformatting the stored presets.
#[derive(Debug, Default)]
pub struct FormatReport {
    pub formatted: Vec<String>,
    pub failed: Vec<(String, StudioError)>,
}

pub struct Editor {
    collab: Collaborators,
    form: FormState,
    form_images: ImageSet,
    suggestions: SuggestionIndex,
    options: OptionsCatalog,
    dialog: Option<AiSession>,
}

impl Editor {
    pub fn new(collab: Collaborators) -> Self {
        Self {
            collab,
            form: FormState::new(),
            form_images: ImageSet::new(),
            suggestions: SuggestionIndex::default(),
            options: OptionsCatalog::new(),
            dialog: None,
        }
    }

    /// Load option lists and the suggestion index. Either may fail without
    /// making the editor unusable, so failures are logged and skipped.
    pub async fn init(&mut self) {
        match self.collab.options.options().await {
            Ok(options) => self.options = options,
            Err(e) => log::warn!("could not load option lists: {e}"),
        }
        if let Err(e) = self.refresh_suggestions().await {
            log::warn!("could not build suggestions: {e}");
        }
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn options(&self) -> &OptionsCatalog {
        &self.options
    }

    pub fn suggestions(&self) -> &SuggestionIndex {
        &self.suggestions
    }

    pub fn document(&self) -> Document {
        canonicalize(self.form.to_document())
    }

    pub fn preview(&self) -> RenderedPrompt {
        self.form.render_output()
    }

    pub fn set_field(&mut self, field: FieldId, value: impl Into<String>) {
        self.form.set(field, value);
    }

    /// Turn line-art mode on; an empty prompt is filled from the stored template.
    pub async fn enable_line_art(&mut self) -> Result<(), StudioError> {
        if self.form.line_art.prompt.trim().is_empty() {
            self.form.line_art.prompt = self.collab.line_art.load_template().await?;
        }
        self.form.line_art.enabled = true;
        Ok(())
    }

    pub fn disable_line_art(&mut self) {
        self.form.line_art.enabled = false;
    }

    pub fn set_line_art_prompt(&mut self, text: impl Into<String>) {
        self.form.line_art.prompt = text.into();
    }

    pub async fn save_line_art_template(&self) -> Result<(), StudioError> {
        self.collab.line_art.save_template(&self.form.line_art.prompt).await
    }

    pub fn set_special_requirement(&mut self, enabled: bool, text: impl Into<String>) {
        self.form.special.enabled = enabled;
        self.form.special.text = text.into();
    }

    pub fn set_negative_prompt(&mut self, enabled: bool, elements: Vec<String>, styles: Vec<String>) {
        self.form.negative.enabled = enabled;
        self.form.negative.elements = elements;
        self.form.negative.styles = styles;
    }

    /// Replace the form with a pasted document. The form is untouched on error.
    pub fn import_json(&mut self, text: &str) -> Result<(), StudioError> {
        let doc: Document = serde_json::from_str(text.trim())
            .map_err(|e| StudioError::Validation(format!("not valid JSON: {e}")))?;
        if !doc.is_object() {
            return Err(StudioError::Validation("expected a JSON object".into()));
        }
        self.load_document(&doc);
        Ok(())
    }

    pub fn load_document(&mut self, doc: &Document) {
        self.form = FormState::from_document(doc);
    }

    pub async fn list_presets(&self) -> Result<Vec<PresetSummary>, StudioError> {
        self.collab.presets.list().await
    }

    /// Returns false when no preset has that name.
    pub async fn load_preset(&mut self, name: &str) -> Result<bool, StudioError> {
        match self.collab.presets.fetch(name).await? {
            Some(doc) => {
                self.load_document(&doc);
                log::debug!("preset '{name}' loaded");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn save_preset(&mut self, name: &str) -> Result<(), StudioError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StudioError::Validation("preset name is empty".into()));
        }
        let preset = Preset { name: name.to_string(), data: self.document() };
        self.collab.presets.create(&preset).await?;
        self.refresh_suggestions().await
    }

    pub async fn delete_preset(&mut self, name: &str) -> Result<(), StudioError> {
        self.collab.presets.delete(name).await?;
        self.refresh_suggestions().await
    }

    /// Rewrite every stored preset with its top-level keys in canonical
    /// order. One unreadable preset does not stop the rest.
    pub async fn format_presets(&self) -> Result<FormatReport, StudioError> {
        let mut report = FormatReport::default();
        for summary in self.collab.presets.list().await? {
            let name = summary.name;
            let outcome = match self.collab.presets.fetch(&name).await {
                Ok(Some(doc)) if doc.is_object() => {
                    let preset = Preset { name: name.clone(), data: canonicalize(doc) };
                    self.collab.presets.create(&preset).await
                }
                Ok(Some(_)) => Err(StudioError::Validation("stored preset is not a JSON object".into())),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => report.formatted.push(name),
                Err(e) => {
                    log::warn!("could not format preset '{name}': {e}");
                    report.failed.push((name, e));
                }
            }
        }
        Ok(report)
    }

    pub async fn refresh_suggestions(&mut self) -> Result<(), StudioError> {
        self.suggestions = SuggestionIndex::rebuild(self.collab.presets.as_ref()).await?;
        Ok(())
    }

    pub async fn settings(&self) -> Result<Settings, StudioError> {
        self.collab.config.load_settings().await
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<(), StudioError> {
        self.collab.config.save_settings(update).await
    }

    pub async fn field_options(&self, name: &str) -> Result<Vec<String>, StudioError> {
        self.collab.options.field_options(name).await
    }

    /// Store a new candidate and offer it right away.
    pub async fn add_option(&mut self, name: &str, value: &str) -> Result<(), StudioError> {
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            return Err(StudioError::Validation("option value is empty".into()));
        }
        self.collab.options.add_option(name, value).await?;
        let list = self.options.entry(name.to_string()).or_default();
        if !list.iter().any(|v| v == value) {
            list.push(value.to_string());
        }
        Ok(())
    }

    pub fn attach_form_image(&mut self, data_uri: String) -> Result<(), StudioError> {
        self.form_images.try_add(data_uri)
    }

    pub fn form_images(&self) -> &ImageSet {
        &self.form_images
    }

    pub fn form_images_mut(&mut self) -> &mut ImageSet {
        &mut self.form_images
    }

    /// Start a fresh dialog; any previous one is cancelled and discarded.
    pub fn open_dialog(&mut self, mode: PromptMode) -> &mut AiSession {
        self.close_dialog();
        self.dialog.insert(AiSession::new(mode))
    }

    /// Discard the dialog. Returns whether a request was still in flight.
    pub fn close_dialog(&mut self) -> bool {
        match self.dialog.take() {
            Some(session) => session.cancel(),
            None => false,
        }
    }

    pub fn dialog(&self) -> Option<&AiSession> {
        self.dialog.as_ref()
    }

    pub fn dialog_mut(&mut self) -> Option<&mut AiSession> {
        self.dialog.as_mut()
    }

    pub fn dialog_canceller(&self) -> Option<Canceller> {
        self.dialog.as_ref().map(AiSession::canceller)
    }

    /// Send the dialog's request, diffing the reply against the current form.
    pub async fn run_dialog<F>(&mut self, instruction: &str, on_chunk: F) -> Result<Completion, StudioError>
    where
        F: FnMut(&str),
    {
        let provider = self.collab.prompts.clone();
        let current = self.document();
        let session = self
            .dialog
            .as_mut()
            .ok_or_else(|| StudioError::Validation("no AI dialog is open".into()))?;
        session.run(provider.as_ref(), instruction, Some(&current), on_chunk).await
    }

    /// Apply the accepted entries of the dialog's proposal to the form. The
    /// result goes back through the mapper before it becomes form state.
    pub fn apply_proposal(&mut self, mask: &AcceptMask) -> Result<ApplySummary, StudioError> {
        let proposal = self
            .dialog
            .as_mut()
            .and_then(AiSession::take_proposal)
            .ok_or_else(|| StudioError::Validation("there is no proposal to apply".into()))?;
        let (applied, summary) = apply_with_summary(&self.document(), &proposal.entries, mask);
        let form = FormState::from_document(&applied);
        self.form = FormState::from_document(&form.to_document());
        log::debug!(
            "proposal applied: {} set, {} removed, {} skipped",
            summary.set,
            summary.removed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Replace the whole form with the dialog's proposed document.
    pub fn apply_generated(&mut self) -> Result<(), StudioError> {
        let proposal = self
            .dialog
            .as_mut()
            .and_then(AiSession::take_proposal)
            .ok_or_else(|| StudioError::Validation("there is no generated document to apply".into()))?;
        self.load_document(&proposal.document);
        Ok(())
    }

    pub async fn submit_image(
        &self,
        aspect_ratio: AspectRatio,
        image_size: ImageSize,
        thinking_level: ThinkingLevel,
    ) -> Result<GeneratedImage, StudioError> {
        let prompt = self.preview().text;
        if prompt.trim().chars().count() < MIN_IMAGE_PROMPT_CHARS {
            return Err(StudioError::Validation("configure a prompt before generating an image".into()));
        }
        let req = ImageRequest {
            prompt,
            images: self.form_images.as_slice().to_vec(),
            aspect_ratio,
            image_size,
            thinking_level,
        };
        self.collab.images.generate_image(&req).await
    }
}
