//! One AI dialog: request, stream, cancel, and turn the reply into a
//! reviewable proposal.

use futures::future::{AbortHandle, AbortRegistration, Abortable};
use futures::StreamExt;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

use crate::diff::{diff, DiffEntry};
use crate::document::Document;
use crate::errors::StudioError;
use crate::form::carry_mode_blocks;
use crate::provider::PromptProvider;
use crate::upload::ImageSet;
use crate::wire::{PromptMode, PromptRequest, StreamEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Aborted,
    Failed(String),
}

impl SessionState {
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Requesting | SessionState::Streaming)
    }
}

/// Cloneable handle that aborts whatever request its session has in flight.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    slot: Arc<Mutex<Option<AbortHandle>>>,
}

impl Canceller {
    /// Returns whether a request was actually in flight.
    pub fn cancel(&self) -> bool {
        match self.slot.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn arm(&self) -> AbortRegistration {
        let (handle, registration) = AbortHandle::new_pair();
        if let Some(previous) = self.slot.lock().replace(handle) {
            previous.abort();
        }
        registration
    }

    fn disarm(&self) {
        self.slot.lock().take();
    }
}

/// Parsed reply plus its diff against the document it was asked about.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub document: Document,
    pub entries: Vec<DiffEntry>,
}

#[derive(Debug)]
pub struct Completion {
    pub text: String,
    pub proposal: Option<Proposal>,
    /// Set when the stream completed but no document could be extracted.
    pub warning: Option<StudioError>,
}

pub struct AiSession {
    mode: PromptMode,
    state: SessionState,
    images: ImageSet,
    buffer: String,
    proposal: Option<Proposal>,
    last_request: Option<PromptRequest>,
    canceller: Canceller,
}

impl AiSession {
    pub fn new(mode: PromptMode) -> Self {
        Self {
            mode,
            state: SessionState::Idle,
            images: ImageSet::new(),
            buffer: String::new(),
            proposal: None,
            last_request: None,
            canceller: Canceller::default(),
        }
    }

    pub fn mode(&self) -> PromptMode {
        self.mode
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    pub fn last_request(&self) -> Option<&PromptRequest> {
        self.last_request.as_ref()
    }

    pub fn take_proposal(&mut self) -> Option<Proposal> {
        self.proposal.take()
    }

    pub fn images(&self) -> &ImageSet {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageSet {
        &mut self.images
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    fn validate(&self, instruction: &str, current: Option<&Document>) -> Result<(), StudioError> {
        let has_text = !instruction.trim().is_empty();
        match self.mode {
            PromptMode::Generate if !has_text && self.images.is_empty() => Err(StudioError::Validation(
                "provide a description or at least one reference image".into(),
            )),
            PromptMode::Modify if !has_text => Err(StudioError::Validation("modification request is empty".into())),
            PromptMode::Modify if current.map_or(true, is_blank_document) => {
                Err(StudioError::Validation("there is no current document to modify".into()))
            }
            _ => Ok(()),
        }
    }

    /// Stream one request to completion. Fragments are handed to `on_chunk`
    /// as they arrive; the accumulated text stays in the buffer whatever the
    /// outcome.
    pub async fn run<F>(
        &mut self,
        provider: &dyn PromptProvider,
        instruction: &str,
        current: Option<&Document>,
        mut on_chunk: F,
    ) -> Result<Completion, StudioError>
    where
        F: FnMut(&str),
    {
        self.validate(instruction, current)?;

        let current_document = match (self.mode, current) {
            (PromptMode::Modify, Some(doc)) => Some(
                serde_json::to_string_pretty(doc).map_err(|e| StudioError::Validation(e.to_string()))?,
            ),
            _ => None,
        };
        let req = PromptRequest {
            mode: self.mode,
            instruction: instruction.trim().to_string(),
            images: self.images.as_slice().to_vec(),
            current_document,
        };

        self.buffer.clear();
        self.proposal = None;
        self.state = SessionState::Requesting;
        log::debug!("ai session: requesting ({:?}, {} images)", self.mode, req.images.len());

        self.last_request = Some(req.clone());
        let registration = self.canceller.arm();
        let outcome = Abortable::new(self.pump(provider, &req, &mut on_chunk), registration).await;
        self.canceller.disarm();

        match outcome {
            Err(_aborted) => {
                self.state = SessionState::Aborted;
                log::debug!("ai session: aborted after {} bytes", self.buffer.len());
                return Err(StudioError::Cancelled);
            }
            Ok(Err(e)) => {
                self.state = SessionState::Failed(e.to_string());
                log::debug!("ai session: failed: {e}");
                return Err(e);
            }
            Ok(Ok(())) => {}
        }

        self.state = SessionState::Completed;
        let empty = json!({});
        let base = current.unwrap_or(&empty);
        let (proposal, warning) = match extract_document(&self.buffer) {
            Ok(mut document) => {
                // The model is told to leave mode blocks alone; the form's own
                // state decides them.
                carry_mode_blocks(base, &mut document, self.mode == PromptMode::Modify);
                let entries = diff(base, &document);
                (Some(Proposal { document, entries }), None)
            }
            Err(e) => {
                log::warn!("ai session: completed without a usable document: {e}");
                (None, Some(e))
            }
        };
        self.proposal = proposal.clone();
        Ok(Completion { text: self.buffer.clone(), proposal, warning })
    }

    async fn pump<F>(&mut self, provider: &dyn PromptProvider, req: &PromptRequest, on_chunk: &mut F) -> Result<(), StudioError>
    where
        F: FnMut(&str),
    {
        let mut stream = provider.open_stream(req).await?;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Chunk(text) => {
                    self.state = SessionState::Streaming;
                    self.buffer.push_str(&text);
                    on_chunk(&text);
                }
                StreamEvent::Done => return Ok(()),
            }
        }
        Err(StudioError::Transport("stream ended before the completion marker".into()))
    }
}

impl Drop for AiSession {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}

fn is_blank_document(doc: &Document) -> bool {
    match doc {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("static pattern"))
}

/// Pull a JSON object out of free-form model output: a fenced block first,
/// then the span from the first `{` to the last `}`.
pub fn extract_document(text: &str) -> Result<Document, StudioError> {
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(caps) = fence_pattern().captures(text) {
        if let Some(m) = caps.get(1) {
            candidates.push(m.as_str());
        }
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }
    if candidates.is_empty() {
        return Err(StudioError::Extraction("no JSON object found in the response".into()));
    }

    let mut last_err = String::new();
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(v @ Value::Object(_)) => return Ok(v),
            Ok(_) => last_err = "response JSON is not an object".into(),
            Err(e) => last_err = format!("response is not valid JSON: {e}"),
        }
    }
    Err(StudioError::Extraction(last_err))
}
