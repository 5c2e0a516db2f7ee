//! Form state and the bidirectional mapping to the canonical document.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::document::{
    keys, lookup, read_text, set_path, split_list, Document, Encoding, FieldId, Node, DESCRIPTORS,
};

/// Label placed in front of the special requirement when it is appended to
/// the rendered prompt.
pub const SPECIAL_REQUIREMENT_LABEL: &str = "额外要求：";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineArt {
    pub enabled: bool,
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialRequirement {
    pub enabled: bool,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegativePrompt {
    pub enabled: bool,
    pub elements: Vec<String>,
    pub styles: Vec<String>,
}

/// Flat editing state: one string per field plus the three optional modes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    fields: BTreeMap<FieldId, String>,
    pub line_art: LineArt,
    pub special: SpecialRequirement,
    pub negative: NegativePrompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Structured,
    LineArt,
}

/// The text shown in the preview and sent for image generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub kind: OutputKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Field(FieldId),
    LineArtToggle,
    LineArtPrompt,
    SpecialToggle,
    SpecialText,
    NegativeToggle,
    NegativeElements,
    NegativeStyles,
}

impl Control {
    pub fn all() -> Vec<Control> {
        let mut out: Vec<Control> = FieldId::all().map(Control::Field).collect();
        out.extend([
            Control::LineArtToggle,
            Control::LineArtPrompt,
            Control::SpecialToggle,
            Control::SpecialText,
            Control::NegativeToggle,
            Control::NegativeElements,
            Control::NegativeStyles,
        ]);
        out
    }
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: FieldId) -> &str {
        self.fields.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: FieldId, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.fields.remove(&field);
        } else {
            self.fields.insert(field, value);
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &str)> + '_ {
        FieldId::all().map(move |f| (f, self.get(f)))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Build the structured document. Optional blocks appear only when their
    /// mode is enabled.
    pub fn to_document(&self) -> Document {
        let mut doc = Value::Object(Map::new());
        for d in DESCRIPTORS {
            let raw = self.get(d.field);
            let value = match d.encoding {
                Encoding::Scalar => Value::String(raw.to_string()),
                Encoding::Array => Value::Array(split_list(raw).into_iter().map(Value::String).collect()),
            };
            set_path(&mut doc, d.path, value);
        }

        if self.negative.enabled {
            let mut block = Map::new();
            block.insert(keys::FORBIDDEN_ELEMENTS.to_string(), json!(self.negative.elements));
            block.insert(keys::FORBIDDEN_STYLES.to_string(), json!(self.negative.styles));
            set_path(&mut doc, &[keys::NEGATIVE_PROMPT], Value::Object(block));
        }
        if self.special.enabled {
            set_path(&mut doc, &[keys::SPECIAL_REQUIREMENT], Value::String(self.special.text.clone()));
        }
        if self.line_art.enabled {
            let mut block = Map::new();
            block.insert(keys::LINE_ART_ENABLED.to_string(), Value::Bool(true));
            block.insert(keys::LINE_ART_PROMPT.to_string(), Value::String(self.line_art.prompt.clone()));
            set_path(&mut doc, &[keys::LINE_ART], Value::Object(block));
        }
        doc
    }

    /// Recover form state from any document. Missing or malformed parts read
    /// as empty; mode flags follow the presence of their blocks.
    pub fn from_document(doc: &Document) -> Self {
        let mut form = FormState::new();
        for d in DESCRIPTORS {
            if matches!(d.field, FieldId::Emotion | FieldId::Action) {
                continue;
            }
            form.set(d.field, read_text(doc, d.path));
        }

        let expression = [keys::SCENE, keys::SUBJECT, keys::EXPRESSION];
        match lookup(doc, &expression) {
            // Legacy presets stored expression and action as one string.
            Node::Scalar(Value::String(merged)) => {
                form.set(FieldId::Action, merged.clone());
                form.set(FieldId::Emotion, "");
            }
            _ => {
                form.set(FieldId::Emotion, read_text(doc, FieldId::Emotion.path()));
                form.set(FieldId::Action, read_text(doc, FieldId::Action.path()));
            }
        }

        if let Node::Object(block) = lookup(doc, &[keys::LINE_ART]) {
            let enabled = block
                .get(keys::LINE_ART_ENABLED)
                .and_then(Value::as_bool)
                .unwrap_or(true);
            form.line_art = LineArt {
                enabled,
                prompt: Node::of(block.get(keys::LINE_ART_PROMPT)).to_text(),
            };
        }

        match lookup(doc, &[keys::SPECIAL_REQUIREMENT]) {
            Node::Absent | Node::Object(_) => {}
            node => {
                form.special = SpecialRequirement { enabled: true, text: node.to_text() };
            }
        }

        if let Node::Object(block) = lookup(doc, &[keys::NEGATIVE_PROMPT]) {
            form.negative = NegativePrompt {
                enabled: true,
                elements: read_list(Node::of(block.get(keys::FORBIDDEN_ELEMENTS))),
                styles: read_list(Node::of(block.get(keys::FORBIDDEN_STYLES))),
            };
        }

        form
    }

    /// Preview/submission text. Line-art mode replaces the structured payload
    /// with its prompt; the special requirement is always a labeled suffix.
    pub fn render_output(&self) -> RenderedPrompt {
        let suffix = match self.special.text.trim() {
            text if self.special.enabled && !text.is_empty() => {
                format!("\n\n{SPECIAL_REQUIREMENT_LABEL}{text}")
            }
            _ => String::new(),
        };

        if self.line_art.enabled {
            return RenderedPrompt {
                kind: OutputKind::LineArt,
                text: format!("{}{}", self.line_art.prompt, suffix),
            };
        }

        let mut doc = self.to_document();
        if let Some(map) = doc.as_object_mut() {
            map.shift_remove(keys::SPECIAL_REQUIREMENT);
        }
        let body = serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string());
        RenderedPrompt {
            kind: OutputKind::Structured,
            text: format!("{body}{suffix}"),
        }
    }

    pub fn is_enabled(&self, control: Control) -> bool {
        if !self.line_art.enabled {
            return true;
        }
        matches!(
            control,
            Control::LineArtToggle | Control::LineArtPrompt | Control::SpecialToggle | Control::SpecialText
        )
    }

    pub fn disabled_controls(&self) -> Vec<Control> {
        Control::all().into_iter().filter(|c| !self.is_enabled(*c)).collect()
    }
}

/// Bring a model reply's mode blocks in line with `current` before it is
/// diffed. With `keep_line_art` the line-art block is always taken from
/// `current`. Empty negative-prompt and special-requirement blocks are
/// dropped when `current` does not have them.
pub fn carry_mode_blocks(current: &Document, proposed: &mut Document, keep_line_art: bool) {
    let Some(map) = proposed.as_object_mut() else {
        return;
    };

    if keep_line_art {
        match current.get(keys::LINE_ART) {
            Some(block) => {
                map.insert(keys::LINE_ART.to_string(), block.clone());
            }
            None => {
                map.shift_remove(keys::LINE_ART);
            }
        }
    }

    if current.get(keys::NEGATIVE_PROMPT).is_none() {
        let empty = match Node::of(map.get(keys::NEGATIVE_PROMPT)) {
            Node::Object(block) => {
                read_list(Node::of(block.get(keys::FORBIDDEN_ELEMENTS))).is_empty()
                    && read_list(Node::of(block.get(keys::FORBIDDEN_STYLES))).is_empty()
            }
            _ => true,
        };
        if empty {
            map.shift_remove(keys::NEGATIVE_PROMPT);
        }
    }

    if current.get(keys::SPECIAL_REQUIREMENT).is_none() {
        let empty = match Node::of(map.get(keys::SPECIAL_REQUIREMENT)) {
            Node::Object(_) => true,
            node => node.to_text().trim().is_empty(),
        };
        if empty {
            map.shift_remove(keys::SPECIAL_REQUIREMENT);
        }
    }
}

fn read_list(node: Node<'_>) -> Vec<String> {
    match node {
        Node::Array(items) => items
            .iter()
            .map(|v| Node::of(Some(v)).to_text())
            .filter(|s| !s.is_empty())
            .collect(),
        Node::Scalar(Value::String(s)) => split_list(s),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> FormState {
        let mut form = FormState::new();
        for (i, field) in FieldId::all().enumerate() {
            form.set(field, format!("value {i}"));
        }
        form.set(FieldId::MaterialRealism, "skin pores, woven fabric");
        form
    }

    #[test]
    fn round_trip_restores_every_field() {
        let mut form = filled();
        form.special = SpecialRequirement { enabled: true, text: "no text overlays".into() };
        form.negative = NegativePrompt {
            enabled: true,
            elements: vec!["watermark".into()],
            styles: vec![],
        };
        let back = FormState::from_document(&form.to_document());
        assert_eq!(back, form);
    }

    #[test]
    fn round_trip_holds_for_mode_combinations() {
        let line_art_with_special = FormState {
            line_art: LineArt { enabled: true, prompt: "ink outline".into() },
            special: SpecialRequirement { enabled: true, text: "X".into() },
            ..filled()
        };
        let blank_special = FormState {
            special: SpecialRequirement { enabled: true, text: String::new() },
            ..FormState::new()
        };
        let empty_negative = FormState {
            negative: NegativePrompt { enabled: true, elements: vec![], styles: vec![] },
            ..filled()
        };

        for form in [line_art_with_special, blank_special, empty_negative] {
            let doc = form.to_document();
            assert_eq!(FormState::from_document(&doc), form, "document was {doc}");
        }
    }

    #[test]
    fn optional_blocks_absent_when_disabled() {
        let mut form = filled();
        form.special.text = "kept in the form only".into();
        let doc = form.to_document();
        let map = doc.as_object().unwrap();
        assert!(!map.contains_key(keys::SPECIAL_REQUIREMENT));
        assert!(!map.contains_key(keys::LINE_ART));
        assert!(!map.contains_key(keys::NEGATIVE_PROMPT));
    }

    #[test]
    fn material_realism_is_always_an_array() {
        let mut form = FormState::new();
        assert_eq!(
            lookup(&form.to_document(), FieldId::MaterialRealism.path()),
            Node::Array(&[])
        );
        form.set(FieldId::MaterialRealism, "film grain");
        assert_eq!(
            form.to_document()["审美控制"]["材质真实度"],
            json!(["film grain"])
        );
    }

    #[test]
    fn legacy_expression_string_becomes_action() {
        let doc = json!({"场景": {"主体": {"表情与动作": "smiling while waving"}}});
        let form = FormState::from_document(&doc);
        assert_eq!(form.get(FieldId::Action), "smiling while waving");
        assert_eq!(form.get(FieldId::Emotion), "");
        let rewritten = form.to_document();
        assert_eq!(rewritten["场景"]["主体"]["表情与动作"]["动作"], json!("smiling while waving"));
    }

    #[test]
    fn malformed_documents_degrade_to_empty() {
        for doc in [json!(null), json!("text"), json!([1, 2]), json!({"场景": 5, "线稿模式": "on"})] {
            let form = FormState::from_document(&doc);
            assert_eq!(form, FormState::new());
        }
    }

    #[test]
    fn line_art_output_suppresses_structure() {
        let mut form = filled();
        form.line_art = LineArt { enabled: true, prompt: "clean black line art".into() };
        form.special = SpecialRequirement { enabled: true, text: "X".into() };
        let out = form.render_output();
        assert_eq!(out.kind, OutputKind::LineArt);
        assert_eq!(out.text, "clean black line art\n\n额外要求：X");
        assert!(!out.text.contains('{'));
    }

    #[test]
    fn special_requirement_is_appended_outside_json() {
        let mut form = filled();
        form.special = SpecialRequirement { enabled: true, text: "keep the hands visible".into() };
        let out = form.render_output();
        assert_eq!(out.kind, OutputKind::Structured);
        let (body, suffix) = out.text.rsplit_once("\n\n").unwrap();
        assert_eq!(suffix, "额外要求：keep the hands visible");
        let parsed: Value = serde_json::from_str(body).unwrap();
        assert!(parsed.get(keys::SPECIAL_REQUIREMENT).is_none());
        // The structured document still carries it for diffing.
        assert_eq!(form.to_document()[keys::SPECIAL_REQUIREMENT], json!("keep the hands visible"));
    }

    #[test]
    fn blank_special_requirement_adds_no_suffix() {
        let mut form = filled();
        form.special = SpecialRequirement { enabled: true, text: "  ".into() };
        assert!(form.render_output().text.ends_with('}'));
    }

    #[test]
    fn negative_prompt_composition() {
        let mut form = FormState::new();
        form.negative = NegativePrompt {
            enabled: true,
            elements: vec!["A".into(), "B".into()],
            styles: vec![],
        };
        assert_eq!(
            form.to_document()[keys::NEGATIVE_PROMPT],
            json!({"禁止元素": ["A", "B"], "禁止风格": []})
        );
    }

    #[test]
    fn line_art_presence_disables_other_controls() {
        let doc = json!({"线稿模式": {"启用": true, "提示词": "ink"}});
        let form = FormState::from_document(&doc);
        assert!(form.line_art.enabled);
        assert!(!form.is_enabled(Control::Field(FieldId::Lighting)));
        assert!(!form.is_enabled(Control::NegativeToggle));
        assert!(form.is_enabled(Control::SpecialText));
        assert!(form.is_enabled(Control::LineArtPrompt));
        assert_eq!(form.disabled_controls().len(), Control::all().len() - 4);

        let off = FormState::from_document(&json!({"线稿模式": {"启用": false, "提示词": "ink"}}));
        assert!(!off.line_art.enabled);
        assert!(off.disabled_controls().is_empty());
    }

    #[test]
    fn mode_blocks_follow_the_current_document() {
        let current = json!({
            "画面气质": "热烈",
            "线稿模式": {"启用": true, "提示词": "ink"}
        });
        let mut proposed = json!({
            "画面气质": "静谧",
            "反向提示词": {"禁止元素": [], "禁止风格": []},
            "额外要求": ""
        });
        carry_mode_blocks(&current, &mut proposed, true);
        assert_eq!(proposed, json!({"画面气质": "静谧", "线稿模式": {"启用": true, "提示词": "ink"}}));

        let mut stray = json!({"线稿模式": {"启用": true, "提示词": "x"}});
        carry_mode_blocks(&json!({}), &mut stray, true);
        assert_eq!(stray, json!({}));
    }

    #[test]
    fn requested_mode_content_survives_reconciliation() {
        let current = json!({"额外要求": "", "反向提示词": {"禁止元素": [], "禁止风格": []}});
        let mut proposed = json!({
            "反向提示词": {"禁止元素": [], "禁止风格": []},
            "额外要求": ""
        });
        carry_mode_blocks(&current, &mut proposed, true);
        assert!(proposed.get(keys::NEGATIVE_PROMPT).is_some());
        assert!(proposed.get(keys::SPECIAL_REQUIREMENT).is_some());

        let mut asked = json!({"反向提示词": {"禁止元素": ["水印"]}, "额外要求": "no logos"});
        carry_mode_blocks(&json!({}), &mut asked, false);
        assert_eq!(asked[keys::NEGATIVE_PROMPT][keys::FORBIDDEN_ELEMENTS], json!(["水印"]));
        assert_eq!(asked[keys::SPECIAL_REQUIREMENT], json!("no logos"));
    }

    #[test]
    fn negative_lists_accept_comma_scalars() {
        let doc = json!({"反向提示词": {"禁止元素": "text, logo", "禁止风格": ["cartoon", ""]}});
        let form = FormState::from_document(&doc);
        assert_eq!(form.negative.elements, vec!["text", "logo"]);
        assert_eq!(form.negative.styles, vec!["cartoon"]);
    }
}
