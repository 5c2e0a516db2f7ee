//! Canonical prompt document: key names, field descriptors and the tree
//! navigation helpers shared by the mapper, the patch applier and the
//! suggestion index.

use serde_json::{Map, Value};

/// A canonical prompt document. Always a JSON object at the top level once
/// produced by the mapper; readers tolerate anything.
pub type Document = Value;

pub mod keys {
    pub const STYLE_MODE: &str = "风格模式";
    pub const ATMOSPHERE: &str = "画面气质";
    pub const SCENE: &str = "场景";
    pub const ENVIRONMENT: &str = "环境";
    pub const LOCATION: &str = "地点设定";
    pub const LIGHTING: &str = "光线";
    pub const WEATHER: &str = "天气氛围";
    pub const SUBJECT: &str = "主体";
    pub const DESCRIPTION: &str = "整体描述";
    pub const APPEARANCE: &str = "外形特征";
    pub const BODY: &str = "身材";
    pub const FACE: &str = "面部";
    pub const HAIR: &str = "头发";
    pub const EYES: &str = "眼睛";
    pub const EXPRESSION: &str = "表情与动作";
    pub const EMOTION: &str = "情绪";
    pub const ACTION: &str = "动作";
    pub const CLOTHING: &str = "服装";
    pub const WEAR: &str = "穿着";
    pub const ACCESSORIES: &str = "配饰";
    pub const BACKGROUND: &str = "背景";
    pub const BACKGROUND_DESCRIPTION: &str = "描述";
    pub const CAMERA: &str = "相机";
    pub const ANGLE: &str = "机位角度";
    pub const COMPOSITION: &str = "构图";
    pub const LENS: &str = "镜头特性";
    pub const SENSOR_QUALITY: &str = "传感器画质";
    pub const AESTHETIC: &str = "审美控制";
    pub const INTENT: &str = "呈现意图";
    pub const MATERIAL_REALISM: &str = "材质真实度";
    pub const COLOR_STYLE: &str = "色彩风格";
    pub const OVERALL_TONE: &str = "整体色调";
    pub const CONTRAST: &str = "对比度";
    pub const SPECIAL_EFFECTS: &str = "特殊效果";
    pub const FRAMING: &str = "画幅设置";

    pub const SPECIAL_REQUIREMENT: &str = "额外要求";
    pub const LINE_ART: &str = "线稿模式";
    pub const LINE_ART_ENABLED: &str = "启用";
    pub const LINE_ART_PROMPT: &str = "提示词";
    pub const NEGATIVE_PROMPT: &str = "反向提示词";
    pub const FORBIDDEN_ELEMENTS: &str = "禁止元素";
    pub const FORBIDDEN_STYLES: &str = "禁止风格";
}

use keys::*;

/// Top-level ordering used when a document is written out.
pub const TOP_LEVEL_ORDER: &[&str] = &[
    STYLE_MODE,
    ATMOSPHERE,
    SCENE,
    CAMERA,
    AESTHETIC,
    FRAMING,
    NEGATIVE_PROMPT,
    SPECIAL_REQUIREMENT,
    LINE_ART,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldId {
    StyleMode,
    Atmosphere,
    Location,
    Lighting,
    Weather,
    Description,
    BodyShape,
    Face,
    Hair,
    Eyes,
    Emotion,
    Action,
    Clothing,
    Accessories,
    Background,
    Angle,
    Composition,
    Lens,
    SensorQuality,
    Intent,
    MaterialRealism,
    OverallTone,
    Contrast,
    SpecialEffects,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Scalar,
    /// Comma-separated on the form, JSON array in the document.
    Array,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub field: FieldId,
    pub name: &'static str,
    pub path: &'static [&'static str],
    pub encoding: Encoding,
}

const fn scalar(field: FieldId, name: &'static str, path: &'static [&'static str]) -> FieldDescriptor {
    FieldDescriptor { field, name, path, encoding: Encoding::Scalar }
}

/// Every form field and where it lives. Order here is the insertion order of
/// the generated document, so nested objects come out in form order.
pub const DESCRIPTORS: &[FieldDescriptor] = &[
    scalar(FieldId::StyleMode, "style-mode", &[STYLE_MODE]),
    scalar(FieldId::Atmosphere, "atmosphere", &[ATMOSPHERE]),
    scalar(FieldId::Location, "location", &[SCENE, ENVIRONMENT, LOCATION]),
    scalar(FieldId::Lighting, "lighting", &[SCENE, ENVIRONMENT, LIGHTING]),
    scalar(FieldId::Weather, "weather", &[SCENE, ENVIRONMENT, WEATHER]),
    scalar(FieldId::Description, "description", &[SCENE, SUBJECT, DESCRIPTION]),
    scalar(FieldId::BodyShape, "body-shape", &[SCENE, SUBJECT, APPEARANCE, BODY]),
    scalar(FieldId::Face, "face", &[SCENE, SUBJECT, APPEARANCE, FACE]),
    scalar(FieldId::Hair, "hair", &[SCENE, SUBJECT, APPEARANCE, HAIR]),
    scalar(FieldId::Eyes, "eyes", &[SCENE, SUBJECT, APPEARANCE, EYES]),
    scalar(FieldId::Emotion, "emotion", &[SCENE, SUBJECT, EXPRESSION, EMOTION]),
    scalar(FieldId::Action, "action", &[SCENE, SUBJECT, EXPRESSION, ACTION]),
    scalar(FieldId::Clothing, "clothing", &[SCENE, SUBJECT, CLOTHING, WEAR]),
    scalar(FieldId::Accessories, "accessories", &[SCENE, SUBJECT, ACCESSORIES]),
    scalar(FieldId::Background, "background", &[SCENE, BACKGROUND, BACKGROUND_DESCRIPTION]),
    scalar(FieldId::Angle, "angle", &[CAMERA, ANGLE]),
    scalar(FieldId::Composition, "composition", &[CAMERA, COMPOSITION]),
    scalar(FieldId::Lens, "lens", &[CAMERA, LENS]),
    scalar(FieldId::SensorQuality, "sensor-quality", &[CAMERA, SENSOR_QUALITY]),
    scalar(FieldId::Intent, "intent", &[AESTHETIC, INTENT]),
    FieldDescriptor {
        field: FieldId::MaterialRealism,
        name: "material-realism",
        path: &[AESTHETIC, MATERIAL_REALISM],
        encoding: Encoding::Array,
    },
    scalar(FieldId::OverallTone, "overall-tone", &[AESTHETIC, COLOR_STYLE, OVERALL_TONE]),
    scalar(FieldId::Contrast, "contrast", &[AESTHETIC, COLOR_STYLE, CONTRAST]),
    scalar(FieldId::SpecialEffects, "special-effects", &[AESTHETIC, COLOR_STYLE, SPECIAL_EFFECTS]),
];

impl FieldId {
    pub fn descriptor(self) -> &'static FieldDescriptor {
        // DESCRIPTORS is declared in enum order.
        &DESCRIPTORS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn path(self) -> &'static [&'static str] {
        self.descriptor().path
    }

    pub fn from_name(name: &str) -> Option<FieldId> {
        DESCRIPTORS.iter().find(|d| d.name == name).map(|d| d.field)
    }

    pub fn all() -> impl Iterator<Item = FieldId> {
        DESCRIPTORS.iter().map(|d| d.field)
    }
}

/// Read-only view of a location in a document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Scalar(&'a Value),
    Absent,
}

impl<'a> Node<'a> {
    pub fn of(value: Option<&'a Value>) -> Node<'a> {
        match value {
            None | Some(Value::Null) => Node::Absent,
            Some(Value::Object(m)) => Node::Object(m),
            Some(Value::Array(a)) => Node::Array(a),
            Some(v) => Node::Scalar(v),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Node::Absent)
    }

    /// Form text for this node; anything that is not text-like reads as "".
    pub fn to_text(&self) -> String {
        match self {
            Node::Scalar(Value::String(s)) => s.clone(),
            Node::Scalar(v) => v.to_string(),
            Node::Array(items) => join_list(items),
            Node::Object(_) | Node::Absent => String::new(),
        }
    }
}

/// Walk `path` from `root`. Missing keys and non-object intermediates are Absent.
pub fn lookup<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Node<'a> {
    let mut current = root;
    for key in path {
        match current {
            Value::Object(map) => match map.get(key.as_ref()) {
                Some(next) => current = next,
                None => return Node::Absent,
            },
            _ => return Node::Absent,
        }
    }
    Node::of(Some(current))
}

pub fn read_text<S: AsRef<str>>(root: &Value, path: &[S]) -> String {
    lookup(root, path).to_text()
}

/// Set `value` at `path`, creating (or replacing non-object) intermediates.
pub fn set_path<S: AsRef<str>>(root: &mut Value, path: &[S], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };
    let mut current = root;
    for key in parents {
        current = ensure_object(current)
            .entry(key.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(last.as_ref().to_string(), value);
}

/// Remove the key at `path`. Missing intermediates are left alone.
pub fn remove_path<S: AsRef<str>>(root: &mut Value, path: &[S]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut current = root;
    for key in parents {
        current = current.as_object_mut()?.get_mut(key.as_ref())?;
    }
    current.as_object_mut()?.shift_remove(last.as_ref())
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}

/// Split a comma-separated form value into trimmed, non-empty tokens.
/// Blank input gives an empty list; input made only of delimiters falls back
/// to a single-element list holding the trimmed input.
pub fn split_list(input: &str) -> Vec<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let tokens: Vec<String> = trimmed
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        vec![trimmed.to_string()]
    } else {
        tokens
    }
}

pub fn join_list(items: &[Value]) -> String {
    items
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reorder top-level keys into the canonical order; unknown keys keep their
/// relative order after the known ones. Non-objects are returned unchanged.
pub fn canonicalize(doc: Document) -> Document {
    let Value::Object(mut map) = doc else {
        return doc;
    };
    let mut ordered = Map::new();
    for key in TOP_LEVEL_ORDER {
        if let Some(v) = map.shift_remove(*key) {
            ordered.insert((*key).to_string(), v);
        }
    }
    for (k, v) in map {
        ordered.insert(k, v);
    }
    Value::Object(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptors_follow_enum_order() {
        for (i, d) in DESCRIPTORS.iter().enumerate() {
            assert_eq!(d.field as usize, i, "{} out of order", d.name);
        }
        assert_eq!(FieldId::from_name("lighting"), Some(FieldId::Lighting));
        assert_eq!(FieldId::from_name("nope"), None);
    }

    #[test]
    fn lookup_tolerates_wrong_shapes() {
        let doc = json!({"场景": "just text", "相机": {"构图": null}});
        assert!(lookup(&doc, &["场景", "环境", "光线"]).is_absent());
        assert!(lookup(&doc, &["相机", "构图"]).is_absent());
        assert_eq!(read_text(&json!(42), &["a"]), "");
        assert_eq!(read_text(&json!({"a": ["x", "y"]}), &["a"]), "x, y");
    }

    #[test]
    fn set_path_builds_and_replaces_intermediates() {
        let mut doc = json!({"a": "scalar"});
        set_path(&mut doc, &["a", "b", "c"], json!(1));
        set_path(&mut doc, &["d"], json!("x"));
        assert_eq!(doc, json!({"a": {"b": {"c": 1}}, "d": "x"}));
    }

    #[test]
    fn remove_path_ignores_missing_parents() {
        let mut doc = json!({"a": {"b": 1, "c": 2}});
        assert_eq!(remove_path(&mut doc, &["a", "b"]), Some(json!(1)));
        assert_eq!(remove_path(&mut doc, &["x", "y"]), None);
        assert_eq!(doc, json!({"a": {"c": 2}}));
    }

    #[test]
    fn split_list_rules() {
        assert!(split_list("   ").is_empty());
        assert_eq!(split_list("skin pores, fabric ,, metal"), vec!["skin pores", "fabric", "metal"]);
        assert_eq!(split_list("single"), vec!["single"]);
        assert_eq!(split_list(" , , "), vec![", ,"]);
    }

    #[test]
    fn canonicalize_orders_known_keys_first() {
        let doc = json!({"extra": 1, "审美控制": {}, "风格模式": "x", "反向提示词": {}});
        let keys: Vec<String> = canonicalize(doc).as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["风格模式", "审美控制", "反向提示词", "extra"]);
    }
}
