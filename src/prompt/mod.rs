use serde_json::{json, Value};

use crate::document::{canonicalize, keys, set_path, Encoding, DESCRIPTORS};

/// Empty document listing every field, shown to the model as the schema.
fn schema_skeleton() -> String {
    let mut doc = json!({});
    for d in DESCRIPTORS {
        let empty = match d.encoding {
            Encoding::Scalar => json!(""),
            Encoding::Array => json!([]),
        };
        set_path(&mut doc, d.path, empty);
    }
    set_path(&mut doc, &[keys::NEGATIVE_PROMPT, keys::FORBIDDEN_ELEMENTS], json!([]));
    set_path(&mut doc, &[keys::NEGATIVE_PROMPT, keys::FORBIDDEN_STYLES], json!([]));
    set_path(&mut doc, &[keys::SPECIAL_REQUIREMENT], json!(""));
    serde_json::to_string_pretty(&canonicalize(doc)).unwrap_or_default()
}

fn output_rules() -> &'static str {
r#"输出规则：
- 只输出一个 JSON 对象，可以放在 ```json 代码块中，不要附加解释。
- 键名必须使用下面结构中的中文键，不要翻译或改名。
- 所有值使用简洁、具体、可视化的描述；不确定的字段留空字符串。
- "材质真实度" 与 "反向提示词" 中的列表使用 JSON 数组。
- 不要输出 "线稿模式" 字段。"#
}

pub fn system_prompt_generate() -> String {
    format!(
        "你是一名专业的图像提示词工程师，负责把用户的描述或参考图片整理成结构化的 JSON 提示词。\n\n{}\n\nJSON 结构：\n{}",
        output_rules(),
        schema_skeleton()
    )
}

pub fn system_prompt_modify() -> String {
    format!(
        "你是一名专业的图像提示词工程师。用户会给出当前的 JSON 提示词和修改要求，\
你需要在保留未提及内容的前提下，只修改与要求相关的字段，并返回完整的修改后 JSON。\n\n{}\n\nJSON 结构：\n{}",
        output_rules(),
        schema_skeleton()
    )
}

pub fn user_text_generate(instruction: &str, has_images: bool) -> String {
    let instruction = instruction.trim();
    match (instruction.is_empty(), has_images) {
        (false, true) => format!("请根据以下描述和参考图片生成提示词：\n\n{instruction}"),
        (false, false) => format!("请根据以下描述生成提示词：\n\n{instruction}"),
        (true, _) => "请根据参考图片生成提示词。".to_string(),
    }
}

pub fn user_text_modify(current_document: &str, request: &str) -> String {
    format!("当前提示词：\n{current_document}\n\n修改要求：{request}\n\n请返回修改后的JSON提示词:")
}

/// Chat message content: plain text, or image parts followed by the text.
pub fn user_content(text: String, images: &[String]) -> Value {
    if images.is_empty() {
        return Value::String(text);
    }
    let mut parts: Vec<Value> = images
        .iter()
        .map(|url| json!({ "type": "image_url", "image_url": { "url": url } }))
        .collect();
    parts.push(json!({ "type": "text", "text": text }));
    Value::Array(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_wording_depends_on_inputs() {
        assert!(user_text_generate("海边少女", true).starts_with("请根据以下描述和参考图片生成提示词"));
        assert!(user_text_generate("海边少女", false).ends_with("海边少女"));
        assert_eq!(user_text_generate("  ", true), "请根据参考图片生成提示词。");
    }

    #[test]
    fn images_precede_text() {
        let content = user_content("t".into(), &["data:image/png;base64,AA".into()]);
        assert_eq!(content[0]["type"], "image_url");
        assert_eq!(content[1]["text"], "t");
        assert_eq!(user_content("t".into(), &[]), json!("t"));
    }

    #[test]
    fn system_prompts_carry_the_schema() {
        let p = system_prompt_generate();
        assert!(p.contains(keys::MATERIAL_REALISM));
        assert!(p.contains(keys::FORBIDDEN_STYLES));
        assert!(system_prompt_modify().contains("修改要求"));
    }
}
