//! 响应提取 - 业务能力层
//!
//! 各家提供商返回的原始负载形状互不相同又部分重叠：
//! 有的把内容直接放在 `choices[0].message.content` 字符串里，
//! 有的放成分段数组，DashScope 类又整体包了一层 `output`。
//! 本模块按固定优先级逐个尝试，取第一个非空结果。

use serde_json::Value;

/// 从原始提供商负载中尽力提取文本内容
///
/// 按顺序尝试以下形状，第一个非空者胜出：
/// 1. `choices[0].message.content` 为字符串
/// 2. `choices[0].message.content` 为分段数组（只取 `type == "text"` 的段）
/// 3. `output.choices[0].message.content` 为分段数组
///
/// 任何一条路径上的字段缺失都只当作"该形状不匹配"，
/// 全部落空时返回空字符串，绝不 panic——
/// 下游解析器对空输入有自己的兜底。
pub fn extract_text(raw: &Value) -> String {
    if let Some(text) = extract_content_string(raw) {
        return text;
    }
    if let Some(text) = extract_content_parts(raw) {
        return text;
    }
    if let Some(text) = extract_output_parts(raw) {
        return text;
    }
    String::new()
}

/// 形状 1：content 直接是字符串
fn extract_content_string(raw: &Value) -> Option<String> {
    let content = raw
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?;
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// 形状 2：content 是分段数组，拼接 type == "text" 的段
fn extract_content_parts(raw: &Value) -> Option<String> {
    let parts = raw
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_array()?;

    let text = parts
        .iter()
        .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 形状 3：DashScope 类，整体包在 output 下，段内缺失的 text 按空串处理
fn extract_output_parts(raw: &Value) -> Option<String> {
    let parts = raw
        .get("output")?
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_array()?;

    let text = parts
        .iter()
        .map(|p| p.get("text").and_then(Value::as_str).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_direct_content_string() {
        let raw = json!({
            "choices": [{ "message": { "content": "得分 90" } }]
        });
        assert_eq!(extract_text(&raw), "得分 90");
    }

    #[test]
    fn extracts_typed_text_parts() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": [
                        { "type": "text", "text": "第一段" },
                        { "type": "image_url", "image_url": { "url": "x" } },
                        { "type": "text", "text": "第二段" }
                    ]
                }
            }]
        });
        assert_eq!(extract_text(&raw), "第一段\n第二段");
    }

    #[test]
    fn extracts_output_wrapped_parts() {
        let raw = json!({
            "output": {
                "choices": [{
                    "message": {
                        "content": [
                            { "text": "  评分结果" },
                            { "other": 1 },
                            { "text": "理由  " }
                        ]
                    }
                }]
            }
        });
        assert_eq!(extract_text(&raw), "评分结果\n\n理由");
    }

    #[test]
    fn first_nonempty_shape_wins() {
        // 同时具备形状 1 和形状 3 时取形状 1
        let raw = json!({
            "choices": [{ "message": { "content": "直接内容" } }],
            "output": { "choices": [{ "message": { "content": [{ "text": "包装内容" }] } }] }
        });
        assert_eq!(extract_text(&raw), "直接内容");
    }

    #[test]
    fn empty_string_falls_through() {
        let raw = json!({
            "choices": [{ "message": { "content": "" } }],
            "output": { "choices": [{ "message": { "content": [{ "text": "兜底" }] } }] }
        });
        assert_eq!(extract_text(&raw), "兜底");
    }

    #[test]
    fn garbage_payloads_return_empty() {
        for raw in [
            json!(null),
            json!("just a string"),
            json!({ "choices": [] }),
            json!({ "choices": [{ "message": {} }] }),
            json!({ "choices": [{ "message": { "content": 42 } }] }),
            json!({ "output": { "choices": [{ "message": { "content": [] } }] } }),
        ] {
            assert_eq!(extract_text(&raw), "", "负载 {:?} 应返回空串", raw);
        }
    }
}
