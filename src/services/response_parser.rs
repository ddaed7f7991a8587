//! 响应解析与规范化 - 业务能力层
//!
//! 把提取出的文本转成规范的评分结果：优先走严格 JSON 解析，
//! 失败时退回正则启发式。本模块永远不返回错误——
//! 解析彻底失败时降级为低置信度的启发式结果，而不是让调用方失败。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::models::GradingResult;

/// 无信号时的兜底得分比例（占满分）
///
/// 模型输出完全解析不出分数时，按满分的 75% 给出保守估计，
/// 让阅卷流程能继续走人工复核，而不是中断。
pub const NO_SIGNAL_SCORE_RATIO: f64 = 0.75;

/// 兜底置信度
pub const DEFAULT_CONFIDENCE: f64 = 0.85;

/// 兜底评分理由
pub const FALLBACK_REASONING: &str = "评分完成";

/// 正则兜底：一小段数字，后面可跟"分"
static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,4})\s*分?").expect("分数正则不合法"));

/// 把模型回复文本解析为规范评分结果
///
/// # 参数
/// - `text`: 提取出的回复文本（可为空串）
/// - `max_score`: 本题满分
///
/// # 返回
/// 永远返回字段齐全的 [`GradingResult`]：
/// score ∈ [0, max_score]，confidence ∈ [0, 1]，绝不 panic。
pub fn parse_scoring_response(text: &str, max_score: u32) -> GradingResult {
    let text = text.trim();

    if let Some(slice) = locate_json(text) {
        if let Ok(value) = serde_json::from_str::<Value>(slice) {
            if value.is_object() {
                return from_json_object(&value, max_score);
            }
        }
        debug!("JSON 片段解析失败，退回正则启发式");
    }

    from_plain_text(text, max_score)
}

/// 截取第一个 `{` 到最后一个 `}` 之间的候选 JSON 片段
fn locate_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// JSON 主路径：逐字段校验并钳制
fn from_json_object(value: &Value, max_score: u32) -> GradingResult {
    let score = match value.get("score").and_then(coerce_number) {
        Some(n) => clamp_score(n, max_score),
        None => no_signal_score(max_score),
    };

    let confidence = value
        .get("confidence")
        .and_then(coerce_number)
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(FALLBACK_REASONING)
        .to_string();

    let dimensions = value
        .get("dimensions")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    GradingResult {
        score,
        max_score,
        confidence,
        reasoning,
        dimensions,
    }
}

/// 正则兜底路径
///
/// 提取到 0 分时同样按"无信号"处理：正则路径区分不了
/// 真实的零分和解析失败，是一处已知歧义。
fn from_plain_text(text: &str, max_score: u32) -> GradingResult {
    let extracted = SCORE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());

    let score = match extracted {
        Some(n) if n > 0 => n.min(max_score),
        _ => no_signal_score(max_score),
    };

    let reasoning = if text.is_empty() {
        FALLBACK_REASONING.to_string()
    } else {
        text.to_string()
    };

    GradingResult {
        score,
        max_score,
        confidence: DEFAULT_CONFIDENCE,
        reasoning,
        dimensions: serde_json::Map::new(),
    }
}

/// 数值强制转换：数字直接用，数字字符串也接受
fn coerce_number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

/// 得分取整并钳制到 [0, max_score]
fn clamp_score(n: f64, max_score: u32) -> u32 {
    if !n.is_finite() {
        return no_signal_score(max_score);
    }
    (n.round().max(0.0) as u64).min(u64::from(max_score)) as u32
}

/// 无信号兜底得分
fn no_signal_score(max_score: u32) -> u32 {
    (f64::from(max_score) * NO_SIGNAL_SCORE_RATIO).round() as u32
}
