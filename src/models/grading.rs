//! 评分请求与评分结果 - 模型层

use serde::{Deserialize, Serialize};

/// 学生答案内容
///
/// 上游（扩展面板/导入层）已经完成 OCR 或截图，
/// 这里只区分纯文本和图片引用两种形态。
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerPayload {
    /// 文本答案
    Text(String),
    /// 图片答案（URL 引用）
    Image { url: String },
}

/// 一次评分请求
///
/// 由调用方构造并持有，每次评分一个。
#[derive(Debug, Clone)]
pub struct ScoringRequest {
    /// 题目内容
    pub question_text: String,
    /// 本题满分
    pub max_score: u32,
    /// 学生答案
    pub answer: AnswerPayload,
    /// 调用方自定义提示词模板（可选），
    /// 支持 `{{question}}` 与 `{{maxScore}}` 占位符
    pub template: Option<String>,
}

impl ScoringRequest {
    /// 构造一个纯文本答案的评分请求
    pub fn text(
        question_text: impl Into<String>,
        answer: impl Into<String>,
        max_score: u32,
    ) -> Self {
        Self {
            question_text: question_text.into(),
            max_score,
            answer: AnswerPayload::Text(answer.into()),
            template: None,
        }
    }

    /// 构造一个图片答案的评分请求
    pub fn image(
        question_text: impl Into<String>,
        image_url: impl Into<String>,
        max_score: u32,
    ) -> Self {
        Self {
            question_text: question_text.into(),
            max_score,
            answer: AnswerPayload::Image {
                url: image_url.into(),
            },
            template: None,
        }
    }

    /// 附加自定义模板
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// 规范化后的评分结果
///
/// 每次成功的请求恰好产生一个，构造后不再修改。
/// 字段约束由解析器保证：score ∈ [0, max_score]，confidence ∈ [0, 1]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    /// 得分（整数）
    pub score: u32,
    /// 满分
    pub max_score: u32,
    /// 模型置信度
    pub confidence: f64,
    /// 评分理由
    pub reasoning: String,
    /// 分维度得分，按模型返回原样透传
    #[serde(default)]
    pub dimensions: serde_json::Map<String, serde_json::Value>,
}
