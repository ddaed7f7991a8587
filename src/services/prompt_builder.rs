//! 提示词构建 - 业务能力层
//!
//! 只负责把题目和评分要求拼成发给模型的文本，纯函数、无 I/O，
//! 可单独给前端做提示词预览。

use crate::utils::logging::truncate_text;

/// 固定模板下题目内容的字符预算
///
/// 固定模板自带大段输出约定，题目只保留较短的摘录。
pub const FIXED_QUESTION_BUDGET: usize = 800;

/// 自定义模板下题目内容的字符预算
///
/// 用户模板通常更精简，题目可以放得更长。
pub const TEMPLATE_QUESTION_BUDGET: usize = 2000;

/// 构建固定模板的评分提示词
///
/// # 参数
/// - `question_text`: 题目内容（超出预算的部分会被截断）
/// - `max_score`: 本题满分
///
/// # 返回
/// 返回完整的提示词文本，末尾带有 JSON 输出约定
pub fn build_scoring_prompt(question_text: &str, max_score: u32) -> String {
    let question = truncate_text(question_text, FIXED_QUESTION_BUDGET);
    let (accuracy, completeness, logic, norms) = dimension_ceilings(max_score);

    format!(
        r#"你是一位经验丰富的阅卷教师，请根据题目和评分标准对学生答案进行评分。

【题目】
{question}

【评分维度】
- 准确性（accuracy）：满分 {accuracy} 分，考察答案与标准答案的一致程度
- 完整性（completeness）：满分 {completeness} 分，考察要点覆盖是否齐全
- 逻辑性（logic）：满分 {logic} 分，考察论证与推理过程是否清晰
- 规范性（norms）：满分 {norms} 分，考察表述与格式是否规范

【输出要求】
只返回如下格式的 JSON，不要输出任何其他内容：
{{"score": <0到{max_score}的整数>, "maxScore": {max_score}, "confidence": <0到1的小数>, "reasoning": "<评分理由>", "dimensions": {{"accuracy": {{"score": 0, "maxScore": {accuracy}}}, "completeness": {{"score": 0, "maxScore": {completeness}}}, "logic": {{"score": 0, "maxScore": {logic}}}, "norms": {{"score": 0, "maxScore": {norms}}}}}}}"#
    )
}

/// 基于自定义模板构建评分提示词
///
/// 模板中的 `{{question}}` 与 `{{maxScore}}` 占位符会被全部替换。
/// 空白模板直接退回固定模板。
///
/// # 参数
/// - `template`: 用户自定义模板
/// - `question_text`: 题目内容
/// - `max_score`: 本题满分
/// - `force_json`: 模板没有任何 JSON 输出约定时，是否追加一段兜底约定
pub fn build_scoring_prompt_from_template(
    template: &str,
    question_text: &str,
    max_score: u32,
    force_json: bool,
) -> String {
    if template.trim().is_empty() {
        return build_scoring_prompt(question_text, max_score);
    }

    let question = truncate_text(question_text, TEMPLATE_QUESTION_BUDGET);
    let mut prompt = template
        .replace("{{question}}", &question)
        .replace("{{maxScore}}", &max_score.to_string());

    // 模板自己已经约定了输出格式时不再重复注入
    if force_json && !has_json_hint(&prompt) {
        prompt.push_str(&json_postscript(max_score));
    }

    prompt
}

/// 判断文本中是否已包含 JSON 输出约定
///
/// 提到 `score` 字段或 JSON 本身（中英文模板都按此识别）即视为已约定。
fn has_json_hint(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("score") || lower.contains("json")
}

/// 兜底的 JSON 输出约定
fn json_postscript(max_score: u32) -> String {
    format!(
        "\n\n请只返回 JSON，不要输出任何其他内容，至少包含以下字段：\
         {{\"score\": <0到{max_score}的整数>, \"maxScore\": {max_score}, \
         \"confidence\": <0到1的小数>, \"reasoning\": \"<评分理由>\"}}"
    )
}

/// 按满分计算四个维度的子分上限
///
/// 准确性 40%、完整性 30%、逻辑性 20%，规范性取余数，
/// 保证四项之和恰好等于满分。
fn dimension_ceilings(max_score: u32) -> (u32, u32, u32, u32) {
    let accuracy = max_score * 2 / 5;
    let completeness = max_score * 3 / 10;
    let logic = max_score / 5;
    let norms = max_score - accuracy - completeness - logic;
    (accuracy, completeness, logic, norms)
}
