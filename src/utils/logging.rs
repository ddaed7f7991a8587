//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use anyhow::Result;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::models::GradingResult;

/// 初始化 tracing 日志输出
///
/// 日志级别取自 `RUST_LOG` 环境变量，缺省为 info。
/// 重复调用是安全的（测试里会多次初始化）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n评分处理日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(settings: &Settings) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - AI 阅卷编排模式");
    info!("📊 默认模型: {}", settings.default_model);
    info!("📋 候选链: {}", settings.model_chain().join(" → "));
    info!("{}", "=".repeat(60));
}

/// 输出单次评分结果摘要
pub fn log_grading_result(result: &GradingResult) {
    info!("{}", "─".repeat(60));
    info!(
        "✅ 评分完成: {}/{} (置信度 {:.2})",
        result.score, result.max_score, result.confidence
    );
    info!("💬 理由: {}", truncate_text(&result.reasoning, 120));
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("一二三四五", 3), "一二三...");
    }
}
