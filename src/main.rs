use anyhow::Result;

use ai_grading::utils::logging;
use ai_grading::{
    load_settings_file, normalize_settings, GradingOrchestrator, RuntimeConfig, ScoringRequest,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置：环境变量提供凭证，SETTINGS_FILE 可选地提供设置补丁
    let runtime = RuntimeConfig::from_env();
    let settings = match std::env::var("SETTINGS_FILE") {
        Ok(path) => load_settings_file(&path).await?,
        Err(_) => normalize_settings(&serde_json::Value::Null),
    };

    // 命令行参数：题目 答案 [满分]
    let mut args = std::env::args().skip(1);
    let (question, answer) = match (args.next(), args.next()) {
        (Some(q), Some(a)) => (q, a),
        _ => {
            eprintln!("用法: ai_grading <题目> <学生答案> [满分]");
            eprintln!("示例: ai_grading \"中国的首都是哪里？\" \"北京\" 10");
            std::process::exit(2);
        }
    };
    let max_score: u32 = args.next().and_then(|v| v.parse().ok()).unwrap_or(100);

    logging::log_startup(&settings);

    let orchestrator = GradingOrchestrator::from_settings(settings, runtime);
    let request = ScoringRequest::text(question, answer, max_score);
    let result = orchestrator.submit_grading_request(request).await?;

    logging::log_grading_result(&result);
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
