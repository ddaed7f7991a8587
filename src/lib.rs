//! # AI Grading
//!
//! 一个多提供商 AI 阅卷请求编排核心
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 配置层（Config / Models）
//! - `config` - 设置聚合、深合并、运行期凭证
//! - `models/provider` - 静态提供商注册表与模型目录
//! - `models/grading` - 评分请求与规范化评分结果
//!
//! ### ② 业务能力层（Services）
//! - `services/prompt_builder` - 题目 + 评分标准 → 提示词
//! - `services/response_extractor` - 异构原始负载 → 文本
//! - `services/response_parser` - 文本 → 规范评分结果（永不失败）
//!
//! ### ③ 传输层（Clients）
//! - `clients/provider_client` - 各提供商的出站调用与错误归类
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scheduler` - FIFO 队列、限速闸、退避重试
//! - `orchestrator` - 候选模型链与失败转移
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use clients::{PreparedRequest, ProviderClient, ProviderTransport};
pub use config::{
    default_settings, load_settings_file, merge_settings, normalize_settings, RuntimeConfig,
    Settings,
};
pub use error::{ApiError, AppError, AppResult, ConfigError, LlmError};
pub use models::{
    AnswerPayload, GradingResult, ModelParams, ProviderDescriptor, ProviderId, ScoringRequest,
};
pub use orchestrator::{GradingOrchestrator, RequestScheduler, SchedulerConfig};
pub use services::{
    build_scoring_prompt, build_scoring_prompt_from_template, extract_text, parse_scoring_response,
};
