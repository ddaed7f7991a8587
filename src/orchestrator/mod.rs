//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层是评分请求的"指挥中心"，把各能力串成完整流程：
//!
//! ```text
//! GradingOrchestrator (候选模型链 / 失败转移)
//!     ↓
//! scheduler::RequestScheduler (FIFO 队列 / 限速 / 重试)
//!     ↓
//! clients (提供商传输)
//!     ↓
//! services (提示词构建 → 响应提取 → 响应解析)
//! ```
//!
//! ## 设计原则
//!
//! 1. **每个提供商一个调度器**：限速互不干扰，无共享可变状态
//! 2. **解析永不失败**：模型输出畸形时降级为启发式结果
//! 3. **只有传输终态错误会到达调用方**

pub mod scheduler;

pub use scheduler::{DispatchResult, RequestScheduler, SchedulerConfig, SchedulerStats};

use std::collections::BTreeMap;

use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::clients::{PreparedRequest, ProviderClient, ProviderTransport};
use crate::config::{RuntimeConfig, Settings};
use crate::error::{ApiError, AppError, AppResult, LlmError};
use crate::models::{provider_of_model, AnswerPayload, GradingResult, ScoringRequest};
use crate::services::{
    build_scoring_prompt, build_scoring_prompt_from_template, extract_text, parse_scoring_response,
};

/// 评分编排器
///
/// 持有每个可用提供商的调度器，对外暴露
/// [`submit_grading_request`](GradingOrchestrator::submit_grading_request)
/// 作为调用方唯一入口。
pub struct GradingOrchestrator<T> {
    settings: Settings,
    schedulers: BTreeMap<String, RequestScheduler<T>>,
}

impl GradingOrchestrator<ProviderClient> {
    /// 按设置与运行期凭证构造编排器
    ///
    /// 只为持有 API 密钥的提供商创建调度器，
    /// 候选链里没有凭证的模型在失败转移时被跳过。
    pub fn from_settings(settings: Settings, runtime: RuntimeConfig) -> Self {
        let mut transports = BTreeMap::new();
        for p in crate::models::ProviderId::all() {
            let Some(api_key) = runtime.api_keys.get(p.id()).filter(|k| !k.is_empty()) else {
                debug!("提供商 {} 未配置密钥，跳过", p.id());
                continue;
            };
            let endpoint = settings.resolve_endpoint(*p);
            transports.insert(
                p.id().to_string(),
                ProviderClient::for_provider(*p, &endpoint, api_key),
            );
        }
        Self::with_transports(settings, &runtime, transports)
    }
}

impl<T: ProviderTransport + 'static> GradingOrchestrator<T> {
    /// 用现成的传输表构造编排器（测试用自定义传输也从这里进）
    pub fn with_transports(
        settings: Settings,
        runtime: &RuntimeConfig,
        transports: BTreeMap<String, T>,
    ) -> Self {
        let config = SchedulerConfig {
            min_interval: Duration::from_millis(runtime.min_request_interval_ms),
            retry_base_delay: Duration::from_millis(runtime.retry_base_delay_ms),
            max_attempts: runtime.max_attempts.max(1),
        };

        let schedulers = transports
            .into_iter()
            .map(|(id, transport)| (id, RequestScheduler::new(transport, config.clone())))
            .collect();

        Self {
            settings,
            schedulers,
        }
    }

    /// 当前生效的设置
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 某提供商的调度统计
    pub fn scheduler_stats(&self, provider_id: &str) -> Option<SchedulerStats> {
        self.schedulers.get(provider_id).map(|s| s.stats())
    }

    /// 提交一次评分请求
    ///
    /// 按候选模型链依次尝试：默认模型在前，其后是优先级列表。
    /// 单个模型内部的瞬时失败由调度器退避重试；
    /// 模型终态失败（重试耗尽 / 认证失败 / 请求格式错误）时
    /// 转移到下一个有凭证的模型，全部失败才向调用方报错。
    pub async fn submit_grading_request(
        &self,
        request: ScoringRequest,
    ) -> AppResult<GradingResult> {
        let chain = self.settings.model_chain();
        let mut last_error: Option<ApiError> = None;

        for model in &chain {
            let Some(provider) = provider_of_model(model) else {
                continue;
            };
            let Some(scheduler) = self.schedulers.get(provider.id()) else {
                debug!("模型 {} 所属提供商 {} 不可用，跳过", model, provider.id());
                continue;
            };

            info!("🤖 使用 {} ({}) 进行评分...", model, provider.label());
            let prepared = self.prepare(model, &request);
            let receiver = scheduler.submit(prepared);

            match receiver.await {
                Ok(Ok(payload)) => {
                    let text = extract_text(&payload);
                    let result = parse_scoring_response(&text, request.max_score);
                    info!(
                        "✓ 评分完成: {}/{} (置信度 {:.2})",
                        result.score, result.max_score, result.confidence
                    );
                    return Ok(result);
                }
                Ok(Err(err)) => {
                    warn!("⚠️ 模型 {} 调用失败，尝试下一个候选: {}", model, err);
                    last_error = Some(err);
                }
                Err(_) => {
                    // 调度器在结算前被整体丢弃才会走到这里
                    warn!("⚠️ 模型 {} 的调度器提前关闭", model);
                    last_error = Some(ApiError::RequestFailed {
                        endpoint: provider.id().to_string(),
                        message: "调度器提前关闭".to_string(),
                    });
                }
            }
        }

        match last_error {
            Some(err) => Err(AppError::Llm(LlmError::AllModelsFailed {
                last_error: err.to_string(),
            })),
            None => Err(AppError::Llm(LlmError::MissingCredentials {
                model: self.settings.default_model.clone(),
            })),
        }
    }

    /// 把评分请求装配成出站请求
    fn prepare(&self, model: &str, request: &ScoringRequest) -> PreparedRequest {
        let system_prompt = match request.template.as_deref() {
            Some(template) if !template.trim().is_empty() => build_scoring_prompt_from_template(
                template,
                &request.question_text,
                request.max_score,
                true,
            ),
            _ => build_scoring_prompt(&request.question_text, request.max_score),
        };

        let (user_text, image_urls) = match &request.answer {
            AnswerPayload::Text(text) => (format!("学生答案：\n{}", text), Vec::new()),
            AnswerPayload::Image { url } => {
                ("学生答案见图片。".to_string(), vec![url.clone()])
            }
        };

        PreparedRequest {
            model: model.to_string(),
            params: self.settings.resolve_params(model),
            system_prompt,
            user_text,
            image_urls,
        }
    }
}
