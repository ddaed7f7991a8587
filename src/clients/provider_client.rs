//! 提供商 API 客户端 - 传输层
//!
//! 封装各家提供商的出站调用细节：请求体怎么拼、鉴权头怎么带、
//! 错误响应怎么归类。OpenAI 兼容端点（OpenAI / Gemini / GLM）
//! 走 `async-openai`，通义千问走 DashScope 原生协议（reqwest）。
//!
//! 调度器只通过 [`ProviderTransport`] 这个接缝使用本模块，
//! 测试可以替换成脚本化的假传输。

use std::future::Future;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::models::{ModelParams, ProviderId};

/// 已就绪的出站请求
///
/// 提示词构建和参数解析都已完成，传输层只负责发出去。
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// 目标模型
    pub model: String,
    /// 调用参数
    pub params: ModelParams,
    /// 系统消息（评分提示词）
    pub system_prompt: String,
    /// 用户消息文本（学生答案）
    pub user_text: String,
    /// 答案图片 URL 列表（视觉评分时非空）
    pub image_urls: Vec<String>,
}

/// 提供商传输接缝
///
/// 成功时返回提供商的原始 JSON 负载，交由响应提取器处理；
/// 失败时返回已归类的 [`ApiError`]，调度器据此决定是否重试。
pub trait ProviderTransport: Send + Sync {
    fn send(
        &self,
        request: &PreparedRequest,
    ) -> impl Future<Output = Result<Value, ApiError>> + Send;
}

impl<T: ProviderTransport> ProviderTransport for std::sync::Arc<T> {
    fn send(
        &self,
        request: &PreparedRequest,
    ) -> impl Future<Output = Result<Value, ApiError>> + Send {
        (**self).send(request)
    }
}

/// 具体的提供商客户端
pub enum ProviderClient {
    /// OpenAI 兼容端点（OpenAI / Gemini / GLM）
    OpenAiCompat {
        client: Client<OpenAIConfig>,
        endpoint: String,
    },
    /// DashScope 原生协议（通义千问）
    DashScope {
        http: reqwest::Client,
        endpoint: String,
        api_key: String,
    },
}

impl ProviderClient {
    /// 按提供商构造客户端
    pub fn for_provider(provider: ProviderId, endpoint: &str, api_key: &str) -> Self {
        match provider {
            ProviderId::Qwen => ProviderClient::DashScope {
                http: reqwest::Client::new(),
                endpoint: endpoint.to_string(),
                api_key: api_key.to_string(),
            },
            _ => {
                let config = OpenAIConfig::new()
                    .with_api_key(api_key)
                    .with_api_base(endpoint);
                ProviderClient::OpenAiCompat {
                    client: Client::with_config(config),
                    endpoint: endpoint.to_string(),
                }
            }
        }
    }

    /// OpenAI 兼容调用
    async fn send_openai_compat(
        client: &Client<OpenAIConfig>,
        endpoint: &str,
        request: &PreparedRequest,
    ) -> Result<Value, ApiError> {
        debug!("调用 OpenAI 兼容 API，模型: {}", request.model);

        let mut messages = Vec::new();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_prompt.as_str())
            .build()
            .map_err(|e| ApiError::MalformedRequest {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        // 构建用户消息（答案带图片时走 Vision 分段格式）
        let user_msg = if request.image_urls.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user_text.as_str())
                .build()
        } else {
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();

            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: request.user_text.clone(),
                },
            ));

            for url in &request.image_urls {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }

            debug!("使用 Vision 格式，包含 {} 张图片", request.image_urls.len());

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
        }
        .map_err(|e| ApiError::MalformedRequest {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model)
            .messages(messages)
            .temperature(request.params.temperature)
            .max_tokens(request.params.max_tokens);
        if let Some(top_p) = request.params.top_p {
            args.top_p(top_p);
        }
        let chat_request = args.build().map_err(|e| ApiError::MalformedRequest {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let timeout = Duration::from_millis(request.params.timeout_ms);
        let response = tokio::time::timeout(timeout, client.chat().create(chat_request))
            .await
            .map_err(|_| {
                warn!("LLM API 调用超时 ({}ms)", request.params.timeout_ms);
                ApiError::RequestFailed {
                    endpoint: endpoint.to_string(),
                    message: format!("请求超时 ({}ms)", request.params.timeout_ms),
                }
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                classify_error_text(endpoint, &e.to_string())
            })?;

        serde_json::to_value(&response).map_err(|e| ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            message: format!("响应序列化失败: {}", e),
        })
    }

    /// DashScope 原生调用
    async fn send_dashscope(
        http: &reqwest::Client,
        endpoint: &str,
        api_key: &str,
        request: &PreparedRequest,
    ) -> Result<Value, ApiError> {
        debug!("调用 DashScope API，模型: {}", request.model);

        // DashScope 不走分段格式，图片 URL 以文本形式并入用户消息
        let mut user_text = request.user_text.clone();
        for (i, url) in request.image_urls.iter().enumerate() {
            user_text.push_str(&format!("\n图片 {}: {}", i + 1, url));
        }

        let mut parameters = json!({
            "temperature": request.params.temperature,
            "max_tokens": request.params.max_tokens,
            "result_format": "message",
        });
        if let Some(top_p) = request.params.top_p {
            parameters["top_p"] = json!(top_p);
        }

        let body = json!({
            "model": request.model,
            "input": {
                "messages": [
                    { "role": "system", "content": request.system_prompt },
                    { "role": "user", "content": user_text },
                ]
            },
            "parameters": parameters,
        });

        let response = http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(Duration::from_millis(request.params.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                warn!("DashScope 请求失败: {}", e);
                ApiError::RequestFailed {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let message = response.text().await.ok();
            warn!("DashScope 返回错误响应: HTTP {}", status);
            return Err(classify_http_status(
                endpoint,
                status.as_u16(),
                retry_after,
                message,
            ));
        }

        response.json::<Value>().await.map_err(|e| ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            message: format!("响应解析失败: {}", e),
        })
    }
}

impl ProviderTransport for ProviderClient {
    async fn send(&self, request: &PreparedRequest) -> Result<Value, ApiError> {
        match self {
            ProviderClient::OpenAiCompat { client, endpoint } => {
                Self::send_openai_compat(client, endpoint, request).await
            }
            ProviderClient::DashScope {
                http,
                endpoint,
                api_key,
            } => Self::send_dashscope(http, endpoint, api_key, request).await,
        }
    }
}

/// 按 HTTP 状态码归类错误
fn classify_http_status(
    endpoint: &str,
    status: u16,
    retry_after: Option<u64>,
    message: Option<String>,
) -> ApiError {
    match status {
        429 => ApiError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after,
        },
        401 | 403 => ApiError::AuthFailed {
            endpoint: endpoint.to_string(),
        },
        400 => ApiError::MalformedRequest {
            endpoint: endpoint.to_string(),
            message: message.unwrap_or_default(),
        },
        _ => ApiError::BadResponse {
            endpoint: endpoint.to_string(),
            status,
            message,
        },
    }
}

/// 按错误文本归类（async-openai 的错误不直接暴露状态码）
fn classify_error_text(endpoint: &str, text: &str) -> ApiError {
    let lower = text.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("429")
    {
        ApiError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after: None,
        }
    } else if lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("invalid_api_key")
        || lower.contains("permission")
        || lower.contains("401")
        || lower.contains("403")
    {
        ApiError::AuthFailed {
            endpoint: endpoint.to_string(),
        }
    } else if lower.contains("invalid_request") || lower.contains("invalid request") {
        ApiError::MalformedRequest {
            endpoint: endpoint.to_string(),
            message: text.to_string(),
        }
    } else {
        // 连接失败、超时等网络类错误，交给调度器重试
        ApiError::RequestFailed {
            endpoint: endpoint.to_string(),
            message: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_classification() {
        let e = classify_http_status("ep", 429, Some(5), None);
        assert!(matches!(e, ApiError::RateLimited { retry_after: Some(5), .. }));
        assert!(e.is_retryable());

        let e = classify_http_status("ep", 401, None, None);
        assert!(matches!(e, ApiError::AuthFailed { .. }));
        assert!(!e.is_retryable());

        let e = classify_http_status("ep", 400, None, Some("bad body".into()));
        assert!(matches!(e, ApiError::MalformedRequest { .. }));
        assert!(!e.is_retryable());

        let e = classify_http_status("ep", 502, None, None);
        assert!(e.is_retryable());
    }

    #[test]
    fn error_text_classification() {
        assert!(matches!(
            classify_error_text("ep", "429 Too Many Requests"),
            ApiError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_error_text("ep", "Incorrect API key provided: invalid api key"),
            ApiError::AuthFailed { .. }
        ));
        assert!(matches!(
            classify_error_text("ep", "invalid_request_error: messages is required"),
            ApiError::MalformedRequest { .. }
        ));
        assert!(matches!(
            classify_error_text("ep", "connection refused"),
            ApiError::RequestFailed { .. }
        ));
    }

    #[test]
    fn qwen_gets_dashscope_client() {
        let client = ProviderClient::for_provider(ProviderId::Qwen, "https://example.com", "key");
        assert!(matches!(client, ProviderClient::DashScope { .. }));

        let client = ProviderClient::for_provider(ProviderId::Glm, "https://example.com", "key");
        assert!(matches!(client, ProviderClient::OpenAiCompat { .. }));
    }
}
