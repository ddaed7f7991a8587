use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// LLM 编排错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
}

/// API 调用错误
///
/// 调度器依赖 [`ApiError::is_retryable`] 区分瞬时失败与终态失败：
/// 网络错误、频率限制、服务端 5xx 会进入退避重试，
/// 认证失败和请求格式错误立即结算。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// 网络请求失败（连接失败、超时等）
    #[error("API请求失败 ({endpoint}): {message}")]
    RequestFailed { endpoint: String, message: String },
    /// API 返回错误响应
    #[error("API返回错误响应 ({endpoint}): HTTP {status} {message:?}")]
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    /// 请求频率限制
    #[error("API请求频率限制 ({endpoint}), 建议等待: {retry_after:?}秒")]
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },
    /// 认证失败
    #[error("API认证失败 ({endpoint})")]
    AuthFailed { endpoint: String },
    /// 请求格式错误
    #[error("请求格式错误 ({endpoint}): {message}")]
    MalformedRequest { endpoint: String, message: String },
    /// 重试次数耗尽
    #[error("重试 {attempts} 次后仍然失败: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ApiError {
    /// 该错误是否值得重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::RequestFailed { .. } | ApiError::RateLimited { .. } => true,
            ApiError::BadResponse { status, .. } => *status >= 500,
            ApiError::AuthFailed { .. }
            | ApiError::MalformedRequest { .. }
            | ApiError::RetriesExhausted { .. } => false,
        }
    }
}

/// LLM 编排错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    /// 模型没有可用的提供商凭证
    #[error("模型 {model} 没有可用的提供商凭证")]
    MissingCredentials { model: String },
    /// 所有候选模型全部失败
    #[error("所有候选模型均调用失败: {last_error}")]
    AllModelsFailed { last_error: String },
}

/// 配置错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 设置文件读取失败
    #[error("设置文件读取失败 ({path}): {message}")]
    SettingsFileUnreadable { path: String, message: String },
    /// 设置文件解析失败
    #[error("设置文件解析失败 ({path}): {message}")]
    SettingsFileInvalid { path: String, message: String },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let transient = ApiError::RequestFailed {
            endpoint: "e".into(),
            message: "连接超时".into(),
        };
        assert!(transient.is_retryable());

        let rate = ApiError::RateLimited {
            endpoint: "e".into(),
            retry_after: Some(3),
        };
        assert!(rate.is_retryable());

        let server = ApiError::BadResponse {
            endpoint: "e".into(),
            status: 503,
            message: None,
        };
        assert!(server.is_retryable());

        let auth = ApiError::AuthFailed { endpoint: "e".into() };
        assert!(!auth.is_retryable());

        let client = ApiError::BadResponse {
            endpoint: "e".into(),
            status: 404,
            message: None,
        };
        assert!(!client.is_retryable());
    }
}
