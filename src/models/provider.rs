//! 提供商注册表 - 模型层
//!
//! 静态维护所有受支持的 AI 提供商及其模型目录。
//! 注册表在进程启动时就已固定，运行期只读，
//! 任何设置合并、失败转移都以这里的已知模型集合为准。

use serde::{Deserialize, Serialize};

/// 提供商枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    /// OpenAI（及其兼容端点）
    OpenAi,
    /// Google Gemini（OpenAI 兼容端点）
    Gemini,
    /// 阿里云通义千问（DashScope 原生协议）
    Qwen,
    /// 智谱 GLM（OpenAI 兼容端点）
    Glm,
}

impl ProviderId {
    /// 获取提供商标识符
    pub fn id(self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini => "gemini",
            ProviderId::Qwen => "qwen",
            ProviderId::Glm => "glm",
        }
    }

    /// 获取显示名称
    pub fn label(self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OpenAI",
            ProviderId::Gemini => "Gemini",
            ProviderId::Qwen => "通义千问",
            ProviderId::Glm => "智谱GLM",
        }
    }

    /// 从标识符解析提供商
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "openai" => Some(ProviderId::OpenAi),
            "gemini" => Some(ProviderId::Gemini),
            "qwen" => Some(ProviderId::Qwen),
            "glm" => Some(ProviderId::Glm),
            _ => None,
        }
    }

    /// 所有已知提供商
    pub fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenAi,
            ProviderId::Gemini,
            ProviderId::Qwen,
            ProviderId::Glm,
        ]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// 提供商描述信息
///
/// 每个受支持的后端一条，进程启动时创建，之后不再变化。
#[derive(Debug, Clone, Copy)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub label: &'static str,
    pub default_model: &'static str,
    pub endpoint: &'static str,
    /// 持久化层存放该提供商配置时使用的键
    pub storage_key: &'static str,
}

/// 提供商目录
pub const PROVIDERS: [ProviderDescriptor; 4] = [
    ProviderDescriptor {
        id: ProviderId::OpenAi,
        label: "OpenAI",
        default_model: "gpt-4o-mini",
        endpoint: "https://api.openai.com/v1",
        storage_key: "provider.openai",
    },
    ProviderDescriptor {
        id: ProviderId::Gemini,
        label: "Gemini",
        default_model: "gemini-2.0-flash",
        endpoint: "https://generativelanguage.googleapis.com/v1beta/openai",
        storage_key: "provider.gemini",
    },
    ProviderDescriptor {
        id: ProviderId::Qwen,
        label: "通义千问",
        default_model: "qwen-plus",
        endpoint: "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation",
        storage_key: "provider.qwen",
    },
    ProviderDescriptor {
        id: ProviderId::Glm,
        label: "智谱GLM",
        default_model: "glm-4-plus",
        endpoint: "https://open.bigmodel.cn/api/paas/v4",
        storage_key: "provider.glm",
    },
];

/// 获取提供商描述信息
pub fn descriptor(id: ProviderId) -> &'static ProviderDescriptor {
    // PROVIDERS 覆盖了 ProviderId 的全部变体
    PROVIDERS
        .iter()
        .find(|d| d.id == id)
        .unwrap_or(&PROVIDERS[0])
}

/// 模型 → 提供商的静态目录
///
/// 设置合并时的"已知模型集合"即本表的键集合。
static MODEL_PROVIDERS: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "gpt-4o" => "openai",
    "gpt-4o-mini" => "openai",
    "gemini-2.0-flash" => "gemini",
    "gemini-1.5-pro" => "gemini",
    "qwen-plus" => "qwen",
    "qwen-max" => "qwen",
    "qwen-vl-plus" => "qwen",
    "glm-4-plus" => "glm",
    "glm-4-flash" => "glm",
};

/// 判断是否为已知模型
pub fn is_known_model(model: &str) -> bool {
    MODEL_PROVIDERS.contains_key(model)
}

/// 查询模型所属的提供商
pub fn provider_of_model(model: &str) -> Option<ProviderId> {
    MODEL_PROVIDERS
        .get(model)
        .and_then(|id| ProviderId::from_id(id))
}

/// 所有已知模型标识符
pub fn known_models() -> impl Iterator<Item = &'static str> {
    MODEL_PROVIDERS.keys().copied()
}

/// 单个模型的调用参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParams {
    /// 采样温度
    pub temperature: f32,
    /// 最大生成 token 数
    pub max_tokens: u32,
    /// 核采样参数（可选）
    pub top_p: Option<f32>,
    /// 单次请求超时（毫秒）
    pub timeout_ms: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            top_p: None,
            timeout_ms: 30_000,
        }
    }
}

/// 获取某个模型的出厂默认参数
///
/// 大模型给更宽的输出和超时预算，轻量模型保持默认。
pub fn default_params(model: &str) -> ModelParams {
    let mut params = ModelParams::default();
    match model {
        "gpt-4o" | "gemini-1.5-pro" | "qwen-max" | "glm-4-plus" => {
            params.max_tokens = 2048;
            params.timeout_ms = 60_000;
        }
        "qwen-vl-plus" => {
            // 视觉模型响应更慢
            params.timeout_ms = 60_000;
        }
        _ => {}
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_model_maps_to_known_provider() {
        for model in known_models() {
            assert!(
                provider_of_model(model).is_some(),
                "模型 {} 缺少提供商映射",
                model
            );
        }
    }

    #[test]
    fn provider_id_round_trip() {
        for p in ProviderId::all() {
            assert_eq!(ProviderId::from_id(p.id()), Some(*p));
        }
        assert_eq!(ProviderId::from_id("unknown"), None);
    }

    #[test]
    fn descriptors_cover_all_providers() {
        for p in ProviderId::all() {
            let d = descriptor(*p);
            assert_eq!(d.id, *p);
            assert!(!d.endpoint.is_empty());
            assert!(is_known_model(d.default_model));
        }
    }

    #[test]
    fn default_params_overrides() {
        assert_eq!(default_params("gpt-4o").max_tokens, 2048);
        assert_eq!(default_params("gpt-4o-mini").max_tokens, 1024);
        assert_eq!(default_params("qwen-vl-plus").timeout_ms, 60_000);
    }
}
