//! 配置层 - 设置聚合与合并
//!
//! ## 职责
//!
//! - 维护内置默认设置（`default_settings`）
//! - 将外部来源的设置补丁深合并到默认值上（`merge_settings`）
//! - 从环境变量读取运行期凭证与调度参数（`RuntimeConfig`）
//! - 从 TOML 文件加载设置补丁（`load_settings_file`）
//!
//! 合并是全函数：对任意形状的补丁（缺字段、类型错误、未知键）
//! 都不会 panic，也永远返回字段齐全的 `Settings`。
//! 非法字段静默回退到合并前的值，而不是让坏数据进入下游。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{AppResult, ConfigError};
use crate::models::provider::{
    default_params, descriptor, is_known_model, known_models, ModelParams, ProviderId,
};

/// 抽屉面板宽度下限（像素）
pub const DRAWER_WIDTH_MIN: u32 = 280;
/// 抽屉面板宽度上限（像素）
pub const DRAWER_WIDTH_MAX: u32 = 600;

/// 单个提供商的可覆盖配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API 端点，空字符串表示使用注册表默认值
    #[serde(default)]
    pub endpoint: String,
}

/// 聚合设置
///
/// 经 [`normalize_settings`] 进入系统后即视为只读，
/// 所有组件共享同一份而无需加锁。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// 默认模型
    pub default_model: String,
    /// 失败转移顺序，首个为最优先
    pub model_priority: Vec<String>,
    /// 抽屉面板宽度（像素）
    pub drawer_width: u32,
    /// 是否自动保存
    pub auto_save: bool,
    /// 是否输出调试信息
    pub debug_mode: bool,
    /// 每个模型的调用参数
    pub model_params: BTreeMap<String, ModelParams>,
    /// 每个提供商的配置
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Settings {
    /// 解析某提供商实际使用的端点
    pub fn resolve_endpoint(&self, provider: ProviderId) -> String {
        self.providers
            .get(provider.id())
            .map(|p| p.endpoint.as_str())
            .filter(|ep| !ep.is_empty())
            .unwrap_or(descriptor(provider).endpoint)
            .to_string()
    }

    /// 解析某模型实际使用的参数
    pub fn resolve_params(&self, model: &str) -> ModelParams {
        self.model_params
            .get(model)
            .cloned()
            .unwrap_or_else(|| default_params(model))
    }

    /// 失败转移候选链：默认模型在前，其后按优先级列表去重排列
    pub fn model_chain(&self) -> Vec<String> {
        let mut chain = vec![self.default_model.clone()];
        for model in &self.model_priority {
            if !chain.contains(model) {
                chain.push(model.clone());
            }
        }
        chain
    }
}

/// 内置默认设置
pub fn default_settings() -> Settings {
    let mut model_params = BTreeMap::new();
    for model in known_models() {
        model_params.insert(model.to_string(), default_params(model));
    }

    let mut providers = BTreeMap::new();
    for p in ProviderId::all() {
        providers.insert(
            p.id().to_string(),
            ProviderSettings {
                endpoint: descriptor(*p).endpoint.to_string(),
            },
        );
    }

    Settings {
        default_model: "qwen-plus".to_string(),
        model_priority: vec![
            "qwen-plus".to_string(),
            "glm-4-plus".to_string(),
            "gpt-4o-mini".to_string(),
            "gemini-2.0-flash".to_string(),
        ],
        drawer_width: 380,
        auto_save: true,
        debug_mode: false,
        model_params,
        providers,
    }
}

/// 模型参数补丁（字段全部可选）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelParamsPatch {
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    timeout_ms: Option<u64>,
}

impl ModelParamsPatch {
    fn apply(&self, target: &mut ModelParams) {
        if let Some(t) = self.temperature {
            target.temperature = t;
        }
        if let Some(m) = self.max_tokens {
            target.max_tokens = m;
        }
        if let Some(p) = self.top_p {
            target.top_p = Some(p);
        }
        if let Some(t) = self.timeout_ms {
            target.timeout_ms = t;
        }
    }
}

/// 将设置补丁合并到基准设置上
///
/// 每条规则只触碰自己的字段，彼此无序可交换：
/// - `defaultModel`：必须是已知模型，否则保留基准值
/// - `modelPriority`：过滤掉未知模型；过滤后为空则整体放弃，
///   永远不会产出空的优先级列表
/// - `providers`：按提供商逐字段浅合并，未知提供商原样存储（向前兼容）
/// - `modelParams`：只合并已知模型，未知模型整条丢弃
/// - `drawerWidth`：数值钳制到 [280, 600]，非数值忽略
/// - `autoSave` / `debugMode`：仅接受严格布尔值
pub fn merge_settings(base: &Settings, patch: &Value) -> Settings {
    let mut merged = base.clone();
    let Some(patch) = patch.as_object() else {
        return merged;
    };

    if let Some(model) = patch.get("defaultModel").and_then(Value::as_str) {
        if is_known_model(model) {
            merged.default_model = model.to_string();
        } else {
            debug!("忽略未知默认模型: {}", model);
        }
    }

    if let Some(priority) = patch.get("modelPriority").and_then(Value::as_array) {
        let filtered: Vec<String> = priority
            .iter()
            .filter_map(Value::as_str)
            .filter(|m| is_known_model(m))
            .map(str::to_string)
            .collect();
        if filtered.is_empty() {
            debug!("模型优先级补丁过滤后为空，保留原列表");
        } else {
            merged.model_priority = filtered;
        }
    }

    if let Some(providers) = patch.get("providers").and_then(Value::as_object) {
        for (id, cfg) in providers {
            let Some(cfg) = cfg.as_object() else {
                continue;
            };
            let entry = merged
                .providers
                .entry(id.clone())
                .or_insert_with(|| ProviderSettings {
                    endpoint: String::new(),
                });
            if let Some(endpoint) = cfg.get("endpoint").and_then(Value::as_str) {
                entry.endpoint = endpoint.to_string();
            }
        }
    }

    if let Some(params) = patch.get("modelParams").and_then(Value::as_object) {
        for (model, value) in params {
            if !is_known_model(model) {
                debug!("忽略未知模型的参数补丁: {}", model);
                continue;
            }
            // 形状不符（非对象、字段类型错误）的补丁整条丢弃
            let Ok(patch) = serde_json::from_value::<ModelParamsPatch>(value.clone()) else {
                debug!("忽略形状非法的参数补丁: {}", model);
                continue;
            };
            let entry = merged
                .model_params
                .entry(model.clone())
                .or_insert_with(|| default_params(model));
            patch.apply(entry);
        }
    }

    if let Some(width) = patch.get("drawerWidth").and_then(Value::as_f64) {
        if width.is_finite() {
            merged.drawer_width = (width.round() as i64)
                .clamp(i64::from(DRAWER_WIDTH_MIN), i64::from(DRAWER_WIDTH_MAX))
                as u32;
        }
    }

    if let Some(auto_save) = patch.get("autoSave").and_then(Value::as_bool) {
        merged.auto_save = auto_save;
    }
    if let Some(debug_mode) = patch.get("debugMode").and_then(Value::as_bool) {
        merged.debug_mode = debug_mode;
    }

    merged
}

/// 外部来源设置进入系统的唯一入口
///
/// 等价于 `merge_settings(默认设置, raw)`，保证下游拿到的
/// 永远是完整且校验过的设置对象。
pub fn normalize_settings(raw: &Value) -> Settings {
    merge_settings(&default_settings(), raw)
}

/// 从 TOML 文件加载设置补丁并规范化
pub async fn load_settings_file(path: &str) -> AppResult<Settings> {
    let content =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::SettingsFileUnreadable {
                path: path.to_string(),
                message: e.to_string(),
            })?;

    let value: toml::Value =
        toml::from_str(&content).map_err(|e| ConfigError::SettingsFileInvalid {
            path: path.to_string(),
            message: e.to_string(),
        })?;

    let patch = serde_json::to_value(&value).map_err(|e| ConfigError::SettingsFileInvalid {
        path: path.to_string(),
        message: e.to_string(),
    })?;

    Ok(normalize_settings(&patch))
}

/// 运行期配置（凭证与调度参数）
///
/// API 密钥不属于设置文档，由持久化层（扩展 storage）之外的
/// 环境变量提供，随进程生命周期存在。
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// 提供商标识符 → API 密钥
    pub api_keys: BTreeMap<String, String>,
    /// 相邻两次派发之间的最小间隔（毫秒）
    pub min_request_interval_ms: u64,
    /// 重试退避基准延迟（毫秒）
    pub retry_base_delay_ms: u64,
    /// 单个请求的最大尝试次数
    pub max_attempts: u32,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_keys: BTreeMap::new(),
            min_request_interval_ms: 1000,
            retry_base_delay_ms: 500,
            max_attempts: 3,
            verbose_logging: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        let mut api_keys = BTreeMap::new();
        for p in ProviderId::all() {
            let var = format!("{}_API_KEY", p.id().to_uppercase());
            if let Ok(key) = std::env::var(&var) {
                if !key.is_empty() {
                    api_keys.insert(p.id().to_string(), key);
                }
            }
        }

        Self {
            api_keys,
            min_request_interval_ms: std::env::var("MIN_REQUEST_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.min_request_interval_ms),
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retry_base_delay_ms),
            max_attempts: std::env::var("MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_attempts),
            verbose_logging: std::env::var("VERBOSE_LOGGING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.verbose_logging),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_settings_are_complete() {
        let s = default_settings();
        assert!(is_known_model(&s.default_model));
        assert!(!s.model_priority.is_empty());
        for model in &s.model_priority {
            assert!(is_known_model(model));
        }
        for model in known_models() {
            assert!(s.model_params.contains_key(model));
        }
        for p in ProviderId::all() {
            assert!(s.providers.contains_key(p.id()));
        }
    }

    #[test]
    fn unknown_priority_entries_are_filtered() {
        let base = default_settings();
        let merged = merge_settings(
            &base,
            &json!({ "modelPriority": ["glm-4-flash", "unknown-model", "gpt-4o"] }),
        );
        assert_eq!(merged.model_priority, vec!["glm-4-flash", "gpt-4o"]);
    }

    #[test]
    fn all_unknown_priority_keeps_base_list() {
        let base = default_settings();
        let merged = merge_settings(&base, &json!({ "modelPriority": ["unknown-model"] }));
        assert_eq!(merged.model_priority, base.model_priority);
    }

    #[test]
    fn unknown_default_model_keeps_base() {
        let base = default_settings();
        let merged = merge_settings(&base, &json!({ "defaultModel": "gpt-99" }));
        assert_eq!(merged.default_model, base.default_model);

        let merged = merge_settings(&base, &json!({ "defaultModel": "gpt-4o" }));
        assert_eq!(merged.default_model, "gpt-4o");
    }

    #[test]
    fn drawer_width_is_clamped() {
        let base = default_settings();
        assert_eq!(
            merge_settings(&base, &json!({ "drawerWidth": 120 })).drawer_width,
            DRAWER_WIDTH_MIN
        );
        assert_eq!(
            merge_settings(&base, &json!({ "drawerWidth": 9000 })).drawer_width,
            DRAWER_WIDTH_MAX
        );
        assert_eq!(
            merge_settings(&base, &json!({ "drawerWidth": 400 })).drawer_width,
            400
        );
        // 非数值忽略
        assert_eq!(
            merge_settings(&base, &json!({ "drawerWidth": "wide" })).drawer_width,
            base.drawer_width
        );
    }

    #[test]
    fn booleans_require_strict_bool() {
        let base = default_settings();
        let merged = merge_settings(&base, &json!({ "autoSave": "true", "debugMode": 1 }));
        assert_eq!(merged.auto_save, base.auto_save);
        assert_eq!(merged.debug_mode, base.debug_mode);

        let merged = merge_settings(&base, &json!({ "autoSave": false, "debugMode": true }));
        assert!(!merged.auto_save);
        assert!(merged.debug_mode);
    }

    #[test]
    fn model_params_merge_known_only() {
        let base = default_settings();
        let merged = merge_settings(
            &base,
            &json!({
                "modelParams": {
                    "qwen-plus": { "temperature": 0.7, "maxTokens": 512 },
                    "no-such-model": { "temperature": 2.0 }
                }
            }),
        );
        let params = &merged.model_params["qwen-plus"];
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.max_tokens, 512);
        // 未触碰的字段保持默认
        assert_eq!(params.timeout_ms, default_params("qwen-plus").timeout_ms);
        assert!(!merged.model_params.contains_key("no-such-model"));
    }

    #[test]
    fn malformed_model_params_entry_is_dropped() {
        let base = default_settings();
        let merged = merge_settings(
            &base,
            &json!({ "modelParams": { "qwen-plus": { "temperature": "hot" } } }),
        );
        assert_eq!(merged.model_params["qwen-plus"], base.model_params["qwen-plus"]);
    }

    #[test]
    fn providers_shallow_merge_keeps_unknown_ids() {
        let base = default_settings();
        let merged = merge_settings(
            &base,
            &json!({
                "providers": {
                    "qwen": { "endpoint": "https://proxy.example.com/qwen" },
                    "future-provider": { "endpoint": "https://example.com" }
                }
            }),
        );
        assert_eq!(
            merged.providers["qwen"].endpoint,
            "https://proxy.example.com/qwen"
        );
        assert_eq!(
            merged.providers["future-provider"].endpoint,
            "https://example.com"
        );
        // 未触及的提供商保持默认端点
        assert_eq!(merged.providers["glm"], base.providers["glm"]);
    }

    #[test]
    fn merge_is_total_over_garbage_patches() {
        let base = default_settings();
        for patch in [
            Value::Null,
            json!(42),
            json!("defaultModel"),
            json!([1, 2, 3]),
            json!({ "modelPriority": "not-an-array", "modelParams": [1] }),
        ] {
            let merged = merge_settings(&base, &patch);
            assert!(!merged.model_priority.is_empty());
            assert!(is_known_model(&merged.default_model));
        }
    }

    #[test]
    fn normalize_equals_merge_onto_defaults() {
        let patch = json!({ "defaultModel": "glm-4-flash" });
        assert_eq!(
            normalize_settings(&patch),
            merge_settings(&default_settings(), &patch)
        );
    }

    #[test]
    fn model_chain_dedups_and_leads_with_default() {
        let mut s = default_settings();
        s.default_model = "glm-4-plus".into();
        s.model_priority = vec!["qwen-plus".into(), "glm-4-plus".into(), "gpt-4o".into()];
        assert_eq!(s.model_chain(), vec!["glm-4-plus", "qwen-plus", "gpt-4o"]);
    }

    #[test]
    fn resolve_endpoint_falls_back_to_registry() {
        let mut s = default_settings();
        s.providers.get_mut("qwen").expect("qwen 默认存在").endpoint = String::new();
        assert_eq!(
            s.resolve_endpoint(ProviderId::Qwen),
            crate::models::provider::descriptor(ProviderId::Qwen).endpoint
        );
    }
}
