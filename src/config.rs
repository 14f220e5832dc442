//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SAFEHARBOR__*` 覆盖（双下划线表示嵌套，如
//! `SAFEHARBOR__LLM__PROVIDER=openai`）。每个段落对应一个编排组件，组件构造时按值取走自己的段。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::guardrail::Intent;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub dialogue: DialogueSection,
    pub context: ContextSection,
    pub selector: SelectorSection,
    pub router: RouterSection,
    pub adult: AdultSection,
}

/// [app] 段：应用名、历史窗口、内容目录与人设文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话保留的对话轮数（短期记忆）
    pub history_turns: usize,
    /// 生成调用携带的最近消息条数
    pub generation_history_messages: usize,
    /// 自定义内容目录（TOML）；未设置时使用内置目录
    pub catalog_path: Option<PathBuf>,
    /// 自定义人设文本；未设置时使用内置人设
    pub persona_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            history_turns: 20,
            generation_history_messages: 12,
            catalog_path: None,
            persona_path: None,
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次生成调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 250,
        }
    }
}

/// [embedding] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub enabled: bool,
    pub model: String,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "text-embedding-3-small".to_string(),
        }
    }
}

/// [dialogue] 段：年龄分流、教学就绪门槛、走神容忍度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogueSection {
    pub minor_age_min: u8,
    pub minor_age_max: u8,
    pub adult_age: u8,
    /// 无进行中内容时累计多少轮后不再等待触发意图
    pub readiness_turns: u32,
    /// 连续多少次敷衍回复后提前收尾当前内容
    pub max_disengaged_strikes: u8,
    pub content_triggering_intents: Vec<Intent>,
}

impl Default for DialogueSection {
    fn default() -> Self {
        Self {
            minor_age_min: 4,
            minor_age_max: 12,
            adult_age: 18,
            readiness_turns: 3,
            max_disengaged_strikes: 3,
            content_triggering_intents: vec![Intent::Emotional, Intent::Narrative],
        }
    }
}

/// [context] 段：安全窗口、情绪衰减、信任演进
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    pub safety_window_turns: u8,
    pub emotion_decay_turns: u8,
    pub low_intensity_threshold: f32,
    /// 两次信任升级之间至少间隔的轮数
    pub trust_min_turns: u32,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            safety_window_turns: 2,
            emotion_decay_turns: 3,
            low_intensity_threshold: 0.4,
            trust_min_turns: 5,
        }
    }
}

/// [selector] 段：语义检索阈值与超时、关键词窗口、回退随机种子
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub similarity_floor: f32,
    pub relevance_timeout_ms: u64,
    /// 关键词回退扫描的最近用户消息条数
    pub keyword_window_turns: usize,
    pub seed: Option<u64>,
    /// 意图标签 -> 内容分类
    pub intent_categories: HashMap<String, String>,
}

impl Default for SelectorSection {
    fn default() -> Self {
        let intent_categories = [
            ("emotional", "feelings"),
            ("narrative", "online_safety"),
            ("conversation", "friendship"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            similarity_floor: 0.75,
            relevance_timeout_ms: 1500,
            keyword_window_turns: 3,
            seed: None,
            intent_categories,
        }
    }
}

/// [router] 段：长文本阈值与两个生成档位的参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub long_form_words: usize,
    pub expressive: ProfileSection,
    pub high_precision: ProfileSection,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            long_form_words: 50,
            expressive: ProfileSection {
                temperature: 0.9,
                max_tokens: 600,
            },
            high_precision: ProfileSection {
                temperature: 0.3,
                max_tokens: 350,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileSection {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// [adult] 段：成人科普的行动号召节奏
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdultSection {
    pub min_turns: u32,
    pub min_topics: usize,
    pub cta_interval: u32,
}

impl Default for AdultSection {
    fn default() -> Self {
        Self {
            min_turns: 4,
            min_topics: 2,
            cta_interval: 2,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SAFEHARBOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SAFEHARBOR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SAFEHARBOR")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
