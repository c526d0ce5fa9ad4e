//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CADENCE__*` 覆盖（双下划线表示嵌套，如 `CADENCE__SCHEDULER__HISTORY_WINDOW=8`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub scheduler: SchedulerSection,
    pub memory: MemorySection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [scheduler] 段：历史窗口、轮询间隔、完成后反思，以及可选的加固项
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// 每次调用 Brain 时携带的最近步数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// 就绪队列空闲等待上限（毫秒），也是停止信号的最大观察延迟
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 完成后是否异步调用 reflect 写入长期记忆
    #[serde(default = "default_reflect_on_completion")]
    pub reflect_on_completion: bool,
    /// 最多 observe 轮数；未设置则不限
    #[serde(default)]
    pub max_cycles: Option<u64>,
    /// WAITING_FOR_EVENT 挂起超时（秒）；未设置则无限期等待
    #[serde(default)]
    pub park_timeout_secs: Option<u64>,
}

fn default_history_window() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_reflect_on_completion() -> bool {
    true
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            poll_interval_ms: default_poll_interval_ms(),
            reflect_on_completion: default_reflect_on_completion(),
            max_cycles: None,
            park_timeout_secs: None,
        }
    }
}

/// [memory] 段：长期情景记忆
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,
    /// 内存实现保留的最大记录数
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// 提交时召回的相关经验条数；0 表示不召回
    #[serde(default = "default_recall_top_k")]
    pub recall_top_k: usize,
}

fn default_memory_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    1000
}

fn default_recall_top_k() -> usize {
    3
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            max_entries: default_max_entries(),
            recall_top_k: default_recall_top_k(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CADENCE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CADENCE__*（双下划线表示嵌套键）
///
/// 文件无法解析或字段类型不符时返回 `AgentError::Config`
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
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
        config::Environment::with_prefix("CADENCE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    Ok(c.try_deserialize()?)
}
