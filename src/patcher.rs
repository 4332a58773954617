//! 开启 Xray 流量统计所需的配置补丁
//!
//! 每条规则只补齐缺失或类型错误的字段, 统计开关则强制为 `true`,
//! 因此对同一文件重复执行结果不变。已有字段 (包括未知字段) 原样保留。

use serde_json::{json, Map, Value};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{ConfigDocument, Origin, Validator};
use crate::utils::PatchError;

pub const DEFAULT_LOG_LEVEL: &str = "error";
pub const API_TAG: &str = "api";
pub const STATS_SERVICE: &str = "StatsService";
pub const API_PROTOCOL: &str = "dokodemo-door";
pub const API_LISTEN: &str = "127.0.0.1";
pub const API_PORT: u16 = 10085;
pub const STATS_LEVEL: &str = "0";
pub const LEVEL_STATS_FLAGS: [&str; 2] = ["statsUserUplink", "statsUserDownlink"];
pub const SYSTEM_STATS_FLAGS: [&str; 2] = ["statsInboundUplink", "statsInboundDownlink"];

/// 补丁规则, 按 `Rule::ALL` 的顺序执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// `log` 为对象, 默认 `{"loglevel": "error"}`
    Log,
    /// `stats` 为对象
    Stats,
    /// `api` 为对象, `api.tag` 为字符串
    ApiTag,
    /// `api.services` 包含 `StatsService`
    StatsService,
    /// `inbounds` 包含 dokodemo-door api 入站
    ApiInbound,
    /// `policy.levels["0"]` 的用户统计开关
    LevelStats,
    /// `policy.system` 的入站统计开关
    SystemStats,
}

impl Rule {
    pub const ALL: [Rule; 7] = [
        Rule::Log,
        Rule::Stats,
        Rule::ApiTag,
        Rule::StatsService,
        Rule::ApiInbound,
        Rule::LevelStats,
        Rule::SystemStats,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Rule::Log => "log",
            Rule::Stats => "stats",
            Rule::ApiTag => "api.tag",
            Rule::StatsService => "api.services",
            Rule::ApiInbound => "inbounds",
            Rule::LevelStats => "policy.levels",
            Rule::SystemStats => "policy.system",
        }
    }

    /// 执行规则, 返回文档是否被修改
    pub fn apply(self, root: &mut Map<String, Value>) -> bool {
        let mut changed = false;
        self.fill(root, &mut changed);
        changed
    }

    fn fill(self, root: &mut Map<String, Value>, changed: &mut bool) -> Option<()> {
        match self {
            Rule::Log => {
                object_slot(root, "log", default_log, changed)?;
            }
            Rule::Stats => {
                object_slot(root, "stats", Map::new, changed)?;
            }
            Rule::ApiTag => {
                let api = object_slot(root, "api", Map::new, changed)?;
                if !api.get("tag").map_or(false, Value::is_string) {
                    api.insert("tag".to_string(), Value::from(API_TAG));
                    *changed = true;
                }
            }
            Rule::StatsService => {
                let api = object_slot(root, "api", Map::new, changed)?;
                let services = array_slot(api, "services", changed)?;
                if !services.iter().any(|s| s.as_str() == Some(STATS_SERVICE)) {
                    services.push(Value::from(STATS_SERVICE));
                    *changed = true;
                }
            }
            Rule::ApiInbound => {
                let inbounds = array_slot(root, "inbounds", changed)?;
                if !inbounds.iter().any(is_api_inbound) {
                    inbounds.push(api_inbound());
                    *changed = true;
                }
            }
            Rule::LevelStats => {
                let policy = object_slot(root, "policy", Map::new, changed)?;
                let levels = object_slot(policy, "levels", Map::new, changed)?;
                let level = object_slot(levels, STATS_LEVEL, Map::new, changed)?;
                *changed |= force_true(level, &LEVEL_STATS_FLAGS);
            }
            Rule::SystemStats => {
                let policy = object_slot(root, "policy", Map::new, changed)?;
                let system = object_slot(policy, "system", Map::new, changed)?;
                *changed |= force_true(system, &SYSTEM_STATS_FLAGS);
            }
        }
        Some(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一次补丁中实际修改了文档的规则
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub applied: Vec<Rule>,
}

impl PatchReport {
    /// 文档原本就满足要求
    pub fn is_unchanged(&self) -> bool {
        self.applied.is_empty()
    }
}

/// `patch_file` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub origin: Origin,
    pub report: PatchReport,
}

/// 是否为 api 管理入站 (`protocol == "dokodemo-door"` 且 `tag == "api"`)
pub fn is_api_inbound(inbound: &Value) -> bool {
    inbound.get("protocol").and_then(Value::as_str) == Some(API_PROTOCOL)
        && inbound.get("tag").and_then(Value::as_str) == Some(API_TAG)
}

/// 依次执行全部规则
pub fn patch_document(root: &mut Map<String, Value>) -> PatchReport {
    let mut report = PatchReport::default();
    for rule in Rule::ALL {
        if rule.apply(root) {
            debug!("已补齐 {}", rule);
            report.applied.push(rule);
        }
    }
    report
}

/// 读取、补丁、校验并写回配置文件
pub fn patch_file<P: AsRef<Path>>(path: P) -> Result<PatchOutcome, PatchError> {
    let path = path.as_ref();

    let mut doc = ConfigDocument::load(path);
    let report = patch_document(doc.root_mut());
    Validator::validate(doc.root())?;
    doc.save(path)?;

    info!(
        "📊 {} 已开启流量统计 ({} 条规则生效)",
        path.display(),
        report.applied.len()
    );

    Ok(PatchOutcome {
        origin: doc.origin(),
        report,
    })
}

fn default_log() -> Map<String, Value> {
    let mut log = Map::new();
    log.insert("loglevel".to_string(), Value::from(DEFAULT_LOG_LEVEL));
    log
}

fn api_inbound() -> Value {
    json!({
        "listen": API_LISTEN,
        "port": API_PORT,
        "protocol": API_PROTOCOL,
        "settings": {"address": API_LISTEN},
        "tag": API_TAG
    })
}

/// 取 `key` 对应的对象, 缺失或类型错误时替换为 `default()`
///
/// 已存在的键被替换时保留原位置。
fn object_slot<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
    default: impl FnOnce() -> Map<String, Value>,
    changed: &mut bool,
) -> Option<&'a mut Map<String, Value>> {
    let slot = map.entry(key).or_insert(Value::Null);
    if !slot.is_object() {
        *slot = Value::Object(default());
        *changed = true;
    }
    slot.as_object_mut()
}

fn array_slot<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
    changed: &mut bool,
) -> Option<&'a mut Vec<Value>> {
    let slot = map.entry(key).or_insert(Value::Null);
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
        *changed = true;
    }
    slot.as_array_mut()
}

fn force_true(map: &mut Map<String, Value>, flags: &[&str]) -> bool {
    let mut changed = false;
    for flag in flags {
        if map.get(*flag) != Some(&Value::Bool(true)) {
            map.insert((*flag).to_string(), Value::Bool(true));
            changed = true;
        }
    }
    changed
}
