use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

use crate::utils::{write_atomic, PatchError};

mod validator;
pub use validator::Validator;

/// 配置文件内容的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// 成功解析出 JSON 对象
    Parsed,
    /// 文件不存在
    Missing,
    /// 其他读取错误 (权限、目录、非 UTF-8 等)
    Unreadable,
    /// 文件为空
    Empty,
    /// 不是合法 JSON
    Malformed,
    /// 合法 JSON, 但根节点不是对象
    NotAnObject,
}

/// 服务器配置文档
///
/// 只关心根节点是一个 JSON 对象, 其余字段原样保留 (包括键顺序)。
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    root: Map<String, Value>,
    origin: Origin,
}

impl ConfigDocument {
    /// 空文档
    pub fn empty(origin: Origin) -> Self {
        Self {
            root: Map::new(),
            origin,
        }
    }

    /// 从文件加载配置
    ///
    /// 尽力而为: 任何读取或解析失败都退化为空对象, 不返回错误。
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("配置文件不存在, 使用空配置: {}", path.display());
                Self::empty(Origin::Missing)
            }
            Err(e) => {
                debug!("读取配置文件失败, 使用空配置: {}: {}", path.display(), e);
                Self::empty(Origin::Unreadable)
            }
        }
    }

    /// 从文本解析配置
    pub fn parse(content: &str) -> Self {
        if content.trim().is_empty() {
            return Self::empty(Origin::Empty);
        }

        match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(root)) => Self {
                root,
                origin: Origin::Parsed,
            },
            Ok(other) => {
                debug!("配置根节点不是对象 ({}), 使用空配置", kind_of(&other));
                Self::empty(Origin::NotAnObject)
            }
            Err(e) => {
                debug!("配置不是合法 JSON, 使用空配置: {}", e);
                Self::empty(Origin::Malformed)
            }
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.root
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// 两空格缩进, 无结尾换行
    pub fn to_pretty_string(&self) -> Result<String, PatchError> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// 保存配置到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PatchError> {
        let content = self.to_pretty_string()?;
        write_atomic(path, content.as_bytes())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object() {
        let doc = ConfigDocument::parse(r#"{"inbounds": [], "outbounds": [{"protocol": "freedom"}]}"#);
        assert_eq!(doc.origin(), Origin::Parsed);
        assert_eq!(doc.root().len(), 2);
    }

    #[test]
    fn test_parse_fallbacks() {
        assert_eq!(ConfigDocument::parse("").origin(), Origin::Empty);
        assert_eq!(ConfigDocument::parse("  \n").origin(), Origin::Empty);
        assert_eq!(ConfigDocument::parse("{not json").origin(), Origin::Malformed);
        assert_eq!(ConfigDocument::parse("[1, 2]").origin(), Origin::NotAnObject);
        assert_eq!(ConfigDocument::parse("\"text\"").origin(), Origin::NotAnObject);
        assert_eq!(ConfigDocument::parse("42").origin(), Origin::NotAnObject);

        assert!(ConfigDocument::parse("[1, 2]").root().is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = ConfigDocument::load(dir.path().join("nope.json"));
        assert_eq!(doc.origin(), Origin::Missing);
        assert!(doc.root().is_empty());
    }

    #[test]
    fn test_load_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let doc = ConfigDocument::load(dir.path());
        assert_eq!(doc.origin(), Origin::Unreadable);
        assert!(doc.root().is_empty());
    }

    #[test]
    fn test_key_order_preserved() {
        let doc = ConfigDocument::parse(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#);
        let keys: Vec<_> = doc.root().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_pretty_string_uses_two_spaces() {
        let doc = ConfigDocument::parse(r#"{"stats":{},"log":{"loglevel":"error"}}"#);
        let text = doc.to_pretty_string().unwrap();
        assert_eq!(
            text,
            "{\n  \"stats\": {},\n  \"log\": {\n    \"loglevel\": \"error\"\n  }\n}"
        );
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let doc = ConfigDocument::parse(r#"{"foo": "bar"}"#);

        doc.save(&path).unwrap();

        let loaded = ConfigDocument::load(&path);
        assert_eq!(loaded.origin(), Origin::Parsed);
        assert_eq!(loaded.into_value(), json!({"foo": "bar"}));
    }
}
