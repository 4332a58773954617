use serde_json::{Map, Value};

use crate::patcher::{
    is_api_inbound, LEVEL_STATS_FLAGS, STATS_LEVEL, STATS_SERVICE, SYSTEM_STATS_FLAGS,
};
use crate::utils::PatchError;

pub struct Validator;

impl Validator {
    /// 验证配置已开启流量统计
    pub fn validate(root: &Map<String, Value>) -> Result<(), PatchError> {
        Self::object(root, "log", "log")?;
        Self::object(root, "stats", "stats")?;

        let api = Self::object(root, "api", "api")?;
        if !api.get("tag").map_or(false, Value::is_string) {
            return Err(invalid("api.tag 必须是字符串"));
        }
        let services = Self::array(api, "services", "api.services")?;
        if !services.iter().any(|s| s.as_str() == Some(STATS_SERVICE)) {
            return Err(invalid(format!("api.services 缺少 {}", STATS_SERVICE)));
        }

        let inbounds = Self::array(root, "inbounds", "inbounds")?;
        if !inbounds.iter().any(is_api_inbound) {
            return Err(invalid("inbounds 缺少 api 入站"));
        }

        let policy = Self::object(root, "policy", "policy")?;
        let levels = Self::object(policy, "levels", "policy.levels")?;
        let level = Self::object(levels, STATS_LEVEL, "policy.levels.0")?;
        Self::flags(level, &LEVEL_STATS_FLAGS, "policy.levels.0")?;

        let system = Self::object(policy, "system", "policy.system")?;
        Self::flags(system, &SYSTEM_STATS_FLAGS, "policy.system")?;

        Ok(())
    }

    fn object<'a>(
        map: &'a Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Result<&'a Map<String, Value>, PatchError> {
        map.get(key)
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(format!("{} 必须是对象", path)))
    }

    fn array<'a>(
        map: &'a Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Result<&'a Vec<Value>, PatchError> {
        map.get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(format!("{} 必须是数组", path)))
    }

    fn flags(map: &Map<String, Value>, flags: &[&str], path: &str) -> Result<(), PatchError> {
        for flag in flags {
            if map.get(*flag) != Some(&Value::Bool(true)) {
                return Err(invalid(format!("{}.{} 必须为 true", path, flag)));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> PatchError {
    PatchError::Invalid(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats_enabled() -> Value {
        json!({
            "log": {"loglevel": "warning"},
            "stats": {},
            "api": {"tag": "api", "services": ["HandlerService", "StatsService"]},
            "inbounds": [
                {"protocol": "vless", "port": 443},
                {"protocol": "dokodemo-door", "tag": "api", "port": 10085}
            ],
            "policy": {
                "levels": {"0": {"statsUserUplink": true, "statsUserDownlink": true}},
                "system": {"statsInboundUplink": true, "statsInboundDownlink": true}
            }
        })
    }

    fn validate(value: &Value) -> Result<(), PatchError> {
        Validator::validate(value.as_object().unwrap())
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&stats_enabled()).is_ok());
    }

    #[test]
    fn test_empty_config() {
        assert!(validate(&json!({})).is_err());
    }

    #[test]
    fn test_missing_stats_service() {
        let mut config = stats_enabled();
        config["api"]["services"] = json!(["HandlerService"]);

        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("StatsService"));
    }

    #[test]
    fn test_missing_api_inbound() {
        let mut config = stats_enabled();
        config["inbounds"] = json!([{"protocol": "dokodemo-door", "tag": "other"}]);

        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_flag_not_true() {
        let mut config = stats_enabled();
        config["policy"]["system"]["statsInboundDownlink"] = json!(false);

        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("policy.system.statsInboundDownlink"));
    }

    #[test]
    fn test_wrong_typed_tag() {
        let mut config = stats_enabled();
        config["api"]["tag"] = json!(1);

        assert!(validate(&config).is_err());
    }
}
