use agent_model::prelude::ConfigValue;

use crate::error::{ConfigError, ConfigResult};
use crate::schema;
use crate::snapshot::ConfigSnapshot;

/// Validates and applies one dotted-path override against `snapshot`
/// in-place. Rejects restart-only paths outright (a runtime override can
/// never take effect on them within this process) and rejects any value
/// whose type does not match the schema's tag (spec §4.10).
pub fn apply_override(snapshot: &mut ConfigSnapshot, path: &str, value: &ConfigValue) -> ConfigResult<()> {
    let descriptor = schema::find(path).ok_or_else(|| ConfigError::UnknownPath(path.to_string()))?;
    if !descriptor.hot_reloadable {
        return Err(ConfigError::InvalidOverride { path: path.to_string(), reason: "setting requires a restart and cannot be overridden at runtime".to_string() });
    }
    if value.type_tag() != descriptor.type_tag {
        return Err(ConfigError::InvalidOverride { path: path.to_string(), reason: format!("expected {}, got {}", descriptor.type_tag, value.type_tag()) });
    }

    match path {
        "log.level" => snapshot.hot.log_level = value.as_str().unwrap().to_string(),
        "tailer.keywords" => snapshot.hot.keywords = value.as_string_list().unwrap().to_vec(),
        "tailer.max_tailers" => {
            let requested = value.as_integer().unwrap() as usize;
            if snapshot.enabled_file_count() > requested {
                return Err(ConfigError::TooManyTailers { requested: snapshot.enabled_file_count(), max: requested });
            }
            snapshot.hot.max_tailers = requested;
        }
        "suppression.ttl_secs" => snapshot.hot.suppression_ttl_secs = value.as_integer().unwrap() as u64,
        _ => return Err(ConfigError::UnknownPath(path.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader;
    use crate::sources::{EnvConfig, FileConfig};

    fn sample_snapshot() -> ConfigSnapshot {
        loader::merge(&FileConfig::default(), &EnvConfig::default(), None, "node-1".to_string(), 1)
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut snap = sample_snapshot();
        let err = apply_override(&mut snap, "log.level", &ConfigValue::Bool(true)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn restart_only_path_is_rejected() {
        let mut snap = sample_snapshot();
        let err = apply_override(&mut snap, "server.control_api_port", &ConfigValue::Integer(9000)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn valid_override_mutates_snapshot() {
        let mut snap = sample_snapshot();
        apply_override(&mut snap, "log.level", &ConfigValue::String("trace".to_string())).unwrap();
        assert_eq!(snap.hot.log_level, "trace");
    }
}
