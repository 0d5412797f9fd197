/// Describes one recognised dotted-path setting: whether it hot-reloads,
/// and its expected [`agent_model::config_value::ConfigValue`] type tag.
/// Backs `/api/config/schema` (spec §6) and validates `/api/config` POST
/// bodies (spec §4.10) against a static table rather than runtime
/// reflection — spec §9 calls out the source's dynamically-typed config
/// module as exactly the pattern to replace.
#[derive(Debug, Clone, Copy)]
pub struct SettingDescriptor {
    pub path: &'static str,
    pub type_tag: &'static str,
    pub hot_reloadable: bool,
    pub description: &'static str,
}

pub const SCHEMA: &[SettingDescriptor] = &[
    SettingDescriptor { path: "log.level", type_tag: "string", hot_reloadable: true, description: "Log level (trace|debug|info|warn|error)" },
    SettingDescriptor { path: "tailer.keywords", type_tag: "string_list", hot_reloadable: true, description: "Keyword set used for candidate-line matching" },
    SettingDescriptor { path: "tailer.max_tailers", type_tag: "integer", hot_reloadable: true, description: "Hard ceiling on concurrently running Tailers" },
    SettingDescriptor { path: "suppression.ttl_secs", type_tag: "integer", hot_reloadable: true, description: "Suppression Cache refresh TTL" },
    SettingDescriptor { path: "alerts.thresholds", type_tag: "string", hot_reloadable: true, description: "Per-rule-key alert threshold/duration/cooldown map" },
    SettingDescriptor { path: "monitored_files", type_tag: "string", hot_reloadable: true, description: "Monitored file list" },
    SettingDescriptor { path: "server.control_api_port", type_tag: "integer", hot_reloadable: false, description: "Control API listen port (restart required)" },
    SettingDescriptor { path: "server.live_logs_port", type_tag: "integer", hot_reloadable: false, description: "Live log broadcaster listen port (restart required)" },
    SettingDescriptor { path: "server.live_metrics_port", type_tag: "integer", hot_reloadable: false, description: "Live metric broadcaster listen port (restart required)" },
    SettingDescriptor { path: "broker.url", type_tag: "string", hot_reloadable: false, description: "Message broker URL (restart required)" },
];

pub fn find(path: &str) -> Option<&'static SettingDescriptor> {
    SCHEMA.iter().find(|d| d.path == path)
}

pub fn is_hot_reloadable(path: &str) -> bool {
    find(path).map(|d| d.hot_reloadable).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_only_fields_are_not_hot_reloadable() {
        assert!(!is_hot_reloadable("server.control_api_port"));
        assert!(!is_hot_reloadable("broker.url"));
    }

    #[test]
    fn hot_reloadable_fields_flagged_true() {
        assert!(is_hot_reloadable("log.level"));
        assert!(is_hot_reloadable("tailer.keywords"));
    }

    #[test]
    fn unknown_path_is_not_hot_reloadable() {
        assert!(!is_hot_reloadable("nonsense.path"));
    }
}
