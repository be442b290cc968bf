//! Semantic validation of a loaded configuration.

use crate::model::AgentConfig;

/// Validate an agent config, returning one message per problem.
///
/// An empty return means the config is usable. Messages carry the field
/// path so operators can fix the YAML without reading source code.
pub fn validate(config: &AgentConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.server.trim().is_empty() {
        problems.push("server: must not be empty".to_string());
    } else if !config.server.starts_with("http://") && !config.server.starts_with("https://") {
        problems.push(format!(
            "server: expected an http(s) URL, got {:?}",
            config.server
        ));
    }

    if config.api_key.trim().is_empty() {
        problems.push("api_key: must not be empty".to_string());
    }

    if config.m3_interval_secs == 0 {
        problems.push("m3_interval_secs: must be greater than zero".to_string());
    }

    if config.extended_timeout_secs == 0 {
        problems.push("extended_timeout_secs: must be greater than zero".to_string());
    }

    if config.attach_tool.trim().is_empty() {
        problems.push("attach_tool: must not be empty".to_string());
    }

    for (index, pattern) in config.app_logs.iter().enumerate() {
        if pattern.trim().is_empty() {
            problems.push(format!("app_logs[{index}]: must not be empty"));
        }
    }

    for (index, pattern) in config.access_logs.iter().enumerate() {
        if pattern.trim().is_empty() {
            problems.push(format!("access_logs[{index}]: must not be empty"));
        }
    }

    match config.log.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => problems.push(format!("log.level: unknown level {other:?}")),
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AgentConfig {
        serde_yaml::from_str("server: https://analysis.example.com\napi_key: k\n").unwrap()
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&valid_config()).is_empty());
    }

    #[test]
    fn bad_server_scheme_is_reported() {
        let mut config = valid_config();
        config.server = "ftp://example.com".to_string();
        let problems = validate(&config);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("server:"));
    }

    #[test]
    fn zero_intervals_are_reported() {
        let mut config = valid_config();
        config.m3_interval_secs = 0;
        config.extended_timeout_secs = 0;
        let problems = validate(&config);
        assert!(problems.iter().any(|p| p.starts_with("m3_interval_secs")));
        assert!(problems
            .iter()
            .any(|p| p.starts_with("extended_timeout_secs")));
    }

    #[test]
    fn empty_log_pattern_names_the_index() {
        let mut config = valid_config();
        config.app_logs = vec!["/var/log/app.log".to_string(), "  ".to_string()];
        let problems = validate(&config);
        assert_eq!(problems, vec!["app_logs[1]: must not be empty"]);
    }

    #[test]
    fn unknown_log_level_is_reported() {
        let mut config = valid_config();
        config.log.level = "loud".to_string();
        let problems = validate(&config);
        assert!(problems.iter().any(|p| p.starts_with("log.level")));
    }
}
