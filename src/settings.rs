use serde::{Deserialize, Serialize};

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub listen: String,
    pub database: String,
    pub model: String,
    pub max_tool_calls: usize,
    pub turn_timeout_secs: u64,
    pub max_result_rows: usize,
    /// Evict sessions idle for this long; `None` disables eviction.
    pub idle_evict_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".into(),
            database: "Chinook.db".into(),
            model: "gpt-4o-mini".into(),
            max_tool_calls: 8,
            turn_timeout_secs: 30,
            max_result_rows: 50,
            idle_evict_secs: None,
        }
    }
}

/// Partial configuration from one source (environment or CLI flags).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub database: Option<String>,
    pub model: Option<String>,
    pub max_tool_calls: Option<usize>,
    pub turn_timeout_secs: Option<u64>,
    pub max_result_rows: Option<usize>,
    pub idle_evict_secs: Option<u64>,
}

impl ConfigOverrides {
    pub fn from_env() -> Self {
        Self {
            listen: std::env::var("CONCIERGE_LISTEN").ok(),
            database: std::env::var("CONCIERGE_DB").ok(),
            model: std::env::var("CONCIERGE_MODEL").ok(),
            max_tool_calls: parse_env("CONCIERGE_MAX_TOOL_CALLS"),
            turn_timeout_secs: parse_env("CONCIERGE_TURN_TIMEOUT_SECS"),
            max_result_rows: parse_env("CONCIERGE_MAX_RESULT_ROWS"),
            idle_evict_secs: parse_env("CONCIERGE_IDLE_EVICT_SECS"),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Layer overrides over the defaults: CLI flags win over the environment,
/// which wins over built-in defaults.
pub fn resolve_config(env: &ConfigOverrides, cli: &ConfigOverrides) -> AgentConfig {
    let defaults = AgentConfig::default();
    AgentConfig {
        listen: cli.listen.clone().or_else(|| env.listen.clone()).unwrap_or(defaults.listen),
        database: cli.database.clone().or_else(|| env.database.clone()).unwrap_or(defaults.database),
        model: cli.model.clone().or_else(|| env.model.clone()).unwrap_or(defaults.model),
        max_tool_calls: cli.max_tool_calls.or(env.max_tool_calls).unwrap_or(defaults.max_tool_calls),
        turn_timeout_secs: cli
            .turn_timeout_secs
            .or(env.turn_timeout_secs)
            .unwrap_or(defaults.turn_timeout_secs),
        max_result_rows: cli
            .max_result_rows
            .or(env.max_result_rows)
            .unwrap_or(defaults.max_result_rows),
        idle_evict_secs: cli.idle_evict_secs.or(env.idle_evict_secs).or(defaults.idle_evict_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_cli_over_env_over_default() {
        let env = ConfigOverrides {
            listen: Some("0.0.0.0:9000".into()),
            database: Some("/data/records.db".into()),
            model: None,
            max_tool_calls: Some(4),
            turn_timeout_secs: None,
            max_result_rows: None,
            idle_evict_secs: Some(3600),
        };
        let cli = ConfigOverrides {
            listen: Some("127.0.0.1:7000".into()),
            database: None,
            model: Some("gpt-4o".into()),
            max_tool_calls: None,
            turn_timeout_secs: Some(10),
            max_result_rows: None,
            idle_evict_secs: None,
        };

        let cfg = resolve_config(&env, &cli);

        assert_eq!(cfg.listen, "127.0.0.1:7000"); // from cli
        assert_eq!(cfg.database, "/data/records.db"); // from env
        assert_eq!(cfg.model, "gpt-4o"); // from cli
        assert_eq!(cfg.max_tool_calls, 4); // from env
        assert_eq!(cfg.turn_timeout_secs, 10); // from cli
        assert_eq!(cfg.max_result_rows, 50); // default
        assert_eq!(cfg.idle_evict_secs, Some(3600)); // from env
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = resolve_config(&ConfigOverrides::default(), &ConfigOverrides::default());
        assert_eq!(cfg, AgentConfig::default());
        assert!(cfg.idle_evict_secs.is_none());
    }
}
