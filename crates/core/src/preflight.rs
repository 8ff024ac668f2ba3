//! Startup checks run before any session or host is started.
//!
//! Missing credentials are a startup-time failure: [`run`] returns the first
//! hard failure as a [`ConfigError`] and otherwise a report of every check.

use crate::config::Config;
use crate::error::ConfigError;

/// Which process is being started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The agent client: needs a model credential and a tool host address.
    Agent,
    /// The tool host: needs the managed index credential, index identity
    /// and a model credential for answer synthesis.
    Host,
}

#[derive(Debug, Clone)]
pub struct PreflightCheck {
    pub name: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub checks: Vec<PreflightCheck>,
}

impl PreflightReport {
    fn pass(&mut self, name: &'static str, detail: impl Into<String>) {
        self.checks.push(PreflightCheck {
            name,
            detail: detail.into(),
        });
    }

    pub fn log(&self) {
        for check in &self.checks {
            tracing::info!(check = check.name, "✓ {}", check.detail);
        }
    }
}

/// Validate `config` for the given role.
pub fn run(config: &Config, role: Role) -> Result<PreflightReport, ConfigError> {
    let mut report = PreflightReport::default();

    if let Some(bad) = config.rejected.first() {
        return Err(ConfigError::InvalidValue {
            key: bad.key.clone(),
            reason: format!("cannot parse '{}'", bad.value),
        });
    }

    match role {
        Role::Agent => {
            check_model(config, &mut report)?;

            let url = url::Url::parse(&config.tool_host.url).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "TOOL_HOST_URL".to_string(),
                    reason: e.to_string(),
                }
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue {
                    key: "TOOL_HOST_URL".to_string(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            report.pass("tool_host_url", format!("tool host at {}", url));

            if config.agent.max_turns == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "AGENT_MAX_TURNS".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            if config.tool_host.call_timeout_secs == 0 || config.tool_host.handshake_timeout_secs == 0
            {
                return Err(ConfigError::InvalidValue {
                    key: "TOOL_CALL_TIMEOUT_SECS".to_string(),
                    reason: "timeouts must be greater than zero".to_string(),
                });
            }
            report.pass(
                "agent_limits",
                format!(
                    "max_turns={}, call_timeout={}s",
                    config.agent.max_turns, config.tool_host.call_timeout_secs
                ),
            );
        }
        Role::Host => {
            if config.index.api_key.is_none() {
                return Err(ConfigError::MissingCredential(
                    "LLAMA_CLOUD_API_KEY".to_string(),
                ));
            }
            report.pass("index_credential", "LLAMA_CLOUD_API_KEY present");

            if config.index.name.is_empty() {
                return Err(ConfigError::MissingSetting("INDEX_NAME".to_string()));
            }
            report.pass(
                "index_identity",
                format!("index '{}' in project '{}'", config.index.name, config.index.project_name),
            );

            if !config.index.query_template.contains("{query}") {
                return Err(ConfigError::InvalidValue {
                    key: "INDEX_QUERY_TEMPLATE".to_string(),
                    reason: "template must contain {query}".to_string(),
                });
            }
            report.pass("query_template", "query template well-formed");

            check_model(config, &mut report)?;
        }
    }

    Ok(report)
}

/// Both roles talk to a completion model: the agent to think, the host to
/// write answers from retrieved passages.
fn check_model(config: &Config, report: &mut PreflightReport) -> Result<(), ConfigError> {
    if config.llm.provider != "openai" {
        return Err(ConfigError::InvalidValue {
            key: "LLM_PROVIDER".to_string(),
            reason: format!("unsupported provider '{}'", config.llm.provider),
        });
    }
    if config.llm.openai_api_key.is_none() {
        return Err(ConfigError::MissingCredential("OPENAI_API_KEY".to_string()));
    }
    report.pass("model_credential", "OPENAI_API_KEY present");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_map("", &vars)
    }

    #[test]
    fn test_agent_requires_model_credential() {
        let err = run(&config(&[]), Role::Agent).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(ref k) if k == "OPENAI_API_KEY"));
    }

    #[test]
    fn test_agent_passes_with_credential() {
        let report = run(&config(&[("OPENAI_API_KEY", "sk-test")]), Role::Agent).unwrap();
        assert_eq!(report.checks.len(), 3);
    }

    #[test]
    fn test_agent_rejects_bad_url() {
        let err = run(
            &config(&[("OPENAI_API_KEY", "sk-test"), ("TOOL_HOST_URL", "not a url")]),
            Role::Agent,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TOOL_HOST_URL"));
    }

    #[test]
    fn test_agent_rejects_zero_turns() {
        let err = run(
            &config(&[("OPENAI_API_KEY", "sk-test"), ("AGENT_MAX_TURNS", "0")]),
            Role::Agent,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "AGENT_MAX_TURNS"));
    }

    #[test]
    fn test_unparseable_setting_fails_either_role() {
        let vars = [
            ("OPENAI_API_KEY", "sk-test"),
            ("LLAMA_CLOUD_API_KEY", "llx"),
            ("INDEX_NAME", "docs"),
            ("AGENT_MAX_TURNS", "abc"),
        ];
        for role in [Role::Agent, Role::Host] {
            let err = run(&config(&vars), role).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref reason }
                    if key == "AGENT_MAX_TURNS" && reason.contains("abc")
            ));
        }
    }

    #[test]
    fn test_host_requires_index_credential_and_name() {
        let err = run(&config(&[]), Role::Host).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(_)));

        let err = run(&config(&[("LLAMA_CLOUD_API_KEY", "llx")]), Role::Host).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting(ref k) if k == "INDEX_NAME"));

        let err = run(
            &config(&[("LLAMA_CLOUD_API_KEY", "llx"), ("INDEX_NAME", "docs")]),
            Role::Host,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(ref k) if k == "OPENAI_API_KEY"));

        let report = run(
            &config(&[
                ("LLAMA_CLOUD_API_KEY", "llx"),
                ("INDEX_NAME", "docs"),
                ("OPENAI_API_KEY", "sk-test"),
            ]),
            Role::Host,
        )
        .unwrap();
        assert_eq!(report.checks.len(), 4);
    }
}
