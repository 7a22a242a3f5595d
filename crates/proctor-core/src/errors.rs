use std::fmt;

/// Configuration problem detected while loading or applying `proctor.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Returns the config error buried in an anyhow chain, if there is one.
pub fn as_config_error(err: &anyhow::Error) -> Option<&ConfigError> {
    err.chain().find_map(|e| e.downcast_ref::<ConfigError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn config_error_is_found_through_context() {
        let err: anyhow::Result<()> =
            Err(ConfigError("bad threshold".into())).context("loading proctor.yaml");
        let err = err.unwrap_err();
        let found = as_config_error(&err).expect("config error in chain");
        assert_eq!(found.0, "bad threshold");
    }

    #[test]
    fn plain_errors_are_not_config_errors() {
        let err = anyhow::anyhow!("disk full");
        assert!(as_config_error(&err).is_none());
    }
}
