//! CLI utilities for binaries

use std::path::PathBuf;

/// Environment variable naming the settings file
pub const SETTINGS_ENV_VAR: &str = "FLEET_CONFIG_PATH";

/// Default settings file, relative to the working directory
pub const DEFAULT_SETTINGS_PATH: &str = "config.json";

/// Resolve the settings path from the environment or the default
pub fn settings_path_from_env() -> PathBuf {
    std::env::var(SETTINGS_ENV_VAR)
        .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string())
        .into()
}

/// Command line arguments, program name excluded
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_the_default_path() {
        std::env::remove_var(SETTINGS_ENV_VAR);
        assert_eq!(
            settings_path_from_env().to_str().unwrap(),
            DEFAULT_SETTINGS_PATH
        );
    }
}
