//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Serialize config to TOML string (single source of truth for format)
    pub fn to_toml(&self) -> String {
        format!(
            r#"# canter configuration

# Base endpoint of the chat service (CANTER_API_URL overrides)
api_url = "{api_url}"

# Where the session token is persisted across runs (CANTER_SESSION_FILE overrides)
session_file = "{session_file}"

# Fold case in the chat list's fuzzy filter
case_insensitive_search = {case_insensitive}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# File logging (in addition to the in-TUI log line)
file_enabled = {log_file_enabled}
file_dir = "{log_file_dir}"
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"
"#,
            api_url = self.api_url,
            session_file = self.session_file.display(),
            case_insensitive = self.case_insensitive_search,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = self.logging.file_dir.display(),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = self.logging.file_prefix,
        )
    }
}
