use std::{fs, path::Path};

use serde::Deserialize;

/// Engine configuration.
///
/// Thresholds default to values safely below the payload and event-count
/// ceilings of common serverless execution substrates; override them through
/// a TOML file when the substrate differs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// maximum number of contiguous segments assigned to one chunk
    pub max_segments_per_chunk: usize,
    /// serialized payloads above this many bytes are offloaded to the object store
    pub inline_payload_limit: usize,
    /// stop iterating a chunk slice after the first failed segment
    pub fail_fast: bool,
    /// maximum entries retained in the in-state conversation message window
    pub message_window_size: usize,
    /// time-to-live for resumption tokens, in seconds
    pub token_ttl_secs: u64,
    /// maximum length of a composed storage key
    pub max_key_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_segments_per_chunk: 10,
            inline_payload_limit: 180 * 1024,
            fail_fast: true,
            message_window_size: 20,
            token_ttl_secs: 3 * 24 * 3600,
            max_key_length: 256,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Self {
        let data = fs::read_to_string(path.as_ref()).expect(&format!("failed to load config file {:?}", path.as_ref()));

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Self {
        let config = toml::from_str::<Config>(toml_str).expect("failed to parse the toml str");
        config
    }
}

#[cfg(test)]
mod test {
    use crate::Config;

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        max_segments_per_chunk = 4
        inline_payload_limit = 65536
        fail_fast = false
        "#;
        let config = Config::load_from_str(toml_str);
        assert_eq!(config.max_segments_per_chunk, 4);
        assert_eq!(config.inline_payload_limit, 65536);
        assert!(!config.fail_fast);
        // unspecified fields fall back to defaults
        assert_eq!(config.message_window_size, 20);
        assert_eq!(config.max_key_length, 256);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(config.fail_fast);
        assert_eq!(config.token_ttl_secs, 3 * 24 * 3600);
    }
}
