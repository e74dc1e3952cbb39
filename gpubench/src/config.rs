use std::path::Path;

use tracing::info;

use crate::{validate, BenchConfig, Result};

/// Parse a JSON config. Missing fields take their defaults.
pub fn from_json(json: &str) -> Result<BenchConfig> {
    let config: BenchConfig = serde_json::from_str(json)?;
    validate(&config)?;
    Ok(config)
}

pub fn load(path: impl AsRef<Path>) -> Result<BenchConfig> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let config = from_json(&json)?;
    info!(path = %path.display(), ?config, "config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, InputFill};
    use tempfile::TempDir;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = from_json(r#"{ "problem_size": 1000 }"#).unwrap();
        assert_eq!(config.problem_size, 1000);
        assert_eq!(config.threadgroup_width, 512);
        assert_eq!(config.input, InputFill::Ones);
    }

    #[test]
    fn test_random_input() {
        let config = from_json(r#"{ "input": { "random": { "seed": 7 } } }"#).unwrap();
        assert_eq!(config.input, InputFill::Random { seed: 7 });
    }

    #[test]
    fn test_invalid_width_rejected() {
        let err = from_json(r#"{ "threadgroup_width": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_unknown_backend_bits_rejected() {
        let err = from_json(r#"{ "backends_bits": 1073741824 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(from_json("{ nope"), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bench.json");
        std::fs::write(&path, r#"{ "problem_size": 4096, "threadgroup_width": 64 }"#).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.problem_size, 4096);
        assert_eq!(config.threadgroup_width, 64);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = load(temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
