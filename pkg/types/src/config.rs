use serde::{Deserialize, Serialize};

/// Mirroring controller configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// data-dir: /var/lib/slicemirror/data
/// max-endpoints-per-subset: 1000
/// sync-interval-secs: 10
/// log-format: json
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigFile {
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default, alias = "max-endpoints-per-subset")]
    pub max_endpoints_per_subset: Option<usize>,
    #[serde(default, alias = "sync-interval-secs")]
    pub sync_interval_secs: Option<u64>,
    #[serde(default, alias = "log-format")]
    pub log_format: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_keys() {
        let yaml = "data-dir: /data\nmax-endpoints-per-subset: 250\nsync-interval-secs: 5\n";
        let cfg: ControllerConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.data_dir.as_deref(), Some("/data"));
        assert_eq!(cfg.max_endpoints_per_subset, Some(250));
        assert_eq!(cfg.sync_interval_secs, Some(5));
        assert!(cfg.log_format.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg: ControllerConfigFile =
            load_config_file("/nonexistent/slicemirror/config.yaml").unwrap();
        assert!(cfg.data_dir.is_none());
        assert!(cfg.max_endpoints_per_subset.is_none());
    }
}
