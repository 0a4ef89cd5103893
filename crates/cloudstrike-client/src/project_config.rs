//! Discovery of `cloudstrike.yaml` and the override chain on top of it.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file,
//! `CLOUDSTRIKE_CATALOG_URL`, then command-line flags.

use std::path::{Path, PathBuf};

use cloudstrike_core::config::{load_config, ConfigError, ViewerConfig};

use crate::cli::CliArgs;

pub const CONFIG_FILE: &str = "cloudstrike.yaml";
pub const CATALOG_URL_ENV: &str = "CLOUDSTRIKE_CATALOG_URL";

/// Walk up from `start_dir` looking for `cloudstrike.yaml`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Resolved configuration plus the directory it was found in (used for
/// `input/bindings.yaml`).
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ViewerConfig,
    pub root: PathBuf,
}

/// Load the configuration for `args`, starting the search at `cwd`.
pub fn resolve(args: &CliArgs, cwd: &Path) -> Result<ResolvedConfig, ConfigError> {
    let path = match &args.config {
        Some(explicit) => Some(PathBuf::from(explicit)),
        None => find_config(cwd),
    };

    let (mut config, root) = match path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            let config = load_config(&path)?;
            let root = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf());
            (config, root)
        }
        None => {
            tracing::info!("No {} found, using defaults", CONFIG_FILE);
            (ViewerConfig::default(), cwd.to_path_buf())
        }
    };

    apply_overrides(&mut config, std::env::var(CATALOG_URL_ENV).ok(), args);
    config.validate()?;
    Ok(ResolvedConfig { config, root })
}

pub fn apply_overrides(config: &mut ViewerConfig, env_catalog_url: Option<String>, args: &CliArgs) {
    if let Some(url) = env_catalog_url.filter(|u| !u.is_empty()) {
        config.catalog_url = url;
    }
    if let Some(url) = &args.catalog_url {
        config.catalog_url = url.clone();
    }
    if let Some(stride) = args.stride {
        config.assets.decimation_stride = stride;
    }
    config.catalog_url = config.catalog_url.trim_end_matches('/').to_string();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cloudstrike_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_find_config_walks_up() {
        let root = temp_dir("find");
        let nested = root.join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE), "catalog_url: http://x\n").unwrap();

        assert_eq!(find_config(&nested), Some(root.join(CONFIG_FILE)));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_override_precedence() {
        let mut config = ViewerConfig::default();
        let args = CliArgs::parse_from(["cloudstrike"]);
        apply_overrides(&mut config, Some("https://env.example/".into()), &args);
        assert_eq!(config.catalog_url, "https://env.example");

        let args = CliArgs::parse_from(["cloudstrike", "--catalog-url", "https://cli.example", "--stride", "3"]);
        apply_overrides(&mut config, Some("https://env.example".into()), &args);
        assert_eq!(config.catalog_url, "https://cli.example");
        assert_eq!(config.assets.decimation_stride, 3);
    }

    #[test]
    fn test_resolve_explicit_file() {
        let root = temp_dir("explicit");
        let path = root.join("custom.yaml");
        std::fs::write(&path, "enemies:\n  spawn_radius: 3.0\n").unwrap();
        let args = CliArgs::parse_from(["cloudstrike", "--config", path.to_str().unwrap()]);

        let resolved = resolve(&args, Path::new("/")).unwrap();
        assert_eq!(resolved.config.enemies.spawn_radius, 3.0);
        assert_eq!(resolved.root, root);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_zero_stride_flag_rejected() {
        let root = temp_dir("stride");
        let args = CliArgs::parse_from(["cloudstrike", "--stride", "0"]);
        assert!(resolve(&args, &root).is_err());
        let _ = std::fs::remove_dir_all(&root);
    }
}
