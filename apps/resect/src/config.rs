//! 运行配置. 先读取 TOML 配置文件 (可选), 再用环境变量覆盖单个参数.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use resect_core::config::ResectConfig;
use serde::Deserialize;

/// 运行配置.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 核心算法参数.
    #[serde(flatten)]
    pub core: ResectConfig,

    /// 外部工具输出所在目录. 缺省为 `<output_dir>/prepared`.
    pub prepared_dir: Option<PathBuf>,

    /// 是否同时保存工作空间中的中间结果.
    pub save_intermediates: bool,
}

/// 获取配置文件路径.
///
/// 1. 若环境变量 `$RESECT_CONFIG` 非空, 则返回其值;
/// 2. 否则, 返回 `<config_dir>/resect/config.toml`.
pub fn config_path_from_env_or_home() -> Option<PathBuf> {
    match env::var("RESECT_CONFIG") {
        Ok(p) if !p.is_empty() => Some(PathBuf::from(p)),
        _ => dirs::config_dir().map(|d| d.join("resect").join("config.toml")),
    }
}

impl AppConfig {
    /// 解析 TOML 文本.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// 读取配置文件. 文件不存在时使用缺省配置.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// 按 `$RESECT_CONFIG` 或缺省位置读取, 再应用环境变量覆盖.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match config_path_from_env_or_home() {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|k| env::var(k).ok())?;
        Ok(cfg)
    }

    /// 用 `lookup` 给出的值覆盖参数. 空字符串视为未设置.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("RESECT_MIN_FRAGMENT_VOXELS") {
            self.core.growth.min_fragment_voxels = v
                .trim()
                .parse()
                .with_context(|| format!("RESECT_MIN_FRAGMENT_VOXELS=`{v}`"))?;
        }
        if let Some(v) = get("RESECT_CONVERGENCE_VOXELS") {
            self.core.growth.convergence_voxels = v
                .trim()
                .parse()
                .with_context(|| format!("RESECT_CONVERGENCE_VOXELS=`{v}`"))?;
        }
        if let Some(v) = get("RESECT_BOUNDARY_CUTOFF") {
            self.core.admission.cutoff = v
                .trim()
                .parse()
                .with_context(|| format!("RESECT_BOUNDARY_CUTOFF=`{v}`"))?;
        }
        if let Some(v) = get("RESECT_PREPARED_DIR") {
            self.prepared_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// 外部工具输出所在目录.
    pub fn prepared_dir_for(&self, output_dir: &Path) -> PathBuf {
        self.prepared_dir
            .clone()
            .unwrap_or_else(|| output_dir.join("prepared"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();
        assert_eq!(cfg.core, ResectConfig::default());
        assert_eq!(cfg.core.growth.min_fragment_voxels, 30);
        assert_eq!(cfg.core.growth.convergence_voxels, 100);
        assert_eq!(cfg.core.admission.cutoff, 3.0);
        assert!(!cfg.save_intermediates);
        assert_eq!(
            cfg.prepared_dir_for(Path::new("out")),
            Path::new("out").join("prepared")
        );
    }

    #[test]
    fn test_partial_toml() {
        let cfg = AppConfig::from_toml(
            r#"
            save_intermediates = true
            hyper_percentile = 98.5

            [growth]
            convergence_voxels = 50

            [classifier]
            prior_weight = 0.5
            "#,
        )
        .unwrap();
        assert!(cfg.save_intermediates);
        assert_eq!(cfg.core.hyper_percentile, 98.5);
        assert_eq!(cfg.core.growth.convergence_voxels, 50);
        assert_eq!(cfg.core.growth.min_fragment_voxels, 30);
        assert_eq!(cfg.core.classifier.prior_weight, 0.5);
        assert_eq!(cfg.core.classifier.max_iterations, 50);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(|k| match k {
            "RESECT_MIN_FRAGMENT_VOXELS" => Some("12".to_string()),
            "RESECT_BOUNDARY_CUTOFF" => Some(" 2.5 ".to_string()),
            "RESECT_CONVERGENCE_VOXELS" => Some(String::new()),
            "RESECT_PREPARED_DIR" => Some("/tmp/prep".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.core.growth.min_fragment_voxels, 12);
        assert_eq!(cfg.core.growth.convergence_voxels, 100);
        assert_eq!(cfg.core.admission.cutoff, 2.5);
        assert_eq!(cfg.prepared_dir_for(Path::new("out")), PathBuf::from("/tmp/prep"));

        let mut bad = AppConfig::default();
        assert!(bad
            .apply_overrides(|k| (k == "RESECT_CONVERGENCE_VOXELS").then(|| "many".to_string()))
            .is_err());
    }
}
