use crate::error::{ErrorKind, Result};
use crate::target::{SourceConfig, TargetConfig};
use exn::ResultExt;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_THREADS: usize = 100;
pub const DEFAULT_MANIFEST_NAME: &str = "staticfiles.json";
/// Text-like content types that compress well.
pub const DEFAULT_GZIP_CONTENT_TYPES: &[&str] = &[
    "text/css",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "image/svg+xml",
];

const ENV_PREFIX: &str = "COLLECTFAST_";

/// Which comparison approach to publish with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Local MD5 against the object store's ETag.
    Hash,
    /// Let the object store compare digests in a single conditional request.
    RemoteNative,
    /// Modification times against a mirrored directory, one lookup per file.
    MirroredPlain,
    /// Modification times against a mirrored directory, one listing per run.
    MirroredCaching,
}
impl StrategyKind {
    /// Whether this strategy understands object storage metadata (as opposed
    /// to a mirrored filesystem).
    pub fn is_object_storage(&self) -> bool {
        matches!(self, Self::Hash | Self::RemoteNative)
    }
}

/// Where two-pass publishing keeps its staged files before pass two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Staging {
    #[default]
    Memory,
    /// A temporary directory, removed when the run ends.
    Filesystem,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GzipSettings {
    pub enabled: bool,
    pub content_types: Vec<String>,
}
impl Default for GzipSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            content_types: DEFAULT_GZIP_CONTENT_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
impl GzipSettings {
    /// Whether a file with this content type gets compressed before upload.
    pub fn applies_to(&self, content_type: &str) -> bool {
        self.enabled && self.content_types.iter().any(|t| t.eq_ignore_ascii_case(content_type))
    }
}

/// Everything a publish run needs to know.
///
/// # Examples
///
/// ```
/// use collectfast_config::{Settings, StrategyKind};
///
/// let settings = Settings {
///     strategy: Some(StrategyKind::Hash),
///     threads: 8,
///     ..Settings::default()
/// };
/// assert!(settings.validate().is_ok());
/// assert!(settings.enabled);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Kill switch. When `false` the host command falls back to plain
    /// copy-everything behaviour and no strategy is built.
    pub enabled: bool,
    pub strategy: Option<StrategyKind>,
    /// Stage hashed copies and a manifest first, then publish them all.
    pub two_pass: bool,
    pub staging: Staging,
    pub manifest_name: PathBuf,
    /// Upper bound on files being processed concurrently.
    pub threads: usize,
    /// Stop scheduling new files after the first failure.
    pub fail_fast: bool,
    /// Fetch all remote metadata in one listing up front.
    pub preload_metadata: bool,
    pub gzip: GzipSettings,
    pub sources: Vec<SourceConfig>,
    pub target: TargetConfig,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: None,
            two_pass: false,
            staging: Staging::default(),
            manifest_name: PathBuf::from(DEFAULT_MANIFEST_NAME),
            threads: DEFAULT_THREADS,
            fail_fast: false,
            preload_metadata: false,
            gzip: GzipSettings::default(),
            sources: Vec::new(),
            target: TargetConfig::default(),
        }
    }
}

impl Settings {
    /// Default location of the config file, e.g.
    /// `~/.config/collectfast/collectfast.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "collectfast").map(|dirs| dirs.config_dir().join("collectfast.toml"))
    }

    /// Build the layered [`Figment`] without extracting it.
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// if there's a file there.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = Self::merge_file(figment, path)?;
            },
            None => {
                if let Some(default) = Self::default_path().filter(|p| p.is_file()) {
                    figment = Self::merge_file(figment, &default)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        tracing::debug!(path = %path.display(), "Loading configuration file");
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        })
    }

    /// Extract and validate settings from a figment.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let settings: Self = figment.extract().or_raise(|| ErrorKind::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load defaults, the config file and the environment, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(path)?)
    }

    /// Reject values that can't work no matter which backend is used.
    ///
    /// Strategy and backend compatibility is checked later, once the target
    /// backend exists.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            exn::bail!(ErrorKind::Invalid("threads must be at least 1".to_string()));
        }
        let manifest_is_plain = self.manifest_name.components().count() > 0
            && self.manifest_name.components().all(|c| matches!(c, Component::Normal(_)));
        if !manifest_is_plain {
            exn::bail!(ErrorKind::Invalid(format!(
                "manifest name `{}` must be a relative path",
                self.manifest_name.display()
            )));
        }
        if self.two_pass && matches!(self.strategy, Some(StrategyKind::MirroredPlain | StrategyKind::MirroredCaching)) {
            exn::bail!(ErrorKind::Invalid("two-pass publishing needs an object storage strategy".to_string()));
        }
        for source in &self.sources {
            source.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.enabled);
        assert_eq!(settings.strategy, None);
        assert_eq!(settings.threads, 100);
        assert_eq!(settings.manifest_name, Path::new("staticfiles.json"));
        assert!(!settings.gzip.enabled);
        assert!(settings.gzip.content_types.iter().any(|t| t == "text/css"));
        assert_eq!(settings.target, TargetConfig::Memory);
    }

    #[test]
    fn test_load_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "collectfast.toml",
                r#"
                strategy = "hash"
                threads = 8
                preload_metadata = true

                [gzip]
                enabled = true

                [[sources]]
                path = "/srv/app/static"

                [[sources]]
                path = "/srv/admin/static"
                prefix = "admin"

                [target]
                type = "local"
                path = "/srv/www/static"
                "#,
            )?;
            let settings = Settings::load(Some(Path::new("collectfast.toml"))).unwrap();
            assert_eq!(settings.strategy, Some(StrategyKind::Hash));
            assert_eq!(settings.threads, 8);
            assert!(settings.preload_metadata);
            assert!(settings.gzip.enabled);
            assert!(!settings.gzip.content_types.is_empty());
            assert_eq!(settings.sources.len(), 2);
            assert_eq!(settings.sources[1].prefix.as_deref(), Some(Path::new("admin")));
            assert_eq!(
                settings.target,
                TargetConfig::Local {
                    path: PathBuf::from("/srv/www/static")
                }
            );
            Ok(())
        });
    }

    #[test]
    fn test_load_yaml_file() {
        Jail::expect_with(|jail| {
            jail.create_file("collectfast.yml", "strategy: mirrored_caching\nfail_fast: true\n")?;
            let settings = Settings::load(Some(Path::new("collectfast.yml"))).unwrap();
            assert_eq!(settings.strategy, Some(StrategyKind::MirroredCaching));
            assert!(settings.fail_fast);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("collectfast.json", r#"{"strategy": "hash", "threads": 8}"#)?;
            jail.set_env("COLLECTFAST_THREADS", "4");
            jail.set_env("COLLECTFAST_ENABLED", "false");
            jail.set_env("COLLECTFAST_GZIP__ENABLED", "true");
            let settings = Settings::load(Some(Path::new("collectfast.json"))).unwrap();
            assert_eq!(settings.threads, 4);
            assert!(!settings.enabled);
            assert!(settings.gzip.enabled);
            assert_eq!(settings.strategy, Some(StrategyKind::Hash));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_missing_file() {
        Jail::expect_with(|_jail| {
            let err = Settings::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_format() {
        Jail::expect_with(|jail| {
            jail.create_file("collectfast.ini", "threads = 4")?;
            let err = Settings::load(Some(Path::new("collectfast.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file("collectfast.toml", r#"strategy = "telepathy""#)?;
            let err = Settings::load(Some(Path::new("collectfast.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Parse));
            Ok(())
        });
    }

    #[rstest]
    #[case::zero_threads(Settings { threads: 0, ..Settings::default() })]
    #[case::absolute_manifest(Settings { manifest_name: PathBuf::from("/tmp/staticfiles.json"), ..Settings::default() })]
    #[case::escaping_manifest(Settings { manifest_name: PathBuf::from("../staticfiles.json"), ..Settings::default() })]
    #[case::empty_manifest(Settings { manifest_name: PathBuf::new(), ..Settings::default() })]
    #[case::two_pass_mirror(Settings { two_pass: true, strategy: Some(StrategyKind::MirroredPlain), ..Settings::default() })]
    fn test_invalid(#[case] settings: Settings) {
        let err = settings.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[rstest]
    #[case(StrategyKind::Hash, true)]
    #[case(StrategyKind::RemoteNative, true)]
    #[case(StrategyKind::MirroredPlain, false)]
    #[case(StrategyKind::MirroredCaching, false)]
    fn test_strategy_storage_kind(#[case] kind: StrategyKind, #[case] object_storage: bool) {
        assert_eq!(kind.is_object_storage(), object_storage);
    }

    #[rstest]
    #[case(true, "text/css", true)]
    #[case(true, "TEXT/CSS", true)]
    #[case(true, "image/png", false)]
    #[case(false, "text/css", false)]
    fn test_gzip_applies_to(#[case] enabled: bool, #[case] content_type: &str, #[case] expected: bool) {
        let gzip = GzipSettings {
            enabled,
            ..GzipSettings::default()
        };
        assert_eq!(gzip.applies_to(content_type), expected);
    }
}
