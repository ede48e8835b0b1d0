//! Launch preparation.
//!
//! A [`LaunchSpec`] is everything the supervisor needs to start a node: the
//! executable, its arguments and environment, where its data and logs live
//! and whether the data survives `stop`. It is built either directly from an
//! executable path or from an extracted server distribution, in which case
//! default settings are merged with user overrides and rendered as command
//! line options.

use crate::config::{DefaultSetting, NodeDefaults};
use crate::error::{NodeError, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static DISTRIBUTION_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"crate-(\d+)\.(\d+)\.(\d+)").expect("distribution version regex must compile")
});

/// A single setting value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Str(s) => f.write_str(s),
            SettingValue::Int(i) => write!(f, "{}", i),
            SettingValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Str(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Str(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<DefaultSetting> for SettingValue {
    fn from(value: DefaultSetting) -> Self {
        match value {
            DefaultSetting::Str(s) => SettingValue::Str(s.to_string()),
            DefaultSetting::Int(i) => SettingValue::Int(i),
            DefaultSetting::Bool(b) => SettingValue::Bool(b),
        }
    }
}

/// Settings keyed by dotted name.
pub type Settings = BTreeMap<String, SettingValue>;

/// Distribution version, as found in the `crate-X.Y.Z` directory name.
pub type Version = (u32, u32, u32);

/// User input for [`LaunchSpec::from_distribution`].
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    /// Settings overriding the defaults.
    pub settings: Settings,
    /// Extra environment variables for the process.
    pub env: HashMap<String, String>,
    /// Keep the data directory after `stop`.
    pub keep_data: bool,
}

/// Everything needed to launch and clean up one node.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Program to run.
    pub executable: PathBuf,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Environment variables added to the inherited environment.
    pub env: HashMap<String, String>,
    /// Working directory, if not the current one.
    pub working_dir: Option<PathBuf>,
    /// Data directories removed on `stop` unless `keep_data` is set.
    pub data_paths: Vec<PathBuf>,
    /// Directory holding `<cluster_name>.log`.
    pub logs_path: Option<PathBuf>,
    /// Cluster name, also the log file stem.
    pub cluster_name: String,
    /// Keep the data directories after `stop`.
    pub keep_data: bool,
}

impl LaunchSpec {
    /// Launch `executable` as is.
    pub fn new(executable: impl AsRef<Path>) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            data_paths: Vec::new(),
            logs_path: None,
            cluster_name: NodeDefaults::CLUSTER_NAME.to_string(),
            keep_data: false,
        }
    }

    /// Prepare a launch from an extracted distribution directory.
    ///
    /// A missing `path.data` setting gets a fresh temporary directory; a
    /// comma separated value names several data directories.
    pub fn from_distribution(dir: impl AsRef<Path>, options: NodeOptions) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(NodeError::config(format!(
                "Distribution directory not found: {}",
                dir.display()
            )));
        }

        let version = distribution_version(dir);
        let mut settings = merge_settings(version, options.settings);

        let data_value = match settings.get("path.data") {
            Some(value) => value.to_string(),
            None => create_data_dir()?.display().to_string(),
        };
        let logs_path = match settings.get("path.logs") {
            Some(value) => PathBuf::from(value.to_string()),
            None => dir.join(NodeDefaults::LOGS_DIR_NAME),
        };
        let cluster_name = match settings.get("cluster.name") {
            Some(value) => value.to_string(),
            None => NodeDefaults::CLUSTER_NAME.to_string(),
        };
        settings.insert("path.data".to_string(), data_value.clone().into());
        settings.insert("cluster.name".to_string(), cluster_name.clone().into());

        let executable = dir
            .join(NodeDefaults::BIN_DIR_NAME)
            .join(NodeDefaults::start_script());
        debug!(
            "Prepared launch of {} (version {:?})",
            executable.display(),
            version
        );

        Ok(Self {
            executable,
            args: format_settings(&settings, version),
            env: options.env,
            working_dir: None,
            data_paths: split_data_paths(&data_value),
            logs_path: Some(logs_path),
            cluster_name,
            keep_data: options.keep_data,
        })
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the data directories from a comma separated value.
    pub fn with_data_paths(mut self, value: &str) -> Self {
        self.data_paths = split_data_paths(value);
        self
    }

    /// Set the logs directory.
    pub fn with_logs_path(mut self, path: impl AsRef<Path>) -> Self {
        self.logs_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the cluster name.
    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    /// Keep the data directories after `stop`.
    pub fn with_keep_data(mut self, keep: bool) -> Self {
        self.keep_data = keep;
        self
    }

    /// Log file the node writes on its own, `<logs_path>/<cluster_name>.log`.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logs_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", self.cluster_name)))
    }
}

/// Extract the version from a `crate-X.Y.Z` path, defaulting to 1.0.0.
pub fn distribution_version(dir: &Path) -> Version {
    let text = dir.to_string_lossy();
    DISTRIBUTION_VERSION_RE
        .captures(&text)
        .and_then(|caps| {
            Some((
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
            ))
        })
        .unwrap_or((1, 0, 0))
}

/// Defaults, then version specific defaults, then user overrides.
pub fn merge_settings(version: Version, overrides: Settings) -> Settings {
    let mut settings: Settings = NodeDefaults::SETTINGS
        .iter()
        .map(|(key, value)| (key.to_string(), SettingValue::from(*value)))
        .collect();
    if version < (1, 1, 0) {
        settings.insert(
            "discovery.zen.ping.multicast.enabled".to_string(),
            SettingValue::Bool(false),
        );
    }
    settings.extend(overrides);
    settings
}

/// Render settings as command line options.
///
/// Versions before 1.0.0 take `-Des.key=value`, later ones `-Ckey=value`.
pub fn format_settings(settings: &Settings, version: Version) -> Vec<String> {
    let legacy = version < (1, 0, 0);
    settings
        .iter()
        .map(|(key, value)| {
            if legacy {
                format!("-Des.{}={}", key, value)
            } else {
                format!("-C{}={}", key, value)
            }
        })
        .collect()
}

/// Parse repeatable `key=value` options, splitting on the first `=`.
pub fn parse_options<I, S>(options: I) -> Result<BTreeMap<String, String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    options
        .into_iter()
        .map(|option| {
            let option = option.as_ref();
            match option.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
                _ => Err(NodeError::config(format!(
                    "Expected key=value, got {:?}",
                    option
                ))),
            }
        })
        .collect()
}

fn split_data_paths(value: &str) -> Vec<PathBuf> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn create_data_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(NodeDefaults::DATA_DIR_PREFIX)
        .tempdir()
        .map_err(|e| NodeError::io_with_path(e, std::env::temp_dir()))?;
    Ok(dir.keep())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn distribution(name: &str) -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join(name);
        std::fs::create_dir_all(dir.join("bin")).unwrap();
        (temp_dir, dir)
    }

    #[test]
    fn test_distribution_version() {
        assert_eq!(distribution_version(Path::new("/opt/crate-0.55.2")), (0, 55, 2));
        assert_eq!(
            distribution_version(Path::new("/cache/crate-4.1.0/")),
            (4, 1, 0)
        );
        assert_eq!(distribution_version(Path::new("/opt/server")), (1, 0, 0));
    }

    #[test]
    fn test_merge_settings_user_wins() {
        let mut overrides = Settings::new();
        overrides.insert("network.host".into(), "0.0.0.0".into());
        overrides.insert("discovery.zen.ping.multicast.enabled".into(), true.into());

        let settings = merge_settings((0, 57, 0), overrides);
        assert_eq!(settings["network.host"], SettingValue::from("0.0.0.0"));
        assert_eq!(
            settings["discovery.zen.ping.multicast.enabled"],
            SettingValue::Bool(true)
        );
        assert_eq!(settings["udc.enabled"], SettingValue::Bool(false));

        let settings = merge_settings((1, 1, 0), Settings::new());
        assert!(!settings.contains_key("discovery.zen.ping.multicast.enabled"));
    }

    #[test]
    fn test_format_settings() {
        let mut settings = Settings::new();
        settings.insert("udc.enabled".into(), false.into());
        settings.insert("discovery.initial_state_timeout".into(), SettingValue::Int(0));
        settings.insert("cluster.name".into(), "foo".into());

        assert_eq!(
            format_settings(&settings, (1, 0, 0)),
            vec![
                "-Ccluster.name=foo",
                "-Cdiscovery.initial_state_timeout=0",
                "-Cudc.enabled=false",
            ]
        );
        assert_eq!(
            format_settings(&settings, (0, 55, 0))[0],
            "-Des.cluster.name=foo"
        );
    }

    #[test]
    fn test_parse_options() {
        let opts = parse_options(["cluster.name=foo", "CRATE_JAVA_OPTS=\"-Dxy=foo\""]).unwrap();
        assert_eq!(opts["cluster.name"], "foo");
        assert_eq!(opts["CRATE_JAVA_OPTS"], "\"-Dxy=foo\"");

        assert!(parse_options(["novalue"]).is_err());
        assert!(parse_options(["=value"]).is_err());
    }

    #[test]
    fn test_from_distribution_defaults() {
        let (_temp, dir) = distribution("crate-4.0.0");
        let spec = LaunchSpec::from_distribution(&dir, NodeOptions::default()).unwrap();

        assert_eq!(spec.executable, dir.join("bin").join(NodeDefaults::start_script()));
        assert_eq!(spec.cluster_name, "noderun");
        assert_eq!(spec.logs_path, Some(dir.join("logs")));
        assert_eq!(spec.log_file(), Some(dir.join("logs").join("noderun.log")));
        assert_eq!(spec.data_paths.len(), 1);
        assert!(spec.data_paths[0].is_dir());
        assert!(spec.args.contains(&"-Cnetwork.host=127.0.0.1".to_string()));
        assert!(spec.args.contains(&"-Ccluster.name=noderun".to_string()));
        assert!(spec
            .args
            .contains(&format!("-Cpath.data={}", spec.data_paths[0].display())));
        assert!(!spec.keep_data);

        std::fs::remove_dir_all(&spec.data_paths[0]).unwrap();
    }

    #[test]
    fn test_from_distribution_with_overrides() {
        let (temp, dir) = distribution("crate-0.54.9");
        let mut options = NodeOptions {
            keep_data: true,
            ..Default::default()
        };
        let data = format!(
            "{},{}",
            temp.path().join("a").display(),
            temp.path().join("b").display()
        );
        options.settings.insert("path.data".into(), data.clone().into());
        options.settings.insert("cluster.name".into(), "it".into());
        options.env.insert("CRATE_HEAP_SIZE".into(), "256m".into());

        let spec = LaunchSpec::from_distribution(&dir, options).unwrap();

        assert_eq!(spec.data_paths, vec![temp.path().join("a"), temp.path().join("b")]);
        assert_eq!(spec.cluster_name, "it");
        assert!(spec.keep_data);
        assert_eq!(spec.env["CRATE_HEAP_SIZE"], "256m");
        assert!(spec.args.contains(&format!("-Des.path.data={}", data)));
        assert!(spec
            .args
            .contains(&"-Des.discovery.zen.ping.multicast.enabled=false".to_string()));
    }

    #[test]
    fn test_from_missing_distribution() {
        let result = LaunchSpec::from_distribution("/nonexistent/crate-1.0.0", NodeOptions::default());
        assert!(matches!(result, Err(NodeError::Config { .. })));
    }

    #[test]
    fn test_launch_spec_builder() {
        let spec = LaunchSpec::new("/bin/sh")
            .with_arg("-c")
            .with_args(["echo hi"])
            .with_env("A", "1")
            .with_data_paths("/tmp/a, /tmp/b")
            .with_logs_path("/var/log/node")
            .with_cluster_name("x")
            .with_keep_data(true);

        assert_eq!(spec.args, vec!["-c", "echo hi"]);
        assert_eq!(spec.env["A"], "1");
        assert_eq!(spec.data_paths, vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]);
        assert_eq!(spec.log_file(), Some(PathBuf::from("/var/log/node/x.log")));
        assert!(spec.keep_data);
        assert_eq!(LaunchSpec::new("/bin/true").log_file(), None);
    }
}
