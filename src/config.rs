//! 配置文件加载
//!
//! 根据扩展名解析 YAML / JSON5 / TOML，解析前展开 `${VAR}` 环境变量。
//!
//! ```yaml
//! backend:
//!   endpoint: http://127.0.0.1:9000
//!   access_key_id: ${S3_ACCESS_KEY}
//!   secret_access_key: ${S3_SECRET_KEY}
//! transfer:
//!   multipart_threshold: 104857600
//! teardown:
//!   concurrency: 4
//! operation_timeout: 1m30s
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DeserializeAs, SerializeAs};

use crate::backend::AwsS3BackendConfig;
use crate::error::StorageError;
use crate::types::{TeardownOptions, TransferOptions};

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, PartialEq)]
#[serde(default)]
pub struct SimpleS3Config {
    #[garde(dive)]
    pub backend: AwsS3BackendConfig,

    #[garde(dive)]
    pub transfer: TransferOptions,

    #[garde(dive)]
    pub teardown: TeardownOptions,

    /// 单次命令的超时时间，如 "30s"、"1m30s"
    #[serde_as(as = "Option<HumanDur>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub operation_timeout: Option<Duration>,
}

impl SimpleS3Config {
    /// 从文件加载并校验，格式由扩展名决定
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Configuration(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;

        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("yaml")
            .to_ascii_lowercase();

        let config = Self::parse(&expand_env_vars(&content), &format)
            .map_err(|e| StorageError::Configuration(format!("{}: {}", path.display(), e)))?;
        config.check()?;
        Ok(config)
    }

    /// 按格式解析，不做校验
    pub fn parse(content: &str, format: &str) -> Result<Self, String> {
        match format {
            "yaml" | "yml" => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            "json" | "json5" => json5::from_str(content).map_err(|e| e.to_string()),
            "toml" => toml::from_str(content).map_err(|e| e.to_string()),
            _ => Err(format!("不支持的配置格式: {}", format)),
        }
    }

    pub fn check(&self) -> Result<(), StorageError> {
        self.validate()
            .map_err(|e| StorageError::Configuration(e.to_string()))?;
        self.backend.check()
    }

    /// 默认配置路径 `~/.simple-s3/config.yaml`
    pub fn default_path() -> Result<PathBuf, StorageError> {
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::Configuration("无法获取 home 目录".to_string()))?;
        Ok(home.join(".simple-s3").join("config.yaml"))
    }

    /// 解析命令行给出的路径，支持 `~`
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf, StorageError> {
        match path {
            Some(p) => Ok(PathBuf::from(shellexpand::tilde(p).to_string())),
            None => Self::default_path(),
        }
    }
}

/// 展开 `${VAR}`，未定义的变量保留原样
pub fn expand_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return content.to_string();
    };

    re.replace_all(content, |caps: &regex_lite::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// 可读的时间长度格式，如 "3s"、"100ms"、"1h30m"
pub struct HumanDur;

impl SerializeAs<Duration> for HumanDur {
    fn serialize_as<S>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDur {
    fn deserialize_as<D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Err("空的时间长度".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s.as_str();
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(format!("期望数字: {}", s));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| format!("无效数字: {}", &rest[..number_end]))?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_end] {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            "" => return Err(format!("缺少时间单位: {}", s)),
            unit => return Err(format!("不支持的时间单位: {}", unit)),
        };
        rest = &rest[unit_end..];
        let part = Duration::try_from_secs_f64(seconds)
            .map_err(|_| format!("时间长度超出范围: {}", s))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("时间长度超出范围: {}", s))?;
    }

    Ok(total)
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    if secs == 0 {
        return format!("{}ms", millis);
    }

    let mut out = String::new();
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    match (s, millis) {
        (_, 0) if s > 0 => out.push_str(&format!("{}s", s)),
        (_, 0) => {}
        _ => out.push_str(&format!("{}ms", s * 1000 + millis as u64)),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 1.5S ").unwrap(), Duration::from_millis(1500));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        assert!(parse_duration("99999999999999999999999s").is_err());
        assert!(parse_duration("18446744073709551615s1h").is_err());

        let err = SimpleS3Config::parse("operation_timeout: 99999999999999999999999s", "yaml")
            .unwrap_err();
        assert!(err.contains("超出范围"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }

    #[test]
    fn test_parse_all_formats() {
        let yaml = r#"
backend:
  region: eu-west-1
teardown:
  concurrency: 4
operation_timeout: 1m
"#;
        let json5 = r#"{
  // 注释
  backend: { region: "eu-west-1" },
  teardown: { concurrency: 4 },
  operation_timeout: "1m",
}"#;
        let toml = r#"
operation_timeout = "1m"

[backend]
region = "eu-west-1"

[teardown]
concurrency = 4
"#;

        for (content, format) in [(yaml, "yaml"), (json5, "json5"), (toml, "toml")] {
            let config = SimpleS3Config::parse(content, format).unwrap();
            assert_eq!(config.backend.region, "eu-west-1", "{}", format);
            assert_eq!(config.teardown.concurrency, 4);
            assert_eq!(config.teardown.batch_size, 1000);
            assert_eq!(config.transfer, TransferOptions::default());
            assert_eq!(config.operation_timeout, Some(Duration::from_secs(60)));
        }

        assert!(SimpleS3Config::parse("a = 1", "ini").is_err());
    }

    #[test]
    fn test_serialize_roundtrip_keeps_human_duration() {
        let config = SimpleS3Config {
            operation_timeout: Some(Duration::from_secs(90)),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("operation_timeout: 1m30s"));
        assert_eq!(SimpleS3Config::parse(&yaml, "yaml").unwrap(), config);
    }

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("SIMPLE_S3_TEST_KEY", "AKIA-TEST");
        std::env::remove_var("SIMPLE_S3_TEST_UNSET");

        let expanded = expand_env_vars("id: ${SIMPLE_S3_TEST_KEY}\nsecret: ${SIMPLE_S3_TEST_UNSET}");
        assert_eq!(expanded, "id: AKIA-TEST\nsecret: ${SIMPLE_S3_TEST_UNSET}");

        std::env::remove_var("SIMPLE_S3_TEST_KEY");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        std::env::set_var("SIMPLE_S3_TEST_SECRET", "s3cr3t");

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "backend:\n  endpoint: http://127.0.0.1:9000\n  access_key_id: minio\n  secret_access_key: ${{SIMPLE_S3_TEST_SECRET}}\noperation_timeout: 30s"
        )
        .unwrap();

        let config = SimpleS3Config::load(file.path()).unwrap();
        assert_eq!(config.backend.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(config.backend.secret_access_key.as_deref(), Some("s3cr3t"));
        assert_eq!(config.operation_timeout, Some(Duration::from_secs(30)));

        std::env::remove_var("SIMPLE_S3_TEST_SECRET");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[transfer]\npart_size = 1024").unwrap();
        let err = SimpleS3Config::load(file.path()).unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "backend:\n  endpoint: not a url").unwrap();
        assert!(SimpleS3Config::load(file.path()).is_err());

        assert!(SimpleS3Config::load("/nonexistent/simple-s3.yaml").is_err());
    }

    #[test]
    fn test_resolve_path() {
        let explicit = SimpleS3Config::resolve_path(Some("/etc/simple-s3.yaml")).unwrap();
        assert_eq!(explicit, PathBuf::from("/etc/simple-s3.yaml"));

        if let Some(home) = dirs::home_dir() {
            let default = SimpleS3Config::resolve_path(None).unwrap();
            assert_eq!(default, home.join(".simple-s3").join("config.yaml"));
            let tilde = SimpleS3Config::resolve_path(Some("~/cfg.yaml")).unwrap();
            assert_eq!(tilde, home.join("cfg.yaml"));
        }
    }
}
