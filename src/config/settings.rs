use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use super::cli::Cli;
use crate::xmpp::TlsMode;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/jibber/jibber.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Dump decoded payloads to stderr
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_template_dir")]
    pub dir: PathBuf,
    /// Entry fragment rendering starts from
    #[serde(default = "default_main_template")]
    pub main: String,
    /// Only files with this suffix are loaded
    #[serde(default = "default_template_suffix")]
    pub suffix: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Stdout,
    ModRest,
    Xmpp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub kind: OutputKind,
    #[serde(default)]
    pub mod_rest: ModRestConfig,
    #[serde(default)]
    pub xmpp: XmppConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModRestConfig {
    #[serde(default = "default_mod_rest_url")]
    pub url: String,
    #[serde(default = "default_mod_rest_from")]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default = "default_mod_rest_timeout")]
    pub timeout_secs: u64,
    /// Report relay failures to the webhook caller instead of only logging
    #[serde(default)]
    pub fail_on_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XmppConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Room JID when `join` is set, otherwise a destination template
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub join: bool,
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default)]
    pub tls: TlsMode,
    #[serde(default = "default_true")]
    pub verify_tls_host: bool,
    #[serde(default = "default_status")]
    pub status: String,
    pub status_msg: Option<String>,
    /// Message sent once after the initial connect
    pub presence: Option<String>,
    #[serde(default = "default_resource")]
    pub resource: String,
    #[serde(default)]
    pub xml_debug: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    65432
}

fn default_body_limit() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("/etc/jibber/tpl")
}

fn default_main_template() -> String {
    "main.tpl".to_string()
}

fn default_template_suffix() -> String {
    ".tpl".to_string()
}

fn default_mod_rest_url() -> String {
    "http://localhost:5280/rest".to_string()
}

fn default_mod_rest_from() -> String {
    "jira-notifier".to_string()
}

fn default_mod_rest_timeout() -> u64 {
    10
}

fn default_nick() -> String {
    "Jira".to_string()
}

fn default_true() -> bool {
    true
}

fn default_status() -> String {
    "online".to_string()
}

fn default_resource() -> String {
    "jibber".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_send_timeout() -> u64 {
    10
}

impl Settings {
    /// Load settings: defaults, then the TOML file, then `JIBBER__*`
    /// environment variables, then command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let (path, required) = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let builder = Self::defaults()?
            .add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            )
            // JIBBER__OUTPUT__KIND, JIBBER__OUTPUT__XMPP__PASSWORD, etc.
            .add_source(
                Environment::with_prefix("JIBBER")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::finish(cli.apply(builder)?)
    }

    /// Load settings from TOML text and arguments only.
    pub fn from_toml(toml: &str, cli: &Cli) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(cli.apply(builder)?)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("output.kind", "stdout")
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject a selected output whose required parameters are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.output.kind {
            OutputKind::Stdout => Ok(()),
            OutputKind::ModRest => {
                let c = &self.output.mod_rest;
                require("mod_rest", &[("url", c.url.as_str()), ("to", c.to.as_str())])
            }
            OutputKind::Xmpp => {
                let c = &self.output.xmpp;
                require(
                    "xmpp",
                    &[
                        ("host", c.host.as_str()),
                        ("user", c.user.as_str()),
                        ("password", c.password.as_str()),
                        ("to", c.to.as_str()),
                    ],
                )
            }
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn require(section: &str, fields: &[(&str, &str)]) -> Result<(), ConfigError> {
    let empty: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if empty.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Message(format!(
            "{section} output requires: {}",
            empty.join(", ")
        )))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: default_template_dir(),
            main: default_main_template(),
            suffix: default_template_suffix(),
        }
    }
}

impl Default for ModRestConfig {
    fn default() -> Self {
        Self {
            url: default_mod_rest_url(),
            from: default_mod_rest_from(),
            to: String::new(),
            timeout_secs: default_mod_rest_timeout(),
            fail_on_error: false,
        }
    }
}

impl Default for XmppConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
            to: String::new(),
            join: false,
            nick: default_nick(),
            tls: TlsMode::default(),
            verify_tls_host: true,
            status: default_status(),
            status_msg: None,
            presence: None,
            resource: default_resource(),
            xml_debug: false,
            connect_timeout_secs: default_connect_timeout(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("jibber").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_values() {
        let settings = Settings::from_toml("", &cli(&[])).unwrap();
        assert_eq!(settings.server_addr(), "0.0.0.0:65432");
        assert_eq!(settings.templates.main, "main.tpl");
        assert_eq!(settings.templates.dir, PathBuf::from("/etc/jibber/tpl"));
        assert_eq!(settings.output.kind, OutputKind::Stdout);
        assert_eq!(settings.log.format, LogFormat::Pretty);
    }

    #[test]
    fn test_toml_sections() {
        let toml = r#"
            [server]
            port = 8080

            [output]
            kind = "xmpp"

            [output.xmpp]
            host = "talk.example.org"
            user = "jira@example.org"
            password = "secret"
            to = "ops@conference.example.org"
            join = true
            tls = "starttls"
        "#;
        let settings = Settings::from_toml(toml, &cli(&[])).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.output.kind, OutputKind::Xmpp);
        assert!(settings.output.xmpp.join);
        assert_eq!(settings.output.xmpp.tls, TlsMode::StartTls);
        assert_eq!(settings.output.xmpp.nick, "Jira");
    }

    #[test]
    fn test_cli_overrides_file() {
        let toml = r#"
            [output]
            kind = "stdout"

            [templates]
            main = "file.tpl"
        "#;
        let args = cli(&[
            "-l",
            ":9000",
            "--tpl",
            "cli.tpl",
            "mod-rest",
            "--to",
            "ops@example.org",
        ]);
        let settings = Settings::from_toml(toml, &args).unwrap();
        assert_eq!(settings.server_addr(), "0.0.0.0:9000");
        assert_eq!(settings.templates.main, "cli.tpl");
        assert_eq!(settings.output.kind, OutputKind::ModRest);
        assert_eq!(settings.output.mod_rest.to, "ops@example.org");
        assert_eq!(settings.output.mod_rest.from, "jira-notifier");
    }

    #[test]
    fn test_xmpp_requires_credentials() {
        let err = Settings::from_toml("[output]\nkind = \"xmpp\"", &cli(&[])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("host"));
        assert!(message.contains("password"));
    }

    #[test]
    fn test_mod_rest_requires_recipient() {
        assert!(Settings::from_toml("", &cli(&["mod-rest"])).is_err());
    }
}
