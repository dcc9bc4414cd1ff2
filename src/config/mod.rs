mod cli;
mod settings;

pub use cli::{parse_listen, Backend, Cli, ModRestArgs, XmppArgs};
pub use settings::{
    LogConfig, LogFormat, ModRestConfig, OutputConfig, OutputKind, ServerConfig, Settings,
    TemplateConfig, XmppConfig, DEFAULT_CONFIG_PATH,
};
