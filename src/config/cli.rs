use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};

/// Jira to Jabber notification bridge.
///
/// Receives webhook POSTs, renders them through a template directory and
/// sends the result to the selected backend.
#[derive(Debug, Default, Parser)]
#[command(name = "jibber", version)]
pub struct Cli {
    /// Settings file (TOML) [default: /etc/jibber/jibber.toml]
    #[arg(short, long, env = "JIBBER_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// HTTP address to listen on, `host:port` or `:port`
    #[arg(short = 'l', long = "listen", value_name = "LISTEN-ADDR")]
    pub listen: Option<String>,

    /// Template dir to form messages
    #[arg(long, value_name = "DIR")]
    pub tpl_dir: Option<PathBuf>,

    /// Main template to start from
    #[arg(long, value_name = "TPL-NAME")]
    pub tpl: Option<String>,

    /// Print every decoded webhook payload to stderr
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub backend: Option<Backend>,
}

#[derive(Debug, Subcommand)]
pub enum Backend {
    /// Print formed messages to stdout, for debugging
    Stdout,
    /// Use the ejabberd mod_rest module (no rooms, no auth)
    ModRest(ModRestArgs),
    /// Full XMPP client with room support
    Xmpp(XmppArgs),
}

#[derive(Debug, Args)]
pub struct ModRestArgs {
    /// mod_rest endpoint URL
    #[arg(long, value_name = "MOD-REST-URL")]
    pub url: Option<String>,

    /// Jabber ID to send messages to
    #[arg(long, value_name = "SEND-TO")]
    pub to: Option<String>,

    /// Jabber ID to send messages from (can be any)
    #[arg(long, value_name = "SEND-FROM")]
    pub from: Option<String>,
}

#[derive(Debug, Args)]
pub struct XmppArgs {
    /// Jabber server, `host` or `host:port`
    #[arg(long, value_name = "HOSTNAME")]
    pub host: Option<String>,

    /// JID to log in as
    #[arg(long, value_name = "USERNAME")]
    pub user: Option<String>,

    /// Password for that JID
    #[arg(long, value_name = "PASSWORD")]
    pub pass: Option<String>,

    /// Room to join, or a template computing the recipient per message
    #[arg(long, value_name = "SEND-TO")]
    pub to: Option<String>,

    /// Join the room given as --to
    #[arg(long)]
    pub join: bool,

    /// Nick used in the room
    #[arg(long, value_name = "NICK")]
    pub nick: Option<String>,

    /// Do not use TLS
    #[arg(long)]
    pub no_tls: bool,

    /// Use STARTTLS if the server supports it
    #[arg(long)]
    pub start_tls: bool,

    /// Do not verify the certificate hostname
    #[arg(long)]
    pub no_verify_tls_host: bool,

    /// Presence status to set
    #[arg(long, value_name = "STATUS")]
    pub status: Option<String>,

    /// Presence status message
    #[arg(long, value_name = "MSG")]
    pub status_msg: Option<String>,

    /// Message sent once the connection is established
    #[arg(long, value_name = "MSG")]
    pub presence: Option<String>,

    /// Log raw XML stanzas at debug level
    #[arg(long)]
    pub xml_debug: bool,
}

impl Cli {
    /// Layer the given arguments on top of `builder` as overrides.
    pub fn apply(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let mut builder = builder;

        if let Some(listen) = &self.listen {
            let (host, port) = parse_listen(listen)?;
            builder = builder
                .set_override("server.host", host)?
                .set_override("server.port", port as i64)?;
        }

        builder = builder
            .set_override_option(
                "templates.dir",
                self.tpl_dir
                    .as_ref()
                    .map(|dir| dir.to_string_lossy().into_owned()),
            )?
            .set_override_option("templates.main", self.tpl.clone())?;

        if self.debug {
            builder = builder.set_override("server.debug", true)?;
        }

        match &self.backend {
            None => {}
            Some(Backend::Stdout) => {
                builder = builder.set_override("output.kind", "stdout")?;
            }
            Some(Backend::ModRest(args)) => {
                builder = builder
                    .set_override("output.kind", "mod_rest")?
                    .set_override_option("output.mod_rest.url", args.url.clone())?
                    .set_override_option("output.mod_rest.to", args.to.clone())?
                    .set_override_option("output.mod_rest.from", args.from.clone())?;
            }
            Some(Backend::Xmpp(args)) => {
                let tls = if args.start_tls {
                    Some("starttls")
                } else if args.no_tls {
                    Some("none")
                } else {
                    None
                };

                builder = builder
                    .set_override("output.kind", "xmpp")?
                    .set_override_option("output.xmpp.host", args.host.clone())?
                    .set_override_option("output.xmpp.user", args.user.clone())?
                    .set_override_option("output.xmpp.password", args.pass.clone())?
                    .set_override_option("output.xmpp.to", args.to.clone())?
                    .set_override_option("output.xmpp.nick", args.nick.clone())?
                    .set_override_option("output.xmpp.tls", tls)?
                    .set_override_option("output.xmpp.status", args.status.clone())?
                    .set_override_option("output.xmpp.status_msg", args.status_msg.clone())?
                    .set_override_option("output.xmpp.presence", args.presence.clone())?
                    .set_override_option("output.xmpp.join", args.join.then_some(true))?
                    .set_override_option(
                        "output.xmpp.verify_tls_host",
                        args.no_verify_tls_host.then_some(false),
                    )?
                    .set_override_option("output.xmpp.xml_debug", args.xml_debug.then_some(true))?;
            }
        }

        Ok(builder)
    }
}

/// Parse `host:port` or `:port`; an empty host listens on all interfaces.
pub fn parse_listen(addr: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::Message(format!("invalid listen address {addr:?}"));

    let (host, port) = addr.trim().rsplit_once(':').ok_or_else(invalid)?;
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { "0.0.0.0" } else { host };

    Ok((host.to_string(), port))
}
