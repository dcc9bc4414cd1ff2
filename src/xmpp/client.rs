//! Stream negotiation and the connected client

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::element::{Element, ElementReader, Parsed};
use super::stanza;
use super::stream::{self, XmppStream};
use super::{server_address, Chat, Jid, TlsMode, XmppError, XmppOptions, XmppResult};

const BIND_ID: &str = "bind_1";
const SESSION_ID: &str = "sess_1";
const DRAIN_CHUNK: usize = 4096;

/// Drives the pre-session part of the stream: features, SASL, bind.
pub(crate) struct Negotiator<S> {
    io: S,
    reader: ElementReader,
    debug: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Negotiator<S> {
    pub(crate) fn new(io: S, debug: bool) -> Self {
        Self {
            io,
            reader: ElementReader::new(),
            debug,
        }
    }

    pub(crate) async fn send(&mut self, data: &str) -> XmppResult<()> {
        if self.debug {
            tracing::debug!(xml = %data, "xmpp send");
        }
        self.io.write_all(data.as_bytes()).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Next top-level element; stream errors and closes become errors.
    pub(crate) async fn next_element(&mut self) -> XmppResult<Element> {
        match self.reader.next(&mut self.io).await? {
            Parsed::Element(element) if element.name == "error" => {
                let condition = element
                    .children
                    .first()
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "undefined-condition".to_string());
                Err(XmppError::Protocol(format!("stream error: {condition}")))
            }
            Parsed::Element(element) => {
                if self.debug {
                    tracing::debug!(element = %element.name, "xmpp recv");
                }
                Ok(element)
            }
            Parsed::StreamOpen(_) => Err(XmppError::Protocol("unexpected stream header".into())),
            Parsed::StreamClose => Err(XmppError::StreamClosed),
        }
    }

    /// Open (or restart) the stream and return the advertised features.
    pub(crate) async fn open(&mut self, domain: &str) -> XmppResult<Element> {
        self.send(&stanza::stream_header(domain)).await?;

        match self.reader.next(&mut self.io).await? {
            Parsed::StreamOpen(_) => {}
            Parsed::StreamClose => return Err(XmppError::StreamClosed),
            Parsed::Element(element) => {
                return Err(XmppError::Protocol(format!(
                    "expected stream header, got <{}>",
                    element.name
                )))
            }
        }

        let features = self.next_element().await?;
        if features.name != "features" {
            return Err(XmppError::Protocol(format!(
                "expected stream features, got <{}>",
                features.name
            )));
        }
        Ok(features)
    }

    /// Authenticate, bind a resource and announce presence.
    ///
    /// Returns the full JID assigned by the server.
    pub(crate) async fn login(
        &mut self,
        jid: &Jid,
        features: Element,
        options: &XmppOptions,
    ) -> XmppResult<String> {
        let offers_plain = features.child("mechanisms").is_some_and(|mechanisms| {
            mechanisms
                .children
                .iter()
                .any(|m| m.name == "mechanism" && m.text.trim() == "PLAIN")
        });
        if !offers_plain {
            return Err(XmppError::Auth("server does not offer SASL PLAIN".into()));
        }

        self.send(&stanza::auth_plain(&jid.local, &options.password))
            .await?;
        let reply = self.next_element().await?;
        match reply.name.as_str() {
            "success" => {}
            "failure" => {
                let reason = reply
                    .children
                    .iter()
                    .find(|c| c.name != "text")
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "not-authorized".to_string());
                return Err(XmppError::Auth(reason));
            }
            other => {
                return Err(XmppError::Protocol(format!(
                    "unexpected SASL reply <{other}>"
                )))
            }
        }

        let features = self.open(&jid.domain).await?;

        let full_jid = if features.has_child("bind") {
            self.send(&stanza::bind(&options.resource, BIND_ID)).await?;
            let reply = self.wait_iq(BIND_ID).await?;
            reply
                .child("bind")
                .and_then(|bind| bind.child("jid"))
                .map(|jid| jid.text.trim().to_string())
                .ok_or_else(|| XmppError::Protocol("bind result without jid".into()))?
        } else {
            jid.bare()
        };

        let session_required = features
            .child("session")
            .is_some_and(|session| !session.has_child("optional"));
        if options.session && session_required {
            self.send(&stanza::session(&jid.domain, SESSION_ID)).await?;
            self.wait_iq(SESSION_ID).await?;
        }

        self.send(&stanza::presence(
            &options.status,
            options.status_message.as_deref(),
        ))
        .await?;

        Ok(full_jid)
    }

    async fn wait_iq(&mut self, id: &str) -> XmppResult<Element> {
        loop {
            let element = self.next_element().await?;
            if element.name != "iq" || element.attr("id") != Some(id) {
                continue;
            }
            return match element.attr("type") {
                Some("result") => Ok(element),
                _ => Err(XmppError::Protocol(format!("request {id} was rejected"))),
            };
        }
    }

    pub(crate) fn into_parts(self) -> (S, Vec<u8>) {
        (self.io, self.reader.pending().to_vec())
    }
}

/// An authenticated XMPP session.
///
/// Dropping the client stops its receive task.
pub struct XmppClient {
    writer: WriteHalf<XmppStream>,
    alive: CancellationToken,
    jid: String,
    debug: bool,
    send_timeout: Duration,
}

impl XmppClient {
    /// Connect and authenticate within the configured connect timeout.
    pub async fn connect(options: &XmppOptions) -> XmppResult<Self> {
        timeout(options.connect_timeout, Self::establish(options))
            .await
            .map_err(|_| XmppError::Timeout("connect"))?
    }

    async fn establish(options: &XmppOptions) -> XmppResult<Self> {
        let jid = Jid::parse(&options.user)?;
        let (server, port) = server_address(&options.host, options.tls);

        let tcp = TcpStream::connect((server.as_str(), port)).await?;
        tracing::debug!(server = %server, port = port, tls = ?options.tls, "xmpp tcp connected");

        let connector = match options.tls {
            TlsMode::None => None,
            TlsMode::Tls | TlsMode::StartTls => Some(stream::connector(options.verify_host)?),
        };

        let io = match (options.tls, &connector) {
            (TlsMode::Tls, Some(connector)) => stream::upgrade(tcp, &server, connector).await?,
            _ => XmppStream::Plain(tcp),
        };

        let mut negotiator = Negotiator::new(io, options.debug);
        let mut features = negotiator.open(&jid.domain).await?;

        if let (TlsMode::StartTls, Some(connector)) = (options.tls, &connector) {
            if features.has_child("starttls") {
                negotiator.send(stanza::STARTTLS).await?;
                let reply = negotiator.next_element().await?;
                if reply.name != "proceed" {
                    return Err(XmppError::Tls("server refused STARTTLS".into()));
                }

                let (io, pending) = negotiator.into_parts();
                let XmppStream::Plain(tcp) = io else {
                    return Err(XmppError::Tls("stream is already encrypted".into()));
                };
                if !pending.is_empty() {
                    return Err(XmppError::Protocol("data received after <proceed/>".into()));
                }

                let io = stream::upgrade(tcp, &server, connector).await?;
                negotiator = Negotiator::new(io, options.debug);
                features = negotiator.open(&jid.domain).await?;
            } else {
                tracing::warn!(server = %server, "STARTTLS not offered, continuing unencrypted");
            }
        }

        let full_jid = negotiator.login(&jid, features, options).await?;
        let (io, _) = negotiator.into_parts();
        tracing::debug!(encrypted = io.is_encrypted(), "xmpp session established");

        let (reader, writer) = tokio::io::split(io);
        let alive = CancellationToken::new();
        tokio::spawn(drain(reader, alive.clone(), options.debug));

        Ok(Self {
            writer,
            alive,
            jid: full_jid,
            debug: options.debug,
            send_timeout: options.send_timeout,
        })
    }

    /// Full JID bound for this session
    pub fn jid(&self) -> &str {
        &self.jid
    }

    /// False once the receive task has seen the stream end
    pub fn is_alive(&self) -> bool {
        !self.alive.is_cancelled()
    }

    pub async fn send(&mut self, chat: &Chat) -> XmppResult<usize> {
        self.write_raw(&stanza::message(chat)).await
    }

    /// Enter a multi-user room without requesting backlog.
    pub async fn join_muc_no_history(&mut self, room: &str, nick: &str) -> XmppResult<()> {
        self.write_raw(&stanza::join_room(room, nick)).await?;
        Ok(())
    }

    /// Close the stream politely; errors are irrelevant at this point.
    pub async fn close(&mut self) {
        if self.is_alive() {
            let _ = self.write_raw(stanza::STREAM_CLOSE).await;
            let _ = self.writer.shutdown().await;
        }
        self.alive.cancel();
    }

    async fn write_raw(&mut self, data: &str) -> XmppResult<usize> {
        if !self.is_alive() {
            return Err(XmppError::NotConnected);
        }
        if self.debug {
            tracing::debug!(xml = %data, "xmpp send");
        }

        let writer = &mut self.writer;
        let write = async move {
            writer.write_all(data.as_bytes()).await?;
            writer.flush().await?;
            Ok::<_, std::io::Error>(data.len())
        };
        let result = timeout(self.send_timeout, write).await;

        match result {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => {
                self.alive.cancel();
                Err(XmppError::Io(e))
            }
            Err(_) => {
                self.alive.cancel();
                Err(XmppError::Timeout("send"))
            }
        }
    }
}

impl Drop for XmppClient {
    fn drop(&mut self) {
        self.alive.cancel();
    }
}

/// Read and discard everything the server sends until the stream ends or
/// the owning client goes away, then mark the connection dead.
async fn drain<R: AsyncRead + Unpin>(mut reader: R, alive: CancellationToken, debug: bool) {
    let mut buf = vec![0u8; DRAIN_CHUNK];
    loop {
        tokio::select! {
            _ = alive.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!("xmpp server closed the stream");
                    break;
                }
                Ok(n) => {
                    if debug {
                        tracing::debug!(xml = %String::from_utf8_lossy(&buf[..n]), "xmpp recv");
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "xmpp receive failed");
                    break;
                }
            }
        }
    }
    alive.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_HEADER: &[u8] = b"<?xml version='1.0'?><stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' id='s1' from='example.org' version='1.0'>";

    fn options() -> XmppOptions {
        XmppOptions {
            host: "example.org".into(),
            user: "jira@example.org".into(),
            password: "secret".into(),
            resource: "jibber".into(),
            tls: TlsMode::None,
            verify_host: true,
            session: true,
            status: "online".into(),
            status_message: Some("watching".into()),
            debug: false,
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_login_flow() {
        let opts = options();
        let jid = Jid::parse(&opts.user).unwrap();

        let io = tokio_test::io::Builder::new()
            .write(stanza::stream_header("example.org").as_bytes())
            .read(SERVER_HEADER)
            .read(b"<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>SCRAM-SHA-1</mechanism><mechanism>PLAIN</mechanism></mechanisms></stream:features>")
            .write(stanza::auth_plain("jira", "secret").as_bytes())
            .read(b"<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
            .write(stanza::stream_header("example.org").as_bytes())
            .read(SERVER_HEADER)
            .read(b"<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/><session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></stream:features>")
            .write(stanza::bind("jibber", BIND_ID).as_bytes())
            .read(b"<iq type='result' id='bind_1'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>jira@example.org/jibber</jid></bind></iq>")
            .write(stanza::session("example.org", SESSION_ID).as_bytes())
            .read(b"<iq type='result' id='sess_1'/>")
            .write(stanza::presence("online", Some("watching")).as_bytes())
            .build();

        let mut negotiator = Negotiator::new(io, false);
        let features = negotiator.open(&jid.domain).await.unwrap();
        let full = negotiator.login(&jid, features, &opts).await.unwrap();
        assert_eq!(full, "jira@example.org/jibber");
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let opts = options();
        let jid = Jid::parse(&opts.user).unwrap();

        let io = tokio_test::io::Builder::new()
            .write(stanza::stream_header("example.org").as_bytes())
            .read(SERVER_HEADER)
            .read(b"<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms></stream:features>")
            .write(stanza::auth_plain("jira", "secret").as_bytes())
            .read(b"<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>")
            .build();

        let mut negotiator = Negotiator::new(io, false);
        let features = negotiator.open(&jid.domain).await.unwrap();
        let err = negotiator.login(&jid, features, &opts).await.unwrap_err();
        assert!(matches!(err, XmppError::Auth(reason) if reason == "not-authorized"));
    }

    #[tokio::test]
    async fn test_plain_not_offered() {
        let opts = options();
        let jid = Jid::parse(&opts.user).unwrap();

        let io = tokio_test::io::Builder::new()
            .write(stanza::stream_header("example.org").as_bytes())
            .read(SERVER_HEADER)
            .read(b"<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>SCRAM-SHA-1</mechanism></mechanisms></stream:features>")
            .build();

        let mut negotiator = Negotiator::new(io, false);
        let features = negotiator.open(&jid.domain).await.unwrap();
        assert!(matches!(
            negotiator.login(&jid, features, &opts).await,
            Err(XmppError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_error_surfaces() {
        let io = tokio_test::io::Builder::new()
            .write(stanza::stream_header("example.org").as_bytes())
            .read(SERVER_HEADER)
            .read(b"<stream:error><host-unknown xmlns='urn:ietf:params:xml:ns:xmpp-streams'/></stream:error>")
            .build();

        let mut negotiator = Negotiator::new(io, false);
        let err = negotiator.open("example.org").await.unwrap_err();
        assert!(matches!(err, XmppError::Protocol(msg) if msg.contains("host-unknown")));
    }

    #[tokio::test]
    async fn test_drain_marks_connection_dead_on_eof() {
        let io = tokio_test::io::Builder::new()
            .read(b"<message from='x'><body>ignored</body></message>")
            .build();
        let alive = CancellationToken::new();
        drain(io, alive.clone(), false).await;
        assert!(alive.is_cancelled());
    }

    #[tokio::test]
    async fn test_drain_stops_on_cancel() {
        let (client, _server) = tokio::io::duplex(64);
        let alive = CancellationToken::new();
        let task = tokio::spawn(drain(client, alive.clone(), false));
        alive.cancel();
        task.await.unwrap();
    }
}
