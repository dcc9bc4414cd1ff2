//! Outgoing stanza builders

use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::escape::escape;

use super::Chat;

pub const STARTTLS: &str = "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>";
pub const STREAM_CLOSE: &str = "</stream:stream>";

pub fn stream_header(domain: &str) -> String {
    format!(
        "<?xml version='1.0'?><stream:stream to='{}' xmlns='jabber:client' \
         xmlns:stream='http://etherx.jabber.org/streams' version='1.0'>",
        escape(domain)
    )
}

pub fn auth_plain(local: &str, password: &str) -> String {
    let credentials = STANDARD.encode(format!("\0{local}\0{password}"));
    format!(
        "<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='PLAIN'>{credentials}</auth>"
    )
}

pub fn bind(resource: &str, id: &str) -> String {
    format!(
        "<iq type='set' id='{}'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
         <resource>{}</resource></bind></iq>",
        escape(id),
        escape(resource)
    )
}

pub fn session(domain: &str, id: &str) -> String {
    format!(
        "<iq to='{}' type='set' id='{}'><session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></iq>",
        escape(domain),
        escape(id)
    )
}

/// Initial presence. `online` is the absence of a `<show>` value.
pub fn presence(status: &str, status_message: Option<&str>) -> String {
    let mut out = String::from("<presence xml:lang='en'>");
    if !status.is_empty() && status != "online" {
        out.push_str(&format!("<show>{}</show>", escape(status)));
    }
    if let Some(message) = status_message.filter(|m| !m.is_empty()) {
        out.push_str(&format!("<status>{}</status>", escape(message)));
    }
    out.push_str("</presence>");
    out
}

pub fn join_room(room: &str, nick: &str) -> String {
    format!(
        "<presence to='{}/{}'><x xmlns='http://jabber.org/protocol/muc'>\
         <history maxchars='0'/></x></presence>",
        escape(room),
        escape(nick)
    )
}

pub fn message(chat: &Chat) -> String {
    format!(
        "<message to='{}' type='{}' xml:lang='en'><body>{}</body></message>",
        escape(chat.remote.as_str()),
        chat.kind.as_str(),
        escape(chat.text.as_str())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmpp::ChatKind;

    #[test]
    fn test_auth_plain_encoding() {
        // "\0jira\0secret"
        assert_eq!(
            auth_plain("jira", "secret"),
            "<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='PLAIN'>AGppcmEAc2VjcmV0</auth>"
        );
    }

    #[test]
    fn test_message_is_escaped() {
        let chat = Chat {
            remote: "ops@conference.example.org".into(),
            kind: ChatKind::GroupChat,
            text: "<b>&'x'".into(),
        };
        assert_eq!(
            message(&chat),
            "<message to='ops@conference.example.org' type='groupchat' xml:lang='en'>\
             <body>&lt;b&gt;&amp;&apos;x&apos;</body></message>"
        );
    }

    #[test]
    fn test_presence_variants() {
        assert_eq!(presence("online", None), "<presence xml:lang='en'></presence>");
        assert_eq!(
            presence("dnd", Some("deploying")),
            "<presence xml:lang='en'><show>dnd</show><status>deploying</status></presence>"
        );
    }

    #[test]
    fn test_join_room_without_history() {
        assert_eq!(
            join_room("ops@conference.example.org", "Jira"),
            "<presence to='ops@conference.example.org/Jira'>\
             <x xmlns='http://jabber.org/protocol/muc'><history maxchars='0'/></x></presence>"
        );
    }
}
