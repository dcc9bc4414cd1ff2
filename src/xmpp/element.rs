//! Incremental parsing of top-level stream elements

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{XmppError, XmppResult};

const READ_CHUNK: usize = 4096;
const MAX_PENDING: usize = 1024 * 1024;

/// A parsed XML element with its attributes, children and text content.
///
/// Names are local names, so `stream:features` is stored as `features`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }
}

/// One unit read off the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// `<stream:stream ...>` opening tag
    StreamOpen(Element),
    /// A complete top-level element
    Element(Element),
    /// `</stream:stream>`
    StreamClose,
}

/// Buffers partial input until a complete top-level element is available.
#[derive(Debug, Default)]
pub struct ElementReader {
    buf: Vec<u8>,
}

impl ElementReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from `io` until the next complete unit is parsed.
    pub async fn next<R: AsyncRead + Unpin>(&mut self, io: &mut R) -> XmppResult<Parsed> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some((parsed, consumed)) = parse_next(&self.buf)? {
                self.buf.drain(..consumed);
                return Ok(parsed);
            }
            if self.buf.len() > MAX_PENDING {
                return Err(XmppError::Protocol("stanza exceeds buffer limit".into()));
            }

            let n = io.read(&mut chunk).await?;
            if n == 0 {
                return Err(XmppError::StreamClosed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Bytes received but not yet parsed
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

/// Parse the first complete unit in `buf`.
///
/// Returns `None` while the input is incomplete; the consumed byte count
/// covers any leading declaration or whitespace.
pub fn parse_next(buf: &[u8]) -> XmppResult<Option<(Parsed, usize)>> {
    let mut reader = Reader::from_reader(buf);
    {
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    let mut stack: Vec<Element> = Vec::new();
    loop {
        // Errors on a truncated buffer only mean more input is needed
        let Ok(event) = reader.read_event() else {
            return Ok(None);
        };
        let consumed = reader.buffer_position() as usize;

        match event {
            Event::Start(start) => {
                let element = element_from(&start);
                if stack.is_empty() && element.name == "stream" {
                    return Ok(Some((Parsed::StreamOpen(element), consumed)));
                }
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = element_from(&start);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(Some((Parsed::Element(element), consumed))),
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let Ok(text) = text.unescape() else {
                        return Ok(None);
                    };
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(end) => match stack.pop() {
                Some(element) => match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(Some((Parsed::Element(element), consumed))),
                },
                None if end.local_name().as_ref() == b"stream" => {
                    return Ok(Some((Parsed::StreamClose, consumed)));
                }
                None => {
                    return Err(XmppError::Protocol(format!(
                        "unexpected closing tag </{}>",
                        String::from_utf8_lossy(end.name().as_ref())
                    )));
                }
            },
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn element_from(start: &BytesStart<'_>) -> Element {
    let attrs = start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();

    Element {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attrs,
        children: Vec::new(),
        text: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_open_then_features() {
        let input = b"<?xml version='1.0'?><stream:stream xmlns='jabber:client' id='abc' version='1.0'><stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms></stream:features>";

        let (first, used) = parse_next(input).unwrap().unwrap();
        match first {
            Parsed::StreamOpen(el) => assert_eq!(el.attr("id"), Some("abc")),
            other => panic!("unexpected {other:?}"),
        }

        let (second, rest) = parse_next(&input[used..]).unwrap().unwrap();
        assert_eq!(used + rest, input.len());
        let Parsed::Element(features) = second else {
            panic!("expected features");
        };
        assert_eq!(features.name, "features");
        let mechanism = &features.child("mechanisms").unwrap().children[0];
        assert_eq!(mechanism.text, "PLAIN");
    }

    #[test]
    fn test_incomplete_input() {
        assert!(parse_next(b"<message to='a@b'><body>hel").unwrap().is_none());
        assert!(parse_next(b"<iq type='res").unwrap().is_none());
        assert!(parse_next(b"   ").unwrap().is_none());
    }

    #[test]
    fn test_empty_element_and_entities() {
        let (parsed, _) = parse_next(b"<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
            .unwrap()
            .unwrap();
        assert_eq!(parsed, Parsed::Element(Element {
            name: "success".into(),
            attrs: vec![("xmlns".into(), "urn:ietf:params:xml:ns:xmpp-sasl".into())],
            children: vec![],
            text: String::new(),
        }));

        let (parsed, _) = parse_next(b"<body>a &amp; b</body>").unwrap().unwrap();
        let Parsed::Element(body) = parsed else {
            panic!("expected element");
        };
        assert_eq!(body.text, "a & b");
    }

    #[test]
    fn test_stream_close() {
        let (parsed, _) = parse_next(b"</stream:stream>").unwrap().unwrap();
        assert_eq!(parsed, Parsed::StreamClose);
    }

    #[tokio::test]
    async fn test_reader_across_chunks() {
        let mut io = tokio_test::io::Builder::new()
            .read(b"<iq type='result' id='b")
            .read(b"ind_1'><bind><jid>jira@example.org/x</jid></bind></iq>")
            .build();

        let mut reader = ElementReader::new();
        let Parsed::Element(iq) = reader.next(&mut io).await.unwrap() else {
            panic!("expected iq");
        };
        assert_eq!(iq.attr("id"), Some("bind_1"));
        assert_eq!(iq.child("bind").unwrap().child("jid").unwrap().text, "jira@example.org/x");
        assert!(reader.pending().is_empty());
    }

    #[tokio::test]
    async fn test_reader_reports_closed_stream() {
        let mut io = tokio_test::io::Builder::new().read(b"<partial").build();
        let mut reader = ElementReader::new();
        assert!(matches!(
            reader.next(&mut io).await,
            Err(XmppError::StreamClosed)
        ));
    }
}
