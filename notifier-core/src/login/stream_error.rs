//! Stream-level error parsing
//!
//! Extracts the condition and text of a `<stream:error/>` element and turns
//! a see-other-host condition into a redirect target.
//!
//! ```xml
//! <stream:error>
//!   <see-other-host xmlns='urn:ietf:params:xml:ns:xmpp-streams'/>
//!   <text xmlns='urn:ietf:params:xml:ns:xmpp-streams'>talk.example.com:5223</text>
//! </stream:error>
//! ```
//!
//! The target may also be carried as the body of `<see-other-host>` itself.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::config::DEFAULT_XMPP_PORT;

const SEE_OTHER_HOST: &str = "see-other-host";
const TEXT: &str = "text";

/// Host and port a server asked us to reconnect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub host: String,
    pub port: u16,
}

/// Parsed `<stream:error/>` element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamError {
    /// Local name of the defined condition, e.g. `see-other-host`
    pub condition: Option<String>,
    /// Body of the `<text/>` child
    pub text: Option<String>,
    /// Body of the condition element, if it had one
    pub condition_body: Option<String>,
}

impl StreamError {
    /// Parse a raw stream error element
    pub fn parse(raw: &str) -> Result<Self, quick_xml::Error> {
        let mut reader = Reader::from_str(raw);
        reader.config_mut().trim_text(true);
        reader.config_mut().check_end_names = false;

        let mut parsed = StreamError::default();
        let mut depth = 0usize;
        // Child of the root we are currently inside
        let mut current: Option<String> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    depth += 1;
                    if depth == 2 {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                        if name != TEXT && parsed.condition.is_none() {
                            parsed.condition = Some(name.clone());
                        }
                        current = Some(name);
                    }
                }
                Event::Empty(e) => {
                    if depth == 1 {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                        if name != TEXT && parsed.condition.is_none() {
                            parsed.condition = Some(name);
                        }
                    }
                }
                Event::Text(t) if depth == 2 => {
                    let body = t.unescape()?.trim().to_string();
                    if body.is_empty() {
                        continue;
                    }
                    match current.as_deref() {
                        Some(TEXT) => parsed.text = Some(body),
                        Some(name) if Some(name) == parsed.condition.as_deref() => {
                            parsed.condition_body = Some(body)
                        }
                        _ => {}
                    }
                }
                Event::End(_) => {
                    if depth == 2 {
                        current = None;
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(parsed)
    }

    /// Redirect target, when this is a see-other-host error with a target
    pub fn redirect(&self) -> Option<Redirect> {
        if self.condition.as_deref() != Some(SEE_OTHER_HOST) {
            return None;
        }

        self.text
            .as_deref()
            .or(self.condition_body.as_deref())
            .filter(|target| !target.is_empty())
            .map(parse_redirect_target)
    }
}

/// Split `host[:port]` into host and port
///
/// A missing, unparsable or zero port falls back to the default XMPP port;
/// port 0 is never used.
pub fn parse_redirect_target(target: &str) -> Redirect {
    let target = target.trim();

    let (host, port_text) = if let Some(rest) = target.strip_prefix('[') {
        // [v6-literal]:port
        match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => (target, None),
        }
    } else {
        match target.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (target, None),
        }
    };

    let port = port_text
        .map(|text| {
            let digits: String = text
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u16>().unwrap_or(0)
        })
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_XMPP_PORT);

    Redirect {
        host: host.to_string(),
        port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect(host: &str, port: u16) -> Redirect {
        Redirect {
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn test_parse_target_with_port() {
        assert_eq!(
            parse_redirect_target("talk.google.com:5223"),
            redirect("talk.google.com", 5223)
        );
    }

    #[test]
    fn test_parse_target_without_port() {
        assert_eq!(
            parse_redirect_target("talk.google.com"),
            redirect("talk.google.com", 5222)
        );
    }

    #[test]
    fn test_parse_target_rejects_zero_port() {
        assert_eq!(
            parse_redirect_target("talk.google.com:0"),
            redirect("talk.google.com", 5222)
        );
    }

    #[test]
    fn test_parse_target_garbage_port() {
        assert_eq!(
            parse_redirect_target("talk.google.com:abc"),
            redirect("talk.google.com", 5222)
        );
        assert_eq!(
            parse_redirect_target("talk.google.com:99999"),
            redirect("talk.google.com", 5222)
        );
        assert_eq!(
            parse_redirect_target("talk.google.com:443x"),
            redirect("talk.google.com", 443)
        );
    }

    #[test]
    fn test_parse_target_ipv6_literal() {
        assert_eq!(parse_redirect_target("[::1]:5223"), redirect("::1", 5223));
        assert_eq!(parse_redirect_target("[::1]"), redirect("::1", 5222));
    }

    #[test]
    fn test_see_other_host_with_text_child() {
        let raw = "<stream:error xmlns:stream='http://etherx.jabber.org/streams'>\
                   <see-other-host xmlns='urn:ietf:params:xml:ns:xmpp-streams'/>\
                   <text xmlns='urn:ietf:params:xml:ns:xmpp-streams'>other.example.com:5228</text>\
                   </stream:error>";
        let parsed = StreamError::parse(raw).unwrap();
        assert_eq!(parsed.condition.as_deref(), Some("see-other-host"));
        assert_eq!(parsed.redirect(), Some(redirect("other.example.com", 5228)));
    }

    #[test]
    fn test_see_other_host_with_body() {
        let raw = "<stream:error>\
                   <see-other-host xmlns='urn:ietf:params:xml:ns:xmpp-streams'>other.example.com</see-other-host>\
                   </stream:error>";
        let parsed = StreamError::parse(raw).unwrap();
        assert_eq!(parsed.redirect(), Some(redirect("other.example.com", 5222)));
    }

    #[test]
    fn test_other_conditions_are_not_redirects() {
        let raw = "<stream:error>\
                   <host-unknown xmlns='urn:ietf:params:xml:ns:xmpp-streams'/>\
                   <text>nobody home</text>\
                   </stream:error>";
        let parsed = StreamError::parse(raw).unwrap();
        assert_eq!(parsed.condition.as_deref(), Some("host-unknown"));
        assert_eq!(parsed.text.as_deref(), Some("nobody home"));
        assert_eq!(parsed.redirect(), None);
    }

    #[test]
    fn test_see_other_host_without_target() {
        let raw = "<stream:error><see-other-host/></stream:error>";
        let parsed = StreamError::parse(raw).unwrap();
        assert_eq!(parsed.redirect(), None);
    }
}
