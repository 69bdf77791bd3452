//! Client-to-client queries carried inside PRIVMSG and NOTICE bodies

/// Delimits a CTCP payload within a message body
pub const CTCP_DELIM: char = '\x01';

/// Subcommands answered automatically, as advertised in CLIENTINFO replies
pub const SUPPORTED: &[&str] = &["ACTION", "CLIENTINFO", "PING", "TIME", "VERSION"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CtcpMessage<'a> {
    /// Upper-cased subcommand
    pub command: String,
    pub params: &'a str,
}

impl<'a> CtcpMessage<'a> {
    /// Extract a CTCP payload from a message body, if it carries one. The
    /// closing delimiter is optional since some clients omit it.
    pub fn parse(body: &'a str) -> Option<Self> {
        let inner = body.strip_prefix(CTCP_DELIM)?;
        let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);

        let (command, params) = match inner.split_once(' ') {
            Some((c, p)) => (c, p),
            None => (inner, ""),
        };

        if command.is_empty() {
            return None;
        }

        Some(Self {
            command: command.to_ascii_uppercase(),
            params,
        })
    }
}

/// Wrap a subcommand and its parameters for sending
pub fn encode(command: &str, params: &str) -> String {
    if params.is_empty() {
        format!("{CTCP_DELIM}{command}{CTCP_DELIM}")
    } else {
        format!("{CTCP_DELIM}{command} {params}{CTCP_DELIM}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_action() {
        let ctcp = CtcpMessage::parse("\x01ACTION waves\x01").unwrap();
        assert_eq!(ctcp.command, "ACTION");
        assert_eq!(ctcp.params, "waves");
    }

    #[test]
    fn parse_without_closing_delimiter() {
        let ctcp = CtcpMessage::parse("\x01version").unwrap();
        assert_eq!(ctcp.command, "VERSION");
        assert_eq!(ctcp.params, "");
    }

    #[test]
    fn plain_text_is_not_ctcp() {
        assert!(CtcpMessage::parse("hello").is_none());
        assert!(CtcpMessage::parse("\x01\x01").is_none());
    }

    #[test]
    fn encoding() {
        assert_eq!(encode("PING", "12345"), "\x01PING 12345\x01");
        assert_eq!(encode("VERSION", ""), "\x01VERSION\x01");
    }
}
