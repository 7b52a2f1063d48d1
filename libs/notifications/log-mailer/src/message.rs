use serde::{Deserialize, Serialize};

/// Email built from a single record. Created fresh for every dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Unique identifier for the message
    pub id: String,
    /// Recipient addresses
    pub to: Vec<String>,
    /// Sender address
    pub from: String,
    /// Rendered subject
    pub subject: String,
    /// Plain text body (the record's display text)
    pub text: String,
}

impl OutgoingMessage {
    pub fn new(
        to: Vec<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            to,
            from: from.into(),
            subject: subject.into(),
            text: text.into(),
        }
    }

    /// Envelope with display names stripped from every address
    pub fn envelope(&self) -> Envelope {
        Envelope {
            from: bare_address(&self.from).to_string(),
            to: self.to.iter().map(|a| bare_address(a).to_string()).collect(),
        }
    }

    /// `<id@domain>` using the sender's domain, or `localhost`
    pub fn message_id_header(&self) -> String {
        let domain = self
            .from
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim_end_matches('>'))
            .filter(|domain| !domain.is_empty())
            .unwrap_or("localhost");
        format!("<{}@{}>", self.id, domain)
    }
}

/// `Name <user@host>` -> `user@host`
fn bare_address(address: &str) -> &str {
    match (address.rfind('<'), address.rfind('>')) {
        (Some(start), Some(end)) if start < end => address[start + 1..end].trim(),
        _ => address.trim(),
    }
}

/// SMTP envelope of a delivered message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_message_gets_its_own_id() {
        let a = OutgoingMessage::new(vec!["a@example.com".into()], "x@host", "s", "t");
        let b = OutgoingMessage::new(vec!["a@example.com".into()], "x@host", "s", "t");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_message_id_header_uses_sender_domain() {
        let message = OutgoingMessage::new(vec![], "Alerts <alerts@ops.example.com>", "s", "t");
        assert_eq!(
            message.message_id_header(),
            format!("<{}@ops.example.com>", message.id)
        );

        let message = OutgoingMessage::new(vec![], "no-domain", "s", "t");
        assert!(message.message_id_header().ends_with("@localhost>"));
    }

    #[test]
    fn test_envelope_copies_addresses() {
        let message = OutgoingMessage::new(
            vec!["a@example.com".into(), "b@example.com".into()],
            "log-mailer@host",
            "s",
            "t",
        );
        let envelope = message.envelope();
        assert_eq!(envelope.from, "log-mailer@host");
        assert_eq!(envelope.to, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_envelope_strips_display_names() {
        let message = OutgoingMessage::new(
            vec!["Ops Team <ops@example.com>".into()],
            "Alerts <alerts@example.com>",
            "s",
            "t",
        );
        let envelope = message.envelope();
        assert_eq!(envelope.from, "alerts@example.com");
        assert_eq!(envelope.to, vec!["ops@example.com"]);
    }
}
