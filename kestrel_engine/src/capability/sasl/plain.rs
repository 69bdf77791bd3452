use super::*;

/// `authzid \0 authcid \0 password`, with the authorization identity left
/// empty so the server derives it from the username.
pub struct SaslPlain {
    username: String,
    password: String,
}

impl SaslPlain {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl SaslMechanism for SaslPlain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn step(&mut self, _challenge: &[u8]) -> SaslResult {
        let mut payload = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        payload.push(0);
        payload.extend_from_slice(self.username.as_bytes());
        payload.push(0);
        payload.extend_from_slice(self.password.as_bytes());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;

    #[test]
    fn frame_layout() {
        let mut plain = SaslPlain::new("alice", "secret");
        let payload = plain.step(b"").unwrap();

        assert_eq!(payload, b"\0alice\0secret");
        assert_eq!(BASE64_STANDARD.encode(&payload), "AGFsaWNlAHNlY3JldA==");
    }
}
