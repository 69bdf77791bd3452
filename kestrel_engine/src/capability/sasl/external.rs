use super::*;

/// Authentication by TLS client certificate. The certificate itself is
/// presented during the handshake, so the exchange carries no data.
pub struct SaslExternal;

impl SaslMechanism for SaslExternal {
    fn name(&self) -> &'static str {
        "EXTERNAL"
    }

    fn step(&mut self, _challenge: &[u8]) -> SaslResult {
        Ok(Vec::new())
    }
}
