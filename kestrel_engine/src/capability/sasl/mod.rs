//! Client side of the SASL mechanisms the engine can authenticate with.

use crate::config::{SaslConfig, SaslMechanismName};

use thiserror::Error;

mod plain;
pub use plain::SaslPlain;

mod external;
pub use external::SaslExternal;

mod scram;
pub use scram::{ScramClient, ScramHash, MAX_ITERATIONS};

#[derive(Debug, Error)]
pub enum SaslError {
    #[error("Malformed server message: {0}")]
    Malformed(String),
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Server nonce does not extend the client nonce")]
    NonceMismatch,
    #[error("Invalid iteration count {0:?}")]
    InvalidIterations(String),
    #[error("Server signature did not verify")]
    ServerSignatureMismatch,
    #[error("Server reported error: {0}")]
    ServerError(String),
    #[error("Unexpected challenge after the exchange finished")]
    UnexpectedChallenge,
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SaslResult = Result<Vec<u8>, SaslError>;

/// One SASL mechanism, seen from the client.
///
/// `step` receives each decoded server challenge (empty for the initial `+`)
/// and produces the raw response to send back. Mechanisms hold whatever state
/// they need between steps; an instance is used for a single exchange.
pub trait SaslMechanism: Send + 'static {
    /// Name sent in the initial `AUTHENTICATE` command
    fn name(&self) -> &'static str;

    fn step(&mut self, challenge: &[u8]) -> SaslResult;
}

/// Instantiate the mechanism selected by `config`
pub fn build_mechanism(config: &SaslConfig) -> Box<dyn SaslMechanism> {
    match config.mechanism {
        SaslMechanismName::Plain => Box::new(SaslPlain::new(&config.username, &config.password)),
        SaslMechanismName::External => Box::new(SaslExternal),
        SaslMechanismName::ScramSha256 => Box::new(ScramClient::new(
            ScramHash::Sha256,
            &config.username,
            &config.password,
        )),
        SaslMechanismName::ScramSha512 => Box::new(ScramClient::new(
            ScramHash::Sha512,
            &config.username,
            &config.password,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_names_match_configuration() {
        for name in [
            SaslMechanismName::Plain,
            SaslMechanismName::External,
            SaslMechanismName::ScramSha256,
            SaslMechanismName::ScramSha512,
        ] {
            let config = SaslConfig {
                enabled: true,
                mechanism: name,
                ..Default::default()
            };
            assert_eq!(build_mechanism(&config).name(), name.to_string());
        }
    }
}
