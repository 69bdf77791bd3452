use super::*;

use base64::prelude::*;
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256, Sha512};

/// GS2 header for a client that neither supports nor wants channel binding
const GS2_HEADER: &str = "n,,";

const NONCE_LEN: usize = 24;

/// Highest iteration count we will derive a key with. Real servers use a few
/// thousand; anything near this is a misconfiguration or an attack.
pub const MAX_ITERATIONS: u32 = 1_000_000;

/// Digest underlying a SCRAM variant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScramHash {
    Sha256,
    Sha512,
}

impl ScramHash {
    pub fn mechanism_name(self) -> &'static str {
        match self {
            Self::Sha256 => "SCRAM-SHA-256",
            Self::Sha512 => "SCRAM-SHA-512",
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    pub fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, SaslError> {
        let invalid_key = |e: hmac::digest::InvalidLength| SaslError::Internal(e.to_string());

        Ok(match self {
            Self::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(invalid_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Sha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(invalid_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        })
    }

    /// PBKDF2 with this digest's HMAC as the pseudo-random function
    pub fn salted_password(self, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut out = vec![0; self.output_len()];
        match self {
            Self::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out),
            Self::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out),
        }
        out
    }
}

enum ScramStage {
    Initial,
    ClientFirstSent,
    ClientFinalSent { server_signature: Vec<u8> },
    Complete,
}

/// The client half of a SCRAM exchange (RFC 5802), without channel binding.
///
/// The exchange is: client-first, server-first, client-final carrying the
/// proof, then server-final carrying the server's signature, which is checked
/// before an empty response completes the exchange.
pub struct ScramClient {
    hash: ScramHash,
    username: String,
    password: String,
    client_nonce: String,
    client_first_bare: String,
    stage: ScramStage,
}

impl ScramClient {
    pub fn new(hash: ScramHash, username: &str, password: &str) -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();

        Self::with_nonce(hash, username, password, &nonce)
    }

    /// Construct with a fixed client nonce instead of a random one
    pub fn with_nonce(hash: ScramHash, username: &str, password: &str, nonce: &str) -> Self {
        let client_first_bare = format!("n={},r={}", escape_username(username), nonce);

        Self {
            hash,
            username: username.to_string(),
            password: password.to_string(),
            client_nonce: nonce.to_string(),
            client_first_bare,
            stage: ScramStage::Initial,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn client_first(&mut self) -> SaslResult {
        self.stage = ScramStage::ClientFirstSent;
        Ok(format!("{}{}", GS2_HEADER, self.client_first_bare).into_bytes())
    }

    fn client_final(&mut self, server_first: &[u8]) -> SaslResult {
        let server_first = std::str::from_utf8(server_first)
            .map_err(|_| SaslError::Malformed("server-first is not UTF-8".to_string()))?;
        let attrs = ScramAttributes::parse(server_first)?;

        let server_nonce = attrs.require('r', server_first)?;
        if !server_nonce.starts_with(&self.client_nonce) || server_nonce.len() <= self.client_nonce.len() {
            return Err(SaslError::NonceMismatch);
        }

        let salt = BASE64_STANDARD.decode(attrs.require('s', server_first)?)?;

        let iterations = attrs.require('i', server_first)?;
        let iterations = match iterations.parse::<u32>() {
            Ok(i) if i > 0 && i <= MAX_ITERATIONS => i,
            _ => return Err(SaslError::InvalidIterations(iterations.to_string())),
        };

        let hash = self.hash;
        let salted = hash.salted_password(self.password.as_bytes(), &salt, iterations);
        let client_key = hash.hmac(&salted, b"Client Key")?;
        let stored_key = hash.hash(&client_key);
        let server_key = hash.hmac(&salted, b"Server Key")?;

        let channel_binding = BASE64_STANDARD.encode(GS2_HEADER);
        let client_final_bare = format!("c={},r={}", channel_binding, server_nonce);
        let auth_message = format!("{},{},{}", self.client_first_bare, server_first, client_final_bare);

        let client_signature = hash.hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();
        let server_signature = hash.hmac(&server_key, auth_message.as_bytes())?;

        self.stage = ScramStage::ClientFinalSent { server_signature };

        Ok(format!("{},p={}", client_final_bare, BASE64_STANDARD.encode(proof)).into_bytes())
    }
}

impl SaslMechanism for ScramClient {
    fn name(&self) -> &'static str {
        self.hash.mechanism_name()
    }

    fn step(&mut self, challenge: &[u8]) -> SaslResult {
        match std::mem::replace(&mut self.stage, ScramStage::Complete) {
            ScramStage::Initial => self.client_first(),
            ScramStage::ClientFirstSent => self.client_final(challenge),
            ScramStage::ClientFinalSent { server_signature } => {
                let server_final = std::str::from_utf8(challenge)
                    .map_err(|_| SaslError::Malformed("server-final is not UTF-8".to_string()))?;
                let attrs = ScramAttributes::parse(server_final)?;

                let verifier = BASE64_STANDARD.decode(attrs.require('v', server_final)?)?;
                if verifier != server_signature {
                    return Err(SaslError::ServerSignatureMismatch);
                }

                Ok(Vec::new())
            }
            ScramStage::Complete => Err(SaslError::UnexpectedChallenge),
        }
    }
}

/// Attribute-value pairs of a server SCRAM message
struct ScramAttributes<'a> {
    attrs: Vec<(char, &'a str)>,
}

impl<'a> ScramAttributes<'a> {
    /// Split a server message into attributes. An `e=` attribute is turned
    /// into a [`SaslError::ServerError`].
    fn parse(message: &'a str) -> Result<Self, SaslError> {
        let mut attrs = Vec::new();

        for part in message.split(',') {
            let mut chars = part.chars();
            let (Some(name), Some('=')) = (chars.next(), chars.next()) else {
                return Err(SaslError::Malformed(message.to_string()));
            };
            let value = &part[name.len_utf8() + 1..];

            if name == 'e' {
                return Err(SaslError::ServerError(value.to_string()));
            }
            if name == 'm' {
                return Err(SaslError::Malformed("unsupported mandatory extension".to_string()));
            }
            attrs.push((name, value));
        }

        Ok(Self { attrs })
    }

    fn require(&self, name: char, message: &str) -> Result<&'a str, SaslError> {
        self.attrs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| SaslError::Malformed(format!("missing {}= in {:?}", name, message)))
    }
}

/// `=` and `,` are reserved within attribute values
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}
