use super::*;
use crate::config::SaslMechanismName;

use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use std::{convert::TryFrom, sync::Arc};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Connects over plain TCP, or TLS when the endpoint asks for it.
///
/// Server certificates are checked against the bundled web PKI roots. When an
/// identity authenticates with SASL EXTERNAL, its client certificate is
/// presented during the handshake.
pub struct TcpConnector {
    roots: RootCertStore,
    default_config: Arc<ClientConfig>,
}

impl TcpConnector {
    pub fn new() -> Self {
        let mut roots = RootCertStore::empty();
        roots.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(ta.subject, ta.spki, ta.name_constraints)
        }));

        let default_config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots.clone())
            .with_no_client_auth();

        Self {
            roots,
            default_config: Arc::new(default_config),
        }
    }

    fn tls_config(&self, identity: &NetworkIdentity) -> Result<Arc<ClientConfig>, TransportError> {
        let sasl = &identity.sasl;
        if !sasl.enabled || sasl.mechanism != SaslMechanismName::External {
            return Ok(Arc::clone(&self.default_config));
        }

        match sasl.load_client_cert()? {
            Some((certs, key)) => {
                let config = ClientConfig::builder()
                    .with_safe_defaults()
                    .with_root_certificates(self.roots.clone())
                    .with_single_cert(certs, key)?;
                Ok(Arc::new(config))
            }
            None => {
                tracing::warn!(network = %identity.name, "EXTERNAL authentication configured without a client certificate");
                Ok(Arc::clone(&self.default_config))
            }
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint, identity: &NetworkIdentity) -> Result<Transport, TransportError> {
        let label = format!("{}/{}", identity.name, endpoint);
        let conn = TcpStream::connect((endpoint.address.as_str(), endpoint.port)).await?;

        if !endpoint.tls {
            return Ok(Transport::spawn(label, conn));
        }

        let connector = TlsConnector::from(self.tls_config(identity)?);
        let server_name = ServerName::try_from(endpoint.address.as_str())
            .map_err(|_| TransportError::InvalidServerName(endpoint.address.clone()))?;
        let stream = connector.connect(server_name, conn).await?;

        Ok(Transport::spawn(label, stream))
    }
}
