//! Transport credentials for the upstream gRPC connection.
//!
//! [`CredentialBuilder::build`] turns a declarative [`ProbeTlsConfig`] into
//! [`Credentials`] once at startup. Only the referenced key-material files
//! are read; nothing touches the network.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ProbeTlsConfig, TlsMode};

/// Error building credentials. Fatal at startup.
#[derive(Debug)]
pub enum CredentialError {
    /// Contradictory TLS options.
    Invalid(ConfigError),
    /// A key-material file could not be read.
    Read { path: PathBuf, error: io::Error },
    /// A certificate file contained no usable certificate.
    NoCertificates { path: PathBuf },
    /// The client key file contained no private key.
    NoPrivateKey { path: PathBuf },
    /// Verification requested without a CA bundle, and the platform trust
    /// store yielded no usable certificate.
    NoPlatformRoots,
    /// rustls rejected the material (e.g. key does not match certificate).
    Tls(rustls::Error),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::Invalid(e) => write!(f, "{}", e),
            CredentialError::Read { path, error } => {
                write!(f, "failed to read {}: {}", path.display(), error)
            }
            CredentialError::NoCertificates { path } => {
                write!(f, "no certificates parsed from file {}", path.display())
            }
            CredentialError::NoPrivateKey { path } => {
                write!(f, "no private key found in file {}", path.display())
            }
            CredentialError::NoPlatformRoots => {
                write!(f, "no platform root certificates found; set a CA bundle")
            }
            CredentialError::Tls(e) => write!(f, "invalid tls client configuration: {}", e),
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CredentialError::Invalid(e) => Some(e),
            CredentialError::Read { error, .. } => Some(error),
            CredentialError::Tls(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CredentialError {
    fn from(e: ConfigError) -> Self {
        CredentialError::Invalid(e)
    }
}

/// Resolved transport security for the upstream connection.
///
/// Cheap to clone; the rustls configuration is shared.
#[derive(Clone)]
pub enum Credentials {
    /// Plaintext HTTP/2.
    Plaintext,
    /// TLS with the contained client configuration.
    Tls(TlsCredentials),
}

impl Credentials {
    pub fn is_tls(&self) -> bool {
        matches!(self, Credentials::Tls(_))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Plaintext => f.write_str("Plaintext"),
            Credentials::Tls(tls) => fmt::Debug::fmt(tls, f),
        }
    }
}

/// TLS half of [`Credentials`].
#[derive(Clone)]
pub struct TlsCredentials {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) server_name: Option<String>,
    verify: bool,
    client_identity: bool,
}

impl TlsCredentials {
    /// Name used for SNI and verification, falling back to the target host.
    pub fn server_name<'a>(&'a self, host: &'a str) -> &'a str {
        self.server_name.as_deref().unwrap_or(host)
    }

    pub fn verifies_server(&self) -> bool {
        self.verify
    }

    pub fn has_client_identity(&self) -> bool {
        self.client_identity
    }
}

impl fmt::Debug for TlsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls")
            .field("verify", &self.verify)
            .field("client_identity", &self.client_identity)
            .field("server_name", &self.server_name)
            .finish()
    }
}

/// Builder for upstream transport credentials.
pub struct CredentialBuilder;

impl CredentialBuilder {
    /// Build credentials from the TLS section of the probe configuration.
    ///
    /// Plaintext mode returns immediately. In TLS modes, contradictory
    /// options are rejected before any file is opened.
    pub fn build(tls: &ProbeTlsConfig) -> Result<Credentials, CredentialError> {
        if !tls.mode.is_tls() {
            debug!("gRPC TLS disabled (plaintext mode)");
            return Ok(Credentials::Plaintext);
        }

        tls.validate()?;

        let identity = match (&tls.client_cert, &tls.client_key) {
            (Some(cert), Some(key)) => Some(Self::load_identity(cert, key)?),
            _ => None,
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(CredentialError::Tls)?;

        let builder = if tls.mode == TlsMode::NoVerify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoServerVerification(provider)))
        } else {
            let roots = match &tls.ca_cert {
                Some(path) => Self::load_roots(path)?,
                None => Self::native_roots()?,
            };
            builder.with_root_certificates(roots)
        };

        let client_identity = identity.is_some();
        let mut config = match identity {
            Some((certs, key)) => builder
                .with_client_auth_cert(certs, key)
                .map_err(CredentialError::Tls)?,
            None => builder.with_no_client_auth(),
        };

        // gRPC runs over HTTP/2 only
        config.alpn_protocols = vec![b"h2".to_vec()];

        info!(
            mode = %tls.mode,
            ca = ?tls.ca_cert,
            client_identity,
            sni = tls.sni_server_name.as_deref().unwrap_or(""),
            "gRPC TLS credentials ready"
        );

        Ok(Credentials::Tls(TlsCredentials {
            config: Arc::new(config),
            server_name: tls.sni_server_name.clone(),
            verify: tls.mode == TlsMode::Verify,
            client_identity,
        }))
    }

    /// Load client certificate chain and private key.
    fn load_identity(
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), CredentialError> {
        let certs = load_certs(cert_path)?;
        if certs.is_empty() {
            return Err(CredentialError::NoCertificates {
                path: cert_path.to_path_buf(),
            });
        }

        let mut reader = open(key_path)?;
        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(|error| CredentialError::Read {
                path: key_path.to_path_buf(),
                error,
            })?
            .ok_or_else(|| CredentialError::NoPrivateKey {
                path: key_path.to_path_buf(),
            })?;

        Ok((certs, key))
    }

    /// Load trusted roots from a PEM bundle.
    fn load_roots(path: &Path) -> Result<RootCertStore, CredentialError> {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(load_certs(path)?);
        if added == 0 {
            return Err(CredentialError::NoCertificates {
                path: path.to_path_buf(),
            });
        }
        if ignored > 0 {
            warn!(
                path = %path.display(),
                ignored,
                "Skipped unparsable certificates in CA bundle"
            );
        }
        Ok(roots)
    }

    /// Platform trust store.
    fn native_roots() -> Result<RootCertStore, CredentialError> {
        let result = rustls_native_certs::load_native_certs();
        for error in &result.errors {
            warn!(error = %error, "Failed to load some platform root certificates");
        }
        platform_roots(result.certs)
    }
}

fn platform_roots(certs: Vec<CertificateDer<'static>>) -> Result<RootCertStore, CredentialError> {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(CredentialError::NoPlatformRoots);
    }
    debug!(added, ignored, "Loaded platform root certificates");
    Ok(roots)
}

fn open(path: &Path) -> Result<BufReader<File>, CredentialError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|error| CredentialError::Read {
            path: path.to_path_buf(),
            error,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let mut reader = open(path)?;
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| CredentialError::Read {
            path: path.to_path_buf(),
            error,
        })
}

/// Accepts any server certificate. Handshake signatures are still checked
/// so the session keys belong to whoever presented the certificate.
#[derive(Debug)]
struct NoServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
