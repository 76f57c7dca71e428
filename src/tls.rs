use std::{collections::HashMap, sync::Arc, sync::LazyLock};

use regex::Regex;
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{self, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};

use crate::{Error, Result};

pub const SUBJECT: &str = "Subject";
pub const ISSUER: &str = "Issuer";
pub const SERIAL: &str = "Serial Number";
pub const START_DATE: &str = "Start date";
pub const EXPIRE_DATE: &str = "Expire date";

/// One certificate of the peer chain, as `field name -> free text`.
pub type CertInfo = HashMap<String, String>;

static NAME_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\s=,]+)\s*=\s*([^,]*)").expect("valid regex"));

/// Build the client configuration for one request.
///
/// With `insecure` the peer chain is still captured but never validated.
pub fn client_config(insecure: bool) -> Result<ClientConfig> {
    let provider = Arc::new(crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Transport(e.to_string()))?;
    let mut config = if insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth()
    } else {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder
            .with_root_certificates(root_store)
            .with_no_client_auth()
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

/// Verifier used for `--forcessl`: accepts any chain but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Describe every certificate of the peer chain, leaf first.
///
/// Certificates x509-parser cannot read are skipped with a warning.
pub fn describe_chain(chain: &[CertificateDer<'_>]) -> Vec<CertInfo> {
    chain
        .iter()
        .filter_map(|der| match x509_parser::parse_x509_certificate(der.as_ref()) {
            Ok((_, cert)) => Some(describe(&cert)),
            Err(e) => {
                log::warn!("Skipping unreadable peer certificate: {}", e);
                None
            }
        })
        .collect()
}

fn describe(cert: &x509_parser::certificate::X509Certificate<'_>) -> CertInfo {
    let tbs = &cert.tbs_certificate;
    let mut info = CertInfo::new();
    info.insert(SUBJECT.to_string(), tbs.subject.to_string());
    info.insert(ISSUER.to_string(), tbs.issuer.to_string());
    info.insert(SERIAL.to_string(), tbs.raw_serial_as_string());
    // RFC 2822 keeps the dates readable by chrono later on
    let not_before = tbs
        .validity
        .not_before
        .to_rfc2822()
        .unwrap_or_else(|_| tbs.validity.not_before.to_string());
    let not_after = tbs
        .validity
        .not_after
        .to_rfc2822()
        .unwrap_or_else(|_| tbs.validity.not_after.to_string());
    info.insert(START_DATE.to_string(), not_before);
    info.insert(EXPIRE_DATE.to_string(), not_after);
    info
}

/// Pick one attribute out of a `key = value, key = value` distinguished name.
///
/// ```text
/// name_field("CN = example.com, O = Example Inc", "CN") == Ok("example.com")
/// ```
pub fn name_field(name: &str, field: &str) -> Result<String> {
    NAME_FIELD
        .captures_iter(name)
        .filter(|caps| &caps[1] == field)
        .map(|caps| caps[2].trim().to_string())
        .last()
        .ok_or_else(|| Error::CertFieldMissing(field.to_string()))
}

/// Look up a field of a certificate block.
pub fn cert_field<'a>(cert: &'a CertInfo, field: &str) -> Result<&'a str> {
    cert.get(field)
        .map(String::as_str)
        .ok_or_else(|| Error::CertFieldMissing(field.to_string()))
}
