//! TLS material resolution for mutual authentication.
//!
//! Certificate, key, and CA options accept either in-memory PEM bytes
//! or filenames. Filenames may contain `{hostname}`, replaced with the
//! local host name, so one configuration file can serve a fleet where
//! every machine carries its own certificate. Files are read
//! synchronously at client construction; failures surface as
//! configuration errors.

use crate::error::{CouchLinkError, Result};
use std::fmt;

/// One piece of TLS material: raw PEM bytes or a filename.
#[derive(Clone)]
pub enum TlsItem {
    /// PEM bytes used directly.
    Bytes(Vec<u8>),
    /// Filename, `{hostname}` substituted before reading.
    File(String),
}

impl fmt::Debug for TlsItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

impl From<Vec<u8>> for TlsItem {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&str> for TlsItem {
    fn from(path: &str) -> Self {
        Self::File(path.to_string())
    }
}

impl From<String> for TlsItem {
    fn from(path: String) -> Self {
        Self::File(path)
    }
}

/// TLS configuration accepted by the client builder.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Client certificate (PEM).
    pub cert: Option<TlsItem>,
    /// Client private key (PEM).
    pub key: Option<TlsItem>,
    /// Extra trust anchors (PEM), each possibly a file.
    pub ca: Vec<TlsItem>,
}

impl TlsOptions {
    /// True when nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.cert.is_none() && self.key.is_none() && self.ca.is_empty()
    }
}

/// Resolved PEM bytes, ready to feed the connection agent.
#[derive(Debug, Clone, Default)]
pub(crate) struct TlsMaterial {
    cert: Option<Vec<u8>>,
    key: Option<Vec<u8>>,
    ca: Vec<Vec<u8>>,
}

impl TlsMaterial {
    /// Resolve every item, reading files now.
    pub(crate) fn load(options: &TlsOptions) -> Result<Self> {
        Ok(Self {
            cert: options.cert.as_ref().map(resolve_item).transpose()?,
            key: options.key.as_ref().map(resolve_item).transpose()?,
            ca: options.ca.iter().map(resolve_item).collect::<Result<_>>()?,
        })
    }

    /// The client identity (combined cert + key PEM), if configured.
    pub(crate) fn identity(&self) -> Result<Option<reqwest::Identity>> {
        match (&self.cert, &self.key) {
            (None, None) => Ok(None),
            (Some(cert), Some(key)) => {
                let mut pem = cert.clone();
                if !pem.ends_with(b"\n") {
                    pem.push(b'\n');
                }
                pem.extend_from_slice(key);
                let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                    CouchLinkError::ConfigurationError(format!("Invalid client identity: {}", e))
                })?;
                Ok(Some(identity))
            },
            _ => Err(CouchLinkError::ConfigurationError(
                "Client TLS requires both `cert` and `key`".to_string(),
            )),
        }
    }

    /// Extra root certificates to trust.
    pub(crate) fn root_certificates(&self) -> Result<Vec<reqwest::Certificate>> {
        self.ca
            .iter()
            .map(|pem| {
                reqwest::Certificate::from_pem(pem).map_err(|e| {
                    CouchLinkError::ConfigurationError(format!("Invalid CA certificate: {}", e))
                })
            })
            .collect()
    }
}

fn resolve_item(item: &TlsItem) -> Result<Vec<u8>> {
    match item {
        TlsItem::Bytes(bytes) => Ok(bytes.clone()),
        TlsItem::File(pattern) => {
            let path = substitute_hostname(pattern);
            std::fs::read(&path).map_err(|e| {
                CouchLinkError::ConfigurationError(format!(
                    "Cannot read TLS material from {}: {}",
                    path, e
                ))
            })
        },
    }
}

fn substitute_hostname(pattern: &str) -> String {
    if !pattern.contains("{hostname}") {
        return pattern.to_string();
    }
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    pattern.replace("{hostname}", &hostname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bytes_used_directly() {
        let options = TlsOptions {
            ca: vec![TlsItem::Bytes(b"-----BEGIN CERTIFICATE-----".to_vec())],
            ..TlsOptions::default()
        };
        let material = TlsMaterial::load(&options).unwrap();
        assert_eq!(material.ca.len(), 1);
        assert!(material.ca[0].starts_with(b"-----BEGIN"));
    }

    #[test]
    fn test_file_is_read_at_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"pem bytes from disk").unwrap();

        let options = TlsOptions {
            cert: Some(TlsItem::File(file.path().to_string_lossy().into_owned())),
            ..TlsOptions::default()
        };
        let material = TlsMaterial::load(&options).unwrap();
        assert_eq!(material.cert.as_deref(), Some(&b"pem bytes from disk"[..]));
    }

    #[test]
    fn test_hostname_substitution_in_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let path = dir.path().join(format!("ca-{}.pem", hostname));
        std::fs::write(&path, b"host-specific pem").unwrap();

        let pattern = dir
            .path()
            .join("ca-{hostname}.pem")
            .to_string_lossy()
            .into_owned();
        let options = TlsOptions {
            ca: vec![TlsItem::File(pattern)],
            ..TlsOptions::default()
        };
        let material = TlsMaterial::load(&options).unwrap();
        assert_eq!(material.ca[0], b"host-specific pem");
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        let options = TlsOptions {
            key: Some(TlsItem::File("/nonexistent/key.pem".to_string())),
            ..TlsOptions::default()
        };
        let err = TlsMaterial::load(&options).unwrap_err();
        assert!(matches!(err, CouchLinkError::ConfigurationError(_)));
    }

    #[test]
    fn test_cert_without_key_rejected() {
        let material = TlsMaterial {
            cert: Some(b"cert".to_vec()),
            ..TlsMaterial::default()
        };
        assert!(material.identity().is_err());
    }
}
