use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::TlsAcceptor;

/// Certificate and key for serving pgwire over TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsConfig {
    /// Read `CLASSBOOK_TLS_CERT` / `CLASSBOOK_TLS_KEY`.
    pub fn from_env() -> io::Result<Option<Self>> {
        Self::from_parts(
            std::env::var("CLASSBOOK_TLS_CERT").ok(),
            std::env::var("CLASSBOOK_TLS_KEY").ok(),
        )
    }

    /// Both paths or neither. `None` means plaintext connections.
    pub fn from_parts(cert: Option<String>, key: Option<String>) -> io::Result<Option<Self>> {
        match (cert, key) {
            (None, None) => Ok(None),
            (Some(cert), Some(key)) => Ok(Some(Self { cert: cert.into(), key: key.into() })),
            (Some(_), None) => Err(invalid("CLASSBOOK_TLS_CERT is set without CLASSBOOK_TLS_KEY")),
            (None, Some(_)) => Err(invalid("CLASSBOOK_TLS_KEY is set without CLASSBOOK_TLS_CERT")),
        }
    }

    pub fn acceptor(&self) -> io::Result<TlsAcceptor> {
        let certs: Vec<_> = rustls_pemfile::certs(&mut open_pem(&self.cert)?)
            .collect::<Result<_, _>>()
            .map_err(|e| with_path(&self.cert, e))?;
        if certs.is_empty() {
            return Err(invalid(format!("no certificates in {}", self.cert.display())));
        }

        let key = rustls_pemfile::private_key(&mut open_pem(&self.key)?)
            .map_err(|e| with_path(&self.key, e))?
            .ok_or_else(|| invalid(format!("no private key in {}", self.key.display())))?;

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| invalid(format!("certificate and key rejected: {e}")))?;
        config.alpn_protocols = vec![b"postgresql".to_vec()];

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn open_pem(path: &Path) -> io::Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| with_path(path, e))
}

fn with_path(path: &Path, e: io::Error) -> io::Error {
    io::Error::new(e.kind(), format!("{}: {e}", path.display()))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidInput, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn pem_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("classbook_test_tls").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn plaintext_without_paths() {
        assert_eq!(TlsConfig::from_parts(None, None).unwrap(), None);
    }

    #[test]
    fn both_paths_required() {
        let err = TlsConfig::from_parts(Some("cert.pem".into()), None).unwrap_err();
        assert!(err.to_string().contains("CLASSBOOK_TLS_KEY"), "{err}");
        let err = TlsConfig::from_parts(None, Some("key.pem".into())).unwrap_err();
        assert!(err.to_string().contains("CLASSBOOK_TLS_CERT"), "{err}");

        let config = TlsConfig::from_parts(Some("c.pem".into()), Some("k.pem".into())).unwrap();
        assert_eq!(config, Some(TlsConfig { cert: "c.pem".into(), key: "k.pem".into() }));
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = pem_dir("missing");
        let config = TlsConfig { cert: dir.join("absent.pem"), key: dir.join("key.pem") };
        let err = config.acceptor().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("absent.pem"), "{err}");
    }

    #[test]
    fn empty_certificate_file_rejected() {
        let dir = pem_dir("empty");
        let cert = dir.join("cert.pem");
        fs::write(&cert, "").unwrap();
        let config = TlsConfig { cert, key: dir.join("key.pem") };
        let err = config.acceptor().err().unwrap();
        assert!(err.to_string().contains("no certificates"), "{err}");
    }
}
