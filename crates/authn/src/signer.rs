//! Signing of login ticket requests.
//!
//! The login service only accepts a TRA wrapped in a CMS (PKCS#7) signed-data
//! structure produced with the certificate registered for the principal. The
//! [`TraSigner`] trait abstracts that step so tests can substitute a signer
//! that needs no key material.

use std::sync::Arc;

use crate::error::Result;

/// Produces the signed CMS envelope of a TRA document.
///
/// Signing is synchronous: it is CPU-bound and short, and the gateway calls
/// it at most once per remote login.
pub trait TraSigner: Send + Sync {
    /// Signs `tra` and returns the base64-encoded DER CMS structure with the
    /// TRA embedded.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`](crate::AuthError::Signing) if the
    /// signature cannot be produced.
    fn sign(&self, tra: &str) -> Result<String>;
}

impl<T: TraSigner + ?Sized> TraSigner for Arc<T> {
    fn sign(&self, tra: &str) -> Result<String> {
        (**self).sign(tra)
    }
}

#[cfg(feature = "openssl")]
mod cms {
    use std::{fmt, path::Path};

    use base64::{Engine, engine::general_purpose::STANDARD};
    use openssl::{
        pkcs7::{Pkcs7, Pkcs7Flags},
        pkey::{PKey, Private},
        stack::Stack,
        x509::X509,
    };
    use zeroize::Zeroizing;

    use super::TraSigner;
    use crate::error::{AuthError, Result};

    /// [`TraSigner`] backed by OpenSSL.
    ///
    /// Holds the parsed certificate and private key. The PEM bytes read from
    /// disk are scrubbed from memory once parsed.
    pub struct OpensslCmsSigner {
        certificate: X509,
        key: PKey<Private>,
    }

    impl OpensslCmsSigner {
        /// Creates a signer from PEM-encoded certificate and private key.
        ///
        /// # Errors
        ///
        /// Returns [`AuthError::Signing`] if either PEM block cannot be
        /// parsed, the passphrase is wrong, or the key does not match the
        /// certificate.
        pub fn from_pem(
            certificate_pem: &[u8],
            key_pem: &[u8],
            passphrase: Option<&str>,
        ) -> Result<Self> {
            let certificate = X509::from_pem(certificate_pem)
                .map_err(|e| AuthError::Signing(format!("invalid certificate: {e}")))?;
            let key = match passphrase {
                Some(p) => PKey::private_key_from_pem_passphrase(key_pem, p.as_bytes()),
                None => PKey::private_key_from_pem(key_pem),
            }
            .map_err(|e| AuthError::Signing(format!("invalid private key: {e}")))?;

            let public = certificate
                .public_key()
                .map_err(|e| AuthError::Signing(format!("unreadable certificate key: {e}")))?;
            if !public.public_eq(&key) {
                return Err(AuthError::Signing(
                    "private key does not match the certificate".into(),
                ));
            }

            Ok(Self { certificate, key })
        }

        /// Creates a signer from PEM files on disk.
        ///
        /// The files are read with blocking I/O, like signing itself. Call
        /// this at startup or from `tokio::task::spawn_blocking`, not on a
        /// runtime worker in the middle of request handling.
        ///
        /// # Errors
        ///
        /// Returns [`AuthError::Signing`] if either file cannot be read or
        /// parsed.
        pub fn from_files(
            certificate_path: impl AsRef<Path>,
            key_path: impl AsRef<Path>,
            passphrase: Option<&str>,
        ) -> Result<Self> {
            let certificate = read_pem(certificate_path.as_ref())?;
            let key = read_pem(key_path.as_ref())?;
            Self::from_pem(&certificate, &key, passphrase)
        }
    }

    fn read_pem(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
        std::fs::read(path)
            .map(Zeroizing::new)
            .map_err(|e| AuthError::Signing(format!("cannot read {}: {e}", path.display())))
    }

    impl TraSigner for OpensslCmsSigner {
        fn sign(&self, tra: &str) -> Result<String> {
            let chain = Stack::<X509>::new()
                .map_err(|e| AuthError::Signing(format!("cannot allocate chain: {e}")))?;
            let der = Pkcs7::sign(
                &self.certificate,
                &self.key,
                &chain,
                tra.as_bytes(),
                Pkcs7Flags::BINARY,
            )
            .and_then(|cms| cms.to_der())
            .map_err(|e| AuthError::Signing(e.to_string()))?;

            Ok(STANDARD.encode(der))
        }
    }

    impl fmt::Debug for OpensslCmsSigner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("OpensslCmsSigner")
                .field("subject", &self.certificate.subject_name())
                .field("key", &"[REDACTED]")
                .finish()
        }
    }

}

#[cfg(feature = "openssl")]
pub use cms::OpensslCmsSigner;
