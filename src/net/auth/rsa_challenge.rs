use async_trait::async_trait;
use rand::RngCore;
use rsa::{PaddingScheme, PublicKey, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tokio::net::TcpStream;

use crate::error::{ErrorKind, Result, ResultSimpleExt, ResultWrappedExt};
use crate::net::auth::{AuthMethod, HandshakeMessage};
use crate::net::frame::FramedStream;

const NONCE_LEN: usize = 16;

fn oaep() -> PaddingScheme {
    PaddingScheme::new_oaep::<Sha256>()
}

fn reverse(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Nonce-reversal challenge over an RSA keypair shared by the whole
/// cluster (every node is configured with the same public/private
/// key pair; there is no per-peer key).
///
/// The acceptor proves possession of the private key by generating a
/// fresh nonce, and the initiator proves possession of the same
/// private key by decrypting that nonce and sending back its byte
/// reversal, re-encrypted under the public key so that the reversed
/// value is never carried on the wire unencrypted.
pub struct RsaChallengeAuth {
    public_key: RsaPublicKey,
    private_key: RsaPrivateKey,
}

impl RsaChallengeAuth {
    pub fn new(public_key: RsaPublicKey, private_key: RsaPrivateKey) -> Self {
        RsaChallengeAuth {
            public_key,
            private_key,
        }
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::rngs::OsRng;
        self.public_key
            .encrypt(&mut rng, oaep(), data)
            .map_err(|e| e.to_string())
            .wrapped(ErrorKind::Authentication)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.private_key
            .decrypt(oaep(), data)
            .map_err(|e| e.to_string())
            .wrapped(ErrorKind::Authentication)
    }
}

#[async_trait]
impl AuthMethod for RsaChallengeAuth {
    async fn initiate(&self, stream: &mut FramedStream<TcpStream>) -> Result<()> {
        HandshakeMessage::new("START_RSA", Vec::new())
            .send(stream)
            .await?;

        let ciphertext = HandshakeMessage::recv(stream)
            .await?
            .expect_name("RSA_RAND")?
            .bytes;
        let nonce = self.decrypt(&ciphertext)?;
        let reversed = reverse(&nonce);
        let reply_ciphertext = self.encrypt(&reversed)?;

        HandshakeMessage::new("RSA_RAND", reply_ciphertext)
            .send(stream)
            .await
    }

    async fn accept(&self, stream: &mut FramedStream<TcpStream>) -> Result<()> {
        HandshakeMessage::recv(stream)
            .await?
            .expect_name("START_RSA")?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let ciphertext = self.encrypt(&nonce)?;

        HandshakeMessage::new("RSA_RAND", ciphertext)
            .send(stream)
            .await?;

        let reply_ciphertext = HandshakeMessage::recv(stream)
            .await?
            .expect_name("RSA_RAND")?
            .bytes;
        let reversed_candidate = self.decrypt(&reply_ciphertext)?;

        if reversed_candidate != reverse(&nonce) {
            return Err(()).simple(ErrorKind::Authentication);
        }
        Ok(())
    }
}
