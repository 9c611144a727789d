// Digest access authentication (RFC 7616, `qop=auth`, MD5)
//
// Pure response computation. The only side effect is drawing a fresh
// client nonce from the thread-local CSPRNG on every call.

use md5::{Digest, Md5};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

/// Algorithm tag the device recomputes against. Must match bit-for-bit.
pub const ALGORITHM: &str = "MD5";
/// Quality of protection; only `auth` is supported by the device.
pub const QOP: &str = "auth";

const CNONCE_BYTES: usize = 8;

/// The inputs of a digest response that stay fixed for a session.
#[derive(Debug, Clone, Copy)]
pub struct DigestCredential<'a> {
    pub username: &'a str,
    pub password: &'a SecretString,
    pub realm: &'a str,
    pub nonce: &'a str,
}

impl DigestCredential<'_> {
    /// Build an `Authorization` header value for one request.
    ///
    /// `nc` is the nonce-count; callers are responsible for never reusing
    /// it against the same realm/nonce.
    pub fn authorization(&self, method: &str, uri: &str, nc: u32) -> String {
        self.authorization_with_cnonce(method, uri, nc, &random_cnonce())
    }

    /// Same as [`authorization`](Self::authorization) with a caller-chosen
    /// client nonce. Deterministic.
    pub fn authorization_with_cnonce(
        &self,
        method: &str,
        uri: &str,
        nc: u32,
        cnonce: &str,
    ) -> String {
        let nc = format_nc(nc);
        let response = self.response(method, uri, &nc, cnonce);
        format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", \
             algorithm=\"{ALGORITHM}\", qop={QOP}, nc={nc}, cnonce=\"{cnonce}\", \
             response=\"{response}\"",
            self.username, self.realm, self.nonce,
        )
    }

    /// `MD5(HA1:nonce:nc:cnonce:qop:HA2)` as lowercase hex.
    pub fn response(&self, method: &str, uri: &str, nc: &str, cnonce: &str) -> String {
        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            self.username,
            self.realm,
            self.password.expose_secret()
        ));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:{QOP}:{ha2}", self.nonce))
    }
}

/// Nonce-count as eight zero-padded lowercase hex digits.
pub fn format_nc(nc: u32) -> String {
    format!("{nc:08x}")
}

fn random_cnonce() -> String {
    let mut bytes = [0u8; CNONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}
