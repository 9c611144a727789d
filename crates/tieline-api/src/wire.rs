// Device wire conventions
//
// Fixed resource paths and the two pieces of header parsing the session
// layer needs: the `WWW-Authenticate` digest challenge and the
// `csrfCookie` session token.

use reqwest::header::{HeaderMap, SET_COOKIE, WWW_AUTHENTICATE};

use crate::error::Error;

/// Unauthenticated probe resource; answers 401 with a digest challenge.
pub const PROBE_PATH: &str = "/assets/base/home.html";

/// Routing-control resource.
pub const MATRIX_PATH: &str = "/api/matrix";

/// Meter poll issued by the device's own UI; cheap enough to keep a session alive.
pub const METER_PATH: &str = "/api/ppm?skip=0&width=8&interval=50&version=1\
    &c=enc1&c=enc2&c=enc3&c=enc4&c=enc5&c=enc6&c=enc7&c=enc8\
    &c=enc9&c=enc10&c=enc11&c=enc12&c=enc13&c=enc14&c=enc15&c=enc16\
    &c=dec1&c=dec2&c=dec3&c=dec4&c=dec5&c=dec6&c=dec7&c=dec8\
    &c=dec9&c=dec10&c=dec11&c=dec12&c=dec13&c=dec14&c=dec15&c=dec16\
    &c=hpl&c=hpr";

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "csrfCookie";

/// Header the session token is echoed back in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Realm and nonce from a `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
}

impl Challenge {
    /// Parse the value of a `WWW-Authenticate` header.
    ///
    /// Only `realm` and `nonce` are read; every other directive is ignored.
    pub fn parse(header: &str) -> Result<Self, Error> {
        let rest = header.trim_start();
        let scheme_len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (scheme, params) = rest.split_at(scheme_len);
        if !scheme.eq_ignore_ascii_case("Digest") {
            return Err(Error::protocol(format!(
                "unsupported authentication scheme '{scheme}'"
            )));
        }

        let mut realm = None;
        let mut nonce = None;
        for (key, value) in directives(params) {
            if key.eq_ignore_ascii_case("realm") {
                realm = Some(value);
            } else if key.eq_ignore_ascii_case("nonce") {
                nonce = Some(value);
            }
        }

        match (realm, nonce) {
            (Some(realm), Some(nonce)) if !nonce.is_empty() => Ok(Self { realm, nonce }),
            (None, _) => Err(Error::protocol("digest challenge is missing realm")),
            _ => Err(Error::protocol("digest challenge is missing nonce")),
        }
    }

    /// Find and parse the digest challenge among a response's headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, Error> {
        let mut last_err = Error::protocol("response carries no WWW-Authenticate header");
        for value in headers.get_all(WWW_AUTHENTICATE) {
            let Ok(text) = value.to_str() else { continue };
            match Self::parse(text) {
                Ok(challenge) => return Ok(challenge),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

/// Split `k1="v1", k2=v2` into key/value pairs, honouring quoted commas.
fn directives(params: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = params.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(c) = chars.peek().copied() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        let key = key.trim().to_owned();
        if key.is_empty() {
            break;
        }
        // Bare token without a value, e.g. `stale,`
        if chars.next_if_eq(&'=').is_none() {
            out.push((key, String::new()));
            continue;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    other => value.push(other),
                }
            }
        } else {
            while let Some(c) = chars.peek().copied() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_owned();
        }
        out.push((key, value));
    }

    out
}

/// Extract the session token from every `Set-Cookie` occurrence.
///
/// Returns the value of the first cookie named [`SESSION_COOKIE`].
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            (name.trim() == SESSION_COOKIE).then(|| value.trim().to_owned())
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn parses_realm_and_nonce() {
        let c = Challenge::parse(r#"Digest realm="tieline", nonce="abc123""#).unwrap();
        assert_eq!(c.realm, "tieline");
        assert_eq!(c.nonce, "abc123");
    }

    #[test]
    fn ignores_other_directives_and_quoted_commas() {
        let c = Challenge::parse(
            r#"Digest qop="auth,auth-int", realm="a, b", algorithm=MD5, nonce="n0", stale=false"#,
        )
        .unwrap();
        assert_eq!(c.realm, "a, b");
        assert_eq!(c.nonce, "n0");
    }

    #[test]
    fn bare_tokens_do_not_swallow_the_next_directive() {
        let c = Challenge::parse(r#"Digest stale, realm="x", userhash, nonce="y""#).unwrap();
        assert_eq!(c.realm, "x");
        assert_eq!(c.nonce, "y");
    }

    #[test]
    fn rejects_basic_scheme() {
        let err = Challenge::parse(r#"Basic realm="x""#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }), "{err:?}");
    }

    #[test]
    fn rejects_missing_nonce() {
        let err = Challenge::parse(r#"Digest realm="x""#).unwrap_err();
        assert!(err.to_string().contains("nonce"), "{err}");
    }

    #[test]
    fn from_headers_requires_a_challenge() {
        let err = Challenge::from_headers(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn picks_session_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("lang=en; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("csrfCookieOld=nope"));
        headers.append(SET_COOKIE, HeaderValue::from_static("csrfCookie=XYZ; Path=/"));
        assert_eq!(session_token(&headers).as_deref(), Some("XYZ"));
    }

    #[test]
    fn no_session_cookie_yields_none() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("lang=en"));
        assert_eq!(session_token(&headers), None);
    }
}
