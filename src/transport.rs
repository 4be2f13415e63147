//! Moving credentials between `http` header maps and the credential core.
//!
//! Tokens travel either as `HttpOnly; SameSite=Strict` cookies or, in bearer
//! mode, as plain request/response headers. The CSRF secret always travels in
//! its own header and is never put in a cookie.

use http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::TransportConfig;
use crate::credentials::IssuedCredentials;
use crate::error::CredentialError;

/// Response header carrying the auth token's `exp`.
pub const AUTH_EXPIRY_HEADER: &str = "Auth-Expiry";
/// Response header carrying the refresh token's `exp`.
pub const REFRESH_EXPIRY_HEADER: &str = "Refresh-Expiry";

const EXPIRED_COOKIE_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// The three strings a request presents. Absent values are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireCredentials {
    /// From the CSRF header or `Authorization: Bearer`
    pub csrf_secret: String,
    /// Compact auth JWT
    pub auth_token: String,
    /// Compact refresh JWT, empty when the client has none
    pub refresh_token: String,
}

/// Pull the CSRF secret and both tokens out of request headers.
///
/// Missing values come back empty so the credential core reports them with
/// the usual unauthorized errors.
///
/// # Errors
///
/// `MalformedInput` when a relevant header is not valid UTF-8.
pub fn extract_credentials(
    headers: &HeaderMap,
    transport: &TransportConfig,
) -> Result<WireCredentials, CredentialError> {
    let (auth_token, refresh_token) = if transport.bearer_tokens {
        (
            header_str(headers, &transport.auth_token_name)?.unwrap_or_default(),
            header_str(headers, &transport.refresh_token_name)?.unwrap_or_default(),
        )
    } else {
        (
            cookie_value(headers, &transport.auth_token_name)?.unwrap_or_default(),
            cookie_value(headers, &transport.refresh_token_name)?.unwrap_or_default(),
        )
    };

    Ok(WireCredentials {
        csrf_secret: csrf_from_headers(headers, transport)?,
        auth_token: auth_token.to_string(),
        refresh_token: refresh_token.to_string(),
    })
}

/// Write issued credentials and their expiries to response headers.
///
/// # Errors
///
/// `MalformedInput` when a configured name or a value cannot be a header.
pub fn write_credentials(
    headers: &mut HeaderMap,
    issued: &IssuedCredentials,
    transport: &TransportConfig,
) -> Result<(), CredentialError> {
    if transport.bearer_tokens {
        set_header(headers, &transport.auth_token_name, &issued.auth_token)?;
        if let Some(refresh_token) = &issued.refresh_token {
            set_header(headers, &transport.refresh_token_name, refresh_token)?;
        }
    } else {
        // No expiry on the auth cookie: an expired auth token must still be
        // sent so it can be refreshed.
        append_cookie(headers, transport, &transport.auth_token_name, &issued.auth_token, None)?;
        if let Some(refresh_token) = &issued.refresh_token {
            let max_age = issued
                .refresh_expiry
                .map(|exp| (exp - chrono::Utc::now().timestamp()).max(0));
            append_cookie(
                headers,
                transport,
                &transport.refresh_token_name,
                refresh_token,
                max_age.map(|secs| format!("Max-Age={}", secs)),
            )?;
        }
    }

    set_header(headers, &transport.csrf_token_name, &issued.csrf_secret)?;
    set_header(headers, AUTH_EXPIRY_HEADER, &issued.auth_expiry.to_string())?;
    match issued.refresh_expiry {
        Some(exp) => set_header(headers, REFRESH_EXPIRY_HEADER, &exp.to_string())?,
        None => {
            headers.remove(REFRESH_EXPIRY_HEADER);
        }
    }
    Ok(())
}

/// Clear credentials on the client, e.g. on logout or after a failed check.
///
/// # Errors
///
/// `MalformedInput` when a configured name cannot be a header.
pub fn nullify_credentials(
    headers: &mut HeaderMap,
    transport: &TransportConfig,
) -> Result<(), CredentialError> {
    if transport.bearer_tokens {
        set_header(headers, &transport.auth_token_name, "")?;
        set_header(headers, &transport.refresh_token_name, "")?;
    } else {
        for name in [&transport.auth_token_name, &transport.refresh_token_name] {
            let expire = format!("Max-Age=0; Expires={}", EXPIRED_COOKIE_DATE);
            append_cookie(headers, transport, name, "", Some(expire))?;
        }
    }

    headers.remove(header_name(&transport.csrf_token_name)?);
    headers.remove(AUTH_EXPIRY_HEADER);
    headers.remove(REFRESH_EXPIRY_HEADER);
    Ok(())
}

/// CSRF header first, then `Authorization: Bearer <secret>`.
fn csrf_from_headers(
    headers: &HeaderMap,
    transport: &TransportConfig,
) -> Result<String, CredentialError> {
    if let Some(csrf) = header_str(headers, &transport.csrf_token_name)?.filter(|v| !v.is_empty()) {
        return Ok(csrf.to_string());
    }

    let authorization = match headers.get(AUTHORIZATION) {
        Some(value) => to_str(value, "Authorization")?,
        None => return Ok(String::new()),
    };
    let secret = authorization
        .strip_prefix("Bearer")
        .unwrap_or(authorization)
        .trim();
    Ok(secret.to_string())
}

fn cookie_value<'h>(headers: &'h HeaderMap, name: &str) -> Result<Option<&'h str>, CredentialError> {
    for value in headers.get_all(COOKIE) {
        let found = to_str(value, "Cookie")?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value);
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

fn append_cookie(
    headers: &mut HeaderMap,
    transport: &TransportConfig,
    name: &str,
    value: &str,
    expiry: Option<String>,
) -> Result<(), CredentialError> {
    let mut cookie = format!(
        "{}={}; Path={}; HttpOnly; SameSite=Strict",
        name, value, transport.cookie_path
    );
    if transport.secure_cookies {
        cookie.push_str("; Secure");
    }
    if let Some(expiry) = expiry {
        cookie.push_str("; ");
        cookie.push_str(&expiry);
    }

    headers.append(SET_COOKIE, header_value(&cookie)?);
    Ok(())
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Result<Option<&'h str>, CredentialError> {
    headers
        .get(header_name(name)?)
        .map(|value| to_str(value, name))
        .transpose()
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), CredentialError> {
    headers.insert(header_name(name)?, header_value(value)?);
    Ok(())
}

fn header_name(name: &str) -> Result<HeaderName, CredentialError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| CredentialError::malformed(format!("invalid header name {:?}: {}", name, e)))
}

fn header_value(value: &str) -> Result<HeaderValue, CredentialError> {
    HeaderValue::from_str(value)
        .map_err(|e| CredentialError::malformed(format!("invalid header value: {}", e)))
}

fn to_str<'h>(value: &'h HeaderValue, name: &str) -> Result<&'h str, CredentialError> {
    value
        .to_str()
        .map_err(|_| CredentialError::malformed(format!("header {} is not valid UTF-8", name)))
}
