//! Handshake helpers.

use tungstenite::handshake::server::Request;
use url::form_urlencoded;

/// Close code sent when the authenticator denies a handshake.
pub const DENIED_CLOSE_CODE: u16 = 4401;

/// Bearer token from the `Authorization` header, falling back to the
/// `token` query parameter.
pub fn bearer_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(tungstenite::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        let query = request.uri().query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .filter(|token| !token.is_empty())
    })
}
