use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde_json::Value;

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req.headers().get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        cookie::Cookie::split_parse(cookie_header)
            .flatten()
            .find(|c| c.name() == "auth_token")
            .map(|c| c.value().to_string())
            .ok_or_else(|| "auth_token cookie not found".to_string())
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Value>(token, &decoding_key, &validation)
}

// The caller's user id: the `userId` claim, else `sub`
pub fn user_id_from_claims(claims: &Value) -> Option<String> {
    ["userId", "sub"]
        .iter()
        .filter_map(|key| claims.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    pub(crate) const SECRET: &str = "test-secret";

    /// HS256 token for `user_id`, valid for an hour.
    pub(crate) fn mint_token(user_id: &str) -> String {
        let claims = json!({
            "userId": user_id,
            "exp": chrono::Utc::now().timestamp() + 3600,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn token_from_bearer_header_or_cookie() {
        let req = http::Request::builder()
            .header(http::header::AUTHORIZATION, "Bearer abc")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "abc");

        let req = http::Request::builder()
            .header(http::header::COOKIE, "theme=dark; auth_token=xyz")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "xyz");

        let req = http::Request::builder().body(()).unwrap();
        assert!(get_auth_token(&req).is_err());
    }

    #[test]
    fn minted_token_validates_and_yields_user_id() {
        let data = validate_jwt(&mint_token("u-1"), SECRET).unwrap();
        assert_eq!(user_id_from_claims(&data.claims).as_deref(), Some("u-1"));
        assert!(validate_jwt(&mint_token("u-1"), "other-secret").is_err());
    }

    #[test]
    fn user_id_falls_back_to_sub() {
        assert_eq!(user_id_from_claims(&json!({"sub": "u-2"})).as_deref(), Some("u-2"));
        assert_eq!(user_id_from_claims(&json!({"userId": "", "sub": "u-3"})).as_deref(), Some("u-3"));
        assert_eq!(user_id_from_claims(&json!({"name": "x"})), None);
    }
}
