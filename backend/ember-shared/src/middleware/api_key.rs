use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::errors::{AppError, ErrorCode};

/// Extractor gating service-to-service `/internal/*` endpoints.
///
/// The caller must present the shared key in `X-Internal-Api-Key`. The key is
/// read from `EMBER_INTERNAL_API_KEY`; when unset, a development default is
/// used so local compose setups work out of the box.
pub struct InternalApiKey;

#[axum::async_trait]
impl<S> FromRequestParts<S> for InternalApiKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let presented = extract_api_key(&parts.headers)?;
        let expected = std::env::var("EMBER_INTERNAL_API_KEY")
            .unwrap_or_else(|_| "development-internal-key".to_string());

        if presented != expected {
            return Err(AppError::new(ErrorCode::Forbidden, "invalid internal api key"));
        }

        Ok(Self)
    }
}

fn extract_api_key(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("X-Internal-Api-Key")
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing internal api key header"))?
        .to_str()
        .map(|s| s.to_string())
        .map_err(|_| AppError::new(ErrorCode::Unauthorized, "invalid internal api key header"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_header_is_rejected() {
        let headers = HeaderMap::new();
        assert!(extract_api_key(&headers).is_err());
    }

    #[test]
    fn header_value_is_returned() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Internal-Api-Key", HeaderValue::from_static("secret"));
        assert_eq!(extract_api_key(&headers).unwrap(), "secret");
    }
}
