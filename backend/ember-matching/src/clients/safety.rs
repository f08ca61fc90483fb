//! Client for the block/safety service. Fails open: a missing blocklist must
//! never block the candidate path.

use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct SafetyServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl SafetyServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Blocked user ids for the given caller. The service may string-encode
    /// ids; anything non-parseable is dropped.
    pub async fn blocked_ids(&self, user_id: i64) -> Vec<i64> {
        let url = format!("{}/safety/blocked", self.base_url);
        match self
            .http
            .get(&url)
            .header("X-User-Id", user_id)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => match resp.json::<Vec<serde_json::Value>>().await {
                Ok(values) => values.iter().filter_map(parse_id).collect(),
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "blocked-ids decode failed, treating as empty");
                    vec![]
                }
            },
            Ok(resp) => {
                tracing::warn!(user_id, status = %resp.status(), "blocked-ids request failed, treating as empty");
                vec![]
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "safety service unreachable, treating blocklist as empty");
                vec![]
            }
        }
    }

    pub async fn is_blocked(&self, user_id: i64, target_id: i64) -> bool {
        let url = format!("{}/safety/is-blocked/{}", self.base_url, target_id);
        match self
            .http
            .get(&url)
            .header("X-User-Id", user_id)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.json::<bool>().await.unwrap_or(false),
            _ => false,
        }
    }
}

fn parse_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_numbers_and_strings_and_drops_junk() {
        assert_eq!(parse_id(&serde_json::json!(42)), Some(42));
        assert_eq!(parse_id(&serde_json::json!("17")), Some(17));
        assert_eq!(parse_id(&serde_json::json!(" 9 ")), Some(9));
        assert_eq!(parse_id(&serde_json::json!("abc")), None);
        assert_eq!(parse_id(&serde_json::json!(null)), None);
        assert_eq!(parse_id(&serde_json::json!(1.5)), None);
    }
}
