//! Client for the swipe service: swiped-target ids and trust scores.
//!
//! Every call is fail-open - the candidate path must keep working when the
//! swipe service is down, with swiped ids defaulting to empty and trust to
//! full.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const PAGE_SIZE: usize = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_TRUST: f64 = 100.0;

#[derive(Clone)]
pub struct SwipeServiceClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustScoreEntry {
    user_id: i64,
    trust_score: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchTrustRequest<'a> {
    user_ids: &'a [i64],
}

impl SwipeServiceClient {
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

    /// All target ids this user has swiped, paging until a short page.
    pub async fn swiped_ids(&self, user_id: i64) -> Vec<i64> {
        let mut ids: Vec<i64> = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "{}/swipes/user/{}?page={}&pageSize={}",
                self.base_url, user_id, page, PAGE_SIZE
            );
            let batch: Vec<i64> = match self.http.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json().await {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "swiped-ids decode failed, treating as empty");
                        return vec![];
                    }
                },
                Ok(resp) => {
                    tracing::warn!(user_id, status = %resp.status(), "swiped-ids request failed, treating as empty");
                    return vec![];
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "swipe service unreachable, treating swiped ids as empty");
                    return vec![];
                }
            };

            let short_page = batch.len() < PAGE_SIZE;
            ids.extend(batch);
            if short_page {
                break;
            }
            page += 1;
        }

        ids
    }

    pub async fn trust_score(&self, user_id: i64) -> f64 {
        let url = format!(
            "{}/internal/swipe-behavior/{}/trust-score",
            self.base_url, user_id
        );
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<TrustScoreEntry>()
                .await
                .map(|entry| entry.trust_score)
                .unwrap_or(DEFAULT_TRUST),
            Ok(resp) => {
                tracing::warn!(user_id, status = %resp.status(), "trust-score request failed, defaulting to full trust");
                DEFAULT_TRUST
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "swipe service unreachable, defaulting to full trust");
                DEFAULT_TRUST
            }
        }
    }

    /// Trust for a batch of users. Missing entries and failures read as full
    /// trust at the call site.
    pub async fn batch_trust_scores(&self, user_ids: &[i64]) -> HashMap<i64, f64> {
        if user_ids.is_empty() {
            return HashMap::new();
        }
        if let [single] = user_ids {
            let mut scores = HashMap::new();
            scores.insert(*single, self.trust_score(*single).await);
            return scores;
        }
        let url = format!("{}/internal/swipe-behavior/batch-trust-scores", self.base_url);
        match self
            .http
            .post(&url)
            .json(&BatchTrustRequest { user_ids })
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => match resp.json::<Vec<TrustScoreEntry>>().await {
                Ok(entries) => entries
                    .into_iter()
                    .map(|e| (e.user_id, e.trust_score))
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "batch trust decode failed, defaulting to full trust");
                    HashMap::new()
                }
            },
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "batch trust request failed, defaulting to full trust");
                HashMap::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "swipe service unreachable, defaulting to full trust");
                HashMap::new()
            }
        }
    }
}
