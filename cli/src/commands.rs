//! CLI Commands

use d21_core::{Address, SubjectId};
use d21_election::{BallotSlot, BallotStage, Polarity, SubjectStanding};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// API Client for interacting with a D21 node
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp: ApiResponse<T> = self.client.get(self.url(path)).send().await?.json().await?;
        resp.into_result()
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let resp: ApiResponse<T> = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        resp.into_result()
    }

    /// Get node status
    pub async fn status(&self) -> Result<NodeStatus, ApiError> {
        self.get("/status").await
    }

    /// List elections hosted by the node
    pub async fn elections(&self) -> Result<Vec<ElectionInfo>, ApiError> {
        self.get("/elections").await
    }

    /// Create an election
    pub async fn create_election(
        &self,
        administrator: &Address,
        voting_duration_secs: Option<u64>,
    ) -> Result<ElectionInfo, ApiError> {
        let body = serde_json::json!({
            "administrator": administrator.to_hex(),
            "voting_duration_secs": voting_duration_secs,
        });
        self.post("/elections", &body).await
    }

    /// Get election details
    pub async fn election(&self, election: &str) -> Result<ElectionInfo, ApiError> {
        self.get(&format!("/elections/{}", election)).await
    }

    /// Subject ids in registration order
    pub async fn subjects(&self, election: &str) -> Result<Vec<u32>, ApiError> {
        self.get(&format!("/elections/{}/subjects", election)).await
    }

    /// Subject details
    pub async fn subject(&self, election: &str, subject: SubjectId) -> Result<SubjectInfo, ApiError> {
        self.get(&format!("/elections/{}/subjects/{}", election, subject.0))
            .await
    }

    /// Register a subject
    pub async fn register_subject(&self, election: &str, name: &str) -> Result<SubjectInfo, ApiError> {
        let body = serde_json::json!({ "name": name });
        self.post(&format!("/elections/{}/subjects", election), &body)
            .await
    }

    /// Register a voter
    pub async fn register_voter(
        &self,
        election: &str,
        caller: &Address,
        voter: &Address,
    ) -> Result<VoterInfo, ApiError> {
        let body = serde_json::json!({
            "caller": caller.to_hex(),
            "voter": voter.to_hex(),
        });
        self.post(&format!("/elections/{}/voters", election), &body)
            .await
    }

    /// Voter eligibility and record
    pub async fn voter(&self, election: &str, voter: &Address) -> Result<VoterInfo, ApiError> {
        self.get(&format!("/elections/{}/voters/{}", election, voter.to_hex()))
            .await
    }

    /// Subjects a voter has voted for
    pub async fn voted_subjects(&self, election: &str, voter: &Address) -> Result<Vec<u32>, ApiError> {
        self.get(&format!(
            "/elections/{}/voters/{}/voted",
            election,
            voter.to_hex()
        ))
        .await
    }

    /// Cast a vote
    pub async fn cast_vote(
        &self,
        election: &str,
        caller: &Address,
        subject: SubjectId,
        polarity: Polarity,
    ) -> Result<VoteReceipt, ApiError> {
        let body = VoteRequest {
            caller: caller.to_hex(),
            subject_id: subject.0,
            polarity,
        };
        self.post(&format!("/elections/{}/votes", election), &body)
            .await
    }

    /// Remaining voting time
    pub async fn remaining(&self, election: &str) -> Result<RemainingTime, ApiError> {
        self.get(&format!("/elections/{}/remaining", election)).await
    }

    /// Current tally
    pub async fn results(&self, election: &str) -> Result<Results, ApiError> {
        self.get(&format!("/elections/{}/results", election)).await
    }
}

/// API response wrapper
#[derive(Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, ApiError> {
        if self.success {
            self.data.ok_or(ApiError::EmptyResponse)
        } else {
            Err(ApiError::Server {
                code: self.code.unwrap_or_else(|| "error".to_string()),
                message: self.error.unwrap_or_default(),
            })
        }
    }
}

/// Node status
#[derive(Debug, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub elections: usize,
    pub open_elections: usize,
    pub votes_cast: u64,
}

/// Election summary
#[derive(Debug, Deserialize)]
pub struct ElectionInfo {
    pub id: String,
    pub administrator: String,
    pub created_at: String,
    pub deadline: String,
    pub remaining_secs: u64,
    pub closed: bool,
    pub subject_count: usize,
    pub voter_count: usize,
    pub version: u64,
}

/// Subject details
#[derive(Debug, Deserialize)]
pub struct SubjectInfo {
    pub id: u32,
    pub name: String,
    pub score: i64,
}

/// Voter details
#[derive(Debug, Deserialize)]
pub struct VoterInfo {
    pub address: String,
    pub eligible: bool,
    pub stage: Option<BallotStage>,
}

#[derive(Serialize)]
struct VoteRequest {
    caller: String,
    subject_id: u32,
    polarity: Polarity,
}

/// Accepted vote
#[derive(Debug, Deserialize)]
pub struct VoteReceipt {
    pub subject_id: u32,
    pub slot: BallotSlot,
}

/// Remaining voting time
#[derive(Debug, Deserialize)]
pub struct RemainingTime {
    pub remaining_secs: u64,
    pub remaining_ms: u64,
    pub deadline: String,
}

/// Tally
#[derive(Debug, Deserialize)]
pub struct Results {
    pub election_id: String,
    pub provisional: bool,
    pub results: Vec<SubjectStanding>,
}

/// API Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error ({code}): {message}")]
    Server { code: String, message: String },

    #[error("Empty response")]
    EmptyResponse,
}

/// Parse a hex address given on the command line
pub fn parse_address(raw: &str) -> anyhow::Result<Address> {
    Address::from_hex(raw).map_err(|e| anyhow::anyhow!("invalid address '{}': {}", raw, e))
}

/// Format a duration as days, hours, minutes and seconds
pub fn format_remaining(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{}d {:02}h {:02}m {:02}s", days, hours, minutes, seconds)
    } else {
        format!("{:02}h {:02}m {:02}s", hours, minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope() {
        let resp: ApiResponse<u32> = serde_json::from_str(
            r#"{"success":false,"data":null,"error":"Voter has already used every vote","code":"vote_budget_exhausted"}"#,
        )
        .unwrap();

        match resp.into_result() {
            Err(ApiError::Server { code, .. }) => assert_eq!(code, "vote_budget_exhausted"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_success_envelope() {
        let resp: ApiResponse<VoteReceipt> = serde_json::from_str(
            r#"{"success":true,"data":{"subject_id":3,"slot":"second_positive"},"error":null}"#,
        )
        .unwrap();
        let receipt = resp.into_result().unwrap();
        assert_eq!(receipt.subject_id, 3);
        assert_eq!(receipt.slot, BallotSlot::SecondPositive);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "00h 00m 00s");
        assert_eq!(format_remaining(3_661), "01h 01m 01s");
        assert_eq!(format_remaining(604_800), "7d 00h 00m 00s");
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = ApiClient::new("http://127.0.0.1:8021/").unwrap();
        assert_eq!(client.url("/status"), "http://127.0.0.1:8021/status");
    }
}
