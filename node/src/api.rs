//! HTTP API for the D21 node

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use d21_core::{Address, ApiConfig, D21Error, ElectionId, SubjectId};
use d21_election::{BallotSlot, BallotStage, Election, Polarity, SubjectStanding, VoterRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::runtime::NodeRuntime;

/// API state containing node runtime
pub type ApiState = Arc<NodeRuntime>;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Machine-readable error kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            code: None,
        }
    }

    fn from_error(error: &D21Error) -> Self {
        Self {
            code: Some(error.code().to_string()),
            ..Self::err(error)
        }
    }
}

type ApiReply<T> = (StatusCode, Json<ApiResponse<T>>);

fn reply<T: Serialize>(status: StatusCode, data: T) -> ApiReply<T> {
    (status, Json(ApiResponse::ok(data)))
}

fn bad_request<T: Serialize>(message: &str) -> ApiReply<T> {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse {
            code: Some("invalid_argument".to_string()),
            ..ApiResponse::err(message)
        }),
    )
}

fn failure<T: Serialize>(error: D21Error) -> ApiReply<T> {
    (status_for(&error), Json(ApiResponse::from_error(&error)))
}

/// HTTP status for an error
pub fn status_for(error: &D21Error) -> StatusCode {
    match error {
        D21Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        D21Error::Unauthorized(_) => StatusCode::FORBIDDEN,
        D21Error::UnknownSubject(_) | D21Error::ElectionNotFound(_) => StatusCode::NOT_FOUND,
        D21Error::AlreadyRegistered(_)
        | D21Error::VotingClosed
        | D21Error::AlreadyVotedForSubject(_)
        | D21Error::VoteBudgetExhausted
        | D21Error::NegativeBeforePositive => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Node status response
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStatusResponse {
    pub name: String,
    pub elections: usize,
    pub open_elections: usize,
    pub votes_cast: u64,
}

/// Election summary
#[derive(Debug, Serialize, Deserialize)]
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

impl From<&Election> for ElectionInfo {
    fn from(election: &Election) -> Self {
        Self {
            id: election.id().to_string(),
            administrator: election.administrator().to_hex(),
            created_at: election.created_at().to_rfc3339(),
            deadline: election.deadline().to_rfc3339(),
            remaining_secs: election.get_remaining_time().as_secs(),
            closed: election.is_closed(),
            subject_count: election.subject_count(),
            voter_count: election.voter_count(),
            version: election.version().0,
        }
    }
}

/// Create election request
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateElectionRequest {
    pub administrator: String,
    #[serde(default)]
    pub voting_duration_secs: Option<u64>,
}

/// Register subject request
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterSubjectRequest {
    pub name: String,
    /// Registration is open to anyone; the caller is only logged
    #[serde(default)]
    pub caller: Option<String>,
}

/// Registered subject
#[derive(Debug, Serialize, Deserialize)]
pub struct SubjectResponse {
    pub id: u32,
    pub name: String,
    pub score: i64,
}

/// Register voter request
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterVoterRequest {
    pub caller: String,
    pub voter: String,
}

/// Voter lookup response
#[derive(Debug, Serialize, Deserialize)]
pub struct VoterResponse {
    pub address: String,
    pub eligible: bool,
    pub stage: Option<BallotStage>,
    pub record: Option<VoterRecord>,
}

/// Cast vote request
#[derive(Debug, Serialize, Deserialize)]
pub struct CastVoteRequest {
    pub caller: String,
    pub subject_id: u32,
    pub polarity: Polarity,
}

/// Accepted vote
#[derive(Debug, Serialize, Deserialize)]
pub struct VoteResponse {
    pub subject_id: u32,
    pub slot: BallotSlot,
}

/// Remaining voting time
#[derive(Debug, Serialize, Deserialize)]
pub struct RemainingTimeResponse {
    pub remaining_secs: u64,
    pub remaining_ms: u64,
    pub deadline: String,
}

/// Tally
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub election_id: String,
    /// The voting window is still open and scores may change
    pub provisional: bool,
    pub results: Vec<SubjectStanding>,
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    let cors_enabled = state.config().api.enable_cors;
    let cors = cors_layer(&state.config().api);

    let router = Router::new()
        // Health
        .route("/health", get(health))
        .route("/status", get(status))
        // Elections
        .route("/elections", get(list_elections).post(create_election))
        .route("/elections/:id", get(get_election))
        .route("/elections/:id/remaining", get(get_remaining_time))
        .route("/elections/:id/results", get(get_results))
        // Subjects
        .route(
            "/elections/:id/subjects",
            get(list_subjects).post(register_subject),
        )
        .route("/elections/:id/subjects/:subject", get(get_subject))
        // Voters
        .route("/elections/:id/voters", axum::routing::post(register_voter))
        .route("/elections/:id/voters/:address", get(get_voter))
        .route("/elections/:id/voters/:address/voted", get(get_voted_subjects))
        // Votes
        .route("/elections/:id/votes", axum::routing::post(cast_vote))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(cors)
    } else {
        router
    }
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.cors_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<axum::http::HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    layer.allow_origin(origins)
}

fn parse_election_id(raw: &str) -> Result<ElectionId, &'static str> {
    ElectionId::parse(raw).map_err(|_| "Invalid election ID")
}

fn parse_address(raw: &str) -> Result<Address, &'static str> {
    Address::from_hex(raw).map_err(|_| "Invalid address")
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Node status
async fn status(State(runtime): State<ApiState>) -> impl IntoResponse {
    let stats = runtime.stats();
    let status = NodeStatusResponse {
        name: runtime.config().name.clone(),
        elections: stats.elections,
        open_elections: stats.open_elections,
        votes_cast: stats.votes_cast,
    };

    Json(ApiResponse::ok(status))
}

/// List elections
async fn list_elections(State(runtime): State<ApiState>) -> impl IntoResponse {
    let elections: Vec<ElectionInfo> = runtime
        .election_ids()
        .into_iter()
        .filter_map(|id| runtime.election(id).ok())
        .map(|e| ElectionInfo::from(&*e))
        .collect();

    Json(ApiResponse::ok(elections))
}

/// Create an election
async fn create_election(
    State(runtime): State<ApiState>,
    Json(req): Json<CreateElectionRequest>,
) -> impl IntoResponse {
    let administrator = match parse_address(&req.administrator) {
        Ok(a) => a,
        Err(e) => return bad_request::<ElectionInfo>(e),
    };

    match runtime
        .create_election(administrator, req.voting_duration_secs)
        .await
    {
        Ok(election) => reply(StatusCode::CREATED, ElectionInfo::from(&*election)),
        Err(e) => failure(e),
    }
}

/// Election details
async fn get_election(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_election_id(&id) {
        Ok(id) => id,
        Err(e) => return bad_request::<ElectionInfo>(e),
    };

    match runtime.election(id) {
        Ok(election) => reply(StatusCode::OK, ElectionInfo::from(&*election)),
        Err(e) => failure(e),
    }
}

/// Remaining voting time
async fn get_remaining_time(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_election_id(&id) {
        Ok(id) => id,
        Err(e) => return bad_request::<RemainingTimeResponse>(e),
    };

    match runtime.election(id) {
        Ok(election) => {
            let remaining = election.get_remaining_time();
            let response = RemainingTimeResponse {
                remaining_secs: remaining.as_secs(),
                remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                deadline: election.deadline().to_rfc3339(),
            };
            reply(StatusCode::OK, response)
        }
        Err(e) => failure(e),
    }
}

/// Tally, provisional while the window is open
async fn get_results(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_election_id(&id) {
        Ok(id) => id,
        Err(e) => return bad_request::<ResultsResponse>(e),
    };

    match runtime.election(id) {
        Ok(election) => {
            let response = ResultsResponse {
                election_id: id.to_string(),
                provisional: !election.is_closed(),
                results: election.get_results(),
            };
            reply(StatusCode::OK, response)
        }
        Err(e) => failure(e),
    }
}

/// Subject ids in registration order
async fn list_subjects(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_election_id(&id) {
        Ok(id) => id,
        Err(e) => return bad_request::<Vec<u32>>(e),
    };

    match runtime.election(id) {
        Ok(election) => {
            let ids: Vec<u32> = election.subjects().iter().map(|s| s.0).collect();
            reply(StatusCode::OK, ids)
        }
        Err(e) => failure(e),
    }
}

/// Register a subject
async fn register_subject(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<RegisterSubjectRequest>,
) -> impl IntoResponse {
    let id = match parse_election_id(&id) {
        Ok(id) => id,
        Err(e) => return bad_request::<SubjectResponse>(e),
    };
    if let Some(caller) = &req.caller {
        debug!("Subject '{}' proposed by {} in {}", req.name, caller, id);
    }

    match runtime.register_subject(id, &req.name).await {
        Ok(subject_id) => {
            let response = SubjectResponse {
                id: subject_id.0,
                name: req.name,
                score: 0,
            };
            reply(StatusCode::CREATED, response)
        }
        Err(e) => failure(e),
    }
}

/// Subject lookup
async fn get_subject(
    State(runtime): State<ApiState>,
    Path((id, subject)): Path<(String, u32)>,
) -> impl IntoResponse {
    let id = match parse_election_id(&id) {
        Ok(id) => id,
        Err(e) => return bad_request::<SubjectResponse>(e),
    };
    let subject_id = SubjectId::new(subject);

    let found = runtime
        .election(id)
        .and_then(|e| e.subject(subject_id).ok_or(D21Error::UnknownSubject(subject_id)));

    match found {
        Ok(subject) => {
            let response = SubjectResponse {
                id: subject.id.0,
                name: subject.name,
                score: subject.score,
            };
            reply(StatusCode::OK, response)
        }
        Err(e) => failure(e),
    }
}

/// Register a voter
async fn register_voter(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<RegisterVoterRequest>,
) -> impl IntoResponse {
    let parsed = parse_election_id(&id).and_then(|id| {
        Ok((id, parse_address(&req.caller)?, parse_address(&req.voter)?))
    });
    let (id, caller, voter) = match parsed {
        Ok(p) => p,
        Err(e) => return bad_request::<VoterResponse>(e),
    };

    match runtime.register_voter(id, caller, voter).await {
        Ok(()) => {
            let response = VoterResponse {
                address: voter.to_hex(),
                eligible: true,
                stage: Some(BallotStage::NoVotes),
                record: Some(VoterRecord::new()),
            };
            reply(StatusCode::CREATED, response)
        }
        Err(e) => failure(e),
    }
}

/// Voter eligibility and record
async fn get_voter(
    State(runtime): State<ApiState>,
    Path((id, address)): Path<(String, String)>,
) -> impl IntoResponse {
    let parsed = parse_election_id(&id).and_then(|id| Ok((id, parse_address(&address)?)));
    let (id, voter) = match parsed {
        Ok(p) => p,
        Err(e) => return bad_request::<VoterResponse>(e),
    };

    match runtime.election(id) {
        Ok(election) => {
            let record = election.voter(&voter);
            let response = VoterResponse {
                address: voter.to_hex(),
                eligible: election.can_vote(&voter),
                stage: record.as_ref().map(|r| r.stage()),
                record,
            };
            reply(StatusCode::OK, response)
        }
        Err(e) => failure(e),
    }
}

/// Subjects a voter has voted for, in order
async fn get_voted_subjects(
    State(runtime): State<ApiState>,
    Path((id, address)): Path<(String, String)>,
) -> impl IntoResponse {
    let parsed = parse_election_id(&id).and_then(|id| Ok((id, parse_address(&address)?)));
    let (id, voter) = match parsed {
        Ok(p) => p,
        Err(e) => return bad_request::<Vec<u32>>(e),
    };

    match runtime.election(id) {
        Ok(election) => {
            let voted: Vec<u32> = election
                .get_voted_subjects(&voter)
                .iter()
                .map(|s| s.0)
                .collect();
            reply(StatusCode::OK, voted)
        }
        Err(e) => failure(e),
    }
}

/// Cast a vote
async fn cast_vote(
    State(runtime): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CastVoteRequest>,
) -> impl IntoResponse {
    let parsed = parse_election_id(&id).and_then(|id| Ok((id, parse_address(&req.caller)?)));
    let (id, caller) = match parsed {
        Ok(p) => p,
        Err(e) => return bad_request::<VoteResponse>(e),
    };
    let subject = SubjectId::new(req.subject_id);

    match runtime.cast_vote(id, caller, subject, req.polarity).await {
        Ok(slot) => {
            let response = VoteResponse {
                subject_id: subject.0,
                slot,
            };
            reply(StatusCode::OK, response)
        }
        Err(e) => failure(e),
    }
}

/// Start API server
pub async fn start_api_server(runtime: Arc<NodeRuntime>, listen_addr: &str) -> anyhow::Result<()> {
    let router = create_router(runtime);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("API server listening on {}", listen_addr);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use d21_core::{ManualClock, NodeConfig, Timestamp};
    use d21_store::MemorySnapshotStore;
    use serde::de::DeserializeOwned;
    use std::time::Duration;
    use tower::ServiceExt;

    const ADMIN: &str = "adadadadadadadadadadadadadadadadadadadadadadadadadadadadadadadad";
    const VOTER: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    fn test_state() -> (Arc<ManualClock>, ApiState) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(10_000)));
        let runtime = NodeRuntime::new(
            NodeConfig::default(),
            clock.clone(),
            Arc::new(MemorySnapshotStore::new()),
        );
        (clock, Arc::new(runtime))
    }

    async fn call<T: DeserializeOwned>(
        state: &ApiState,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, ApiResponse<T>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(json) => request.body(Body::from(json.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn create(state: &ApiState) -> String {
        let (status, resp): (_, ApiResponse<ElectionInfo>) = call(
            state,
            Method::POST,
            "/elections",
            Some(serde_json::json!({"administrator": ADMIN, "voting_duration_secs": 3600})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        resp.data.unwrap().id
    }

    #[tokio::test]
    async fn test_full_voting_flow() {
        let (clock, state) = test_state();
        let id = create(&state).await;

        for name in ["Party A", "Party B", "Party C", "Party D"] {
            let (status, _): (_, ApiResponse<SubjectResponse>) = call(
                &state,
                Method::POST,
                &format!("/elections/{}/subjects", id),
                Some(serde_json::json!({ "name": name })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, _): (_, ApiResponse<VoterResponse>) = call(
            &state,
            Method::POST,
            &format!("/elections/{}/voters", id),
            Some(serde_json::json!({"caller": ADMIN, "voter": VOTER})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let votes = [(2, "positive"), (0, "positive"), (1, "negative"), (3, "negative")];
        let mut slots = Vec::new();
        for (subject, polarity) in votes {
            let (status, resp): (_, ApiResponse<VoteResponse>) = call(
                &state,
                Method::POST,
                &format!("/elections/{}/votes", id),
                Some(serde_json::json!({
                    "caller": VOTER, "subject_id": subject, "polarity": polarity
                })),
            )
            .await;
            slots.push((status, resp.data.map(|v| v.slot), resp.code));
        }
        assert_eq!(slots[0].1, Some(BallotSlot::FirstPositive));
        assert_eq!(slots[1].1, Some(BallotSlot::SecondPositive));
        assert_eq!(slots[2].1, Some(BallotSlot::Negative));
        assert_eq!(slots[3].0, StatusCode::CONFLICT);
        assert_eq!(slots[3].2.as_deref(), Some("vote_budget_exhausted"));

        let (_, voted): (_, ApiResponse<Vec<u32>>) = call(
            &state,
            Method::GET,
            &format!("/elections/{}/voters/{}/voted", id, VOTER),
            None,
        )
        .await;
        assert_eq!(voted.data.unwrap(), vec![2, 0, 1]);

        let (_, results): (_, ApiResponse<ResultsResponse>) =
            call(&state, Method::GET, &format!("/elections/{}/results", id), None).await;
        let results = results.data.unwrap();
        assert!(results.provisional);
        assert_eq!(results.results[0].name, "Party A");
        assert_eq!(results.results[1].name, "Party C");
        assert_eq!(results.results[2].name, "Party D");
        assert_eq!(results.results[3].name, "Party B");
        assert_eq!(results.results[3].score, -1);

        clock.advance(Duration::from_secs(3600));
        let (_, results): (_, ApiResponse<ResultsResponse>) =
            call(&state, Method::GET, &format!("/elections/{}/results", id), None).await;
        assert!(!results.data.unwrap().provisional);

        let (_, remaining): (_, ApiResponse<RemainingTimeResponse>) =
            call(&state, Method::GET, &format!("/elections/{}/remaining", id), None).await;
        assert_eq!(remaining.data.unwrap().remaining_secs, 0);
    }

    #[tokio::test]
    async fn test_non_admin_voter_registration_forbidden() {
        let (_, state) = test_state();
        let id = create(&state).await;

        let (status, resp): (_, ApiResponse<VoterResponse>) = call(
            &state,
            Method::POST,
            &format!("/elections/{}/voters", id),
            Some(serde_json::json!({"caller": VOTER, "voter": VOTER})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(resp.code.as_deref(), Some("unauthorized"));

        let (_, voter): (_, ApiResponse<VoterResponse>) = call(
            &state,
            Method::GET,
            &format!("/elections/{}/voters/{}", id, VOTER),
            None,
        )
        .await;
        assert!(!voter.data.unwrap().eligible);
    }

    #[tokio::test]
    async fn test_empty_subject_name_rejected() {
        let (_, state) = test_state();
        let id = create(&state).await;

        let (status, resp): (_, ApiResponse<SubjectResponse>) = call(
            &state,
            Method::POST,
            &format!("/elections/{}/subjects", id),
            Some(serde_json::json!({ "name": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!resp.success);
    }

    #[tokio::test]
    async fn test_unknown_election_and_subject() {
        let (_, state) = test_state();
        let (status, _): (_, ApiResponse<ElectionInfo>) = call(
            &state,
            Method::GET,
            &format!("/elections/{}", ElectionId::generate()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _): (_, ApiResponse<ElectionInfo>) =
            call(&state, Method::GET, "/elections/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let id = create(&state).await;
        let (status, resp): (_, ApiResponse<SubjectResponse>) = call(
            &state,
            Method::GET,
            &format!("/elections/{}/subjects/7", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(resp.code.as_deref(), Some("unknown_subject"));
    }

    #[tokio::test]
    async fn test_status_counts_elections() {
        let (_, state) = test_state();
        create(&state).await;

        let (status, resp): (_, ApiResponse<NodeStatusResponse>) =
            call(&state, Method::GET, "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        let data = resp.data.unwrap();
        assert_eq!(data.elections, 1);
        assert_eq!(data.open_elections, 1);
    }
}
