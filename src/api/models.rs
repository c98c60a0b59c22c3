//! Request and response bodies
//!
//! Field names are the wire contract with the client.

use crate::games::{payout::PayoutStep, RoundRecord, RoundSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// POST /api/mines/rounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRoundRequest {
    pub bet: u64,
    pub mines: usize,
}

/// POST /api/mines/rounds/:round_id/reveal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealRequest {
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsQuery {
    pub bet: u64,
    pub mines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsResponse {
    pub bet: u64,
    pub mines: usize,
    pub steps: Vec<PayoutStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRoundsResponse {
    pub rounds: Vec<RoundSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub rounds: Vec<RoundRecord>,
}
