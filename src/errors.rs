//! Error types for the Mines casino core
//!
//! Every failure surfaced by the engine, the ledger or the store falls into
//! one of a handful of kinds. None of them is retried by the core.

use thiserror::Error;

/// Root error type for all casino operations
#[derive(Debug, Error)]
pub enum CasinoError {
    /// Bad bet, mine count or cell index. Caller's responsibility.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Debit rejected because the balance does not cover it
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },

    /// Action attempted on a terminal or unknown round
    #[error("Invalid round state: {0}")]
    InvalidRoundState(#[from] RoundStateError),

    /// Missing or unknown credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Storage or ledger unavailable
    #[error("Internal fault: {0}")]
    Internal(#[from] InternalError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Rejected user input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("bet must be at least {min}, got {actual}")]
    BetTooSmall { min: u64, actual: u64 },
    #[error("bet must be at most {max}, got {actual}")]
    BetTooLarge { max: u64, actual: u64 },
    #[error("mine count must be between {min} and {max}, got {actual}")]
    MineCount { min: usize, max: usize, actual: usize },
    #[error("cell index must be below {size}, got {actual}")]
    CellIndex { size: usize, actual: usize },
    #[error("cell {0} is already revealed")]
    CellAlreadyRevealed(usize),
    #[error("revealed count {revealed} exceeds the {safe} safe cells")]
    RevealCount { revealed: usize, safe: usize },
    #[error("too many active rounds (limit {0})")]
    TooManyActiveRounds(usize),
    #[error("invalid mine layout: {0}")]
    MineLayout(String),
}

/// Round lifecycle violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundStateError {
    #[error("round {0} not found")]
    NotFound(String),
    #[error("round {0} is already finished")]
    AlreadyFinished(String),
    #[error("round {0} is not in play")]
    NotPlaying(String),
}

/// Faults of the collaborators the core depends on
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("corrupted data: {0}")]
    CorruptedData(String),
    #[error("account {0} is busy")]
    AccountBusy(String),
    #[error("arithmetic overflow: {0}")]
    Overflow(String),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl CasinoError {
    /// Stable label used by metrics and API error codes
    pub fn kind(&self) -> &'static str {
        match self {
            CasinoError::Validation(_) => "validation",
            CasinoError::InsufficientFunds { .. } => "insufficient_funds",
            CasinoError::InvalidRoundState(_) => "invalid_round_state",
            CasinoError::Unauthorized => "unauthorized",
            CasinoError::Internal(_) => "internal",
            CasinoError::Configuration(_) => "configuration",
        }
    }
}

// External error conversions
impl From<rocksdb::Error> for CasinoError {
    fn from(e: rocksdb::Error) -> Self {
        CasinoError::Internal(InternalError::WriteFailed(e.to_string()))
    }
}

impl From<std::io::Error> for CasinoError {
    fn from(e: std::io::Error) -> Self {
        CasinoError::Internal(InternalError::ReadFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for CasinoError {
    fn from(e: serde_json::Error) -> Self {
        CasinoError::Internal(InternalError::CorruptedData(e.to_string()))
    }
}

// Convenience type alias for Results
pub type CasinoResult<T> = Result<T, CasinoError>;
