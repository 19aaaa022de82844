use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::ScoreSubmission;

const STORE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    Rejected(String),
    Storage(String),
    Unavailable(String),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Rejected(msg) => write!(f, "score rejected: {msg}"),
            SubmitError::Storage(msg) => write!(f, "score storage failed: {msg}"),
            SubmitError::Unavailable(msg) => write!(f, "score service unavailable: {msg}"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Receives final scores at game over. A failure is reported once and never
/// retried by the session.
pub trait ScoreSubmitter {
    fn submit(&mut self, submission: &ScoreSubmission) -> Result<(), SubmitError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredScoreEntry {
    name: String,
    #[serde(rename = "gamesPlayed")]
    games_played: u64,
    #[serde(rename = "bestScore")]
    best_score: u32,
    #[serde(rename = "bestLevel")]
    best_level: u32,
    #[serde(rename = "totalScore")]
    total_score: u64,
    #[serde(rename = "updatedAtMs")]
    updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ScoreBoardFile {
    version: u8,
    players: HashMap<String, StoredScoreEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct ScoreBoardFileRaw {
    version: u8,
    players: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScoreBoardEntry {
    pub name: String,
    #[serde(rename = "gamesPlayed")]
    pub games_played: u64,
    #[serde(rename = "bestScore")]
    pub best_score: u32,
    #[serde(rename = "bestLevel")]
    pub best_level: u32,
    #[serde(rename = "avgScore")]
    pub avg_score: f64,
    #[serde(rename = "updatedAtMs")]
    pub updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScoreBoardResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub entries: Vec<ScoreBoardEntry>,
}

/// Best scores per player name, persisted as versioned JSON.
pub struct ScoreBoard {
    file_path: PathBuf,
    players: HashMap<String, StoredScoreEntry>,
}

impl ScoreBoard {
    pub fn new(file_path: PathBuf) -> Self {
        let players = load_players(&file_path);
        Self { file_path, players }
    }

    pub fn record(&mut self, submission: &ScoreSubmission) -> Result<(), SubmitError> {
        let key = board_key(&submission.identity);
        if key.is_empty() {
            return Err(SubmitError::Rejected("empty player name".to_string()));
        }
        let now_ms = now_ms();
        let current = self
            .players
            .entry(key)
            .or_insert_with(|| StoredScoreEntry {
                name: submission.identity.trim().to_string(),
                games_played: 0,
                best_score: 0,
                best_level: 0,
                total_score: 0,
                updated_at_ms: now_ms,
            });
        current.name = submission.identity.trim().to_string();
        current.games_played += 1;
        current.best_score = current.best_score.max(submission.final_score);
        current.best_level = current.best_level.max(submission.final_level);
        current.total_score += submission.final_score as u64;
        current.updated_at_ms = now_ms;

        self.save()
    }

    pub fn build_response(&self, requested_limit: Option<usize>) -> ScoreBoardResponse {
        ScoreBoardResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            entries: self.get_top(requested_limit),
        }
    }

    fn get_top(&self, requested_limit: Option<usize>) -> Vec<ScoreBoardEntry> {
        let limit = requested_limit.unwrap_or(10).clamp(1, 100);
        let mut entries: Vec<ScoreBoardEntry> = self
            .players
            .values()
            .map(|entry| ScoreBoardEntry {
                name: entry.name.clone(),
                games_played: entry.games_played,
                best_score: entry.best_score,
                best_level: entry.best_level,
                avg_score: entry.total_score as f64 / entry.games_played.max(1) as f64,
                updated_at_ms: entry.updated_at_ms,
            })
            .collect();

        entries.sort_by(|a, b| {
            b.best_score
                .cmp(&a.best_score)
                .then_with(|| b.best_level.cmp(&a.best_level))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        entries.truncate(limit);
        entries
    }

    fn save(&self) -> Result<(), SubmitError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                SubmitError::Storage(format!("create {}: {error}", parent.display()))
            })?;
        }
        let payload = ScoreBoardFile {
            version: STORE_VERSION,
            players: self.players.clone(),
        };
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|error| SubmitError::Storage(format!("serialize: {error}")))?;
        fs::write(&self.file_path, text).map_err(|error| {
            SubmitError::Storage(format!("write {}: {error}", self.file_path.display()))
        })
    }
}

impl ScoreSubmitter for ScoreBoard {
    fn submit(&mut self, submission: &ScoreSubmission) -> Result<(), SubmitError> {
        self.record(submission)
    }
}

/// Score board handle shared between connections.
#[derive(Clone)]
pub struct SharedScoreBoard {
    inner: Arc<Mutex<ScoreBoard>>,
}

impl SharedScoreBoard {
    pub fn new(board: ScoreBoard) -> Self {
        Self {
            inner: Arc::new(Mutex::new(board)),
        }
    }

    pub fn build_response(&self, requested_limit: Option<usize>) -> Option<ScoreBoardResponse> {
        let board = self.inner.lock().ok()?;
        Some(board.build_response(requested_limit))
    }
}

impl ScoreSubmitter for SharedScoreBoard {
    fn submit(&mut self, submission: &ScoreSubmission) -> Result<(), SubmitError> {
        let mut board = self
            .inner
            .lock()
            .map_err(|_| SubmitError::Unavailable("score board lock poisoned".to_string()))?;
        board.record(submission)
    }
}

fn load_players(path: &Path) -> HashMap<String, StoredScoreEntry> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read score board");
            }
            return HashMap::new();
        }
    };
    let parsed = match serde_json::from_str::<ScoreBoardFileRaw>(&text) {
        Ok(value) if value.version == STORE_VERSION => value,
        Ok(value) => {
            warn!(path = %path.display(), version = value.version, "unsupported score board version");
            return HashMap::new();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse score board");
            return HashMap::new();
        }
    };

    let mut sanitized = HashMap::<String, StoredScoreEntry>::new();
    for (player_key, raw_value) in parsed.players {
        let value: StoredScoreEntry = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(player = %player_key, %error, "skipping malformed score entry");
                continue;
            }
        };
        let name = value.name.trim().to_string();
        let key = board_key(&name);
        if key.is_empty() {
            continue;
        }

        match sanitized.get_mut(&key) {
            Some(current) => {
                current.games_played += value.games_played;
                current.best_score = current.best_score.max(value.best_score);
                current.best_level = current.best_level.max(value.best_level);
                current.total_score += value.total_score;
                current.updated_at_ms = current.updated_at_ms.max(value.updated_at_ms);
            }
            None => {
                sanitized.insert(key, StoredScoreEntry { name, ..value });
            }
        }
    }
    sanitized
}

fn board_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
