use clap::Parser;
use packman_arcade::config::SessionConfig;
use packman_arcade::session::Session;
use packman_arcade::targeting::{candidates, legal_directions, pick_toward};
use packman_arcade::types::{Direction, GameEvent, GridCell, SessionPhase, Snapshot, SpeedTier};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value_t = 2)]
    runs: u32,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 20 * 60 * 5)]
    ticks: u64,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    seed: u32,
    ticks: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum RunOutcome {
    GameOver,
    TickLimit,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    outcome: RunOutcome,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "finalScore")]
    final_score: u32,
    #[serde(rename = "finalLevel")]
    final_level: u32,
    #[serde(rename = "pelletsEaten")]
    pellets_eaten: u32,
    #[serde(rename = "powerUpsEaten")]
    power_ups_eaten: u32,
    #[serde(rename = "ghostsCaptured")]
    ghosts_captured: u32,
    deaths: u32,
    #[serde(rename = "levelUps")]
    level_ups: u32,
    #[serde(rename = "modeChanges")]
    mode_changes: u32,
    #[serde(rename = "maxGhosts")]
    max_ghosts: usize,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageScore")]
    average_score: u32,
    #[serde(rename = "outcomeCounts")]
    outcome_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

/// Per-run bookkeeping for the invariant checks that span ticks.
#[derive(Debug)]
struct Watch {
    last_score: u32,
    last_ghost_count: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let run_started_at_ms = now_ms();
    let scenarios = resolve_scenarios(&cli, run_started_at_ms);
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(seed_hint, run_started_at_ms));

    let base_config = match cli.config.as_deref() {
        Some(path) => match SessionConfig::from_json_file(path) {
            Ok(config) => config,
            Err(error) => {
                emit_log(
                    "error",
                    "config_load_failed",
                    &run_id,
                    None,
                    None,
                    None,
                    json!({
                        "path": path.to_string_lossy(),
                        "error": error.to_string(),
                    }),
                );
                std::process::exit(2);
            }
        },
        None => SessionConfig::default(),
    };

    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({ "ticks": scenario.ticks }),
        );
        let scenario_run = match run_scenario(&scenario, &base_config) {
            Ok(run) => run,
            Err(error) => {
                emit_log(
                    "error",
                    "session_create_failed",
                    &run_id,
                    Some(&scenario.name),
                    Some(scenario.seed),
                    None,
                    json!({ "error": error }),
                );
                std::process::exit(2);
            }
        };

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &run_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.tick),
                json!({
                    "message": anomaly.message,
                }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        *outcome_counts
            .entry(outcome_key(scenario_run.result.outcome))
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.finished_tick),
            json!({
                "outcome": scenario_run.result.outcome,
                "finalScore": scenario_run.result.final_score,
                "finalLevel": scenario_run.result.final_level,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(error) => eprintln!("failed to serialize scenario result: {error}"),
        }
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        run_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        outcome_counts,
        total_anomalies,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &run_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &run_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageScore": summary.average_score,
            "outcomeCounts": summary.outcome_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn run_scenario(scenario: &Scenario, base: &SessionConfig) -> Result<ScenarioRunResult, String> {
    let config = base.clone().with_seed(scenario.seed);
    let initial_ghosts = config.initial_ghost_count;
    let max_ghosts_allowed = config.max_ghost_count;
    let tick_ms = config.tick_ms;
    let mut session = Session::new(config).map_err(|error| error.to_string())?;

    let mut pellets_eaten = 0;
    let mut power_ups_eaten = 0;
    let mut ghosts_captured = 0;
    let mut deaths = 0;
    let mut level_ups = 0;
    let mut mode_changes = 0;
    let mut max_ghosts = session.ghosts().len();
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut watch = Watch {
        last_score: 0,
        last_ghost_count: session.ghosts().len(),
    };
    let mut outcome = RunOutcome::TickLimit;
    let mut last_tick = 0u64;

    for _ in 0..scenario.ticks {
        if session.phase() == SessionPhase::Playing {
            let dir = autopilot_direction(&session);
            session.set_input(dir);
        }
        session.step(tick_ms);
        let snapshot = session.build_snapshot(true);
        last_tick = snapshot.tick;

        let mut messages = collect_snapshot_anomalies(&snapshot, initial_ghosts, max_ghosts_allowed);
        messages.extend(collect_drift_anomalies(&session));
        messages.extend(watch.observe(&snapshot));
        for message in messages {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                message,
            );
        }
        max_ghosts = max_ghosts.max(snapshot.ghosts.len());

        for event in &snapshot.events {
            match event {
                GameEvent::PelletEaten { .. } => pellets_eaten += 1,
                GameEvent::PowerUpEaten => power_ups_eaten += 1,
                GameEvent::GhostCaptured { .. } => ghosts_captured += 1,
                GameEvent::PlayerDied { .. } => deaths += 1,
                GameEvent::LevelUp { .. } => level_ups += 1,
                GameEvent::ModeChanged { .. } => mode_changes += 1,
                _ => {}
            }
        }

        if snapshot.phase == SessionPhase::GameOver {
            outcome = RunOutcome::GameOver;
            break;
        }
    }

    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            outcome,
            duration_ms: session.now_ms(),
            final_score: session.score(),
            final_level: session.level(),
            pellets_eaten,
            power_ups_eaten,
            ghosts_captured,
            deaths,
            level_ups,
            mode_changes,
            max_ghosts,
            anomalies,
        },
        anomaly_records,
        finished_tick: last_tick,
    })
}

/// Heads for the closest remaining pickup, steering away from any
/// dangerous ghost within two tiles when another way is open.
fn autopilot_direction(session: &Session) -> Direction {
    let maze = session.maze();
    let player = session.player();
    let tile = maze.tile_size();
    let here = maze.cell_of(player.position);

    let target = remaining_pickup_cells(session)
        .into_iter()
        .min_by_key(|cell| (cell.col - here.col).abs() + (cell.row - here.row).abs())
        .map(|cell| maze.cell_center(cell))
        .unwrap_or_else(|| maze.player_spawn());

    let heading = match Direction::from_velocity(player.velocity) {
        Direction::None => player.facing,
        dir => dir,
    };
    let options = candidates(
        legal_directions(maze, player.position, player.speed),
        heading,
    );
    let safe: Vec<Direction> = options
        .iter()
        .copied()
        .filter(|dir| {
            let ahead = player.position + dir.unit().scale(tile);
            session
                .ghosts()
                .iter()
                .filter(|ghost| ghost.is_dangerous() && ghost.is_released())
                .all(|ghost| ghost.position.distance(ahead) > tile * 2.0)
        })
        .collect();
    let pool = if safe.is_empty() { &options } else { &safe };
    match pick_toward(pool, player.position, player.speed, target) {
        Direction::None => heading,
        dir => dir,
    }
}

fn remaining_pickup_cells(session: &Session) -> Vec<GridCell> {
    session
        .maze()
        .pickup_views()
        .into_iter()
        .map(|pickup| GridCell::new(pickup.col, pickup.row))
        .collect()
}

fn collect_snapshot_anomalies(
    snapshot: &Snapshot,
    initial_ghosts: usize,
    max_ghosts: usize,
) -> Vec<String> {
    let mut anomalies = Vec::new();
    let ghost_count = snapshot.ghosts.len();
    if ghost_count < initial_ghosts.min(max_ghosts) || ghost_count > max_ghosts {
        anomalies.push(format!(
            "ghost count out of range: {ghost_count} (initial {initial_ghosts}, max {max_ghosts})"
        ));
    }

    for ghost in &snapshot.ghosts {
        if ghost.scared && ghost.retreating {
            anomalies.push(format!("ghost {} is scared and retreating", ghost.id));
        }
        let expected_tier = if ghost.retreating {
            SpeedTier::Retreating
        } else if ghost.scared {
            SpeedTier::Scared
        } else {
            SpeedTier::Normal
        };
        if ghost.speed_tier != expected_tier {
            anomalies.push(format!(
                "ghost {} speed tier {:?} does not match flags",
                ghost.id, ghost.speed_tier
            ));
        }
        if ghost.chasing && (ghost.scared || ghost.retreating) {
            anomalies.push(format!("ghost {} chases while not dangerous", ghost.id));
        }
    }

    if snapshot.pickups.is_empty() && snapshot.phase == SessionPhase::Playing {
        anomalies.push("playing with no pickups left".to_string());
    }
    anomalies
}

fn collect_drift_anomalies(session: &Session) -> Vec<String> {
    session
        .ghosts()
        .iter()
        .filter(|ghost| ghost.speed != ghost.expected_speed())
        .map(|ghost| {
            format!(
                "ghost {} speed {} differs from expected {}",
                ghost.id().0,
                ghost.speed,
                ghost.expected_speed()
            )
        })
        .collect()
}

impl Watch {
    fn observe(&mut self, snapshot: &Snapshot) -> Vec<String> {
        let mut anomalies = Vec::new();
        if snapshot.score < self.last_score {
            anomalies.push(format!(
                "score decreased within a game: {} -> {}",
                self.last_score, snapshot.score
            ));
        }
        if snapshot.ghosts.len() < self.last_ghost_count {
            anomalies.push(format!(
                "ghost count decreased within a game: {} -> {}",
                self.last_ghost_count,
                snapshot.ghosts.len()
            ));
        }
        self.last_score = snapshot.score;
        self.last_ghost_count = snapshot.ghosts.len();
        anomalies
    }
}

fn resolve_scenarios(cli: &Cli, now: u64) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or(now));
    (0..cli.runs.max(1))
        .map(|index| Scenario {
            name: format!("autopilot-{}", index + 1),
            seed: seed.wrapping_add(index),
            ticks: cli.ticks.max(1),
        })
        .collect()
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_run_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    outcome_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let total_score: u64 = scenarios
        .iter()
        .map(|scenario| u64::from(scenario.final_score))
        .sum();
    let average_score = if scenario_count == 0 {
        0
    } else {
        (total_score / scenario_count as u64) as u32
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_score,
        outcome_counts,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    run_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    tick: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        run_id: run_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        tick,
        details,
    };
    if let Ok(line) = serde_json::to_string(&log_line) {
        eprintln!("{line}");
    }
}

fn outcome_key(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::GameOver => "game_over",
        RunOutcome::TickLimit => "tick_limit",
    }
    .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario_result(outcome: RunOutcome, final_score: u32) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            outcome,
            duration_ms: 60_000,
            final_score,
            final_level: 1,
            pellets_eaten: 0,
            power_ups_eaten: 0,
            ghosts_captured: 0,
            deaths: 0,
            level_ups: 0,
            mode_changes: 0,
            max_ghosts: 3,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn default_run_id_contains_seed_and_timestamp() {
        assert_eq!(default_run_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_score() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result(RunOutcome::GameOver, 1_000),
                make_scenario_result(RunOutcome::TickLimit, 3_000),
            ],
            BTreeMap::from([
                ("game_over".to_string(), 1usize),
                ("tick_limit".to_string(), 1usize),
            ]),
            1,
        );
        assert_eq!(summary.average_score, 2_000);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("missing").join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            1,
            2,
            vec![make_scenario_result(RunOutcome::TickLimit, 0)],
            BTreeMap::from([("tick_limit".to_string(), 1usize)]),
            0,
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(&mut anomalies, &mut records, &mut seen, 10, "same".to_string());
        push_anomaly(&mut anomalies, &mut records, &mut seen, 11, "same".to_string());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn scenarios_use_consecutive_seeds() {
        let cli = Cli::parse_from(["simulate", "--runs", "3", "--seed", "10"]);
        let scenarios = resolve_scenarios(&cli, 0);
        let seeds: Vec<u32> = scenarios.iter().map(|scenario| scenario.seed).collect();
        assert_eq!(seeds, vec![10, 11, 12]);
        assert!(scenarios.iter().all(|scenario| scenario.ticks == 6_000));
    }

    #[test]
    fn short_autopilot_run_is_clean() {
        let scenario = Scenario {
            name: "smoke".to_string(),
            seed: 7,
            ticks: 600,
        };
        let run = run_scenario(&scenario, &SessionConfig::default()).expect("run");
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
        assert!(run.result.pellets_eaten > 0);
    }

    #[test]
    fn watch_flags_score_drops() {
        let mut session = Session::new(SessionConfig::default()).expect("session");
        let mut snapshot = session.build_snapshot(false);
        let mut watch = Watch {
            last_score: 50,
            last_ghost_count: snapshot.ghosts.len(),
        };
        snapshot.score = 10;
        let anomalies = watch.observe(&snapshot);
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].contains("score decreased"));
    }
}
