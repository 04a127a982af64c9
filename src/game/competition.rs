//! Timed eight-participant competition: participant ledger, first-kill times
//! and winner resolution

use std::collections::HashMap;

use serde::Serialize;

use crate::util::time::Countdown;

use super::entity::{Tank, TankId};

/// Participants per match: one human and seven bots
pub const COMPETITION_SIZE: usize = 8;
/// Bots spawned at the start of a match
pub const COMPETITION_BOTS: usize = COMPETITION_SIZE - 1;
/// Health given to every participant regardless of class
pub const COMPETITION_HEALTH: f32 = 400.0;
/// Default match length
pub const DEFAULT_COMPETITION_SECS: u64 = 180;
/// Player regeneration in competition mode (health per second)
pub const COMPETITION_REGEN_PER_SEC: f32 = 10.0;

/// Winner of a finished match
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub id: TankId,
    pub name: String,
    pub kills: u32,
}

/// Outcome of winner resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionResult {
    pub winner: Option<Winner>,
    pub highest_kills: u32,
    pub time_up: bool,
}

/// Pick the winner.
///
/// Highest kill count wins; ties go to whoever reached their first kill
/// earliest. A lone survivor wins outright only when their kills are at
/// least the highest kill count among all participants.
pub fn resolve_winner(
    participants: &HashMap<TankId, Tank>,
    first_kill_times: &HashMap<TankId, u64>,
    lone_survivor: Option<&Tank>,
    time_up: bool,
) -> CompetitionResult {
    let mut ordered: Vec<&Tank> = participants.values().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut highest_kills = 0;
    let mut leader: Option<&Tank> = None;
    let mut leader_time = u64::MAX;

    for participant in ordered {
        let kill_time = first_kill_times.get(&participant.id).copied().unwrap_or(u64::MAX);
        if participant.kills > highest_kills {
            highest_kills = participant.kills;
            leader = Some(participant);
            leader_time = kill_time;
        } else if participant.kills == highest_kills && highest_kills > 0 && kill_time < leader_time {
            leader = Some(participant);
            leader_time = kill_time;
        }
    }

    if let Some(survivor) = lone_survivor {
        if survivor.kills >= highest_kills {
            leader = Some(survivor);
        }
    }

    CompetitionResult {
        winner: leader.map(|tank| Winner {
            id: tank.id.clone(),
            name: tank.name.clone(),
            kills: tank.kills,
        }),
        highest_kills,
        time_up,
    }
}

/// Per-session competition bookkeeping
#[derive(Debug, Clone)]
pub struct Competition {
    duration_ms: u64,
    started_at: u64,
    first_kill_times: HashMap<TankId, u64>,
    participants: HashMap<TankId, Tank>,
    bots_spawned: bool,
    countdown: Countdown,
    time_up_signalled: bool,
}

impl Competition {
    pub fn new(duration_secs: u64) -> Self {
        Self {
            duration_ms: duration_secs.saturating_mul(1000),
            started_at: 0,
            first_kill_times: HashMap::new(),
            participants: HashMap::new(),
            bots_spawned: false,
            countdown: Countdown::default(),
            time_up_signalled: false,
        }
    }

    /// Start (or restart) the match clock
    pub fn begin(&mut self, now: u64) {
        self.started_at = now;
        self.first_kill_times.clear();
        self.time_up_signalled = false;
        self.countdown.start(now, self.duration_ms);
    }

    /// Drop all state; used by `stop()`
    pub fn reset(&mut self) {
        self.started_at = 0;
        self.first_kill_times.clear();
        self.participants.clear();
        self.bots_spawned = false;
        self.countdown.cancel();
        self.time_up_signalled = false;
    }

    pub fn bots_spawned(&self) -> bool {
        self.bots_spawned
    }

    pub fn mark_bots_spawned(&mut self) {
        self.bots_spawned = true;
    }

    /// Record the first kill of `shooter`. Later kills never move it.
    pub fn record_kill(&mut self, shooter: &TankId, now: u64) {
        let elapsed = now.saturating_sub(self.started_at);
        self.first_kill_times.entry(shooter.clone()).or_insert(elapsed);
    }

    pub fn first_kill_times(&self) -> &HashMap<TankId, u64> {
        &self.first_kill_times
    }

    /// Add or overwrite a participant snapshot
    pub fn snapshot(&mut self, tank: &Tank) {
        self.participants.insert(tank.id.clone(), tank.clone());
    }

    /// Refresh snapshots of participants that are still alive in `live`.
    /// Eliminated participants keep their frozen final stats.
    pub fn refresh(&mut self, live: &HashMap<TankId, Tank>) {
        for (id, snapshot) in self.participants.iter_mut() {
            if let Some(tank) = live.get(id) {
                *snapshot = tank.clone();
            }
        }
    }

    pub fn participants(&self) -> &HashMap<TankId, Tank> {
        &self.participants
    }

    pub fn is_participant(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    /// External timer callback
    pub fn signal_time_up(&mut self) {
        self.time_up_signalled = true;
    }

    /// Time is up either by signal or by the internal countdown
    pub fn time_up(&self, now: u64) -> bool {
        self.time_up_signalled || self.countdown.expired(now)
    }

    /// Remaining match time in ms; `None` before the match starts
    pub fn remaining_ms(&self, now: u64) -> Option<u64> {
        self.countdown.remaining(now)
    }

    /// Re-arm the countdown for a fresh `duration_secs`
    pub fn reset_countdown(&mut self, now: u64, duration_secs: u64) {
        self.duration_ms = duration_secs.saturating_mul(1000);
        self.time_up_signalled = false;
        self.countdown.start(now, self.duration_ms);
    }

    pub fn cancel_countdown(&mut self) {
        self.countdown.cancel();
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn resolve(&self, lone_survivor: Option<&Tank>, time_up: bool) -> CompetitionResult {
        resolve_winner(&self.participants, &self.first_kill_times, lone_survivor, time_up)
    }
}
