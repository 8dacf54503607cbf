//! Canonical per-participant rows built from raw battle-log entries.
//!
//! The same battle shows up in the history of all six participants. Every
//! observation collapses to one match id (battle time + smallest player tag),
//! and each side is rendered in a fixed order (sorted by brawler name) so rows
//! can be compared across matches.

use brawl_api::{BattleLogEntry, BattlePlayer};
use chrono::{DateTime, Utc};
use std::fmt;

/// Modes without two symmetric teams.
pub const EXCLUDED_MODES: [&str; 4] = ["soloShowdown", "duoShowdown", "duels", "bossFight"];
pub const FRIENDLY: &str = "friendly";

const VICTORY: &str = "victory";
const DEFEAT: &str = "defeat";

/// One stored row: a battle seen from one participant's side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRecord {
    pub match_id: String,
    pub battle_time: String,
    pub game_mode: String,
    pub game_map: Option<String>,
    pub game_type: String,
    pub brawler: String,
    pub power: i32,
    pub rank: i32,
    pub result: String,
    pub player_id: String,
    pub team: String,
    pub team_power: String,
    pub team_rank: String,
    pub team_ids: String,
    pub opponents: String,
    pub opponents_power: String,
    pub opponents_rank: String,
    pub opponents_ids: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    MissingTeams { battle_time: String, found: usize },
    BadTimestamp { battle_time: String, reason: String },
    MissingResult { battle_time: String },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::MissingTeams { battle_time, found } => {
                write!(f, "battle at {battle_time} has {found} team(s), expected 2")
            }
            TransformError::BadTimestamp { battle_time, reason } => {
                write!(f, "unparsable battle time {battle_time:?}: {reason}")
            }
            TransformError::MissingResult { battle_time } => {
                write!(f, "battle at {battle_time} has no result")
            }
        }
    }
}

impl std::error::Error for TransformError {}

/// The four parallel sequences describing one side, already serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideColumns {
    pub brawlers: String,
    pub powers: String,
    pub ranks: String,
    pub ids: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub tag: String,
    pub brawler: String,
    pub power: i32,
    pub rank: i32,
}

impl From<&BattlePlayer> for Participant {
    fn from(p: &BattlePlayer) -> Self {
        Self {
            tag: p.tag.clone(),
            brawler: p.brawler.name.clone(),
            power: p.brawler.power,
            rank: p.brawler.trophies,
        }
    }
}

/// A battle that passed every filter, oriented so that `team` holds the
/// player whose history it came from. Both rosters are sorted by brawler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBattle {
    pub match_id: String,
    pub battle_time: String,
    pub game_mode: String,
    pub game_map: Option<String>,
    pub game_type: String,
    pub result: String,
    pub team: Vec<Participant>,
    pub opponents: Vec<Participant>,
    pub team_columns: SideColumns,
    pub opponent_columns: SideColumns,
}

impl CanonicalBattle {
    /// Every participant, own side first.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.team.iter().chain(self.opponents.iter())
    }

    /// One row per participant. The opponent rows reuse the rendered columns
    /// with sides swapped and the outcome inverted.
    pub fn into_records(self) -> Vec<MatchRecord> {
        let base = MatchRecord {
            match_id: self.match_id,
            battle_time: self.battle_time,
            game_mode: self.game_mode,
            game_map: self.game_map,
            game_type: self.game_type,
            result: self.result,
            ..Default::default()
        };

        let mut records = Vec::with_capacity(self.team.len() + self.opponents.len());
        let own = with_sides(&base, &self.team_columns, &self.opponent_columns);
        records.extend(self.team.iter().map(|p| row_for(&own, p)));

        let mut theirs = with_sides(&base, &self.opponent_columns, &self.team_columns);
        theirs.result = invert_result(&theirs.result);
        records.extend(self.opponents.iter().map(|p| row_for(&theirs, p)));
        records
    }
}

fn with_sides(base: &MatchRecord, team: &SideColumns, opponents: &SideColumns) -> MatchRecord {
    MatchRecord {
        team: team.brawlers.clone(),
        team_power: team.powers.clone(),
        team_rank: team.ranks.clone(),
        team_ids: team.ids.clone(),
        opponents: opponents.brawlers.clone(),
        opponents_power: opponents.powers.clone(),
        opponents_rank: opponents.ranks.clone(),
        opponents_ids: opponents.ids.clone(),
        ..base.clone()
    }
}

fn row_for(template: &MatchRecord, p: &Participant) -> MatchRecord {
    MatchRecord {
        player_id: p.tag.clone(),
        brawler: p.brawler.clone(),
        power: p.power,
        rank: p.rank,
        ..template.clone()
    }
}

/// Swap victory and defeat; anything else (draws) passes through.
pub fn invert_result(result: &str) -> String {
    match result {
        VICTORY => DEFEAT.to_owned(),
        DEFEAT => VICTORY.to_owned(),
        other => other.to_owned(),
    }
}

/// Battle time followed by the lexicographically smallest participant tag.
pub fn match_id<'a>(battle_time: &str, tags: impl IntoIterator<Item = &'a str>) -> String {
    let min_tag = tags.into_iter().min().unwrap_or_default();
    format!("{battle_time}{min_tag}")
}

/// Filter and normalize one entry from `player`'s history.
///
/// `Ok(None)` means the entry is deliberately skipped (excluded mode, friendly,
/// or older than `cutoff`). Errors describe entries that cannot be read at all.
pub fn canonicalize(
    entry: &BattleLogEntry,
    player: &str,
    cutoff: DateTime<Utc>,
) -> Result<Option<CanonicalBattle>, TransformError> {
    let mode = entry.mode();
    if EXCLUDED_MODES.contains(&mode) || entry.battle.battle_type == FRIENDLY {
        return Ok(None);
    }

    let played_at = entry.parsed_time().map_err(|e| TransformError::BadTimestamp {
        battle_time: entry.battle_time.clone(),
        reason: e.to_string(),
    })?;
    if played_at < cutoff {
        return Ok(None);
    }

    let teams = entry.battle.teams.as_deref().unwrap_or_default();
    let [first, second, ..] = teams else {
        return Err(TransformError::MissingTeams {
            battle_time: entry.battle_time.clone(),
            found: teams.len(),
        });
    };

    let result = entry.battle.result.clone().ok_or_else(|| TransformError::MissingResult {
        battle_time: entry.battle_time.clone(),
    })?;

    let match_id = match_id(
        &entry.battle_time,
        first.iter().chain(second.iter()).map(|p| p.tag.as_str()),
    );

    let (own, other) = if first.iter().any(|p| p.tag == player) {
        (first, second)
    } else {
        (second, first)
    };
    let team = sorted_side(own);
    let opponents = sorted_side(other);

    Ok(Some(CanonicalBattle {
        match_id,
        battle_time: entry.battle_time.clone(),
        game_mode: mode.to_owned(),
        game_map: entry.event.map.clone(),
        game_type: entry.battle.battle_type.clone(),
        result,
        team_columns: render_side(&team),
        opponent_columns: render_side(&opponents),
        team,
        opponents,
    }))
}

/// Canonicalize a whole history. Any unreadable entry fails the batch.
pub fn canonicalize_log(
    entries: &[BattleLogEntry],
    player: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<CanonicalBattle>, TransformError> {
    let mut battles = Vec::new();
    for entry in entries {
        if let Some(battle) = canonicalize(entry, player, cutoff)? {
            battles.push(battle);
        }
    }
    Ok(battles)
}

fn sorted_side(side: &[BattlePlayer]) -> Vec<Participant> {
    let mut participants: Vec<Participant> = side.iter().map(Participant::from).collect();
    participants.sort_by(|a, b| a.brawler.cmp(&b.brawler));
    participants
}

fn render_side(side: &[Participant]) -> SideColumns {
    SideColumns {
        brawlers: render_array(side.iter().map(|p| p.brawler.as_str())),
        powers: render_array(side.iter().map(|p| p.power)),
        ranks: render_array(side.iter().map(|p| p.rank)),
        ids: render_array(side.iter().map(|p| p.tag.as_str())),
    }
}

/// JSON array with `", "` between items, the layout existing rows were written with.
fn render_array<T: serde::Serialize>(items: impl Iterator<Item = T>) -> String {
    let rendered: Vec<String> = items
        .map(|item| serde_json::to_string(&item).unwrap_or_default())
        .collect();
    format!("[{}]", rendered.join(", "))
}
