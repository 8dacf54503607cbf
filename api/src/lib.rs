pub mod client;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// Wire format of `battleTime`, e.g. `20241105T181530.000Z`.
const BATTLE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%.f";

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

/// One entry of the global player ranking.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RankedPlayer {
    pub tag: String,
    pub name: String,
    pub trophies: i32,
    pub rank: i32,
}

// ---------------------------------------------------------------------------
// Battle log
// ---------------------------------------------------------------------------

/// One entry of a player's recent battle history.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BattleLogEntry {
    pub battle_time: String,
    pub event: Event,
    pub battle: Battle,
}

impl BattleLogEntry {
    /// Parse `battle_time` as a UTC instant.
    pub fn parsed_time(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        let raw = self.battle_time.trim_end_matches('Z');
        NaiveDateTime::parse_from_str(raw, BATTLE_TIME_FORMAT).map(|t| t.and_utc())
    }

    /// Mode of the battle, falling back to the event's mode when the battle omits it.
    pub fn mode(&self) -> &str {
        if self.battle.mode.is_empty() {
            &self.event.mode
        } else {
            &self.battle.mode
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Event {
    pub id: i64,
    pub mode: String,
    pub map: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Battle {
    pub mode: String,
    #[serde(rename = "type")]
    pub battle_type: String,
    pub result: Option<String>, // "victory", "defeat", "draw"
    pub duration: Option<u32>,
    /// Absent for free-for-all modes, which list `players` instead.
    pub teams: Option<Vec<Vec<BattlePlayer>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BattlePlayer {
    pub tag: String,
    pub name: String,
    pub brawler: Brawler,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Brawler {
    pub id: i64,
    pub name: String,
    pub power: i32,
    /// Ranked battles report the rank level here.
    pub trophies: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_battle_time() {
        let entry = BattleLogEntry {
            battle_time: "20241105T181530.000Z".into(),
            ..Default::default()
        };
        let expected = Utc.with_ymd_and_hms(2024, 11, 5, 18, 15, 30).unwrap();
        assert_eq!(entry.parsed_time().unwrap(), expected);
    }

    #[test]
    fn rejects_malformed_battle_time() {
        let entry = BattleLogEntry {
            battle_time: "2024-11-05 18:15".into(),
            ..Default::default()
        };
        assert!(entry.parsed_time().is_err());
    }

    #[test]
    fn battle_log_entry_deserializes_from_wire_shape() {
        let raw = r##"{
            "battleTime": "20241105T181530.000Z",
            "event": {"id": 15000007, "mode": "gemGrab", "map": "Hard Rock Mine"},
            "battle": {
                "mode": "gemGrab",
                "type": "soloRanked",
                "result": "victory",
                "duration": 120,
                "teams": [
                    [{"tag": "#A", "name": "a", "brawler": {"id": 1, "name": "SHELLY", "power": 11, "trophies": 19}}],
                    [{"tag": "#D", "name": "d", "brawler": {"id": 2, "name": "COLT", "power": 10, "trophies": 18}}]
                ]
            }
        }"##;
        let entry: BattleLogEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.mode(), "gemGrab");
        assert_eq!(entry.battle.battle_type, "soloRanked");
        assert_eq!(entry.event.map.as_deref(), Some("Hard Rock Mine"));
        let teams = entry.battle.teams.unwrap();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[1][0].brawler.name, "COLT");
        assert_eq!(teams[0][0].brawler.trophies, 19);
    }

    #[test]
    fn mode_falls_back_to_event() {
        let entry = BattleLogEntry {
            event: Event { mode: "heist".into(), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(entry.mode(), "heist");
    }
}
