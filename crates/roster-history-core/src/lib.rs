//! Shared record types and roster derivation for the roster history database.
//!
//! Records are read once per run into a [`RosterSnapshot`]. Every validator
//! and every query receives the snapshot by reference; nothing here caches
//! state between runs or mutates the snapshot after construction.
//!
//! Derivation is total: malformed or unresolved input degrades to empty
//! sets, raw slugs and `None` instead of errors.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

pub type TeamSlug = String;
pub type PlayerSlug = String;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RosterError {
    #[error("invalid event date: {0}")]
    InvalidDate(String),
}

/// One of the three record collections backing the database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Team,
    Member,
    Roster,
}

impl Collection {
    pub const ALL: [Self; 3] = [Self::Member, Self::Roster, Self::Team];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::Member => "member",
            Self::Roster => "roster",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "team" => Some(Self::Team),
            "member" => Some(Self::Member),
            "roster" => Some(Self::Roster),
            _ => None,
        }
    }

    /// Conventional file name of the collection inside a data directory.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Team => "team.yaml",
            Self::Member => "member.yaml",
            Self::Roster => "roster.yaml",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Team {
    pub slug: TeamSlug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Player {
    pub slug: PlayerSlug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct MemberChange {
    #[serde(rename = "in", default)]
    pub ins: Vec<PlayerSlug>,
    #[serde(rename = "out", default)]
    pub outs: Vec<PlayerSlug>,
}

/// A dated membership change for one team.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RosterEvent {
    pub date: String,
    #[serde(default)]
    pub member: MemberChange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<String>,
}

impl RosterEvent {
    #[must_use]
    pub fn parsed_date(&self) -> Option<Date> {
        parse_event_date(&self.date).ok()
    }

    #[must_use]
    pub fn mentions(&self, player: &str) -> bool {
        self.member.ins.iter().any(|slug| slug == player)
            || self.member.outs.iter().any(|slug| slug == player)
    }
}

/// Backing value of one team key in the roster collection.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RosterSequence {
    Events { events: Vec<RosterEvent> },
    /// The team key maps to something other than a list; `found` names its kind.
    Malformed { found: &'static str },
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct TeamRoster {
    pub team: TeamSlug,
    pub sequence: RosterSequence,
}

impl TeamRoster {
    #[must_use]
    pub fn new(team: impl Into<TeamSlug>, events: Vec<RosterEvent>) -> Self {
        Self {
            team: team.into(),
            sequence: RosterSequence::Events { events },
        }
    }

    /// Declared events, or an empty slice when the entry is malformed.
    #[must_use]
    pub fn events(&self) -> &[RosterEvent] {
        match &self.sequence {
            RosterSequence::Events { events } => events,
            RosterSequence::Malformed { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MembershipAction {
    In,
    Out,
}

impl MembershipAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl Display for MembershipAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct PlayerHistoryItem<'a> {
    pub team: &'a str,
    pub date: &'a str,
    pub action: MembershipAction,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct TeamRosterView<'a> {
    pub team: &'a str,
    pub history: Vec<&'a RosterEvent>,
    pub current: BTreeSet<&'a str>,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct RecentChange<'a> {
    pub team: &'a str,
    pub team_name: &'a str,
    pub date: &'a str,
    pub ins: &'a [PlayerSlug],
    pub outs: &'a [PlayerSlug],
    pub reference: &'a [String],
}

/// Parses an ISO 8601 calendar date (`YYYY-MM-DD`).
///
/// # Errors
/// Returns [`RosterError::InvalidDate`] when the value is not a valid
/// calendar date in that format.
pub fn parse_event_date(value: &str) -> Result<Date, RosterError> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(value.trim(), &format)
        .map_err(|err| RosterError::InvalidDate(format!("{value}: {err}")))
}

/// Ordering key of an event: valid dates ascending, undated events last.
fn date_key(event: &RosterEvent) -> (bool, Option<Date>) {
    let date = event.parsed_date();
    (date.is_none(), date)
}

/// Orders events by date, keeping declared order for same-date ties.
///
/// Each item carries the event's declared index within `events`.
#[must_use]
pub fn chronological(events: &[RosterEvent]) -> Vec<(usize, &RosterEvent)> {
    let mut ordered: Vec<((bool, Option<Date>), usize, &RosterEvent)> = events
        .iter()
        .enumerate()
        .map(|(index, event)| (date_key(event), index, event))
        .collect();
    ordered.sort_by_key(|(key, index, _)| (*key, *index));
    ordered
        .into_iter()
        .map(|(_, index, event)| (index, event))
        .collect()
}

/// Running membership set of one team.
///
/// Each applied event removes its `out` slugs, then adds its `in` slugs.
#[derive(Debug, Clone, Default)]
pub struct MembershipFold<'a> {
    present: BTreeSet<&'a str>,
}

impl<'a> MembershipFold<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event and returns the `out` slugs that were absent
    /// before the event, in declared order.
    pub fn apply(&mut self, event: &'a RosterEvent) -> Vec<&'a str> {
        let absent: Vec<&'a str> = event
            .member
            .outs
            .iter()
            .map(String::as_str)
            .filter(|slug| !self.present.contains(slug))
            .collect();

        for slug in &event.member.outs {
            self.present.remove(slug.as_str());
        }
        for slug in &event.member.ins {
            self.present.insert(slug.as_str());
        }

        absent
    }

    #[must_use]
    pub fn contains(&self, player: &str) -> bool {
        self.present.contains(player)
    }

    #[must_use]
    pub fn into_members(self) -> BTreeSet<&'a str> {
        self.present
    }
}

/// Final membership after folding every event, ignoring validity.
#[must_use]
pub fn current_members(events: &[RosterEvent]) -> BTreeSet<&str> {
    let mut fold = MembershipFold::new();
    for (_, event) in chronological(events) {
        let _ = fold.apply(event);
    }
    fold.into_members()
}

#[must_use]
pub fn history_for_team(events: &[RosterEvent]) -> Vec<&RosterEvent> {
    chronological(events)
        .into_iter()
        .map(|(_, event)| event)
        .collect()
}

/// Collects every join/leave of `player` across all rosters, by date.
///
/// Within one event the `out` entry precedes the `in` entry, matching the
/// fold order.
#[must_use]
pub fn player_history<'a>(rosters: &'a [TeamRoster], player: &str) -> Vec<PlayerHistoryItem<'a>> {
    let mut items = Vec::new();
    for roster in rosters {
        for (_, event) in chronological(roster.events()) {
            if !event.mentions(player) {
                continue;
            }
            let key = date_key(event);
            if event.member.outs.iter().any(|slug| slug == player) {
                items.push((
                    key,
                    PlayerHistoryItem {
                        team: roster.team.as_str(),
                        date: event.date.as_str(),
                        action: MembershipAction::Out,
                    },
                ));
            }
            if event.member.ins.iter().any(|slug| slug == player) {
                items.push((
                    key,
                    PlayerHistoryItem {
                        team: roster.team.as_str(),
                        date: event.date.as_str(),
                        action: MembershipAction::In,
                    },
                ));
            }
        }
    }

    items.sort_by_key(|(key, _)| *key);
    items.into_iter().map(|(_, item)| item).collect()
}

/// Raw parsed record files, one JSON value per collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDocuments {
    pub team: Value,
    pub member: Value,
    pub roster: Value,
}

impl RecordDocuments {
    #[must_use]
    pub fn get(&self, collection: Collection) -> &Value {
        match collection {
            Collection::Team => &self.team,
            Collection::Member => &self.member,
            Collection::Roster => &self.roster,
        }
    }
}

/// Immutable view of all records for one run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RosterSnapshot {
    teams: Vec<Team>,
    players: Vec<Player>,
    rosters: Vec<TeamRoster>,
}

impl RosterSnapshot {
    #[must_use]
    pub fn new(teams: Vec<Team>, players: Vec<Player>, rosters: Vec<TeamRoster>) -> Self {
        Self {
            teams,
            players,
            rosters,
        }
    }

    /// Builds a snapshot from whatever parts of the documents are usable.
    ///
    /// Schema problems are left for the validators; here a missing `name`
    /// falls back to the slug, non-string list items are dropped, and a
    /// non-list roster entry is kept as [`RosterSequence::Malformed`].
    #[must_use]
    pub fn from_documents(documents: &RecordDocuments) -> Self {
        let teams = teams_from_document(&documents.team);
        let players = players_from_document(&documents.member);
        let rosters = rosters_from_document(&documents.roster);
        tracing::debug!(
            teams = teams.len(),
            players = players.len(),
            rosters = rosters.len(),
            "built roster snapshot"
        );
        Self::new(teams, players, rosters)
    }

    #[must_use]
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    #[must_use]
    pub fn team_slugs(&self) -> Vec<&str> {
        self.teams.iter().map(|team| team.slug.as_str()).collect()
    }

    #[must_use]
    pub fn team_by_slug(&self, slug: &str) -> Option<&Team> {
        self.teams.iter().find(|team| team.slug == slug)
    }

    #[must_use]
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    #[must_use]
    pub fn player_by_slug(&self, slug: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.slug == slug)
    }

    #[must_use]
    pub fn rosters(&self) -> &[TeamRoster] {
        &self.rosters
    }

    /// Declared events of `team`; empty when the team has no usable roster.
    #[must_use]
    pub fn roster_events(&self, team: &str) -> &[RosterEvent] {
        self.rosters
            .iter()
            .find(|roster| roster.team == team)
            .map(TeamRoster::events)
            .unwrap_or_default()
    }

    /// Declared players plus every slug mentioned by any roster event, sorted.
    #[must_use]
    pub fn all_player_slugs(&self) -> Vec<&str> {
        let mut slugs: BTreeSet<&str> = self
            .players
            .iter()
            .map(|player| player.slug.as_str())
            .collect();
        for roster in &self.rosters {
            for event in roster.events() {
                slugs.extend(event.member.ins.iter().map(String::as_str));
                slugs.extend(event.member.outs.iter().map(String::as_str));
            }
        }
        slugs.into_iter().collect()
    }

    #[must_use]
    pub fn current_members(&self, team: &str) -> BTreeSet<&str> {
        current_members(self.roster_events(team))
    }

    #[must_use]
    pub fn history_for_team(&self, team: &str) -> Vec<&RosterEvent> {
        history_for_team(self.roster_events(team))
    }

    #[must_use]
    pub fn roster_for_team<'a>(&'a self, team: &'a str) -> TeamRosterView<'a> {
        TeamRosterView {
            team,
            history: self.history_for_team(team),
            current: self.current_members(team),
        }
    }

    /// First declared team whose current members include `player`.
    #[must_use]
    pub fn current_team_for_player(&self, player: &str) -> Option<&str> {
        self.teams
            .iter()
            .map(|team| team.slug.as_str())
            .find(|team| self.current_members(team).contains(player))
    }

    #[must_use]
    pub fn history_for_player(&self, player: &str) -> Vec<PlayerHistoryItem<'_>> {
        player_history(&self.rosters, player)
    }

    #[must_use]
    pub fn display_name_for_player<'a>(&'a self, slug: &'a str) -> &'a str {
        self.player_by_slug(slug)
            .map(|player| player.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(slug)
    }

    #[must_use]
    pub fn display_name_for_team<'a>(&'a self, slug: &'a str) -> &'a str {
        self.team_by_slug(slug)
            .map(|team| team.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(slug)
    }

    /// Newest dated roster events across every team, newest first.
    ///
    /// Events without a parseable date are left out of the feed.
    #[must_use]
    pub fn recent_changes(&self, limit: usize) -> Vec<RecentChange<'_>> {
        let mut dated: Vec<(Date, usize, usize, &TeamRoster, &RosterEvent)> = Vec::new();
        for (position, roster) in self.rosters.iter().enumerate() {
            for (index, event) in roster.events().iter().enumerate() {
                match event.parsed_date() {
                    Some(date) => dated.push((date, position, index, roster, event)),
                    None => tracing::warn!(
                        team = %roster.team,
                        event_index = index,
                        date = %event.date,
                        "skipping undated roster event in recent changes"
                    ),
                }
            }
        }

        dated.sort_by(|lhs, rhs| (rhs.0, rhs.1, rhs.2).cmp(&(lhs.0, lhs.1, lhs.2)));
        dated
            .into_iter()
            .take(limit)
            .map(|(_, _, _, roster, event)| RecentChange {
                team: roster.team.as_str(),
                team_name: self.display_name_for_team(&roster.team),
                date: event.date.as_str(),
                ins: &event.member.ins,
                outs: &event.member.outs,
                reference: &event.reference,
            })
            .collect()
    }
}

/// Short name of a JSON value's kind, used in malformed-entry reports.
#[must_use]
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn name_or_slug(body: &Value, slug: &str) -> String {
    body.get("name")
        .and_then(Value::as_str)
        .unwrap_or(slug)
        .to_string()
}

/// Teams of a parsed `team.yaml`, in declared order.
#[must_use]
pub fn teams_from_document(document: &Value) -> Vec<Team> {
    let Some(entries) = document.as_object() else {
        tracing::warn!(found = json_kind(document), "team document is not a mapping");
        return Vec::new();
    };

    entries
        .iter()
        .map(|(slug, body)| Team {
            slug: slug.clone(),
            name: name_or_slug(body, slug),
            alias: string_list(body.get("alias")),
            reference: string_list(body.get("reference")),
            memo: body.get("memo").and_then(Value::as_str).map(str::to_string),
        })
        .collect()
}

#[must_use]
pub fn players_from_document(document: &Value) -> Vec<Player> {
    let Some(entries) = document.get("player").and_then(Value::as_object) else {
        tracing::warn!("member document has no `player` mapping");
        return Vec::new();
    };

    entries
        .iter()
        .map(|(slug, body)| Player {
            slug: slug.clone(),
            name: name_or_slug(body, slug),
            alias: string_list(body.get("alias")),
            reference: string_list(body.get("reference")),
        })
        .collect()
}

/// Team rosters of a parsed `roster.yaml`, in declared order.
#[must_use]
pub fn rosters_from_document(document: &Value) -> Vec<TeamRoster> {
    let Some(entries) = document.as_object() else {
        tracing::warn!(found = json_kind(document), "roster document is not a mapping");
        return Vec::new();
    };

    entries
        .iter()
        .map(|(team, value)| {
            let sequence = match value.as_array() {
                Some(items) => RosterSequence::Events {
                    events: items.iter().map(event_from_value).collect(),
                },
                None => RosterSequence::Malformed {
                    found: json_kind(value),
                },
            };
            TeamRoster {
                team: team.clone(),
                sequence,
            }
        })
        .collect()
}

// Non-object items still become (empty) events so declared indices hold.
fn event_from_value(value: &Value) -> RosterEvent {
    let member = value.get("member");
    RosterEvent {
        date: value
            .get("date")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        member: MemberChange {
            ins: string_list(member.and_then(|member| member.get("in"))),
            outs: string_list(member.and_then(|member| member.get("out"))),
        },
        reference: string_list(value.get("reference")),
    }
}
