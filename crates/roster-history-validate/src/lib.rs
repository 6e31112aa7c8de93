//! Validation passes over the roster history records.
//!
//! Three independent checks read the same immutable inputs:
//! - [`validate_schema`] checks one parsed document against its JSON Schema.
//! - [`validate_references`] resolves roster team keys and player slugs.
//! - [`validate_timeline`] replays each team's events and flags players who
//!   leave a team they are not on.
//!
//! Every pass collects all findings instead of stopping at the first one.
//! [`validate_all`] runs the three passes and aggregates them into a
//! [`ValidationReport`].

use jsonschema::{Draft, JSONSchema};
use roster_history_core::{
    chronological, Collection, MembershipAction, MembershipFold, Player, PlayerSlug,
    RecordDocuments, RosterSequence, RosterSnapshot, Team, TeamRoster, TeamSlug,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

const TEAM_SCHEMA: &str = include_str!("../schemas/team.schema.json");
const MEMBER_SCHEMA: &str = include_str!("../schemas/member.schema.json");
const ROSTER_SCHEMA: &str = include_str!("../schemas/roster.schema.json");

#[derive(Debug, Clone, thiserror::Error, Serialize, Eq, PartialEq)]
#[error("{path} {message}")]
pub struct SchemaViolation {
    pub collection: Collection,
    /// JSON pointer into the document, `(root)` for the document itself.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct SchemaReport {
    pub collection: Collection,
    pub file: &'static str,
    pub ok: bool,
    pub errors: Vec<SchemaViolation>,
}

#[derive(Debug, Clone, thiserror::Error, Serialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceError {
    #[error("(roster).{team} is not defined in team.yaml")]
    UnknownTeam { team: TeamSlug },
    #[error("(roster).{team} must be a sequence of roster events, found {found}")]
    MalformedRoster { team: TeamSlug, found: &'static str },
    #[error(
        "(roster).{team}[{event_index}].member.{direction} references undefined player '{slug}' (not in member.yaml)"
    )]
    UnknownPlayer {
        team: TeamSlug,
        event_index: usize,
        direction: MembershipAction,
        slug: PlayerSlug,
    },
}

#[derive(Debug, Clone, thiserror::Error, Serialize, Eq, PartialEq)]
#[error("(roster).{team}[{event_index}] on {date}: '{slug}' leaves without being a member")]
pub struct TimelineError {
    pub team: TeamSlug,
    /// Declared position of the event in the team's roster list.
    pub event_index: usize,
    pub date: String,
    pub slug: PlayerSlug,
}

/// Embedded JSON Schema for `collection`.
#[must_use]
pub fn schema_source(collection: Collection) -> &'static str {
    match collection {
        Collection::Team => TEAM_SCHEMA,
        Collection::Member => MEMBER_SCHEMA,
        Collection::Roster => ROSTER_SCHEMA,
    }
}

/// Validates `document` against the embedded schema for `collection`.
#[must_use]
pub fn validate_schema(collection: Collection, document: &Value) -> SchemaReport {
    match serde_json::from_str::<Value>(schema_source(collection)) {
        Ok(schema) => validate_against(collection, document, &schema),
        Err(err) => failed_report(
            collection,
            "(schema)",
            format!("embedded schema is not valid JSON: {err}"),
        ),
    }
}

/// Validates `document` against an explicit draft-7 `schema`.
///
/// Unknown fields are tolerated unless the schema forbids them. Problems
/// compiling the schema are reported as a violation rather than raised.
#[must_use]
pub fn validate_against(
    collection: Collection,
    document: &Value,
    schema: &Value,
) -> SchemaReport {
    let compiled = match JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
    {
        Ok(compiled) => compiled,
        Err(err) => {
            return failed_report(
                collection,
                "(schema)",
                format!("schema does not compile: {err}"),
            )
        }
    };

    let errors: Vec<SchemaViolation> = match compiled.validate(document) {
        Ok(()) => Vec::new(),
        Err(iter) => iter
            .map(|err| {
                let pointer = err.instance_path.to_string();
                SchemaViolation {
                    collection,
                    path: if pointer.is_empty() {
                        "(root)".to_string()
                    } else {
                        pointer
                    },
                    message: err.to_string(),
                }
            })
            .collect(),
    };

    tracing::debug!(
        collection = collection.as_str(),
        violations = errors.len(),
        "schema validation finished"
    );

    SchemaReport {
        collection,
        file: collection.file_name(),
        ok: errors.is_empty(),
        errors,
    }
}

fn failed_report(collection: Collection, path: &str, message: String) -> SchemaReport {
    SchemaReport {
        collection,
        file: collection.file_name(),
        ok: false,
        errors: vec![SchemaViolation {
            collection,
            path: path.to_string(),
            message,
        }],
    }
}

/// Resolves every roster team key against `teams` and every member slug
/// against `players`.
///
/// A roster entry that is not a list is reported once and its contents are
/// not inspected further.
#[must_use]
pub fn validate_references(
    teams: &[Team],
    players: &[Player],
    rosters: &[TeamRoster],
) -> Vec<ReferenceError> {
    let team_slugs: BTreeSet<&str> = teams.iter().map(|team| team.slug.as_str()).collect();
    let player_slugs: BTreeSet<&str> = players
        .iter()
        .map(|player| player.slug.as_str())
        .collect();
    let mut errors = Vec::new();

    for roster in rosters {
        if !team_slugs.contains(roster.team.as_str()) {
            errors.push(ReferenceError::UnknownTeam {
                team: roster.team.clone(),
            });
        }

        let events = match &roster.sequence {
            RosterSequence::Events { events } => events,
            RosterSequence::Malformed { found } => {
                errors.push(ReferenceError::MalformedRoster {
                    team: roster.team.clone(),
                    found: *found,
                });
                continue;
            }
        };

        for (event_index, event) in events.iter().enumerate() {
            for (direction, slugs) in [
                (MembershipAction::In, &event.member.ins),
                (MembershipAction::Out, &event.member.outs),
            ] {
                for slug in slugs {
                    if !player_slugs.contains(slug.as_str()) {
                        errors.push(ReferenceError::UnknownPlayer {
                            team: roster.team.clone(),
                            event_index,
                            direction,
                            slug: slug.clone(),
                        });
                    }
                }
            }
        }
    }

    tracing::debug!(errors = errors.len(), "reference validation finished");
    errors
}

/// Replays each team's events in chronological order and reports every
/// `out` of a player who is not a member at that point.
///
/// An `in` in the same event never satisfies the `out`: removals are
/// checked against the membership before the event.
#[must_use]
pub fn validate_timeline(rosters: &[TeamRoster]) -> Vec<TimelineError> {
    let mut errors = Vec::new();

    for roster in rosters {
        let mut fold = MembershipFold::new();
        for (event_index, event) in chronological(roster.events()) {
            for slug in fold.apply(event) {
                errors.push(TimelineError {
                    team: roster.team.clone(),
                    event_index,
                    date: event.date.clone(),
                    slug: slug.to_string(),
                });
            }
        }
    }

    tracing::debug!(errors = errors.len(), "timeline validation finished");
    errors
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct ValidationReport {
    pub schema: Vec<SchemaReport>,
    pub references: Vec<ReferenceError>,
    pub timeline: Vec<TimelineError>,
}

impl ValidationReport {
    #[must_use]
    pub fn schema_ok(&self) -> bool {
        self.schema.iter().all(|report| report.ok)
    }

    #[must_use]
    pub fn references_ok(&self) -> bool {
        self.references.is_empty()
    }

    #[must_use]
    pub fn timeline_ok(&self) -> bool {
        self.timeline.is_empty()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.schema_ok() && self.references_ok() && self.timeline_ok()
    }

    #[must_use]
    pub fn schema_violation_count(&self) -> usize {
        self.schema.iter().map(|report| report.errors.len()).sum()
    }
}

/// Runs schema, reference and timeline validation over one run's inputs.
///
/// The passes share no state, so they run in parallel.
#[must_use]
pub fn validate_all(documents: &RecordDocuments, snapshot: &RosterSnapshot) -> ValidationReport {
    let (schema, (references, timeline)) = rayon::join(
        || {
            Collection::ALL
                .iter()
                .map(|collection| validate_schema(*collection, documents.get(*collection)))
                .collect::<Vec<_>>()
        },
        || {
            rayon::join(
                || validate_references(snapshot.teams(), snapshot.players(), snapshot.rosters()),
                || validate_timeline(snapshot.rosters()),
            )
        },
    );

    let report = ValidationReport {
        schema,
        references,
        timeline,
    };
    tracing::info!(
        schema_violations = report.schema_violation_count(),
        reference_errors = report.references.len(),
        timeline_errors = report.timeline.len(),
        "validation finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use roster_history_core::{MemberChange, RosterEvent};
    use serde_json::json;

    fn event(date: &str, ins: &[&str], outs: &[&str]) -> RosterEvent {
        RosterEvent {
            date: date.to_string(),
            member: MemberChange {
                ins: ins.iter().map(|slug| (*slug).to_string()).collect(),
                outs: outs.iter().map(|slug| (*slug).to_string()).collect(),
            },
            reference: Vec::new(),
        }
    }

    fn team(slug: &str) -> Team {
        Team {
            slug: slug.to_string(),
            name: slug.to_string(),
            alias: Vec::new(),
            reference: Vec::new(),
            memo: None,
        }
    }

    fn player(slug: &str) -> Player {
        Player {
            slug: slug.to_string(),
            name: slug.to_string(),
            alias: Vec::new(),
            reference: Vec::new(),
        }
    }

    fn valid_documents() -> RecordDocuments {
        RecordDocuments {
            team: json!({
                "alpha": {
                    "name": "Alpha Gaming",
                    "alias": ["AG"],
                    "reference": ["https://example.com/alpha"],
                    "memo": "founded 2023",
                    "color": "red"
                }
            }),
            member: json!({
                "player": {
                    "a": {"name": "Player A"},
                    "b": {"name": "Player B", "reference": ["https://example.com/b"]}
                }
            }),
            roster: json!({
                "alpha": [
                    {"date": "2024-01-01", "member": {"in": ["a", "b"]}},
                    {"date": "2024-02-01", "member": {"out": ["a"]}, "reference": ["https://example.com/news"]}
                ]
            }),
        }
    }

    #[test]
    fn valid_documents_pass_every_check() {
        let documents = valid_documents();
        let snapshot = RosterSnapshot::from_documents(&documents);
        let report = validate_all(&documents, &snapshot);
        assert!(report.is_ok(), "unexpected report: {report:?}");
        assert_eq!(report.schema.len(), 3);
    }

    #[test]
    fn schema_reports_every_violation_with_paths() {
        let document = json!({
            "alpha": {"alias": "AG"},
            "beta": {"name": 7, "reference": ["not a url"]}
        });

        let report = validate_schema(Collection::Team, &document);

        assert!(!report.ok);
        assert_eq!(report.file, "team.yaml");
        let paths: BTreeSet<&str> = report.errors.iter().map(|err| err.path.as_str()).collect();
        assert!(paths.contains("/alpha"), "missing name not reported: {paths:?}");
        assert!(paths.contains("/alpha/alias"));
        assert!(paths.contains("/beta/name"));
        assert!(paths.contains("/beta/reference/0"));
    }

    #[test]
    fn schema_flags_non_mapping_documents_at_root() {
        let report = validate_schema(Collection::Roster, &json!(["alpha"]));
        assert!(!report.ok);
        assert_eq!(report.errors[0].path, "(root)");
    }

    #[test]
    fn schema_requires_player_grouping_key() {
        let report = validate_schema(Collection::Member, &json!({"a": {"name": "A"}}));
        assert!(!report.ok);
    }

    #[test]
    fn schema_checks_roster_dates_and_member_lists() {
        let report = validate_schema(
            Collection::Roster,
            &json!({
                "alpha": [
                    {"date": "2024-13-01", "member": {"in": ["a"]}},
                    {"date": "2024-01-01", "member": {"in": "a"}},
                    {"member": {"out": ["a"]}}
                ]
            }),
        );

        let paths: Vec<&str> = report.errors.iter().map(|err| err.path.as_str()).collect();
        assert!(paths.contains(&"/alpha/0/date"), "bad date not reported: {paths:?}");
        assert!(paths.contains(&"/alpha/1/member/in"));
        assert!(paths.contains(&"/alpha/2"));
    }

    #[test]
    fn broken_schema_is_reported_not_raised() {
        let report = validate_against(
            Collection::Team,
            &json!({}),
            &json!({"type": "no-such-type"}),
        );
        assert!(!report.ok);
        assert_eq!(report.errors[0].path, "(schema)");
    }

    #[test]
    fn orphan_team_is_reported_exactly_once() {
        let rosters = vec![TeamRoster::new(
            "ghost-team",
            vec![
                event("2024-01-01", &["a"], &[]),
                event("2024-02-01", &[], &["a"]),
            ],
        )];

        let errors = validate_references(&[team("alpha")], &[player("a")], &rosters);

        assert_eq!(
            errors,
            vec![ReferenceError::UnknownTeam {
                team: "ghost-team".to_string()
            }]
        );
    }

    #[test]
    fn unknown_players_carry_event_index_and_direction() {
        let rosters = vec![TeamRoster::new(
            "alpha",
            vec![
                event("2024-01-01", &["a", "phantom"], &[]),
                event("2024-02-01", &["b"], &["ghost"]),
            ],
        )];

        let errors = validate_references(&[team("alpha")], &[player("a"), player("b")], &rosters);

        assert_eq!(
            errors,
            vec![
                ReferenceError::UnknownPlayer {
                    team: "alpha".to_string(),
                    event_index: 0,
                    direction: MembershipAction::In,
                    slug: "phantom".to_string(),
                },
                ReferenceError::UnknownPlayer {
                    team: "alpha".to_string(),
                    event_index: 1,
                    direction: MembershipAction::Out,
                    slug: "ghost".to_string(),
                },
            ]
        );
        assert_eq!(
            errors[1].to_string(),
            "(roster).alpha[1].member.out references undefined player 'ghost' (not in member.yaml)"
        );
    }

    #[test]
    fn malformed_roster_is_a_distinct_error() {
        let rosters = vec![TeamRoster {
            team: "alpha".to_string(),
            sequence: RosterSequence::Malformed { found: "mapping" },
        }];

        let errors = validate_references(&[team("alpha")], &[], &rosters);

        assert_eq!(
            errors,
            vec![ReferenceError::MalformedRoster {
                team: "alpha".to_string(),
                found: "mapping",
            }]
        );
    }

    #[test]
    fn lone_out_is_one_timeline_error() {
        let rosters = vec![TeamRoster::new(
            "alpha",
            vec![event("2024-01-01", &[], &["a"])],
        )];

        assert_eq!(
            validate_timeline(&rosters),
            vec![TimelineError {
                team: "alpha".to_string(),
                event_index: 0,
                date: "2024-01-01".to_string(),
                slug: "a".to_string(),
            }]
        );
    }

    #[test]
    fn same_event_in_does_not_satisfy_out() {
        let rosters = vec![TeamRoster::new(
            "alpha",
            vec![event("2024-03-01", &["a"], &["a"])],
        )];

        let errors = validate_timeline(&rosters);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].slug, "a");
    }

    #[test]
    fn same_event_swap_of_a_member_is_valid() {
        let rosters = vec![TeamRoster::new(
            "alpha",
            vec![
                event("2024-01-01", &["a"], &[]),
                event("2024-03-01", &["a"], &["a"]),
            ],
        )];

        assert!(validate_timeline(&rosters).is_empty());
    }

    #[test]
    fn timeline_collects_all_violations_in_replay_order() {
        let rosters = vec![
            TeamRoster::new(
                "alpha",
                vec![
                    event("2024-05-01", &[], &["late"]),
                    event("2024-01-01", &["a"], &["early"]),
                    event("2024-02-01", &["a"], &[]),
                ],
            ),
            TeamRoster::new("beta", vec![event("2024-01-01", &[], &["a"])]),
        ];

        let errors = validate_timeline(&rosters);
        let found: Vec<(&str, usize, &str)> = errors
            .iter()
            .map(|err| (err.team.as_str(), err.event_index, err.slug.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![("alpha", 1, "early"), ("alpha", 0, "late"), ("beta", 0, "a")]
        );
    }

    #[test]
    fn timeline_replays_same_date_events_in_declared_order() {
        let join_first = vec![TeamRoster::new(
            "alpha",
            vec![
                event("2024-04-01", &["x"], &[]),
                event("2024-04-01", &[], &["x"]),
            ],
        )];
        let leave_first = vec![TeamRoster::new(
            "alpha",
            vec![
                event("2024-04-01", &[], &["x"]),
                event("2024-04-01", &["x"], &[]),
            ],
        )];

        assert!(validate_timeline(&join_first).is_empty());
        assert_eq!(validate_timeline(&leave_first).len(), 1);
    }

    #[test]
    fn unresolved_slug_fails_references_but_derivation_proceeds() {
        let documents = RecordDocuments {
            team: json!({"alpha": {"name": "Alpha"}}),
            member: json!({"player": {}}),
            roster: json!({"alpha": [{"date": "2024-01-01", "member": {"in": ["phantom"]}}]}),
        };
        let snapshot = RosterSnapshot::from_documents(&documents);

        let report = validate_all(&documents, &snapshot);

        assert!(report.schema_ok());
        assert_eq!(report.references.len(), 1);
        assert!(report.timeline_ok());
        assert!(!report.is_ok());
        assert_eq!(snapshot.display_name_for_player("phantom"), "phantom");
        assert_eq!(snapshot.current_team_for_player("phantom"), Some("alpha"));
    }

    #[test]
    fn validators_leave_snapshot_untouched() {
        let documents = valid_documents();
        let snapshot = RosterSnapshot::from_documents(&documents);
        let before = snapshot.clone();
        let _ = validate_all(&documents, &snapshot);
        assert_eq!(snapshot, before);
    }

    fn arb_valid_roster() -> impl Strategy<Value = Vec<RosterEvent>> {
        prop::collection::vec((any::<bool>(), 0usize..4), 1..40).prop_map(|steps| {
            let pool = ["a", "b", "c", "d"];
            let mut present: BTreeSet<&str> = BTreeSet::new();
            let mut events = Vec::new();
            for (index, (leave, pick)) in steps.into_iter().enumerate() {
                let date = format!("2024-{:02}-{:02}", index / 28 + 1, index % 28 + 1);
                let slug = pool[pick];
                if leave && present.contains(slug) {
                    present.remove(slug);
                    events.push(event(&date, &[], &[slug]));
                } else {
                    present.insert(slug);
                    events.push(event(&date, &[slug], &[]));
                }
            }
            events.reverse();
            events
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_consistent_timelines_have_no_violations(events in arb_valid_roster()) {
            let rosters = vec![TeamRoster::new("alpha", events)];
            prop_assert!(validate_timeline(&rosters).is_empty());
        }
    }
}
