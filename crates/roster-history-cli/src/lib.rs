//! `roster` command surface.
//!
//! - `roster validate` runs schema, reference and timeline validation over the
//!   record files and exits non-zero when any check fails.
//! - `roster teams|team|players|player|recent` print derived roster data. They
//!   never validate; unresolved slugs are shown as-is.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use roster_history_core::{PlayerHistoryItem, RosterEvent, RosterSnapshot, Team};
use roster_history_store_yaml::{YamlRecordStore, DEFAULT_DATA_DIR};
use roster_history_validate::{validate_all, ValidationReport};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "ROSTER_LOG";
pub const DEFAULT_RECENT_LIMIT: usize = 5;

#[derive(Debug, Parser)]
#[command(name = "roster")]
#[command(about = "Esports roster history validation and queries")]
pub struct Cli {
    /// Directory holding team.yaml, member.yaml and roster.yaml.
    #[arg(long, global = true, env = "ROSTER_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Log at debug level unless ROSTER_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate all record files.
    Validate(OutputArgs),
    /// List teams with their current members.
    Teams(OutputArgs),
    /// Show one team's current members and roster history.
    Team(SlugArgs),
    /// List declared and referenced players.
    Players(OutputArgs),
    /// Show one player's current team and history.
    Player(SlugArgs),
    /// Show the newest roster changes across all teams.
    Recent(RecentArgs),
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct SlugArgs {
    slug: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct RecentArgs {
    #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

/// Installs the stderr log subscriber.
///
/// `ROSTER_LOG` takes precedence; otherwise the level is `warn`, or `debug`
/// with `--verbose`. Calling this twice keeps the first subscriber.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Executes the parsed CLI command.
///
/// # Errors
/// Returns an error when the record files cannot be loaded, when a queried
/// slug is unknown, or when validation finds any problem.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(data_dir = %cli.data_dir.display(), "opening record store");
    let store = YamlRecordStore::open(&cli.data_dir);
    match cli.command {
        Command::Validate(args) => run_validate(&store, args.json),
        Command::Teams(args) => {
            let snapshot = load_snapshot(&store)?;
            let teams = team_summaries(&snapshot);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&teams)?);
            } else {
                print!("{}", render_team_table(&teams));
            }
            Ok(())
        }
        Command::Team(args) => {
            let snapshot = load_snapshot(&store)?;
            let detail = team_detail(&snapshot, &args.slug)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print!("{}", render_team_detail(&snapshot, &detail));
            }
            Ok(())
        }
        Command::Players(args) => {
            let snapshot = load_snapshot(&store)?;
            let players = player_summaries(&snapshot);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&players)?);
            } else {
                print!("{}", render_player_table(&players));
            }
            Ok(())
        }
        Command::Player(args) => {
            let snapshot = load_snapshot(&store)?;
            let detail = player_detail(&snapshot, &args.slug)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print!("{}", render_player_detail(&snapshot, &detail));
            }
            Ok(())
        }
        Command::Recent(args) => {
            let snapshot = load_snapshot(&store)?;
            let changes = snapshot.recent_changes(args.limit);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&changes)?);
            } else {
                for change in &changes {
                    println!(
                        "{:<12} {:<24} in: {:<24} out: {}",
                        change.date,
                        change.team_name,
                        join_or_dash(change.ins),
                        join_or_dash(change.outs)
                    );
                }
            }
            Ok(())
        }
    }
}

fn load_snapshot(store: &YamlRecordStore) -> Result<RosterSnapshot> {
    store
        .load_snapshot()
        .context("failed to load roster records")
}

fn run_validate(store: &YamlRecordStore, json: bool) -> Result<()> {
    let records = store.load().context("failed to load roster records")?;
    let report = validate_all(&records.documents, &records.snapshot);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_validation_report(&report);
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(anyhow!(failure_summary(&report)))
    }
}

fn print_validation_report(report: &ValidationReport) {
    for schema in &report.schema {
        if schema.ok {
            println!("PASS  {}", schema.file);
        } else {
            eprintln!("FAIL  {} (schema)", schema.file);
            for violation in &schema.errors {
                eprintln!("  {violation}");
            }
        }
    }

    if report.references_ok() {
        println!("PASS  cross-file references");
    } else {
        eprintln!(
            "FAIL  cross-file references ({} errors)",
            report.references.len()
        );
        for error in &report.references {
            eprintln!("  {error}");
        }
    }

    if report.timeline_ok() {
        println!("PASS  roster timeline");
    } else {
        eprintln!("FAIL  roster timeline ({} errors)", report.timeline.len());
        for error in &report.timeline {
            eprintln!("  {error}");
        }
    }

    if report.is_ok() {
        println!("all data files are valid");
    }
}

fn failure_summary(report: &ValidationReport) -> String {
    format!(
        "validation failed: {} schema violation(s), {} reference error(s), {} timeline error(s)",
        report.schema_violation_count(),
        report.references.len(),
        report.timeline.len()
    )
}

#[derive(Debug, Serialize)]
struct TeamSummary<'a> {
    #[serde(flatten)]
    team: &'a Team,
    current: BTreeSet<&'a str>,
}

fn team_summaries(snapshot: &RosterSnapshot) -> Vec<TeamSummary<'_>> {
    snapshot
        .teams()
        .iter()
        .map(|team| TeamSummary {
            team,
            current: snapshot.current_members(&team.slug),
        })
        .collect()
}

fn render_team_table(teams: &[TeamSummary<'_>]) -> String {
    let mut out = format!("{:<20} {:<28} current\n", "slug", "name");
    out.push_str(&"-".repeat(72));
    out.push('\n');
    for summary in teams {
        out.push_str(&format!(
            "{:<20} {:<28} {}\n",
            summary.team.slug,
            summary.team.name,
            join_or_dash(&summary.current)
        ));
    }
    out
}

#[derive(Debug, Serialize)]
struct TeamDetail<'a> {
    slug: &'a str,
    name: &'a str,
    declared: bool,
    current: BTreeSet<&'a str>,
    history: Vec<&'a RosterEvent>,
}

fn team_detail<'a>(snapshot: &'a RosterSnapshot, slug: &'a str) -> Result<TeamDetail<'a>> {
    let declared = snapshot.team_by_slug(slug).is_some();
    if !declared && !snapshot.rosters().iter().any(|roster| roster.team == slug) {
        return Err(anyhow!("unknown team '{slug}'"));
    }
    let view = snapshot.roster_for_team(slug);
    Ok(TeamDetail {
        slug,
        name: snapshot.display_name_for_team(slug),
        declared,
        current: view.current,
        history: view.history,
    })
}

fn render_team_detail(snapshot: &RosterSnapshot, detail: &TeamDetail<'_>) -> String {
    let current: Vec<&str> = detail
        .current
        .iter()
        .map(|player| snapshot.display_name_for_player(player))
        .collect();
    let mut out = format!("{} ({})\n", detail.name, detail.slug);
    out.push_str(&format!("current: {}\n", join_or_dash(&current)));
    out.push_str(&format!("{:<12} {:<28} out\n", "date", "in"));
    out.push_str(&"-".repeat(60));
    out.push('\n');
    for event in &detail.history {
        out.push_str(&format!(
            "{:<12} {:<28} {}\n",
            event.date,
            join_or_dash(&event.member.ins),
            join_or_dash(&event.member.outs)
        ));
    }
    out
}

#[derive(Debug, Serialize)]
struct PlayerSummary<'a> {
    slug: &'a str,
    name: &'a str,
    declared: bool,
    current_team: Option<&'a str>,
}

fn player_summary<'a>(snapshot: &'a RosterSnapshot, slug: &'a str) -> PlayerSummary<'a> {
    PlayerSummary {
        slug,
        name: snapshot.display_name_for_player(slug),
        declared: snapshot.player_by_slug(slug).is_some(),
        current_team: snapshot.current_team_for_player(slug),
    }
}

fn player_summaries(snapshot: &RosterSnapshot) -> Vec<PlayerSummary<'_>> {
    snapshot
        .all_player_slugs()
        .into_iter()
        .map(|slug| player_summary(snapshot, slug))
        .collect()
}

fn render_player_table(players: &[PlayerSummary<'_>]) -> String {
    let mut out = format!("{:<20} {:<28} {:<9} current_team\n", "slug", "name", "declared");
    out.push_str(&"-".repeat(80));
    out.push('\n');
    for player in players {
        out.push_str(&format!(
            "{:<20} {:<28} {:<9} {}\n",
            player.slug,
            player.name,
            if player.declared { "yes" } else { "no" },
            player.current_team.unwrap_or("-")
        ));
    }
    out
}

#[derive(Debug, Serialize)]
struct PlayerDetail<'a> {
    #[serde(flatten)]
    summary: PlayerSummary<'a>,
    alias: &'a [String],
    reference: &'a [String],
    history: Vec<PlayerHistoryItem<'a>>,
}

fn player_detail<'a>(snapshot: &'a RosterSnapshot, slug: &'a str) -> Result<PlayerDetail<'a>> {
    if !snapshot.all_player_slugs().contains(&slug) {
        return Err(anyhow!("unknown player '{slug}'"));
    }
    let player = snapshot.player_by_slug(slug);
    Ok(PlayerDetail {
        summary: player_summary(snapshot, slug),
        alias: player.map(|player| player.alias.as_slice()).unwrap_or_default(),
        reference: player
            .map(|player| player.reference.as_slice())
            .unwrap_or_default(),
        history: snapshot.history_for_player(slug),
    })
}

fn render_player_detail(snapshot: &RosterSnapshot, detail: &PlayerDetail<'_>) -> String {
    let summary = &detail.summary;
    let mut out = format!("{} ({})\n", summary.name, summary.slug);
    if !summary.declared {
        out.push_str("not declared in member.yaml\n");
    }
    out.push_str(&format!(
        "current team: {}\n",
        summary
            .current_team
            .map_or("-", |team| snapshot.display_name_for_team(team))
    ));
    for item in &detail.history {
        out.push_str(&format!(
            "{:<12} {:<4} {}\n",
            item.date,
            item.action,
            snapshot.display_name_for_team(item.team)
        ));
    }
    out
}

fn join_or_dash<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> String {
    let joined = items
        .into_iter()
        .map(|item| item.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TEAM_YAML: &str = "\
zeta:
  name: Zeta Division
alpha:
  name: Alpha Gaming
";

    const MEMBER_YAML: &str = "\
player:
  kuro:
    name: Kuro
  shiro:
    name: Shiro
";

    const ROSTER_YAML: &str = "\
zeta:
  - date: 2024-01-10
    member:
      in: [kuro, shiro]
alpha:
  - date: 2024-02-01
    member:
      in: [kuro]
  - date: 2024-04-01
    member:
      out: [kuro]
      in: [ghost]
";

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn fixture_snapshot() -> RosterSnapshot {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        write_fixture(dir.path(), ROSTER_YAML);
        must(load_snapshot(&YamlRecordStore::open(dir.path())))
    }

    fn write_fixture(dir: &Path, roster: &str) {
        must(fs::write(dir.join("team.yaml"), TEAM_YAML).map_err(anyhow::Error::from));
        must(fs::write(dir.join("member.yaml"), MEMBER_YAML).map_err(anyhow::Error::from));
        must(fs::write(dir.join("roster.yaml"), roster).map_err(anyhow::Error::from));
    }

    fn execute_cli(args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(args)?;
        run_cli(cli)
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = must(
            Cli::try_parse_from(["roster", "validate", "--json", "--data-dir", "fixtures", "-v"])
                .map_err(anyhow::Error::from),
        );
        assert_eq!(cli.data_dir(), Path::new("fixtures"));
        assert!(cli.verbose());
        assert!(matches!(cli.command, Command::Validate(OutputArgs { json: true })));
    }

    #[test]
    fn recent_limit_defaults_to_five() {
        let cli = must(
            Cli::try_parse_from(["roster", "--data-dir", "fixtures", "recent"])
                .map_err(anyhow::Error::from),
        );
        match cli.command {
            Command::Recent(args) => assert_eq!(args.limit, DEFAULT_RECENT_LIMIT),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn validate_passes_on_consistent_records() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        write_fixture(dir.path(), ROSTER_YAML.replace("ghost", "shiro").as_str());
        let data_dir = dir.path().to_string_lossy().to_string();

        must(execute_cli(&["roster", "--data-dir", &data_dir, "validate"]));
    }

    #[test]
    fn validate_failure_summarises_counts() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let roster = format!(
            "{ROSTER_YAML}  - date: 2024-05-01\n    member:\n      out: [shiro]\n"
        );
        write_fixture(dir.path(), &roster);
        let data_dir = dir.path().to_string_lossy().to_string();

        let err = match execute_cli(&["roster", "--data-dir", &data_dir, "validate"]) {
            Ok(()) => panic!("expected validation to fail"),
            Err(err) => err,
        };

        assert_eq!(
            err.to_string(),
            "validation failed: 0 schema violation(s), 1 reference error(s), 1 timeline error(s)"
        );
    }

    #[test]
    fn missing_data_dir_is_a_load_error() {
        let dir = must(tempfile::tempdir().map_err(anyhow::Error::from));
        let data_dir = dir.path().join("absent").to_string_lossy().to_string();

        let err = match execute_cli(&["roster", "--data-dir", &data_dir, "teams"]) {
            Ok(()) => panic!("expected load to fail"),
            Err(err) => err,
        };

        assert!(err.to_string().contains("failed to load roster records"));
    }

    #[test]
    fn team_summaries_keep_declared_order() {
        let snapshot = fixture_snapshot();
        let teams = team_summaries(&snapshot);

        let slugs: Vec<&str> = teams.iter().map(|team| team.team.slug.as_str()).collect();
        assert_eq!(slugs, vec!["zeta", "alpha"]);
        assert_eq!(teams[1].current, BTreeSet::from(["ghost"]));

        let table = render_team_table(&teams);
        assert!(table.contains("kuro, shiro"));
    }

    #[test]
    fn team_detail_rejects_unknown_slug() {
        let snapshot = fixture_snapshot();
        assert!(team_detail(&snapshot, "omega").is_err());

        let detail = must(team_detail(&snapshot, "alpha"));
        assert_eq!(detail.name, "Alpha Gaming");
        assert_eq!(detail.history.len(), 2);
    }

    #[test]
    fn phantom_player_renders_with_raw_slug() {
        let snapshot = fixture_snapshot();
        let detail = must(player_detail(&snapshot, "ghost"));

        assert_eq!(detail.summary.name, "ghost");
        assert!(!detail.summary.declared);
        assert_eq!(detail.summary.current_team, Some("alpha"));
        assert!(render_player_detail(&snapshot, &detail).contains("not declared in member.yaml"));
        assert!(player_detail(&snapshot, "nobody").is_err());
    }

    #[test]
    fn player_table_lists_every_slug_once() {
        let snapshot = fixture_snapshot();
        let players = player_summaries(&snapshot);
        let slugs: Vec<&str> = players.iter().map(|player| player.slug).collect();

        assert_eq!(slugs, vec!["ghost", "kuro", "shiro"]);
        assert_eq!(players[1].current_team, Some("zeta"));
    }

    #[test]
    fn join_or_dash_marks_empty_lists() {
        assert_eq!(join_or_dash(Vec::<String>::new()), "-");
        assert_eq!(join_or_dash(["a", "b"]), "a, b");
    }
}
