//! Record store backed by the three YAML files of a data directory.
//!
//! The store only parses. Content problems are left to the validators;
//! a [`LoadError`] means a file is missing, unreadable or not YAML at all.
//! Every `load_*` call reads the files again, so edits between runs (or
//! between calls of a long-lived host) are always picked up.

use std::fs;
use std::path::{Path, PathBuf};

use roster_history_core::{
    players_from_document, rosters_from_document, teams_from_document, Collection, Player,
    RecordDocuments, RosterSnapshot, Team, TeamRoster,
};
use serde_json::Value;

pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {} as YAML: {source}", .path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl LoadError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Syntax { path, .. } => path,
        }
    }
}

/// Locations of the three record files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPaths {
    pub team: PathBuf,
    pub member: PathBuf,
    pub roster: PathBuf,
}

impl RecordPaths {
    /// Conventional file names inside `data_dir`.
    #[must_use]
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            team: data_dir.join(Collection::Team.file_name()),
            member: data_dir.join(Collection::Member.file_name()),
            roster: data_dir.join(Collection::Roster.file_name()),
        }
    }

    #[must_use]
    pub fn get(&self, collection: Collection) -> &Path {
        match collection {
            Collection::Team => &self.team,
            Collection::Member => &self.member,
            Collection::Roster => &self.roster,
        }
    }
}

/// Parsed documents and the snapshot derived from them, for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecords {
    pub documents: RecordDocuments,
    pub snapshot: RosterSnapshot,
}

#[derive(Debug, Clone)]
pub struct YamlRecordStore {
    paths: RecordPaths,
}

impl YamlRecordStore {
    #[must_use]
    pub fn open(data_dir: &Path) -> Self {
        Self::with_paths(RecordPaths::in_dir(data_dir))
    }

    #[must_use]
    pub fn with_paths(paths: RecordPaths) -> Self {
        Self { paths }
    }

    #[must_use]
    pub fn paths(&self) -> &RecordPaths {
        &self.paths
    }

    /// Reads and parses one collection file.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the file cannot be read or is not valid YAML.
    pub fn load_document(&self, collection: Collection) -> Result<Value, LoadError> {
        let path = self.paths.get(collection);
        let text = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document = parse_yaml_document(path, &text)?;
        tracing::debug!(
            collection = collection.as_str(),
            path = %path.display(),
            bytes = text.len(),
            "loaded record file"
        );
        Ok(document)
    }

    /// Reads all three collection files.
    ///
    /// # Errors
    /// Returns the first [`LoadError`] encountered.
    pub fn load_documents(&self) -> Result<RecordDocuments, LoadError> {
        Ok(RecordDocuments {
            team: self.load_document(Collection::Team)?,
            member: self.load_document(Collection::Member)?,
            roster: self.load_document(Collection::Roster)?,
        })
    }

    /// Reads all files and builds the run snapshot.
    ///
    /// # Errors
    /// Returns [`LoadError`] when any file cannot be read or parsed.
    pub fn load(&self) -> Result<LoadedRecords, LoadError> {
        let documents = self.load_documents()?;
        let snapshot = RosterSnapshot::from_documents(&documents);
        Ok(LoadedRecords {
            documents,
            snapshot,
        })
    }

    /// # Errors
    /// Returns [`LoadError`] when any file cannot be read or parsed.
    pub fn load_snapshot(&self) -> Result<RosterSnapshot, LoadError> {
        Ok(self.load()?.snapshot)
    }

    /// # Errors
    /// Returns [`LoadError`] when `team.yaml` cannot be read or parsed.
    pub fn load_teams(&self) -> Result<Vec<Team>, LoadError> {
        Ok(teams_from_document(&self.load_document(Collection::Team)?))
    }

    /// # Errors
    /// Returns [`LoadError`] when `member.yaml` cannot be read or parsed.
    pub fn load_players(&self) -> Result<Vec<Player>, LoadError> {
        Ok(players_from_document(
            &self.load_document(Collection::Member)?,
        ))
    }

    /// # Errors
    /// Returns [`LoadError`] when `roster.yaml` cannot be read or parsed.
    pub fn load_roster_events(&self) -> Result<Vec<TeamRoster>, LoadError> {
        Ok(rosters_from_document(
            &self.load_document(Collection::Roster)?,
        ))
    }
}

/// Parses YAML text into a JSON value, keeping mapping key order.
///
/// # Errors
/// Returns [`LoadError::Syntax`] when `text` is not valid YAML.
pub fn parse_yaml_document(path: &Path, text: &str) -> Result<Value, LoadError> {
    serde_yaml::from_str(text).map_err(|source| LoadError::Syntax {
        path: path.to_path_buf(),
        source,
    })
}
