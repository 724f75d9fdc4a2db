/*
 * Delta transaction log replay.
 *
 * The live file set is rebuilt from the newest complete checkpoint, then
 * every later JSON commit is applied in version order: `add` actions
 * insert a path, `remove` actions drop it.
 */

use async_trait::async_trait;
use bytes::Bytes;
use lakeaudit_common::{AuditError, OperatorRegistry, Result, TableDescriptor};
use opendal::{ErrorKind, Operator};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use super::ManifestReader;
use crate::path::file_name;

const DELTA_LOG_DIR: &str = "_delta_log/";
const LAST_CHECKPOINT_FILE: &str = "_last_checkpoint";

fn manifest_err(context: &str, e: impl std::fmt::Display) -> AuditError {
    AuditError::ManifestRead(format!("{}: {}", context, e))
}

/// Contents of `_delta_log/_last_checkpoint`.
#[derive(Debug, Deserialize)]
struct LastCheckpoint {
    version: i64,
    #[serde(default)]
    parts: Option<u32>,
}

/// One line of a commit file. Action kinds other than add/remove are ignored.
#[derive(Debug, Deserialize)]
struct Action {
    add: Option<FileAction>,
    remove: Option<FileAction>,
}

#[derive(Debug, Deserialize)]
struct FileAction {
    path: String,
}

/// A recognised file in the log directory.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogFile {
    Commit { version: i64 },
    Checkpoint { version: i64, part: u32, parts: u32 },
}

/// Parses `<v:020>.json`, `<v:020>.checkpoint.parquet` and
/// `<v:020>.checkpoint.<i:010>.<n:010>.parquet`.
fn parse_log_file(name: &str) -> Option<LogFile> {
    let (stem, rest) = name.split_once('.')?;
    if stem.len() != 20 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = stem.parse().ok()?;

    if rest == "json" {
        return Some(LogFile::Commit { version });
    }
    if rest == "checkpoint.parquet" {
        return Some(LogFile::Checkpoint {
            version,
            part: 1,
            parts: 1,
        });
    }

    let (part, parts) = rest
        .strip_prefix("checkpoint.")?
        .strip_suffix(".parquet")?
        .split_once('.')?;
    Some(LogFile::Checkpoint {
        version,
        part: part.parse().ok()?,
        parts: parts.parse().ok()?,
    })
}

/// Checkpoint files for one version, keyed by part number.
#[derive(Debug, Default)]
struct CheckpointParts {
    expected: u32,
    paths: BTreeMap<u32, String>,
}

impl CheckpointParts {
    fn is_complete(&self) -> bool {
        self.expected > 0 && self.paths.len() == self.expected as usize
    }
}

/// What the log directory listing contains.
#[derive(Debug, Default)]
struct LogListing {
    commits: BTreeMap<i64, String>,
    checkpoints: BTreeMap<i64, CheckpointParts>,
}

impl LogListing {
    fn from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut listing = LogListing::default();
        for path in paths {
            match parse_log_file(file_name(path)) {
                Some(LogFile::Commit { version }) => {
                    listing.commits.insert(version, path.to_string());
                }
                Some(LogFile::Checkpoint {
                    version,
                    part,
                    parts,
                }) => {
                    let entry = listing.checkpoints.entry(version).or_default();
                    entry.expected = parts;
                    entry.paths.insert(part, path.to_string());
                }
                None => {}
            }
        }
        listing
    }

    /// Picks the checkpoint to start from: the hinted one when complete,
    /// otherwise the newest complete checkpoint.
    fn starting_checkpoint(&self, hint: Option<&LastCheckpoint>) -> Option<(i64, Vec<String>)> {
        let hinted = hint.and_then(|h| {
            self.checkpoints
                .get(&h.version)
                .filter(|c| c.is_complete() && h.parts.is_none_or(|n| n == c.expected))
                .map(|c| (h.version, c))
        });

        hinted
            .or_else(|| {
                self.checkpoints
                    .iter()
                    .rev()
                    .find(|(_, c)| c.is_complete())
                    .map(|(v, c)| (*v, c))
            })
            .map(|(version, parts)| (version, parts.paths.values().cloned().collect()))
    }
}

/// Extracts every non-null `add.path` from a checkpoint file.
fn checkpoint_add_paths(data: Bytes, live: &mut BTreeSet<String>) -> Result<()> {
    let reader = SerializedFileReader::new(data).map_err(|e| manifest_err("opening checkpoint", e))?;
    let rows = reader
        .get_row_iter(None)
        .map_err(|e| manifest_err("reading checkpoint", e))?;

    for row in rows {
        let row = row.map_err(|e| manifest_err("reading checkpoint row", e))?;
        for (name, field) in row.get_column_iter() {
            let Field::Group(add) = field else { continue };
            if name != "add" {
                continue;
            }
            let path = add
                .get_column_iter()
                .find(|(column, _)| column.as_str() == "path");
            if let Some((_, Field::Str(path))) = path {
                live.insert(path.clone());
            }
        }
    }
    Ok(())
}

/// Applies one newline-delimited commit file to the live set.
fn apply_commit(data: &[u8], live: &mut BTreeSet<String>) -> Result<()> {
    for action in serde_json::Deserializer::from_slice(data).into_iter::<Action>() {
        let action = action.map_err(|e| manifest_err("parsing commit", e))?;
        if let Some(add) = action.add {
            live.insert(add.path);
        }
        if let Some(remove) = action.remove {
            live.remove(&remove.path);
        }
    }
    Ok(())
}

/// Reads live files from a Delta table's `_delta_log`.
pub struct DeltaLogReader {
    operators: Arc<OperatorRegistry>,
}

impl DeltaLogReader {
    pub fn new(operators: Arc<OperatorRegistry>) -> Self {
        Self { operators }
    }

    async fn read(op: &Operator, path: &str) -> Result<Bytes> {
        op.read(path)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(|e| manifest_err(path, e))
    }

    async fn read_last_checkpoint(op: &Operator, log_dir: &str) -> Result<Option<LastCheckpoint>> {
        let path = format!("{}{}", log_dir, LAST_CHECKPOINT_FILE);
        match op.read(&path).await {
            Ok(buf) => serde_json::from_slice(&buf.to_bytes())
                .map(Some)
                .map_err(|e| manifest_err(&path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(manifest_err(&path, e)),
        }
    }
}

#[async_trait]
impl ManifestReader for DeltaLogReader {
    async fn live_files(&self, table: &TableDescriptor) -> Result<Vec<String>> {
        let op = self.operators.operator(table.bucket())?;
        let log_dir = format!("{}{}", table.listing_prefix(), DELTA_LOG_DIR);

        let entries = op
            .list(&log_dir)
            .await
            .map_err(|e| manifest_err(&log_dir, e))?;
        let listing = LogListing::from_paths(entries.iter().map(|e| e.path()));
        let hint = Self::read_last_checkpoint(&op, &log_dir).await?;

        let mut live = BTreeSet::new();
        let start = listing.starting_checkpoint(hint.as_ref());
        let checkpoint_version = match start {
            Some((version, parts)) => {
                for part in &parts {
                    checkpoint_add_paths(Self::read(&op, part).await?, &mut live)?;
                }
                debug!(table = %table, version, files = live.len(), "Loaded checkpoint");
                version
            }
            None => -1,
        };

        let pending: Vec<(&i64, &String)> = listing.commits.range(checkpoint_version + 1..).collect();
        if checkpoint_version < 0 && pending.is_empty() {
            return Err(AuditError::ManifestRead(format!(
                "no Delta transaction log found under {}",
                log_dir
            )));
        }

        for (version, path) in pending {
            apply_commit(&Self::read(&op, path).await?, &mut live)?;
            debug!(table = %table, version, files = live.len(), "Applied commit");
        }

        Ok(live.into_iter().collect())
    }
}
