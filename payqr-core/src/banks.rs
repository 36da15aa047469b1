//! Bank directory model and tiered bank-name resolution.
//!
//! The directory is a JSON object keyed by short bank name. Resolution turns
//! free text ("vietcombank", "MB", "Ngan hang A Chau") into the BIN used by
//! the QR payment network, trying cheap exact/substring checks before falling
//! back to fuzzy scoring.

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::fuzzy::{normalize, token_sort_ratio};

/// Minimum token-sort score (0..=100) accepted by the fuzzy pass.
pub const FUZZY_THRESHOLD: f64 = 66.0;

/// Log target used when none is injected.
pub const DEFAULT_LOG_TARGET: &str = "payqr::banks";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    /// Short alphabetic identifier, e.g. "VCB".
    #[serde(default)]
    pub code: String,
    /// Numeric routing code, e.g. "970436".
    #[serde(default)]
    pub bin: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub transfer_supported: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub lookup_supported: bool,
    #[serde(default, alias = "short_name")]
    pub short_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub support: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_transfer: bool,
    #[serde(default, alias = "swift_code")]
    pub swift_code: Option<String>,
}

impl BankRecord {
    /// Directory key: shortName, or code when shortName is absent.
    pub fn directory_key(&self) -> &str {
        match self.short_name.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => &self.code,
        }
    }
}

/// Accepts `true`/`false`, `0`/`1` (as the upstream bank list reports
/// them) or `null`.
pub fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => Ok(b),
        Some(Flag::Int(i)) => Ok(i != 0),
        None => Ok(false),
    }
}

/// Which resolution tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExactKey,
    Containment,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankMatch<'a> {
    pub key: &'a str,
    pub record: &'a BankRecord,
    pub tier: MatchTier,
    /// Candidate string that matched (key, name, code or shortName).
    pub matched: &'a str,
    /// Token-sort score; 100 for non-fuzzy tiers.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    Found(BankMatch<'a>),
    /// Fuzzy pass ran but the best candidate fell under the threshold.
    LowConfidence { candidate: &'a str, score: f64 },
    /// Nothing to compare against (empty directory).
    NoCandidates,
}

/// Ordered bank directory; iteration order is file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BankDirectory {
    entries: Vec<(String, BankRecord)>,
}

impl BankDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-key a flat bank list by shortName (falling back to code).
    /// Records without a code are skipped; a repeated key replaces the
    /// earlier record in place.
    pub fn from_records(records: impl IntoIterator<Item = BankRecord>) -> Self {
        let mut dir = Self::new();
        for record in records {
            if record.code.is_empty() {
                continue;
            }
            let key = record.directory_key().to_string();
            dir.insert(key, record);
        }
        dir
    }

    pub fn insert(&mut self, key: impl Into<String>, record: BankRecord) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = record,
            None => self.entries.push((key, record)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BankRecord)> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let map = serde_json::from_str(s).context("bank directory is not a JSON object")?;
        Self::from_map(map)
    }

    fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut dir = Self::new();
        for (key, value) in map {
            let record: BankRecord = serde_json::from_value(value)
                .with_context(|| format!("invalid bank record under key {key:?}"))?;
            dir.insert(key, record);
        }
        Ok(dir)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json_str(&s).with_context(|| format!("parse {}", path.display()))
    }

    /// Four-space indented JSON, non-ASCII left unescaped.
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut buf = Vec::new();
        let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
        self.serialize(&mut ser).context("serialize bank directory")?;
        Ok(String::from_utf8(buf)?)
    }

    /// Replace the file at `path` via a sibling temp file and rename.
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let json = self.to_json_pretty()?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    /// Tiered lookup: exact key, then containment over
    /// key/name/code/shortName, then token-sort fuzzy scoring.
    pub fn lookup(&self, query: &str) -> Lookup<'_> {
        let mut q = normalize(query);
        if q == normalize("MB") {
            // "MB" alone collides with several institutions
            q = normalize("MBBank");
        }

        for (key, record) in &self.entries {
            if normalize(key) == q {
                return Lookup::Found(BankMatch {
                    key,
                    record,
                    tier: MatchTier::ExactKey,
                    matched: key,
                    score: 100.0,
                });
            }
        }

        for (key, record) in &self.entries {
            for candidate in candidates(key, record) {
                let c = normalize(candidate);
                if c == q || c.contains(&q) {
                    return Lookup::Found(BankMatch {
                        key,
                        record,
                        tier: MatchTier::Containment,
                        matched: candidate,
                        score: 100.0,
                    });
                }
            }
        }

        self.fuzzy_lookup(&q)
    }

    fn fuzzy_lookup(&self, q: &str) -> Lookup<'_> {
        let mut seen = HashSet::new();
        let mut best: Option<(f64, &str, usize)> = None;

        for (idx, (key, record)) in self.entries.iter().enumerate() {
            for candidate in candidates(key, record) {
                let c = normalize(candidate);
                if c.is_empty() || !seen.insert(c.clone()) {
                    continue;
                }
                let score = token_sort_ratio(q, &c);
                if best.is_none_or(|(top, _, _)| score > top) {
                    best = Some((score, candidate, idx));
                }
            }
        }

        match best {
            Some((score, candidate, idx)) if score >= FUZZY_THRESHOLD => {
                let (key, record) = &self.entries[idx];
                Lookup::Found(BankMatch {
                    key,
                    record,
                    tier: MatchTier::Fuzzy,
                    matched: candidate,
                    score,
                })
            }
            Some((score, candidate, _)) => Lookup::LowConfidence { candidate, score },
            None => Lookup::NoCandidates,
        }
    }
}

fn candidates<'a>(key: &'a str, record: &'a BankRecord) -> [&'a str; 4] {
    [
        key,
        &record.name,
        &record.code,
        record.short_name.as_deref().unwrap_or(""),
    ]
}

impl Serialize for BankDirectory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, record) in &self.entries {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

/// Resolves bank names against a directory file, re-reading it on every call.
#[derive(Debug, Clone)]
pub struct BankResolver {
    path: PathBuf,
    log_target: String,
}

impl BankResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_log_target(path, DEFAULT_LOG_TARGET)
    }

    pub fn with_log_target(path: impl Into<PathBuf>, log_target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            log_target: log_target.into(),
        }
    }

    /// Routing code (BIN) for `query`, or `None` when nothing matches
    /// confidently or the directory cannot be read.
    pub fn resolve(&self, query: &str) -> Option<String> {
        let target = self.log_target.as_str();
        let directory = match BankDirectory::load(&self.path) {
            Ok(d) => d,
            Err(e) => {
                error!(target: target, "bank directory unavailable: {e:#}");
                return None;
            }
        };

        match directory.lookup(query) {
            Lookup::Found(m) => {
                info!(
                    target: target,
                    "{:?} match for {query:?}: {:?} (key {}, score {:.1})",
                    m.tier, m.matched, m.key, m.score
                );
                if m.record.bin.is_empty() {
                    warn!(target: target, "bank {} has no BIN", m.key);
                    return None;
                }
                Some(m.record.bin.clone())
            }
            Lookup::LowConfidence { candidate, score } => {
                warn!(
                    target: target,
                    "low confidence match for {query:?}: {candidate:?} ({score:.1})"
                );
                None
            }
            Lookup::NoCandidates => {
                warn!(target: target, "no match found for {query:?}");
                None
            }
        }
    }
}
