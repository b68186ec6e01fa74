//! Burn correlation for tokens the registry does not know (yet).
//!
//! Burns often arrive before the pair-creation event that onboards their
//! token. Those burns are parked in an unknown-token table with provisional
//! buckets. A periodic sweep replays them into the real series once the token
//! is registered; ids that keep burning without ever being onboarded are moved
//! to a blacklist, which is persisted to a small CSV file (`id,last_hit_secs`).
//!
//! Both tables live behind a single lock and are only reachable through the
//! operations below. No token lock is ever taken while it is held.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

use super::registry::TokenRegistry;
use crate::config::BlacklistSettings;
use crate::models::{BurnEvent, BurnLedger};

/// Burns seen for an id that is neither registered nor blacklisted.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownTokenRecord {
    pub token_id: String,
    pub hits: u32,
    /// Unix seconds of the first burn
    pub first_seen: i64,
    pub last_hit: i64,
    pub burns: BurnLedger,
}

impl UnknownTokenRecord {
    fn new(token_id: &str, now: i64) -> Self {
        Self {
            token_id: token_id.to_string(),
            hits: 0,
            first_seen: now,
            last_hit: now,
            burns: BurnLedger::default(),
        }
    }
}

/// What happened to a burn for an unregistered id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownOutcome {
    Tracked { hits: u32 },
    /// This burn pushed the id over the promotion thresholds.
    Promoted { hits: u32 },
    /// Already blacklisted; only the timestamp moved.
    Refreshed,
}

#[derive(Debug, Default)]
struct CorrelationTables {
    unknown: FxHashMap<String, UnknownTokenRecord>,
    blacklist: FxHashMap<String, i64>,
}

pub struct BurnCorrelator {
    tables: Mutex<CorrelationTables>,
    registry: Arc<TokenRegistry>,
    settings: BlacklistSettings,
}

impl BurnCorrelator {
    pub fn new(registry: Arc<TokenRegistry>, settings: BlacklistSettings) -> Self {
        Self {
            tables: Mutex::new(CorrelationTables::default()),
            registry,
            settings,
        }
    }

    pub fn file_path(&self) -> &Path {
        Path::new(&self.settings.file_path)
    }

    pub async fn is_blacklisted(&self, id: &str) -> bool {
        self.tables.lock().await.blacklist.contains_key(id)
    }

    /// Refresh a blacklisted id's last-hit time. False if it is not blacklisted.
    pub async fn touch_blacklisted(&self, id: &str, now: i64) -> bool {
        match self.tables.lock().await.blacklist.get_mut(id) {
            Some(last_hit) => {
                *last_hit = now;
                true
            },
            None => false,
        }
    }

    /// Count a burn against an unregistered id and fold it into its provisional buckets.
    pub async fn track_unknown(&self, event: &BurnEvent, now: i64, interval: i64) -> UnknownOutcome {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let id = event.token.as_str();

        if let Some(last_hit) = tables.blacklist.get_mut(id) {
            *last_hit = now;
            return UnknownOutcome::Refreshed;
        }

        let record = tables
            .unknown
            .entry(id.to_string())
            .or_insert_with(|| UnknownTokenRecord::new(id, now));
        record.hits += 1;
        record.last_hit = now;
        record
            .burns
            .record(&event.amount, event.block_time_secs(), interval);

        let hits = record.hits;
        if self.promote_if_due(tables, id, now) {
            return UnknownOutcome::Promoted { hits };
        }

        UnknownOutcome::Tracked { hits }
    }

    /// Move `id` from the unknown table to the blacklist once it has enough
    /// hits over enough time.
    fn promote_if_due(&self, tables: &mut CorrelationTables, id: &str, now: i64) -> bool {
        let Some(record) = tables.unknown.get(id) else {
            return false;
        };
        let hits = record.hits;
        let age = now - record.first_seen;
        if hits < self.settings.promotion_hits || age < self.settings.promotion_min_age_secs as i64 {
            return false;
        }

        tables.unknown.remove(id);
        tables.blacklist.insert(id.to_string(), now);
        info!("Blacklisted {} after {} unmatched burns over {}s", id, hits, age);
        true
    }

    /// Drain every unknown record whose token is now registered.
    ///
    /// The caller replays the returned buckets into the token; the records are
    /// gone from the table once this returns.
    pub async fn take_matched(&self) -> Vec<UnknownTokenRecord> {
        let mut tables = self.tables.lock().await;

        let matched: Vec<String> = tables
            .unknown
            .keys()
            .filter(|id| self.registry.contains(id))
            .cloned()
            .collect();

        matched
            .iter()
            .filter_map(|id| tables.unknown.remove(id))
            .collect()
    }

    /// Put back a drained record whose token disappeared before it could be applied.
    ///
    /// Merged hit counts go through the same promotion check as a live burn,
    /// stamped with the record's last hit.
    pub async fn restore(&self, record: UnknownTokenRecord, interval: i64) {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let id = record.token_id.clone();

        let last_hit = match tables.unknown.get_mut(&id) {
            Some(existing) => {
                existing.hits += record.hits;
                existing.first_seen = existing.first_seen.min(record.first_seen);
                existing.last_hit = existing.last_hit.max(record.last_hit);
                let mut merged = record.burns;
                merged.merge_from(&existing.burns, interval);
                existing.burns = merged;
                existing.last_hit
            },
            None => {
                let last_hit = record.last_hit;
                tables.unknown.insert(id.clone(), record);
                last_hit
            },
        };

        self.promote_if_due(tables, &id, last_hit);
    }

    /// Drop the blacklist entry of a token that just got onboarded.
    pub async fn forget(&self, id: &str) -> bool {
        let removed = self.tables.lock().await.blacklist.remove(id).is_some();
        if removed {
            info!("Removed {} from blacklist after onboarding", id);
        }
        removed
    }

    /// Expire blacklist entries and idle unknown records.
    ///
    /// Returns `(blacklist_removed, unknown_removed)`.
    pub async fn cleanup(&self, now: i64) -> (usize, usize) {
        let expiry = self.settings.expiry_secs as i64;
        let unknown_ttl = self.settings.unknown_ttl_secs as i64;
        let mut tables = self.tables.lock().await;

        let blacklist_before = tables.blacklist.len();
        tables.blacklist.retain(|_, last_hit| now - *last_hit < expiry);

        let unknown_before = tables.unknown.len();
        tables.unknown.retain(|_, record| now - record.last_hit < unknown_ttl);

        (
            blacklist_before - tables.blacklist.len(),
            unknown_before - tables.unknown.len(),
        )
    }

    /// Write the blacklist to `path` through a temp file and a rename.
    pub async fn backup_to(&self, path: &Path) -> Result<usize> {
        let (contents, count) = {
            let tables = self.tables.lock().await;
            let mut out = String::with_capacity(tables.blacklist.len() * 56);
            for (id, last_hit) in &tables.blacklist {
                out.push_str(id);
                out.push(',');
                out.push_str(&last_hit.to_string());
                out.push('\n');
            }
            (out, tables.blacklist.len())
        };

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(count)
    }

    /// Merge the persisted blacklist into memory.
    ///
    /// Newer timestamps win. Expired entries and registered ids are skipped;
    /// a reloaded id loses any unknown record it had. A missing file is not an
    /// error. Returns how many entries were merged.
    pub async fn reload_from(&self, path: &Path, now: i64) -> Result<usize> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No blacklist file at {}", path.display());
                return Ok(0);
            },
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            },
        };

        let entries = parse_blacklist(&contents);
        let expiry = self.settings.expiry_secs as i64;
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let mut merged = 0;

        for (id, last_hit) in entries {
            if now - last_hit >= expiry || self.registry.contains(&id) {
                continue;
            }
            tables.unknown.remove(&id);
            let current = tables.blacklist.entry(id).or_insert(last_hit);
            *current = (*current).max(last_hit);
            merged += 1;
        }

        Ok(merged)
    }

    pub async fn blacklisted_at(&self, id: &str) -> Option<i64> {
        self.tables.lock().await.blacklist.get(id).copied()
    }

    pub async fn unknown_record(&self, id: &str) -> Option<UnknownTokenRecord> {
        self.tables.lock().await.unknown.get(id).cloned()
    }

    /// `(unknown, blacklisted)` table sizes.
    pub async fn sizes(&self) -> (usize, usize) {
        let tables = self.tables.lock().await;
        (tables.unknown.len(), tables.blacklist.len())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn parse_blacklist(contents: &str) -> Vec<(String, i64)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let parsed = line
                .split_once(',')
                .and_then(|(id, ts)| Some((id.trim(), ts.trim().parse::<i64>().ok()?)))
                .filter(|(id, _)| !id.is_empty());
            if parsed.is_none() {
                warn!("Skipping malformed blacklist line: {}", line);
            }
            parsed.map(|(id, ts)| (id.to_string(), ts))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BurnBucket, TokenAggregate};
    use bigdecimal::BigDecimal;

    const INTERVAL: i64 = 60;

    fn burn(token: &str, amount: i64, block_time: f64) -> BurnEvent {
        BurnEvent {
            token: token.to_string(),
            account: "Account".to_string(),
            authority: "Authority".to_string(),
            amount: BigDecimal::from(amount),
            block_time,
        }
    }

    fn correlator() -> (Arc<TokenRegistry>, BurnCorrelator) {
        let registry = Arc::new(TokenRegistry::new());
        let correlator = BurnCorrelator::new(registry.clone(), BlacklistSettings::default());
        (registry, correlator)
    }

    #[tokio::test]
    async fn test_hits_increment_once_per_burn() {
        let (_, correlator) = correlator();

        for i in 1..=3 {
            let outcome = correlator.track_unknown(&burn("X", 1, 0.0), 1_000, INTERVAL).await;
            assert_eq!(outcome, UnknownOutcome::Tracked { hits: i });
        }

        let record = correlator.unknown_record("X").await.unwrap();
        assert_eq!(record.hits, 3);
        assert_eq!(record.first_seen, 1_000);
    }

    #[tokio::test]
    async fn test_provisional_buckets_follow_burn_rule() {
        let (registry, correlator) = correlator();

        correlator.track_unknown(&burn("X", 10, 0.0), 1_000, INTERVAL).await;
        correlator.track_unknown(&burn("X", 5, 30.0), 1_001, INTERVAL).await;
        correlator.track_unknown(&burn("X", 3, 65.0), 1_002, INTERVAL).await;

        let record = correlator.unknown_record("X").await.unwrap();
        assert_eq!(
            record.burns.buckets().as_slice(),
            &[
                BurnBucket { start_time: 0, amount_burned: BigDecimal::from(15) },
                BurnBucket { start_time: 65, amount_burned: BigDecimal::from(3) },
            ]
        );
        assert_eq!(record.burns.total_burned(), &BigDecimal::from(18));

        // Token gets onboarded; the sweep hands the record over exactly once
        registry.put(TokenAggregate::new("X"));
        let matched = correlator.take_matched().await;
        assert_eq!(matched.len(), 1);
        assert!(correlator.take_matched().await.is_empty());
        assert!(correlator.unknown_record("X").await.is_none());

        let mut token = TokenAggregate::new("X");
        let closed = token.burns.merge_from(&matched[0].burns, INTERVAL);
        assert_eq!(closed, vec![BurnBucket { start_time: 0, amount_burned: BigDecimal::from(15) }]);
        assert_eq!(token.burns, record.burns);
    }

    #[tokio::test]
    async fn test_promotion_requires_hits_and_age() {
        let (_, correlator) = correlator();

        // Five hits inside the minimum age stay unknown
        for i in 0..5 {
            let outcome = correlator.track_unknown(&burn("X", 1, 0.0), 1_000 + i, INTERVAL).await;
            assert!(matches!(outcome, UnknownOutcome::Tracked { .. }));
        }
        assert!(!correlator.is_blacklisted("X").await);

        let outcome = correlator.track_unknown(&burn("X", 1, 0.0), 1_300, INTERVAL).await;
        assert_eq!(outcome, UnknownOutcome::Promoted { hits: 6 });
        assert_eq!(correlator.blacklisted_at("X").await, Some(1_300));
        assert!(correlator.unknown_record("X").await.is_none());
    }

    #[tokio::test]
    async fn test_old_record_with_few_hits_is_not_promoted() {
        let (_, correlator) = correlator();

        correlator.track_unknown(&burn("X", 1, 0.0), 0, INTERVAL).await;
        let outcome = correlator.track_unknown(&burn("X", 1, 0.0), 10_000, INTERVAL).await;

        assert_eq!(outcome, UnknownOutcome::Tracked { hits: 2 });
        assert!(!correlator.is_blacklisted("X").await);
    }

    #[tokio::test]
    async fn test_blacklisted_burns_only_refresh_timestamp() {
        let (_, correlator) = correlator();
        for i in 0..5 {
            correlator.track_unknown(&burn("X", 1, 0.0), i * 100, INTERVAL).await;
        }
        assert_eq!(correlator.blacklisted_at("X").await, Some(400));

        let outcome = correlator.track_unknown(&burn("X", 7, 0.0), 450, INTERVAL).await;
        assert_eq!(outcome, UnknownOutcome::Refreshed);
        assert!(correlator.touch_blacklisted("X", 460).await);
        assert_eq!(correlator.blacklisted_at("X").await, Some(460));
        assert!(correlator.unknown_record("X").await.is_none());
        assert!(!correlator.touch_blacklisted("Y", 460).await);
    }

    #[tokio::test]
    async fn test_cleanup_expires_blacklist_and_idle_unknowns() {
        let (_, correlator) = correlator();
        for i in 0..5 {
            correlator.track_unknown(&burn("X", 1, 0.0), i * 100, INTERVAL).await;
        }
        correlator.track_unknown(&burn("Y", 1, 0.0), 400, INTERVAL).await;

        // Entry touched at 400: still live at 699, gone at 700
        assert_eq!(correlator.cleanup(699).await, (0, 0));
        assert_eq!(correlator.cleanup(700).await, (1, 0));
        assert!(!correlator.is_blacklisted("X").await);

        assert_eq!(correlator.cleanup(400 + 3_600).await, (0, 1));
        assert_eq!(correlator.sizes().await, (0, 0));

        // After expiry the id starts over from zero hits
        let outcome = correlator.track_unknown(&burn("X", 1, 0.0), 5_000, INTERVAL).await;
        assert_eq!(outcome, UnknownOutcome::Tracked { hits: 1 });
    }

    #[tokio::test]
    async fn test_forget_removes_blacklist_entry() {
        let (_, correlator) = correlator();
        for i in 0..5 {
            correlator.track_unknown(&burn("X", 1, 0.0), i * 100, INTERVAL).await;
        }

        assert!(correlator.forget("X").await);
        assert!(!correlator.forget("X").await);
        assert!(!correlator.is_blacklisted("X").await);
    }

    #[tokio::test]
    async fn test_restore_puts_record_back() {
        let (registry, correlator) = correlator();
        correlator.track_unknown(&burn("X", 4, 0.0), 1_000, INTERVAL).await;
        registry.put(TokenAggregate::new("X"));

        let mut matched = correlator.take_matched().await;
        registry.remove("X");
        correlator.track_unknown(&burn("X", 2, 10.0), 1_010, INTERVAL).await;
        correlator.restore(matched.remove(0), INTERVAL).await;

        let record = correlator.unknown_record("X").await.unwrap();
        assert_eq!(record.hits, 2);
        assert_eq!(record.first_seen, 1_000);
        assert_eq!(record.burns.total_burned(), &BigDecimal::from(6));
    }

    #[tokio::test]
    async fn test_restore_promotes_when_merged_hits_cross_thresholds() {
        let (registry, correlator) = correlator();
        for t in [1_000, 1_100, 1_200] {
            correlator.track_unknown(&burn("X", 1, 0.0), t, INTERVAL).await;
        }
        registry.put(TokenAggregate::new("X"));
        let mut matched = correlator.take_matched().await;
        registry.remove("X");

        for t in [1_300, 1_400] {
            let outcome = correlator.track_unknown(&burn("X", 1, 0.0), t, INTERVAL).await;
            assert!(matches!(outcome, UnknownOutcome::Tracked { .. }));
        }
        correlator.restore(matched.remove(0), INTERVAL).await;

        assert_eq!(correlator.blacklisted_at("X").await, Some(1_400));
        assert!(correlator.unknown_record("X").await.is_none());
    }

    #[tokio::test]
    async fn test_backup_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.csv");

        let (_, source) = correlator();
        for i in 0..5 {
            source.track_unknown(&burn("X", 1, 0.0), 1_000 + i * 100, INTERVAL).await;
        }
        assert_eq!(source.backup_to(&path).await.unwrap(), 1);
        assert!(!temp_path(&path).exists());

        let (registry, target) = correlator();
        target.track_unknown(&burn("X", 1, 0.0), 1_450, INTERVAL).await;
        registry.put(TokenAggregate::new("Z"));
        tokio::fs::write(
            &path,
            "X,1400\nY,100\nZ,1450\ngarbage\n,5\nW,notanumber\n",
        )
        .await
        .unwrap();

        // Y is expired, Z is registered, three lines are malformed
        assert_eq!(target.reload_from(&path, 1_500).await.unwrap(), 1);
        assert_eq!(target.blacklisted_at("X").await, Some(1_400));
        assert!(target.unknown_record("X").await.is_none());
        assert!(!target.is_blacklisted("Y").await);
        assert!(!target.is_blacklisted("Z").await);
    }

    #[tokio::test]
    async fn test_reload_keeps_newer_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.csv");
        let (_, correlator) = correlator();
        for i in 0..5 {
            correlator.track_unknown(&burn("X", 1, 0.0), 1_000 + i * 100, INTERVAL).await;
        }

        tokio::fs::write(&path, "X,1200\n").await.unwrap();
        correlator.reload_from(&path, 1_450).await.unwrap();
        assert_eq!(correlator.blacklisted_at("X").await, Some(1_400));
    }

    #[tokio::test]
    async fn test_reload_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (_, correlator) = correlator();

        let merged = correlator
            .reload_from(&dir.path().join("absent.csv"), 0)
            .await
            .unwrap();
        assert_eq!(merged, 0);
    }
}
