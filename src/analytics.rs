use crate::db::{parse_label, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Dashboard, DefectType, DistributionRow, LocationStats, Severity, SummaryStats};
use chrono::Utc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

pub fn summary_stats(db: &Database) -> AppResult<SummaryStats> {
    db.with_connection(|conn| {
        let stats = conn.query_row(
            "SELECT
               (SELECT COUNT(*) FROM scans),
               (SELECT COUNT(*) FROM defects),
               (SELECT COUNT(*) FROM defects WHERE severity = 'critical'),
               (SELECT COUNT(*) FROM repair_history WHERE status IN ('planned', 'in_progress'))",
            [],
            |row| {
                Ok(SummaryStats {
                    total_scans: row.get(0)?,
                    total_defects: row.get(1)?,
                    critical_defects: row.get(2)?,
                    pending_repairs: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    })
}

/// Defect counts per (type, severity) pair, the input of the hierarchical chart.
pub fn defect_distribution(db: &Database) -> AppResult<Vec<DistributionRow>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT defect_type, severity, COUNT(*) AS count
             FROM defects
             GROUP BY defect_type, severity",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DistributionRow {
                defect_type: parse_label(&row.get::<_, String>(0)?, 0, DefectType::parse)?,
                severity: parse_label(&row.get::<_, String>(1)?, 1, Severity::parse)?,
                count: row.get(2)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        result.sort_by(|a, b| (a.defect_type, a.severity).cmp(&(b.defect_type, b.severity)));
        Ok(result)
    })
}

pub fn location_stats(db: &Database) -> AppResult<Vec<LocationStats>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT
               s.location,
               COUNT(*) AS defect_count,
               AVG(d.depth_cm) AS avg_depth,
               SUM(CASE WHEN d.severity = 'critical' THEN 1 ELSE 0 END) AS critical_count
             FROM defects d
             JOIN scans s ON d.scan_id = s.scan_id
             GROUP BY s.location
             ORDER BY defect_count DESC, s.location ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LocationStats {
                location: row.get(0)?,
                defect_count: row.get(1)?,
                avg_depth: row.get(2)?,
                critical_count: row.get(3)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    })
}

pub fn dashboard(db: &Database) -> AppResult<Dashboard> {
    Ok(Dashboard {
        summary: summary_stats(db)?,
        distribution: defect_distribution(db)?,
        locations: location_stats(db)?,
        computed_at: Utc::now(),
    })
}

/// Holds the last computed dashboard for at most `ttl`.
#[derive(Debug)]
pub struct AnalyticsCache {
    ttl: Duration,
    entry: Mutex<Option<(Instant, Dashboard)>>,
}

impl Default for AnalyticsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl AnalyticsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn dashboard(&self, db: &Database) -> AppResult<Dashboard> {
        let mut entry = self
            .entry
            .lock()
            .map_err(|_| AppError::Internal("analytics cache mutex poisoned".to_string()))?;
        if let Some((stored_at, cached)) = entry.as_ref() {
            if stored_at.elapsed() < self.ttl {
                return Ok(cached.clone());
            }
        }

        let fresh = dashboard(db)?;
        tracing::debug!(
            total_defects = fresh.summary.total_defects,
            locations = fresh.locations.len(),
            "dashboard recomputed"
        );
        *entry = Some((Instant::now(), fresh.clone()));
        Ok(fresh)
    }
}
