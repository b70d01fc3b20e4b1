use crate::db::{self, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{
    BoundingBox, DefectType, GenerationReport, MeasurementType, NewDefect, NewMeasurement, NewRepair, NewScan,
    RepairStatus, ScanQuality, Severity,
};
use chrono::{Duration, NaiveDate, Utc};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::path::Path;

pub const LOCATIONS: [(&str, &str); 5] = [
    ("Gangnam-daero", "Section A"),
    ("Gangnam-daero", "Section B"),
    ("Teheran-ro", "Section C"),
    ("Seocho-daero", "Section D"),
    ("Yeongdong-daero", "Section E"),
];

// Generated scans are never graded poor.
const GENERATED_QUALITIES: [ScanQuality; 3] = [ScanQuality::Excellent, ScanQuality::Good, ScanQuality::Fair];
const LENGTH_METHODS: [&str; 2] = ["bbox", "skeleton"];
const REPAIR_TYPES: [&str; 4] = ["patching", "full_replacement", "monitoring", "urgent_repair"];
const CONTRACTORS: [&str; 3] = ["RoadTech Inc", "Seoul Infrastructure", "FastRepair Co"];

const SCAN_HISTORY_DAYS: i64 = 90;
const SCAN_INTERVAL_DAYS: i64 = 6;
const REPAIR_WINDOW_DAYS: i64 = 60;

/// Weights over (low, medium, high, critical).
const CRACK_SEVERITY_WEIGHTS: [u32; 4] = [40, 35, 20, 5];
const CAVITY_SEVERITY_WEIGHTS: [u32; 4] = [10, 30, 40, 20];
const OTHER_SEVERITY_WEIGHTS: [u32; 4] = [50, 30, 15, 5];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDataConfig {
    pub scan_count: usize,
    pub repair_count: usize,
    pub min_defects_per_scan: usize,
    pub max_defects_per_scan: usize,
}

impl Default for SampleDataConfig {
    fn default() -> Self {
        Self {
            scan_count: 15,
            repair_count: 30,
            min_defects_per_scan: 5,
            max_defects_per_scan: 15,
        }
    }
}

impl SampleDataConfig {
    fn validate(&self) -> AppResult<()> {
        if self.min_defects_per_scan > self.max_defects_per_scan {
            return Err(AppError::Config(format!(
                "min_defects_per_scan ({}) exceeds max_defects_per_scan ({})",
                self.min_defects_per_scan, self.max_defects_per_scan
            )));
        }
        Ok(())
    }
}

struct SeverityTable {
    crack: WeightedIndex<u32>,
    cavity: WeightedIndex<u32>,
    other: WeightedIndex<u32>,
}

impl SeverityTable {
    fn new() -> AppResult<Self> {
        let build = |weights: [u32; 4]| {
            WeightedIndex::new(weights).map_err(|error| AppError::Internal(format!("invalid severity weights: {}", error)))
        };
        Ok(Self {
            crack: build(CRACK_SEVERITY_WEIGHTS)?,
            cavity: build(CAVITY_SEVERITY_WEIGHTS)?,
            other: build(OTHER_SEVERITY_WEIGHTS)?,
        })
    }

    fn sample<R: Rng + ?Sized>(&self, defect_type: DefectType, rng: &mut R) -> Severity {
        let distribution = match defect_type {
            DefectType::Crack => &self.crack,
            DefectType::Cavity => &self.cavity,
            _ => &self.other,
        };
        Severity::ALL[distribution.sample(rng)]
    }
}

fn depth_range_cm(defect_type: DefectType) -> (f64, f64) {
    match defect_type {
        DefectType::Crack => (2.0, 15.0),
        DefectType::Cavity => (10.0, 50.0),
        _ => (5.0, 30.0),
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

fn pick<'a, T, R: Rng + ?Sized>(values: &'a [T], rng: &mut R) -> AppResult<&'a T> {
    values
        .choose(rng)
        .ok_or_else(|| AppError::Internal("cannot pick from an empty set".to_string()))
}

/// Fills an existing store with synthetic scans, defects, measurements and repairs.
///
/// Each table is written in its own transaction. A failure part way through leaves
/// the tables written so far in place; callers wanting a clean slate should reset
/// the schema first (see [`rebuild_sample_store`]).
pub fn populate_sample_data<R: Rng + ?Sized>(
    db: &Database,
    config: &SampleDataConfig,
    rng: &mut R,
) -> AppResult<GenerationReport> {
    config.validate()?;
    let severities = SeverityTable::new()?;
    let today = Utc::now().date_naive();

    tracing::info!(count = config.scan_count, "creating scans");
    let base_date = earliest_scan_date(today);
    let scan_ids = db.transaction(|tx| {
        let mut ids = Vec::with_capacity(config.scan_count);
        for index in 0..config.scan_count {
            let (location, section) = *pick(&LOCATIONS, rng)?;
            let scan = NewScan {
                location: location.to_string(),
                road_section: Some(section.to_string()),
                scan_date: base_date + Duration::days(index as i64 * SCAN_INTERVAL_DAYS),
                file_path: Some(format!("/data/gpr_scans/scan_{:03}.h5", index + 1)),
                total_length_m: round_to(rng.random_range(100.0..=500.0), 2),
                scan_quality: *pick(&GENERATED_QUALITIES, rng)?,
            };
            ids.push(db::insert_scan(tx, &scan)?);
        }
        Ok(ids)
    })?;

    tracing::info!(scans = scan_ids.len(), "creating defects");
    let defect_ids = db.transaction(|tx| {
        let mut ids = Vec::new();
        for &scan_id in &scan_ids {
            let count = rng.random_range(config.min_defects_per_scan..=config.max_defects_per_scan);
            for _ in 0..count {
                let defect = random_defect(scan_id, &severities, rng)?;
                ids.push(db::insert_defect(tx, &defect)?);
            }
        }
        Ok(ids)
    })?;

    tracing::info!(defects = defect_ids.len(), "creating measurements");
    let measurements = db.transaction(|tx| {
        let mut written = 0usize;
        for &defect_id in &defect_ids {
            db::insert_measurement(
                tx,
                &NewMeasurement {
                    defect_id,
                    measurement_type: MeasurementType::Length,
                    value_cm: round_to(rng.random_range(10.0..=150.0), 2),
                    calculation_method: Some(pick(&LENGTH_METHODS, rng)?.to_string()),
                },
            )?;
            db::insert_measurement(
                tx,
                &NewMeasurement {
                    defect_id,
                    measurement_type: MeasurementType::Width,
                    value_cm: round_to(rng.random_range(5.0..=50.0), 2),
                    calculation_method: Some("bbox".to_string()),
                },
            )?;
            written += 2;
        }
        Ok(written)
    })?;

    let repair_count = if defect_ids.is_empty() { 0 } else { config.repair_count };
    tracing::info!(count = repair_count, "creating repair history");
    db.transaction(|tx| {
        for _ in 0..repair_count {
            let repair = NewRepair {
                defect_id: *pick(&defect_ids, rng)?,
                repair_date: today - Duration::days(rng.random_range(0..=REPAIR_WINDOW_DAYS)),
                repair_type: pick(&REPAIR_TYPES, rng)?.to_string(),
                cost_usd: round_to(rng.random_range(500.0..=15_000.0), 2),
                contractor: pick(&CONTRACTORS, rng)?.to_string(),
                status: *pick(&RepairStatus::ALL, rng)?,
            };
            db::insert_repair(tx, &repair)?;
        }
        Ok(())
    })?;

    let report = GenerationReport {
        scans: scan_ids.len(),
        defects: defect_ids.len(),
        measurements,
        repairs: repair_count,
    };
    tracing::info!(
        scans = report.scans,
        defects = report.defects,
        measurements = report.measurements,
        repairs = report.repairs,
        "sample data generated"
    );
    Ok(report)
}

fn random_defect<R: Rng + ?Sized>(scan_id: i64, severities: &SeverityTable, rng: &mut R) -> AppResult<NewDefect> {
    let defect_type = *pick(&DefectType::ALL, rng)?;
    let (min_depth, max_depth) = depth_range_cm(defect_type);
    Ok(NewDefect {
        scan_id,
        defect_type,
        depth_cm: round_to(rng.random_range(min_depth..=max_depth), 2),
        severity: severities.sample(defect_type, rng),
        bbox: BoundingBox {
            x: rng.random_range(0..=800),
            y: rng.random_range(0..=600),
            width: rng.random_range(20..=200),
            height: rng.random_range(20..=200),
        },
        confidence: round_to(rng.random_range(0.7..=0.99), 3),
    })
}

/// Drops and recreates the schema, then fills it. Repeated runs never accumulate rows.
pub fn rebuild_sample_store<R: Rng + ?Sized>(
    db: &Database,
    config: &SampleDataConfig,
    rng: &mut R,
) -> AppResult<GenerationReport> {
    db.reset_schema()?;
    populate_sample_data(db, config, rng)
}

/// Opens the store at `path`, creating and populating it when the file is absent.
pub fn open_or_bootstrap(path: &Path, config: &SampleDataConfig) -> AppResult<(Database, Option<GenerationReport>)> {
    if path.exists() {
        return Ok((Database::open(path)?, None));
    }
    tracing::info!(path = %path.display(), "store missing; bootstrapping sample data");
    let db = Database::create_store(path)?;
    let report = populate_sample_data(&db, config, &mut rand::rng())?;
    Ok((db, Some(report)))
}

/// Earliest date a generated scan can carry, relative to `today`.
pub fn earliest_scan_date(today: NaiveDate) -> NaiveDate {
    today - Duration::days(SCAN_HISTORY_DAYS)
}

#[cfg(test)]
mod tests {
    use super::{depth_range_cm, populate_sample_data, round_to, SampleDataConfig, SeverityTable};
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{DefectType, Severity};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rounds_to_requested_places() {
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(round_to(0.98765, 3), 0.988);
    }

    #[test]
    fn depth_ranges_follow_defect_type() {
        assert_eq!(depth_range_cm(DefectType::Crack), (2.0, 15.0));
        assert_eq!(depth_range_cm(DefectType::Cavity), (10.0, 50.0));
        assert_eq!(depth_range_cm(DefectType::Manhole), (5.0, 30.0));
    }

    #[test]
    fn severity_sampling_skews_by_type() {
        let table = SeverityTable::new().expect("table");
        let mut rng = StdRng::seed_from_u64(7);
        let samples = 4_000;
        let severe = |defect_type: DefectType, rng: &mut StdRng| {
            (0..samples)
                .filter(|_| table.sample(defect_type, rng) >= Severity::High)
                .count()
        };
        let cavity_severe = severe(DefectType::Cavity, &mut rng);
        let crack_severe = severe(DefectType::Crack, &mut rng);
        assert!(cavity_severe * 2 > samples, "cavity severe = {}", cavity_severe);
        assert!(crack_severe * 2 < samples, "crack severe = {}", crack_severe);
    }

    #[test]
    fn rejects_inverted_defect_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create_store(&dir.path().join("test.db")).expect("db");
        let config = SampleDataConfig {
            min_defects_per_scan: 9,
            max_defects_per_scan: 3,
            ..SampleDataConfig::default()
        };
        let result = populate_sample_data(&db, &config, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn zero_scans_produce_no_repairs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create_store(&dir.path().join("test.db")).expect("db");
        let config = SampleDataConfig {
            scan_count: 0,
            ..SampleDataConfig::default()
        };
        let report = populate_sample_data(&db, &config, &mut StdRng::seed_from_u64(1)).expect("populate");
        assert_eq!(report.defects, 0);
        assert_eq!(report.repairs, 0);
        assert_eq!(db.count_rows("repair_history").expect("count"), 0);
    }
}
