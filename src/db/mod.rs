use crate::errors::{AppError, AppResult};
use crate::models::{
    BoundingBox, DefectRecord, DefectType, MeasurementRecord, MeasurementType, NewDefect, NewMeasurement,
    NewRepair, NewScan, RepairRecord, RepairStatus, ScanQuality, ScanRecord, Severity,
};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

// Children first so foreign keys never dangle mid-reset.
const DROP_SQL: &str = "
DROP TABLE IF EXISTS repair_history;
DROP TABLE IF EXISTS measurements;
DROP TABLE IF EXISTS defects;
DROP TABLE IF EXISTS scans;
";

pub const TABLES: [&str; 4] = ["scans", "defects", "measurements", "repair_history"];

const SAMPLE_ROWS_PER_TABLE: usize = 3;

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    /// Opens the store, creating missing tables but leaving existing rows alone.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Opens the store and replaces any prior schema instance. Destructive.
    pub fn create_store(path: &Path) -> AppResult<Self> {
        let db = Self::open(path)?;
        db.reset_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn reset_schema(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(DROP_SQL)?;
        conn.execute_batch(SCHEMA_SQL)?;
        tracing::info!(path = %self.db_path.display(), "gpr schema reset");
        Ok(())
    }

    /// Runs `work` inside one transaction; rolled back if it returns an error.
    pub fn transaction<T>(&self, work: impl FnOnce(&Transaction<'_>) -> AppResult<T>) -> AppResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn with_connection<T>(&self, work: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let conn = self.lock()?;
        work(&conn)
    }

    pub fn insert_scan(&self, scan: &NewScan) -> AppResult<i64> {
        let conn = self.lock()?;
        insert_scan(&conn, scan)
    }

    pub fn insert_defect(&self, defect: &NewDefect) -> AppResult<i64> {
        let conn = self.lock()?;
        insert_defect(&conn, defect)
    }

    pub fn insert_measurement(&self, measurement: &NewMeasurement) -> AppResult<i64> {
        let conn = self.lock()?;
        insert_measurement(&conn, measurement)
    }

    pub fn insert_repair(&self, repair: &NewRepair) -> AppResult<i64> {
        let conn = self.lock()?;
        insert_repair(&conn, repair)
    }

    pub fn count_rows(&self, table: &str) -> AppResult<i64> {
        if !TABLES.contains(&table) {
            return Err(AppError::NotFound(format!("Unknown table '{}'", table)));
        }
        let conn = self.lock()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn list_scans(&self) -> AppResult<Vec<ScanRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT scan_id, location, road_section, scan_date, file_path, total_length_m, scan_quality
             FROM scans ORDER BY scan_id ASC",
        )?;
        let rows = stmt.query_map([], parse_scan_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn list_defects(&self) -> AppResult<Vec<DefectRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT defect_id, scan_id, defect_type, depth_cm, severity, bbox_x, bbox_y, bbox_width, bbox_height, confidence
             FROM defects ORDER BY defect_id ASC",
        )?;
        let rows = stmt.query_map([], parse_defect_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn list_measurements(&self) -> AppResult<Vec<MeasurementRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT measurement_id, defect_id, measurement_type, value_cm, calculation_method, measured_at
             FROM measurements ORDER BY measurement_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MeasurementRecord {
                measurement_id: row.get(0)?,
                defect_id: row.get(1)?,
                measurement_type: parse_label(&row.get::<_, String>(2)?, 2, MeasurementType::parse)?,
                value_cm: row.get(3)?,
                calculation_method: row.get(4)?,
                measured_at: row.get(5)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn list_repairs(&self) -> AppResult<Vec<RepairRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT repair_id, defect_id, repair_date, repair_type, cost_usd, contractor, status
             FROM repair_history ORDER BY repair_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RepairRecord {
                repair_id: row.get(0)?,
                defect_id: row.get(1)?,
                repair_date: row.get(2)?,
                repair_type: row.get(3)?,
                cost_usd: row.get(4)?,
                contractor: row.get(5)?,
                status: parse_label(&row.get::<_, String>(6)?, 6, RepairStatus::parse)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// `CREATE TABLE` text of every user table followed by a few sample rows.
    pub fn schema_description(&self) -> AppResult<String> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name ASC",
        )?;
        let tables = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut sections = Vec::with_capacity(tables.len());
        for (name, sql) in tables {
            let mut section = sql.unwrap_or_default().trim().to_string();
            section.push_str("\n\n");
            section.push_str(&sample_rows(&conn, &name)?);
            sections.push(section);
        }
        Ok(sections.join("\n\n"))
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

pub fn insert_scan(conn: &Connection, scan: &NewScan) -> AppResult<i64> {
    validate_scan(scan)?;
    conn.execute(
        "INSERT INTO scans (location, road_section, scan_date, file_path, total_length_m, scan_quality)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            scan.location,
            scan.road_section,
            scan.scan_date,
            scan.file_path,
            scan.total_length_m,
            scan.scan_quality.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_defect(conn: &Connection, defect: &NewDefect) -> AppResult<i64> {
    validate_defect(defect)?;
    conn.execute(
        "INSERT INTO defects (
           scan_id, defect_type, depth_cm, severity, bbox_x, bbox_y, bbox_width, bbox_height, confidence
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            defect.scan_id,
            defect.defect_type.as_str(),
            defect.depth_cm,
            defect.severity.as_str(),
            defect.bbox.x,
            defect.bbox.y,
            defect.bbox.width,
            defect.bbox.height,
            defect.confidence,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_measurement(conn: &Connection, measurement: &NewMeasurement) -> AppResult<i64> {
    ensure_non_negative("value_cm", measurement.value_cm)?;
    conn.execute(
        "INSERT INTO measurements (defect_id, measurement_type, value_cm, calculation_method)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            measurement.defect_id,
            measurement.measurement_type.as_str(),
            measurement.value_cm,
            measurement.calculation_method,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_repair(conn: &Connection, repair: &NewRepair) -> AppResult<i64> {
    ensure_non_negative("cost_usd", repair.cost_usd)?;
    conn.execute(
        "INSERT INTO repair_history (defect_id, repair_date, repair_type, cost_usd, contractor, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            repair.defect_id,
            repair.repair_date,
            repair.repair_type,
            repair.cost_usd,
            repair.contractor,
            repair.status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn validate_scan(scan: &NewScan) -> AppResult<()> {
    if scan.location.trim().is_empty() {
        return Err(AppError::Validation("Scan location cannot be empty".to_string()));
    }
    if !scan.total_length_m.is_finite() || scan.total_length_m <= 0.0 {
        return Err(AppError::Validation(format!(
            "total_length_m must be positive, got {}",
            scan.total_length_m
        )));
    }
    Ok(())
}

fn validate_defect(defect: &NewDefect) -> AppResult<()> {
    ensure_non_negative("depth_cm", defect.depth_cm)?;
    let BoundingBox { x, y, width, height } = defect.bbox;
    for (field, value) in [("bbox_x", x), ("bbox_y", y), ("bbox_width", width), ("bbox_height", height)] {
        if value < 0 {
            return Err(AppError::Validation(format!("{} must be non-negative, got {}", field, value)));
        }
    }
    if !(0.0..=1.0).contains(&defect.confidence) {
        return Err(AppError::Validation(format!(
            "confidence must be within [0, 1], got {}",
            defect.confidence
        )));
    }
    Ok(())
}

fn ensure_non_negative(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!("{} must be non-negative, got {}", field, value)));
    }
    Ok(())
}

fn sample_rows(conn: &Connection, table: &str) -> AppResult<String> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM \"{}\" LIMIT {}",
        table.replace('"', "\"\""),
        SAMPLE_ROWS_PER_TABLE
    ))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(ToString::to_string).collect();
    let mut lines = vec![
        format!("/*\n{} rows from {} table:", SAMPLE_ROWS_PER_TABLE, table),
        columns.join("\t"),
    ];
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(format_value(row.get_ref(index)?));
        }
        lines.push(values.join("\t"));
    }
    lines.push("*/".to_string());
    Ok(lines.join("\n"))
}

fn format_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(number) => number.to_string(),
        ValueRef::Real(number) => number.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).to_string(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}

fn parse_scan_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanRecord> {
    Ok(ScanRecord {
        scan_id: row.get(0)?,
        location: row.get(1)?,
        road_section: row.get(2)?,
        scan_date: row.get(3)?,
        file_path: row.get(4)?,
        total_length_m: row.get(5)?,
        scan_quality: row
            .get::<_, Option<String>>(6)?
            .map(|raw| parse_label(&raw, 6, ScanQuality::parse))
            .transpose()?,
    })
}

fn parse_defect_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DefectRecord> {
    Ok(DefectRecord {
        defect_id: row.get(0)?,
        scan_id: row.get(1)?,
        defect_type: parse_label(&row.get::<_, String>(2)?, 2, DefectType::parse)?,
        depth_cm: row.get(3)?,
        severity: parse_label(&row.get::<_, String>(4)?, 4, Severity::parse)?,
        bbox: BoundingBox {
            x: row.get(5)?,
            y: row.get(6)?,
            width: row.get(7)?,
            height: row.get(8)?,
        },
        confidence: row.get(9)?,
    })
}

pub(crate) fn parse_label<T>(raw: &str, column: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown label '{}'", raw),
            )),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::errors::AppError;
    use crate::models::{
        BoundingBox, DefectType, MeasurementType, NewDefect, NewMeasurement, NewScan, ScanQuality, Severity,
    };
    use chrono::NaiveDate;

    fn scan() -> NewScan {
        NewScan {
            location: "Teheran-ro".to_string(),
            road_section: Some("Section C".to_string()),
            scan_date: NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"),
            file_path: Some("/data/gpr_scans/scan_001.h5".to_string()),
            total_length_m: 250.5,
            scan_quality: ScanQuality::Good,
        }
    }

    fn defect(scan_id: i64) -> NewDefect {
        NewDefect {
            scan_id,
            defect_type: DefectType::Cavity,
            depth_cm: 22.4,
            severity: Severity::High,
            bbox: BoundingBox { x: 10, y: 20, width: 40, height: 60 },
            confidence: 0.91,
        }
    }

    #[test]
    fn database_can_insert_and_read_defect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create_store(&dir.path().join("test.db")).expect("db");

        let scan_id = db.insert_scan(&scan()).expect("insert scan");
        let defect_id = db.insert_defect(&defect(scan_id)).expect("insert defect");

        let defects = db.list_defects().expect("list defects");
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].defect_id, defect_id);
        assert_eq!(defects[0].scan_id, scan_id);
        assert_eq!(defects[0].severity, Severity::High);
        assert_eq!(defects[0].bbox.height, 60);

        let scans = db.list_scans().expect("list scans");
        assert_eq!(scans[0].scan_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(scans[0].scan_quality, Some(ScanQuality::Good));
    }

    #[test]
    fn measurement_timestamp_defaults_to_now() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create_store(&dir.path().join("test.db")).expect("db");
        let scan_id = db.insert_scan(&scan()).expect("insert scan");
        let defect_id = db.insert_defect(&defect(scan_id)).expect("insert defect");
        db.insert_measurement(&NewMeasurement {
            defect_id,
            measurement_type: MeasurementType::Length,
            value_cm: 80.0,
            calculation_method: Some("skeleton".to_string()),
        })
        .expect("insert measurement");

        let measurements = db.list_measurements().expect("list measurements");
        assert_eq!(measurements.len(), 1);
        assert!(measurements[0].measured_at.is_some());
    }

    #[test]
    fn store_rejects_unknown_labels_and_dangling_references() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create_store(&dir.path().join("test.db")).expect("db");
        let scan_id = db.insert_scan(&scan()).expect("insert scan");

        let bad_label = db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO defects (scan_id, defect_type, severity) VALUES (?1, 'sinkhole', 'low')",
                [scan_id],
            )
            .map_err(AppError::from)
        });
        assert!(matches!(bad_label, Err(AppError::Storage(_))));

        let dangling = db.insert_defect(&defect(scan_id + 100));
        assert!(matches!(dangling, Err(AppError::Storage(_))));
    }

    #[test]
    fn validation_rejects_out_of_range_numbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create_store(&dir.path().join("test.db")).expect("db");
        let scan_id = db.insert_scan(&scan()).expect("insert scan");

        let mut too_confident = defect(scan_id);
        too_confident.confidence = 1.2;
        assert!(matches!(db.insert_defect(&too_confident), Err(AppError::Validation(_))));

        let mut negative_bbox = defect(scan_id);
        negative_bbox.bbox.x = -1;
        assert!(matches!(db.insert_defect(&negative_bbox), Err(AppError::Validation(_))));

        let mut empty_length = scan();
        empty_length.total_length_m = 0.0;
        assert!(matches!(db.insert_scan(&empty_length), Err(AppError::Validation(_))));
        assert_eq!(db.count_rows("defects").expect("count"), 0);
    }

    #[test]
    fn create_store_drops_previous_rows_but_open_keeps_them() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        {
            let db = Database::create_store(&path).expect("db");
            db.insert_scan(&scan()).expect("insert scan");
        }
        let reopened = Database::open(&path).expect("reopen");
        assert_eq!(reopened.count_rows("scans").expect("count"), 1);
        drop(reopened);

        let recreated = Database::create_store(&path).expect("recreate");
        assert_eq!(recreated.count_rows("scans").expect("count"), 0);
    }

    #[test]
    fn count_rows_rejects_unknown_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create_store(&dir.path().join("test.db")).expect("db");
        assert!(matches!(db.count_rows("sqlite_master"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn schema_description_lists_tables_and_samples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::create_store(&dir.path().join("test.db")).expect("db");
        db.insert_scan(&scan()).expect("insert scan");

        let description = db.schema_description().expect("schema");
        assert!(description.starts_with("CREATE TABLE"));
        for table in super::TABLES {
            assert!(description.contains(&format!("rows from {} table:", table)), "{}", table);
        }
        assert!(description.contains("3 rows from scans table:"));
        assert!(description.contains("Teheran-ro"));
    }
}
