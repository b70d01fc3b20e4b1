use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ScanQuality {
    pub const ALL: [ScanQuality; 4] = [Self::Excellent, Self::Good, Self::Fair, Self::Poor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|value| value.as_str() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectType {
    Cavity,
    Crack,
    Pipe,
    Manhole,
    Delamination,
}

impl DefectType {
    pub const ALL: [DefectType; 5] = [
        Self::Cavity,
        Self::Crack,
        Self::Pipe,
        Self::Manhole,
        Self::Delamination,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cavity => "cavity",
            Self::Crack => "crack",
            Self::Pipe => "pipe",
            Self::Manhole => "manhole",
            Self::Delamination => "delamination",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|value| value.as_str() == raw)
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|value| value.as_str() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementType {
    Length,
    Width,
    Area,
    Volume,
}

impl MeasurementType {
    pub const ALL: [MeasurementType; 4] = [Self::Length, Self::Width, Self::Area, Self::Volume];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Width => "width",
            Self::Area => "area",
            Self::Volume => "volume",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|value| value.as_str() == raw)
    }
}

/// Listed in lifecycle order. Transitions are not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Planned,
    InProgress,
    Completed,
    Verified,
}

impl RepairStatus {
    pub const ALL: [RepairStatus; 4] = [
        Self::Planned,
        Self::InProgress,
        Self::Completed,
        Self::Verified,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Verified => "verified",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|value| value.as_str() == raw)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Planned | Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScan {
    pub location: String,
    pub road_section: Option<String>,
    pub scan_date: NaiveDate,
    pub file_path: Option<String>,
    pub total_length_m: f64,
    pub scan_quality: ScanQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_id: i64,
    pub location: String,
    pub road_section: Option<String>,
    pub scan_date: Option<NaiveDate>,
    pub file_path: Option<String>,
    pub total_length_m: Option<f64>,
    pub scan_quality: Option<ScanQuality>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDefect {
    pub scan_id: i64,
    pub defect_type: DefectType,
    pub depth_cm: f64,
    pub severity: Severity,
    pub bbox: BoundingBox,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectRecord {
    pub defect_id: i64,
    pub scan_id: i64,
    pub defect_type: DefectType,
    pub depth_cm: f64,
    pub severity: Severity,
    pub bbox: BoundingBox,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMeasurement {
    pub defect_id: i64,
    pub measurement_type: MeasurementType,
    pub value_cm: f64,
    pub calculation_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub measurement_id: i64,
    pub defect_id: i64,
    pub measurement_type: MeasurementType,
    pub value_cm: f64,
    pub calculation_method: Option<String>,
    pub measured_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRepair {
    pub defect_id: i64,
    pub repair_date: NaiveDate,
    pub repair_type: String,
    pub cost_usd: f64,
    pub contractor: String,
    pub status: RepairStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairRecord {
    pub repair_id: i64,
    pub defect_id: i64,
    pub repair_date: Option<NaiveDate>,
    pub repair_type: Option<String>,
    pub cost_usd: f64,
    pub contractor: Option<String>,
    pub status: RepairStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SummaryStats {
    pub total_scans: i64,
    pub total_defects: i64,
    pub critical_defects: i64,
    pub pending_repairs: i64,
}

impl SummaryStats {
    /// Detection rate shown on the dashboard, rounded to one decimal.
    pub fn defects_per_scan(&self) -> f64 {
        if self.total_scans == 0 {
            return 0.0;
        }
        let rate = self.total_defects as f64 / self.total_scans as f64;
        (rate * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub defect_type: DefectType,
    pub severity: Severity,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStats {
    pub location: String,
    pub defect_count: i64,
    pub avg_depth: Option<f64>,
    pub critical_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub summary: SummaryStats,
    pub distribution: Vec<DistributionRow>,
    pub locations: Vec<LocationStats>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenerationReport {
    pub scans: usize,
    pub defects: usize,
    pub measurements: usize,
    pub repairs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub text: String,
    pub trace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    pub sql: Option<Vec<String>>,
    pub failed: bool,
}

#[cfg(test)]
mod tests {
    use super::{DefectType, RepairStatus, Severity, SummaryStats};

    #[test]
    fn enum_labels_round_trip() {
        for value in Severity::ALL {
            assert_eq!(Severity::parse(value.as_str()), Some(value));
        }
        assert_eq!(RepairStatus::parse("in_progress"), Some(RepairStatus::InProgress));
        assert_eq!(DefectType::parse("sinkhole"), None);
    }

    #[test]
    fn serde_labels_match_store_labels() {
        let json = serde_json::to_string(&RepairStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn defects_per_scan_handles_empty_store() {
        assert_eq!(SummaryStats::default().defects_per_scan(), 0.0);
        let stats = SummaryStats {
            total_scans: 3,
            total_defects: 31,
            critical_defects: 0,
            pending_repairs: 0,
        };
        assert_eq!(stats.defects_per_scan(), 10.3);
    }
}
