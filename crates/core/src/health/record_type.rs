use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

/// Health metrics that participate in outbox sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Sleep,
    Hrv,
    RestingHr,
    Steps,
    Exercise,
    Weight,
    BodyFat,
    Hydration,
    BloodPressure,
    BloodGlucose,
    Spo2,
    RespiratoryRate,
    SkinTemp,
    Nutrition,
}

impl RecordType {
    pub const ALL: [RecordType; 14] = [
        RecordType::Sleep,
        RecordType::Hrv,
        RecordType::RestingHr,
        RecordType::Steps,
        RecordType::Exercise,
        RecordType::Weight,
        RecordType::BodyFat,
        RecordType::Hydration,
        RecordType::BloodPressure,
        RecordType::BloodGlucose,
        RecordType::Spo2,
        RecordType::RespiratoryRate,
        RecordType::SkinTemp,
        RecordType::Nutrition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Sleep => "sleep",
            RecordType::Hrv => "hrv",
            RecordType::RestingHr => "resting_hr",
            RecordType::Steps => "steps",
            RecordType::Exercise => "exercise",
            RecordType::Weight => "weight",
            RecordType::BodyFat => "body_fat",
            RecordType::Hydration => "hydration",
            RecordType::BloodPressure => "blood_pressure",
            RecordType::BloodGlucose => "blood_glucose",
            RecordType::Spo2 => "spo2",
            RecordType::RespiratoryRate => "respiratory_rate",
            RecordType::SkinTemp => "skin_temp",
            RecordType::Nutrition => "nutrition",
        }
    }

    /// Backend table the metric is upserted into.
    pub fn backend_table(&self) -> &'static str {
        match self {
            RecordType::Sleep => "sleep_daily",
            RecordType::Hrv => "hrv_daily",
            RecordType::RestingHr => "resting_hr_daily",
            RecordType::Steps => "steps_daily",
            RecordType::Exercise => "exercise_daily",
            RecordType::Weight => "weight_daily",
            RecordType::BodyFat => "body_fat_daily",
            RecordType::Hydration => "hydration_daily",
            RecordType::BloodPressure => "blood_pressure_daily",
            RecordType::BloodGlucose => "blood_glucose_daily",
            RecordType::Spo2 => "spo2_daily",
            RecordType::RespiratoryRate => "respiratory_rate_daily",
            RecordType::SkinTemp => "skin_temp_daily",
            RecordType::Nutrition => "nutrition_daily",
        }
    }

    /// How far back a full backfill scans for this metric.
    ///
    /// Slow-moving body measurements get the long window; high-volume
    /// intake records only need the last week.
    pub fn backfill_lookback_days(&self) -> i64 {
        match self {
            RecordType::Weight | RecordType::BodyFat | RecordType::BloodPressure => 180,
            RecordType::Exercise | RecordType::BloodGlucose => 90,
            RecordType::Sleep
            | RecordType::Hrv
            | RecordType::RestingHr
            | RecordType::Steps
            | RecordType::Spo2
            | RecordType::RespiratoryRate
            | RecordType::SkinTemp => 30,
            RecordType::Hydration => 14,
            RecordType::Nutrition => 7,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .iter()
            .copied()
            .find(|record_type| record_type.as_str() == value)
            .ok_or_else(|| Error::validation(format!("Unknown record type '{}'", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_matches_backend_contract() {
        for record_type in RecordType::ALL {
            let json = serde_json::to_string(&record_type).expect("serialize record type");
            assert_eq!(json, format!("\"{}\"", record_type.as_str()));
            assert_eq!(
                record_type.as_str().parse::<RecordType>().expect("parse"),
                record_type
            );
        }
    }

    #[test]
    fn lookback_windows_stay_bounded() {
        for record_type in RecordType::ALL {
            let days = record_type.backfill_lookback_days();
            assert!((7..=180).contains(&days), "{record_type} has lookback {days}");
        }
    }

    #[test]
    fn unknown_record_type_is_rejected() {
        assert!("heart_rate_variability".parse::<RecordType>().is_err());
    }
}
