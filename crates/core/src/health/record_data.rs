use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::RecordType;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SleepPayload {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub deep_minutes: Option<i64>,
    pub rem_minutes: Option<i64>,
    pub light_minutes: Option<i64>,
    pub awake_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HrvPayload {
    pub rmssd_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestingHrPayload {
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepsPayload {
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExercisePayload {
    pub exercise_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub calories_kcal: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightPayload {
    pub weight_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BodyFatPayload {
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HydrationPayload {
    pub volume_ml: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BloodPressurePayload {
    pub systolic_mmhg: f64,
    pub diastolic_mmhg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BloodGlucosePayload {
    pub mmol_per_l: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spo2Payload {
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespiratoryRatePayload {
    pub breaths_per_min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkinTempPayload {
    pub delta_celsius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NutritionPayload {
    pub meal_type: Option<String>,
    pub food_name: Option<String>,
    pub calories_kcal: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
}

/// Type-specific fields of a health record.
///
/// The outbox stores only the `fields` object; the record type lives in its
/// own column and is used to re-parse the payload before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "fields", rename_all = "snake_case")]
pub enum RecordData {
    Sleep(SleepPayload),
    Hrv(HrvPayload),
    RestingHr(RestingHrPayload),
    Steps(StepsPayload),
    Exercise(ExercisePayload),
    Weight(WeightPayload),
    BodyFat(BodyFatPayload),
    Hydration(HydrationPayload),
    BloodPressure(BloodPressurePayload),
    BloodGlucose(BloodGlucosePayload),
    Spo2(Spo2Payload),
    RespiratoryRate(RespiratoryRatePayload),
    SkinTemp(SkinTempPayload),
    Nutrition(NutritionPayload),
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::Sleep(_) => RecordType::Sleep,
            RecordData::Hrv(_) => RecordType::Hrv,
            RecordData::RestingHr(_) => RecordType::RestingHr,
            RecordData::Steps(_) => RecordType::Steps,
            RecordData::Exercise(_) => RecordType::Exercise,
            RecordData::Weight(_) => RecordType::Weight,
            RecordData::BodyFat(_) => RecordType::BodyFat,
            RecordData::Hydration(_) => RecordType::Hydration,
            RecordData::BloodPressure(_) => RecordType::BloodPressure,
            RecordData::BloodGlucose(_) => RecordType::BloodGlucose,
            RecordData::Spo2(_) => RecordType::Spo2,
            RecordData::RespiratoryRate(_) => RecordType::RespiratoryRate,
            RecordData::SkinTemp(_) => RecordType::SkinTemp,
            RecordData::Nutrition(_) => RecordType::Nutrition,
        }
    }

    /// Serializes the type-specific fields as a JSON object.
    pub fn to_payload(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        let fields = value
            .get("fields")
            .cloned()
            .ok_or_else(|| Error::validation("Record payload has no fields"))?;
        Ok(serde_json::to_string(&fields)?)
    }

    /// Re-parses a stored payload for the given record type.
    pub fn from_payload(record_type: RecordType, payload: &str) -> Result<Self> {
        let fields: serde_json::Value = serde_json::from_str(payload)?;
        if !fields.is_object() {
            return Err(Error::validation(format!(
                "{} payload must be a JSON object",
                record_type
            )));
        }
        let tagged = serde_json::json!({ "type": record_type, "fields": fields });
        Ok(serde_json::from_value(tagged)?)
    }
}

/// A record as observed in the platform health source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    /// Stable identifier assigned by the health source.
    pub id: String,
    pub date: NaiveDate,
    pub data: RecordData,
}

impl HealthRecord {
    pub fn record_type(&self) -> RecordType {
        self.data.record_type()
    }
}
