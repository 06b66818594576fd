use serde::{Deserialize, Serialize};

use super::enums::PrescriptionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub status: PrescriptionStatus,
    pub file_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationItem {
    pub id: i64,
    pub prescription_id: i64,
    pub drug_name: String,
    pub generic_name: Option<String>,
    pub dosage: String,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

/// One submitted medication line. Lines with an empty drug name are
/// skipped at insert time, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedicationItem {
    pub drug_name: String,
    pub generic_name: Option<String>,
    pub dosage: String,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

/// Input to the prescription-creation transaction.
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub status: PrescriptionStatus,
    pub file_path: Option<String>,
    pub medications: Vec<NewMedicationItem>,
}

/// List-page row: prescription joined with doctor/patient names and the
/// medication count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionSummary {
    pub id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub doctor_id: i64,
    pub doctor_name: String,
    pub diagnosis: Option<String>,
    pub status: PrescriptionStatus,
    pub medication_count: i64,
    pub created_at: String,
}

/// Detail view: prescription plus its medication set.
#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionDetail {
    pub prescription: Prescription,
    pub patient_name: String,
    pub doctor_name: String,
    pub medications: Vec<MedicationItem>,
}
