use std::str::FromStr;

use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};

use crate::db::repository::assignment;
use crate::db::DatabaseError;
use crate::models::enums::PrescriptionStatus;
use crate::models::filters::{Page, PrescriptionFilter};
use crate::models::prescription::{
    MedicationItem, NewMedicationItem, NewPrescription, Prescription, PrescriptionDetail,
    PrescriptionSummary,
};

/// Create a prescription, its medication rows, and the patient-doctor link
/// as one all-or-nothing unit.
///
/// Steps: insert the prescription row, capture its id, upsert the
/// assignment (conflict no-op), insert every medication line with a
/// non-empty drug name. Any failure rolls the whole unit back; no partial
/// state survives.
pub fn create_prescription(
    conn: &mut Connection,
    new: &NewPrescription,
) -> Result<i64, DatabaseError> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO prescriptions (patient_id, doctor_id, diagnosis, notes, status, file_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.patient_id,
            new.doctor_id,
            new.diagnosis,
            new.notes,
            new.status.as_str(),
            new.file_path,
        ],
    )?;
    let prescription_id = tx.last_insert_rowid();

    assignment::upsert_assignment(&tx, new.patient_id, new.doctor_id)?;

    insert_medications(&tx, prescription_id, &new.medications)?;

    tx.commit()?;
    Ok(prescription_id)
}

/// Replace a prescription's fields and its entire medication set. The old
/// line items are deleted unconditionally and the submitted list re-inserted
/// (full replace, no diffing), inside one transaction so the set swaps
/// atomically. Scoped to the owning doctor.
pub fn update_prescription(
    conn: &mut Connection,
    id: i64,
    doctor_id: i64,
    diagnosis: &str,
    notes: Option<&str>,
    status: PrescriptionStatus,
    medications: &[NewMedicationItem],
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;

    let changed = tx.execute(
        "UPDATE prescriptions
         SET diagnosis = ?1, notes = ?2, status = ?3, updated_at = datetime('now')
         WHERE id = ?4 AND doctor_id = ?5",
        params![diagnosis, notes, status.as_str(), id, doctor_id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "prescription".into(),
            id,
        });
    }

    tx.execute(
        "DELETE FROM prescription_medications WHERE prescription_id = ?1",
        params![id],
    )?;
    insert_medications(&tx, id, medications)?;

    tx.commit()?;
    Ok(())
}

/// Patient-side edit of an uploaded prescription: diagnosis and notes only,
/// and only while the row is still pending review and owned by the patient.
pub fn update_pending_by_patient(
    conn: &Connection,
    id: i64,
    patient_id: i64,
    diagnosis: Option<&str>,
    notes: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions
         SET diagnosis = ?1, notes = ?2, updated_at = datetime('now')
         WHERE id = ?3 AND patient_id = ?4 AND status = 'pending'",
        params![diagnosis, notes, id, patient_id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "prescription".into(),
            id,
        });
    }
    Ok(())
}

fn insert_medications(
    tx: &Transaction<'_>,
    prescription_id: i64,
    medications: &[NewMedicationItem],
) -> Result<(), DatabaseError> {
    let mut stmt = tx.prepare(
        "INSERT INTO prescription_medications
             (prescription_id, drug_name, generic_name, dosage, duration, instructions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    for med in medications {
        // Blank lines from the form are skipped, not persisted
        if med.drug_name.trim().is_empty() {
            continue;
        }
        stmt.execute(params![
            prescription_id,
            med.drug_name,
            med.generic_name,
            med.dosage,
            med.duration,
            med.instructions,
        ])?;
    }
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: i64) -> Result<Option<Prescription>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, doctor_id, diagnosis, notes, status, file_path,
                    created_at, updated_at
             FROM prescriptions WHERE id = ?1",
            params![id],
            prescription_row,
        )
        .optional()?;
    row.map(prescription_from_row).transpose()
}

/// Full detail view: the prescription, the joined party names, and its
/// medication set.
pub fn get_detail(conn: &Connection, id: i64) -> Result<Option<PrescriptionDetail>, DatabaseError> {
    let prescription = match get_prescription(conn, id)? {
        Some(p) => p,
        None => return Ok(None),
    };

    let (patient_name, doctor_name): (String, String) = conn.query_row(
        "SELECT pt.name, d.name
         FROM prescriptions p
         JOIN users pt ON p.patient_id = pt.id
         JOIN users d ON p.doctor_id = d.id
         WHERE p.id = ?1",
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let medications = medications_for(conn, id)?;

    Ok(Some(PrescriptionDetail {
        prescription,
        patient_name,
        doctor_name,
        medications,
    }))
}

pub fn medications_for(
    conn: &Connection,
    prescription_id: i64,
) -> Result<Vec<MedicationItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, prescription_id, drug_name, generic_name, dosage, duration, instructions
         FROM prescription_medications
         WHERE prescription_id = ?1
         ORDER BY id",
    )?;

    let rows = stmt.query_map(params![prescription_id], |row| {
        Ok(MedicationItem {
            id: row.get(0)?,
            prescription_id: row.get(1)?,
            drug_name: row.get(2)?,
            generic_name: row.get(3)?,
            dosage: row.get(4)?,
            duration: row.get(5)?,
            instructions: row.get(6)?,
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Conditional WHERE construction shared by the list and count queries.
fn filter_clause(filter: &PrescriptionFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = &filter.status {
        conditions.push("p.status = ?");
        params.push(Box::new(status.clone()));
    }
    if let Some(doctor_id) = filter.doctor_id {
        conditions.push("p.doctor_id = ?");
        params.push(Box::new(doctor_id));
    }
    if let Some(patient_id) = filter.patient_id {
        conditions.push("p.patient_id = ?");
        params.push(Box::new(patient_id));
    }
    if let Some(date_from) = &filter.date_from {
        conditions.push("DATE(p.created_at) >= ?");
        params.push(Box::new(date_from.clone()));
    }
    if let Some(date_to) = &filter.date_to {
        conditions.push("DATE(p.created_at) <= ?");
        params.push(Box::new(date_to.clone()));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, params)
}

pub fn count_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<u32, DatabaseError> {
    let (clause, params) = filter_clause(filter);
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM prescriptions p {clause}"),
        params_from_iter(params.iter()),
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

pub fn list_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
    page: &Page,
) -> Result<Vec<PrescriptionSummary>, DatabaseError> {
    let (clause, mut params) = filter_clause(filter);
    params.push(Box::new(page.limit()));
    params.push(Box::new(page.offset()));

    let mut stmt = conn.prepare(&format!(
        "SELECT p.id, p.patient_id, pt.name, p.doctor_id, d.name, p.diagnosis, p.status,
                (SELECT COUNT(*) FROM prescription_medications
                 WHERE prescription_id = p.id) AS medication_count,
                p.created_at
         FROM prescriptions p
         JOIN users d ON p.doctor_id = d.id
         JOIN users pt ON p.patient_id = pt.id
         {clause}
         ORDER BY p.created_at DESC, p.id DESC
         LIMIT ? OFFSET ?"
    ))?;

    let rows = stmt.query_map(params_from_iter(params.iter()), summary_row)?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(summary_from_row(row?)?);
    }
    Ok(prescriptions)
}

pub fn set_status(
    conn: &Connection,
    id: i64,
    status: PrescriptionStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "prescription".into(),
            id,
        });
    }
    Ok(())
}

// ── Row mapping ─────────────────────────────────────────────

struct PrescriptionRow {
    id: i64,
    patient_id: i64,
    doctor_id: i64,
    diagnosis: Option<String>,
    notes: Option<String>,
    status: String,
    file_path: Option<String>,
    created_at: String,
    updated_at: String,
}

fn prescription_row(row: &rusqlite::Row<'_>) -> Result<PrescriptionRow, rusqlite::Error> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        diagnosis: row.get(3)?,
        notes: row.get(4)?,
        status: row.get(5)?,
        file_path: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    Ok(Prescription {
        id: row.id,
        patient_id: row.patient_id,
        doctor_id: row.doctor_id,
        diagnosis: row.diagnosis,
        notes: row.notes,
        status: PrescriptionStatus::from_str(&row.status)?,
        file_path: row.file_path,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

struct SummaryRow {
    id: i64,
    patient_id: i64,
    patient_name: String,
    doctor_id: i64,
    doctor_name: String,
    diagnosis: Option<String>,
    status: String,
    medication_count: i64,
    created_at: String,
}

fn summary_row(row: &rusqlite::Row<'_>) -> Result<SummaryRow, rusqlite::Error> {
    Ok(SummaryRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        doctor_id: row.get(3)?,
        doctor_name: row.get(4)?,
        diagnosis: row.get(5)?,
        status: row.get(6)?,
        medication_count: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn summary_from_row(row: SummaryRow) -> Result<PrescriptionSummary, DatabaseError> {
    Ok(PrescriptionSummary {
        id: row.id,
        patient_id: row.patient_id,
        patient_name: row.patient_name,
        doctor_id: row.doctor_id,
        doctor_name: row.doctor_name,
        diagnosis: row.diagnosis,
        status: PrescriptionStatus::from_str(&row.status)?,
        medication_count: row.medication_count,
        created_at: row.created_at,
    })
}
