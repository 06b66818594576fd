use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::user::UserSummary;

/// Ensure the patient-doctor link exists. Idempotent: a patient who already
/// has an assignment keeps it (conflict is a no-op), so re-running after a
/// partial failure is safe.
pub fn upsert_assignment(
    conn: &Connection,
    patient_id: i64,
    doctor_id: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patient_doctor (patient_id, doctor_id) VALUES (?1, ?2)
         ON CONFLICT(patient_id) DO NOTHING",
        params![patient_id, doctor_id],
    )?;
    Ok(())
}

/// Switch a patient to a new doctor: the old row is deleted first, then the
/// new pair inserted, atomically. A patient never holds two rows.
pub fn reassign_doctor(
    conn: &mut Connection,
    patient_id: i64,
    doctor_id: i64,
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM patient_doctor WHERE patient_id = ?1",
        params![patient_id],
    )?;
    tx.execute(
        "INSERT INTO patient_doctor (patient_id, doctor_id) VALUES (?1, ?2)",
        params![patient_id, doctor_id],
    )?;
    tx.commit()?;
    Ok(())
}

/// The doctor currently assigned to a patient, if any.
pub fn doctor_for_patient(
    conn: &Connection,
    patient_id: i64,
) -> Result<Option<i64>, DatabaseError> {
    let id = conn
        .query_row(
            "SELECT doctor_id FROM patient_doctor WHERE patient_id = ?1",
            params![patient_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Patients visible to a doctor through the assignment table.
pub fn patients_of_doctor(
    conn: &Connection,
    doctor_id: i64,
) -> Result<Vec<UserSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.email, u.role, u.status, u.created_at
         FROM patient_doctor pd
         JOIN users u ON pd.patient_id = u.id
         WHERE pd.doctor_id = ?1
         ORDER BY u.name ASC",
    )?;

    let rows = stmt.query_map(params![doctor_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut patients = Vec::new();
    for row in rows {
        let (id, name, email, role, status, created_at) = row?;
        patients.push(UserSummary {
            id,
            name,
            email,
            role: role.parse()?,
            status: status.parse()?,
            created_at,
        });
    }
    Ok(patients)
}

pub fn assignment_count(conn: &Connection, patient_id: i64) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM patient_doctor WHERE patient_id = ?1",
        params![patient_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
