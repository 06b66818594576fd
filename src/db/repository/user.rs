use std::str::FromStr;

use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::enums::{Role, UserStatus};
use crate::models::filters::{Page, UserFilter};
use crate::models::user::{DoctorProfile, NewUser, User, UserProfile, UserSettings, UserSummary};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, medical_id, status, created_at";

/// Insert a user plus their blank profile and default settings rows as one
/// unit. Registration either creates all three rows or none.
pub fn create_user(conn: &mut Connection, new: &NewUser) -> Result<i64, DatabaseError> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO users (name, email, password_hash, role, medical_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new.name,
            new.email,
            new.password_hash,
            new.role.as_str(),
            new.medical_id,
        ],
    )?;
    let user_id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO user_profiles (user_id) VALUES (?1)",
        params![user_id],
    )?;

    if new.role == Role::Doctor {
        tx.execute(
            "INSERT INTO doctor_profiles (user_id) VALUES (?1)",
            params![user_id],
        )?;
    }

    let settings = UserSettings::defaults(user_id);
    tx.execute(
        "INSERT INTO user_settings
             (user_id, email_notifications, sms_notifications,
              prescription_reminders, status_updates)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            settings.email_notifications as i32,
            settings.sms_notifications as i32,
            settings.prescription_reminders as i32,
            settings.status_updates as i32,
        ],
    )?;

    tx.commit()?;
    Ok(user_id)
}

/// Uniqueness pre-check used by registration before attempting the insert.
pub fn email_exists(conn: &Connection, email: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?1",
        params![email],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            user_row,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_row,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

/// Build the WHERE clause for the user list: predicates are appended only
/// for filters that are present, then ANDed together.
fn user_filter_clause(filter: &UserFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(role) = &filter.role {
        conditions.push("role = ?");
        params.push(Box::new(role.clone()));
    }
    if let Some(status) = &filter.status {
        conditions.push("status = ?");
        params.push(Box::new(status.clone()));
    }
    if let Some(search) = &filter.search {
        conditions.push("(name LIKE ? OR email LIKE ?)");
        let pattern = format!("%{search}%");
        params.push(Box::new(pattern.clone()));
        params.push(Box::new(pattern));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, params)
}

pub fn count_users(conn: &Connection, filter: &UserFilter) -> Result<u32, DatabaseError> {
    let (clause, params) = user_filter_clause(filter);
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users {clause}"),
        params_from_iter(params.iter()),
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

pub fn list_users(
    conn: &Connection,
    filter: &UserFilter,
    page: &Page,
) -> Result<Vec<UserSummary>, DatabaseError> {
    let (clause, mut params) = user_filter_clause(filter);
    params.push(Box::new(page.limit()));
    params.push(Box::new(page.offset()));

    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, email, role, status, created_at
         FROM users {clause}
         ORDER BY created_at DESC
         LIMIT ? OFFSET ?"
    ))?;

    let rows = stmt.query_map(params_from_iter(params.iter()), summary_row)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(summary_from_row(row?)?);
    }
    Ok(users)
}

pub fn update_user(
    conn: &Connection,
    id: i64,
    name: &str,
    email: &str,
    role: Role,
    status: UserStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET name = ?1, email = ?2, role = ?3, status = ?4 WHERE id = ?5",
        params![name, email, role.as_str(), status.as_str(), id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "user".into(),
            id,
        });
    }
    Ok(())
}

pub fn set_status(conn: &Connection, id: i64, status: UserStatus) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "user".into(),
            id,
        });
    }
    Ok(())
}

/// Delete a non-admin user. Admin rows are never deletable; returns `false`
/// when nothing matched (missing user or admin target).
pub fn delete_user(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM users WHERE id = ?1 AND role != 'admin'",
        params![id],
    )?;
    Ok(changed > 0)
}

pub fn update_password(conn: &Connection, id: i64, password_hash: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, id],
    )?;
    Ok(())
}

// ── Password reset tokens ───────────────────────────────────

pub fn set_reset_token(
    conn: &Connection,
    user_id: i64,
    token: &str,
    expiry: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET reset_token = ?1, reset_token_expiry = ?2 WHERE id = ?3",
        params![token, expiry, user_id],
    )?;
    Ok(())
}

/// Look up an unexpired reset token.
pub fn find_by_reset_token(conn: &Connection, token: &str) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE reset_token = ?1 AND reset_token_expiry > datetime('now')"
            ),
            params![token],
            user_row,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

/// Set the new password hash and consume the reset token as one unit, so a
/// used token can never stay live alongside the password it set.
pub fn complete_password_reset(
    conn: &mut Connection,
    user_id: i64,
    password_hash: &str,
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, user_id],
    )?;
    tx.execute(
        "UPDATE users SET reset_token = NULL, reset_token_expiry = NULL WHERE id = ?1",
        params![user_id],
    )?;
    tx.commit()?;
    Ok(())
}

// ── Profiles & settings ─────────────────────────────────────

pub fn get_profile(conn: &Connection, user_id: i64) -> Result<Option<UserProfile>, DatabaseError> {
    let profile = conn
        .query_row(
            "SELECT user_id, phone, address, date_of_birth, gender
             FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserProfile {
                    user_id: row.get(0)?,
                    phone: row.get(1)?,
                    address: row.get(2)?,
                    date_of_birth: row.get(3)?,
                    gender: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

pub fn update_profile(conn: &Connection, profile: &UserProfile) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE user_profiles
         SET phone = ?1, address = ?2, date_of_birth = ?3, gender = ?4
         WHERE user_id = ?5",
        params![
            profile.phone,
            profile.address,
            profile.date_of_birth,
            profile.gender,
            profile.user_id,
        ],
    )?;
    Ok(())
}

pub fn get_doctor_profile(
    conn: &Connection,
    user_id: i64,
) -> Result<Option<DoctorProfile>, DatabaseError> {
    let profile = conn
        .query_row(
            "SELECT user_id, phone, specialization, qualification
             FROM doctor_profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(DoctorProfile {
                    user_id: row.get(0)?,
                    phone: row.get(1)?,
                    specialization: row.get(2)?,
                    qualification: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

/// Upsert so accounts promoted to doctor after registration get a row on
/// their first profile save.
pub fn update_doctor_profile(
    conn: &Connection,
    profile: &DoctorProfile,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctor_profiles (user_id, phone, specialization, qualification)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE
             SET phone = ?2, specialization = ?3, qualification = ?4",
        params![
            profile.user_id,
            profile.phone,
            profile.specialization,
            profile.qualification,
        ],
    )?;
    Ok(())
}

/// Allergy list stored as one comma-separated text field on the profile row.
pub fn get_allergies(conn: &Connection, user_id: i64) -> Result<Vec<String>, DatabaseError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT allergies FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    let allergies = raw
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    Ok(allergies)
}

pub fn set_allergies(
    conn: &Connection,
    user_id: i64,
    allergies: &[String],
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE user_profiles SET allergies = ?1 WHERE user_id = ?2",
        params![allergies.join(", "), user_id],
    )?;
    Ok(())
}

pub fn get_settings(conn: &Connection, user_id: i64) -> Result<Option<UserSettings>, DatabaseError> {
    let settings = conn
        .query_row(
            "SELECT user_id, email_notifications, sms_notifications,
                    prescription_reminders, status_updates
             FROM user_settings WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserSettings {
                    user_id: row.get(0)?,
                    email_notifications: row.get::<_, i32>(1)? != 0,
                    sms_notifications: row.get::<_, i32>(2)? != 0,
                    prescription_reminders: row.get::<_, i32>(3)? != 0,
                    status_updates: row.get::<_, i32>(4)? != 0,
                })
            },
        )
        .optional()?;
    Ok(settings)
}

pub fn update_settings(conn: &Connection, settings: &UserSettings) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE user_settings
         SET email_notifications = ?1, sms_notifications = ?2,
             prescription_reminders = ?3, status_updates = ?4
         WHERE user_id = ?5",
        params![
            settings.email_notifications as i32,
            settings.sms_notifications as i32,
            settings.prescription_reminders as i32,
            settings.status_updates as i32,
            settings.user_id,
        ],
    )?;
    Ok(())
}

// ── Role-scoped lookups ─────────────────────────────────────

pub fn list_active_doctors(conn: &Connection) -> Result<Vec<UserSummary>, DatabaseError> {
    list_by_role(conn, "SELECT id, name, email, role, status, created_at FROM users
         WHERE role = 'doctor' AND status = 'active' ORDER BY name ASC")
}

pub fn list_patients(conn: &Connection) -> Result<Vec<UserSummary>, DatabaseError> {
    list_by_role(conn, "SELECT id, name, email, role, status, created_at FROM users
         WHERE role = 'patient' ORDER BY name ASC")
}

fn list_by_role(conn: &Connection, sql: &str) -> Result<Vec<UserSummary>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], summary_row)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(summary_from_row(row?)?);
    }
    Ok(users)
}

/// First active doctor by id, used as the upload fallback assignee.
pub fn find_any_active_doctor(conn: &Connection) -> Result<Option<i64>, DatabaseError> {
    let id = conn
        .query_row(
            "SELECT id FROM users WHERE role = 'doctor' AND status = 'active'
             ORDER BY id LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// First admin by id, the last-resort upload assignee.
pub fn find_any_admin(conn: &Connection) -> Result<Option<i64>, DatabaseError> {
    let id = conn
        .query_row(
            "SELECT id FROM users WHERE role = 'admin' ORDER BY id LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

// ── Row mapping ─────────────────────────────────────────────

struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    medical_id: Option<String>,
    status: String,
    created_at: String,
}

fn user_row(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: row.get(4)?,
        medical_id: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: row.id,
        name: row.name,
        email: row.email,
        password_hash: row.password_hash,
        role: Role::from_str(&row.role)?,
        medical_id: row.medical_id,
        status: UserStatus::from_str(&row.status)?,
        created_at: row.created_at,
    })
}

struct SummaryRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    status: String,
    created_at: String,
}

fn summary_row(row: &rusqlite::Row<'_>) -> Result<SummaryRow, rusqlite::Error> {
    Ok(SummaryRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn summary_from_row(row: SummaryRow) -> Result<UserSummary, DatabaseError> {
    Ok(UserSummary {
        id: row.id,
        name: row.name,
        email: row.email,
        role: Role::from_str(&row.role)?,
        status: UserStatus::from_str(&row.status)?,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn new_user(name: &str, email: &str, role: Role) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
            role,
            medical_id: None,
        }
    }

    #[test]
    fn create_user_creates_profile_and_settings() {
        let mut conn = open_memory_database().unwrap();
        let id = create_user(&mut conn, &new_user("Alice", "a@x.com", Role::Patient)).unwrap();

        let user = find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.status, UserStatus::Active);

        assert!(get_profile(&conn, id).unwrap().is_some());
        let settings = get_settings(&conn, id).unwrap().unwrap();
        assert!(settings.email_notifications);
        assert!(!settings.sms_notifications);
    }

    #[test]
    fn duplicate_email_rejected() {
        let mut conn = open_memory_database().unwrap();
        create_user(&mut conn, &new_user("A", "dup@x.com", Role::Patient)).unwrap();
        assert!(email_exists(&conn, "dup@x.com").unwrap());
        let err = create_user(&mut conn, &new_user("B", "dup@x.com", Role::Doctor));
        assert!(err.is_err());
    }

    #[test]
    fn list_users_filters_by_role_and_search() {
        let mut conn = open_memory_database().unwrap();
        create_user(&mut conn, &new_user("Dr Gray", "gray@x.com", Role::Doctor)).unwrap();
        create_user(&mut conn, &new_user("Pat Green", "green@x.com", Role::Patient)).unwrap();
        create_user(&mut conn, &new_user("Pat Brown", "brown@x.com", Role::Patient)).unwrap();

        let filter = UserFilter {
            role: Some("patient".into()),
            ..Default::default()
        };
        let page = Page::default();
        assert_eq!(count_users(&conn, &filter).unwrap(), 2);
        assert_eq!(list_users(&conn, &filter, &page).unwrap().len(), 2);

        let filter = UserFilter {
            search: Some("Gray".into()),
            ..Default::default()
        };
        let results = list_users(&conn, &filter, &page).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].email, "gray@x.com");
    }

    #[test]
    fn pagination_limits_results() {
        let mut conn = open_memory_database().unwrap();
        for i in 0..15 {
            create_user(
                &mut conn,
                &new_user(&format!("U{i}"), &format!("u{i}@x.com"), Role::Patient),
            )
            .unwrap();
        }
        let filter = UserFilter::default();
        assert_eq!(count_users(&conn, &filter).unwrap(), 15);
        let first = list_users(&conn, &filter, &Page { page: 1 }).unwrap();
        assert_eq!(first.len(), 10);
        let second = list_users(&conn, &filter, &Page { page: 2 }).unwrap();
        assert_eq!(second.len(), 5);
    }

    #[test]
    fn delete_refuses_admin() {
        let mut conn = open_memory_database().unwrap();
        let admin = create_user(&mut conn, &new_user("Root", "root@x.com", Role::Admin)).unwrap();
        let patient = create_user(&mut conn, &new_user("P", "p@x.com", Role::Patient)).unwrap();

        assert!(!delete_user(&conn, admin).unwrap());
        assert!(find_by_id(&conn, admin).unwrap().is_some());

        assert!(delete_user(&conn, patient).unwrap());
        assert!(find_by_id(&conn, patient).unwrap().is_none());
    }

    #[test]
    fn reset_token_expiry_enforced() {
        let mut conn = open_memory_database().unwrap();
        let id = create_user(&mut conn, &new_user("A", "a@x.com", Role::Patient)).unwrap();

        set_reset_token(&conn, id, "fresh", "2999-01-01 00:00:00").unwrap();
        assert!(find_by_reset_token(&conn, "fresh").unwrap().is_some());

        set_reset_token(&conn, id, "stale", "2000-01-01 00:00:00").unwrap();
        assert!(find_by_reset_token(&conn, "stale").unwrap().is_none());
    }

    #[test]
    fn doctor_registration_creates_doctor_profile() {
        let mut conn = open_memory_database().unwrap();
        let doc = create_user(&mut conn, &new_user("Doc", "d@x.com", Role::Doctor)).unwrap();
        let pat = create_user(&mut conn, &new_user("Pat", "p@x.com", Role::Patient)).unwrap();

        assert!(get_doctor_profile(&conn, doc).unwrap().is_some());
        assert!(get_doctor_profile(&conn, pat).unwrap().is_none());

        update_doctor_profile(
            &conn,
            &DoctorProfile {
                user_id: doc,
                phone: Some("555-0100".into()),
                specialization: Some("Cardiology".into()),
                qualification: Some("MD".into()),
            },
        )
        .unwrap();
        let profile = get_doctor_profile(&conn, doc).unwrap().unwrap();
        assert_eq!(profile.specialization.as_deref(), Some("Cardiology"));

        // Upsert also covers accounts promoted to doctor later
        update_doctor_profile(
            &conn,
            &DoctorProfile {
                user_id: pat,
                phone: None,
                specialization: Some("GP".into()),
                qualification: None,
            },
        )
        .unwrap();
        assert!(get_doctor_profile(&conn, pat).unwrap().is_some());
    }

    #[test]
    fn allergies_round_trip_as_list() {
        let mut conn = open_memory_database().unwrap();
        let id = create_user(&mut conn, &new_user("A", "a@x.com", Role::Patient)).unwrap();

        assert!(get_allergies(&conn, id).unwrap().is_empty());

        set_allergies(&conn, id, &["Penicillin".into(), "Latex".into()]).unwrap();
        assert_eq!(get_allergies(&conn, id).unwrap(), vec!["Penicillin", "Latex"]);

        set_allergies(&conn, id, &[]).unwrap();
        assert!(get_allergies(&conn, id).unwrap().is_empty());
    }

    #[test]
    fn password_reset_consumes_token_with_new_hash() {
        let mut conn = open_memory_database().unwrap();
        let id = create_user(&mut conn, &new_user("A", "a@x.com", Role::Patient)).unwrap();
        set_reset_token(&conn, id, "tok", "2999-01-01 00:00:00").unwrap();

        complete_password_reset(&mut conn, id, "newhash").unwrap();

        let user = find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(user.password_hash, "newhash");
        assert!(find_by_reset_token(&conn, "tok").unwrap().is_none());
    }

    #[test]
    fn upload_fallback_lookups() {
        let mut conn = open_memory_database().unwrap();
        assert!(find_any_active_doctor(&conn).unwrap().is_none());
        assert!(find_any_admin(&conn).unwrap().is_none());

        let admin = create_user(&mut conn, &new_user("Root", "r@x.com", Role::Admin)).unwrap();
        let doc = create_user(&mut conn, &new_user("Doc", "d@x.com", Role::Doctor)).unwrap();
        set_status(&conn, doc, UserStatus::Inactive).unwrap();

        // Inactive doctors are skipped
        assert!(find_any_active_doctor(&conn).unwrap().is_none());
        assert_eq!(find_any_admin(&conn).unwrap(), Some(admin));

        set_status(&conn, doc, UserStatus::Active).unwrap();
        assert_eq!(find_any_active_doctor(&conn).unwrap(), Some(doc));
    }
}
