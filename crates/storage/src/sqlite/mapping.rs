use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use tutor_core::model::{
    ConceptProgress, ConversationEntry, CourseId, Role, SessionKey, UnderstandingLevel, UserId,
};

use crate::repository::{SessionListing, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn db(e: sqlx::Error) -> StorageError {
    if is_unique_violation(&e) {
        return StorageError::Conflict;
    }
    StorageError::Connection(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(inner) if inner.is_unique_violation())
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn usize_to_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

/// Key columns as bound parameters.
pub(crate) fn key_params(key: SessionKey) -> Result<(i64, i64), StorageError> {
    Ok((
        u64_to_i64("user_id", key.user.value())?,
        u64_to_i64("course_id", key.course.value())?,
    ))
}

pub(crate) fn key_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionKey, StorageError> {
    let user = i64_to_u64("user_id", row.try_get::<i64, _>("user_id").map_err(ser)?)?;
    let course = i64_to_u64("course_id", row.try_get::<i64, _>("course_id").map_err(ser)?)?;
    Ok(SessionKey::new(UserId::new(user), CourseId::new(course)))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

pub(crate) fn from_json<T: DeserializeOwned>(
    field: &'static str,
    raw: &str,
) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field}: {e}")))
}

pub(crate) fn parse_level(s: &str) -> Result<UnderstandingLevel, StorageError> {
    s.parse().map_err(ser)
}

pub(crate) fn parse_role(s: &str) -> Result<Role, StorageError> {
    match s {
        "tutor" => Ok(Role::Tutor),
        "learner" => Ok(Role::Learner),
        "system" => Ok(Role::System),
        _ => Err(StorageError::Serialization(format!("invalid role: {s}"))),
    }
}

pub(crate) fn map_log_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ConversationEntry, StorageError> {
    let role: String = row.try_get("role").map_err(ser)?;
    Ok(ConversationEntry {
        role: parse_role(&role)?,
        text: row.try_get("text").map_err(ser)?,
        at: row.try_get("at").map_err(ser)?,
    })
}

pub(crate) fn map_concept_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ConceptProgress, StorageError> {
    let raw: String = row.try_get("progress").map_err(ser)?;
    let concept: ConceptProgress = from_json("concept progress", &raw)?;

    let name: String = row.try_get("name").map_err(ser)?;
    let position = i64_to_u64("position", row.try_get::<i64, _>("position").map_err(ser)?)?;
    if concept.name() != name || concept.position() != position {
        return Err(StorageError::Serialization(format!(
            "concept row {name} disagrees with its progress document"
        )));
    }
    Ok(concept)
}

pub(crate) fn map_listing_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SessionListing, StorageError> {
    let phase: String = row.try_get("phase").map_err(ser)?;
    Ok(SessionListing {
        key: key_from_row(row)?,
        topic: row.try_get("topic").map_err(ser)?,
        phase: from_json("phase", &phase)?,
        revision: i64_to_u64("revision", row.try_get::<i64, _>("revision").map_err(ser)?)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ids_are_rejected() {
        assert!(matches!(
            i64_to_u64("user_id", -1),
            Err(StorageError::Serialization(_))
        ));
        assert!(u64_to_i64("user_id", u64::MAX).is_err());
    }

    #[test]
    fn roles_parse_from_storage_text() {
        for role in [Role::Tutor, Role::Learner, Role::System] {
            assert_eq!(parse_role(role.as_str()).unwrap(), role);
        }
        assert!(parse_role("narrator").is_err());
    }
}
