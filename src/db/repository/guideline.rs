use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::SubjectGuideline;

pub fn get_subject_guideline(
    conn: &Connection,
    course_id: &str,
) -> Result<Option<SubjectGuideline>, DatabaseError> {
    let guideline = conn
        .query_row(
            "SELECT instruction, good_example, bad_example
             FROM subject_guidelines WHERE course_id = ?1",
            params![course_id],
            |row| {
                Ok(SubjectGuideline {
                    instruction: row.get(0)?,
                    good_example: row.get(1)?,
                    bad_example: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(guideline)
}

/// Insert or replace the guideline for a course. Guidelines are authored
/// outside this crate; tests seed them through here.
#[cfg(test)]
pub fn upsert_subject_guideline(
    conn: &Connection,
    course_id: &str,
    guideline: &SubjectGuideline,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO subject_guidelines (course_id, instruction, good_example, bad_example)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(course_id) DO UPDATE SET
           instruction = excluded.instruction,
           good_example = excluded.good_example,
           bad_example = excluded.bad_example,
           updated_at = datetime('now')",
        params![
            course_id,
            guideline.instruction,
            guideline.good_example,
            guideline.bad_example,
        ],
    )?;
    Ok(())
}
