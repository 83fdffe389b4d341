use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;

/// How many recent diagnoses are scanned when collecting distinct ones.
const DIAGNOSIS_SCAN_LIMIT: u32 = 10;

/// Consecutive wrong answers a learner has given on one question.
pub fn get_consecutive_fails(
    conn: &Connection,
    user_id: &str,
    question_id: &str,
) -> Result<u32, DatabaseError> {
    let fails = conn
        .query_row(
            "SELECT consecutive_fails FROM learner_question_status
             WHERE user_id = ?1 AND question_id = ?2",
            params![user_id, question_id],
            |row| row.get::<_, u32>(0),
        )
        .optional()?;
    Ok(fails.unwrap_or(0))
}

/// Record an answer and update the learner's failure streak on that question.
/// Answers are written by the quiz front end; this mirrors its writes for tests.
#[cfg(test)]
pub fn record_answer(
    conn: &Connection,
    user_id: &str,
    question_id: &str,
    chunk_id: &str,
    is_correct: bool,
    diagnosis: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO learner_answers (id, user_id, question_id, chunk_id, is_correct, diagnosis)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            uuid::Uuid::new_v4().to_string(),
            user_id,
            question_id,
            chunk_id,
            is_correct,
            diagnosis.filter(|d| !d.trim().is_empty()),
        ],
    )?;

    conn.execute(
        "INSERT INTO learner_question_status (user_id, question_id, consecutive_fails)
         VALUES (?1, ?2, CASE WHEN ?3 THEN 0 ELSE 1 END)
         ON CONFLICT(user_id, question_id) DO UPDATE SET
           consecutive_fails = CASE WHEN ?3 THEN 0 ELSE consecutive_fails + 1 END,
           updated_at = datetime('now')",
        params![user_id, question_id, is_correct],
    )?;
    Ok(())
}

/// Most recent distinct diagnoses recorded for a learner on a chunk.
///
/// Scans the latest non-null diagnoses (newest first) and keeps the first
/// `keep` distinct strings in that order.
pub fn recent_distinct_diagnoses(
    conn: &Connection,
    user_id: &str,
    chunk_id: &str,
    keep: usize,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT diagnosis FROM learner_answers
         WHERE user_id = ?1 AND chunk_id = ?2 AND diagnosis IS NOT NULL
         ORDER BY answered_at DESC, rowid DESC
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![user_id, chunk_id, DIAGNOSIS_SCAN_LIMIT], |row| {
        row.get::<_, String>(0)
    })?;

    let mut distinct: Vec<String> = Vec::new();
    for row in rows {
        let diagnosis = row?;
        if distinct.len() >= keep {
            break;
        }
        if !distinct.contains(&diagnosis) {
            distinct.push(diagnosis);
        }
    }
    Ok(distinct)
}
