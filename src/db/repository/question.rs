use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::DATETIME_FMT;
use crate::db::DatabaseError;
use crate::models::enums::{CognitiveLevel, UsagePhase};
use crate::models::{NewQuestion, QuestionBody, StoredQuestion};

const QUESTION_COLUMNS: &str = "id, chunk_id, course_id, section_title, usage_phase, cognitive_level,
     question_data, concept_title, parent_question_id, created_by, created_at";

/// Insert a question and return its id.
///
/// Questions without evidence are refused before they reach SQLite.
pub fn insert_question(conn: &Connection, question: &NewQuestion) -> Result<String, DatabaseError> {
    let body = &question.question.body;
    if !body.has_evidence() {
        return Err(DatabaseError::ConstraintViolation(
            "question evidence must not be empty".into(),
        ));
    }

    let data = serde_json::to_string(body).map_err(|e| DatabaseError::MalformedJson {
        column: "questions.question_data".into(),
        reason: e.to_string(),
    })?;
    let id = NewQuestion::new_id();
    let concept = question.question.concept_title.trim();

    conn.execute(
        "INSERT INTO questions (id, chunk_id, course_id, section_title, usage_phase, cognitive_level,
                                question_data, concept_title, parent_question_id, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id,
            question.chunk_id,
            question.course_id,
            question.section_title,
            question.usage_phase.as_str(),
            question.question.cognitive_level.as_str(),
            data,
            (!concept.is_empty()).then_some(concept),
            question.parent_question_id,
            question.created_by,
        ],
    )?;
    Ok(id)
}

pub fn get_question(
    conn: &Connection,
    question_id: &str,
) -> Result<Option<StoredQuestion>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"),
            params![question_id],
            read_question_row,
        )
        .optional()?;
    row.map(row_to_stored_question).transpose()
}

/// Questions of a chunk in insertion order.
#[cfg(test)]
pub fn list_questions_for_chunk(
    conn: &Connection,
    chunk_id: &str,
) -> Result<Vec<StoredQuestion>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE chunk_id = ?1 ORDER BY created_at, rowid"
    ))?;
    let rows = stmt.query_map(params![chunk_id], read_question_row)?;

    let mut questions = Vec::new();
    for row in rows {
        questions.push(row_to_stored_question(row?)?);
    }
    Ok(questions)
}

/// Master-set question count per usage phase for a chunk. Follow-ups (rows
/// with a parent question) are not counted. Phases without rows are absent.
pub fn count_questions_by_phase(
    conn: &Connection,
    chunk_id: &str,
) -> Result<HashMap<UsagePhase, u32>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT usage_phase, COUNT(*) FROM questions
         WHERE chunk_id = ?1 AND parent_question_id IS NULL
         GROUP BY usage_phase",
    )?;
    let rows = stmt.query_map(params![chunk_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
    })?;

    let mut counts = HashMap::new();
    for row in rows {
        let (phase, count) = row?;
        counts.insert(UsagePhase::from_str(&phase)?, count);
    }
    Ok(counts)
}

type QuestionRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn read_question_row(row: &rusqlite::Row) -> Result<QuestionRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn row_to_stored_question(row: QuestionRow) -> Result<StoredQuestion, DatabaseError> {
    let (
        id,
        chunk_id,
        course_id,
        section_title,
        usage_phase,
        cognitive_level,
        data,
        concept_title,
        parent_question_id,
        created_by,
        created_at,
    ) = row;

    let body: QuestionBody =
        serde_json::from_str(&data).map_err(|e| DatabaseError::MalformedJson {
            column: "questions.question_data".into(),
            reason: e.to_string(),
        })?;

    Ok(StoredQuestion {
        id,
        chunk_id,
        course_id,
        section_title,
        usage_phase: UsagePhase::from_str(&usage_phase)?,
        cognitive_level: CognitiveLevel::from_str(&cognitive_level)?,
        body,
        concept_title,
        parent_question_id,
        created_by,
        created_at: NaiveDateTime::parse_from_str(&created_at, DATETIME_FMT).unwrap_or_default(),
    })
}
