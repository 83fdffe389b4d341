use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::DATETIME_FMT;
use crate::db::DatabaseError;
use crate::models::enums::ChunkStatus;
use crate::models::{Chunk, ChunkMetadata, ChunkSummary};

pub fn insert_chunk(conn: &Connection, chunk: &Chunk) -> Result<(), DatabaseError> {
    let metadata = serde_json::to_string(&chunk.metadata).map_err(|e| {
        DatabaseError::MalformedJson {
            column: "chunks.metadata".into(),
            reason: e.to_string(),
        }
    })?;
    conn.execute(
        "INSERT INTO chunks (id, course_id, course_name, section_title, content, display_content,
                             word_count, status, target_count, metadata, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            chunk.id,
            chunk.course_id,
            chunk.course_name,
            chunk.section_title,
            chunk.content,
            chunk.display_content,
            chunk.word_count,
            chunk.status.map(|s| s.as_str()),
            chunk.target_count,
            metadata,
            chunk.updated_at.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_chunk(conn: &Connection, chunk_id: &str) -> Result<Option<Chunk>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, course_id, course_name, section_title, content, display_content,
                    word_count, status, target_count, metadata, updated_at
             FROM chunks WHERE id = ?1",
            params![chunk_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<u32>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                ))
            },
        )
        .optional()?;

    let Some((
        id,
        course_id,
        course_name,
        section_title,
        content,
        display_content,
        word_count,
        status,
        target_count,
        metadata,
        updated_at,
    )) = row
    else {
        return Ok(None);
    };

    Ok(Some(Chunk {
        id,
        course_id,
        course_name,
        section_title,
        content,
        display_content,
        word_count,
        status: status.as_deref().map(ChunkStatus::from_str).transpose()?,
        target_count,
        metadata: parse_metadata(metadata.as_deref()),
        updated_at: NaiveDateTime::parse_from_str(&updated_at, DATETIME_FMT).unwrap_or_default(),
    }))
}

/// Course and section identity only, without loading the chunk text.
pub fn get_chunk_summary(
    conn: &Connection,
    chunk_id: &str,
) -> Result<Option<ChunkSummary>, DatabaseError> {
    let summary = conn
        .query_row(
            "SELECT course_id, course_name, section_title FROM chunks WHERE id = ?1",
            params![chunk_id],
            |row| {
                Ok(ChunkSummary {
                    course_id: row.get(0)?,
                    course_name: row.get(1)?,
                    section_title: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(summary)
}

/// Atomically mark a chunk PROCESSING.
///
/// Fails (returns `false`) when another run holds a PROCESSING claim that was
/// refreshed within `stale_after_secs`. Older claims are taken over.
pub fn claim_chunk(
    conn: &Connection,
    chunk_id: &str,
    stale_after_secs: u64,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE chunks SET status = 'PROCESSING', updated_at = datetime('now')
         WHERE id = ?1
           AND (status IS NULL OR status != 'PROCESSING'
                OR updated_at < datetime('now', ?2))",
        params![chunk_id, format!("-{stale_after_secs} seconds")],
    )?;
    Ok(affected == 1)
}

/// Extend a held PROCESSING claim so it does not go stale mid-run.
/// `false` when the chunk is no longer PROCESSING.
pub fn refresh_claim(conn: &Connection, chunk_id: &str) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE chunks SET updated_at = datetime('now')
         WHERE id = ?1 AND status = 'PROCESSING'",
        params![chunk_id],
    )?;
    Ok(affected == 1)
}

pub fn update_chunk_status(
    conn: &Connection,
    chunk_id: &str,
    status: ChunkStatus,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE chunks SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![chunk_id, status.as_str()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Chunk".into(),
            id: chunk_id.into(),
        });
    }
    Ok(())
}

/// Persist the concept map into chunk metadata and set the target count.
pub fn save_chunk_metadata(
    conn: &Connection,
    chunk_id: &str,
    metadata: &ChunkMetadata,
    target_count: u32,
) -> Result<(), DatabaseError> {
    let json = serde_json::to_string(metadata).map_err(|e| DatabaseError::MalformedJson {
        column: "chunks.metadata".into(),
        reason: e.to_string(),
    })?;
    let affected = conn.execute(
        "UPDATE chunks SET metadata = ?2, target_count = ?3, updated_at = datetime('now')
         WHERE id = ?1",
        params![chunk_id, json, target_count],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Chunk".into(),
            id: chunk_id.into(),
        });
    }
    Ok(())
}

fn parse_metadata(raw: Option<&str>) -> ChunkMetadata {
    match raw {
        Some(json) if !json.trim().is_empty() => serde_json::from_str(json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unreadable chunk metadata, ignoring stored concept map");
            ChunkMetadata::default()
        }),
        _ => ChunkMetadata::default(),
    }
}
