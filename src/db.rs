use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};

use crate::errors::InputError;
use crate::matcher::{ArtistDetails, MatchResult, MatchType};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Reviewer verdicts on OCR candidates, keyed by lowercased text
        CREATE TABLE IF NOT EXISTS feedback (
            text_key   TEXT PRIMARY KEY,
            text       TEXT NOT NULL,
            is_artist  BOOLEAN NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_feedback_is_artist ON feedback(is_artist);

        CREATE TABLE IF NOT EXISTS lineups (
            id       INTEGER PRIMARY KEY,
            name     TEXT UNIQUE NOT NULL,
            saved_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS lineup_artists (
            id            INTEGER PRIMARY KEY,
            lineup_id     INTEGER NOT NULL REFERENCES lineups(id) ON DELETE CASCADE,
            searched_name TEXT NOT NULL,
            matched_name  TEXT,
            profile_url   TEXT NOT NULL,
            match_type    TEXT NOT NULL CHECK(match_type IN ('exact','fuzzy','none')),
            confidence    REAL NOT NULL DEFAULT 0,
            details       TEXT,
            UNIQUE(lineup_id, searched_name)
        );
        CREATE INDEX IF NOT EXISTS idx_lineup_artists_lineup ON lineup_artists(lineup_id);
        ",
    )?;

    // Databases created before artist details were stored.
    let has_details: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('lineup_artists') WHERE name = 'details'",
        [],
        |row| row.get(0),
    )?;
    if !has_details {
        conn.execute_batch("ALTER TABLE lineup_artists ADD COLUMN details TEXT;")?;
    }
    Ok(())
}

// ── Feedback ──

/// Upsert a verdict; the latest verdict for the same lowercased text wins.
pub fn record_feedback(conn: &Connection, text: &str, is_artist: bool) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        return Err(InputError::MissingParameter("text").into());
    }
    conn.execute(
        "INSERT INTO feedback (text_key, text, is_artist) VALUES (?1, ?2, ?3)
         ON CONFLICT(text_key) DO UPDATE SET
            text = excluded.text,
            is_artist = excluded.is_artist,
            updated_at = datetime('now')",
        rusqlite::params![text.to_lowercase(), text, is_artist],
    )?;
    Ok(())
}

fn feedback_texts(conn: &Connection, is_artist: bool) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT text FROM feedback WHERE is_artist = ?1 ORDER BY text_key")?;
    let rows = stmt
        .query_map([is_artist], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Texts reviewers rejected as artists. Fed to the segmenter's deny-list.
pub fn excluded_words(conn: &Connection) -> Result<Vec<String>> {
    feedback_texts(conn, false)
}

pub fn known_artists(conn: &Connection) -> Result<Vec<String>> {
    feedback_texts(conn, true)
}

// ── Lineups ──

pub struct LineupSummary {
    pub name: String,
    pub saved_at: NaiveDateTime,
    pub artists: usize,
}

/// Store resolved results under `name`, replacing any earlier save of that lineup.
pub fn save_lineup(conn: &Connection, name: &str, results: &[MatchResult]) -> Result<usize> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InputError::MissingParameter("lineup name").into());
    }

    let tx = conn.unchecked_transaction()?;
    let lineup_id: i64 = tx.query_row(
        "INSERT INTO lineups (name) VALUES (?1)
         ON CONFLICT(name) DO UPDATE SET saved_at = datetime('now')
         RETURNING id",
        [name],
        |row| row.get(0),
    )?;
    tx.execute("DELETE FROM lineup_artists WHERE lineup_id = ?1", [lineup_id])?;

    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO lineup_artists
                (lineup_id, searched_name, matched_name, profile_url, match_type, confidence, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in results {
            let details = r.details.as_ref().map(serde_json::to_string).transpose()?;
            count += stmt.execute(rusqlite::params![
                lineup_id,
                r.searched_name,
                r.matched_name,
                r.profile_url,
                r.match_type.as_str(),
                r.confidence,
                details,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Saved results sorted alphabetically by display name, or `None` for an unknown lineup.
pub fn fetch_lineup(conn: &Connection, name: &str) -> Result<Option<Vec<MatchResult>>> {
    let lineup_id: Option<i64> = conn
        .query_row("SELECT id FROM lineups WHERE name = ?1", [name.trim()], |row| row.get(0))
        .optional()?;
    let Some(lineup_id) = lineup_id else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT searched_name, matched_name, profile_url, match_type, confidence, details
         FROM lineup_artists
         WHERE lineup_id = ?1
         ORDER BY COALESCE(matched_name, searched_name) COLLATE NOCASE, searched_name",
    )?;
    let rows = stmt
        .query_map([lineup_id], |row| {
            let match_type: String = row.get(3)?;
            let match_type: MatchType = match_type
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;
            let details: Option<String> = row.get(5)?;
            let details = details
                .map(|json| serde_json::from_str::<ArtistDetails>(&json))
                .transpose()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;
            Ok(MatchResult {
                searched_name: row.get(0)?,
                matched_name: row.get(1)?,
                profile_url: row.get(2)?,
                match_type,
                confidence: row.get(4)?,
                details,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(rows))
}

pub fn list_lineups(conn: &Connection) -> Result<Vec<LineupSummary>> {
    let mut stmt = conn.prepare(
        "SELECT l.name, l.saved_at, COUNT(a.id)
         FROM lineups l
         LEFT JOIN lineup_artists a ON a.lineup_id = l.id
         GROUP BY l.id
         ORDER BY l.saved_at DESC, l.name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LineupSummary {
                name: row.get(0)?,
                saved_at: row.get(1)?,
                artists: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::TopTrack;
    use pretty_assertions::assert_eq;

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn result(searched: &str, matched: Option<&str>, match_type: MatchType) -> MatchResult {
        MatchResult {
            searched_name: searched.into(),
            matched_name: matched.map(Into::into),
            profile_url: format!("https://open.spotify.com/search/{searched}"),
            match_type,
            confidence: if match_type == MatchType::None { 0.0 } else { 1.0 },
            details: None,
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = mem();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn feedback_latest_verdict_wins() {
        let conn = mem();
        record_feedback(&conn, "MERRITT", false).unwrap();
        record_feedback(&conn, "Bonobo", true).unwrap();
        record_feedback(&conn, "Soul Clap", false).unwrap();
        record_feedback(&conn, "soul clap", true).unwrap();

        assert_eq!(excluded_words(&conn).unwrap(), vec!["MERRITT"]);
        assert_eq!(known_artists(&conn).unwrap(), vec!["Bonobo", "soul clap"]);
    }

    #[test]
    fn feedback_requires_text() {
        let conn = mem();
        let err = record_feedback(&conn, "   ", true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::MissingParameter("text"))
        ));
    }

    #[test]
    fn lineup_round_trip_sorted() {
        let conn = mem();
        let results = vec![
            result("soul clap", Some("Soul Clap"), MatchType::Exact),
            result("Xyz Unknown", None, MatchType::None),
            result("bonobo", Some("Bonobo"), MatchType::Exact),
        ];
        assert_eq!(save_lineup(&conn, "Elements 2022", &results).unwrap(), 3);

        let fetched = fetch_lineup(&conn, "Elements 2022").unwrap().unwrap();
        let names: Vec<_> = fetched.iter().map(|r| r.searched_name.as_str()).collect();
        assert_eq!(names, vec!["bonobo", "soul clap", "Xyz Unknown"]);
        assert_eq!(fetched[2].match_type, MatchType::None);
        assert_eq!(fetched[2].matched_name, None);
    }

    #[test]
    fn resaving_replaces_artists() {
        let conn = mem();
        save_lineup(&conn, "Basscoast", &[result("Caribou", Some("Caribou"), MatchType::Exact)]).unwrap();
        save_lineup(&conn, "Basscoast", &[result("Four Tet", Some("Four Tet"), MatchType::Exact)]).unwrap();

        let fetched = fetch_lineup(&conn, "Basscoast").unwrap().unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].searched_name, "Four Tet");

        let lineups = list_lineups(&conn).unwrap();
        assert_eq!(lineups.len(), 1);
        assert_eq!(lineups[0].artists, 1);
    }

    #[test]
    fn details_survive_a_save() {
        let conn = mem();
        let details = ArtistDetails {
            genres: vec!["ambient".into()],
            popularity: Some(62),
            followers: Some(1_500_000),
            top_tracks: vec![TopTrack {
                name: "Kerala".into(),
                spotify_url: Some("https://open.spotify.com/track/abc".into()),
                preview_url: None,
            }],
            ..ArtistDetails::default()
        };
        let bonobo = MatchResult {
            details: Some(details.clone()),
            ..result("Bonobo", Some("Bonobo"), MatchType::Exact)
        };
        save_lineup(&conn, "Shambhala", &[bonobo, result("Nobody", None, MatchType::None)]).unwrap();

        let fetched = fetch_lineup(&conn, "Shambhala").unwrap().unwrap();
        assert_eq!(fetched[0].details, Some(details));
        assert_eq!(fetched[1].details, None);
    }

    #[test]
    fn details_column_added_to_older_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE lineup_artists (
                id INTEGER PRIMARY KEY, lineup_id INTEGER NOT NULL, searched_name TEXT NOT NULL,
                matched_name TEXT, profile_url TEXT NOT NULL, match_type TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0
            );",
        )
        .unwrap();
        init_schema(&conn).unwrap();
        save_lineup(&conn, "Old", &[result("Caribou", Some("Caribou"), MatchType::Exact)]).unwrap();
        assert_eq!(fetch_lineup(&conn, "Old").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn unknown_lineup_is_none() {
        let conn = mem();
        assert!(fetch_lineup(&conn, "nope").unwrap().is_none());
    }
}
