use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};

use crate::model::node_types::EvidenceStatus;
use crate::model::repository::Evidence;

/// creates a new evidence record with status `new`. This does not check if the code is already taken,
/// so the caller must check that themselves
pub fn create_evidence(
    code: &str,
    name: &str,
    criteria_id: u32,
    created: NaiveDateTime,
    con: &Connection,
) -> Result<u32, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/evidence/create_evidence.sql"
    ))?;
    let id = pst.insert(params![code, name, criteria_id, created])? as u32;
    Ok(id)
}

pub fn get_by_id(id: u32, con: &Connection) -> Result<Evidence, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/evidence/get_evidence_by_id.sql"
    ))?;
    pst.query_row([id], map_evidence)
}

/// searches for the evidence with exactly the passed code.
///
/// if `None` is returned, that means there was no match
pub fn get_by_code(code: &str, con: &Connection) -> Result<Option<Evidence>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!(
        "../assets/queries/evidence/get_evidence_by_code.sql"
    ))?;
    match pst.query_row([code], map_evidence) {
        Ok(evidence) => Ok(Some(evidence)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn update_status(
    id: u32,
    status: EvidenceStatus,
    updated: NaiveDateTime,
    con: &Connection,
) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/evidence/update_status.sql"))?;
    pst.execute(params![status, updated, id])?;
    Ok(())
}

pub fn mark_touched(id: u32, updated: NaiveDateTime, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/evidence/touch_evidence.sql"))?;
    pst.execute(params![updated, id])?;
    Ok(())
}

/// the ids of every node (files and folders, at any depth) that belongs to the evidence
pub fn get_node_ids(id: u32, con: &Connection) -> Result<Vec<u32>, rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/evidence/get_node_ids.sql"))?;
    let rows = pst.query_map([id], |row| row.get(0))?;
    rows.collect()
}

fn map_evidence(row: &Row) -> Result<Evidence, rusqlite::Error> {
    Ok(Evidence {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        criteria_id: row.get(3)?,
        status: row.get(4)?,
        touched: row.get(5)?,
        create_date: row.get(6)?,
        update_date: row.get(7)?,
    })
}
