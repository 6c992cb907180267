use std::backtrace::Backtrace;

use rusqlite::Connection;

/// returns the current version of the database as a String
pub fn get_version(con: &Connection) -> Result<String, rusqlite::Error> {
    con.query_row(
        include_str!("../assets/queries/metadata/get_version.sql"),
        [],
        |row| row.get(0),
    )
}

pub fn set_version(version: u64, con: &Connection) -> Result<(), rusqlite::Error> {
    let mut pst = con.prepare(include_str!("../assets/queries/metadata/set_version.sql"))?;
    match pst.execute([version.to_string()]) {
        Ok(_) => Ok(()),
        Err(e) => {
            log::error!(
                "Failed to set database version to {version}. Nested exception is {e:?}\n{}",
                Backtrace::force_capture()
            );
            Err(e)
        }
    }
}
