//! CSV ingestion and export.
//!
//! Reading keeps every original column so the export can echo the input
//! rows with a `team` column appended.

use super::types::{Roster, StudentId, StudentRecord};
use crate::error::RosterError;
use crate::teams::Assignment;
use std::io::{Read, Write};
use tracing::{debug, info};

/// Names of the columns holding the three attributes the model needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub lab: String,
    pub gender: String,
    pub score: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            lab: "lab".into(),
            gender: "gender".into(),
            score: "wam".into(),
        }
    }
}

/// A roster together with the raw table it was read from.
///
/// Row `i` of the table is student `StudentId(i)`.
#[derive(Debug, Clone)]
pub struct RosterTable {
    pub headers: csv::StringRecord,
    pub rows: Vec<csv::StringRecord>,
    pub roster: Roster,
}

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize, RosterError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| RosterError::MissingColumn(name.to_string()))
}

/// Reads a roster from CSV with a header row.
pub fn read_roster_csv<R: Read>(reader: R, columns: &ColumnMap) -> Result<RosterTable, RosterError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let lab_col = column(&headers, &columns.lab)?;
    let gender_col = column(&headers, &columns.gender)?;
    let score_col = column(&headers, &columns.score)?;
    debug!(lab_col, gender_col, score_col, "resolved roster columns");

    let mut rows = Vec::new();
    let mut records = Vec::new();
    for (row, result) in csv_reader.records().enumerate() {
        let record = result?;
        let field = |col: usize| record.get(col).unwrap_or("").trim().to_string();
        let raw_score = field(score_col);
        let score = raw_score
            .parse::<f64>()
            .map_err(|_| RosterError::InvalidScore {
                row,
                value: raw_score.clone(),
            })?;
        records.push(StudentRecord::new(field(lab_col), field(gender_col), score));
        rows.push(record);
    }

    let roster = Roster::new(records)?;
    info!(students = roster.len(), labs = roster.labs().len(), "roster loaded");
    Ok(RosterTable {
        headers,
        rows,
        roster,
    })
}

/// Writes the input rows back out with a trailing `team` column.
///
/// Students without a team (never the case for a complete
/// [`Assignment`]) get an empty cell.
pub fn write_teams_csv<W: Write>(
    writer: W,
    table: &RosterTable,
    assignment: &Assignment,
) -> Result<(), RosterError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut headers = table.headers.clone();
    headers.push_field("team");
    csv_writer.write_record(&headers)?;

    for (row, record) in table.rows.iter().enumerate() {
        let mut out = record.clone();
        let team = assignment
            .team_of(StudentId(row))
            .map(|t| t.to_string())
            .unwrap_or_default();
        out.push_field(&team);
        csv_writer.write_record(&out)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Gender;
    use crate::teams::{Bounds, TeamFormer};
    use std::time::Duration;

    const CSV: &str = "\
first_name,gender,wam,lab
Ana,F,71.5,1
Ben,M,64.0,1
Cai,F,80.25,1
Dev,M,58.0,1
";

    #[test]
    fn test_read_roster() {
        let table = read_roster_csv(CSV.as_bytes(), &ColumnMap::default()).unwrap();
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.roster.len(), 4);
        assert_eq!(table.roster.students()[0].gender, Gender::Female);
        assert!((table.roster.students()[2].score - 80.25).abs() < 1e-12);
    }

    #[test]
    fn test_missing_column() {
        let columns = ColumnMap {
            score: "gpa".into(),
            ..ColumnMap::default()
        };
        let err = read_roster_csv(CSV.as_bytes(), &columns).unwrap_err();
        assert!(matches!(err, RosterError::MissingColumn(name) if name == "gpa"));
    }

    #[test]
    fn test_invalid_score() {
        let data = "gender,wam,lab\nM,abc,1\n";
        let err = read_roster_csv(data.as_bytes(), &ColumnMap::default()).unwrap_err();
        assert!(matches!(err, RosterError::InvalidScore { row: 0, .. }));
    }

    #[test]
    fn test_export_round_trip_through_file() {
        let table = read_roster_csv(CSV.as_bytes(), &ColumnMap::default()).unwrap();
        let bounds = Bounds::new(2, 4, 2).with_max_solve_time(Duration::from_secs(5));
        let formation = TeamFormer::new(bounds).form(&table.roster).unwrap();
        let assignment = formation.assignment().unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        write_teams_csv(file.reopen().unwrap(), &table, &assignment).unwrap();

        let mut reader = csv::Reader::from_path(file.path()).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().last(), Some("team"));
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[1][0], "Ben");
        for (i, row) in rows.iter().enumerate() {
            let team: usize = row[4].parse().unwrap();
            assert_eq!(assignment.team_of(StudentId(i)), Some(team));
        }
    }
}
