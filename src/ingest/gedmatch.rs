//! Parsing of GEDmatch segment CSV exports.

use std::fs::File;
use std::path::Path;

use super::{MatchRow, TriangleRow};

/// Module with code for parsing the CSVs.
pub mod input {
    use serde::Deserialize;

    /// One row of a GEDmatch pairwise segment match export.
    #[derive(Debug, Deserialize)]
    pub struct MatchRecord {
        #[serde(rename = "PrimaryKit")]
        pub primary_kit: String,
        #[serde(rename = "MatchedKit")]
        pub matched_kit: String,
        #[serde(rename = "chr")]
        pub chromosome: String,
        #[serde(rename = "B37Start")]
        pub start: i64,
        #[serde(rename = "B37End")]
        pub end: i64,
        #[serde(rename = "Segment cM")]
        pub segment_cm: Option<f64>,
        #[serde(rename = "MatchedName")]
        pub matched_name: Option<String>,
        #[serde(rename = "Matched Sex")]
        pub matched_sex: Option<String>,
        #[serde(rename = "MatchedEmail")]
        pub matched_email: Option<String>,
    }

    /// One row of a GEDmatch triangulation export.
    ///
    /// The source kit does not appear in the file itself and is supplied
    /// by the caller.
    #[derive(Debug, Deserialize)]
    pub struct TriangleRecord {
        #[serde(rename = "Kit1 Number")]
        pub kit1_number: String,
        #[serde(rename = "Kit1 Name")]
        pub kit1_name: Option<String>,
        #[serde(rename = "Kit1 Email")]
        pub kit1_email: Option<String>,
        #[serde(rename = "Kit2 Number")]
        pub kit2_number: String,
        #[serde(rename = "Kit2 Name")]
        pub kit2_name: Option<String>,
        #[serde(rename = "Kit2 Email")]
        pub kit2_email: Option<String>,
        #[serde(rename = "Chr")]
        pub chromosome: String,
        #[serde(rename = "B37 Start")]
        pub start: i64,
        #[serde(rename = "B37 End")]
        pub end: i64,
        #[serde(rename = "cM")]
        pub cm: Option<f64>,
    }
}

/// Column headers of a pairwise match export.
const MATCH_HEADERS: &[&str] = &[
    "PrimaryKit",
    "MatchedKit",
    "chr",
    "B37Start",
    "B37End",
    "Segment cM",
    "MatchedName",
    "Matched Sex",
    "MatchedEmail",
];

/// Column headers of a triangulation export.
const TRIANGLE_HEADERS: &[&str] = &[
    "Kit1 Number",
    "Kit1 Name",
    "Kit1 Email",
    "Kit2 Number",
    "Kit2 Name",
    "Kit2 Email",
    "Chr",
    "B37 Start",
    "B37 End",
    "cM",
];

fn has_headers<P>(path: P, expected: &[&str]) -> bool
where
    P: AsRef<Path>,
{
    let Ok(file) = File::open(path.as_ref()) else {
        return false;
    };
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    match reader.headers() {
        Ok(headers) => {
            let headers = headers.iter().collect::<Vec<_>>();
            expected.iter().all(|name| headers.contains(name))
        }
        Err(_) => false,
    }
}

/// Check whether the file at `path` looks like a GEDmatch pairwise match
/// export.
pub fn is_match_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    has_headers(path, MATCH_HEADERS)
}

/// Check whether the file at `path` looks like a GEDmatch triangulation
/// export.
pub fn is_triangle_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    has_headers(path, TRIANGLE_HEADERS)
}

/// Read a GEDmatch pairwise match export.
pub fn read_matches<P>(path: P) -> Result<Vec<MatchRow>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path.as_ref())?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let record: input::MatchRecord = record?;
        rows.push(MatchRow {
            kit1: record.primary_kit,
            kit2: record.matched_kit,
            chromosome: record.chromosome,
            start: record.start,
            end: record.end,
            length: record.segment_cm,
            name: record.matched_name,
            email: record.matched_email,
            sex: record.matched_sex,
        });
    }
    Ok(rows)
}

/// Read a GEDmatch triangulation export for the given source kit.
pub fn read_triangles<P>(path: P, source: &str) -> Result<Vec<TriangleRow>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path.as_ref())?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let record: input::TriangleRecord = record?;
        rows.push(TriangleRow {
            kit1: source.to_owned(),
            kit2: record.kit1_number,
            kit3: record.kit2_number,
            chromosome: record.chromosome,
            start: record.start,
            end: record.end,
            length: record.cm,
            name2: record.kit1_name,
            email2: record.kit1_email,
            name3: record.kit2_name,
            email3: record.kit2_email,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const MATCHES_CSV: &str = "\
PrimaryKit,MatchedKit,chr,B37Start,B37End,Segment cM,MatchedName,Matched Sex,MatchedEmail
A100,B200,1,100000,2000000,7.5,Beth,F,beth@example.com
A100,C300,X,5000,900000,9.1,,,
";

    const TRIANGLES_CSV: &str = "\
Kit1 Number,Kit1 Name,Kit1 Email,Kit2 Number,Kit2 Name,Kit2 Email,Chr,B37 Start,B37 End,cM
B200,Bob,bob@example.com,C300,Carol,carol@example.com,5,600,700,2.0
";

    #[test]
    fn detects_file_kinds() {
        let matches = write_tmp(MATCHES_CSV);
        let triangles = write_tmp(TRIANGLES_CSV);

        assert!(super::is_match_file(matches.path()));
        assert!(!super::is_triangle_file(matches.path()));
        assert!(super::is_triangle_file(triangles.path()));
        assert!(!super::is_match_file(triangles.path()));
        assert!(!super::is_match_file("/no/such/file.csv"));
    }

    #[test]
    fn reads_matches() -> Result<(), anyhow::Error> {
        let file = write_tmp(MATCHES_CSV);

        let rows = super::read_matches(file.path())?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kit1, "A100");
        assert_eq!(rows[0].kit2, "B200");
        assert_eq!(rows[0].chromosome, "1");
        assert_eq!(rows[0].start, 100_000);
        assert_eq!(rows[0].end, 2_000_000);
        assert_eq!(rows[0].length, Some(7.5));
        assert_eq!(rows[0].sex.as_deref(), Some("F"));
        assert_eq!(rows[1].chromosome, "X");
        assert_eq!(rows[1].name, None);

        Ok(())
    }

    #[test]
    fn reads_triangles_with_source() -> Result<(), anyhow::Error> {
        let file = write_tmp(TRIANGLES_CSV);

        let rows = super::read_triangles(file.path(), "A100")?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kit1, "A100");
        assert_eq!(rows[0].kit2, "B200");
        assert_eq!(rows[0].kit3, "C300");
        assert_eq!(rows[0].length, Some(2.0));
        assert_eq!(rows[0].name3.as_deref(), Some("Carol"));

        Ok(())
    }
}
