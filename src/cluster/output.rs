//! Writing cluster results to CSV.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::cluster::engine::Branch;

/// One result row, in external kit ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub kit: String,
    /// Ahnentafel number of the most distant ancestral node reached.
    pub ahnentafel: Option<u64>,
    /// Ahnentafel number of the node the kit was declared a seed on.
    pub seed: Option<u64>,
    /// Per-depth label and confidence.
    pub labels: BTreeMap<u32, (Option<Branch>, f64)>,
}

/// Write the result table with per-depth `label<n>`/`confidence<n>`
/// columns for `depth` levels.
pub fn write_clusters<W>(writer: W, depth: u32, rows: &[ResultRow]) -> Result<(), anyhow::Error>
where
    W: Write,
{
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    let mut header = vec!["kit".to_string(), "ahnentafel".into(), "seed".into()];
    for level in 0..depth {
        header.push(format!("label{}", level));
        header.push(format!("confidence{}", level));
    }
    csv_writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.kit.clone(),
            row.ahnentafel.map(|a| a.to_string()).unwrap_or_default(),
            row.seed.map(|a| a.to_string()).unwrap_or_default(),
        ];
        for level in 0..depth {
            match row.labels.get(&level) {
                Some((label, confidence)) => {
                    record.push(label.map(|branch| branch.to_string()).unwrap_or_default());
                    record.push(confidence.to_string());
                }
                None => {
                    record.push(String::new());
                    record.push(String::new());
                }
            }
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;

    Ok(())
}

/// Write the result table to a file.
pub fn write_clusters_path<P>(
    path: P,
    depth: u32,
    rows: &[ResultRow],
) -> Result<(), anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = std::fs::File::create(path.as_ref())?;
    write_clusters(file, depth, rows)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::ResultRow;
    use crate::cluster::engine::Branch;

    #[test]
    fn writes_depth_columns() -> Result<(), anyhow::Error> {
        let rows = vec![
            ResultRow {
                kit: "A1".into(),
                ahnentafel: Some(4),
                seed: Some(4),
                labels: BTreeMap::from([
                    (0, (Some(Branch::Paternal), 1.0)),
                    (1, (Some(Branch::Paternal), 0.5)),
                ]),
            },
            ResultRow {
                kit: "B2".into(),
                ahnentafel: Some(1),
                seed: None,
                labels: BTreeMap::from([(0, (None, 0.0))]),
            },
        ];

        let mut buffer = Vec::new();
        super::write_clusters(&mut buffer, 2, &rows)?;

        let text = String::from_utf8(buffer)?;
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "kit,ahnentafel,seed,label0,confidence0,label1,confidence1",
                "A1,4,4,P,1,P,0.5",
                "B2,1,,,0,,",
            ]
        );

        Ok(())
    }
}
