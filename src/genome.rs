//! Reference sequence dictionary.
//!
//! Holds reference names and lengths in header order. The position of a
//! reference in this order is its numeric id, which is what records, the
//! binning index and sort order refer to.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::error::{BrixError, Result};

/// One reference sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub length: u64,
}

/// Ordered reference dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Genome {
    references: Vec<Reference>,
    ids: FxHashMap<String, usize>,
}

impl Genome {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a two-column `name<TAB>length` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut genome = Self::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 {
                return Err(BrixError::Parse {
                    line: line_num + 1,
                    message: "Genome file requires two columns: name and length".to_string(),
                });
            }

            let length: u64 = fields[1].parse().map_err(|_| BrixError::Parse {
                line: line_num + 1,
                message: format!("Invalid reference length: {}", fields[1]),
            })?;
            genome.insert(fields[0].to_string(), length);
        }

        Ok(genome)
    }

    /// Add a reference `@SQ` line (`SN:` and `LN:` fields).
    ///
    /// Other header lines are ignored.
    pub fn add_header_line(&mut self, line: &str, line_num: usize) -> Result<()> {
        let mut fields = line.trim_end().split('\t');
        if fields.next() != Some("@SQ") {
            return Ok(());
        }

        let mut name = None;
        let mut length = None;
        for field in fields {
            if let Some(v) = field.strip_prefix("SN:") {
                name = Some(v);
            } else if let Some(v) = field.strip_prefix("LN:") {
                length = Some(v.parse::<u64>().map_err(|_| BrixError::Parse {
                    line: line_num,
                    message: format!("Invalid @SQ length: {}", v),
                })?);
            }
        }

        match (name, length) {
            (Some(name), Some(length)) => {
                if self.ids.contains_key(name) {
                    return Err(BrixError::Parse {
                        line: line_num,
                        message: format!("Duplicate @SQ name: {}", name),
                    });
                }
                self.insert(name.to_string(), length);
                Ok(())
            }
            _ => Err(BrixError::Parse {
                line: line_num,
                message: "@SQ line requires SN and LN".to_string(),
            }),
        }
    }

    /// Append a reference, or update its length if already present.
    pub fn insert(&mut self, name: String, length: u64) -> usize {
        if let Some(&id) = self.ids.get(&name) {
            self.references[id].length = length;
            return id;
        }
        let id = self.references.len();
        self.ids.insert(name.clone(), id);
        self.references.push(Reference { name, length });
        id
    }

    /// Numeric id of a reference name.
    #[inline]
    pub fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    /// Numeric id of a reference name, or [`BrixError::UnknownReference`].
    pub fn require_id(&self, name: &str) -> Result<usize> {
        self.id(name)
            .ok_or_else(|| BrixError::UnknownReference(name.to_string()))
    }

    #[inline]
    pub fn name(&self, id: usize) -> Option<&str> {
        self.references.get(id).map(|r| r.name.as_str())
    }

    #[inline]
    pub fn length(&self, id: usize) -> Option<u64> {
        self.references.get(id).map(|r| r.length)
    }

    /// References in id order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Render as `@SQ` header lines.
    pub fn to_header(&self) -> String {
        let mut out = String::new();
        for r in &self.references {
            out.push_str("@SQ\tSN:");
            out.push_str(&r.name);
            out.push_str("\tLN:");
            out.push_str(itoa::Buffer::new().format(r.length));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_genome_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr1\t1000000").unwrap();
        writeln!(file, "chr2\t500000").unwrap();
        writeln!(file, "# comment line").unwrap();
        writeln!(file, "chr3\t250000").unwrap();
        file.flush().unwrap();

        let genome = Genome::from_file(file.path()).unwrap();
        assert_eq!(genome.len(), 3);
        assert_eq!(genome.id("chr2"), Some(1));
        assert_eq!(genome.name(2), Some("chr3"));
        assert_eq!(genome.length(0), Some(1_000_000));
    }

    #[test]
    fn test_header_lines() {
        let mut genome = Genome::new();
        genome.add_header_line("@HD\tVN:1.6\tSO:coordinate", 1).unwrap();
        genome.add_header_line("@SQ\tSN:chrM\tLN:16569", 2).unwrap();
        genome.add_header_line("@SQ\tSN:chr1\tLN:248956422\tAS:x", 3).unwrap();
        assert_eq!(genome.len(), 2);
        assert_eq!(genome.id("chr1"), Some(1));
        assert_eq!(
            genome.to_header(),
            "@SQ\tSN:chrM\tLN:16569\n@SQ\tSN:chr1\tLN:248956422\n"
        );

        assert!(genome.add_header_line("@SQ\tSN:chr2", 4).is_err());
        assert!(genome.add_header_line("@SQ\tSN:chrM\tLN:1", 5).is_err());
    }

    #[test]
    fn test_unknown_reference() {
        let genome = Genome::new();
        assert!(matches!(
            genome.require_id("chrZ"),
            Err(BrixError::UnknownReference(name)) if name == "chrZ"
        ));
    }
}
