//! Minimal line codec for the variant records exchanged with the engine.
//!
//! Only what the bridge needs: split a record into its fixed columns, the
//! INFO map and per-sample FORMAT values, and write it back out unchanged.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::effect::SnpEffect;
use crate::header::{AnnotationHeader, FIXED_COLUMNS};

pub const MISSING: &str = ".";
pub const EFF_KEY: &str = "EFF";
pub const GT_KEY: &str = "GT";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VcfError {
    #[error("expected {expected} tab-separated columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("invalid position `{0}`")]
    InvalidPosition(String),

    #[error("sample `{sample}` has {found} values for {expected} FORMAT keys")]
    SampleArity {
        sample: String,
        expected: usize,
        found: usize,
    },

    #[error("malformed EFF entry `{0}`")]
    MalformedEffect(String),
}

/// Decoder bound to one header's sample order.
#[derive(Debug, Clone)]
pub struct VcfDecoder {
    samples: Vec<String>,
    info_ids: HashSet<String>,
    format_ids: HashSet<String>,
}

impl VcfDecoder {
    pub fn new(header: &AnnotationHeader) -> Self {
        Self {
            samples: header.samples().to_vec(),
            info_ids: header.info_ids().map(str::to_string).collect(),
            format_ids: header.format_ids().map(str::to_string).collect(),
        }
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn declares_info(&self, key: &str) -> bool {
        self.info_ids.contains(key)
    }

    pub fn declares_format(&self, key: &str) -> bool {
        self.format_ids.contains(key)
    }

    /// Decode one record line. Sites-only lines (no FORMAT column) are
    /// accepted even when the header names samples.
    pub fn decode(&self, line: &str) -> Result<VariantRecord, VcfError> {
        let columns: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        let with_samples = FIXED_COLUMNS.len() + 1 + self.samples.len();
        if columns.len() != FIXED_COLUMNS.len()
            && (self.samples.is_empty() || columns.len() != with_samples)
        {
            return Err(VcfError::ColumnCount {
                expected: if self.samples.is_empty() {
                    FIXED_COLUMNS.len()
                } else {
                    with_samples
                },
                found: columns.len(),
            });
        }

        let pos = columns[1]
            .parse::<u64>()
            .map_err(|_| VcfError::InvalidPosition(columns[1].to_string()))?;

        let format: Vec<String> = match columns.get(8) {
            Some(&MISSING) | None => vec![],
            Some(keys) => keys.split(':').map(str::to_string).collect(),
        };

        let mut samples = Vec::new();
        if columns.len() == with_samples && !self.samples.is_empty() {
            for (name, raw) in self.samples.iter().zip(&columns[9..]) {
                let values: Vec<String> = raw.split(':').map(str::to_string).collect();
                // trailing fields may be dropped, never added
                if values.len() > format.len().max(1) {
                    return Err(VcfError::SampleArity {
                        sample: name.clone(),
                        expected: format.len(),
                        found: values.len(),
                    });
                }
                samples.push(SampleValues {
                    name: name.clone(),
                    values,
                });
            }
        }

        Ok(VariantRecord {
            chrom: columns[0].to_string(),
            pos,
            ids: split_list(columns[2], ';'),
            reference: columns[3].to_string(),
            alternates: split_list(columns[4], ','),
            qual: optional(columns[5]),
            filters: split_list(columns[6], ';'),
            info: parse_info(columns[7]),
            format,
            samples,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleValues {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    pub chrom: String,
    pub pos: u64,
    pub ids: Vec<String>,
    pub reference: String,
    pub alternates: Vec<String>,
    pub qual: Option<String>,
    pub filters: Vec<String>,
    /// INFO entries in line order; flags have no value.
    pub info: Vec<(String, Option<String>)>,
    pub format: Vec<String>,
    pub samples: Vec<SampleValues>,
}

impl VariantRecord {
    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_info(&self, key: &str) -> bool {
        self.info.iter().any(|(k, _)| k == key)
    }

    pub fn sample_value(&self, sample: &str, key: &str) -> Option<&str> {
        let idx = self.format.iter().position(|k| k == key)?;
        let sample = self.samples.iter().find(|s| s.name == sample)?;
        sample.values.get(idx).map(String::as_str)
    }

    pub fn genotype(&self, sample: &str) -> Option<&str> {
        self.sample_value(sample, GT_KEY)
    }

    /// Parsed `EFF` entries; empty when the engine predicted nothing.
    pub fn effects(&self) -> Result<Vec<SnpEffect>, VcfError> {
        match self.info_value(EFF_KEY) {
            Some(raw) => SnpEffect::parse_all(raw),
            None => Ok(vec![]),
        }
    }
}

/// Encode a record back into its line form.
pub fn encode(record: &VariantRecord) -> String {
    record.to_string()
}

impl fmt::Display for VariantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = if self.info.is_empty() {
            MISSING.to_string()
        } else {
            self.info
                .iter()
                .map(|(k, v)| match v {
                    Some(v) => format!("{k}={v}"),
                    None => k.clone(),
                })
                .collect::<Vec<_>>()
                .join(";")
        };
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.pos,
            join_list(&self.ids, ";"),
            self.reference,
            join_list(&self.alternates, ","),
            self.qual.as_deref().unwrap_or(MISSING),
            join_list(&self.filters, ";"),
            info
        )?;
        if !self.samples.is_empty() {
            write!(f, "\t{}", join_list(&self.format, ":"))?;
            for sample in &self.samples {
                write!(f, "\t{}", sample.values.join(":"))?;
            }
        }
        Ok(())
    }
}

fn optional(raw: &str) -> Option<String> {
    (raw != MISSING && !raw.is_empty()).then(|| raw.to_string())
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    match optional(raw) {
        Some(raw) => raw.split(sep).map(str::to_string).collect(),
        None => vec![],
    }
}

fn join_list(items: &[String], sep: &str) -> String {
    if items.is_empty() {
        MISSING.to_string()
    } else {
        items.join(sep)
    }
}

fn parse_info(raw: &str) -> Vec<(String, Option<String>)> {
    split_list(raw, ';')
        .into_iter()
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((k, v)) => (k.to_string(), Some(v.to_string())),
            None => (entry, None),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Impact;
    use crate::header::{GERMLINE_SAMPLE, SOMATIC_SAMPLE, build_header, decoder_header};

    const RESULT: &str = "17\t7578406\trs28934578\tC\tT\t50\tPASS\tDP=40;SOMATIC;EFF=NON_SYNONYMOUS_CODING(MODERATE|MISSENSE|cGc/cAc|R175H|393|TP53|protein_coding|CODING|ENST00000269305|5|2-1)\tGT\t0/0\t0/1";

    #[test]
    fn decodes_eff_and_genotypes_with_decoder_header() {
        let decoder = VcfDecoder::new(&decoder_header());
        assert!(decoder.declares_info(EFF_KEY));
        assert!(decoder.declares_format(GT_KEY));

        let record = decoder.decode(RESULT).unwrap();
        assert_eq!(record.chrom, "17");
        assert_eq!(record.pos, 7578406);
        assert_eq!(record.ids, vec!["rs28934578"]);
        assert_eq!(record.alternates, vec!["T"]);
        assert_eq!(record.filters, vec!["PASS"]);
        assert_eq!(record.info_value("DP"), Some("40"));
        assert!(record.has_info("SOMATIC"));
        assert_eq!(record.genotype(GERMLINE_SAMPLE), Some("0/0"));
        assert_eq!(record.genotype(SOMATIC_SAMPLE), Some("0/1"));

        let effects = record.effects().unwrap();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].impact, Impact::Moderate);
        assert_eq!(effects[0].gene_name, "TP53");
    }

    #[test]
    fn encode_reproduces_the_line() {
        let decoder = VcfDecoder::new(&decoder_header());
        let record = decoder.decode(RESULT).unwrap();
        assert_eq!(encode(&record), RESULT);

        let sites_only = "1\t100\t.\tA\tG,T\t.\t.\t.";
        assert_eq!(encode(&decoder.decode(sites_only).unwrap()), sites_only);
    }

    #[test]
    fn wrong_column_count_is_rejected() {
        let decoder = VcfDecoder::new(&decoder_header());
        let err = decoder.decode("1\t100\t.\tA\tT\t.\t.\t.\tGT\t0/1").unwrap_err();
        assert_eq!(err, VcfError::ColumnCount { expected: 11, found: 10 });
    }

    #[test]
    fn sample_order_follows_the_header() {
        let decoder = VcfDecoder::new(&build_header(["B", "A"], [GT_FORMAT]));
        let record = decoder.decode("1\t5\t.\tA\tT\t.\t.\t.\tGT\t1/1\t0/0").unwrap();
        assert_eq!(record.genotype("B"), Some("1/1"));
        assert_eq!(record.genotype("A"), Some("0/0"));
        assert_eq!(record.genotype("C"), None);
    }

    #[test]
    fn bad_position_is_rejected() {
        let decoder = VcfDecoder::new(&decoder_header());
        assert_eq!(
            decoder.decode("1\tx\t.\tA\tT\t.\t.\t.").unwrap_err(),
            VcfError::InvalidPosition("x".into())
        );
    }

    const GT_FORMAT: &str = crate::header::GT_FORMAT_LINE;
}
