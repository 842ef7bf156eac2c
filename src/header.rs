//! Protocol preamble sent to the engine before the first record, and the
//! matching header the result decoder is initialised with.
//!
//! Field positions in result lines depend on sample order, so both headers
//! must list the same samples in the same order.

use std::collections::BTreeSet;
use std::fmt;

pub const FILE_FORMAT: &str = "fileformat=VCFv4.1";
pub const GERMLINE_SAMPLE: &str = "Patient_01_Germline";
pub const SOMATIC_SAMPLE: &str = "Patient_01_Somatic";

/// Fixed columns of every record line.
pub const FIXED_COLUMNS: [&str; 8] = ["CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO"];

pub const PEDIGREE_LINE: &str =
    "PEDIGREE=<Derived=Patient_01_Somatic,Original=Patient_01_Germline>";

pub const EFF_INFO_LINE: &str = "INFO=<ID=EFF,Number=.,Type=String,Description=\"Predicted effects for this variant.Format: 'Effect ( Effect_Impact | Functional_Class | Codon_Change | Amino_Acid_Change| Amino_Acid_length | Gene_Name | Transcript_BioType | Gene_Coding | Transcript_ID | Exon_Rank  | Genotype_Number [ | ERRORS | WARNINGS ] )' \">";

pub const GT_FORMAT_LINE: &str = "FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationHeader {
    samples: Vec<String>,
    metadata: BTreeSet<String>,
}

/// Build a header from an ordered sample list and a set of metadata lines.
///
/// Metadata may be given with or without the leading `##`. Output is
/// deterministic: metadata is emitted sorted and de-duplicated, samples in
/// the order given.
pub fn build_header<I, S, J, T>(sample_names: I, metadata_lines: J) -> AnnotationHeader
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    J: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    AnnotationHeader {
        samples: sample_names.into_iter().map(Into::into).collect(),
        metadata: metadata_lines
            .into_iter()
            .map(|line| line.as_ref().trim_start_matches('#').to_string())
            .filter(|line| !line.is_empty() && line != FILE_FORMAT)
            .collect(),
    }
}

/// Header written to the engine: the germline/somatic pair plus the
/// pedigree line cancer mode needs.
pub fn engine_header() -> AnnotationHeader {
    build_header([GERMLINE_SAMPLE, SOMATIC_SAMPLE], [PEDIGREE_LINE])
}

/// Header the result decoder is initialised with.
pub fn decoder_header() -> AnnotationHeader {
    build_header([GERMLINE_SAMPLE, SOMATIC_SAMPLE], [EFF_INFO_LINE, GT_FORMAT_LINE])
}

impl AnnotationHeader {
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn metadata(&self) -> impl Iterator<Item = &str> {
        self.metadata.iter().map(String::as_str)
    }

    /// IDs declared by `INFO=<ID=...>` lines.
    pub fn info_ids(&self) -> impl Iterator<Item = &str> {
        self.declared_ids("INFO")
    }

    /// IDs declared by `FORMAT=<ID=...>` lines.
    pub fn format_ids(&self) -> impl Iterator<Item = &str> {
        self.declared_ids("FORMAT")
    }

    fn declared_ids<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.metadata.iter().filter_map(move |line| {
            let rest = line.strip_prefix(kind)?.strip_prefix("=<ID=")?;
            rest.split([',', '>']).next()
        })
    }

    /// The `#CHROM…` column line.
    pub fn column_line(&self) -> String {
        let mut columns: Vec<&str> = FIXED_COLUMNS.to_vec();
        if !self.samples.is_empty() {
            columns.push("FORMAT");
            columns.extend(self.samples.iter().map(String::as_str));
        }
        format!("#{}", columns.join("\t"))
    }

    /// Header lines in wire order, without line terminators.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.metadata.len() + 2);
        lines.push(format!("##{FILE_FORMAT}"));
        lines.extend(self.metadata.iter().map(|meta| format!("##{meta}")));
        lines.push(self.column_line());
        lines
    }
}

impl fmt::Display for AnnotationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_header_layout() {
        assert_eq!(
            engine_header().lines(),
            vec![
                "##fileformat=VCFv4.1".to_string(),
                format!("##{PEDIGREE_LINE}"),
                "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tPatient_01_Germline\tPatient_01_Somatic"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn identical_inputs_render_identically() {
        let a = build_header(["s1", "s2"], ["##B=2", "A=1", "B=2"]);
        let b = build_header(["s1", "s2"], ["A=1", "B=2"]);
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "##fileformat=VCFv4.1\n##A=1\n##B=2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ts1\ts2\n");
    }

    #[test]
    fn sample_order_is_preserved() {
        let header = build_header(["z", "a"], Vec::<String>::new());
        assert_eq!(header.samples(), ["z".to_string(), "a".to_string()]);
        assert!(header.column_line().ends_with("FORMAT\tz\ta"));
    }

    #[test]
    fn sites_only_header_has_no_format_column() {
        let header = build_header(Vec::<String>::new(), ["x=y"]);
        assert_eq!(header.column_line(), "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO");
    }

    #[test]
    fn decoder_header_declares_eff_and_gt() {
        let header = decoder_header();
        assert_eq!(header.info_ids().collect::<Vec<_>>(), vec!["EFF"]);
        assert_eq!(header.format_ids().collect::<Vec<_>>(), vec!["GT"]);
        assert_eq!(header.samples(), engine_header().samples());
    }
}
