//! Entries of the SnpEff `EFF` INFO field:
//! `Effect ( Impact | Functional_Class | Codon_Change | Amino_Acid_Change | Amino_Acid_Length
//! | Gene_Name | Transcript_BioType | Gene_Coding | Transcript_ID | Exon_Rank | Genotype_Number
//! [ | ERRORS | WARNINGS ] )`

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::vcf::VcfError;

const MIN_FIELDS: usize = 11;
const MAX_FIELDS: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    High,
    Moderate,
    Low,
    Modifier,
}

impl FromStr for Impact {
    type Err = VcfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Impact::High),
            "MODERATE" => Ok(Impact::Moderate),
            "LOW" => Ok(Impact::Low),
            "MODIFIER" => Ok(Impact::Modifier),
            other => Err(VcfError::MalformedEffect(format!("unknown impact {other}"))),
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Impact::High => "HIGH",
            Impact::Moderate => "MODERATE",
            Impact::Low => "LOW",
            Impact::Modifier => "MODIFIER",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnpEffect {
    pub effect: String,
    pub impact: Impact,
    pub functional_class: String,
    pub codon_change: String,
    pub amino_acid_change: String,
    pub amino_acid_length: Option<u32>,
    pub gene_name: String,
    pub transcript_biotype: String,
    pub gene_coding: String,
    pub transcript_id: String,
    pub exon_rank: Option<u32>,
    /// `1` for germline-only calls; `2-1` style pairs in cancer mode mean
    /// "derived allele relative to original allele".
    pub genotype: String,
    pub errors: Option<String>,
    pub warnings: Option<String>,
}

impl SnpEffect {
    /// Parse a comma separated `EFF` value.
    pub fn parse_all(raw: &str) -> Result<Vec<Self>, VcfError> {
        raw.split(',')
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect()
    }

    /// Effect computed between the somatic and germline genotypes.
    pub fn is_cancer_comparison(&self) -> bool {
        self.genotype.contains('-')
    }
}

impl FromStr for SnpEffect {
    type Err = VcfError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let malformed = || VcfError::MalformedEffect(entry.to_string());

        let (effect, rest) = entry.split_once('(').ok_or_else(malformed)?;
        let body = rest.strip_suffix(')').ok_or_else(malformed)?;
        let fields: Vec<&str> = body.split('|').collect();
        if effect.is_empty() || !(MIN_FIELDS..=MAX_FIELDS).contains(&fields.len()) {
            return Err(malformed());
        }

        let number = |raw: &str| -> Result<Option<u32>, VcfError> {
            if raw.is_empty() {
                Ok(None)
            } else {
                raw.parse().map(Some).map_err(|_| malformed())
            }
        };
        let text = |idx: usize| fields.get(idx).filter(|f| !f.is_empty()).map(|f| f.to_string());

        Ok(SnpEffect {
            effect: effect.to_string(),
            impact: fields[0].parse()?,
            functional_class: fields[1].to_string(),
            codon_change: fields[2].to_string(),
            amino_acid_change: fields[3].to_string(),
            amino_acid_length: number(fields[4])?,
            gene_name: fields[5].to_string(),
            transcript_biotype: fields[6].to_string(),
            gene_coding: fields[7].to_string(),
            transcript_id: fields[8].to_string(),
            exon_rank: number(fields[9])?,
            genotype: fields[10].to_string(),
            errors: text(11),
            warnings: text(12),
        })
    }
}
