// tests/annotate_test.rs
#![cfg(unix)]

use std::path::Path;

use annotator::config::{
    AnnotatorProperties, ConfigManager, GENE_BUILD_VERSION, MapConfigManager, QUEUE_CAPACITY,
};
use annotator::effect::Impact;
use annotator::header::{GERMLINE_SAMPLE, SOMATIC_SAMPLE, decoder_header};
use annotator::logger::Telemetry;
use annotator::session::annotate_file;
use annotator::vcf::VcfDecoder;
use engine_bridge::EngineCommand;
use tempfile::TempDir;

/// Engine stand-in: echoes the header, prints the pedigree banner before
/// every answer and appends an `EFF` entry to the record's INFO column.
const STUB_ENGINE: &str = r##"
echo "stub engine up" >&2
while IFS= read -r line; do
  case "$line" in
    "#"*) echo "$line" ;;
    *) echo "Reading cancer samples pedigree from VCF header"
       printf '%s;EFF=NON_SYNONYMOUS_CODING(MODERATE|MISSENSE|Gca/Aca|A12T|393|TP53|protein_coding|CODING|ENST00000269305|5|2-1)\n' "$line" ;;
  esac
done
"##;

fn stub_engine(dir: &Path) -> EngineCommand {
    let script = dir.join("snpeff-stub.sh");
    std::fs::write(&script, STUB_ENGINE).unwrap();
    EngineCommand::new("/bin/sh").arg(script.as_os_str())
}

const INPUT: &str = "##fileformat=VCFv4.1
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tPatient_01_Germline\tPatient_01_Somatic
17\t7578406\t.\tC\tT\t.\tPASS\tDP=40\tGT\t0/0\t0/1
17\t7578407\t.\tG\tA\t.\tPASS\tDP=41\tGT\t0/0\t0/1

17\t7578408\t.\tA\tG\t.\tPASS\tDP=42\tGT\t0/0\t1/1
";

#[tokio::test]
async fn three_records_come_back_in_order_without_banners() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.vcf");
    let output = dir.path().join("output.vcf");
    std::fs::write(&input, INPUT).unwrap();

    let props = AnnotatorProperties::default();
    let summary = annotate_file(
        &stub_engine(dir.path()),
        &props,
        &Telemetry::detached(),
        &input,
        Some(&output),
    )
    .await
    .unwrap();

    // the stub appends to the last column, which for these records is a sample
    let written = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("17\t7578406\t"));
    assert!(lines[1].starts_with("17\t7578407\t"));
    assert!(lines[2].starts_with("17\t7578408\t"));
    assert!(!written.contains("Reading cancer samples pedigree"));
    assert!(!written.contains('#'));

    assert_eq!(summary.records, 3);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.gene_build_version, "75");
}

#[tokio::test]
async fn annotated_sites_decode_with_the_decoder_header() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("sites.vcf");
    let output = dir.path().join("sites.out.vcf");
    std::fs::write(
        &input,
        "1\t100\trs1\tA\tT\t50\tPASS\tDP=10\n2\t200\t.\tG\tC\t.\t.\tSOMATIC\n",
    )
    .unwrap();

    let config = ConfigManager(
        MapConfigManager::new()
            .with(QUEUE_CAPACITY, "4")
            .with(GENE_BUILD_VERSION, "76"),
    );
    let props = AnnotatorProperties::load(&config).await.unwrap();
    let summary = annotate_file(
        &stub_engine(dir.path()),
        &props,
        &Telemetry::detached(),
        &input,
        Some(&output),
    )
    .await
    .unwrap();

    assert_eq!(summary.gene_build_version, "76");
    assert_eq!(summary.records, 2);
    assert_eq!(summary.undecoded, 0);
    assert_eq!(summary.impacts.get(&Impact::Moderate), Some(&2));

    let decoder = VcfDecoder::new(&decoder_header());
    let written = std::fs::read_to_string(&output).unwrap();
    let records: Vec<_> = written
        .lines()
        .map(|line| decoder.decode(line).unwrap())
        .collect();
    assert_eq!(records[0].ids, vec!["rs1"]);
    assert_eq!(records[0].info_value("DP"), Some("10"));
    assert!(records[1].has_info("SOMATIC"));
    assert_eq!(records[1].genotype(SOMATIC_SAMPLE), None);

    let effects = records[0].effects().unwrap();
    assert_eq!(effects[0].gene_name, "TP53");
    assert_eq!(effects[0].amino_acid_change, "A12T");
    assert!(effects[0].is_cancer_comparison());
    assert_eq!(decoder.samples(), [GERMLINE_SAMPLE, SOMATIC_SAMPLE]);
}

#[tokio::test]
async fn crashed_engine_fails_the_run_with_its_exit_code() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("crash.sh");
    std::fs::write(
        &script,
        "while IFS= read -r line; do\n  case \"$line\" in \"#\"*) ;; *) exit 7 ;; esac\ndone\n",
    )
    .unwrap();
    let input = dir.path().join("input.vcf");
    std::fs::write(&input, "1\t100\t.\tA\tT\t.\t.\t.\n").unwrap();

    let err = annotate_file(
        &EngineCommand::new("/bin/sh").arg(script.as_os_str()),
        &AnnotatorProperties::default(),
        &Telemetry::detached(),
        &input,
        Some(&dir.path().join("out.vcf")),
    )
    .await
    .unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("stopped after 0 records"), "{message}");
    assert!(message.contains("exit code = 7"), "{message}");
}
