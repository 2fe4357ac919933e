//! # VCF Input Adapter and Record Writing
//!
//! A minimal line-oriented VCF reader sufficient to feed the engine phased
//! genotypes, and the VCF 4.2 record writer used for per-window output.
//! Full field-level tokenization is an external concern; any reader that
//! implements `EmissionSource` can replace the adapter.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use noodles::bgzf as bgzf_io;

use crate::data::haplotype::{AlleleColumn, SampleHapPairs, Samples};
use crate::data::marker::{Allele, Marker, Markers};
use crate::data::ChromIds;
use crate::error::{Result, WeftError};
use crate::io::emission::{EmissionSource, GenotypeRecord, MarkerEmission};
use crate::model::allele_probs::{AlleleProbs, GenotypeValues};
use crate::model::gprobs::GprobsStatistics;
use crate::utils::format::{fmt_fixed2, fmt_sig2, fmt_trimmed};

/// Streaming reader of phased VCF genotype records.
pub struct VcfReader {
    reader: Box<dyn BufRead + Send>,
    path: PathBuf,
    samples: Arc<Samples>,
    /// source-column index of each kept sample
    kept: Vec<usize>,
    chrom_ids: Arc<ChromIds>,
    line_no: u64,
}

impl VcfReader {
    /// Opens a VCF file (bgzip-compressed when the extension is `.gz` or
    /// `.bgz`), scans the header for sample ids, and drops the samples in
    /// `exclude`.
    pub fn open(
        path: &Path,
        exclude: &HashSet<String>,
        chrom_ids: Arc<ChromIds>,
    ) -> Result<Self> {
        let file = File::open(path).map_err(|_| WeftError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let is_gzipped = path
            .extension()
            .map(|e| e == "gz" || e == "bgz")
            .unwrap_or(false);
        let reader: Box<dyn BufRead + Send> = if is_gzipped {
            Box::new(BufReader::new(bgzf_io::Reader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Self::from_reader(reader, path.to_path_buf(), exclude, chrom_ids)
    }

    fn from_reader(
        mut reader: Box<dyn BufRead + Send>,
        path: PathBuf,
        exclude: &HashSet<String>,
        chrom_ids: Arc<ChromIds>,
    ) -> Result<Self> {
        let mut line_no = 0u64;
        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            line_no += 1;
            if n == 0 {
                return Err(WeftError::format(line_no, "missing #CHROM header line"));
            }
            if line.starts_with("##") {
                continue;
            }
            if let Some(rest) = line.trim_end().strip_prefix("#CHROM") {
                let fields: Vec<&str> = rest.split('\t').filter(|f| !f.is_empty()).collect();
                if fields.len() < 8 {
                    return Err(WeftError::format(line_no, "truncated #CHROM header line"));
                }
                let ids = &fields[8..];
                let kept: Vec<usize> = ids
                    .iter()
                    .enumerate()
                    .filter(|(_, id)| !exclude.contains(**id))
                    .map(|(i, _)| i)
                    .collect();
                if kept.is_empty() {
                    return Err(WeftError::config(format!(
                        "no samples remain in {:?} after exclusions",
                        path
                    )));
                }
                let samples =
                    Arc::new(Samples::from_ids(kept.iter().map(|&i| ids[i].to_string()))?);
                return Ok(Self {
                    reader,
                    path,
                    samples,
                    kept,
                    chrom_ids,
                    line_no,
                });
            }
            return Err(WeftError::format(line_no, "missing #CHROM header line"));
        }
    }

    fn parse_record(&self, line: &str) -> Result<MarkerEmission> {
        let line_no = self.line_no;
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() < 10 {
            return Err(WeftError::format(line_no, "record has fewer than 10 fields"));
        }
        let (chrom, chrom_name) = self.chrom_ids.intern(fields[0]);
        let pos: u32 = fields[1]
            .parse()
            .map_err(|_| WeftError::format(line_no, "invalid POS field"))?;
        let id = match fields[2] {
            "." => None,
            other => Some(Arc::from(other)),
        };
        let ref_allele = Allele::parse(fields[3]);
        let alt_alleles: Vec<Allele> = fields[4].split(',').map(Allele::parse).collect();
        if fields[4] == "." {
            return Err(WeftError::format(line_no, "record has no ALT allele"));
        }
        let n_alleles = 1 + alt_alleles.len();
        if !fields[8].split(':').next().map_or(false, |f| f == "GT") {
            return Err(WeftError::format(line_no, "FORMAT must begin with GT"));
        }
        let marker = Marker::new(chrom, chrom_name, pos, id, ref_allele, alt_alleles);

        let genotypes = &fields[9..];
        let mut alleles = Vec::with_capacity(2 * self.kept.len());
        let mut phased = true;
        for &col in &self.kept {
            let gt_field = genotypes.get(col).ok_or_else(|| {
                WeftError::format(line_no, "record has fewer sample fields than the header")
            })?;
            let gt = gt_field.split(':').next().unwrap_or("");
            let (sep, a) = if gt.contains('|') {
                ('|', gt)
            } else {
                phased = false;
                ('/', gt)
            };
            let mut parts = a.split(sep);
            let a1 = parse_allele_index(parts.next(), n_alleles, line_no)?;
            let a2 = parse_allele_index(parts.next(), n_alleles, line_no)?;
            if parts.next().is_some() {
                return Err(WeftError::format(line_no, "genotype is not diploid"));
            }
            alleles.push(a1);
            alleles.push(a2);
        }
        Ok(MarkerEmission::Genotypes(GenotypeRecord {
            marker,
            alleles: AlleleColumn::from_alleles(&alleles, n_alleles),
            phased,
        }))
    }
}

fn parse_allele_index(field: Option<&str>, n_alleles: usize, line_no: u64) -> Result<u8> {
    let field = field.ok_or_else(|| WeftError::format(line_no, "truncated GT field"))?;
    if field == "." {
        return Err(WeftError::format(line_no, "missing allele in GT field"));
    }
    let allele: usize = field
        .parse()
        .map_err(|_| WeftError::format(line_no, "invalid allele index in GT field"))?;
    if allele >= n_alleles {
        return Err(WeftError::format(
            line_no,
            format!("allele index {} out of range for {} alleles", allele, n_alleles),
        ));
    }
    Ok(allele as u8)
}

impl EmissionSource for VcfReader {
    fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    fn file(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn next_emission(&mut self) -> Result<Option<MarkerEmission>> {
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            return self.parse_record(&line).map(Some);
        }
    }
}

/// Reads an entire emission stream into phased haplotype pairs. Unphased
/// genotype records are a format error.
pub fn read_sample_hap_pairs<S: EmissionSource>(source: &mut S) -> Result<SampleHapPairs> {
    let samples = source.samples().clone();
    let mut markers = Markers::new();
    let mut columns = Vec::new();
    while let Some(emission) = source.next_emission()? {
        if let MarkerEmission::Genotypes(r) = &emission {
            if !r.phased {
                return Err(WeftError::config(format!(
                    "unphased genotype at {}:{}; the engine requires phased input",
                    r.marker.chrom_name(),
                    r.marker.pos()
                )));
            }
        }
        markers.push(emission.marker().clone());
        columns.push(emission.to_allele_column());
    }
    if markers.is_empty() {
        return Err(WeftError::config("emission stream is empty"));
    }
    SampleHapPairs::new(samples, Arc::new(markers), columns)
}

// ---------------------------------------------------------------------------
// VCF 4.2 record writing
// ---------------------------------------------------------------------------

const PASS: &str = "PASS";

const AF_INFO: &str = "##INFO=<ID=AF,Number=A,Type=Float,\
Description=\"Estimated Allele Frequencies\">";
const AR2_INFO: &str = "##INFO=<ID=AR2,Number=1,Type=Float,\
Description=\"Allelic R-Squared: estimated correlation between \
most probable ALT dose and true ALT dose\">";
const DR2_INFO: &str = "##INFO=<ID=DR2,Number=A,Type=Float,\
Description=\"Dosage R-Squared: estimated correlation between \
estimated ALT dose [P(RA) + 2*P(AA)] and true ALT dose\">";
const GT_FORMAT: &str =
    "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">";
const DS_FORMAT: &str = "##FORMAT=<ID=DS,Number=1,Type=Float,\
Description=\"estimated ALT dose [P(RA) + P(AA)]\">";
const GL_FORMAT: &str = "##FORMAT=<ID=GL,Number=G,Type=Float,\
Description=\"Log10-scaled Genotype Likelihood\">";
const GP_FORMAT: &str = "##FORMAT=<ID=GP,Number=G,Type=Float,\
Description=\"Estimated Genotype Probability\">";

/// Writes the VCF meta-information lines and the header line.
pub fn write_meta_lines<W: Write>(
    sample_ids: &[Arc<str>],
    source: Option<&str>,
    print_gt: bool,
    print_gp: bool,
    print_gl: bool,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "##fileformat=VCFv4.2")?;
    writeln!(out, "##filedate={}", chrono::Local::now().format("%Y%m%d"))?;
    if let Some(source) = source {
        writeln!(out, "##source=\"{}\"", source)?;
    }
    if print_gp {
        writeln!(out, "{}", AF_INFO)?;
        writeln!(out, "{}", AR2_INFO)?;
        writeln!(out, "{}", DR2_INFO)?;
    }
    if print_gt {
        writeln!(out, "{}", GT_FORMAT)?;
    }
    if print_gl {
        writeln!(out, "{}", GL_FORMAT)?;
    }
    if print_gp {
        writeln!(out, "{}", DS_FORMAT)?;
        writeln!(out, "{}", GP_FORMAT)?;
    }
    write!(out, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
    for id in sample_ids {
        write!(out, "\t{}", id)?;
    }
    writeln!(out)?;
    Ok(())
}

/// Appends VCF records with GT:DS:GP fields derived from scaled genotype
/// probabilities for markers in [start, end).
pub fn append_records_gv<W: Write>(
    gv: &GenotypeValues,
    start: usize,
    end: usize,
    out: &mut W,
) -> Result<()> {
    assert!(start <= end && end <= gv.n_markers());
    for marker in start..end {
        print_fixed_fields_gv(gv, marker, out)?;
        for sample in 0..gv.n_samples() {
            print_gt_ds_gp(gv, marker, sample, out)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Appends VCF records from phased allele probabilities for markers in
/// [start, end). DS fields are printed when `imputed` is set, GP fields
/// when `gprobs` is set.
pub fn append_records<W: Write>(
    al_probs: &AlleleProbs,
    start: usize,
    end: usize,
    imputed: bool,
    gprobs: bool,
    out: &mut W,
) -> Result<()> {
    assert!(start <= end && end <= al_probs.n_markers());
    for marker in start..end {
        print_fixed_fields(al_probs, marker, imputed, gprobs, out)?;
        for sample in 0..al_probs.n_samples() {
            print_gt_and_dose(al_probs, marker, sample, imputed, out)?;
            if gprobs {
                print_gp(al_probs, marker, sample, out)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn print_info_and_format<W: Write>(
    stats: &GprobsStatistics,
    format: &str,
    out: &mut W,
) -> Result<()> {
    write!(out, "\tAR2={}", fmt_fixed2(stats.allelic_r2()))?;
    write!(out, ";DR2={}", fmt_fixed2(stats.dose_r2()))?;
    let freq = stats.allele_freq();
    for (j, &f) in freq.iter().enumerate().skip(1) {
        let prefix = if j == 1 { ";AF=" } else { "," };
        write!(out, "{}{}", prefix, fmt_sig2(f))?;
    }
    write!(out, "\t{}", format)?;
    Ok(())
}

fn print_fixed_fields_gv<W: Write>(gv: &GenotypeValues, marker: usize, out: &mut W) -> Result<()> {
    let stats = GprobsStatistics::from_genotype_values(gv, marker);
    write!(out, "{}\t.\t{}", gv.marker(marker), PASS)?;
    print_info_and_format(&stats, "GT:DS:GP", out)
}

fn print_fixed_fields<W: Write>(
    al_probs: &AlleleProbs,
    marker: usize,
    print_r2: bool,
    gprobs: bool,
    out: &mut W,
) -> Result<()> {
    write!(out, "{}\t.\t{}", al_probs.marker(marker), PASS)?;
    if print_r2 {
        let stats = GprobsStatistics::from_allele_probs(al_probs, marker);
        let format = if gprobs { "GT:DS:GP" } else { "GT:DS" };
        print_info_and_format(&stats, format, out)?;
    } else {
        write!(out, "\t.\tGT")?;
    }
    Ok(())
}

/// GT (unphased, from the most probable genotype), DS per ALT allele, and
/// GP over all genotypes.
fn print_gt_ds_gp<W: Write>(
    gv: &GenotypeValues,
    marker: usize,
    sample: usize,
    out: &mut W,
) -> Result<()> {
    let n_alleles = gv.marker(marker).n_alleles();
    let n_genotypes = gv.marker(marker).n_genotypes();
    let mut dose = vec![0f32; n_alleles];
    let mut best: Option<(usize, usize)> = None;
    let mut max_gp = 0f32;
    let mut sum = 0f32;
    let mut gt = 0usize;
    for a2 in 0..n_alleles {
        for a1 in 0..=a2 {
            let value = gv.value(marker, sample, gt);
            gt += 1;
            if value > max_gp {
                best = Some((a1, a2));
                max_gp = value;
            }
            dose[a1] += value;
            dose[a2] += value;
            sum += value;
        }
    }
    match best {
        Some((a1, a2)) => write!(out, "\t{}/{}", a1, a2)?,
        None => write!(out, "\t./.")?,
    }
    for (al, &d) in dose.iter().enumerate().skip(1) {
        let prefix = if al == 1 { ':' } else { ',' };
        write!(out, "{}{}", prefix, fmt_trimmed(d / sum, 2))?;
    }
    for gt in 0..n_genotypes {
        let prefix = if gt == 0 { ':' } else { ',' };
        write!(out, "{}{}", prefix, fmt_trimmed(gv.value(marker, sample, gt) / sum, 2))?;
    }
    Ok(())
}

/// Phased GT from the most probable allele per haplotype, plus per-ALT dose
fn print_gt_and_dose<W: Write>(
    al_probs: &AlleleProbs,
    marker: usize,
    sample: usize,
    imputed: bool,
    out: &mut W,
) -> Result<()> {
    write!(
        out,
        "\t{}|{}",
        al_probs.allele1(marker, sample),
        al_probs.allele2(marker, sample)
    )?;
    if imputed {
        let n_alleles = al_probs.marker(marker).n_alleles();
        for j in 1..n_alleles {
            let p1 = al_probs.al_prob1(marker, sample, j);
            let p2 = al_probs.al_prob2(marker, sample, j);
            let prefix = if j == 1 { ':' } else { ',' };
            write!(out, "{}{}", prefix, fmt_trimmed(p1 + p2, 2))?;
        }
    }
    Ok(())
}

fn print_gp<W: Write>(
    al_probs: &AlleleProbs,
    marker: usize,
    sample: usize,
    out: &mut W,
) -> Result<()> {
    let n_alleles = al_probs.marker(marker).n_alleles();
    for a2 in 0..n_alleles {
        for a1 in 0..=a2 {
            let mut gt_prob = al_probs.gt_prob(marker, sample, a1, a2);
            if a1 != a2 {
                gt_prob += al_probs.gt_prob(marker, sample, a2, a1);
            }
            let prefix = if a1 == 0 && a2 == 0 { ':' } else { ',' };
            write!(out, "{}{}", prefix, fmt_trimmed(gt_prob, 2))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::allele_probs::HapAlleleProbs;

    fn reader_from(text: &str) -> Result<VcfReader> {
        let reader: Box<dyn BufRead + Send> =
            Box::new(std::io::Cursor::new(text.as_bytes().to_vec()));
        VcfReader::from_reader(
            reader,
            PathBuf::from("test.vcf"),
            &HashSet::new(),
            Arc::new(ChromIds::new()),
        )
    }

    const HEADER: &str = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

    #[test]
    fn test_reader_parses_phased_genotypes() {
        let text = format!(
            "{}1\t100\trs1\tA\tT\t.\tPASS\t.\tGT\t0|1\t1|1\n1\t200\t.\tG\tC,T\t.\tPASS\t.\tGT:DS\t0|2\t1|0\n",
            HEADER
        );
        let mut reader = reader_from(&text).unwrap();
        assert_eq!(reader.samples().n_samples(), 2);

        let e1 = reader.next_emission().unwrap().unwrap();
        assert_eq!(e1.pos(), 100);
        assert_eq!(e1.marker().id(), Some("rs1"));
        assert_eq!(
            (0..4).map(|h| e1.allele(h)).collect::<Vec<_>>(),
            vec![0, 1, 1, 1]
        );

        let e2 = reader.next_emission().unwrap().unwrap();
        assert_eq!(e2.marker().n_alleles(), 3);
        assert_eq!(e2.allele(1), 2);
        assert!(reader.next_emission().unwrap().is_none());
    }

    #[test]
    fn test_reader_rejects_bad_allele_index() {
        let text = format!("{}1\t100\t.\tA\tT\t.\tPASS\t.\tGT\t0|3\t0|0\n", HEADER);
        let mut reader = reader_from(&text).unwrap();
        assert!(matches!(
            reader.next_emission(),
            Err(WeftError::Format { .. })
        ));
    }

    #[test]
    fn test_read_sample_hap_pairs_requires_phased() {
        let text = format!("{}1\t100\t.\tA\tT\t.\tPASS\t.\tGT\t0/1\t0|0\n", HEADER);
        let mut reader = reader_from(&text).unwrap();
        assert!(read_sample_hap_pairs(&mut reader).is_err());
    }

    #[test]
    fn test_meta_lines() {
        let ids: Vec<Arc<str>> = vec!["S1".into(), "S2".into()];
        let mut out = Vec::new();
        write_meta_lines(&ids, Some("weft"), true, true, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("##fileformat=VCFv4.2\n##filedate="));
        assert!(text.contains("##source=\"weft\""));
        assert!(text.contains("##INFO=<ID=AF"));
        assert!(text.contains("##FORMAT=<ID=GT"));
        assert!(text.contains("##FORMAT=<ID=GP"));
        assert!(!text.contains("##FORMAT=<ID=GL"));
        assert!(text.ends_with("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n"));
    }

    #[test]
    fn test_append_records_format() {
        let mut reader = reader_from(&format!(
            "{}1\t100\t.\tA\tT\t.\tPASS\t.\tGT\t0|1\t1|1\n",
            HEADER
        ))
        .unwrap();
        let haps = read_sample_hap_pairs(&mut reader).unwrap();
        let markers = haps.markers_arc();
        // confident per-haplotype probabilities matching the genotypes
        let by_hap: Vec<HapAlleleProbs> = (0..4)
            .map(|h| {
                let alt = haps.allele(0, h) as f32;
                HapAlleleProbs::new(markers.clone(), h, vec![1.0 - alt, alt])
            })
            .collect();
        let al_probs = AlleleProbs::new(markers, haps.samples().clone(), by_hap);

        let mut out = Vec::new();
        append_records(&al_probs, 0, 1, true, true, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let fields: Vec<&str> = text.trim_end().split('\t').collect();
        assert_eq!(fields[0], "1");
        assert_eq!(fields[1], "100");
        assert_eq!(fields[5], ".");
        assert_eq!(fields[6], "PASS");
        assert!(fields[7].starts_with("AR2="));
        assert!(fields[7].contains(";DR2="));
        assert!(fields[7].contains(";AF=0.75"));
        assert_eq!(fields[8], "GT:DS:GP");
        assert_eq!(fields[9], "0|1:1:0,1,0");
        assert_eq!(fields[10], "1|1:2:0,0,1");
    }
}
