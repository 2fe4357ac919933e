//! # Window Writer
//!
//! Appends per-window output: VCF records to a block-gzipped stream, and
//! IBD/HBD segment records to plain-text files. Segments that cross the
//! splice into the next window are buffered, keyed by haplotype pair, and
//! merged with their continuation so that a segment spanning a window
//! boundary is written exactly once.
//!
//! Instances are not thread-safe and must be driven from the pipeline
//! thread. Every operation on a closed writer is a state error.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use noodles::bgzf as bgzf_io;

use crate::data::haplotype::Samples;
use crate::error::{Result, WeftError};
use crate::io::vcf;
use crate::model::allele_probs::{AlleleProbs, GenotypeValues};
use crate::model::current_data::CurrentData;
use crate::model::ibd::{HapPair, IbdSegment};
use crate::utils::format::fmt_trimmed;

pub struct WindowWriter {
    samples: Arc<Samples>,
    vcf_out: Option<bgzf_io::Writer<File>>,
    ibd_file: PathBuf,
    hbd_file: PathBuf,
    /// false until the first IBD write; the first write truncates
    append_ibd: bool,
    ibd_buffer: HashMap<HapPair, IbdSegment>,
}

impl WindowWriter {
    /// Creates `<prefix>.vcf.gz` and writes its header block; `.ibd` and
    /// `.hbd` files are created lazily on the first segment write.
    pub fn new(
        samples: Arc<Samples>,
        out_prefix: &str,
        source: Option<&str>,
        gprobs: bool,
    ) -> Result<Self> {
        if out_prefix.is_empty() {
            return Err(WeftError::config("empty output prefix"));
        }
        let vcf_file = PathBuf::from(format!("{}.vcf.gz", out_prefix));
        let file = File::create(&vcf_file)?;
        let mut vcf_out = bgzf_io::Writer::new(file);
        vcf::write_meta_lines(samples.ids(), source, true, gprobs, false, &mut vcf_out)?;
        Ok(Self {
            samples,
            vcf_out: Some(vcf_out),
            ibd_file: PathBuf::from(format!("{}.ibd", out_prefix)),
            hbd_file: PathBuf::from(format!("{}.hbd", out_prefix)),
            append_ibd: false,
            ibd_buffer: HashMap::new(),
        })
    }

    /// Samples whose data this writer prints
    pub fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    pub fn is_closed(&self) -> bool {
        self.vcf_out.is_none()
    }

    /// Finishes the block-gzipped stream. Subsequent print calls fail.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.vcf_out.take() {
            out.try_finish()?;
        }
        Ok(())
    }

    fn vcf_out(&mut self) -> Result<&mut bgzf_io::Writer<File>> {
        self.vcf_out
            .as_mut()
            .ok_or_else(|| WeftError::state("window writer is closed"))
    }

    /// Appends records with GT:DS:GP fields for target markers in
    /// [prevTargetSplice, nextTargetSplice).
    pub fn print_gv(&mut self, cd: &CurrentData, gv: &GenotypeValues) -> Result<()> {
        let (start, end) = (cd.prev_target_splice(), cd.next_target_splice());
        let out = self.vcf_out()?;
        vcf::append_records_gv(gv, start, end, out)?;
        out.flush()?;
        Ok(())
    }

    /// Appends records from phased allele probabilities for reference
    /// markers in [prevSplice, nextSplice).
    pub fn print(
        &mut self,
        cd: &CurrentData,
        al_probs: &AlleleProbs,
        imputed: bool,
        gprobs: bool,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(WeftError::state("window writer is closed"));
        }
        if cd.markers() != al_probs.markers() {
            return Err(WeftError::consistency(
                "allele probabilities do not cover the window markers",
            ));
        }
        if self.samples.as_ref() != cd.target_samples().as_ref()
            || self.samples.as_ref() != al_probs.samples().as_ref()
        {
            return Err(WeftError::consistency(
                "allele probabilities are not for the writer's samples",
            ));
        }
        let (start, end) = (cd.prev_splice(), cd.next_splice());
        let out = self.vcf_out()?;
        vcf::append_records(al_probs, start, end, imputed, gprobs, out)?;
        out.flush()?;
        Ok(())
    }

    /// Writes IBD segments that end in this window's authoritative region
    /// and buffers segments reaching into the next window. A segment with
    /// `startIndex == 0` is first merged with any buffered segment for the
    /// same haplotype pair. The input map is drained.
    pub fn print_ibd(
        &mut self,
        cd: &CurrentData,
        ibd: &mut HashMap<HapPair, Vec<IbdSegment>>,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(WeftError::state("window writer is closed"));
        }
        if self.samples.as_ref() != cd.target_samples().as_ref() {
            return Err(WeftError::consistency(
                "IBD segments are not for the writer's samples",
            ));
        }
        self.write_ibd(
            ibd,
            cd.prev_target_splice(),
            cd.next_target_overlap(),
            cd.next_target_splice(),
            cd.n_target_markers(),
        )
    }

    fn write_ibd(
        &mut self,
        ibd: &mut HashMap<HapPair, Vec<IbdSegment>>,
        prev_splice: usize,
        next_overlap: usize,
        next_splice: usize,
        n_markers: usize,
    ) -> Result<()> {
        let last_buffer = std::mem::take(&mut self.ibd_buffer);
        let mut ibd_out = BufWriter::new(open_segment_file(&self.ibd_file, self.append_ibd)?);
        let mut hbd_out = BufWriter::new(open_segment_file(&self.hbd_file, self.append_ibd)?);
        for (key, segments) in ibd.drain() {
            for mut segment in segments {
                if segment.start_index() == 0 {
                    if let Some(saved) = last_buffer.get(&key) {
                        segment = IbdSegment::merge(saved, &segment);
                    }
                }
                let end_p1 = segment.end_index() + 1;
                if end_p1 >= prev_splice as i32
                    && (next_splice == n_markers || end_p1 < next_splice as i32)
                {
                    let out = if segment.is_hbd() {
                        &mut hbd_out
                    } else {
                        &mut ibd_out
                    };
                    self.print_segment(&segment, out)?;
                } else if segment.start_index() < next_overlap as i32 {
                    self.ibd_buffer.insert(key, segment);
                }
            }
        }
        ibd_out.flush()?;
        hbd_out.flush()?;
        self.append_ibd = true;
        Ok(())
    }

    fn print_segment<W: Write>(&self, segment: &IbdSegment, out: &mut W) -> Result<()> {
        let (h1, h2) = (segment.hap1(), segment.hap2());
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.samples.id(h1 / 2),
            h1 % 2 + 1,
            self.samples.id(h2 / 2),
            h2 % 2 + 1,
            segment.chrom(),
            segment.start_pos(),
            segment.end_pos(),
            fmt_trimmed(segment.score(), 2)
        )?;
        Ok(())
    }
}

fn open_segment_file(path: &PathBuf, append: bool) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .append(append)
        .write(true)
        .truncate(!append)
        .open(path)?;
    Ok(file)
}
