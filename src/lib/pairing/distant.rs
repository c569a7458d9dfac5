//! Distant-mate stand-in encoding and recovery.
//!
//! A coordinate-sorted traversal restricted to regions of interest never sees
//! the far-away mate of a read whose pair straddles contigs or spans a long
//! gap. The `distant-mates` subcommand closes that hole by emitting, for every
//! such read, an altered copy placed at the *mate's* coordinate; merged back
//! into the traversal, the copy shows up exactly where the mate does. This
//! module owns the alteration and its inverse.
//!
//! The altered copy keeps the read's name, sequence, and qualities, moves to
//! the mate's (contig, position), and flattens its CIGAR to a full-length
//! match so its span stays predictable. The original contig, 1-based position,
//! and CIGAR are stowed in the [`DISTANT_MATE_TAG`] aux field; `NM` is dropped
//! because it no longer describes the new placement. Recovery parses the tag,
//! restores the original coordinate and CIGAR, and removes the tag, yielding a
//! record equivalent to the one the encoder saw.

use anyhow::{anyhow, Context, Result};
use rust_htslib::bam::record::{Aux, Cigar, CigarString, Record};
use rust_htslib::bam::HeaderView;
use rustc_hash::FxHashMap;
use std::convert::TryFrom;
use std::str;

/// Aux tag holding "contig,1-based-start,cigar" for an altered copy.
pub const DISTANT_MATE_TAG: &[u8] = b"DM";

/// True when the record is a stand-in produced by the distant-mate encoder.
#[inline]
pub fn is_distant_mate(read: &Record) -> bool {
    read.aux(DISTANT_MATE_TAG).is_ok()
}

/// Encodes and decodes stand-ins against one sequence dictionary.
pub struct DistantMateCodec {
    tids_by_name: FxHashMap<Vec<u8>, i32>,
    names_by_tid: Vec<Vec<u8>>,
}

impl DistantMateCodec {
    /// Build the contig name/TID maps from a header.
    pub fn new(header: &HeaderView) -> Self {
        let target_count = header.target_count();
        let mut tids_by_name = FxHashMap::default();
        let mut names_by_tid = Vec::with_capacity(target_count as usize);
        for tid in 0..target_count {
            let name = header.tid2name(tid).to_vec();
            tids_by_name.insert(name.clone(), tid as i32);
            names_by_tid.push(name);
        }
        Self {
            tids_by_name,
            names_by_tid,
        }
    }

    /// Produce the altered copy of `read`, placed at its mate's coordinate.
    ///
    /// The read and its mate must both be mapped.
    pub fn apply_alterations(&self, read: &Record) -> Result<Record> {
        let contig = self.contig_name(read.tid())?;
        let payload = format!(
            "{},{},{}",
            str::from_utf8(contig).context("Contig name is not UTF-8")?,
            read.pos() + 1,
            read.cigar()
        );
        let qname = read.qname().to_vec();
        let seq = read.seq().as_bytes();
        let qual = read.qual().to_vec();
        let flat_cigar = CigarString(vec![Cigar::Match(seq.len() as u32)]);

        let mut copy = read.clone();
        copy.set(&qname, Some(&flat_cigar), &seq, &qual);
        copy.set_tid(read.mtid());
        copy.set_pos(read.mpos());
        if copy.aux(b"NM").is_ok() {
            copy.remove_aux(b"NM")?;
        }
        copy.push_aux(DISTANT_MATE_TAG, Aux::String(&payload))?;
        Ok(copy)
    }

    /// Rebuild the original record from a stand-in: restore the stowed
    /// coordinate and CIGAR and strip the marker tag.
    pub fn undo_alterations(&self, read: &Record) -> Result<Record> {
        let payload = match read.aux(DISTANT_MATE_TAG) {
            Ok(Aux::String(value)) => value.to_owned(),
            Ok(_) => {
                return Err(anyhow!(
                    "Malformed distant-mate tag on '{}': not a string",
                    String::from_utf8_lossy(read.qname())
                ))
            }
            Err(_) => {
                return Err(anyhow!(
                    "Read '{}' carries no distant-mate tag",
                    String::from_utf8_lossy(read.qname())
                ))
            }
        };
        // Contig names may themselves contain commas, so split from the right:
        // the last two fields are the position and CIGAR, the rest is the name.
        let mut fields = payload.rsplitn(3, ',');
        let cigar_text = fields.next();
        let pos_text = fields.next();
        let contig = fields.next();
        let (cigar_text, pos_text, contig) = match (cigar_text, pos_text, contig) {
            (Some(cigar), Some(pos), Some(contig)) => (cigar, pos, contig),
            _ => {
                return Err(anyhow!(
                    "Malformed distant-mate tag on '{}': '{}'",
                    String::from_utf8_lossy(read.qname()),
                    payload
                ))
            }
        };
        let tid = *self.tids_by_name.get(contig.as_bytes()).ok_or_else(|| {
            anyhow!(
                "Distant-mate tag on '{}' names unknown contig '{}'",
                String::from_utf8_lossy(read.qname()),
                contig
            )
        })?;
        let pos: i64 = pos_text
            .parse()
            .with_context(|| format!("Bad position in distant-mate tag '{}'", payload))?;
        let cigar = CigarString::try_from(cigar_text.as_bytes())
            .with_context(|| format!("Bad CIGAR in distant-mate tag '{}'", payload))?;

        let qname = read.qname().to_vec();
        let seq = read.seq().as_bytes();
        let qual = read.qual().to_vec();
        let mut restored = read.clone();
        restored.set(&qname, Some(&cigar), &seq, &qual);
        restored.set_tid(tid);
        restored.set_pos(pos - 1);
        restored.remove_aux(DISTANT_MATE_TAG)?;
        Ok(restored)
    }

    fn contig_name(&self, tid: i32) -> Result<&[u8]> {
        if tid < 0 {
            return Err(anyhow!("Read has no contig"));
        }
        self.names_by_tid
            .get(tid as usize)
            .map(|name| name.as_slice())
            .ok_or_else(|| anyhow!("TID {} is not in the sequence dictionary", tid))
    }
}
