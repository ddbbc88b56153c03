use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use cfod::process::decode::Decoder;
use cfod::structs::chunk::AssembledChunk;
use indicatif::MultiProgress;
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use super::expand_glob;
use super::progress::{create_progress_bar, print_suspended};
use crate::timestamp::time_str;

/// Per-file summary, also the YAML record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSummary {
    pub path: PathBuf,
    pub version: u64,
    pub beam: u64,
    pub bit_depth: usize,
    pub nfreq_coarse: usize,
    pub nupfreq: usize,
    pub nchan: usize,
    pub nt_coarse: usize,
    pub nt_per_packet: usize,
    pub nt: usize,
    pub fpga0: u64,
    pub fpga_n: u64,
    pub binning: u64,
    /// Seconds since the acquisition epoch, or since `fpga0 = 0` for
    /// version 1 chunks.
    pub time_start: f64,
    pub time_end: f64,
    pub duration: f64,
    pub has_rfi_mask: bool,
    pub nrfifreq: Option<usize>,
    pub masked_fraction: f64,
    pub description: String,
}

impl ChunkSummary {
    pub fn from_chunk(path: &Path, chunk: &AssembledChunk) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            version: chunk.version.number(),
            beam: chunk.beam,
            bit_depth: chunk.bit_depth.bits(),
            nfreq_coarse: chunk.nfreq_coarse(),
            nupfreq: chunk.nupfreq,
            nchan: chunk.nchan(),
            nt_coarse: chunk.nt_coarse,
            nt_per_packet: chunk.nt_per_packet,
            nt: chunk.nt(),
            fpga0: chunk.fpga0,
            fpga_n: chunk.fpga_n,
            binning: chunk.binning,
            time_start: chunk.time_start(),
            time_end: chunk.time_end(),
            duration: chunk.time_end() - chunk.time_start(),
            has_rfi_mask: chunk.has_rfi_mask,
            nrfifreq: chunk.nrfifreq,
            masked_fraction: chunk.masked_fraction()?,
            description: chunk.to_string(),
        })
    }
}

fn format_summary(summary: &ChunkSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", summary.path.display());
    let _ = writeln!(out, "  {}", summary.description);
    let _ = writeln!(out, "  Format version            {}", summary.version);
    let _ = writeln!(out, "  Beam                      {}", summary.beam);
    let _ = writeln!(out, "  Bit depth                 {}", summary.bit_depth);
    let _ = writeln!(
        out,
        "  Channels                  {} ({} coarse x {})",
        summary.nchan, summary.nfreq_coarse, summary.nupfreq
    );
    let _ = writeln!(
        out,
        "  Samples                   {} ({} packets x {})",
        summary.nt, summary.nt_coarse, summary.nt_per_packet
    );
    let _ = writeln!(out, "  Binning                   {}", summary.binning);
    let _ = writeln!(
        out,
        "  FPGA counts               {} + {}",
        summary.fpga0, summary.fpga_n
    );
    let _ = write!(
        out,
        "  Time span                 {:.6} - {:.6} s",
        summary.time_start, summary.time_end
    );
    if summary.version == 1 {
        out.push_str(" (no frame0_nano)");
    }
    out.push('\n');
    let _ = writeln!(out, "  Duration                  {}", time_str(summary.duration));
    if summary.has_rfi_mask {
        let _ = writeln!(
            out,
            "  RFI mask                  {} rows, {:.1}% masked",
            summary.nrfifreq.unwrap_or(0),
            summary.masked_fraction * 100.0
        );
    } else {
        let _ = writeln!(out, "  RFI mask                  none");
    }
    out.push('\n');
    out
}

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let paths = match &args.obsglob {
        Some(pattern) => expand_glob(pattern)?,
        None => args.inputs.clone(),
    };

    let pb = multi
        .map(|multi| create_progress_bar(multi, paths.len() as u64))
        .transpose()?;

    let summaries = summarize(&paths, cli, |summary| {
        if !args.yaml {
            print_suspended(pb.as_ref(), &format_summary(summary));
        }
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
    })?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&summaries)?);
    }

    log::info!("Read {} of {} chunk files", summaries.len(), paths.len());
    Ok(())
}

/// Decodes each file in turn. Unreadable files are skipped with a warning
/// unless in strict mode.
fn summarize<F>(paths: &[PathBuf], cli: &Cli, mut on_summary: F) -> Result<Vec<ChunkSummary>>
where
    F: FnMut(&ChunkSummary),
{
    let mut decoder = Decoder::default();
    decoder.set_fail_level(cli.fail_level());

    let mut summaries = Vec::with_capacity(paths.len());
    for path in paths {
        let summary = decoder
            .decode_file(path)
            .map_err(anyhow::Error::from)
            .and_then(|chunk| ChunkSummary::from_chunk(path, &chunk));

        match summary {
            Ok(summary) => {
                on_summary(&summary);
                summaries.push(summary);
            }
            Err(e) => {
                if cli.strict {
                    return Err(e);
                }
                log::warn!("Skipping {}: {e}", path.display());
            }
        }
    }

    if summaries.is_empty() {
        bail!("None of the {} input files is a readable chunk", paths.len());
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::fixture::{NCHAN, NT, write_chunk};
    use clap::Parser as ClapParser;

    fn cli(strict: bool) -> Cli {
        let mut argv = vec!["cfodd"];
        if strict {
            argv.push("--strict");
        }
        argv.extend(["info", "unused.msgpack"]);
        Cli::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn summary_of_version_1_chunk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_chunk(dir.path(), "chunk.msgpack", 768, 2, 42);

        let summaries = summarize(&[path.clone()], &cli(false), |_| {})?;
        let summary = &summaries[0];
        assert_eq!(summary.path, path);
        assert_eq!(summary.version, 1);
        assert_eq!(summary.bit_depth, 8);
        assert_eq!((summary.nchan, summary.nt), (NCHAN, NT));
        assert_eq!(summary.binning, 2);
        // 768 FPGA counts into an epoch of 0
        assert!((summary.time_start - 768.0 * 384.0 * 2560.0 * 1e-9).abs() < 1e-12);
        assert!((summary.duration - summary.fpga_n as f64 * 384.0 * 2560.0 * 1e-9).abs() < 1e-12);
        assert!(!summary.has_rfi_mask);
        assert_eq!(summary.masked_fraction, 0.0);

        let text = format_summary(summary);
        assert!(text.contains("(no frame0_nano)"));
        assert!(text.contains("FPGA counts               768 + 6144"));
        assert!(text.contains("Channels                  16 (4 coarse x 4)"));

        let yaml = serde_yaml_ng::to_string(&summaries)?;
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("fpga0: 768"));
        Ok(())
    }

    #[test]
    fn unreadable_files_are_skipped_unless_strict() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let good = write_chunk(dir.path(), "good.msgpack", 0, 1, 7);
        let bad = dir.path().join("bad.msgpack");
        std::fs::write(&bad, b"not msgpack")?;
        let paths = [bad.clone(), good.clone()];

        let mut seen = Vec::new();
        let summaries = summarize(&paths, &cli(false), |s| seen.push(s.path.clone()))?;
        assert_eq!(summaries.len(), 1);
        assert_eq!(seen, [good]);

        assert!(summarize(&paths, &cli(true), |_| {}).is_err());
        assert!(summarize(&[bad], &cli(false), |_| {}).is_err());
        Ok(())
    }
}
