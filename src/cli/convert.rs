use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use cfod::process::assemble::{AssembleOptions, BinningPolicy, unpack_datafiles};
use indicatif::MultiProgress;

use super::command::{Cli, ConvertArgs};
use super::expand_glob;
use super::progress::create_progress_bar;
use crate::filterbank::{FilterbankHeader, FilterbankWriter, SampleFormat};
use crate::subband::{checked_fscrunch, subband};
use crate::timestamp::time_str;

/// Bytes held per file at full resolution: 16k channels of 1024 samples,
/// intensity and weights, as `f32`.
const BYTES_PER_FILE: f64 = 16e3 * 1024.0 * 2.0 * 4.0;

fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match (base_path.extension(), base_path.file_name()) {
        (Some(ext), _) if ext == expected_ext => base_path.to_path_buf(),
        (Some(_), Some(name)) => {
            base_path.with_file_name(format!("{}.{expected_ext}", name.to_string_lossy()))
        }
        _ => base_path.with_extension(expected_ext),
    }
}

/// Files decoded at once so that a batch and its scrunched copy fit in
/// half of `ram` bytes.
pub fn files_per_batch(ram: f64) -> usize {
    let files = 0.5 * ram / BYTES_PER_FILE / 3.0;
    if files.is_finite() && files >= 1.0 {
        files as usize
    } else {
        1
    }
}

pub fn cmd_convert(args: &ConvertArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let paths = expand_glob(&args.obsglob)?;
    let outfile = create_path_with_extension(&args.outfile, "fil");
    let format = SampleFormat::try_from(args.nbits)?;
    let fscrunch = checked_fscrunch(args.fscrunch);
    let batch_size = files_per_batch(args.ram);

    log::info!(
        "Converting {} files to {} ({}-bit, fscrunch {fscrunch}, {batch_size} files per batch, strict mode: {})",
        paths.len(),
        outfile.display(),
        format.nbits(),
        cli.strict
    );

    let pb = multi
        .map(|multi| create_progress_bar(multi, paths.len() as u64))
        .transpose()?;

    let options = AssembleOptions {
        binning: if args.upsample {
            BinningPolicy::Upsample
        } else {
            BinningPolicy::Uniform
        },
        workers: args.jobs.max(1),
        fail_level: cli.fail_level(),
    };

    let mut writer = FilterbankWriter::new(File::create(&outfile)?);
    writer.configure_format(format)?;
    let mut header_tsamp = None;

    for batch_paths in paths.chunks(batch_size) {
        if let Some(ref pb) = pb {
            pb.set_message(format!("decoding {}", batch_paths[0].display()));
        }

        let batch = unpack_datafiles(batch_paths, &options)?;
        let subbands = subband(batch, fscrunch, args.subdm)?;

        match header_tsamp {
            None => {
                let header = FilterbankHeader::chime(
                    &args.obsglob,
                    &args.source,
                    subbands.tsamp,
                    subbands.nchan(),
                );
                writer.write_header(&header)?;
                header_tsamp = Some(subbands.tsamp);
                log::debug!(
                    "Header: {} channels of {} MHz, tsamp {} s",
                    subbands.nchan(),
                    subbands.df,
                    subbands.tsamp
                );
            }
            Some(tsamp) if tsamp != subbands.tsamp => {
                bail!(
                    "Batch starting at {} has sampling time {} s, file header has {tsamp} s",
                    batch_paths[0].display(),
                    subbands.tsamp
                );
            }
            Some(_) => {}
        }

        writer.write_spectra(subbands.weighted().view())?;

        if let Some(ref pb) = pb {
            pb.inc(batch_paths.len() as u64);
        }
    }

    writer.finish()?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    let stats = writer.stats();
    let duration = stats.spectra_written as f64 * header_tsamp.unwrap_or(0.0);
    log::info!(
        "Wrote {} {}-bit spectra of {} channels ({}) to {}",
        stats.spectra_written,
        stats.nbits,
        stats.nchans,
        time_str(duration),
        outfile.display()
    );

    Ok(())
}
