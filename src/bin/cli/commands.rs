//! Command implementations for the CLI tool.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use walkdir::WalkDir;

use archkit::format::locator::ReadSeek;
use archkit::hash::{ChecksumFile, ChecksumStyle, ChecksumWriter, HashGroup, HashMethod, HashOptions};
use archkit::read::{
    Archive, ExtractOptions, LinkPolicy, OpenOptions, OverwritePolicy, PathMode, PathSafety,
    PreserveMetadata, TestOptions, Threads,
};

use crate::exit_codes::{ExitCode, error_to_exit_code, severity_to_exit_code};
use crate::file_selector::FileSelector;
use crate::output::{OutputFormatter, create_formatter};
use crate::progress::CliProgress;
use crate::{LinkMode, OutputFormat, OverwriteMode};

/// Settings shared by every command.
pub struct Context {
    pub format: OutputFormat,
    pub quiet: bool,
    pub threads: usize,
    pub interrupted: Arc<AtomicBool>,
    pub open: OpenOptions,
}

impl Context {
    fn formatter(&self) -> Box<dyn OutputFormatter> {
        create_formatter(self.format)
    }

    fn progress(&self, verbose: bool) -> CliProgress {
        // JSON output goes to stdout; keep stderr free of bars as well.
        let quiet = self.quiet || self.format == OutputFormat::Json;
        CliProgress::new(quiet, Arc::clone(&self.interrupted)).verbose(verbose)
    }

    fn threads(&self) -> Threads {
        match self.threads {
            0 => Threads::Auto,
            n => Threads::count_or_single(n),
        }
    }

    fn open(&self, path: &Path) -> Result<Archive<Box<dyn ReadSeek>>, ExitCode> {
        Archive::open_path_with(path, &self.open).map_err(|e| {
            eprintln!("Error opening {}: {}", path.display(), e);
            error_to_exit_code(&e)
        })
    }
}

/// Exit code for an archive that opened, before any item work.
fn open_status<R>(archive: &Archive<R>) -> ExitCode {
    if archive.info().is_clean() {
        ExitCode::Success
    } else {
        ExitCode::Warning
    }
}

fn selector(include: &[String], exclude: &[String]) -> Result<FileSelector, ExitCode> {
    FileSelector::new(include, exclude).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::BadArgs
    })
}

/// List command implementation
pub fn list(
    ctx: &Context,
    archive_path: &Path,
    technical: bool,
    include: &[String],
    exclude: &[String],
) -> ExitCode {
    let selector = match selector(include, exclude) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let archive = match ctx.open(archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let items: Vec<_> = archive
        .selected(&selector)
        .into_iter()
        .map(|i| archive.items()[i].clone())
        .collect();
    print!(
        "{}",
        ctx.formatter().format_list(archive.info(), &items, technical)
    );
    open_status(&archive)
}

/// Info command implementation
pub fn info(ctx: &Context, archive_path: &Path) -> ExitCode {
    let archive = match ctx.open(archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    print!(
        "{}",
        ctx.formatter().format_info(archive.info(), archive.items())
    );
    open_status(&archive)
}

/// Configuration for the extract command.
pub struct ExtractConfig<'a> {
    pub archive_path: &'a Path,
    pub output_dir: &'a Path,
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub overwrite: OverwriteMode,
    pub flat: bool,
    pub strip_prefix: Option<&'a str>,
    pub links: LinkMode,
    pub no_metadata: bool,
    pub relaxed_paths: bool,
    pub verbose: bool,
}

impl ExtractConfig<'_> {
    fn options(&self) -> ExtractOptions {
        let overwrite = match self.overwrite {
            OverwriteMode::Always => OverwritePolicy::Overwrite,
            OverwriteMode::Never => OverwritePolicy::Skip,
            OverwriteMode::Prompt => OverwritePolicy::Ask,
            OverwriteMode::Rename => OverwritePolicy::AutoRename,
            OverwriteMode::RenameExisting => OverwritePolicy::RenameExisting,
        };
        let link_policy = match self.links {
            LinkMode::Skip => LinkPolicy::Forbid,
            LinkMode::Safe => LinkPolicy::ValidateTargets,
            LinkMode::Keep => LinkPolicy::Allow,
        };
        let path_mode = match (self.flat, self.strip_prefix) {
            (true, _) => PathMode::NoPath,
            (false, Some(_)) => PathMode::Current,
            (false, None) => PathMode::Full,
        };
        let mut options = ExtractOptions::new()
            .overwrite(overwrite)
            .link_policy(link_policy)
            .path_mode(path_mode)
            .path_safety(if self.relaxed_paths {
                PathSafety::Relaxed
            } else {
                PathSafety::Strict
            })
            .preserve_metadata(if self.no_metadata {
                PreserveMetadata::none()
            } else {
                PreserveMetadata::all()
            });
        if let Some(prefix) = self.strip_prefix {
            options = options.strip_prefix(prefix);
        }
        options
    }
}

/// Extract command implementation
pub fn extract(ctx: &Context, config: &ExtractConfig<'_>) -> ExitCode {
    let selector = match selector(config.include, config.exclude) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let mut archive = match ctx.open(config.archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let status = open_status(&archive);

    let options = config.options().limits(ctx.open.limits.clone());
    let mut progress = ctx.progress(config.verbose);
    let result = archive.extract_with(config.output_dir, &selector, &options, &mut progress);
    progress.finish();

    let result = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };
    print!(
        "{}",
        ctx.formatter().format_extract_result(&result, "Extracted")
    );
    status.worst(severity_to_exit_code(result.severity()))
}

/// Test command implementation
pub fn test(
    ctx: &Context,
    archive_path: &Path,
    include: &[String],
    exclude: &[String],
    verbose: bool,
) -> ExitCode {
    let selector = match selector(include, exclude) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let mut archive = match ctx.open(archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let status = open_status(&archive);

    let options = TestOptions::new().limits(ctx.open.limits.clone());
    let mut progress = ctx.progress(verbose);
    let result = archive.test_with(&selector, &options, &mut progress);
    progress.finish();

    let result = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };
    print!("{}", ctx.formatter().format_extract_result(&result, "Tested"));
    status.worst(severity_to_exit_code(result.severity()))
}

/// Configuration for the hash command.
pub struct HashConfig<'a> {
    pub paths: &'a [PathBuf],
    pub methods: &'a [String],
    pub in_archive: bool,
    pub no_names: bool,
    pub bsd: bool,
    pub write: Option<&'a Path>,
    pub check: Option<&'a Path>,
}

fn parse_methods(names: &[String]) -> Result<Vec<HashMethod>, ExitCode> {
    if names.is_empty() {
        return Ok(vec![HashMethod::Crc32]);
    }
    names
        .iter()
        .map(|n| {
            HashMethod::from_name(n).ok_or_else(|| {
                eprintln!("Error: unknown hash method '{}'", n);
                ExitCode::BadArgs
            })
        })
        .collect()
}

/// Directories are walked in sorted order so aggregates are reproducible.
fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if !path.is_dir() {
            out.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name().follow_links(false) {
            match entry {
                Ok(entry) if entry.depth() > 0 => out.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => eprintln!("Warning: {}", e),
            }
        }
    }
    out
}

/// Hash command implementation
pub fn hash(ctx: &Context, config: &HashConfig<'_>) -> ExitCode {
    let methods = match parse_methods(config.methods) {
        Ok(m) => m,
        Err(code) => return code,
    };
    if let Some(listing) = config.check {
        return check_listing(ctx, listing, methods.first().copied());
    }
    if config.paths.is_empty() {
        eprintln!("Error: no input paths");
        return ExitCode::BadArgs;
    }

    let options = HashOptions::new()
        .methods(methods.clone())
        .include_names(!config.no_names)
        .threads(ctx.threads());
    let mut progress = ctx.progress(false);

    let mut status = ExitCode::Success;
    let report = if config.in_archive {
        let [archive_path] = config.paths else {
            eprintln!("Error: --archive takes exactly one archive");
            return ExitCode::BadArgs;
        };
        let mut archive = match ctx.open(archive_path) {
            Ok(a) => a,
            Err(code) => return code,
        };
        status = open_status(&archive);
        archive.hash_with((), &options, &mut progress)
    } else {
        let files = expand_paths(config.paths);
        archkit::hash::hash_paths_with(&files, &options, &mut progress)
    };
    progress.finish();

    let report = match report {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };

    if let Some(target) = config.write {
        if let Err(e) = write_listing(target, &report, methods[0], config.bsd) {
            eprintln!("Error writing {}: {}", target.display(), e);
            return ExitCode::IoError;
        }
    }
    print!("{}", ctx.formatter().format_hash_report(&report));

    let outcome = if report.cancelled {
        ExitCode::UserInterrupt
    } else if report.errors() > 0 {
        ExitCode::ItemErrors
    } else {
        ExitCode::Success
    };
    status.worst(outcome)
}

/// Writes a listing for the first method, ending with the data aggregate.
fn write_listing(
    target: &Path,
    report: &archkit::hash::HashReport,
    method: HashMethod,
    bsd: bool,
) -> std::io::Result<()> {
    let file = BufWriter::new(File::create(target)?);
    let mut writer = ChecksumWriter::new(file, method);
    if bsd {
        writer = writer.style(ChecksumStyle::Bsd);
    }
    for item in report.items.iter().filter(|i| !i.is_dir) {
        if let Some((_, digest)) = item.digests.iter().find(|(m, _)| *m == method) {
            writer.write_entry(&item.path, digest, Some(item.size))?;
        }
    }
    if let Some((_, sum)) = report
        .sum(HashGroup::Data)
        .into_iter()
        .find(|(m, _)| *m == method)
    {
        writer.write_aggregate(sum)?;
    }
    writer.into_inner()?.flush()
}

fn check_listing(ctx: &Context, listing: &Path, method: Option<HashMethod>) -> ExitCode {
    let bytes = match std::fs::read(listing) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {}", listing.display(), e);
            return ExitCode::IoError;
        }
    };
    let hint = listing
        .extension()
        .and_then(|e| e.to_str())
        .and_then(HashMethod::from_name)
        .or(method);
    let parsed = match ChecksumFile::parse(&bytes, hint) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };
    let base = listing.parent().unwrap_or_else(|| Path::new("."));
    let mut progress = ctx.progress(false);
    let report = parsed.verify(base, &mut progress);
    progress.finish();

    match report {
        Ok(report) => {
            print!("{}", ctx.formatter().format_verify_report(&report));
            if report.cancelled {
                ExitCode::UserInterrupt
            } else if report.is_success() {
                ExitCode::Success
            } else {
                ExitCode::ItemErrors
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            error_to_exit_code(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_methods() {
        assert_eq!(parse_methods(&[]).unwrap(), vec![HashMethod::Crc32]);
        assert_eq!(
            parse_methods(&["sha-256".into(), "md5".into()]).unwrap(),
            vec![HashMethod::Sha256, HashMethod::Md5]
        );
        assert_eq!(parse_methods(&["nope".into()]), Err(ExitCode::BadArgs));
    }

    #[test]
    fn test_expand_paths_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b"), b"b").unwrap();
        std::fs::write(dir.path().join("a"), b"a").unwrap();
        let paths = expand_paths(&[dir.path().to_path_buf()]);
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a"),
                PathBuf::from("sub"),
                PathBuf::from("sub").join("b")
            ]
        );
    }
}
