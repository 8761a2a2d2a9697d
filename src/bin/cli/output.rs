//! Output formatting for CLI operations.

use std::fmt::Write as _;

use archkit::hash::digest::hex_digest;
use archkit::hash::{HashReport, VerifyReport};
use archkit::item::{Item, ItemChecksum, LinkKind};
use archkit::progress::format_bytes_iec;
use archkit::read::{ArchiveInfo, ExtractResult};
use archkit::{Timestamp, hard_link_groups};
use serde_json::{Value, json};

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats the item list
    fn format_list(&self, info: &ArchiveInfo, items: &[Item], technical: bool) -> String;

    /// Formats archive information
    fn format_info(&self, info: &ArchiveInfo, items: &[Item]) -> String;

    /// Formats extraction or test results; `verb` is `Extracted` or `Tested`
    fn format_extract_result(&self, result: &ExtractResult, verb: &str) -> String;

    /// Formats digests and aggregates
    fn format_hash_report(&self, report: &HashReport) -> String;

    /// Formats the outcome of checking a listing
    fn format_verify_report(&self, report: &VerifyReport) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

fn attribute_string(item: &Item) -> String {
    let a = item.attributes;
    let flag = |bit: u32, c: char| if a.has(bit) { c } else { '.' };
    let mut s = String::with_capacity(5);
    s.push(if item.is_directory { 'D' } else { '.' });
    s.push(flag(archkit::item::Attributes::READONLY, 'R'));
    s.push(flag(archkit::item::Attributes::HIDDEN, 'H'));
    s.push(flag(archkit::item::Attributes::SYSTEM, 'S'));
    s.push(flag(archkit::item::Attributes::ARCHIVE, 'A'));
    s
}

fn checksum_string(checksum: Option<&ItemChecksum>) -> String {
    match checksum {
        Some(ItemChecksum::Crc16(c)) => format!("{c:04X}"),
        Some(ItemChecksum::Crc32(c)) => format!("{c:08X}"),
        Some(ItemChecksum::Digest { bytes, .. }) => hex_digest(bytes),
        None => "-".into(),
    }
}

fn link_suffix(item: &Item) -> String {
    match &item.link {
        Some(link) if link.kind == LinkKind::Hard => format!(" => {}", link.target),
        Some(link) => format!(" -> {}", link.target),
        None => String::new(),
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_list(&self, info: &ArchiveInfo, items: &[Item], technical: bool) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Format: {}", info.format);
        if technical {
            let _ = writeln!(
                output,
                "{:>19} {:<5} {:>12} {:>12} {:>8} {:<10} Name",
                "Modified", "Attr", "Size", "Packed", "Method", "Checksum"
            );
        } else {
            let _ = writeln!(output, "{:>19} {:<5} {:>12} Name", "Modified", "Attr", "Size");
        }
        output.push_str(&"-".repeat(70));
        output.push('\n');

        let (mut files, mut dirs, mut total) = (0usize, 0usize, 0u64);
        for item in items {
            if item.is_directory {
                dirs += 1;
            } else {
                files += 1;
                total += item.size_or_zero();
            }
            let modified = item
                .modified
                .map(format_timestamp)
                .unwrap_or_else(|| "-".into());
            let size = match item.size {
                Some(size) if !item.is_directory => size.to_string(),
                _ => String::new(),
            };
            let mut name = item.path.to_slash_string();
            if item.is_deleted {
                name.push_str(" (deleted)");
            }
            name.push_str(&link_suffix(item));

            if technical {
                let _ = writeln!(
                    output,
                    "{:>19} {:<5} {:>12} {:>12} {:>8} {:<10} {}",
                    modified,
                    attribute_string(item),
                    size,
                    item.packed_size.map(|p| p.to_string()).unwrap_or_default(),
                    item.method.as_deref().unwrap_or(""),
                    checksum_string(item.checksum.as_ref()),
                    name
                );
            } else {
                let _ = writeln!(
                    output,
                    "{:>19} {:<5} {:>12} {}",
                    modified,
                    attribute_string(item),
                    size,
                    name
                );
            }
        }

        output.push_str(&"-".repeat(70));
        output.push('\n');
        let _ = writeln!(
            output,
            "{} files, {} directories, {}",
            files,
            dirs,
            humanize_bytes(total)
        );
        output
    }

    fn format_info(&self, info: &ArchiveInfo, items: &[Item]) -> String {
        let mut output = String::new();
        output.push_str("Archive Information:\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');
        let _ = writeln!(output, "  Format:         {}", info.format);
        let _ = writeln!(output, "  Items:          {}", items.len());
        let _ = writeln!(
            output,
            "  Physical size:  {}",
            humanize_bytes(info.physical_size)
        );
        if info.volumes > 1 {
            let _ = writeln!(output, "  Volumes:        {}", info.volumes);
        }
        if let Some(method) = &info.method {
            let _ = writeln!(output, "  Method:         {}", method);
        }
        if info.is_solid {
            output.push_str("  Solid:          Yes\n");
        }
        if let Some(label) = &info.volume_label {
            let _ = writeln!(output, "  Volume label:   {}", label);
        }
        if let Some(serial) = info.volume_serial {
            let _ = writeln!(output, "  Serial number:  {:X}", serial);
        }
        if let Some(cluster) = info.cluster_size {
            let _ = writeln!(output, "  Cluster size:   {}", cluster);
        }
        if let Some(sector) = info.sector_size {
            let _ = writeln!(output, "  Sector size:    {}", sector);
        }
        if let Some(comment) = &info.comment {
            let _ = writeln!(output, "  Comment:        {}", comment);
        }
        let linked = hard_link_groups(items);
        if !linked.is_empty() {
            let _ = writeln!(output, "  Hard links:     {} nodes", linked.len());
        }
        if !info.flags.is_clean() {
            let _ = writeln!(output, "  Flags:          {}", info.flags.names().join(", "));
        }
        for warning in &info.warnings {
            let _ = writeln!(output, "  Warning:        {}", warning);
        }
        output
    }

    fn format_extract_result(&self, result: &ExtractResult, verb: &str) -> String {
        let mut output = String::new();
        if result.is_success() && result.skipped == 0 {
            let _ = writeln!(
                output,
                "{} {} files, {} directories, {} links ({})",
                verb,
                result.files,
                result.directories,
                result.links,
                humanize_bytes(result.bytes_written)
            );
            return output;
        }

        let _ = writeln!(output, "{} with problems:", verb);
        let _ = writeln!(output, "  Files:     {}", result.files);
        let _ = writeln!(output, "  Skipped:   {}", result.skipped);
        let _ = writeln!(output, "  Failed:    {}", result.failed);
        if result.cancelled {
            output.push_str("  Interrupted before all items were processed\n");
        }
        let failures: Vec<_> = result.failures().collect();
        if !failures.is_empty() {
            output.push_str("\nFailures:\n");
            for report in failures {
                let _ = writeln!(
                    output,
                    "  {}: {}{}",
                    report.path,
                    report.result,
                    report
                        .message
                        .as_deref()
                        .map(|m| format!(" ({m})"))
                        .unwrap_or_default()
                );
            }
        }
        output
    }

    fn format_hash_report(&self, report: &HashReport) -> String {
        let mut output = String::new();
        let methods = report.bundle.methods();
        for item in &report.items {
            if item.is_dir {
                continue;
            }
            if item.digests.is_empty() {
                let _ = writeln!(output, "{:<16} {}", item.result.label(), item.path);
                continue;
            }
            let digests: Vec<String> = item.digests.iter().map(|(_, d)| d.to_hex()).collect();
            let _ = writeln!(
                output,
                "{} {:>12} {}",
                digests.join(" "),
                item.size,
                item.path
            );
        }
        output.push('\n');
        let _ = writeln!(
            output,
            "Files: {}  Folders: {}  Size: {}",
            report.bundle.num_files, report.bundle.num_dirs, report.bundle.files_size
        );
        if report.bundle.num_alt_streams > 0 {
            let _ = writeln!(
                output,
                "Alternate streams: {}  Size: {}",
                report.bundle.num_alt_streams, report.bundle.alt_streams_size
            );
        }
        for group in report.groups() {
            for (method, digest) in report.sum(*group) {
                let _ = writeln!(
                    output,
                    "{:<7} for {}: {}",
                    method.name(),
                    group.label(),
                    if methods.len() == 1 || digest.count() == 0 {
                        digest.to_hex()
                    } else {
                        digest.to_hex_with_extra()
                    }
                );
            }
        }
        let errors = report.errors();
        if errors > 0 {
            let _ = writeln!(output, "Errors: {}", errors);
        }
        output
    }

    fn format_verify_report(&self, report: &VerifyReport) -> String {
        let mut output = String::new();
        for entry in &report.results {
            let status = if entry.result.is_ok() {
                "OK"
            } else {
                entry.result.label()
            };
            let _ = writeln!(output, "{}: {}", entry.name, status);
        }
        if !report.is_success() {
            let _ = writeln!(
                output,
                "{} of {} listed files did not match, {} unreadable",
                report.failed,
                report.results.len(),
                report.missing
            );
        }
        output
    }
}

/// JSON output formatter
pub struct JsonFormatter;

fn item_json(index: usize, item: &Item) -> Value {
    json!({
        "index": index,
        "path": item.path.to_slash_string(),
        "is_directory": item.is_directory,
        "size": item.size,
        "packed_size": item.packed_size,
        "modified": item.modified.map(|t| t.as_unix_secs()),
        "created": item.created.map(|t| t.as_unix_secs()),
        "attributes": item.attributes.bits(),
        "method": item.method,
        "checksum": item.checksum.as_ref().map(|c| checksum_string(Some(c))),
        "link": item.link.as_ref().map(|l| json!({
            "kind": format!("{:?}", l.kind),
            "target": l.target,
        })),
        "is_deleted": item.is_deleted,
        "is_alt_stream": item.is_alt_stream,
        "parent": item.parent,
    })
}

fn info_json(info: &ArchiveInfo) -> Value {
    json!({
        "format": info.format.name(),
        "physical_size": info.physical_size,
        "volumes": info.volumes,
        "method": info.method,
        "is_solid": info.is_solid,
        "volume_label": info.volume_label,
        "volume_serial": info.volume_serial,
        "cluster_size": info.cluster_size,
        "sector_size": info.sector_size,
        "comment": info.comment,
        "flags": info.flags.names(),
        "warnings": info.warnings,
    })
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".into());
    text.push('\n');
    text
}

impl OutputFormatter for JsonFormatter {
    fn format_list(&self, info: &ArchiveInfo, items: &[Item], _technical: bool) -> String {
        let items: Vec<_> = items
            .iter()
            .enumerate()
            .map(|(i, item)| item_json(i, item))
            .collect();
        pretty(&json!({ "archive": info_json(info), "items": items }))
    }

    fn format_info(&self, info: &ArchiveInfo, items: &[Item]) -> String {
        let mut value = info_json(info);
        value["item_count"] = json!(items.len());
        value["hard_link_nodes"] = json!(hard_link_groups(items).len());
        pretty(&value)
    }

    fn format_extract_result(&self, result: &ExtractResult, _verb: &str) -> String {
        let failures: Vec<_> = result
            .failures()
            .map(|r| json!({ "path": r.path, "result": r.result.label(), "message": r.message }))
            .collect();
        pretty(&json!({
            "success": result.is_success(),
            "files": result.files,
            "directories": result.directories,
            "links": result.links,
            "skipped": result.skipped,
            "failed": result.failed,
            "bytes": result.bytes_written,
            "cancelled": result.cancelled,
            "failures": failures,
        }))
    }

    fn format_hash_report(&self, report: &HashReport) -> String {
        let items: Vec<_> = report
            .items
            .iter()
            .map(|item| {
                let digests: serde_json::Map<_, _> = item
                    .digests
                    .iter()
                    .map(|(m, d)| (m.name().to_string(), json!(d.to_hex())))
                    .collect();
                json!({
                    "path": item.path,
                    "size": item.size,
                    "is_directory": item.is_dir,
                    "result": item.result.label(),
                    "digests": digests,
                })
            })
            .collect();
        let mut sums = serde_json::Map::new();
        for group in report.groups() {
            let per_method: serde_json::Map<_, _> = report
                .sum(*group)
                .into_iter()
                .map(|(m, d)| (m.name().to_string(), json!(d.to_hex_with_extra())))
                .collect();
            sums.insert(group.label().to_string(), Value::Object(per_method));
        }
        pretty(&json!({
            "items": items,
            "files": report.bundle.num_files,
            "directories": report.bundle.num_dirs,
            "size": report.bundle.files_size,
            "sums": sums,
            "errors": report.errors(),
            "cancelled": report.cancelled,
        }))
    }

    fn format_verify_report(&self, report: &VerifyReport) -> String {
        let results: Vec<_> = report
            .results
            .iter()
            .map(|r| json!({ "name": r.name, "result": r.result.label() }))
            .collect();
        pretty(&json!({
            "success": report.is_success(),
            "ok": report.ok,
            "failed": report.failed,
            "missing": report.missing,
            "results": results,
        }))
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Converts bytes to a human-readable string
pub fn humanize_bytes(bytes: u64) -> String {
    format_bytes_iec(bytes)
}

/// Formats a timestamp as `YYYY-MM-DD hh:mm:ss` UTC.
pub fn format_timestamp(time: Timestamp) -> String {
    let secs = time.as_unix_secs();
    let days = secs.div_euclid(86_400);
    let of_day = secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month,
        day,
        of_day / 3600,
        (of_day % 3600) / 60,
        of_day % 60
    )
}

/// Proleptic Gregorian date for a count of days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        let t = Timestamp::from_unix_secs(0).unwrap();
        assert_eq!(format_timestamp(t), "1970-01-01 00:00:00");
        let t = Timestamp::from_unix_secs(951_782_400 + 3_723).unwrap();
        assert_eq!(format_timestamp(t), "2000-02-29 01:02:03");
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize_bytes(10), "10 B");
        assert_eq!(humanize_bytes(2048), "2.0 KiB");
    }
}
