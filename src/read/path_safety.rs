//! Turning item paths into destination paths, and vetting link targets.

use std::path::{Path, PathBuf};

use crate::archive_path::{ItemPath, sanitize_segment};
use crate::item::{LinkInfo, is_absolute_target};
use crate::{Error, Result};

use super::{LinkPolicy, PathMode};

/// Returns true for a leading `C:` style drive segment.
fn is_drive(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Maps an item path to a destination path relative to the root.
///
/// Returns `None` when the mode produces nothing to write: a directory
/// under [`PathMode::NoPath`], the prefix folder itself, or an item outside
/// the prefix under [`PathMode::Current`].
pub(crate) fn resolve_item_path(
    path: &ItemPath,
    is_directory: bool,
    mode: PathMode,
    strip_prefix: &[String],
) -> Option<PathBuf> {
    let mut segments: Vec<&str> = path.segments().iter().map(String::as_str).collect();

    if !strip_prefix.is_empty() {
        if path.starts_with(strip_prefix) {
            segments.drain(..strip_prefix.len());
            if segments.is_empty() {
                return None;
            }
        } else if mode == PathMode::Current {
            return None;
        }
    }

    match mode {
        PathMode::NoPath => {
            if is_directory {
                return None;
            }
            let name = segments.last()?;
            segments = vec![name];
        }
        PathMode::Full | PathMode::Current => {
            if segments.first().is_some_and(|s| is_drive(s)) {
                segments.remove(0);
            }
        }
        PathMode::Absolute => {}
    }

    if segments.is_empty() {
        return None;
    }
    Some(segments.into_iter().map(sanitize_segment).collect())
}

/// Decides what a symbolic link written at `dest` should point to.
///
/// `dest` is the link's path relative to the destination root, after path
/// mode and prefix stripping; depth is measured from there, not from the
/// archive path. Relative targets are walked component by component from
/// the link's directory and must never climb above the root. Absolute
/// targets are re-anchored at the root, so `/etc/passwd` becomes a relative
/// path to `<root>/etc/passwd`. Under [`LinkPolicy::Allow`] the stored
/// target is returned unchanged.
///
/// # Errors
///
/// [`Error::DangerousLink`] if the target escapes the root.
pub(crate) fn link_target(
    item_index: usize,
    item_path: &ItemPath,
    dest: &Path,
    link: &LinkInfo,
    policy: LinkPolicy,
) -> Result<String> {
    if policy == LinkPolicy::Allow {
        return Ok(link.target.clone());
    }
    let dangerous = || Error::DangerousLink {
        item_index,
        path: item_path.to_slash_string(),
        target: link.target.clone(),
    };

    let target = link.target.replace('\\', "/");

    if !link.is_relative || is_absolute_target(&target) {
        let mut rest: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
        if rest.first().is_some_and(|s| is_drive(s)) {
            rest.remove(0);
        }
        let mut normal = Vec::new();
        for segment in rest {
            match segment {
                "." => {}
                ".." => {
                    normal.pop().ok_or_else(dangerous)?;
                }
                other => normal.push(other),
            }
        }
        let mut out = vec![".."; link_depth(dest)];
        out.extend(normal);
        return Ok(if out.is_empty() {
            ".".to_string()
        } else {
            out.join("/")
        });
    }

    if !target_stays_inside(dest, &target) {
        return Err(dangerous());
    }
    Ok(target)
}

/// Number of directories between the root and the link at `dest`.
fn link_depth(dest: &Path) -> usize {
    dest.components().count().saturating_sub(1)
}

/// Whether a relative `target`, read from the directory holding the link at
/// `dest`, stays below the root `dest` is relative to.
pub(crate) fn target_stays_inside(dest: &Path, target: &str) -> bool {
    let target = target.replace('\\', "/");
    if is_absolute_target(&target) {
        return false;
    }
    let mut depth = link_depth(dest);
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => depth += 1,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn resolve(path: &str, dir: bool, mode: PathMode, prefix: &[&str]) -> Option<PathBuf> {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        resolve_item_path(&ItemPath::from_slash_str(path), dir, mode, &prefix)
    }

    #[test]
    fn test_path_modes() {
        assert_eq!(
            resolve("a/b/c.txt", false, PathMode::Full, &[]),
            Some(PathBuf::from("a/b/c.txt"))
        );
        assert_eq!(
            resolve("a/b/c.txt", false, PathMode::NoPath, &[]),
            Some(PathBuf::from("c.txt"))
        );
        assert_eq!(resolve("a/b", true, PathMode::NoPath, &[]), None);
        assert_eq!(
            resolve("C:/w/x", false, PathMode::Full, &[]),
            Some(PathBuf::from("w/x"))
        );
        assert_eq!(
            resolve("C:/w/x", false, PathMode::Absolute, &[]),
            Some(PathBuf::from("C_/w/x"))
        );
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(
            resolve("root/sub/f", false, PathMode::Current, &["root"]),
            Some(PathBuf::from("sub/f"))
        );
        assert_eq!(resolve("root", true, PathMode::Current, &["root"]), None);
        assert_eq!(resolve("other/f", false, PathMode::Current, &["root"]), None);
        assert_eq!(
            resolve("other/f", false, PathMode::Full, &["root"]),
            Some(PathBuf::from("other/f"))
        );
    }

    #[test]
    fn test_sanitised_segments() {
        let p = resolve("../x:y/..", false, PathMode::Full, &[]).unwrap();
        assert!(p.components().all(|c| matches!(c, std::path::Component::Normal(_))));
        assert_eq!(p, Path::new("__/x_y/__"));
    }

    fn target(path: &str, link: &LinkInfo, policy: LinkPolicy) -> Result<String> {
        let item = ItemPath::from_slash_str(path);
        link_target(5, &item, Path::new(path), link, policy)
    }

    #[test]
    fn test_relative_links() {
        let ok = LinkInfo::symlink("../c/target");
        assert_eq!(
            target("a/b/link", &ok, LinkPolicy::ValidateTargets).unwrap(),
            "../c/target"
        );
        let escape = LinkInfo::symlink("../../../etc/passwd");
        let err = target("a/b/link", &escape, LinkPolicy::ValidateTargets).unwrap_err();
        assert!(matches!(err, Error::DangerousLink { item_index: 5, .. }));
        assert_eq!(
            target("a/b/link", &escape, LinkPolicy::Allow).unwrap(),
            "../../../etc/passwd"
        );
    }

    #[test]
    fn test_depth_comes_from_destination() {
        let item = ItemPath::from_slash_str("a/b/link");
        let up_two = LinkInfo::symlink("../../outside");
        let validate = |dest: &str, link: &LinkInfo| {
            link_target(0, &item, Path::new(dest), link, LinkPolicy::ValidateTargets)
        };
        assert!(validate("a/b/link", &up_two).is_ok());
        let err = validate("link", &up_two).unwrap_err();
        assert!(matches!(err, Error::DangerousLink { .. }));

        let abs = LinkInfo::symlink("/etc/passwd");
        assert_eq!(validate("link", &abs).unwrap(), "etc/passwd");
    }

    #[test]
    fn test_target_stays_inside() {
        assert!(target_stays_inside(Path::new("a/link"), "../x"));
        assert!(!target_stays_inside(Path::new("a/link"), "../../x"));
        assert!(target_stays_inside(Path::new("link"), "a/../b"));
        assert!(!target_stays_inside(Path::new("link"), "a/../../b"));
        assert!(!target_stays_inside(Path::new("a/link"), "..\\..\\x"));
        assert!(!target_stays_inside(Path::new("a/b/link"), "/etc"));
    }

    #[test]
    fn test_absolute_targets_reanchored() {
        let abs = LinkInfo::symlink("/etc/passwd");
        assert_eq!(
            target("a/link", &abs, LinkPolicy::ValidateTargets).unwrap(),
            "../etc/passwd"
        );
        let junction = LinkInfo::junction("C:\\Users\\x");
        assert_eq!(
            target("j", &junction, LinkPolicy::ValidateTargets).unwrap(),
            "Users/x"
        );
        let climbing = LinkInfo::symlink("/a/../../b");
        assert!(target("a/link", &climbing, LinkPolicy::ValidateTargets).is_err());
    }
}
