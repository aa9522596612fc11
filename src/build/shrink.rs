//! Shrink pass: delete documentation, headers, caches and other files the
//! thin client never needs.
//!
//! The exclude set is the profile's literal paths plus every entry below a
//! rule's directory whose file name matches the rule's glob. Nothing is
//! collected through a symlinked directory, so the pass cannot reach files
//! outside the target.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::context::BuildContext;
use crate::profile::{is_confined, ShrinkSpec};

/// Resolve the exclude set to absolute paths under `root`.
///
/// Paths nested inside another excluded path are dropped, since removing
/// the parent removes them too.
pub fn collect_excludes(root: &Path, spec: &ShrinkSpec) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();

    for rel in &spec.paths {
        if !is_confined(rel) {
            anyhow::bail!("Refusing to remove '{}': not inside the target", rel);
        }
        if let Some(link) = symlink_on_path(root, rel, false) {
            println!("  [SKIP] {}: {} is a symlink", rel, link.display());
            continue;
        }
        let path = root.join(rel);
        if path.symlink_metadata().is_ok() {
            found.insert(path);
        }
    }

    for rule in &spec.rules {
        if !is_confined(&rule.dir) {
            anyhow::bail!("Refusing to walk '{}': not inside the target", rule.dir);
        }
        if let Some(link) = symlink_on_path(root, &rule.dir, true) {
            println!("  [SKIP] {}/{}: {} is a symlink", rule.dir, rule.pattern, link.display());
            continue;
        }
        let matcher = compile(&rule.pattern)?;
        let base = root.join(&rule.dir);
        if !base.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&base).min_depth(1).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to walk {}", base.display()))?;
            if matcher.is_match(entry.file_name()) {
                found.insert(entry.into_path());
            }
        }
    }

    let mut excludes: Vec<PathBuf> = Vec::with_capacity(found.len());
    for path in found {
        // BTreeSet order puts a parent right before its children.
        if excludes.last().is_some_and(|parent| path.starts_with(parent)) {
            continue;
        }
        excludes.push(path);
    }
    Ok(excludes)
}

/// First symlink met while descending from `root` to `root/rel`.
///
/// The last component only counts when `include_last` is set: a literal
/// exclude may itself be a symlink (it is unlinked, not followed), a rule
/// directory may not (walking it would follow the link).
fn symlink_on_path(root: &Path, rel: &str, include_last: bool) -> Option<PathBuf> {
    let parts: Vec<Component> = Path::new(rel)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    let checked = if include_last {
        parts.len()
    } else {
        parts.len().saturating_sub(1)
    };

    let mut path = root.to_path_buf();
    for part in &parts[..checked] {
        path.push(part);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => return Some(path),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .with_context(|| format!("Invalid shrink pattern '{}'", pattern))?
        .compile_matcher())
}

/// Remove a file, symlink or directory tree. Missing paths are a no-op.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            Err(e).with_context(|| format!("Failed to remove {}", path.display()))
        }
        _ => Ok(()),
    }
}

/// Delete everything in the profile's exclude set. Returns how many
/// top-level entries were removed.
pub fn shrink(ctx: &BuildContext) -> Result<usize> {
    println!("Shrinking image...");
    let excludes = collect_excludes(&ctx.target, &ctx.profile.shrink)?;
    for path in &excludes {
        ctx.checkpoint()?;
        remove_path(path)?;
    }
    println!("  Removed {} entries", excludes.len());
    Ok(excludes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::GlobRule;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn spec(paths: &[&str], rules: &[(&str, &str)]) -> ShrinkSpec {
        ShrinkSpec {
            paths: paths.iter().map(|s| s.to_string()).collect(),
            rules: rules.iter().map(|(d, p)| GlobRule::new(d, p)).collect(),
        }
    }

    #[test]
    fn literal_and_glob_matches_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "usr/share/doc/bash/README");
        touch(root, "usr/lib/libfoo.a");
        touch(root, "usr/lib/libfoo.so.1");
        touch(root, "usr/lib/nested/libbar.la");

        let excludes = collect_excludes(
            root,
            &spec(&["usr/share/doc", "usr/share/man"], &[("usr/lib", "*.a"), ("usr/lib", "*.la")]),
        )
        .unwrap();

        assert_eq!(
            excludes,
            vec![
                root.join("usr/lib/libfoo.a"),
                root.join("usr/lib/nested/libbar.la"),
                root.join("usr/share/doc"),
            ]
        );
    }

    #[test]
    fn nested_matches_collapse_into_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "usr/share/locale/de/LC_MESSAGES/bash.mo");

        let excludes = collect_excludes(
            root,
            &spec(&["usr/share/locale"], &[("usr/share/locale", "*.mo")]),
        )
        .unwrap();
        assert_eq!(excludes, vec![root.join("usr/share/locale")]);
    }

    #[test]
    fn missing_paths_and_rule_dirs_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let excludes = collect_excludes(
            dir.path(),
            &spec(&["usr/include"], &[("usr/lib", "*.a")]),
        )
        .unwrap();
        assert!(excludes.is_empty());

        remove_path(&dir.path().join("usr/include")).unwrap();
    }

    #[test]
    fn escaping_paths_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_excludes(dir.path(), &spec(&["../outside"], &[])).is_err());
        assert!(collect_excludes(dir.path(), &spec(&[], &[("/usr", "*")])).is_err());
    }

    #[test]
    fn symlinks_are_removed_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let outside = dir.path().join("keep");
        touch(&outside, "important");
        fs::create_dir_all(root.join("usr/share")).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("usr/share/doc")).unwrap();

        let excludes = collect_excludes(&root, &spec(&["usr/share/doc"], &[])).unwrap();
        for path in &excludes {
            remove_path(path).unwrap();
        }

        assert!(root.join("usr/share/doc").symlink_metadata().is_err());
        assert!(outside.join("important").exists());
    }

    #[test]
    fn symlinked_rule_dir_is_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let host_lib = dir.path().join("host_lib");
        touch(&host_lib, "libhost.a");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(&host_lib, root.join("lib")).unwrap();

        let excludes = collect_excludes(&root, &spec(&[], &[("lib", "*.a")])).unwrap();
        assert!(excludes.is_empty());
        assert!(host_lib.join("libhost.a").exists());
    }

    #[test]
    fn literal_below_symlinked_parent_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let host_usr = dir.path().join("host_usr");
        touch(&host_usr, "include/stdio.h");
        touch(&host_usr, "lib/libhost.a");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink("../host_usr", root.join("usr")).unwrap();

        let excludes = collect_excludes(
            &root,
            &spec(&["usr/include"], &[("usr/lib", "*.a")]),
        )
        .unwrap();
        assert!(excludes.is_empty());
        assert!(host_usr.join("include/stdio.h").exists());
        assert!(host_usr.join("lib/libhost.a").exists());
    }

    #[test]
    fn invalid_glob_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("usr/lib")).unwrap();
        let err = collect_excludes(dir.path(), &spec(&[], &[("usr/lib", "[")])).unwrap_err();
        assert!(err.to_string().contains("Invalid shrink pattern"));
    }
}
