use crate::config::Config;
use crate::discover;
use crate::task::Task;
use crate::util::sanitize_identifier;
use anyhow::{Result, bail};
use std::ops::Range;
use std::path::Path;
use tracing::{info, warn};

/// Build the full set of tasks for a fresh batch: per glob pattern, one
/// self-comparison job over the current groups plus current-vs-previous jobs
/// for every previous group, chunked to the service's file-count ceiling.
pub fn build_tasks(cfg: &Config, output_dir: &Path, files_dir: &Path) -> Result<Vec<Task>> {
    if cfg.groups.current.is_empty() {
        bail!("groups.current must name at least one group");
    }

    let base_files = {
        let base_dir = output_dir.join("base");
        let mut found = Vec::new();
        for pattern in &cfg.base.files {
            found.extend(discover::collect_files(&base_dir, pattern, "")?);
        }
        // Baseline files only need to be non-empty.
        found.retain(|f| std::fs::metadata(f).map(|m| m.len() > 0).unwrap_or(false));
        found
    };

    let display_prefix = {
        let mut prefix = files_dir.display().to_string();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        prefix
    };

    let lang = &cfg.batch.lang;
    let mut tasks = Vec::new();

    for pattern in &cfg.groups.assignment_files {
        let mut current_files = Vec::new();
        for group in &cfg.groups.current {
            current_files.extend(discover::collect_files(
                &files_dir.join(group),
                pattern,
                &cfg.groups.assignment_path,
            )?);
        }
        let current_files = discover::filter_valid(current_files, lang);
        if current_files.is_empty() {
            warn!("no files matched {pattern} in the current groups; skipping pattern");
            continue;
        }

        let tag = sanitize_identifier(pattern);

        let self_id = format!("{tag}_self");
        tasks.push(Task::new(
            output_dir.join(format!("{self_id}_reports")),
            self_id,
            current_files.clone(),
            base_files.clone(),
            lang.clone(),
            display_prefix.clone(),
        )?);

        if cfg.groups.previous.is_empty() {
            continue;
        }
        let Some(remaining) = cfg
            .batch
            .file_limit
            .checked_sub(current_files.len())
            .filter(|r| *r > 0)
        else {
            bail!(
                "current groups matched {} files for {pattern}, leaving no room under file_limit {}",
                current_files.len(),
                cfg.batch.file_limit
            );
        };

        for group in &cfg.groups.previous {
            let previous_files = discover::filter_valid(
                discover::collect_files(
                    &files_dir.join(group),
                    pattern,
                    &cfg.groups.assignment_path,
                )?,
                lang,
            );
            if previous_files.is_empty() {
                warn!("no files matched {pattern} in previous group {group}");
                continue;
            }

            let chunks = chunk_slices(previous_files.len(), remaining, cfg.batch.chunk_floor);
            info!(
                "{pattern} vs {group}: {} files in {} chunk(s)",
                previous_files.len(),
                chunks.len()
            );
            for (i, range) in chunks.into_iter().enumerate() {
                let id = sanitize_identifier(&format!("{tag}_{group}_part{i}"));
                let mut files = current_files.clone();
                files.extend_from_slice(&previous_files[range]);
                tasks.push(Task::new(
                    output_dir.join(format!("{id}_reports")),
                    id,
                    files,
                    base_files.clone(),
                    lang.clone(),
                    display_prefix.clone(),
                )?);
            }
        }
    }

    Ok(tasks)
}

/// Split `total` items into contiguous chunks of at most `capacity`, aiming
/// for even sizes no smaller than `floor` where the arithmetic allows. The
/// last chunk absorbs the remainder, so the chunks always partition the
/// input exactly.
pub fn chunk_slices(total: usize, capacity: usize, floor: usize) -> Vec<Range<usize>> {
    if total == 0 || capacity == 0 {
        return Vec::new();
    }
    let count = total.div_ceil(capacity);
    let even = total.div_ceil(count);
    let size = even.max(floor).min(capacity);

    let mut out = Vec::with_capacity(count);
    let mut start = 0;
    while start < total {
        let end = (start + size).min(total);
        out.push(start..end);
        start = end;
    }
    out
}
