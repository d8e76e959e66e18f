//! Rules file watcher
//!
//! Watches the directories holding the rules files and signals the control
//! loop when one of the files changes. Bursts of events collapse into a
//! single pending reload.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Keeps the underlying watcher alive; dropping it stops watching
pub struct RulesWatcher {
    _watcher: RecommendedWatcher,
}

/// Start watching `files`; a unit is sent on the returned receiver per change
pub fn watch_rules(files: &[PathBuf]) -> Result<(RulesWatcher, mpsc::Receiver<()>)> {
    let targets: BTreeSet<PathBuf> = files.iter().map(|f| absolute(f)).collect();
    let dirs: BTreeSet<PathBuf> = targets
        .iter()
        .filter_map(|f| f.parent().map(Path::to_path_buf))
        .collect();

    // Capacity 1: a reload already queued covers any later change
    let (tx, rx) = mpsc::channel(1);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if is_relevant(&event, &targets) {
                debug!(paths = ?event.paths, "rules file changed");
                let _ = tx.try_send(());
            }
        }
        Err(e) => warn!(error = %e, "filesystem watcher error"),
    })
    .context("failed to create filesystem watcher")?;

    for dir in &dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("cannot watch {}", dir.display()))?;
        info!(path = %dir.display(), "Watching rules directory for changes");
    }

    Ok((RulesWatcher { _watcher: watcher }, rx))
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn is_relevant(event: &Event, targets: &BTreeSet<PathBuf>) -> bool {
    let kind_matters = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matters && event.paths.iter().any(|p| targets.contains(&absolute(p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_only_watched_files_are_relevant() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.yaml");
        let other = dir.path().join("notes.txt");
        std::fs::write(&rules, "[]").unwrap();
        std::fs::write(&other, "").unwrap();
        let targets: BTreeSet<PathBuf> = [absolute(&rules)].into();

        let modified = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(rules.clone());
        assert!(is_relevant(&modified, &targets));

        let unrelated = Event::new(EventKind::Create(CreateKind::File)).add_path(other);
        assert!(!is_relevant(&unrelated, &targets));

        let read = Event::new(EventKind::Access(AccessKind::Read)).add_path(rules);
        assert!(!is_relevant(&read, &targets));
    }
}
