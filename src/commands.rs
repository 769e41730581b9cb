//! CLI command implementations

use deadwood_core::{Config, MemoryRuntime, Tracker, UnloadReport};
use deadwood_watcher::{Heartbeat, WatcherError};
use globset::GlobSet;
use ignore::WalkBuilder;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A source file and the symbol the dry run pretends it defines.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub symbol: String,
}

pub fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<Config> {
    let config = match explicit {
        Some(path) => Config::load(path)?.or_root(root),
        None => Config::discover(root)?,
    };
    tracing::debug!("Watch roots: {:?}", config.watch_roots);
    Ok(config)
}

pub fn scan(config: &Config, json: bool) -> anyhow::Result<()> {
    let files = collect_files(config)?;

    if json {
        let entries: Vec<_> = files
            .iter()
            .map(|file| serde_json::json!({ "path": file.path, "symbol": file.symbol }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for file in &files {
            println!("{:<40} {}", file.symbol, file.path.display());
        }
    }

    tracing::info!("Found {} tracked files", files.len());
    Ok(())
}

pub async fn watch(config: Config, interval_ms: u64) -> anyhow::Result<()> {
    let runtime = MemoryRuntime::shared();
    let tracker = Tracker::with_runtime(Arc::clone(&runtime));

    let files = collect_files(&config)?;
    let loaded = define_untracked(&runtime, &tracker, &files)?;
    tracing::info!("Tracking {} files ({:?} mode)", loaded, config.watch_mode());

    let mut heartbeat = Heartbeat::new(tracker.clone(), config.clone()).on_change(print_report);
    let roots = config.watch_roots.clone();
    heartbeat.start_async_watch(&roots)?;

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(10)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }

        match heartbeat.heartbeat_check() {
            Ok(false) => {}
            Ok(true) => {
                // the host would re-require on next use; the dry run does it right away
                let files = collect_files(&config)?;
                let reloaded = define_untracked(&runtime, &tracker, &files)?;
                tracing::info!("Redefined {} files", reloaded);
            }
            Err(WatcherError::BackgroundRemoval(e)) => {
                tracing::error!("Background unload failed: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    heartbeat.stop_async_watch();
    Ok(())
}

fn print_report(report: &UnloadReport) {
    match serde_json::to_string(report) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Failed to serialize unload report: {}", e),
    }
}

/// Define the symbol of every file the tracker does not know about.
fn define_untracked(
    runtime: &Mutex<MemoryRuntime>,
    tracker: &Tracker,
    files: &[SourceFile],
) -> anyhow::Result<usize> {
    let mut defined = 0;
    for file in files {
        if tracker.is_tracked(&file.symbol) {
            continue;
        }
        runtime.lock().define_class(&file.symbol, None)?;
        tracker.on_file_loaded(&file.path, [file.symbol.as_str()]);
        defined += 1;
    }
    Ok(defined)
}

/// Walk every watch root, honoring `.gitignore`, `ignore_dirs` and `include`.
pub fn collect_files(config: &Config) -> anyhow::Result<Vec<SourceFile>> {
    let include = config.include_set()?;
    let mut files = Vec::new();

    for root in &config.watch_roots {
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .ignore(true)
            .build();

        for dent in walker {
            let dent = match dent {
                Ok(dent) => dent,
                Err(e) => {
                    tracing::warn!("Walker error: {}", e);
                    continue;
                }
            };
            let path = dent.path();
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            if !is_selected(config, include.as_ref(), relative) {
                continue;
            }
            match symbol_for(relative) {
                Some(symbol) => files.push(SourceFile {
                    path: path.to_path_buf(),
                    symbol,
                }),
                None => tracing::debug!("No symbol for {}", path.display()),
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn is_selected(config: &Config, include: Option<&GlobSet>, relative: &Path) -> bool {
    if config.is_ignored(relative) {
        return false;
    }
    include.map_or(true, |set| set.is_match(relative))
}

/// `models/user_profile.rb` -> `Models::UserProfile`.
pub fn symbol_for(relative: &Path) -> Option<String> {
    let stem = relative.with_extension("");
    let mut segments = Vec::new();
    for component in stem.components() {
        let segment = camelize(component.as_os_str().to_str()?)?;
        segments.push(segment);
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("::"))
}

fn camelize(segment: &str) -> Option<String> {
    let mut out = String::new();
    for word in segment.split(|c| c == '_' || c == '-') {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    let valid = out.chars().next().map_or(false, char::is_alphabetic)
        && out.chars().all(char::is_alphanumeric);
    valid.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_for_camelizes_path_segments() {
        assert_eq!(
            symbol_for(Path::new("models/user_profile.rb")).as_deref(),
            Some("Models::UserProfile")
        );
        assert_eq!(symbol_for(Path::new("api-v2/token.rb")).as_deref(), Some("ApiV2::Token"));
        assert_eq!(symbol_for(Path::new("1st.rb")), None);
        assert_eq!(symbol_for(Path::new("notes.tar.gz")), None);
    }
}
