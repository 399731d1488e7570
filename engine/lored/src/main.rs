//! lore analysis driver CLI.
//!
//! `lored check` loads a corpus of `.lore` files, runs the full analysis,
//! prints diagnostics, and refreshes the on-disk seed cache so the next
//! invocation warm-starts. `lored fingerprint` prints a single file's
//! declaration-shape fingerprint, which is handy when figuring out why an
//! edit did or did not qualify for the fast path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;

use lore_diagnostic::{Publication, Severity};
use lore_engine::{Engine, EngineConfig, Indexer, LineIndexer, LineResolver, SeedCache};

/// Seed cache location, relative to the corpus root.
const CACHE_FILE: &str = ".lore-cache/seeds.bin";

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call this once at startup. Safe to call multiple times.
/// Enable with `RUST_LOG=lore_engine=debug` or `RUST_LOG=lore_engine=trace`.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "check" => {
            let mut root: Option<&str> = None;
            let mut use_cache = true;
            for arg in args.iter().skip(2) {
                if arg == "--no-cache" {
                    use_cache = false;
                } else if !arg.starts_with('-') && root.is_none() {
                    root = Some(arg.as_str());
                }
            }
            let root = root.unwrap_or(".");
            std::process::exit(run_check(Path::new(root), use_cache));
        }
        "fingerprint" => {
            if args.len() < 3 {
                eprintln!("Usage: lored fingerprint <file.lore>");
                std::process::exit(1);
            }
            std::process::exit(run_fingerprint(Path::new(&args[2])));
        }
        other => {
            eprintln!("error: unknown command `{other}`");
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: lored <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  check [dir] [--no-cache]   Analyze every .lore file under dir (default: .)");
    eprintln!("  fingerprint <file.lore>    Print a file's declaration-shape fingerprint");
}

fn run_check(root: &Path, use_cache: bool) -> i32 {
    let files = match collect_files(root) {
        Ok(files) => files,
        Err(error) => {
            eprintln!("error: cannot read {}: {error}", root.display());
            return 1;
        }
    };
    if files.is_empty() {
        eprintln!("no .lore files under {}", root.display());
        return 0;
    }

    let cache_path = root.join(CACHE_FILE);
    let seeds = if use_cache {
        match SeedCache::load(&cache_path) {
            Ok(seeds) => seeds,
            Err(error) => {
                eprintln!(
                    "warning: ignoring seed cache {}: {error}",
                    cache_path.display()
                );
                SeedCache::new()
            }
        }
    } else {
        SeedCache::new()
    };

    let engine = Engine::new(EngineConfig::default(), LineIndexer, LineResolver);
    let publication = engine.open_corpus(files, &seeds);
    let error_count = print_diagnostics(&engine, &publication);

    if use_cache {
        let mut seeds = SeedCache::new();
        engine.record_seeds(&mut seeds);
        if let Err(error) = seeds.store(&cache_path) {
            eprintln!(
                "warning: could not write seed cache {}: {error}",
                cache_path.display()
            );
        }
    }

    if error_count > 0 {
        eprintln!("{error_count} error(s)");
        1
    } else {
        0
    }
}

fn run_fingerprint(path: &Path) -> i32 {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => {
            eprintln!("error: cannot read {}: {error}", path.display());
            return 1;
        }
    };
    let fingerprint = LineIndexer.fingerprint(&text);
    if fingerprint.is_invalid() {
        println!("{}: INVALID (file does not parse)", path.display());
    } else {
        println!("{}: {:08x}", path.display(), fingerprint.raw());
    }
    0
}

/// All `.lore` files under `root`, sorted by path so file handles (and
/// therefore diagnostics order) are stable across runs.
fn collect_files(root: &Path) -> io::Result<Vec<(PathBuf, Arc<str>)>> {
    let mut paths = Vec::new();
    walk(root, &mut paths)?;
    paths.sort();
    paths
        .into_iter()
        .map(|path| {
            let text = fs::read_to_string(&path)?;
            Ok((path, Arc::from(text)))
        })
        .collect()
}

fn walk(dir: &Path, paths: &mut Vec<PathBuf>) -> io::Result<()> {
    if dir.is_file() {
        paths.push(dir.to_path_buf());
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            // Skip the cache directory and hidden directories in general.
            if path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'))
            {
                continue;
            }
            walk(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "lore") {
            paths.push(path);
        }
    }
    Ok(())
}

/// Print a publication in `path:line: severity[code]: message` form;
/// returns the number of errors.
fn print_diagnostics(
    engine: &Engine<LineIndexer, LineResolver>,
    publication: &Publication,
) -> usize {
    let mut errors = 0;
    engine.with_snapshot(|snapshot| {
        for (file, diagnostics) in &publication.diagnostics {
            let path = snapshot.files.get(*file).path.clone();
            for diagnostic in diagnostics {
                let severity = match diagnostic.severity {
                    Severity::Error => {
                        errors += 1;
                        "error"
                    }
                    Severity::Warning => "warning",
                };
                println!(
                    "{}:{}: {severity}[{}]: {}",
                    path.display(),
                    diagnostic.line,
                    diagnostic.code,
                    diagnostic.message
                );
            }
        }
    });
    errors
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collect_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.lore"), "def beta").unwrap();
        fs::write(dir.path().join("a.lore"), "def alpha").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join(".lore-cache")).unwrap();
        fs::write(dir.path().join(".lore-cache").join("x.lore"), "ignored").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|(path, _)| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.lore", "b.lore"]);
    }

    #[test]
    fn test_check_reports_errors_and_writes_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.lore"), "def alpha\nuse missing").unwrap();

        assert_eq!(run_check(dir.path(), true), 1);
        assert!(dir.path().join(CACHE_FILE).exists());

        // Second run warm-starts from the cache and agrees.
        assert_eq!(run_check(dir.path(), true), 1);

        fs::write(dir.path().join("a.lore"), "def alpha\nuse alpha").unwrap();
        assert_eq!(run_check(dir.path(), false), 0);
    }
}
