//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in `pushstream-core` MUST NOT use blocking I/O.
//! Everything a job does after dispatch runs on the tokio runtime next to the
//! heartbeat; a blocking call there stalls every stream on that worker.
//!
//! **Required**: `tokio::fs`, `tokio::net`, async `reqwest`.
//! **Acceptable**: blocking calls in plain `fn`s that run before the runtime
//! starts (config loading), and test code.

use architectural_enforcement::{code_part, core_src_dir, in_async_fn, production_sources};

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
];

/// Test that async code paths do not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let root = core_src_dir();
    let mut violations = Vec::new();

    for file in production_sources(&root) {
        for (idx, line) in file.lines.iter().enumerate() {
            let code = code_part(line);
            if !in_async_fn(&file.lines, idx) {
                continue;
            }
            for (pattern, label) in FORBIDDEN {
                if code.contains(pattern) {
                    violations.push(format!(
                        "{}:{} - {}: {}",
                        file.relative_path(&root),
                        idx + 1,
                        label,
                        line.trim()
                    ));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O calls found in async code:\n");
        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }
        eprintln!("\n✅ Use tokio::fs / tokio::net / async reqwest instead.");

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.",
            violations.len()
        );
    }
}

/// The blocking HTTP client is never acceptable, sync or async
#[test]
fn test_no_blocking_http_client() {
    let root = core_src_dir();
    let offenders: Vec<String> = production_sources(&root)
        .iter()
        .flat_map(|file| {
            file.lines
                .iter()
                .enumerate()
                .filter(|(_, line)| code_part(line).contains("reqwest::blocking"))
                .map(|(idx, _)| format!("{}:{}", file.relative_path(&root), idx + 1))
                .collect::<Vec<_>>()
        })
        .collect();

    assert!(
        offenders.is_empty(),
        "reqwest::blocking used at: {:?}",
        offenders
    );
}
