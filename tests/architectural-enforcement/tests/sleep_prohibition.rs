//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in `pushstream-core` MUST NOT sleep to wait for
//! events. Relays wait on `Notify`, orchestrators wait on their handlers.
//!
//! **Exceptions**: the heartbeat loop, whose whole job is a timed wait, and
//! test code.

use architectural_enforcement::{code_part, core_src_dir, production_sources};

/// Files allowed to call `tokio::time::sleep`
const TIMER_ALLOWED: &[&str] = &["streaming/heartbeat.rs"];

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let root = core_src_dir();
    let mut violations = Vec::new();

    for file in production_sources(&root) {
        let relative = file.relative_path(&root);
        let timer_allowed = TIMER_ALLOWED.contains(&relative.as_str());

        for (idx, line) in file.lines.iter().enumerate() {
            let code = code_part(line);

            if code.contains("thread::sleep") {
                violations.push(format!(
                    "{}:{} - Thread sleep: {}",
                    relative,
                    idx + 1,
                    line.trim()
                ));
                continue;
            }

            if (code.contains("::sleep(") || code.contains("sleep_until(")) && !timer_allowed {
                violations.push(format!(
                    "{}:{} - Timer sleep outside the heartbeat: {}",
                    relative,
                    idx + 1,
                    line.trim()
                ));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }
        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - The heartbeat interval (streaming/heartbeat.rs)");
        eprintln!("  - Test code");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops (wait on Notify or a channel)");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

/// The heartbeat must keep its timed wait cancellable
#[test]
fn test_heartbeat_sleep_is_raced_against_cancellation() {
    let root = core_src_dir();
    let heartbeat = production_sources(&root)
        .into_iter()
        .find(|f| f.relative_path(&root) == "streaming/heartbeat.rs")
        .expect("heartbeat module present");

    let body = heartbeat.lines.join("\n");
    assert!(body.contains("tokio::select!") || body.contains("select!"));
    assert!(body.contains(".cancelled()"));
}
