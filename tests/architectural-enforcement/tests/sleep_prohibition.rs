//! Integration Test: Sleep Prohibition
//!
//! **Policy**: The library MUST NOT sleep. Retry attempts wait on pipe
//! capacity or peer arrival, bounded by the per-attempt tick.
//! **Required**: `tokio::sync::Notify`, channel `reserve`/`send`, and
//! `tokio::time::timeout` around them.
//!
//! The CLI's `--startup-delay-ms` runs before any send and is exempt, as is
//! the TCP accept loop's backoff after accept errors.

use std::path::Path;

use architectural_enforcement::find_violations;

/// (file suffix, code fragment) pairs allowed to sleep
const ALLOWED: &[(&str, &str)] = &[("socket/tcp.rs", "sleep(backoff)")];

fn is_allowed(file: &Path, code: &str) -> bool {
    ALLOWED
        .iter()
        .any(|(suffix, fragment)| file.ends_with(suffix) && code.contains(fragment))
}

/// Test that courier-core production code never sleeps
#[test]
fn test_no_sleep_in_library_code() {
    let violations = find_violations(&["courier/core/src"], |file, code| {
        (code.contains("thread::sleep")
            || code.contains("time::sleep")
            || code.contains("sleep_until"))
            && !is_allowed(file, code)
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: sleep() calls found in courier-core!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ ALTERNATIVES:");
        eprintln!("  - Wait for a peer: PeerSet::wait_for_peer (Notify)");
        eprintln!("  - Wait for room: mpsc::Sender::reserve_many under tokio::time::timeout");

        panic!(
            "\nFound {} sleep call(s) in library code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Test that the exemption only covers the accept backoff
#[test]
fn test_allowlist_is_narrow() {
    assert!(is_allowed(
        Path::new("courier/core/src/socket/tcp.rs"),
        "tokio::time::sleep(backoff).await;"
    ));
    assert!(!is_allowed(
        Path::new("courier/core/src/socket/queue.rs"),
        "tokio::time::sleep(backoff).await;"
    ));
    assert!(!is_allowed(
        Path::new("courier/core/src/socket/tcp.rs"),
        "tokio::time::sleep(Duration::from_millis(1)).await;"
    ));
}

/// Test that integration tests poll instead of sleeping
#[test]
fn test_no_sleep_in_integration_tests() {
    let violations = find_violations(&["courier/core/tests"], |_, code| {
        code.contains("thread::sleep") || code.contains("time::sleep")
    });

    assert!(
        violations.is_empty(),
        "Integration tests must wait on receivers, not sleep:\n{}",
        violations.join("\n")
    );
}
