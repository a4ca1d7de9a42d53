//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code MUST NOT call `unwrap()` or `expect()`.
//! **Required**: Propagate with `?`, map into the crate's error types, or fall
//! back with `unwrap_or` / `unwrap_or_else`.

use architectural_enforcement::{find_violations, PRODUCTION_DIRS};

/// Test that production code never unwraps
#[test]
fn test_no_unwrap_in_production_code() {
    let violations = find_violations(&PRODUCTION_DIRS, |_, code| {
        code.contains(".unwrap()") || code.contains(".expect(")
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: unwrap()/expect() found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ REQUIRED:");
        eprintln!("  - `?` with a `thiserror` variant in courier-core");
        eprintln!("  - `.context(..)?` with anyhow in the CLI");

        panic!(
            "\nFound {} unwrap/expect call(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
