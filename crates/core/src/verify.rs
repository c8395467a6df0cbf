//! Verify Gate  — Build, Structure, Mobile, and Security checks
//! run once every tool-calling step yields no further tool calls.
//!
//! Structure/Mobile/Security reuse the pure functions in
//! `pf_tools::core::checks` — the same functions `validate_html` runs
//! report-only, run here as the gate. Build has no teacher analogue: the
//! teacher ships a React/Vite frontend with a real bundler to invoke,
//! while PageForge emits static HTML directly, so there is no compile
//! step. The Build check stands in for "the equivalent bundler
//! invocation" by verifying every tracked page actually landed on disk
//! in a parseable shape — the one thing a bundler failure would also
//! have caught (a missing or truncated artifact).

use std::path::Path;

use pf_domain::config::VerifyConfig;
use pf_domain::entities::{EventType, Page};
use pf_domain::error::Result;
use pf_domain::trace::TraceEvent;
use pf_store::EventStore;
use pf_tools::core::checks::{mobile_check, security_check, structure_check};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub details: String,
    /// Build failures are unconditionally fatal (Open Questions); the
    /// other three get exactly one retry before the run suspends.
    pub fatal: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub passed: bool,
    pub attempt: u32,
    pub checks: Vec<CheckOutcome>,
}

fn page_html_path(session_output_dir: &Path, slug: &str) -> std::path::PathBuf {
    session_output_dir.join("pages").join(format!("{slug}.html"))
}

/// §4.7 "Build" check: every tracked page's mirrored HTML file exists,
/// is non-empty, and starts with a doctype. Unconditionally fatal.
fn build_check(session_output_dir: &Path, pages: &[Page]) -> CheckOutcome {
    let mut issues = Vec::new();
    for page in pages {
        let path = page_html_path(session_output_dir, &page.slug);
        match std::fs::read_to_string(&path) {
            Ok(html) if html.trim().is_empty() => {
                issues.push(format!("{}: mirrored file is empty", page.slug));
            }
            Ok(html) if !html.trim_start().to_ascii_lowercase().starts_with("<!doctype html") => {
                issues.push(format!("{}: missing <!DOCTYPE html>", page.slug));
            }
            Ok(_) => {}
            Err(e) => issues.push(format!("{}: {e}", page.slug)),
        }
    }
    if issues.is_empty() {
        CheckOutcome { name: "build".into(), passed: true, details: format!("{} page(s) built", pages.len()), fatal: true }
    } else {
        CheckOutcome { name: "build".into(), passed: false, details: issues.join("; "), fatal: true }
    }
}

fn aggregate_recoverable<F>(name: &str, pages: &[Page], session_output_dir: &Path, check: F) -> CheckOutcome
where
    F: Fn(&str) -> pf_tools::core::checks::CheckResult,
{
    let mut issues = Vec::new();
    for page in pages {
        let path = page_html_path(session_output_dir, &page.slug);
        let html = std::fs::read_to_string(&path).unwrap_or_default();
        let result = check(&html);
        if !result.passed {
            issues.push(format!("{}: {}", page.slug, result.details));
        }
    }
    if issues.is_empty() {
        CheckOutcome { name: name.into(), passed: true, details: format!("{} page(s) passed", pages.len()), fatal: false }
    } else {
        CheckOutcome { name: name.into(), passed: false, details: issues.join("; "), fatal: false }
    }
}

/// §4.7 "Structure": same per-page `#app` check as `aggregate_recoverable`
/// would run, plus the session-level "at least an `index` page exists"
/// clause — evaluated once against the page list, not folded into the
/// per-page check, since an empty `pages` list otherwise has nothing to
/// iterate and would vacuously pass. A run that calls zero generation
/// tools must fail Structure, not sail through with no artifacts.
fn structure_overall(pages: &[Page], session_output_dir: &Path) -> CheckOutcome {
    let mut issues = Vec::new();
    if !pages.iter().any(|p| p.slug == "index") {
        issues.push("no page with slug \"index\" exists".to_string());
    }
    for page in pages {
        let path = page_html_path(session_output_dir, &page.slug);
        let html = std::fs::read_to_string(&path).unwrap_or_default();
        let result = structure_check(&html);
        if !result.passed {
            issues.push(format!("{}: {}", page.slug, result.details));
        }
    }
    if issues.is_empty() {
        CheckOutcome { name: "structure".into(), passed: true, details: format!("{} page(s) passed", pages.len()), fatal: false }
    } else {
        CheckOutcome { name: "structure".into(), passed: false, details: issues.join("; "), fatal: false }
    }
}

/// Run every §4.7 check against the session's currently mirrored pages
/// and emit `VerifyStart`/`VerifyPass`/`VerifyFail` events plus
/// `TraceEvent::VerifyCheckRan` for each. Pure reporting — the caller
/// (the agentic loop) decides whether a failure is fatal or retryable
/// from `CheckOutcome::fatal`.
pub fn run_checks(
    events: &dyn EventStore,
    session_id: &str,
    run_id: Uuid,
    session_output_dir: &Path,
    pages: &[Page],
    config: &VerifyConfig,
    attempt: u32,
) -> Result<VerifyReport> {
    if !config.enabled {
        return Ok(VerifyReport { passed: true, attempt, checks: Vec::new() });
    }

    let _ = events.append(session_id, EventType::VerifyStart, Some(run_id), "verify", serde_json::json!({"attempt": attempt}));

    let mut checks = vec![build_check(session_output_dir, pages)];
    // Structure/mobile/security only meaningfully run once every page's
    // html actually landed on disk; a build failure still reports them
    // against whatever's there rather than skipping, so the caller sees
    // every signal available on this attempt.
    checks.push(structure_overall(pages, session_output_dir));
    checks.push(aggregate_recoverable("mobile", pages, session_output_dir, |html| mobile_check(html, config)));
    checks.push(aggregate_recoverable("security", pages, session_output_dir, security_check));

    for check in &checks {
        let event_type = if check.passed { EventType::VerifyPass } else { EventType::VerifyFail };
        let _ = events.append(
            session_id,
            event_type,
            Some(run_id),
            "verify",
            serde_json::json!({"check": check.name, "attempt": attempt, "details": check.details}),
        );
        TraceEvent::VerifyCheckRan { run_id: run_id.to_string(), check: check.name.clone(), passed: check.passed, attempt }.emit();
    }

    let passed = checks.iter().all(|c| c.passed);
    Ok(VerifyReport { passed, attempt, checks })
}
