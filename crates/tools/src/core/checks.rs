//! Shared structural/mobile HTML checks. Pure functions so both the
//! non-gating `validate_html` tool and the gating Verify Gate (in
//! `pf-core`) run identical logic — `validate_html` reports the same
//! mobile check plus lint-style structural checks, but never blocks a Run.

use pf_domain::config::VerifyConfig;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub passed: bool,
    pub details: String,
}

impl CheckResult {
    fn pass(details: impl Into<String>) -> Self {
        Self { passed: true, details: details.into() }
    }
    fn fail(details: impl Into<String>) -> Self {
        Self { passed: false, details: details.into() }
    }
}

/// Structure check: an `index` page exists (caller-side — this
/// function only checks the per-page `#app` entry node requirement) and
/// the entry node is present in the rendered HTML.
pub fn structure_check(html: &str) -> CheckResult {
    if html.contains(r#"id="app""#) || html.contains(r#"id='app'"#) {
        CheckResult::pass("entry node #app present")
    } else {
        CheckResult::fail("missing #app entry node")
    }
}

/// Mobile check: viewport meta tag, `max-width` container bound,
/// 44px minimum touch targets, scrollbar-hiding class.
pub fn mobile_check(html: &str, config: &VerifyConfig) -> CheckResult {
    let mut issues = Vec::new();

    if !has_viewport_meta(html) {
        issues.push("missing viewport meta tag".to_string());
    }
    match max_container_width_px(html) {
        Some(w) if w <= config.mobile_max_width_px => {}
        Some(w) => issues.push(format!("container max-width {w}px exceeds {}px limit", config.mobile_max_width_px)),
        None => issues.push("no bounded container max-width found".to_string()),
    }
    if !touch_targets_meet_minimum(html, config.mobile_min_touch_target_px) {
        issues.push(format!("interactive elements below {}px minimum touch target", config.mobile_min_touch_target_px));
    }
    if !has_scrollbar_hiding_class(html) {
        issues.push("no scrollbar-hiding class applied".to_string());
    }

    if issues.is_empty() {
        CheckResult::pass("viewport, container width, touch targets, and scrollbar hiding all satisfied")
    } else {
        CheckResult::fail(issues.join("; "))
    }
}

/// Security check: no sensitive-pattern matches in the rendered output.
pub fn security_check(html: &str) -> CheckResult {
    let patterns = [
        (r"AKIA[0-9A-Z]{16}", "AWS access key"),
        (r"sk-[A-Za-z0-9]{20,}", "API key"),
        (r"-----BEGIN [A-Z ]*PRIVATE KEY-----", "private key block"),
    ];
    for (pattern, label) in patterns {
        let re = Regex::new(pattern).expect("static pattern compiles");
        if re.is_match(html) {
            return CheckResult::fail(format!("possible {label} found in generated output"));
        }
    }
    CheckResult::pass("no sensitive patterns found")
}

/// Lint-style structural checks beyond the mobile check, used only by
/// `validate_html` (report-only, never gates release per).
pub fn lint_check(html: &str) -> CheckResult {
    let mut issues = Vec::new();
    if !html.to_ascii_lowercase().contains("<!doctype html") {
        issues.push("missing <!DOCTYPE html>".to_string());
    }
    if !html.contains("<title") {
        issues.push("missing <title> tag".to_string());
    }
    if html.matches("<html").count() > 1 {
        issues.push("multiple <html> tags".to_string());
    }
    if issues.is_empty() {
        CheckResult::pass("no lint issues found")
    } else {
        CheckResult::fail(issues.join("; "))
    }
}

fn has_viewport_meta(html: &str) -> bool {
    let re = Regex::new(r#"<meta[^>]*name=["']viewport["'][^>]*>"#).expect("static pattern");
    re.is_match(html)
}

/// Finds the smallest `max-width` (in px) declared anywhere in an inline
/// `<style>` block or `style="..."` attribute. Returns `None` if no
/// px-valued `max-width` is present at all.
fn max_container_width_px(html: &str) -> Option<u32> {
    let re = Regex::new(r"max-width\s*:\s*(\d+)px").expect("static pattern");
    re.captures_iter(html).filter_map(|c| c[1].parse::<u32>().ok()).min()
}

/// Heuristic: every `height` or `min-height` declared on a button/link-like
/// rule must meet the minimum, and at least one such rule must exist.
fn touch_targets_meet_minimum(html: &str, min_px: u32) -> bool {
    let re = Regex::new(r"(?:min-height|height)\s*:\s*(\d+)px").expect("static pattern");
    let heights: Vec<u32> = re.captures_iter(html).filter_map(|c| c[1].parse::<u32>().ok()).collect();
    if heights.is_empty() {
        return false;
    }
    heights.iter().all(|h| *h >= min_px)
}

fn has_scrollbar_hiding_class(html: &str) -> bool {
    html.contains("no-scrollbar") || html.contains("scrollbar-hide") || html.contains("hide-scrollbar")
}
