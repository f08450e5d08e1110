//! JUnit XML report reading and writing.
//!
//! Reading counts `<testcase>` elements and their `<failure>`, `<error>` and
//! `<skipped>` children. Reports that only carry totals on `<testsuite>`
//! attributes are handled by summing those when no test case was seen.

use std::path::Path;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Test case counts from one report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JunitCounts {
    pub tests: u32,
    pub failures: u32,
    pub errors: u32,
    pub skipped: u32,
    /// Written by [`render_failure`] rather than by a test harness.
    pub synthesized: bool,
}

/// `name` of the `<testsuites>` root of reports written by [`render_failure`].
pub const SYNTHESIZED_SUITES_NAME: &str = "xmatrix-synthesized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CaseState {
    Passed,
    Skipped,
    Failed,
    Errored,
}

/// Parse report content into counts.
///
/// Fails when the document is not well-formed XML or contains no
/// `<testsuite>`/`<testsuites>` element.
pub fn parse_str(xml: &str) -> Result<JunitCounts, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut saw_suite = false;
    let mut cases = JunitCounts::default();
    let mut case_seen = false;
    let mut suite_totals = JunitCounts::default();
    let mut current: Option<CaseState> = None;
    let mut synthesized = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"testsuite" => {
                    saw_suite = true;
                    add_suite_totals(&mut suite_totals, &e);
                }
                b"testsuites" => {
                    saw_suite = true;
                    synthesized |= is_synthesized_root(&e);
                }
                b"testcase" => current = Some(CaseState::Passed),
                name => mark_case(&mut current, name),
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"testsuite" => {
                    saw_suite = true;
                    add_suite_totals(&mut suite_totals, &e);
                }
                b"testsuites" => saw_suite = true,
                b"testcase" => {
                    case_seen = true;
                    tally(&mut cases, CaseState::Passed);
                }
                name => mark_case(&mut current, name),
            },
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"testcase" {
                    if let Some(state) = current.take() {
                        case_seen = true;
                        tally(&mut cases, state);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_suite {
        return Err("no <testsuite> element found".to_string());
    }

    let mut counts = if case_seen { cases } else { suite_totals };
    counts.synthesized = synthesized;
    Ok(counts)
}

/// Read and parse a report file.
pub fn parse_file(path: &Path) -> Result<JunitCounts, String> {
    let xml = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    parse_str(&xml)
}

fn mark_case(current: &mut Option<CaseState>, name: &[u8]) {
    let Some(state) = current.as_mut() else {
        return;
    };
    let next = match name {
        b"failure" => CaseState::Failed,
        b"error" => CaseState::Errored,
        b"skipped" => CaseState::Skipped,
        _ => return,
    };
    // a case that both failed and errored counts once, as the worst outcome
    if next > *state {
        *state = next;
    }
}

fn tally(counts: &mut JunitCounts, state: CaseState) {
    counts.tests = counts.tests.saturating_add(1);
    let slot = match state {
        CaseState::Passed => return,
        CaseState::Skipped => &mut counts.skipped,
        CaseState::Failed => &mut counts.failures,
        CaseState::Errored => &mut counts.errors,
    };
    *slot = slot.saturating_add(1);
}

fn is_synthesized_root(e: &BytesStart<'_>) -> bool {
    e.attributes().flatten().any(|attr| {
        attr.key.as_ref() == b"name" && attr.value.as_ref() == SYNTHESIZED_SUITES_NAME.as_bytes()
    })
}

fn add_suite_totals(totals: &mut JunitCounts, e: &BytesStart<'_>) {
    for attr in e.attributes().flatten() {
        let Ok(value) = attr.unescape_value() else {
            continue;
        };
        let Ok(n) = value.trim().parse::<u32>() else {
            continue;
        };
        let slot = match attr.key.as_ref() {
            b"tests" => &mut totals.tests,
            b"failures" => &mut totals.failures,
            b"errors" => &mut totals.errors,
            b"skipped" | b"disabled" => &mut totals.skipped,
            _ => continue,
        };
        // totals clamp at u32::MAX
        *slot = slot.saturating_add(n);
    }
}

/// Render a report with a single failing case.
///
/// Used when no test could run for a target (e.g. its build failed) so the
/// target still has a `<name>-results.xml` artifact.
pub fn render_failure(suite: &str, case: &str, message: &str, details: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
            "<testsuites name=\"{root}\" tests=\"1\" failures=\"1\" errors=\"0\" skipped=\"0\">\n",
            "  <testsuite name=\"{suite}\" tests=\"1\" failures=\"1\" errors=\"0\" skipped=\"0\">\n",
            "    <testcase classname=\"xmatrix.{suite}\" name=\"{case}\">\n",
            "      <failure message=\"{message}\">{details}</failure>\n",
            "    </testcase>\n",
            "  </testsuite>\n",
            "</testsuites>\n"
        ),
        root = SYNTHESIZED_SUITES_NAME,
        suite = escape(suite),
        case = escape(case),
        message = escape(message),
        details = escape(details),
    )
}
