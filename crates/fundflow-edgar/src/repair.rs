//! Document isolation and the strict/tolerant parse state machine.
//!
//! Regulator submissions wrap the structured ownership document in
//! non-XML transport framing and occasionally emit entities unescaped.
//! This module isolates the document span from the framing and then
//! drives an explicit repair state machine over it: strict parse first,
//! then a tolerant rebuild that re-escapes stray ampersands and
//! re-balances tags, then one strict re-parse of the rebuilt text.
//!
//! The machine has five states and pure transition functions, so the
//! repair policy is testable without any I/O:
//!
//! ```text
//! Unparsed -> Parsed(None)            strict parse succeeded
//! Unparsed -> StrictFailed            strict parse failed
//! StrictFailed -> Repaired(text)      tolerant pass located the root and rebuilt it
//! StrictFailed -> Failed              tolerant pass could not locate the root
//! Repaired(text) -> Parsed(Some)      rebuilt text parses strictly
//! Repaired(text) -> Failed            rebuilt text is still malformed
//! ```

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesText, Event};

/// Local name of the single known document root element.
pub const OWNERSHIP_ROOT: &str = "ownershipDocument";

/// Open tag searched for when isolating the document from its framing.
pub const OWNERSHIP_OPEN_TAG: &str = "<ownershipDocument>";

/// Close tag searched for when isolating the document from its framing.
pub const OWNERSHIP_CLOSE_TAG: &str = "</ownershipDocument>";

/// Declaration prepended to every isolated document.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Isolates the ownership document span from a complete submission.
///
/// Locates the first occurrence of the root open tag and the first
/// subsequent occurrence of its close tag (a single flat span, not a
/// balanced-tag scan) and prepends the standard declaration. Returns
/// `None` when either tag is missing, in which case downstream stages
/// must be skipped for this filing.
#[must_use]
pub fn isolate_ownership_document(submission: &str) -> Option<String> {
    let start = submission.find(OWNERSHIP_OPEN_TAG)?;
    let close = submission[start..].find(OWNERSHIP_CLOSE_TAG)?;
    let end = start + close + OWNERSHIP_CLOSE_TAG.len();
    Some(format!("{XML_DECLARATION}\n{}", &submission[start..end]))
}

/// State of the repair machine for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairState {
    /// No parse attempted yet.
    Unparsed,
    /// Strict parse rejected the document as retrieved.
    StrictFailed,
    /// Tolerant pass rebuilt the document; the rebuilt text awaits re-parse.
    Repaired(String),
    /// Document is well-formed. `Some` carries rebuilt text that must
    /// overwrite the persisted fragment; `None` means the original text
    /// was already clean.
    Parsed(Option<String>),
    /// Neither pass produced a well-formed document.
    Failed(String),
}

impl RepairState {
    /// Whether the machine has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Parsed(_) | Self::Failed(_))
    }
}

/// Advances the machine by one transition. Terminal states are returned
/// unchanged.
#[must_use]
pub fn step(state: RepairState, document: &str) -> RepairState {
    match state {
        RepairState::Unparsed => match strict_parse(document) {
            Ok(()) => RepairState::Parsed(None),
            Err(_) => RepairState::StrictFailed,
        },
        RepairState::StrictFailed => match tolerant_rebuild(document) {
            Some(rebuilt) => RepairState::Repaired(rebuilt),
            None => RepairState::Failed(format!(
                "tolerant pass could not locate the {OWNERSHIP_ROOT} element"
            )),
        },
        RepairState::Repaired(rebuilt) => match strict_parse(&rebuilt) {
            Ok(()) => RepairState::Parsed(Some(rebuilt)),
            Err(e) => RepairState::Failed(format!("rebuilt document is still malformed: {e}")),
        },
        terminal => terminal,
    }
}

/// Drives the machine from [`RepairState::Unparsed`] to a terminal state.
#[must_use]
pub fn parse_or_repair(document: &str) -> RepairState {
    let mut state = RepairState::Unparsed;
    while !state.is_terminal() {
        state = step(state, document);
    }
    state
}

/// Strict well-formedness check.
fn strict_parse(document: &str) -> Result<(), String> {
    roxmltree::Document::parse(document)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Tolerant rebuild: re-reads the document with relaxed checks, keeps
/// only the root element's subtree, re-escapes text content, and
/// re-balances end tags from a stack. Returns `None` when the root
/// element never appears.
fn tolerant_rebuild(document: &str) -> Option<String> {
    let mut reader = Reader::from_str(document);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut writer = Writer::new(Vec::new());
    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if !seen_root {
                    if name != OWNERSHIP_ROOT {
                        continue;
                    }
                    seen_root = true;
                }
                writer.write_event(Event::Start(start)).ok()?;
                stack.push(name);
            }
            Ok(Event::Empty(empty)) => {
                if seen_root {
                    writer.write_event(Event::Empty(empty)).ok()?;
                }
            }
            Ok(Event::Text(text)) => {
                if seen_root {
                    let raw = String::from_utf8_lossy(text.as_ref()).into_owned();
                    let escaped = escape_stray_ampersands(&raw);
                    writer
                        .write_event(Event::Text(BytesText::from_escaped(escaped)))
                        .ok()?;
                }
            }
            Ok(Event::CData(cdata)) => {
                if seen_root {
                    writer.write_event(Event::CData(cdata)).ok()?;
                }
            }
            Ok(Event::End(_)) => {
                // The end tag's own name is untrusted; balance from the stack.
                if let Some(name) = stack.pop() {
                    writer.write_event(Event::End(BytesEnd::new(name))).ok()?;
                    if seen_root && stack.is_empty() {
                        break;
                    }
                }
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, PIs, and doctypes in the framing are dropped.
            Ok(_) => {}
            // A token the relaxed reader still rejects ends the usable input;
            // whatever was collected so far gets closed out below.
            Err(_) => break,
        }
    }

    if !seen_root {
        return None;
    }

    // Auto-close anything left open by a truncated input.
    while let Some(name) = stack.pop() {
        writer.write_event(Event::End(BytesEnd::new(name))).ok()?;
    }

    let body = String::from_utf8(writer.into_inner()).ok()?;
    Some(format!("{XML_DECLARATION}\n{body}"))
}

/// Escapes each `&` that does not begin a well-formed entity reference,
/// leaving existing references intact so they are not double-escaped.
fn escape_stray_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if c == '&' && !is_entity_reference(&text[i + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
    }
    out
}

/// Whether `rest` (the text after a `&`) starts with a valid entity body
/// terminated by `;`.
fn is_entity_reference(rest: &str) -> bool {
    let Some(semi) = rest.find(';') else {
        return false;
    };
    if semi == 0 || semi > 10 {
        return false;
    }
    let body = &rest[..semi];
    matches!(body, "amp" | "lt" | "gt" | "apos" | "quot")
        || body
            .strip_prefix("#x")
            .is_some_and(|h| !h.is_empty() && h.chars().all(|c| c.is_ascii_hexdigit()))
        || body
            .strip_prefix('#')
            .is_some_and(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = "<ownershipDocument><documentType>4</documentType></ownershipDocument>";

    #[test]
    fn test_isolate_strips_framing() {
        let submission = format!(
            "<SEC-DOCUMENT>header noise\n<XML>\n{CLEAN}\n</XML>\ntrailer</SEC-DOCUMENT>"
        );
        let isolated = isolate_ownership_document(&submission).unwrap();
        assert!(isolated.starts_with(XML_DECLARATION));
        assert!(isolated.contains("<documentType>4</documentType>"));
        assert!(!isolated.contains("header noise"));
        assert!(!isolated.contains("trailer"));
    }

    #[test]
    fn test_isolate_fails_without_close_tag() {
        let submission = "<SEC-DOCUMENT><ownershipDocument><documentType>4</documentType>";
        assert!(isolate_ownership_document(submission).is_none());
    }

    #[test]
    fn test_isolate_fails_without_open_tag() {
        assert!(isolate_ownership_document("no document here").is_none());
    }

    #[test]
    fn test_clean_document_parses_without_repair() {
        let document = format!("{XML_DECLARATION}\n{CLEAN}");
        assert_eq!(parse_or_repair(&document), RepairState::Parsed(None));
    }

    #[test]
    fn test_unescaped_ampersand_is_repaired() {
        let document = format!(
            "{XML_DECLARATION}\n<ownershipDocument><issuerName>AT&T Inc.</issuerName></ownershipDocument>"
        );
        match parse_or_repair(&document) {
            RepairState::Parsed(Some(rebuilt)) => {
                assert!(rebuilt.contains("AT&amp;T Inc."));
                assert!(roxmltree::Document::parse(&rebuilt).is_ok());
            }
            other => panic!("expected repaired parse, got {other:?}"),
        }
    }

    #[test]
    fn test_existing_entities_survive_repair() {
        // One stray ampersand forces the repair path; the pre-escaped
        // entity next to it must not be double-escaped.
        let document = format!(
            "{XML_DECLARATION}\n<ownershipDocument><a>Smith & Co</a><b>Jones &amp; Sons</b></ownershipDocument>"
        );
        match parse_or_repair(&document) {
            RepairState::Parsed(Some(rebuilt)) => {
                assert!(rebuilt.contains("Smith &amp; Co"));
                assert!(rebuilt.contains("Jones &amp; Sons"));
                assert!(!rebuilt.contains("&amp;amp;"));
            }
            other => panic!("expected repaired parse, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_close_tag_is_rebalanced() {
        let document = format!(
            "{XML_DECLARATION}\n<ownershipDocument><documentType>4</documenttype></ownershipDocument>"
        );
        match parse_or_repair(&document) {
            RepairState::Parsed(Some(rebuilt)) => {
                assert!(rebuilt.contains("</documentType>"));
            }
            other => panic!("expected repaired parse, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_root_fails() {
        let document = format!("{XML_DECLARATION}\n<someOtherDocument>&</someOtherDocument>");
        assert!(matches!(parse_or_repair(&document), RepairState::Failed(_)));
    }

    #[test]
    fn test_step_is_identity_on_terminal_states() {
        let failed = RepairState::Failed("x".to_string());
        assert_eq!(step(failed.clone(), CLEAN), failed);
        let parsed = RepairState::Parsed(None);
        assert_eq!(step(parsed.clone(), CLEAN), parsed);
    }

    #[test]
    fn test_escape_stray_ampersands() {
        assert_eq!(escape_stray_ampersands("a & b"), "a &amp; b");
        assert_eq!(escape_stray_ampersands("a &amp; b"), "a &amp; b");
        assert_eq!(escape_stray_ampersands("x &#38; y"), "x &#38; y");
        assert_eq!(escape_stray_ampersands("x &#x26; y"), "x &#x26; y");
        assert_eq!(escape_stray_ampersands("tail &"), "tail &amp;");
        assert_eq!(escape_stray_ampersands("&bogusentityname; z"), "&amp;bogusentityname; z");
    }
}
