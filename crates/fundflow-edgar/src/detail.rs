//! Filing detail-page scanning.
//!
//! The regulator's filing detail page is an HTML document listing the
//! submission's files in a table. The downloadable artifact is located
//! by finding the row whose label cell reads "Complete submission text
//! file" and taking that row's anchor target. When no such row exists
//! the fallback accepts any anchor whose target contains the structured
//! document extension, excluding the stylesheet-rendered variants.

use scraper::{Html, Selector};

/// Label cell identifying the complete-submission row.
const SUBMISSION_LABEL: &str = "Complete submission text file";

/// Path segment of stylesheet-transformed document variants, which are
/// rendered HTML and must never be downloaded as the artifact.
const STYLESHEET_SEGMENT: &str = "xslF345X";

/// Extension of the structured-document artifact accepted by the fallback.
const DOCUMENT_EXTENSION: &str = ".xml";

/// Locates the downloadable artifact link on a filing detail page.
///
/// Returns the anchor target as it appears in the page (usually a
/// site-relative path). `None` means the page carries no usable link
/// and the filing cannot be fetched.
#[must_use]
pub fn find_document_link(page: &str) -> Option<String> {
    let document = Html::parse_document(page);
    let rows = Selector::parse("table tr").ok()?;
    let anchors = Selector::parse("a[href]").ok()?;

    // Preferred: the complete submission row's anchor.
    for row in document.select(&rows) {
        let label = row.text().collect::<String>();
        if !label.contains(SUBMISSION_LABEL) {
            continue;
        }
        if let Some(href) = row
            .select(&anchors)
            .filter_map(|a| a.value().attr("href"))
            .next()
        {
            return Some(href.to_string());
        }
    }

    // Fallback: any structured-document anchor that is not a stylesheet
    // rendering.
    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains(DOCUMENT_EXTENSION) && !href.contains(STYLESHEET_SEGMENT))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_complete_submission_row() {
        let page = r#"
            <html><body><table>
            <tr><td>Document</td><td><a href="/Archives/edgar/data/320193/000032019324000001/doc4.xml">doc4.xml</a></td></tr>
            <tr><td>Complete submission text file</td>
                <td><a href="/Archives/edgar/data/320193/000032019324000001/0000320193-24-000001.txt">submission</a></td></tr>
            </table></body></html>
        "#;
        let link = find_document_link(page).unwrap();
        assert!(link.ends_with("0000320193-24-000001.txt"));
    }

    #[test]
    fn test_falls_back_to_document_anchor() {
        let page = r#"
            <html><body><table>
            <tr><td>Primary document</td>
                <td><a href="/Archives/edgar/data/320193/000032019324000001/wk-form4.xml">wk-form4.xml</a></td></tr>
            </table></body></html>
        "#;
        let link = find_document_link(page).unwrap();
        assert!(link.ends_with("wk-form4.xml"));
    }

    #[test]
    fn test_fallback_excludes_stylesheet_renderings() {
        let page = r#"
            <html><body><table>
            <tr><td>Rendered</td>
                <td><a href="/Archives/edgar/data/320193/000032019324000001/xslF345X03/wk-form4.xml">rendered</a></td></tr>
            </table></body></html>
        "#;
        assert!(find_document_link(page).is_none());
    }

    #[test]
    fn test_empty_page_yields_none() {
        assert!(find_document_link("<html><body></body></html>").is_none());
    }
}
