//! Classification of anti-automation block pages.

/// Markers in the landing URL that identify a block page.
const URL_MARKERS: [&str; 3] = ["/sorry/", "/interstitial", "sorry/index"];

/// Phrases in the page body that identify a soft block or verification
/// challenge.
const BODY_MARKERS: [&str; 4] = [
    "unusual traffic",
    "i'm not a robot",
    "recaptcha",
    "having trouble accessing google search",
];

/// Returns true when the rendered page is an interstitial/soft-block rather
/// than a results page, judged from the landing URL and a leading HTML
/// snippet.
pub fn is_interstitial(page_url: &str, html_snippet: &str) -> bool {
    if URL_MARKERS.iter().any(|m| page_url.contains(m)) {
        return true;
    }
    let body = html_snippet.to_lowercase();
    BODY_MARKERS.iter().any(|m| body.contains(m))
}
