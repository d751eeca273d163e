use once_cell::sync::Lazy;
use regex::Regex;

/// Best-effort PII scrubbing for SQL text written to the query log.
///
/// Regex based, so literals built by concatenation or unusual quoting can slip
/// through. Statements are logged only after passing through [`scrub`].
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("valid email pattern")
});

// XXX-XX-XXXX
static SSN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid ssn pattern"));

static CREDIT_CARD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d[ -]*?){13,16}\b").expect("valid card pattern")
});

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}").expect("valid phone pattern")
});

pub fn scrub(input: &str) -> String {
    let scrubbed = EMAIL_REGEX.replace_all(input, "[EMAIL]");
    let scrubbed = SSN_REGEX.replace_all(&scrubbed, "[SSN]");
    // Matches long numeric ids too; acceptable for a log.
    let scrubbed = CREDIT_CARD_REGEX.replace_all(&scrubbed, "[CREDIT_CARD]");
    PHONE_REGEX.replace_all(&scrubbed, "[PHONE]").into_owned()
}

/// Shortened, scrubbed form of a statement for log lines.
pub fn scrub_for_log(sql: &str, max_len: usize) -> String {
    let scrubbed = scrub(sql);
    if scrubbed.chars().count() <= max_len {
        return scrubbed;
    }
    let truncated: String = scrubbed.chars().take(max_len).collect();
    format!("{}...", truncated)
}
