use once_cell::sync::Lazy;
use regex::Regex;

pub static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").unwrap());

pub static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s().\-]{6,18}\d").unwrap());

pub static SOCIAL_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"https?://(?:www\.)?(?:[a-z]+\.)?(linkedin\.com|twitter\.com|x\.com|facebook\.com|instagram\.com|youtube\.com|github\.com|tiktok\.com)/[A-Za-z0-9_@/.\-]+",
    )
    .unwrap()
});

pub static FOUNDED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:founded|established)\s+(?:in\s+)?(\d{4})").unwrap());

pub static EMPLOYEES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d[\d,]*)\+?\s+employees").unwrap());

pub static HEADQUARTERS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)headquarter(?:s|ed)\s+(?:is\s+|are\s+)?(?:in|at|:)\s+([A-Z][A-Za-z .'\-]{2,60}?)(?:[.,;\n]|$)")
        .unwrap()
});

pub static STOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:NYSE|NASDAQ|Nasdaq)\s*[:\s]\s*([A-Za-z][A-Za-z.\-]{0,9})").unwrap());

pub static RAISED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)raised\s+(\$\s?[\d.,]+\s*(?:million|billion|[mb])?)").unwrap()
});

pub static REVENUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)revenue\s+of\s+(\$\s?[\d.,]+\s*(?:million|billion|[mb])?)").unwrap()
});

pub static VALUATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)valu(?:ed|ation)\s+(?:at|of)\s+(\$\s?[\d.,]+\s*(?:million|billion|[mb])?)")
        .unwrap()
});

pub static INVESTORS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)investors?\s+(?:includ(?:e|ing)|:)\s+([^.\n]{5,160})").unwrap()
});

pub static INDUSTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)industry\s*[:\s]\s*([A-Za-z][A-Za-z &\-]{2,40})").unwrap());

const TITLE_WORDS: &str =
    "CEO|CTO|CFO|COO|CMO|Founder|Co-?[Ff]ounder|President|Chairman|Chief Executive Officer|Chief Technology Officer";

/// "Jane Doe, CEO" / "Jane Doe, co-founder".
pub static PERSON_BEFORE_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"([A-Z][a-z]+(?: [A-Z][a-z]+){{1,2}}),\s*(?:the\s+)?({TITLE_WORDS})"
    ))
    .unwrap()
});

/// "CEO Jane Doe" / "founder Jane Doe".
pub static TITLE_BEFORE_PERSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({TITLE_WORDS})\s+([A-Z][a-z]+(?: [A-Z][a-z]+){{1,2}})"
    ))
    .unwrap()
});

pub fn find_unique(re: &Regex, text: &str) -> Vec<String> {
    let mut results: Vec<String> = re.find_iter(text).map(|m| m.as_str().to_string()).collect();
    results.sort();
    results.dedup();
    results
}
