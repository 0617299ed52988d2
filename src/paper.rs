use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier namespaces a source can attach to a paper.
///
/// DOIs are universal and live in the `doi` field of the paper itself;
/// this enum covers the source-native identifier families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    /// arXiv identifier, version suffix stripped (e.g. `2301.00001`)
    Arxiv,
    /// PubMed ID
    Pmid,
    /// PubMed Central ID (e.g. `PMC1234567`)
    Pmcid,
    /// Semantic Scholar paper ID
    SemanticScholar,
    /// OpenAlex work ID (e.g. `W2741809807`)
    OpenAlex,
    /// CORE work ID
    Core,
}

impl IdKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            IdKind::Arxiv => "arxiv",
            IdKind::Pmid => "pmid",
            IdKind::Pmcid => "pmcid",
            IdKind::SemanticScholar => "semantic_scholar",
            IdKind::OpenAlex => "openalex",
            IdKind::Core => "core",
        }
    }
}

/// One search hit exactly as a single source reported it.
///
/// Only `title` and `source` are guaranteed; everything else is
/// best-effort and reconciled later during deduplication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPaper {
    pub title: String,
    /// Name of the source adapter that produced this record
    pub source: String,
    pub doi: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Author display names in the order the source lists them
    pub authors: Vec<String>,
    /// Publication date verbatim from the source, prior to normalization
    pub publication_date: Option<String>,
    pub venue: Option<String>,
    pub publisher: Option<String>,
    pub citation_count: Option<u32>,
    pub is_open_access: Option<bool>,
    pub paper_url: Option<String>,
    pub pdf_url: Option<String>,
    /// Source-native identifiers keyed by namespace
    pub identifiers: BTreeMap<IdKind, String>,
}

impl RawPaper {
    /// Get a source-native identifier by namespace
    pub fn identifier(&self, kind: IdKind) -> Option<&str> {
        self.identifiers.get(&kind).map(String::as_str)
    }
}

/// A merged, deduplicated paper record.
///
/// Carries the union of identifiers from every raw record that merged
/// into it, plus the list of contributing sources in first-seen order.
/// Every `Option` field serializes as an explicit `null` when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPaper {
    pub title: String,
    pub doi: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub publication_date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub publisher: Option<String>,
    pub citation_count: Option<u32>,
    pub is_open_access: Option<bool>,
    pub paper_url: Option<String>,
    /// PDF location as advertised by a source (not yet validated)
    pub pdf_url: Option<String>,
    /// Permanent URL of the stored, validated PDF
    pub pdf_content_url: Option<String>,
    /// Source of the first raw record that created this canonical
    pub source: String,
    /// Every source that contributed a merged record, first contributor first
    pub origins: Vec<String>,
    pub identifiers: BTreeMap<IdKind, String>,
}

impl CanonicalPaper {
    /// Seed a canonical record from the first raw record that introduces it.
    ///
    /// DOI and date are normalized here; a date that fails normalization
    /// is dropped rather than carried through malformed.
    pub fn from_raw(raw: RawPaper) -> Self {
        let publication_date = raw.publication_date.as_deref().and_then(normalize_date);
        let mut identifiers = BTreeMap::new();
        for (kind, value) in raw.identifiers {
            let value = match kind {
                IdKind::Arxiv => normalize_arxiv_id(&value),
                _ => value,
            };
            identifiers.insert(kind, value);
        }

        Self {
            title: raw.title,
            doi: raw.doi.as_deref().and_then(normalize_doi),
            abstract_text: raw.abstract_text,
            authors: raw.authors,
            publication_date,
            venue: raw.venue,
            publisher: raw.publisher,
            citation_count: raw.citation_count,
            is_open_access: raw.is_open_access,
            paper_url: raw.paper_url,
            pdf_url: raw.pdf_url,
            pdf_content_url: None,
            source: raw.source.clone(),
            origins: vec![raw.source],
            identifiers,
        }
    }

    pub fn identifier(&self, kind: IdKind) -> Option<&str> {
        self.identifiers.get(&kind).map(String::as_str)
    }

    /// Mandatory metadata fields still missing from this record
    pub fn missing_mandatory(&self) -> Vec<MandatoryField> {
        let mut missing = Vec::new();
        if self.doi.is_none() {
            missing.push(MandatoryField::Doi);
        }
        if self
            .abstract_text
            .as_deref()
            .map_or(true, |a| a.trim().is_empty())
        {
            missing.push(MandatoryField::Abstract);
        }
        if self.authors.is_empty() {
            missing.push(MandatoryField::Authors);
        }
        if self.publication_date.is_none() {
            missing.push(MandatoryField::PublicationDate);
        }
        missing
    }
}

/// Metadata fields the enricher is required to fill when possible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MandatoryField {
    Doi,
    Abstract,
    Authors,
    PublicationDate,
}

impl MandatoryField {
    pub const fn as_str(self) -> &'static str {
        match self {
            MandatoryField::Doi => "doi",
            MandatoryField::Abstract => "abstract",
            MandatoryField::Authors => "authors",
            MandatoryField::PublicationDate => "publication_date",
        }
    }
}

/// Normalize a DOI to its canonical lowercase form.
///
/// Strips `doi:` and resolver-URL prefixes. Returns `None` for strings
/// that do not look like a DOI at all.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        if let Some(stripped) = strip_prefix_ignore_case(doi, prefix) {
            doi = stripped;
            break;
        }
    }
    let doi = doi.trim().to_lowercase();
    if doi.starts_with("10.") && doi.contains('/') {
        Some(doi)
    } else {
        None
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Normalize an arXiv identifier: strip the `arXiv:` prefix and any
/// version suffix, so `arXiv:2301.00001v2` and `2301.00001` compare equal.
pub fn normalize_arxiv_id(raw: &str) -> String {
    let id = raw.trim();
    let id = strip_prefix_ignore_case(id, "arxiv:").unwrap_or(id);
    match id.rfind('v') {
        Some(pos) if pos > 0 && id[pos + 1..].chars().all(|c| c.is_ascii_digit()) && !id[pos + 1..].is_empty() => {
            id[..pos].to_string()
        }
        _ => id.to_string(),
    }
}

/// Normalize a title for identity comparison: lowercase, collapsed
/// whitespace, surrounding quote/bracket characters removed, trailing
/// punctuation stripped.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| match c {
            '"' | '\'' | '\u{2018}' | '\u{2019}' | '\u{201c}' | '\u{201d}' => ' ',
            '(' | ')' | '[' | ']' | '{' | '}' => ' ',
            c if c.is_whitespace() => ' ',
            c => c,
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .to_string()
}

/// Parse a source-reported date into a calendar date.
///
/// Accepts ISO dates, RFC 3339 timestamps, year-month, bare years, and
/// slash-separated variants. Anything else is treated as missing.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return validate_year(dt.date_naive());
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return validate_year(date);
        }
    }
    // Year-month: extend with the first of the month
    let extended = format!("{}-01", value.replace('/', "-"));
    if let Ok(date) = NaiveDate::parse_from_str(&extended, "%Y-%m-%d") {
        return validate_year(date);
    }
    // Bare year
    if value.len() == 4 {
        if let Ok(year) = value.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1).and_then(validate_year);
        }
    }
    None
}

fn validate_year(date: NaiveDate) -> Option<NaiveDate> {
    use chrono::Datelike;
    if (1000..=2100).contains(&date.year()) {
        Some(date)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi_strips_prefixes() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1038/S41586-021-03819-2"),
            Some("10.1038/s41586-021-03819-2".to_string())
        );
        assert_eq!(
            normalize_doi("doi:10.1101/2024.01.01.573838"),
            Some("10.1101/2024.01.01.573838".to_string())
        );
        assert_eq!(
            normalize_doi("  10.1000/xyz123  "),
            Some("10.1000/xyz123".to_string())
        );
    }

    #[test]
    fn test_normalize_doi_rejects_non_dois() {
        assert_eq!(normalize_doi("not-a-doi"), None);
        assert_eq!(normalize_doi("10.1038"), None);
        assert_eq!(normalize_doi(""), None);
    }

    #[test]
    fn test_normalize_arxiv_id() {
        assert_eq!(normalize_arxiv_id("arXiv:2301.00001v2"), "2301.00001");
        assert_eq!(normalize_arxiv_id("2301.00001"), "2301.00001");
        assert_eq!(normalize_arxiv_id("hep-th/9901001v1"), "hep-th/9901001");
        // A trailing 'v' with no digits is part of the id, not a version
        assert_eq!(normalize_arxiv_id("2301.00001v"), "2301.00001v");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  Attention  Is \"All\" You Need!  "),
            "attention is all you need"
        );
        assert_eq!(
            normalize_title("Deep Learning (A Survey)."),
            "deep learning a survey"
        );
    }

    #[test]
    fn test_normalize_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
        assert_eq!(normalize_date("2023-05-01"), Some(expected));
        assert_eq!(normalize_date("2023/05/01"), Some(expected));
        assert_eq!(normalize_date("2023-05"), Some(expected));
        assert_eq!(
            normalize_date("2023-05-01T10:30:00Z"),
            Some(expected)
        );
        assert_eq!(
            normalize_date("2023"),
            Some(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
        );
    }

    #[test]
    fn test_normalize_date_rejects_malformed() {
        assert_eq!(normalize_date("May 2023-ish"), None);
        assert_eq!(normalize_date("n.d."), None);
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("0000"), None);
    }

    #[test]
    fn test_missing_mandatory_fields() {
        let raw = RawPaper {
            title: "Test Paper".to_string(),
            source: "arxiv".to_string(),
            ..Default::default()
        };
        let paper = CanonicalPaper::from_raw(raw);
        let missing = paper.missing_mandatory();
        assert_eq!(missing.len(), 4);
        assert!(missing.contains(&MandatoryField::Doi));
        assert!(missing.contains(&MandatoryField::Abstract));
        assert!(missing.contains(&MandatoryField::Authors));
        assert!(missing.contains(&MandatoryField::PublicationDate));
    }

    #[test]
    fn test_from_raw_drops_malformed_date() {
        let raw = RawPaper {
            title: "Test".to_string(),
            source: "pubmed".to_string(),
            publication_date: Some("Winter 2019".to_string()),
            ..Default::default()
        };
        let paper = CanonicalPaper::from_raw(raw);
        assert_eq!(paper.publication_date, None);
    }

    #[test]
    fn test_optional_fields_serialize_as_null() {
        let paper = CanonicalPaper::from_raw(RawPaper {
            title: "Test".to_string(),
            source: "arxiv".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_value(&paper).unwrap();
        assert!(json.get("doi").is_some());
        assert!(json["doi"].is_null());
        assert!(json.get("pdfContentUrl").is_some());
        assert!(json["pdfContentUrl"].is_null());
        assert!(json.get("publicationDate").is_some());
    }
}
