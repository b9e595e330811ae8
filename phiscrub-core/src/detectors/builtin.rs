// phiscrub-core/src/detectors/builtin.rs
//! The built-in detector list, in evaluation order.
//!
//! Categories: header-labeled identifiers, honorific titles, narrative names,
//! structured identifiers, date forms, placeholder artifacts, and contact and
//! address forms.

use crate::span::{EntityLabel, SourceTag};
use super::compiler::{DetectorSpec, LabelRule};

/// Start of a header field: line start, a separator, or a wide gap.
const FIELD_START: &str = r"(?:^|[;|\t]|[ ]{2})[ \t]*";

const MONTH: &str = r"(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)";

/// A capitalized name token: `Smith`, `O'Neil`, `Smith-Jones`.
const NAME_TOKEN: &str = r"[A-Z][a-z'\-]+";

fn spec(source: SourceTag, label: EntityLabel, pattern: String, group: usize, score: f64) -> DetectorSpec {
    DetectorSpec {
        source,
        label: LabelRule::Fixed(label),
        pattern,
        group,
        score,
        multiline: false,
        provider_guard: false,
        require_digit: false,
    }
}

impl DetectorSpec {
    fn guarded(mut self) -> Self {
        self.provider_guard = true;
        self
    }

    fn digits(mut self) -> Self {
        self.require_digit = true;
        self
    }

    fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }
}

/// Date shapes accepted after a date header.
fn date_value() -> String {
    format!(
        r"(\d{{1,2}}[/\-.]\d{{1,2}}[/\-.]\d{{2,4}}|\d{{4}}-\d{{2}}-\d{{2}}|{m}\.?[ \t]+\d{{1,2}},?[ \t]+\d{{4}}|\d{{1,2}}[ \t]+{m}\.?,?[ \t]+\d{{4}})",
        m = MONTH
    )
}

pub fn builtin_specs() -> Vec<DetectorSpec> {
    vec![
        // (a) header-labeled identifiers
        spec(
            SourceTag::HeaderName,
            EntityLabel::Patient,
            format!(
                r"{FIELD_START}(?i:patient(?:'s)?(?:[ \t]+(?:full[ \t]+)?name)?|pt\.?(?:[ \t]+name)?|name)[ \t]*:[ \t]*([A-Z][A-Za-z'\-]+(?:,[ \t]*[A-Z][A-Za-z'\-]+)?(?:[ \t]+[A-Z][A-Za-z'\-]*\.?){{0,3}})"
            ),
            1,
            0.98,
        )
        .multiline()
        .guarded(),
        spec(
            SourceTag::HeaderGeo,
            EntityLabel::Geo,
            format!(
                r"{FIELD_START}(?i:(?:home[ \t]+)?address|city|hometown|residence|facility|hospital|referring[ \t]+(?:hospital|facility))[ \t]*:[ \t]*([A-Z0-9][A-Za-z0-9'\-\.]*(?:[ \t,]+[A-Z0-9][A-Za-z0-9'\-\.]*){{0,5}})"
            ),
            1,
            0.90,
        )
        .multiline(),
        // honorific titles
        spec(
            SourceTag::TitleName,
            EntityLabel::Patient,
            format!(r"\b(?:Mr|Mrs|Ms|Miss|Mx)\.?[ \t]+({NAME_TOKEN}(?:[ \t]+[A-Z](?:\.|\b))?(?:[ \t]+{NAME_TOKEN})?)"),
            1,
            0.85,
        )
        .guarded(),
        // (b) narrative identifiers
        spec(
            SourceTag::NarrativeName,
            EntityLabel::Patient,
            format!(
                r"\b({NAME_TOKEN}(?:[ \t]+[A-Z](?:\.|\b))?(?:[ \t]+{NAME_TOKEN}){{1,2}}),?[ \t]+(?:is[ \t]+)?(?:an?[ \t]+)?\d{{1,3}}[ \-]?(?:year|yr|yo\b|y/o|y\.o\.)"
            ),
            1,
            0.70,
        )
        .guarded(),
        spec(
            SourceTag::NarrativeName,
            EntityLabel::Patient,
            format!(
                r"\b({NAME_TOKEN}(?:[ \t]+[A-Z](?:\.|\b))?(?:[ \t]+{NAME_TOKEN}){{1,2}})[ \t]+(?:underwent|presented|presents|was[ \t]+brought|was[ \t]+taken|tolerated|consented|arrived)\b"
            ),
            1,
            0.70,
        )
        .guarded(),
        // (c) structured identifiers
        spec(
            SourceTag::Mrn,
            EntityLabel::Id,
            r"(?i:\b(?:MRN|MR#|medical[ \t]+record(?:[ \t]+(?:number|no\.?|#))?|record[ \t]+(?:number|no\.?|#)))[ \t]*[:#]?[ \t]*([A-Z0-9][A-Z0-9\-]*(?:[ ][0-9][0-9\-]*)?)".to_string(),
            1,
            0.95,
        )
        .digits(),
        spec(
            SourceTag::CaseId,
            EntityLabel::Id,
            r"(?i:\b(?:case|accession|acc|encounter|enc|visit|account|acct|fin|csn|specimen[ \t]+id|patient[ \t]+id|pt[ \t]+id|id))[ \t]*(?i:no\.?|number|#|id)?[ \t]*[:#][ \t]*([A-Z0-9][A-Z0-9\-]{3,})".to_string(),
            1,
            0.90,
        )
        .digits(),
        spec(
            SourceTag::ParenId,
            EntityLabel::Id,
            r"\((\d{6,12})\)".to_string(),
            1,
            0.80,
        ),
        // (d) date forms
        spec(
            SourceTag::Dob,
            EntityLabel::Date,
            format!(r"(?i:\b(?:DOB|D\.O\.B\.?|date[ \t]+of[ \t]+birth|birth[ \t]*date))[ \t]*[:#]?[ \t]*{}", date_value()),
            1,
            0.95,
        ),
        spec(
            SourceTag::HeaderDate,
            EntityLabel::Date,
            format!(
                r"(?i:\b(?:date[ \t]+of[ \t]+(?:procedure|service|admission|discharge|exam)|(?:procedure|service|admission|admit|discharge)[ \t]+date|DOS))[ \t]*:[ \t]*{}",
                date_value()
            ),
            1,
            0.95,
        ),
        spec(
            SourceTag::DateNumeric,
            EntityLabel::Date,
            r"\b(\d{1,2}[/\-]\d{1,2}[/\-](?:\d{4}|\d{2}))\b".to_string(),
            1,
            0.85,
        ),
        spec(
            SourceTag::DateIso,
            EntityLabel::Date,
            r"\b(\d{4}-\d{2}-\d{2})\b".to_string(),
            1,
            0.85,
        ),
        spec(
            SourceTag::DateText,
            EntityLabel::Date,
            format!(r"\b({MONTH}\.?[ \t]+\d{{1,2}}(?:st|nd|rd|th)?,?[ \t]+\d{{4}})\b"),
            1,
            0.85,
        ),
        spec(
            SourceTag::DateText,
            EntityLabel::Date,
            format!(r"\b(\d{{1,2}}(?:st|nd|rd|th)?[ \t]+{MONTH}\.?,?[ \t]+\d{{4}})\b"),
            1,
            0.85,
        ),
        // (e) placeholder and template artifacts
        DetectorSpec {
            source: SourceTag::Placeholder,
            label: LabelRule::Placeholder,
            pattern: r"(\[[A-Z][A-Z0-9 _\-]{1,30}\]|<[A-Z][A-Z0-9 _\-]{1,30}>|\{\{[ \t]*[A-Za-z][A-Za-z0-9 _\-]{1,30}[ \t]*\}\}|_{2,}[A-Za-z][A-Za-z0-9 ]{0,30}_{2,}|\*\*[A-Z][A-Z _]{1,30}\*\*)".to_string(),
            group: 1,
            score: 0.99,
            multiline: false,
            provider_guard: false,
            require_digit: false,
        },
        // contact and address forms
        spec(
            SourceTag::Phone,
            EntityLabel::Contact,
            r"(?:\+?1[ .\-]?)?(\(?\b\d{3}\)?[ .\-]?\d{3}[ .\-]\d{4})\b".to_string(),
            1,
            0.90,
        ),
        spec(
            SourceTag::Email,
            EntityLabel::Contact,
            r"\b([A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,})\b".to_string(),
            1,
            0.95,
        ),
        spec(
            SourceTag::StreetAddress,
            EntityLabel::Geo,
            r"\b(\d{1,5}[ \t]+(?:[A-Z][a-z]+[ \t]+){1,3}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Drive|Dr|Lane|Ln|Court|Ct|Way|Place|Pl|Parkway|Pkwy|Circle|Cir|Terrace|Highway|Hwy)\.?)(?:[^A-Za-z]|$)".to_string(),
            1,
            0.85,
        ),
    ]
}
