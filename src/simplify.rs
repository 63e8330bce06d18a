//! Clinical-to-lay vocabulary rewriting.
//!
//! Rules run in declaration order over lower-cased text. Multi-word and more
//! specific terms come before the shorter terms they contain, and no
//! replacement phrase matches any pattern, so rewriting is stable under
//! repetition.

use std::sync::OnceLock;

use regex::Regex;

/// (clinical term, lay phrasing). Patterns are whole-word and case-insensitive.
const RULES: &[(&str, &str)] = &[
    // Multi-word terms first.
    ("diabetes mellitus", "diabetes (high blood sugar)"),
    ("myocardial infarction", "heart attack"),
    ("cerebrovascular accident", "stroke"),
    ("congestive heart failure", "weak heart pumping"),
    ("congestive cardiac failure", "weak heart pumping"),
    ("chronic obstructive pulmonary disease", "long-term lung disease"),
    ("otitis media", "middle ear infection"),
    ("upper respiratory tract infection", "common cold"),
    ("urinary tract infection", "bladder infection"),
    ("atrial fibrillation", "irregular heartbeat"),
    ("blood glucose", "blood sugar"),
    ("twice daily", "two times a day"),
    ("as needed", "when needed"),
    // Single terms.
    ("hypertension", "high blood pressure"),
    ("hypotension", "low blood pressure"),
    ("hyperglycemia", "high blood sugar"),
    ("hypoglycemia", "low blood sugar"),
    ("hyperlipidemia", "high cholesterol"),
    ("tachycardia", "fast heart rate"),
    ("bradycardia", "slow heart rate"),
    ("dyspnea", "shortness of breath"),
    ("dyspnoea", "shortness of breath"),
    ("pyrexia", "fever"),
    ("afebrile", "without fever"),
    ("febrile", "feverish"),
    ("edema", "swelling"),
    ("oedema", "swelling"),
    ("emesis", "vomiting"),
    ("cephalgia", "headache"),
    ("pruritus", "itching"),
    ("erythema", "redness"),
    ("syncope", "fainting"),
    ("anemia", "low red blood cell count"),
    ("anaemia", "low red blood cell count"),
    ("neoplasm", "abnormal growth"),
    ("benign", "not cancerous"),
    ("malignant", "cancerous"),
    ("metastasis", "cancer spread"),
    ("lesion", "abnormal area"),
    ("renal", "kidney"),
    ("hepatic", "liver"),
    ("pulmonary", "lung"),
    ("cardiac", "heart"),
    ("gastric", "stomach"),
    ("analgesic", "pain reliever"),
    ("antipyretic", "fever reducer"),
    ("contraindicated", "not recommended"),
    ("prognosis", "expected outcome"),
    ("bilateral", "on both sides"),
    ("idiopathic", "of unknown cause"),
    ("prophylaxis", "prevention"),
    ("prn", "when needed"),
    ("bid", "two times a day"),
    ("tid", "three times a day"),
    ("qid", "four times a day"),
    ("qd", "once a day"),
    ("po", "by mouth"),
];

fn compiled_rules() -> &'static [(Regex, &'static str)] {
    static RULES_RE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES_RE.get_or_init(|| {
        RULES
            .iter()
            .map(|(term, lay)| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(term).replace(' ', r"\s+"));
                (Regex::new(&pattern).expect("static regex"), *lay)
            })
            .collect()
    })
}

/// Rewrite clinical terminology in lay terms.
pub fn simplify(text: &str) -> String {
    let mut out = text.to_lowercase();
    for (re, lay) in compiled_rules() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *lay).into_owned();
        }
    }
    capitalize_first(&out)
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
