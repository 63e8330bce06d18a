//! Medical entity extraction.
//!
//! Two backends share the [`EntityExtractor`] trait:
//! - [`ModelEntityExtractor`] wraps a clinical NER model (BC5CDR-style labels)
//!   and buckets its output into display categories.
//! - [`KeywordEntityExtractor`] matches a fixed vocabulary with compiled
//!   whole-word regexes. It never fails and is used when no model loaded.
//!
//! [`EntityStage`] picks the backend once, from what loaded at startup, and
//! converts any failure into a `{"error": ...}` report so entity problems
//! never abort a request.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::chain::{Backend, FallbackChain};

pub const DISEASES: &str = "Diseases & Symptoms";
pub const MEDICATIONS: &str = "Medications";
pub const OTHER: &str = "Other";
pub const OTHER_FINDINGS: &str = "Other Findings";

/// Ordered category → mentions mapping. Mentions are unique per category and
/// keep first-seen order; categories keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityGroups {
    groups: Vec<(String, Vec<String>)>,
}

impl EntityGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mention, ignoring it if the category already holds it.
    pub fn push(&mut self, category: &str, mention: impl Into<String>) {
        let mention = mention.into();
        let idx = match self.groups.iter().position(|(c, _)| c == category) {
            Some(idx) => idx,
            None => {
                self.groups.push((category.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };
        let mentions = &mut self.groups[idx].1;
        if !mentions.contains(&mention) {
            mentions.push(mention);
        }
    }

    #[cfg(test)]
    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, m)| m.as_slice())
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(c, _)| c.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|(_, m)| m.is_empty())
    }

    pub fn mention_count(&self) -> usize {
        self.groups.iter().map(|(_, m)| m.len()).sum()
    }

    /// Relabel raw categories onto the three display categories.
    pub fn pretty(&self) -> EntityGroups {
        let mut pretty = EntityGroups::new();
        for (category, mentions) in &self.groups {
            let label = display_label(category);
            for m in mentions {
                pretty.push(label, m.clone());
            }
        }
        pretty
    }
}

impl Serialize for EntityGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (category, mentions) in &self.groups {
            map.serialize_entry(category, mentions)?;
        }
        map.end()
    }
}

fn display_label(category: &str) -> &'static str {
    match category {
        DISEASES | "DISEASE" => DISEASES,
        MEDICATIONS | "CHEMICAL" => MEDICATIONS,
        _ => OTHER_FINDINGS,
    }
}

/// What the entity stage hands downstream: groups, or a single diagnostic key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntityReport {
    Groups(EntityGroups),
    Error { error: String },
    Warning { warning: String },
}

impl EntityReport {
    pub fn groups(&self) -> Option<&EntityGroups> {
        match self {
            EntityReport::Groups(g) => Some(g),
            _ => None,
        }
    }

    /// The same report with display labels; diagnostics become a warning.
    pub fn pretty(&self) -> EntityReport {
        match self {
            EntityReport::Groups(g) => EntityReport::Groups(g.pretty()),
            EntityReport::Error { error } => EntityReport::Warning {
                warning: format!("Entities unavailable: {}", error),
            },
            EntityReport::Warning { warning } => EntityReport::Warning {
                warning: warning.clone(),
            },
        }
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// A span recognized by an NER model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecognizedEntity {
    pub text: String,
    pub label: String,
}

/// A loaded named-entity model.
#[async_trait::async_trait]
pub trait EntityModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn recognize(&self, text: &str) -> anyhow::Result<Vec<RecognizedEntity>>;
}

/// Entity extraction backend.
#[async_trait::async_trait]
pub trait EntityExtractor: Backend {
    async fn extract(&self, text: &str) -> anyhow::Result<EntityGroups>;
}

// ============================================================================
// Model-backed extractor
// ============================================================================

pub struct ModelEntityExtractor {
    model: Arc<dyn EntityModel>,
    max_chars: usize,
}

impl ModelEntityExtractor {
    pub fn new(model: Arc<dyn EntityModel>, max_chars: usize) -> Self {
        Self { model, max_chars }
    }
}

impl Backend for ModelEntityExtractor {
    fn name(&self) -> &str {
        self.model.model_name()
    }
}

#[async_trait::async_trait]
impl EntityExtractor for ModelEntityExtractor {
    async fn extract(&self, text: &str) -> anyhow::Result<EntityGroups> {
        let input = truncate_chars(text, self.max_chars);
        let entities = self.model.recognize(input).await?;
        debug!("NER model returned {} spans", entities.len());

        let mut groups = EntityGroups::new();
        for ent in entities {
            let mention = ent.text.trim();
            if mention.is_empty() {
                continue;
            }
            match ent.label.to_uppercase().as_str() {
                "DISEASE" | "CONDITION" | "SYMPTOM" => groups.push(DISEASES, mention),
                "CHEMICAL" | "MEDICATION" | "DRUG" => groups.push(MEDICATIONS, mention),
                _ => groups.push(OTHER, format!("{} ({})", mention, ent.label)),
            }
        }
        Ok(groups)
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// Keyword fallback
// ============================================================================

const DISEASE_TERMS: &[&str] = &[
    "diabetes", "hypertension", "hypotension", "asthma", "cancer", "tumor", "pneumonia",
    "bronchitis", "influenza", "covid-19", "tuberculosis", "hepatitis", "cirrhosis", "anemia",
    "arthritis", "osteoporosis", "migraine", "stroke", "heart failure", "infection", "sepsis",
    "fever", "cough", "fatigue", "nausea", "vomiting", "diarrhea", "headache", "chest pain",
    "shortness of breath", "dyspnea", "obesity", "depression", "anxiety", "epilepsy",
    "dementia", "hyperlipidemia", "kidney disease", "fracture", "allergy", "edema",
];

const CHEMICAL_TERMS: &[&str] = &[
    "insulin", "metformin", "aspirin", "ibuprofen", "paracetamol", "acetaminophen",
    "amoxicillin", "azithromycin", "penicillin", "ciprofloxacin", "lisinopril", "losartan",
    "amlodipine", "atorvastatin", "simvastatin", "omeprazole", "pantoprazole", "prednisone",
    "warfarin", "heparin", "clopidogrel", "morphine", "codeine", "salbutamol", "albuterol",
    "levothyroxine", "furosemide", "hydrochlorothiazide", "glucose", "potassium", "sodium",
];

const ANATOMY_TERMS: &[&str] = &[
    "heart", "lung", "lungs", "liver", "kidney", "kidneys", "brain", "chest", "abdomen",
    "stomach", "pancreas", "spleen", "thyroid", "colon", "bladder", "spine", "knee", "hip",
    "shoulder", "artery", "vein", "skin", "bone", "blood",
];

struct KeywordCategory {
    key: &'static str,
    regex: Regex,
}

/// Whole-word, case-insensitive vocabulary matcher.
pub struct KeywordEntityExtractor {
    categories: Vec<KeywordCategory>,
}

impl KeywordEntityExtractor {
    pub fn new() -> Self {
        let categories = [
            ("DISEASE", DISEASE_TERMS),
            ("CHEMICAL", CHEMICAL_TERMS),
            ("ANATOMY", ANATOMY_TERMS),
        ]
        .into_iter()
        .filter_map(|(key, terms)| match compile_vocabulary(terms) {
            Ok(regex) => Some(KeywordCategory { key, regex }),
            Err(e) => {
                warn!("Skipping keyword category {}: {}", key, e);
                None
            }
        })
        .collect();

        Self { categories }
    }

    /// Match the vocabulary; categories with no hits are left out.
    pub fn match_text(&self, text: &str) -> EntityGroups {
        let mut groups = EntityGroups::new();
        for cat in &self.categories {
            let mut seen = HashSet::new();
            for m in cat.regex.find_iter(text) {
                let term = m.as_str().to_lowercase();
                if seen.insert(term.clone()) {
                    groups.push(cat.key, capitalize(&term));
                }
            }
        }
        groups
    }
}

impl Default for KeywordEntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for KeywordEntityExtractor {
    fn name(&self) -> &str {
        "keyword"
    }
}

#[async_trait::async_trait]
impl EntityExtractor for KeywordEntityExtractor {
    async fn extract(&self, text: &str) -> anyhow::Result<EntityGroups> {
        Ok(self.match_text(text))
    }
}

fn compile_vocabulary(terms: &[&str]) -> Result<Regex, regex::Error> {
    // Longest first so "heart failure" wins over a shorter overlapping term.
    let mut sorted: Vec<&str> = terms.to_vec();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let alternation = sorted
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Stage
// ============================================================================

/// Entity extraction as seen by the pipeline.
pub struct EntityStage {
    chain: FallbackChain<dyn EntityExtractor>,
    model_loaded: bool,
}

impl EntityStage {
    /// Use the model when it loaded at startup, otherwise the keyword matcher.
    pub fn new(model: Option<Arc<dyn EntityModel>>, max_chars: usize) -> Self {
        let model_loaded = model.is_some();
        let backend: Arc<dyn EntityExtractor> = match model {
            Some(model) => Arc::new(ModelEntityExtractor::new(model, max_chars)),
            None => Arc::new(KeywordEntityExtractor::new()),
        };
        info!(
            "Entity stage backend: {}",
            if model_loaded { backend.name() } else { "keyword fallback" }
        );
        Self {
            chain: FallbackChain::new("entities").with(backend),
            model_loaded,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model_loaded
    }

    /// Extract entities. Failures come back as an `error` report.
    pub async fn extract(&self, text: &str) -> (EntityReport, Option<String>) {
        match self.chain.run(|b| b.extract(text), |_| true).await {
            Ok(adopted) => {
                info!(
                    backend = %adopted.backend,
                    mentions = adopted.value.mention_count(),
                    "Entity extraction complete"
                );
                (EntityReport::Groups(adopted.value), Some(adopted.backend))
            }
            Err(exhausted) => {
                let message = exhausted
                    .attempts
                    .last()
                    .map(|a| format!("entity extraction failed: {}", a.outcome))
                    .unwrap_or_else(|| "entity extraction failed".to_string());
                warn!("{}", message);
                (EntityReport::Error { error: message }, None)
            }
        }
    }
}
