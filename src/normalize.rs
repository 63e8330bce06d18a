//! Cleanup of raw OCR / text-layer output before any analysis runs.

use std::sync::OnceLock;

use regex::Regex;

const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

fn non_ascii_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\x00-\x7F]{3,}").expect("static regex"))
}

fn excess_newlines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"))
}

/// Normalize extracted text. Deterministic and idempotent.
pub fn normalize_text(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    for c in raw.chars() {
        if let Some((_, replacement)) = LIGATURES.iter().find(|(lig, _)| *lig == c) {
            text.push_str(replacement);
        } else if c == '\n' || c == '\t' || !c.is_control() {
            text.push(c);
        }
    }

    let text = excess_newlines().replace_all(&text, "\n\n");
    let text = non_ascii_run().replace_all(&text, " ");

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_ligatures() {
        assert_eq!(normalize_text("\u{FB01}brosis of the \u{FB02}ank"), "fibrosis of the flank");
    }

    #[test]
    fn test_strips_control_characters() {
        assert_eq!(normalize_text("Dose\x00 500\x07mg\r\n"), "Dose 500mg");
    }

    #[test]
    fn test_collapses_whitespace_and_blank_lines() {
        let raw = "  Patient:   John   Doe \n\n\n\n   \nAge:\t42  ";
        assert_eq!(normalize_text(raw), "Patient: John Doe\nAge: 42");
    }

    #[test]
    fn test_non_ascii_noise_runs_become_space() {
        assert_eq!(normalize_text("HR 72\u{2591}\u{2592}\u{2593}bpm"), "HR 72 bpm");
        // Short runs are legitimate text.
        assert_eq!(normalize_text("Temp 37\u{00B0}C, caf\u{00E9}"), "Temp 37\u{00B0}C, caf\u{00E9}");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "",
            "plain text",
            "  a \n\n\n\n b \u{FB01}\u{FB02} \u{00E9}\u{00E9} \u{00E9}",
            "x\u{0001}\u{00E9}\u{00E9}\u{0002}\u{00E9}y",
            "\u{00A0}\u{00A0}lead\u{2003}ing\t\ttabs\r\n\r\n\r\nend",
            "\u{4E2D}\u{6587}\u{5B57} mixed \u{00E9}\u{00A0}\u{00E9}",
        ];
        for s in samples {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once, "input: {:?}", s);
        }
    }
}
