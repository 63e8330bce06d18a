//! Regex heuristics for vital signs in normalized report text.
//!
//! Pure functions, no I/O. Each vital is matched independently; a vital that
//! is not found (or only found outside its plausible range) is left out.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const HEART_RATE_RANGE: RangeInclusive<u32> = 20..=220;
const SPO2_RANGE: RangeInclusive<u32> = 50..=100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<String>,
}

impl Vitals {
    pub fn is_empty(&self) -> bool {
        self.blood_pressure.is_none()
            && self.heart_rate.is_none()
            && self.temperature.is_none()
            && self.spo2.is_none()
    }
}

struct Patterns {
    blood_pressure: Regex,
    heart_rate: Regex,
    temperature: Regex,
    spo2: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        blood_pressure: Regex::new(r"\b(\d{2,3})\s*/\s*(\d{2,3})\b(\s*/\s*\d+)?(?:\s*mm\s*hg)?")
            .expect("static regex"),
        heart_rate: Regex::new(
            r"(?:\b(?:heart\s*rate|hr|pulse(?:\s*rate)?)\b\s*[:=\-]?\s*(\d{2,3})\b)|(?:\b(\d{2,3})\s*(?:bpm|beats\s*(?:per|/)\s*min(?:ute)?)\b)",
        )
        .expect("static regex"),
        temperature: Regex::new(
            r"(?:\btemp(?:erature)?\b\s*[:=\-]?\s*(\d{2,3}(?:\.\d)?)\s*(?:°|deg(?:rees)?)?\s*([cf])?\b)|(?:\b(\d{2,3}\.\d)\s*(?:°|deg(?:rees)?)?\s*([cf])\b)",
        )
        .expect("static regex"),
        spo2: Regex::new(
            r"\b(?:spo2|sp02|sao2|o2\s*sat(?:uration)?|oxygen\s*saturation|saturation)\b\s*[:=\-]?\s*(\d{2,3})\s*%?",
        )
        .expect("static regex"),
    })
}

/// Extract vitals from normalized text. Matching is case-insensitive.
pub fn extract_vitals(text: &str) -> Vitals {
    let p = patterns();
    let mut lowered = text.to_lowercase();
    let mut vitals = Vitals::default();

    // A third slash-separated part marks a date, and a reading has systolic
    // above diastolic. The adopted span is masked so its numbers cannot be
    // re-read as a heart rate or saturation further down.
    let reading = p.blood_pressure.captures_iter(&lowered).find_map(|caps| {
        if caps.get(3).is_some() {
            return None;
        }
        let systolic: u32 = caps[1].parse().ok()?;
        let diastolic: u32 = caps[2].parse().ok()?;
        let span = caps.get(0)?.range();
        (systolic > diastolic).then_some((systolic, diastolic, span))
    });
    if let Some((systolic, diastolic, span)) = reading {
        vitals.blood_pressure = Some(format!("{}/{} mmHg", systolic, diastolic));
        lowered.replace_range(span.clone(), &" ".repeat(span.len()));
    }

    vitals.heart_rate = p
        .heart_rate
        .captures_iter(&lowered)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .find(|bpm| HEART_RATE_RANGE.contains(bpm))
        .map(|bpm| format!("{} bpm", bpm));

    vitals.temperature = p.temperature.captures_iter(&lowered).find_map(|caps| {
        let value = caps.get(1).or_else(|| caps.get(3))?.as_str();
        let unit = caps
            .get(2)
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_else(|| "C".to_string());
        Some(format!("{} °{}", value, unit))
    });

    vitals.spo2 = p
        .spo2
        .captures_iter(&lowered)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .find(|pct| SPO2_RANGE.contains(pct))
        .map(|pct| format!("{}%", pct));

    vitals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blood_pressure_and_heart_rate() {
        let v = extract_vitals("Blood Pressure: 120/80 mmHg, HR 75 bpm");
        assert_eq!(
            v,
            Vitals {
                blood_pressure: Some("120/80 mmHg".to_string()),
                heart_rate: Some("75 bpm".to_string()),
                temperature: None,
                spo2: None,
            }
        );
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"blood_pressure": "120/80 mmHg", "heart_rate": "75 bpm"})
        );
    }

    #[test]
    fn test_bp_numbers_are_not_reused_as_heart_rate() {
        let v = extract_vitals("BP 140/90 bpm noted");
        assert_eq!(v.blood_pressure.as_deref(), Some("140/90 mmHg"));
        assert_eq!(v.heart_rate, None);
    }

    #[test]
    fn test_dates_are_not_blood_pressure() {
        assert_eq!(extract_vitals("seen 12/05/2023").blood_pressure, None);
        assert_eq!(extract_vitals("visit on 03/11").blood_pressure, None);
        assert_eq!(
            extract_vitals("seen 12/05/2023, BP 132/84").blood_pressure.as_deref(),
            Some("132/84 mmHg")
        );
    }

    #[test]
    fn test_heart_rate_out_of_range_is_dropped() {
        assert_eq!(extract_vitals("pulse 250").heart_rate, None);
        assert_eq!(extract_vitals("heart rate: 12").heart_rate, None);
        assert_eq!(extract_vitals("pulse 250, later pulse 88").heart_rate.as_deref(), Some("88 bpm"));
        assert_eq!(extract_vitals("Heart rate 220").heart_rate.as_deref(), Some("220 bpm"));
    }

    #[test]
    fn test_temperature_units() {
        assert_eq!(extract_vitals("Temp: 38.4").temperature.as_deref(), Some("38.4 °C"));
        assert_eq!(extract_vitals("temperature 101.2 F").temperature.as_deref(), Some("101.2 °F"));
        assert_eq!(extract_vitals("fever of 39.1°C").temperature.as_deref(), Some("39.1 °C"));
        assert_eq!(extract_vitals("dose 12.5 mg").temperature, None);
    }

    #[test]
    fn test_spo2_range() {
        assert_eq!(extract_vitals("SpO2: 97%").spo2.as_deref(), Some("97%"));
        assert_eq!(extract_vitals("oxygen saturation 92").spo2.as_deref(), Some("92%"));
        assert_eq!(extract_vitals("SpO2 101%").spo2, None);
        assert_eq!(extract_vitals("SpO2 45%").spo2, None);
    }

    #[test]
    fn test_nothing_found() {
        let v = extract_vitals("Patient feels well. No complaints.");
        assert!(v.is_empty());
        assert_eq!(serde_json::to_value(&v).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_reported_ranges_hold() {
        for n in 0..300u32 {
            let v = extract_vitals(&format!("HR {} bpm, SpO2 {}%", n, n));
            if let Some(hr) = v.heart_rate {
                let value: u32 = hr.trim_end_matches(" bpm").parse().unwrap();
                assert!(HEART_RATE_RANGE.contains(&value));
            }
            if let Some(sat) = v.spo2 {
                let value: u32 = sat.trim_end_matches('%').parse().unwrap();
                assert!(SPO2_RANGE.contains(&value));
            }
        }
    }
}
