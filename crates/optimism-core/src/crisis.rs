//! Crisis gate: phrase matching for self-harm and acute distress language.
//!
//! HIGH is a hard short-circuit. The caller returns [`safety_payload`] and
//! makes no classifier or provider calls for that message. MODERATE lets the
//! pipeline continue but attaches resources and a disclaimer to the reply.

use serde::{Deserialize, Serialize};

/// Direct self-harm language. Any single hit is HIGH.
const HIGH_SEVERITY_PHRASES: &[&str] = &[
    "kill myself",
    "suicide",
    "suicidal",
    "want to die",
    "ending it all",
    "end my life",
    "overdose",
    "self-harm",
];

/// Distress and emergency language. One hit is MODERATE, two or more HIGH.
const GENERAL_DISTRESS_PHRASES: &[&str] = &[
    "take my life",
    "no reason to live",
    "better off dead",
    "hurt myself",
    "cutting myself",
    "can't go on",
    "give up",
    "no hope",
    "hopeless",
    "no point in living",
    "everyone would be better off without me",
    "planning to",
    "emergency",
    "help me now",
    "i'm in danger",
    "being hurt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrisisSeverity {
    Low,
    Moderate,
    High,
}

impl CrisisSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrisisSeverity::Low => "LOW",
            CrisisSeverity::Moderate => "MODERATE",
            CrisisSeverity::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisVerdict {
    pub severity: CrisisSeverity,
    pub matched_phrases: Vec<String>,
}

impl CrisisVerdict {
    pub fn needs_resources(&self) -> bool {
        self.severity != CrisisSeverity::Low
    }

    pub fn is_high(&self) -> bool {
        self.severity == CrisisSeverity::High
    }
}

/// Stateless phrase classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrisisGate;

impl CrisisGate {
    pub fn new() -> Self {
        Self
    }

    /// Classify `text`. Matching is case-insensitive substring search.
    pub fn evaluate(&self, text: &str) -> CrisisVerdict {
        let lower = text.to_lowercase().replace('\u{2019}', "'");
        let mut matched = Vec::new();
        let mut high = false;

        for phrase in HIGH_SEVERITY_PHRASES {
            if lower.contains(phrase) {
                matched.push((*phrase).to_string());
                high = true;
            }
        }
        for phrase in GENERAL_DISTRESS_PHRASES {
            if lower.contains(phrase) {
                matched.push((*phrase).to_string());
            }
        }

        let severity = if high || matched.len() >= 2 {
            CrisisSeverity::High
        } else if matched.len() == 1 {
            CrisisSeverity::Moderate
        } else {
            CrisisSeverity::Low
        };

        if severity != CrisisSeverity::Low {
            tracing::warn!(
                target: "optimism::crisis",
                severity = severity.as_str(),
                matches = matched.len(),
                "crisis language detected"
            );
        }

        CrisisVerdict {
            severity,
            matched_phrases: matched,
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Helpline {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    pub url: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmergencyNumber {
    pub country: &'static str,
    pub number: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisResources {
    pub india: &'static [Helpline],
    pub global: &'static [Helpline],
    pub emergency_instruction: &'static str,
    pub emergency_numbers: &'static [EmergencyNumber],
}

const INDIA_HELPLINES: &[Helpline] = &[
    Helpline {
        name: "AASRA",
        phone: Some("+91-22-27546669"),
        description: Some("24x7 helpline for emotional support"),
        url: "https://aasra.info",
    },
    Helpline {
        name: "Vandrevala Foundation",
        phone: Some("+91-22-25706000"),
        description: Some("Mental health helpline"),
        url: "https://vandrevalafoundation.com",
    },
    Helpline {
        name: "iCall (TATA Institute)",
        phone: Some("+91-22-25521111"),
        description: Some("Mon-Sat, 8am-10pm"),
        url: "https://icallhelpline.org",
    },
];

const GLOBAL_HELPLINES: &[Helpline] = &[
    Helpline {
        name: "International Association for Suicide Prevention",
        phone: None,
        description: None,
        url: "https://www.iasp.info/resources/Crisis_Centres/",
    },
    Helpline {
        name: "Samaritans (UK)",
        phone: Some("116 123"),
        description: Some("Free, 24/7"),
        url: "https://www.samaritans.org",
    },
    Helpline {
        name: "988 Suicide & Crisis Lifeline (US)",
        phone: Some("988"),
        description: Some("Call or text, 24/7"),
        url: "https://988lifeline.org",
    },
];

const EMERGENCY_NUMBERS: &[EmergencyNumber] = &[
    EmergencyNumber { country: "US/Canada", number: "911" },
    EmergencyNumber { country: "UK", number: "999" },
    EmergencyNumber { country: "India", number: "112" },
    EmergencyNumber { country: "Australia", number: "000" },
];

/// Regional helplines and emergency numbers.
pub fn crisis_resources() -> CrisisResources {
    CrisisResources {
        india: INDIA_HELPLINES,
        global: GLOBAL_HELPLINES,
        emergency_instruction:
            "If you are in immediate danger, please call your local emergency services:",
        emergency_numbers: EMERGENCY_NUMBERS,
    }
}

/// User-facing message for a non-LOW verdict.
pub fn crisis_message(severity: CrisisSeverity) -> String {
    match severity {
        CrisisSeverity::High => {
            let mut out = String::from(
                "I'm really glad you're here and sharing this with me. What you're feeling right now matters, \
                 and I want to make sure you have the support you need.\n\n\
                 **Please reach out to someone who can help right now:**\n\n\
                 **If you're in immediate danger, call emergency services:**\n",
            );
            for n in EMERGENCY_NUMBERS.iter().take(3) {
                out.push_str(&format!("- {}: {}\n", n.country, n.number));
            }
            out.push_str(
                "\n**Crisis Helplines (24/7, free, confidential):**\n\
                 - **988 Suicide & Crisis Lifeline** (US): Call or text **988**\n\
                 - **Samaritans** (UK): **116 123**\n\
                 - **AASRA** (India): **+91-22-27546669**\n\
                 - **Vandrevala Foundation** (India): **+91-22-25706000**\n\n\
                 You don't have to carry this alone. These people are trained to help, and they want to hear from you.\n\n\
                 I'm here to continue exploring what you're going through whenever you're ready, \
                 but please prioritize connecting with a human who can support you right now.",
            );
            out
        }
        CrisisSeverity::Moderate => "What you're sharing sounds really heavy, and I want you to know that it's okay \
             to reach out for more support. Sometimes talking to a trained listener can help in ways that go \
             beyond what I can offer.\n\n\
             **Here are some resources if you need them:**\n\n\
             - **988 Lifeline** (US): Call or text **988**\n\
             - **Samaritans** (UK): **116 123**\n\
             - **AASRA** (India): **+91-22-27546669**\n\n\
             These are free, confidential, and available 24/7. You don't have to be in crisis to call. \
             They're there to listen."
            .to_string(),
        CrisisSeverity::Low => String::new(),
    }
}

/// Disclaimer attached to responses.
pub fn disclaimer(is_crisis: bool) -> &'static str {
    if is_crisis {
        "Important: I'm an AI, not a mental health professional. If you're in crisis, please reach out \
         to a human who can help. The resources above are available 24/7."
    } else {
        "Remember: I'm an AI support tool, not a therapist. This is a space for reflection, but \
         professional help is always available if you need it."
    }
}

/// Fixed reply for a HIGH verdict. No generation call is made.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyPayload {
    pub acknowledgment: &'static str,
    pub distortion_type: &'static str,
    pub distortion_explanation: &'static str,
    pub reframe: &'static str,
    pub probing_question: &'static str,
    pub encouragement: String,
    pub iceberg_layer: &'static str,
    pub layer_insight: &'static str,
    pub crisis_resources: CrisisResources,
    pub disclaimer: &'static str,
    #[serde(rename = "_isCrisisResponse")]
    pub is_crisis_response: bool,
}

pub fn safety_payload() -> SafetyPayload {
    SafetyPayload {
        acknowledgment: "I hear you, and what you're sharing is really important.",
        distortion_type: "Crisis Response",
        distortion_explanation:
            "You're going through something that deserves more support than I can provide.",
        reframe: "Right now, the most important thing is connecting with someone who can truly help.",
        probing_question: "Would you like to talk about what's bringing these feelings up?",
        encouragement: crisis_message(CrisisSeverity::High),
        iceberg_layer: "surface",
        layer_insight: "Your safety matters most right now.",
        crisis_resources: crisis_resources(),
        disclaimer: disclaimer(true),
        is_crisis_response: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_phrases_are_high() {
        let v = CrisisGate::new().evaluate("I want to die and I can't go on");
        assert_eq!(v.severity, CrisisSeverity::High);
        assert!(v.matched_phrases.contains(&"want to die".to_string()));
        assert!(v.matched_phrases.contains(&"can't go on".to_string()));
    }

    #[test]
    fn two_general_phrases_are_high() {
        let v = CrisisGate::new().evaluate("I can't go on, I just want to give up");
        assert_eq!(v.severity, CrisisSeverity::High);
        assert_eq!(v.matched_phrases.len(), 2);
    }

    #[test]
    fn single_high_phrase_is_high() {
        assert_eq!(
            CrisisGate::new().evaluate("I've been thinking about SUICIDE").severity,
            CrisisSeverity::High
        );
    }

    #[test]
    fn single_general_phrase_is_moderate() {
        let v = CrisisGate::new().evaluate("I feel hopeless");
        assert_eq!(v.severity, CrisisSeverity::Moderate);
        assert_eq!(v.matched_phrases, vec!["hopeless".to_string()]);
        assert!(v.needs_resources());
    }

    #[test]
    fn ordinary_text_is_low() {
        let v = CrisisGate::new().evaluate("I had a rough day at work");
        assert_eq!(v.severity, CrisisSeverity::Low);
        assert!(v.matched_phrases.is_empty());
        assert!(!v.needs_resources());
    }

    #[test]
    fn curly_apostrophes_match() {
        assert_eq!(
            CrisisGate::new().evaluate("I can\u{2019}t go on").severity,
            CrisisSeverity::Moderate
        );
    }

    #[test]
    fn evaluate_is_idempotent() {
        let gate = CrisisGate::new();
        let text = "there is no hope left";
        assert_eq!(gate.evaluate(text), gate.evaluate(text));
    }

    #[test]
    fn safety_payload_is_flagged() {
        let payload = serde_json::to_value(safety_payload()).unwrap();
        assert_eq!(payload["_isCrisisResponse"], true);
        assert_eq!(payload["icebergLayer"], "surface");
        assert_eq!(payload["distortionType"], "Crisis Response");
        assert!(payload["encouragement"].as_str().unwrap().contains("988"));
        assert_eq!(payload["crisisResources"]["emergencyNumbers"][2]["number"], "112");
    }

    #[test]
    fn low_has_no_message() {
        assert!(crisis_message(CrisisSeverity::Low).is_empty());
        assert!(crisis_message(CrisisSeverity::Moderate).contains("116 123"));
    }
}
