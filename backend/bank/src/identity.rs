//! # Model Identity
//!
//! Raw model ids come from extraction output file names such as
//! `Qwen_Qwen2.5-7B-Instruct` or `fine-tuned-meta-llama-meta-llama-3-8b-instruct`.
//! The descriptive fields shown in the atlas (organization, family, parameter
//! count, instruct flag) are parsed from them once, at build time.
use std::sync::LazyLock;

use regex::Regex;

static PARAMETERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(\.\d+)?)B").expect("valid parameter regex"));

const KNOWN_ORGS: [(&str, &str); 5] = [
    ("qwen", "Qwen"),
    ("mistral", "Mistral"),
    ("01-ai", "01-ai"),
    ("google", "Google"),
    ("microsoft", "Microsoft"),
];

const FAMILIES: [(&str, &str); 8] = [
    ("llama", "Llama"),
    ("qwen", "Qwen"),
    ("mistral", "Mistral"),
    ("gemma", "Gemma"),
    ("phi", "Phi"),
    ("yi", "Yi"),
    ("falcon", "Falcon"),
    ("deepseek", "DeepSeek"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelIdentity {
    /// Display id, `"{organization}/{name}"`.
    pub id: String,
    /// The raw id as found on disk.
    pub name: String,
    pub organization: String,
    pub family: String,
    pub parameters: Option<String>,
    pub is_instruct: bool,
}

impl ModelIdentity {
    pub fn parse(raw_id: &str) -> Self {
        let (organization, short_name) = split_organization(raw_id);
        let organization = fix_organization(&title_case(&organization.replace('-', " ")));

        let id = format!("{organization}/{short_name}");
        let id_lower = id.to_lowercase();

        let family = FAMILIES
            .iter()
            .find(|(needle, _)| id_lower.contains(needle))
            .map_or("Unknown", |(_, family)| family)
            .to_string();

        Self {
            is_instruct: id_lower.contains("instruct") || id_lower.contains("chat"),
            parameters: extract_parameters(raw_id),
            name: raw_id.to_string(),
            organization,
            family,
            id,
        }
    }
}

fn split_organization(raw_id: &str) -> (String, String) {
    if let Some((org, rest)) = raw_id.split_once('_') {
        return (org.to_string(), rest.to_string());
    }

    let lower = raw_id.to_lowercase();
    if lower.contains("meta-llama") {
        let name = raw_id.replace("fine-tuned-", "").replace("meta-llama-", "");
        return ("Meta Llama".to_string(), name);
    }

    let org = KNOWN_ORGS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, org)| org.to_string())
        .or_else(|| raw_id.split_once('-').map(|(first, _)| first.to_string()))
        .unwrap_or_else(|| "Others".to_string());

    (org, raw_id.to_string())
}

fn fix_organization(org: &str) -> String {
    if org.contains("Llama") {
        "Meta Llama".to_string()
    } else if org.contains("01 Ai") {
        "01-ai".to_string()
    } else if org.contains("Qwen") {
        "Qwen".to_string()
    } else {
        org.to_string()
    }
}

/// Capitalizes the first letter of every run of letters and lowercases the rest.
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_is_letter = false;

    for c in input.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }

    out
}

pub fn extract_parameters(raw_id: &str) -> Option<String> {
    PARAMETERS
        .captures(raw_id)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("{}B", m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore_split() {
        let identity = ModelIdentity::parse("Qwen_Qwen2.5-7B-Instruct");
        assert_eq!(identity.id, "Qwen/Qwen2.5-7B-Instruct");
        assert_eq!(identity.name, "Qwen_Qwen2.5-7B-Instruct");
        assert_eq!(identity.organization, "Qwen");
        assert_eq!(identity.family, "Qwen");
        assert_eq!(identity.parameters.as_deref(), Some("7B"));
        assert!(identity.is_instruct);
    }

    #[test]
    fn test_meta_llama_fine_tune() {
        let identity = ModelIdentity::parse("fine-tuned-meta-llama-meta-llama-3-8b-instruct");
        assert_eq!(identity.organization, "Meta Llama");
        assert_eq!(identity.id, "Meta Llama/3-8b-instruct");
        assert_eq!(identity.family, "Llama");
        assert_eq!(identity.parameters.as_deref(), Some("8B"));
        assert!(identity.is_instruct);
    }

    #[test]
    fn test_known_and_hyphen_orgs() {
        assert_eq!(ModelIdentity::parse("01-ai-yi-6b").organization, "01-ai");
        assert_eq!(ModelIdentity::parse("google-gemma-2b").organization, "Google");
        assert_eq!(ModelIdentity::parse("tiiuae-falcon-7b").organization, "Tiiuae");
        assert_eq!(ModelIdentity::parse("tiiuae-falcon-7b").family, "Falcon");
        assert_eq!(ModelIdentity::parse("gpt2").organization, "Others");
    }

    #[test]
    fn test_unknown_parameters_and_family() {
        let identity = ModelIdentity::parse("openai-community_gpt2");
        assert_eq!(identity.organization, "Openai Community");
        assert_eq!(identity.family, "Unknown");
        assert_eq!(identity.parameters, None);
        assert!(!identity.is_instruct);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("meta llama"), "Meta Llama");
        assert_eq!(title_case("01 ai"), "01 Ai");
        assert_eq!(title_case("DEEPSEEK ai"), "Deepseek Ai");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_extract_parameters() {
        assert_eq!(extract_parameters("phi-1.5b").as_deref(), Some("1.5B"));
        assert_eq!(extract_parameters("model-70B-chat").as_deref(), Some("70B"));
        assert_eq!(extract_parameters("bert-base"), None);
    }
}
