use std::sync::OnceLock;

use regex::Regex;

use crate::error::LabelQaError;

const QUESTION_MAX_BYTES: usize = 2048;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Inner hyphens and digits stay ("co-trimoxazole", "5-FU"); an apostrophe ends the name.
        Regex::new(r"^[^\p{L}\p{N}]*([\p{L}\p{N}](?:[\p{L}\p{N}\-]*[\p{L}\p{N}])?)")
            .expect("valid regex")
    })
}

pub fn validate_question(question: &str) -> Result<&str, LabelQaError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(LabelQaError::InvalidArgument(
            "Question is required. Example: labelqa ask \"Metformin dosing in renal impairment?\""
                .into(),
        ));
    }
    if question.len() > QUESTION_MAX_BYTES {
        return Err(LabelQaError::InvalidArgument("Question is too long.".into()));
    }
    Ok(question)
}

/// The drug name is taken to be the first word of the question.
pub fn drug_name_from_question(question: &str) -> Result<String, LabelQaError> {
    let question = validate_question(question)?;
    let first = question.split_whitespace().next().unwrap_or_default();
    word_re()
        .captures(first)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            LabelQaError::InvalidArgument(format!(
                "Could not find a drug name at the start of \"{question}\". Start the question with the drug name or pass --drug."
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_first_word() {
        assert_eq!(
            drug_name_from_question("Lisinopril dosing for heart failure?").unwrap(),
            "Lisinopril"
        );
    }

    #[test]
    fn strips_surrounding_punctuation() {
        assert_eq!(
            drug_name_from_question("  \"Aspirin,\" is it safe in pregnancy?").unwrap(),
            "Aspirin"
        );
        assert_eq!(drug_name_from_question("Tylenol?").unwrap(), "Tylenol");
    }

    #[test]
    fn drops_possessive_suffix() {
        assert_eq!(
            drug_name_from_question("Metformin's max dose in CKD?").unwrap(),
            "Metformin"
        );
        assert_eq!(
            drug_name_from_question("Metformin\u{2019}s max dose in CKD?").unwrap(),
            "Metformin"
        );
    }

    #[test]
    fn keeps_inner_hyphens() {
        assert_eq!(
            drug_name_from_question("co-trimoxazole: renal dosing").unwrap(),
            "co-trimoxazole"
        );
    }

    #[test]
    fn rejects_empty_question() {
        let err = drug_name_from_question("   ").unwrap_err();
        assert!(matches!(err, LabelQaError::InvalidArgument(_)));
        assert!(err.to_string().contains("Question is required"));
    }

    #[test]
    fn rejects_question_without_leading_word() {
        let err = drug_name_from_question("??? what about it").unwrap_err();
        assert!(err.to_string().contains("--drug"));
    }

    #[test]
    fn rejects_overlong_question() {
        let long = "a".repeat(QUESTION_MAX_BYTES + 1);
        assert!(validate_question(&long).is_err());
    }
}
