//! Prompt assembly and verdict parsing for language-model arbiters.

use crate::backend::ArbiterError;
use crate::types::{ArbitrationRequest, EvidenceBundle, Ruling, Verdict};

/// Builds prompts from arbitration requests.
pub struct PromptAssembler;

impl PromptAssembler {
    /// System prompt describing the arbiter's role and the answer format.
    pub fn system_prompt() -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "You arbitrate disputes between a client and a guild over a work contract.\n",
        );
        prompt.push_str("Decide whether the delivered work satisfies the contract.\n\n");
        prompt.push_str("Possible rulings:\n");
        prompt.push_str("- client_wins: the delivery does not satisfy the contract\n");
        prompt.push_str("- guild_wins: the delivery satisfies the contract\n");
        prompt.push_str("- split: the delivery partially satisfies the contract\n\n");
        prompt.push_str(
            "Respond with a JSON object: {\"ruling\": string, \
             \"confidence_score\": number between 0 and 1, \"reasoning\": string, \
             \"ai_stake\": integer credits you are willing to stake on the ruling}.\n",
        );
        prompt
    }

    /// User prompt carrying the bounty facts and both evidence bundles.
    pub fn user_prompt(request: &ArbitrationRequest) -> String {
        let bounty = &request.bounty;
        let mut prompt = String::new();

        prompt.push_str(&format!("Bounty: {}\n", request.bounty_id));
        if !bounty.title.is_empty() {
            prompt.push_str(&format!("Title: {}\n", bounty.title));
        }
        if !bounty.description.is_empty() {
            prompt.push_str(&format!("Description:\n{}\n", bounty.description));
        }
        prompt.push_str(&format!(
            "Reward: {} credits. Client stake: {}. Guild stake: {}.\n",
            bounty.reward_credits, bounty.client_stake, bounty.guild_stake
        ));
        if let Some(deadline) = bounty.deadline {
            prompt.push_str(&format!("Deadline: {}\n", deadline.to_rfc3339()));
        }
        if let Some(proof) = &bounty.proof_of_work {
            prompt.push_str(&format!("\nSubmitted proof of work:\n{}\n", proof));
        }

        Self::push_bundle(&mut prompt, "Client evidence", &request.client_evidence);
        Self::push_bundle(&mut prompt, "Guild evidence", &request.guild_evidence);

        prompt
    }

    fn push_bundle(prompt: &mut String, heading: &str, bundle: &EvidenceBundle) {
        prompt.push_str(&format!("\n{}:\n", heading));
        if bundle.is_empty() {
            prompt.push_str("(none submitted)\n");
            return;
        }
        for (i, item) in bundle.items.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, item.content));
            if let Some(uri) = &item.attachment_uri {
                prompt.push_str(&format!("   attachment: {}\n", uri));
            }
        }
    }
}

/// Parse model output into a verdict.
///
/// Accepts `confidence` as an alias of `confidence_score` and `stake` as an
/// alias of `ai_stake`. Confidence outside 0-1 is rejected.
pub fn parse_verdict(content: &str, arbiter_id: &str) -> Result<Verdict, ArbiterError> {
    let data: serde_json::Value = serde_json::from_str(content.trim())
        .map_err(|e| ArbiterError::ParseError(format!("Verdict is not JSON: {}", e)))?;

    let ruling = data
        .get("ruling")
        .and_then(|v| v.as_str())
        .and_then(Ruling::parse)
        .ok_or_else(|| ArbiterError::ParseError("Missing or unknown ruling".to_string()))?;

    let confidence = data
        .get("confidence_score")
        .or_else(|| data.get("confidence"))
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ArbiterError::ParseError("Missing confidence_score".to_string()))?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(ArbiterError::ParseError(format!(
            "confidence_score {} outside [0, 1]",
            confidence
        )));
    }

    let reasoning = data
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let ai_stake = data
        .get("ai_stake")
        .or_else(|| data.get("stake"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    Ok(Verdict::new(ruling, confidence as f32, reasoning)
        .with_stake(ai_stake)
        .with_arbiter(arbiter_id))
}
